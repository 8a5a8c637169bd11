//! # Repository Module
//!
//! Database repository implementations for Mostrador.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  HTTP Handler                                                          │
//! │       │                                                                 │
//! │       │  db.sales().post_sale(new_sale)                                 │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  SaleRepository                                                        │
//! │  ├── post_sale(&self, new_sale)                                        │
//! │  ├── cancel_sale(&self, id, user, reason)                              │
//! │  ├── get_by_folio(&self, folio)                                        │
//! │  └── list_for_branch(&self, branch_id, limit)                          │
//! │       │                                                                 │
//! │       │  SQL (transactions where the operation is multi-row)            │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`branch::BranchRepository`] - Branches and per-branch settings
//! - [`product::ProductRepository`] - Catalog, stock items, movements
//! - [`customer::CustomerRepository`] - Customers and discount audit
//! - [`sale::SaleRepository`] - Sale posting and cancellation
//! - [`register::RegisterRepository`] - Register session lifecycle
//! - [`transfer::TransferRepository`] - Inter-branch transfers
//! - [`user::UserRepository`] - Users and auth sessions

pub mod branch;
pub mod customer;
pub mod product;
pub mod register;
pub mod sale;
pub mod transfer;
pub mod user;
