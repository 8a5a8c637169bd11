//! # Authorization Policy
//!
//! A single table mapping roles to the actions they may perform. Handlers
//! ask `role.allows(Action::...)` before touching the database, so the
//! policy lives in one place instead of scattered per-endpoint checks.
//!
//! ```text
//! ┌──────────────────────────────┬────────────┬───────┬─────────┐
//! │ Action                       │ Superadmin │ Admin │ Cashier │
//! ├──────────────────────────────┼────────────┼───────┼─────────┤
//! │ Sell / cart / view catalog   │     ✓      │   ✓   │    ✓    │
//! │ Create customers             │     ✓      │   ✓   │    ✓    │
//! │ Open/close own register      │     ✓      │   ✓   │    ✓    │
//! │ Cancel sales                 │     ✓      │   ✓   │         │
//! │ Manage catalog & stock       │     ✓      │   ✓   │         │
//! │ Assign customer discounts    │     ✓      │   ✓   │         │
//! │ Verify register sessions     │     ✓      │   ✓   │         │
//! │ Receive transfers            │     ✓      │   ✓   │         │
//! │ Manage users                 │     ✓      │   ✓   │         │
//! │ Manage transfers             │     ✓      │       │         │
//! │ Manage branches              │     ✓      │       │         │
//! └──────────────────────────────┴────────────┴───────┴─────────┘
//! ```
//!
//! Admins administer one branch; superadmins see all branches. Scoping a
//! query to the caller's branch is the repository layer's job, this module
//! only answers "may this role do this at all".

use crate::types::Role;

/// Actions the API surface can perform, for role gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Browse products, stock and customers; operate a cart.
    Sell,
    /// Create a customer record (cashiers create Normal-tier only).
    CreateCustomer,
    /// Open, close or view one's own register session.
    OperateRegister,
    /// Cancel a completed sale (restores stock).
    CancelSale,
    /// Create or edit products, categories, suppliers, units, stock items.
    ManageCatalog,
    /// Change a customer's tier or discount percentage.
    AssignDiscount,
    /// Verify a closed register session.
    VerifyRegister,
    /// Receive an in-transit transfer at the destination branch.
    ReceiveTransfer,
    /// Create, dispatch or cancel inter-branch transfers.
    ManageTransfers,
    /// Create or edit user accounts.
    ManageUsers,
    /// Create or edit branches and branch settings.
    ManageBranches,
}

impl Role {
    /// Whether this role may perform the action.
    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::Sell | Action::CreateCustomer | Action::OperateRegister => true,
            Action::CancelSale
            | Action::ManageCatalog
            | Action::AssignDiscount
            | Action::VerifyRegister
            | Action::ReceiveTransfer
            | Action::ManageUsers => self.is_admin(),
            Action::ManageTransfers | Action::ManageBranches => self.is_superadmin(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cashier_permissions() {
        let role = Role::Cashier;
        assert!(role.allows(Action::Sell));
        assert!(role.allows(Action::CreateCustomer));
        assert!(role.allows(Action::OperateRegister));
        assert!(!role.allows(Action::CancelSale));
        assert!(!role.allows(Action::AssignDiscount));
        assert!(!role.allows(Action::ManageCatalog));
        assert!(!role.allows(Action::VerifyRegister));
    }

    #[test]
    fn test_admin_permissions() {
        let role = Role::Admin;
        assert!(role.allows(Action::Sell));
        assert!(role.allows(Action::CancelSale));
        assert!(role.allows(Action::AssignDiscount));
        assert!(role.allows(Action::ReceiveTransfer));
        assert!(role.allows(Action::ManageUsers));
        assert!(!role.allows(Action::ManageTransfers));
        assert!(!role.allows(Action::ManageBranches));
    }

    #[test]
    fn test_superadmin_allows_everything() {
        let role = Role::Superadmin;
        assert!(role.allows(Action::Sell));
        assert!(role.allows(Action::ManageBranches));
        assert!(role.allows(Action::ManageTransfers));
        assert!(role.allows(Action::VerifyRegister));
    }
}
