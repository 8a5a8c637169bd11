//! # Folio Derivation
//!
//! Folios are the human-readable sequential references customers and
//! auditors see on tickets and register reports:
//!
//! ```text
//! V-CEN-2026-000042
//! │  │    │     └── 6-digit sequence, per branch per year
//! │  │    └── calendar year
//! │  └── branch business code
//! └── prefix: V = sale, C = register session, T = transfer
//! ```
//!
//! The sequence is derived from the previous folio for the same branch and
//! year: parse the numeric suffix and increment. A missing or unparseable
//! previous folio restarts the sequence at 1 (legacy behavior, kept). The
//! read-last-then-insert derivation can race under concurrency; the sales,
//! register and transfer tables all carry UNIQUE folio columns so a
//! collision fails the insert instead of producing duplicates.

/// Builds a folio string from its parts.
pub fn format_folio(prefix: &str, branch_code: &str, year: i32, sequence: u32) -> String {
    format!("{}-{}-{}-{:06}", prefix, branch_code, year, sequence)
}

/// Derives the next folio for a branch/year from the previous one.
///
/// `last_folio` is the most recent folio issued for the same prefix, branch
/// and year, or `None` when none exists yet.
///
/// ## Example
/// ```rust
/// use mostrador_core::folio::next_folio;
///
/// let f = next_folio("V", "CEN", 2026, Some("V-CEN-2026-000041"));
/// assert_eq!(f, "V-CEN-2026-000042");
///
/// let first = next_folio("V", "CEN", 2026, None);
/// assert_eq!(first, "V-CEN-2026-000001");
/// ```
pub fn next_folio(prefix: &str, branch_code: &str, year: i32, last_folio: Option<&str>) -> String {
    let next_seq = last_folio
        .and_then(parse_sequence)
        .map(|seq| seq + 1)
        .unwrap_or(1);
    format_folio(prefix, branch_code, year, next_seq)
}

/// Parses the numeric suffix of a folio. Returns None on any parse failure
/// (the caller falls back to sequence 1).
fn parse_sequence(folio: &str) -> Option<u32> {
    folio.rsplit('-').next()?.parse().ok()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        assert_eq!(format_folio("V", "CEN", 2026, 1), "V-CEN-2026-000001");
        assert_eq!(format_folio("C", "NOR", 2026, 123456), "C-NOR-2026-123456");
    }

    #[test]
    fn test_next_from_previous() {
        assert_eq!(
            next_folio("V", "CEN", 2026, Some("V-CEN-2026-000041")),
            "V-CEN-2026-000042"
        );
    }

    #[test]
    fn test_first_of_year() {
        assert_eq!(next_folio("V", "CEN", 2026, None), "V-CEN-2026-000001");
    }

    #[test]
    fn test_unparseable_previous_restarts_at_one() {
        // Legacy data sometimes carried hand-entered folios.
        assert_eq!(
            next_folio("V", "CEN", 2026, Some("MANUAL-FOLIO")),
            "V-CEN-2026-000001"
        );
        assert_eq!(next_folio("V", "CEN", 2026, Some("")), "V-CEN-2026-000001");
    }

    #[test]
    fn test_sequence_wider_than_padding() {
        assert_eq!(
            next_folio("V", "CEN", 2026, Some("V-CEN-2026-999999")),
            "V-CEN-2026-1000000"
        );
    }
}
