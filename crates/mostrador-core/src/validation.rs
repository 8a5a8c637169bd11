//! # Input Validation
//!
//! Validators for user-supplied fields. Each returns `Result<(), ValidationError>`
//! so call sites compose them with `?` before any business logic runs.
//!
//! Validation here is about well-formedness (lengths, characters, ranges).
//! Business rules that need data (duplicate codes, tier bounds against a
//! stored tier) live with the types or the repositories.

use crate::error::ValidationError;
use crate::types::CustomerTier;

/// Maximum length for business codes (products, branches, customers).
pub const MAX_CODE_LENGTH: usize = 32;

/// Maximum length for display names.
pub const MAX_NAME_LENGTH: usize = 120;

/// Maximum length for free-text notes and reasons.
pub const MAX_NOTES_LENGTH: usize = 500;

/// Maximum length for search queries.
pub const MAX_SEARCH_LENGTH: usize = 80;

/// Minimum password length for user accounts.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Validates a business code: required, bounded, alphanumeric plus `-`/`_`.
pub fn validate_code(field: &str, value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if trimmed.len() > MAX_CODE_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_CODE_LENGTH,
        });
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "only letters, digits, '-' and '_' are allowed".to_string(),
        });
    }
    Ok(())
}

/// Validates a display name: required and bounded.
pub fn validate_name(field: &str, value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LENGTH,
        });
    }
    Ok(())
}

/// Validates optional free text (notes, cancellation reasons).
pub fn validate_notes(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.len() > MAX_NOTES_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NOTES_LENGTH,
        });
    }
    Ok(())
}

/// Validates a strictly positive quantity.
pub fn validate_positive(field: &str, value: i64) -> Result<(), ValidationError> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Validates a non-negative money amount in cents.
pub fn validate_non_negative_cents(field: &str, cents: i64) -> Result<(), ValidationError> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates a search query (bounded; empty means "list all").
pub fn validate_search(value: &str) -> Result<(), ValidationError> {
    if value.len() > MAX_SEARCH_LENGTH {
        return Err(ValidationError::TooLong {
            field: "search".to_string(),
            max: MAX_SEARCH_LENGTH,
        });
    }
    Ok(())
}

/// Validates a username: required, bounded, lowercase alphanumeric plus
/// `.`/`_`.
pub fn validate_username(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: "username".to_string(),
        });
    }
    if trimmed.len() > MAX_CODE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: MAX_CODE_LENGTH,
        });
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "only lowercase letters, digits, '.' and '_' are allowed".to_string(),
        });
    }
    Ok(())
}

/// Validates a password before hashing.
pub fn validate_password(value: &str) -> Result<(), ValidationError> {
    if value.len() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::OutOfRange {
            field: "password".to_string(),
            min: MIN_PASSWORD_LENGTH as i64,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates a discount assignment against the customer tier's bounds.
///
/// Delegates to [`CustomerTier::validate_discount`]; re-exported here so the
/// API layer validates everything through one module.
pub fn validate_tier_discount(tier: CustomerTier, bps: u32) -> Result<(), ValidationError> {
    tier.validate_discount(bps)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code() {
        assert!(validate_code("code", "ALIM-001").is_ok());
        assert!(validate_code("code", "  padded  ").is_ok());
        assert!(validate_code("code", "").is_err());
        assert!(validate_code("code", "has space").is_err());
        assert!(validate_code("code", &"x".repeat(33)).is_err());
    }

    #[test]
    fn test_name() {
        assert!(validate_name("name", "Croquetas Premium 5kg").is_ok());
        assert!(validate_name("name", "   ").is_err());
        assert!(validate_name("name", &"x".repeat(121)).is_err());
    }

    #[test]
    fn test_positive() {
        assert!(validate_positive("quantity", 1).is_ok());
        assert!(validate_positive("quantity", 0).is_err());
        assert!(validate_positive("quantity", -5).is_err());
    }

    #[test]
    fn test_cents() {
        assert!(validate_non_negative_cents("price", 0).is_ok());
        assert!(validate_non_negative_cents("price", 1099).is_ok());
        assert!(validate_non_negative_cents("price", -1).is_err());
    }

    #[test]
    fn test_username() {
        assert!(validate_username("maria.gomez").is_ok());
        assert!(validate_username("cajero_01").is_ok());
        assert!(validate_username("Maria").is_err());
        assert!(validate_username("").is_err());
    }

    #[test]
    fn test_password() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn test_tier_discount() {
        assert!(validate_tier_discount(CustomerTier::Normal, 0).is_ok());
        assert!(validate_tier_discount(CustomerTier::Normal, 100).is_err());
        assert!(validate_tier_discount(CustomerTier::Frequent, 1000).is_ok());
        assert!(validate_tier_discount(CustomerTier::Frequent, 1600).is_err());
        assert!(validate_tier_discount(CustomerTier::Premium, 2000).is_ok());
        assert!(validate_tier_discount(CustomerTier::Premium, 5100).is_err());
    }
}
