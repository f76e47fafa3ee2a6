//! # Validation Module
//!
//! Turns raw form input into a valid product.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Flow                                    │
//! │                                                                         │
//! │  name, price_text, quantity_text   (exactly as typed)                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ProductDraft::parse  (THIS MODULE)                                    │
//! │  ├── name:     kept as typed, must not be blank                        │
//! │  ├── price:    f64, finite, > 0                                        │
//! │  └── quantity: integer, >= 0                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ProductDraft::into_product(existing id | None)                        │
//! │  └── a new id is generated here, at first save                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ProductRepository::save   (never sees invalid input)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use smartshop_core::validation::ProductDraft;
//!
//! assert!(ProductDraft::parse("Widget", "10", "5").is_ok());
//! assert!(ProductDraft::parse("", "10", "5").is_err());
//! assert!(ProductDraft::parse("Widget", "abc", "5").is_err());
//! ```

use crate::error::ValidationError;
use crate::types::{generate_product_id, Product};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a product name. The name is kept exactly as typed.
pub fn validate_product_name(name: &str) -> ValidationResult<String> {
    if name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    Ok(name.to_string())
}

/// Parses a price.
///
/// ## Rules
/// - Surrounding whitespace is ignored
/// - Must parse as a decimal number
/// - Must be finite and strictly positive
pub fn parse_price(text: &str) -> ValidationResult<f64> {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: "price".to_string(),
        });
    }

    let price: f64 = trimmed
        .parse()
        .map_err(|_| ValidationError::InvalidNumber {
            field: "price".to_string(),
            value: text.to_string(),
        })?;

    // "inf" and "NaN" parse fine as f64
    if !price.is_finite() {
        return Err(ValidationError::InvalidNumber {
            field: "price".to_string(),
            value: text.to_string(),
        });
    }

    if price <= 0.0 {
        return Err(ValidationError::MustBePositive {
            field: "price".to_string(),
        });
    }

    Ok(price)
}

/// Parses a stock quantity.
///
/// ## Rules
/// - Surrounding whitespace is ignored
/// - Must parse as a whole number ("1.5" is rejected)
/// - Must be zero or more
pub fn parse_quantity(text: &str) -> ValidationResult<i64> {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::Required {
            field: "quantity".to_string(),
        });
    }

    let quantity: i64 = trimmed
        .parse()
        .map_err(|_| ValidationError::InvalidNumber {
            field: "quantity".to_string(),
            value: text.to_string(),
        })?;

    if quantity < 0 {
        return Err(ValidationError::MustBeNonNegative {
            field: "quantity".to_string(),
        });
    }

    Ok(quantity)
}

// =============================================================================
// Product Draft
// =============================================================================

/// Validated form input, not yet bound to an id.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    pub name: String,
    pub price: f64,
    pub quantity: i64,
}

impl ProductDraft {
    /// Parses and validates the three form fields.
    ///
    /// Fields are checked in order (name, price, quantity); the first
    /// failure is returned.
    pub fn parse(name: &str, price_text: &str, quantity_text: &str) -> ValidationResult<Self> {
        Ok(ProductDraft {
            name: validate_product_name(name)?,
            price: parse_price(price_text)?,
            quantity: parse_quantity(quantity_text)?,
        })
    }

    /// Builds the product to save.
    ///
    /// Reuses `existing_id` when editing; otherwise a new UUID v4 is
    /// generated now.
    pub fn into_product(self, existing_id: Option<&str>) -> Product {
        let id = match existing_id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => generate_product_id(),
        };

        Product {
            id,
            name: self.name,
            price: self.price,
            quantity: self.quantity,
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
    fn test_validate_product_name() {
        assert_eq!(validate_product_name("  Widget ").unwrap(), "  Widget ");
        assert!(validate_product_name("").is_err());
        assert!(validate_product_name("   ").is_err());
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("9.99").unwrap(), 9.99);
        assert_eq!(parse_price(" 10 ").unwrap(), 10.0);

        assert!(matches!(
            parse_price("abc"),
            Err(ValidationError::InvalidNumber { .. })
        ));
        assert!(matches!(
            parse_price("-1"),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            parse_price("0"),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(parse_price("inf").is_err());
        assert!(parse_price("NaN").is_err());
        assert!(parse_price("").is_err());
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0").unwrap(), 0);
        assert_eq!(parse_quantity(" 5").unwrap(), 5);

        assert!(matches!(
            parse_quantity("-1"),
            Err(ValidationError::MustBeNonNegative { .. })
        ));
        assert!(matches!(
            parse_quantity("1.5"),
            Err(ValidationError::InvalidNumber { .. })
        ));
        assert!(parse_quantity("").is_err());
    }

    #[test]
    fn test_draft_rejects_bad_input() {
        assert!(ProductDraft::parse("", "10", "5").is_err());
        assert!(ProductDraft::parse("Widget", "-1", "5").is_err());
        assert!(ProductDraft::parse("Widget", "10", "-1").is_err());
        assert!(ProductDraft::parse("Widget", "abc", "5").is_err());
    }

    #[test]
    fn test_draft_into_product() {
        let draft = ProductDraft::parse(" Widget ", "9.99", "3").unwrap();

        let created = draft.clone().into_product(None);
        assert_eq!(created.name, " Widget ");
        assert_eq!(created.price, 9.99);
        assert_eq!(created.quantity, 3);
        assert!(!created.id.is_empty());
        assert!(created.check_invariants().is_ok());

        let edited = draft.into_product(Some("existing-id"));
        assert_eq!(edited.id, "existing-id");
    }
}
