//! # Error Types
//!
//! Domain-specific error types for smartshop-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  smartshop-core errors (this file)                                     │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - User input that fails field constraints        │
//! │                                                                         │
//! │  smartshop-db errors                                                   │
//! │  └── DbError          - Local store failures                           │
//! │                                                                         │
//! │  smartshop-sync errors                                                 │
//! │  └── SyncError        - Remote writes, stream failures, config         │
//! │                                                                         │
//! │  Flow: ValidationError stays in the detail view; everything else       │
//! │        reaches a view state as an Error(message)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Domain errors raised before any store is touched.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A delete was requested while no product is loaded.
    ///
    /// ## When This Occurs
    /// - Detail flow for a new product (nothing saved yet)
    /// - The product was removed by someone else while the detail was open
    #[error("Could not delete product. Product not found.")]
    NothingToDelete,

    /// A product record breaks a data model invariant.
    #[error("Invalid product {id:?}: {reason}")]
    InvalidProduct { id: String, reason: String },

    /// Validation error (wraps ValidationError).
    #[error("{0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet the Product field
/// constraints. They never reach the repository.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is missing or blank.
    #[error("{field} is required")]
    Required { field: String },

    /// Text could not be parsed as the expected number type.
    #[error("{field} must be a number, got {value:?}")]
    InvalidNumber { field: String, value: String },

    /// Value must be strictly positive.
    #[error("{field} must be greater than zero")]
    MustBePositive { field: String },

    /// Value must be zero or more.
    #[error("{field} cannot be negative")]
    MustBeNonNegative { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_to_delete_message() {
        assert_eq!(
            CoreError::NothingToDelete.to_string(),
            "Could not delete product. Product not found."
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "name".to_string(),
        };
        assert_eq!(err.to_string(), "name is required");

        let err = ValidationError::InvalidNumber {
            field: "price".to_string(),
            value: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "price must be a number, got \"abc\"");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::MustBePositive {
            field: "price".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
        assert_eq!(core_err.to_string(), "price must be greater than zero");
    }
}
