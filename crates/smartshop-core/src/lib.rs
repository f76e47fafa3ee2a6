//! # smartshop-core: Pure Domain Logic for SmartShop
//!
//! This crate holds the catalog's domain model and input rules as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SmartShop Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 smartshop-views (view states)                   │   │
//! │  │       ProductListState, ProductDetailState, DashboardState      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             smartshop-sync (SyncRepository, RemoteStore)        │   │
//! │  └──────────────┬──────────────────────────────────┬───────────────┘   │
//! │                 │                                  │                    │
//! │  ┌──────────────▼──────────────┐   ┌───────────────▼────────────────┐  │
//! │  │  smartshop-db (ProductStore)│   │   remote collection "products" │  │
//! │  └─────────────────────────────┘   └────────────────────────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            ★ smartshop-core (THIS CRATE) ★                      │   │
//! │  │   Product • ProductDraft • ValidationError • id generation      │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - The `Product` record
//! - [`error`] - Domain error types
//! - [`validation`] - Parsing and validation of user input
//!
//! ## Example Usage
//!
//! ```rust
//! use smartshop_core::validation::ProductDraft;
//!
//! let draft = ProductDraft::parse("Widget", "9.99", "3").unwrap();
//! let product = draft.into_product(None);
//!
//! assert!(!product.id.is_empty());
//! assert_eq!(product.quantity, 3);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use types::{generate_product_id, total_stock_value, Product};
pub use validation::ProductDraft;

/// Name of the local table and of the remote collection.
///
/// Both stores use the same schema, so the name is shared as well.
pub const PRODUCTS_COLLECTION: &str = "products";
