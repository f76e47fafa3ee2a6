//! # Domain Types
//!
//! The catalog record shared by every layer of SmartShop.
//!
//! ## Record Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Product                                      │
//! │                                                                         │
//! │   id        String   UUID v4, assigned at first save, never before     │
//! │   name      String   non-blank display name (catalog sort key)         │
//! │   price     f64      finite, > 0                                        │
//! │   quantity  i64      units in stock, >= 0                               │
//! │                                                                         │
//! │   Same four fields in the local `products` table and in the remote     │
//! │   `products` collection. `id` is the only identity key.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Product
// =============================================================================

/// An inventory item in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Unit price.
    pub price: f64,

    /// Units in stock.
    pub quantity: i64,
}

impl Product {
    /// Creates a product with an existing id.
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: f64, quantity: i64) -> Self {
        Product {
            id: id.into(),
            name: name.into(),
            price,
            quantity,
        }
    }

    /// Value of the units in stock (`price * quantity`).
    #[inline]
    pub fn stock_value(&self) -> f64 {
        self.price * self.quantity as f64
    }

    /// Checks the data model invariants.
    ///
    /// Stores only ever hold records that pass this check. User input is
    /// rejected earlier by [`crate::validation::ProductDraft::parse`]; this
    /// guards records built in code.
    pub fn check_invariants(&self) -> CoreResult<()> {
        let reason = if self.id.trim().is_empty() {
            "id is empty"
        } else if self.name.trim().is_empty() {
            "name is blank"
        } else if !self.price.is_finite() || self.price <= 0.0 {
            "price must be finite and greater than zero"
        } else if self.quantity < 0 {
            "quantity is negative"
        } else {
            return Ok(());
        };

        Err(CoreError::InvalidProduct {
            id: self.id.clone(),
            reason: reason.to_string(),
        })
    }
}

/// Generates a fresh product id (UUID v4, hyphenated).
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

/// Sum of `price * quantity` over a set of products. 0.0 when empty.
pub fn total_stock_value<'a>(products: impl IntoIterator<Item = &'a Product>) -> f64 {
    products.into_iter().map(Product::stock_value).sum()
}

// =============================================================================
// Unit Tests
// =============================================================================
