//! # smartshop-views: View States for SmartShop
//!
//! UI-ready state machines over the [`ProductRepository`] contract.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          View Layer                                     │
//! │                                                                         │
//! │   ┌──────────────────┐  ┌────────────────────┐  ┌──────────────────┐  │
//! │   │ ProductListState │  │ ProductDetailState │  │  DashboardState  │  │
//! │   │  StateHolder     │  │  StateHolder       │  │  RetainedValue×2 │  │
//! │   └────────┬─────────┘  └─────────┬──────────┘  └────────┬─────────┘  │
//! │            │ get_all()            │ get_by_id()           │ totals     │
//! │            │                      │ save() / delete()     │            │
//! │            ▼                      ▼                       ▼            │
//! │   ┌─────────────────────────────────────────────────────────────────┐ │
//! │   │              Arc<dyn ProductRepository>                         │ │
//! │   └─────────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Lifetimes
//! Every view state owns its background subscription task and aborts it
//! when dropped. Consumers read state through `watch` receivers (latest
//! value) or `broadcast` receivers (every transition).
//!
//! [`ProductRepository`]: smartshop_sync::ProductRepository

pub mod dashboard;
pub mod detail;
pub mod holder;
pub mod list;
pub mod retained;

#[cfg(test)]
mod testing;

pub use dashboard::DashboardState;
pub use detail::{ProductDetailState, ProductDetailUiState, INVALID_INPUT_MESSAGE};
pub use holder::{StateHolder, ViewState};
pub use list::{ProductListState, ProductListUiState};
pub use retained::RetainedValue;
