//! # Product List State
//!
//! ```text
//!   Loading ──get_all() emits──► Success(products) ──emits──► Success(..)
//!      │                                │
//!      └──────── stream Err ────────────┴──────────► Error(message)
//!                                                    (subscription ends)
//! ```

use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use smartshop_core::Product;
use smartshop_sync::ProductRepository;

use crate::holder::{StateHolder, ViewState};

/// What the product list shows.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductListUiState {
    Loading,
    Success(Vec<Product>),
    Error(String),
}

impl ViewState for ProductListUiState {}

/// Product list view state.
///
/// Subscribes on creation; the subscription ends when this is dropped.
/// After `Error` it does not restart; create a new one to retry.
pub struct ProductListState {
    state: Arc<StateHolder<ProductListUiState>>,
    task: JoinHandle<()>,
}

impl ProductListState {
    /// Creates the state and subscribes to the catalog.
    pub fn new(repository: Arc<dyn ProductRepository>) -> Self {
        let state = Arc::new(StateHolder::new(ProductListUiState::Loading));
        let task = tokio::spawn(follow_products(repository, state.clone()));

        ProductListState { state, task }
    }

    /// Current state.
    pub fn state(&self) -> ProductListUiState {
        self.state.get()
    }

    /// Receiver of the latest state.
    pub fn subscribe(&self) -> watch::Receiver<ProductListUiState> {
        self.state.subscribe()
    }

    /// Receiver of every transition from now on.
    pub fn transitions(&self) -> broadcast::Receiver<ProductListUiState> {
        self.state.transitions()
    }
}

impl Drop for ProductListState {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn follow_products(
    repository: Arc<dyn ProductRepository>,
    state: Arc<StateHolder<ProductListUiState>>,
) {
    let mut products = repository.get_all();

    while let Some(item) = products.next().await {
        match item {
            Ok(products) => {
                state.set(ProductListUiState::Success(products));
            }
            Err(e) => {
                error!(error = %e, "Product list subscription failed");
                state.set(ProductListUiState::Error(e.to_string()));
                return;
            }
        }
    }

    debug!("Product list stream ended");
}
