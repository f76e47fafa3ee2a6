//! # Product Detail State
//!
//! Edit-or-create form for one product.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Product Detail States                              │
//! │                                                                         │
//! │  new(Some(id)):  Loading ──get_by_id emits──► Success(Some | None)     │
//! │  new(None):      Success(None)                                          │
//! │                                                                         │
//! │  save(name, price, qty)                                                │
//! │    ├── invalid input ──► Error(msg) ──► back to the settled state      │
//! │    ├── repository Err ─► Error(msg) ──► back to the settled state      │
//! │    └── saved ──────────► Finished                                      │
//! │                                                                         │
//! │  delete()                                                              │
//! │    ├── not Success(Some) ──► Error("Could not delete ... not found.")  │
//! │    ├── repository Err ─────► Error(msg) ──► back to the settled state  │
//! │    └── deleted ────────────► Finished                                  │
//! │                                                                         │
//! │  Finished is terminal: nothing moves the state out of it.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! "Settled" is the last `Loading` / `Success` state, i.e. what the form
//! showed before the failed action.

use futures_util::stream::{BoxStream, StreamExt};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use smartshop_core::{CoreError, Product, ProductDraft};
use smartshop_sync::{ProductRepository, SyncResult};

use crate::holder::{StateHolder, ViewState};

/// Shown for any input that fails validation.
pub const INVALID_INPUT_MESSAGE: &str = "Invalid input. Please check all fields.";

/// What the product detail shows.
#[derive(Debug, Clone, PartialEq)]
pub enum ProductDetailUiState {
    Loading,
    /// `None` for a product that does not exist (yet).
    Success(Option<Product>),
    Error(String),
    /// The product was saved or deleted; leave the form.
    Finished,
}

impl ViewState for ProductDetailUiState {
    fn is_terminal(&self) -> bool {
        matches!(self, ProductDetailUiState::Finished)
    }
}

struct DetailShared {
    holder: StateHolder<ProductDetailUiState>,
    settled: StdMutex<ProductDetailUiState>,
}

impl DetailShared {
    fn settle(&self, state: ProductDetailUiState) {
        *self.settled.lock().unwrap_or_else(|e| e.into_inner()) = state.clone();
        self.holder.set(state);
    }

    fn settled(&self) -> ProductDetailUiState {
        self.settled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Shows `message`, then returns to the settled state.
    fn flash_error(&self, message: String) {
        self.holder.set(ProductDetailUiState::Error(message));
        self.holder.set(self.settled());
    }
}

/// Product detail view state.
pub struct ProductDetailState {
    repository: Arc<dyn ProductRepository>,
    product_id: Option<String>,
    shared: Arc<DetailShared>,
    task: StdMutex<Option<JoinHandle<()>>>,
    /// One save/delete at a time.
    action: Mutex<()>,
}

impl ProductDetailState {
    /// Opens the detail for `product_id`, or an empty form when `None`.
    pub fn new(repository: Arc<dyn ProductRepository>, product_id: Option<String>) -> Self {
        let initial = match product_id {
            Some(_) => ProductDetailUiState::Loading,
            None => ProductDetailUiState::Success(None),
        };

        let shared = Arc::new(DetailShared {
            holder: StateHolder::new(initial.clone()),
            settled: StdMutex::new(initial),
        });

        let task = product_id.as_ref().map(|id| {
            tokio::spawn(follow_product(
                repository.get_by_id(id),
                id.clone(),
                shared.clone(),
            ))
        });

        ProductDetailState {
            repository,
            product_id,
            shared,
            task: StdMutex::new(task),
            action: Mutex::new(()),
        }
    }

    /// Current state.
    pub fn state(&self) -> ProductDetailUiState {
        self.shared.holder.get()
    }

    /// Receiver of the latest state.
    pub fn subscribe(&self) -> watch::Receiver<ProductDetailUiState> {
        self.shared.holder.subscribe()
    }

    /// Receiver of every transition from now on.
    pub fn transitions(&self) -> broadcast::Receiver<ProductDetailUiState> {
        self.shared.holder.transitions()
    }

    /// Validates the form and saves the product.
    ///
    /// Reuses the product's id, or generates one for a new product.
    ///
    /// ## Returns
    /// * `Ok(product)` - Saved; state is `Finished`
    /// * `Err(message)` - The message shown in the `Error` state
    pub async fn save(
        &self,
        name: &str,
        price_text: &str,
        quantity_text: &str,
    ) -> Result<Product, String> {
        let _action = self.action.lock().await;

        if self.is_finished() {
            return Err("Product form is already closed.".to_string());
        }

        let draft = match ProductDraft::parse(name, price_text, quantity_text) {
            Ok(draft) => draft,
            Err(e) => {
                debug!(error = %e, "Rejected product input");
                self.shared.flash_error(INVALID_INPUT_MESSAGE.to_string());
                return Err(INVALID_INPUT_MESSAGE.to_string());
            }
        };

        let existing_id = match self.shared.settled() {
            ProductDetailUiState::Success(Some(product)) => Some(product.id),
            _ => self.product_id.clone(),
        };
        let product = draft.into_product(existing_id.as_deref());

        match self.repository.save(&product).await {
            Ok(()) => {
                info!(id = %product.id, "Product saved");
                self.finish();
                Ok(product)
            }
            Err(e) => {
                warn!(id = %product.id, kind = %e.kind(), error = %e, "Product save failed");
                let message = format!("Could not save product. {e}");
                self.shared.flash_error(message.clone());
                Err(message)
            }
        }
    }

    /// Deletes the loaded product.
    ///
    /// ## Returns
    /// * `Ok(product)` - Deleted; state is `Finished`
    /// * `Err(message)` - The message shown in the `Error` state
    pub async fn delete(&self) -> Result<Product, String> {
        let _action = self.action.lock().await;

        if self.is_finished() {
            return Err("Product form is already closed.".to_string());
        }

        let product = match self.shared.settled() {
            ProductDetailUiState::Success(Some(product)) => product,
            _ => {
                let message = CoreError::NothingToDelete.to_string();
                self.shared.holder.set(ProductDetailUiState::Error(message.clone()));
                return Err(message);
            }
        };

        match self.repository.delete(&product).await {
            Ok(()) => {
                info!(id = %product.id, "Product deleted");
                self.finish();
                Ok(product)
            }
            Err(e) => {
                warn!(id = %product.id, kind = %e.kind(), error = %e, "Product delete failed");
                let message = format!("Could not delete product. {e}");
                self.shared.flash_error(message.clone());
                Err(message)
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.shared.holder.get().is_terminal()
    }

    fn finish(&self) {
        self.stop_subscription();
        self.shared.holder.set(ProductDetailUiState::Finished);
    }

    fn stop_subscription(&self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

impl Drop for ProductDetailState {
    fn drop(&mut self) {
        self.stop_subscription();
    }
}

async fn follow_product(
    mut product: BoxStream<'static, SyncResult<Option<Product>>>,
    id: String,
    shared: Arc<DetailShared>,
) {
    while let Some(item) = product.next().await {
        match item {
            Ok(found) => shared.settle(ProductDetailUiState::Success(found)),
            Err(e) => {
                error!(id = %id, error = %e, "Product subscription failed");
                shared.holder.set(ProductDetailUiState::Error(e.to_string()));
                return;
            }
        }
    }
}
