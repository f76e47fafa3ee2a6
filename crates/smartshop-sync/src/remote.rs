//! # Remote Store
//!
//! The authoritative collection of products, observed as a live stream.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      RemoteStore Contract                               │
//! │                                                                         │
//! │  observe_all()  ──► Ok([..full collection..])   on subscribe           │
//! │                 ──► Ok([..full collection..])   on every remote change │
//! │                 ──► Err(SyncError::Stream)      subscription broken    │
//! │                                                                         │
//! │  save(product)  ──► Ok(())  confirmed: create or overwrite by id       │
//! │                 ──► Err(SyncError::RemoteWrite)  not confirmed         │
//! │                                                                         │
//! │  delete(id)     ──► Ok(())  confirmed                                  │
//! │                 ──► Err(SyncError::RemoteWrite)  not confirmed         │
//! │                                                                         │
//! │  The remote always wins. Other clients may change the collection at   │
//! │  any time; their changes arrive through observe_all().                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A consumer should treat the first `Err` on a subscription as its end and
//! subscribe again.

use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tracing::{debug, info};

use smartshop_core::Product;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// RemoteStore Trait
// =============================================================================

/// The authoritative, remotely hosted product collection.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Full collection now and after every remote change.
    fn observe_all(&self) -> BoxStream<'static, SyncResult<Vec<Product>>>;

    /// Creates or overwrites a product by id.
    async fn save(&self, product: &Product) -> SyncResult<()>;

    /// Removes a product by id.
    async fn delete(&self, id: &str) -> SyncResult<()>;
}

// =============================================================================
// In-Memory Remote
// =============================================================================

/// In-process remote collection.
///
/// Clones share one collection, so a clone can play "another client"
/// writing to the remote while the repository mirrors it.
///
/// ## Failure Injection
/// - [`MemoryRemoteStore::set_available`]`(false)` rejects writes with
///   `RemoteWrite` and new subscriptions with `Stream`
/// - [`MemoryRemoteStore::break_subscriptions`] fails every open
///   subscription once
#[derive(Debug, Clone)]
pub struct MemoryRemoteStore {
    inner: Arc<RemoteInner>,
}

#[derive(Debug)]
struct RemoteInner {
    collection: watch::Sender<BTreeMap<String, Product>>,
    faults: broadcast::Sender<String>,
    available: AtomicBool,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    /// Creates an empty, available remote.
    pub fn new() -> Self {
        let (collection, _) = watch::channel(BTreeMap::new());
        let (faults, _) = broadcast::channel(16);

        MemoryRemoteStore {
            inner: Arc::new(RemoteInner {
                collection,
                faults,
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Creates a remote already holding `products`.
    pub fn seeded(products: impl IntoIterator<Item = Product>) -> Self {
        let remote = Self::new();
        remote.seed(products);
        remote
    }

    /// Adds products as one remote change, regardless of availability.
    pub fn seed(&self, products: impl IntoIterator<Item = Product>) {
        let products: Vec<Product> = products.into_iter().collect();
        let count = products.len();

        self.inner.collection.send_modify(|collection| {
            for product in products {
                collection.insert(product.id.clone(), product);
            }
        });

        info!(count, "Seeded remote collection");
    }

    /// A write made by another client. Ignores availability.
    pub fn external_save(&self, product: Product) {
        debug!(id = %product.id, "External remote save");
        self.put(product);
    }

    /// A delete made by another client. Ignores availability.
    pub fn external_delete(&self, id: &str) {
        debug!(id = %id, "External remote delete");
        self.remove(id);
    }

    /// Simulates losing (or regaining) connectivity.
    pub fn set_available(&self, available: bool) {
        info!(available, "Remote availability changed");
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Returns true if writes and new subscriptions are accepted.
    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Fails every open subscription with `reason`.
    pub fn break_subscriptions(&self, reason: impl Into<String>) {
        let reason = reason.into();
        info!(reason = %reason, "Breaking remote subscriptions");
        // No subscribers is fine
        let _ = self.inner.faults.send(reason);
    }

    /// Current collection, ordered by id.
    pub fn products(&self) -> Vec<Product> {
        self.inner.collection.borrow().values().cloned().collect()
    }

    /// Gets a product by id.
    pub fn get(&self, id: &str) -> Option<Product> {
        self.inner.collection.borrow().get(id).cloned()
    }

    /// Number of products in the collection.
    pub fn len(&self) -> usize {
        self.inner.collection.borrow().len()
    }

    /// Returns true if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.collection.receiver_count()
    }

    fn put(&self, product: Product) {
        self.inner.collection.send_if_modified(|collection| {
            if collection.get(&product.id) == Some(&product) {
                return false;
            }
            collection.insert(product.id.clone(), product);
            true
        });
    }

    fn remove(&self, id: &str) {
        self.inner
            .collection
            .send_if_modified(|collection| collection.remove(id).is_some());
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    fn observe_all(&self) -> BoxStream<'static, SyncResult<Vec<Product>>> {
        if !self.is_available() {
            return stream::once(future::ready(Err(SyncError::Stream(
                "remote store unavailable".to_string(),
            ))))
            .boxed();
        }

        let changes = WatchStream::new(self.inner.collection.subscribe())
            .map(|collection| Ok(collection.into_values().collect::<Vec<_>>()));

        let faults = BroadcastStream::new(self.inner.faults.subscribe()).filter_map(|fault| {
            future::ready(fault.ok().map(|reason| Err(SyncError::Stream(reason))))
        });

        stream::select(changes, faults).boxed()
    }

    async fn save(&self, product: &Product) -> SyncResult<()> {
        if !self.is_available() {
            return Err(SyncError::remote_write(
                "save",
                &product.id,
                "remote store unavailable",
            ));
        }

        self.put(product.clone());
        debug!(id = %product.id, "Remote save confirmed");
        Ok(())
    }

    async fn delete(&self, id: &str) -> SyncResult<()> {
        if !self.is_available() {
            return Err(SyncError::remote_write(
                "delete",
                id,
                "remote store unavailable",
            ));
        }

        self.remove(id);
        debug!(id = %id, "Remote delete confirmed");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn next(
        stream: &mut BoxStream<'static, SyncResult<Vec<Product>>>,
    ) -> SyncResult<Vec<Product>> {
        timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("stream did not emit")
            .expect("stream ended")
    }

    #[tokio::test]
    async fn test_observe_emits_full_collection() {
        let remote = MemoryRemoteStore::seeded([Product::new("a", "Apple", 1.0, 1)]);
        let mut all = remote.observe_all();

        assert_eq!(next(&mut all).await.unwrap().len(), 1);

        remote.save(&Product::new("b", "Banana", 2.0, 2)).await.unwrap();
        let products = next(&mut all).await.unwrap();
        assert_eq!(products.len(), 2);

        remote.delete("a").await.unwrap();
        let products = next(&mut all).await.unwrap();
        assert_eq!(products, vec![Product::new("b", "Banana", 2.0, 2)]);
    }

    #[tokio::test]
    async fn test_subscriber_count_follows_streams() {
        let remote = MemoryRemoteStore::new();
        assert_eq!(remote.subscriber_count(), 0);

        let first = remote.observe_all();
        let second = remote.observe_all();
        assert_eq!(remote.subscriber_count(), 2);

        drop(first);
        assert_eq!(remote.subscriber_count(), 1);
        drop(second);
        assert_eq!(remote.subscriber_count(), 0);

        // A refused subscription holds nothing open
        remote.set_available(false);
        let _refused = remote.observe_all();
        assert_eq!(remote.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_rejects_writes() {
        let remote = MemoryRemoteStore::new();
        remote.set_available(false);

        let err = remote
            .save(&Product::new("a", "Apple", 1.0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteWrite { .. }));

        let err = remote.delete("a").await.unwrap_err();
        assert!(matches!(err, SyncError::RemoteWrite { .. }));
        assert!(remote.is_empty());

        let mut all = remote.observe_all();
        assert!(matches!(next(&mut all).await, Err(SyncError::Stream(_))));
    }

    #[tokio::test]
    async fn test_break_subscriptions() {
        let remote = MemoryRemoteStore::new();
        let mut all = remote.observe_all();
        assert!(next(&mut all).await.unwrap().is_empty());

        remote.break_subscriptions("connection reset");
        assert!(matches!(next(&mut all).await, Err(SyncError::Stream(_))));
    }

    #[tokio::test]
    async fn test_external_writes_ignore_availability() {
        let remote = MemoryRemoteStore::new();
        remote.set_available(false);

        remote.external_save(Product::new("x", "External", 1.0, 1));
        assert_eq!(remote.get("x").map(|p| p.name), Some("External".to_string()));

        remote.external_delete("x");
        assert!(remote.get("x").is_none());
    }
}
