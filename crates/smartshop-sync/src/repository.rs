//! # Sync Repository
//!
//! The single source of truth for view states: reads come from the local
//! cache, writes go to the remote first.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      save(product) / delete(product)                    │
//! │                                                                         │
//! │  1. RemoteStore.save / delete                                          │
//! │       │                                                                 │
//! │       ├── Err ──► SyncError::RemoteWrite returned, local untouched     │
//! │       │                                                                 │
//! │       ▼ Ok                                                              │
//! │  2. ProductStore.upsert / delete                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  live queries re-emit ──► view states                                  │
//! │                                                                         │
//! │  Meanwhile the mirror receives the remote echo of the same write and   │
//! │  upserts it again; the identical upsert produces no emission.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two steps, not a transaction. Nothing is retried here. Writes hold the
//! write gate shared with the mirror, so a mirror snapshot is never
//! applied between the remote and the local step.

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use smartshop_core::Product;
use smartshop_db::{DbError, ProductStore};

use crate::config::MirrorSettings;
use crate::error::{SyncError, SyncResult};
use crate::mirror::{Mirror, MirrorHandle, MirrorStatus};
use crate::remote::RemoteStore;

// =============================================================================
// Repository Contract
// =============================================================================

/// Everything a view state may ask of the catalog.
///
/// Streams start with the current value and stay open; an `Err` item ends
/// the subscription for the consumer.
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// All products, ordered by name.
    fn get_all(&self) -> BoxStream<'static, SyncResult<Vec<Product>>>;

    /// One product, or `None` while it doesn't exist.
    fn get_by_id(&self, id: &str) -> BoxStream<'static, SyncResult<Option<Product>>>;

    /// Saves remotely, then locally.
    async fn save(&self, product: &Product) -> SyncResult<()>;

    /// Deletes remotely, then locally.
    async fn delete(&self, product: &Product) -> SyncResult<()>;

    /// Number of products.
    fn get_total_count(&self) -> BoxStream<'static, SyncResult<i64>>;

    /// Sum of `price * quantity` over all products.
    fn get_total_value(&self) -> BoxStream<'static, SyncResult<f64>>;
}

// =============================================================================
// Sync Repository
// =============================================================================

/// Repository that mirrors a remote store into the local cache.
///
/// ## Usage
/// ```rust,ignore
/// let repo = SyncRepository::start(db.products(), remote, config.mirror.clone());
///
/// repo.save(&product).await?;
/// let mut products = repo.get_all();
///
/// repo.shutdown().await;
/// ```
pub struct SyncRepository {
    local: ProductStore,
    remote: Arc<dyn RemoteStore>,
    mirror: MirrorHandle,
    write_gate: Arc<Mutex<()>>,
}

impl std::fmt::Debug for SyncRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncRepository")
            .field("local", &self.local)
            .field("mirror", &self.mirror.status())
            .finish()
    }
}

impl SyncRepository {
    /// Creates the repository and starts its mirror task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        local: ProductStore,
        remote: Arc<dyn RemoteStore>,
        settings: MirrorSettings,
    ) -> Self {
        info!("Starting sync repository");
        let write_gate = Arc::new(Mutex::new(()));
        let mirror = Mirror::spawn(local.clone(), remote.clone(), settings, write_gate.clone());

        SyncRepository {
            local,
            remote,
            mirror,
            write_gate,
        }
    }

    /// Returns the current mirror status.
    pub fn mirror_status(&self) -> MirrorStatus {
        self.mirror.status()
    }

    /// Returns a receiver that sees every mirror status change.
    pub fn watch_mirror_status(&self) -> watch::Receiver<MirrorStatus> {
        self.mirror.watch_status()
    }

    /// Returns the local cache.
    pub fn local(&self) -> &ProductStore {
        &self.local
    }

    /// Stops the mirror task. Reads and writes keep working afterwards,
    /// but remote changes are no longer mirrored.
    pub async fn shutdown(&self) {
        info!("Shutting down sync repository");
        self.mirror.shutdown().await;
    }
}

fn stream_error(err: DbError) -> SyncError {
    SyncError::Stream(err.to_string())
}

#[async_trait]
impl ProductRepository for SyncRepository {
    fn get_all(&self) -> BoxStream<'static, SyncResult<Vec<Product>>> {
        self.local
            .observe_all()
            .map(|item| item.map_err(stream_error))
            .boxed()
    }

    fn get_by_id(&self, id: &str) -> BoxStream<'static, SyncResult<Option<Product>>> {
        self.local
            .observe_by_id(id)
            .map(|item| item.map_err(stream_error))
            .boxed()
    }

    async fn save(&self, product: &Product) -> SyncResult<()> {
        // Invalid records never reach either store
        product.check_invariants()?;

        let _gate = self.write_gate.lock().await;

        self.remote.save(product).await.map_err(|e| {
            warn!(id = %product.id, error = %e, "Remote save failed");
            e
        })?;

        if let Err(e) = self.local.upsert(product).await {
            // The remote has it; the mirror echo will retry the local copy
            warn!(id = %product.id, error = %e, "Local upsert failed after remote save");
            return Err(e.into());
        }

        debug!(id = %product.id, "Saved product");
        Ok(())
    }

    async fn delete(&self, product: &Product) -> SyncResult<()> {
        let _gate = self.write_gate.lock().await;

        self.remote.delete(&product.id).await.map_err(|e| {
            warn!(id = %product.id, error = %e, "Remote delete failed");
            e
        })?;

        self.local.delete(product).await.map_err(|e| {
            warn!(id = %product.id, error = %e, "Local delete failed after remote delete");
            SyncError::from(e)
        })?;

        debug!(id = %product.id, "Deleted product");
        Ok(())
    }

    fn get_total_count(&self) -> BoxStream<'static, SyncResult<i64>> {
        self.local
            .observe_count()
            .map(|item| item.map_err(stream_error))
            .boxed()
    }

    fn get_total_value(&self) -> BoxStream<'static, SyncResult<f64>> {
        self.local
            .observe_total_value()
            .map(|item| item.map_err(stream_error))
            .boxed()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::remote::MemoryRemoteStore;
    use futures_util::stream;
    use smartshop_db::{Database, DbConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(3);

    fn fast_settings() -> MirrorSettings {
        MirrorSettings {
            initial_backoff_ms: 10,
            max_backoff_secs: 1,
            prune_remote_deletions: false,
        }
    }

    async fn setup(settings: MirrorSettings) -> (SyncRepository, MemoryRemoteStore) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let remote = MemoryRemoteStore::new();
        let repo = SyncRepository::start(db.products(), Arc::new(remote.clone()), settings);
        (repo, remote)
    }

    /// Waits until `stream` emits a value matching `pred`.
    async fn wait_for<T, F>(stream: &mut BoxStream<'static, SyncResult<T>>, pred: F) -> T
    where
        F: Fn(&T) -> bool,
    {
        timeout(WAIT, async {
            loop {
                let value = stream
                    .next()
                    .await
                    .expect("stream ended")
                    .expect("stream failed");
                if pred(&value) {
                    return value;
                }
            }
        })
        .await
        .expect("expected value never arrived")
    }

    fn widget() -> Product {
        Product::new("p1", "Widget", 9.99, 3)
    }

    #[tokio::test]
    async fn test_save_round_trip() {
        let (repo, remote) = setup(fast_settings()).await;

        repo.save(&widget()).await.unwrap();

        let mut by_id = repo.get_by_id("p1");
        let found = wait_for(&mut by_id, |p| p.is_some()).await;
        assert_eq!(found, Some(widget()));
        assert_eq!(remote.get("p1"), Some(widget()));

        repo.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_round_trip() {
        let (repo, remote) = setup(fast_settings()).await;
        repo.save(&widget()).await.unwrap();

        repo.delete(&widget()).await.unwrap();

        let mut by_id = repo.get_by_id("p1");
        wait_for(&mut by_id, |p| p.is_none()).await;
        assert!(remote.get("p1").is_none());

        repo.shutdown().await;
    }

    #[tokio::test]
    async fn test_delete_right_after_save_stays_deleted() {
        let (repo, _remote) = setup(fast_settings()).await;

        for round in 0..20 {
            let product = Product::new(format!("r{round}"), "Widget", 9.99, 3);
            repo.save(&product).await.unwrap();
            repo.delete(&product).await.unwrap();
        }

        // Let the mirror drain whatever snapshots it still holds
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(repo.local().count().await.unwrap(), 0);

        repo.shutdown().await;
    }

    #[tokio::test]
    async fn test_remote_failure_leaves_local_unchanged() {
        let (repo, remote) = setup(fast_settings()).await;
        repo.save(&widget()).await.unwrap();

        remote.set_available(false);

        let mut changed = widget();
        changed.quantity = 99;
        let err = repo.save(&changed).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteWrite);

        let err = repo.delete(&widget()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteWrite);

        assert_eq!(repo.local().get_by_id("p1").await.unwrap(), Some(widget()));

        repo.shutdown().await;
    }

    #[tokio::test]
    async fn test_invalid_record_touches_no_store() {
        let (repo, remote) = setup(fast_settings()).await;

        let err = repo
            .save(&Product::new("p1", "Widget", 0.0, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(remote.is_empty());
        assert_eq!(repo.local().count().await.unwrap(), 0);

        repo.shutdown().await;
    }

    #[tokio::test]
    async fn test_external_remote_addition_is_mirrored() {
        let (repo, remote) = setup(fast_settings()).await;
        let mut by_id = repo.get_by_id("x");

        remote.external_save(Product::new("x", "From elsewhere", 4.0, 2));

        let mirrored = wait_for(&mut by_id, |p| p.is_some()).await;
        assert_eq!(mirrored.map(|p| p.name), Some("From elsewhere".to_string()));

        let status = repo.mirror_status();
        assert!(status.running);
        assert!(status.snapshots_applied >= 1);
        assert!(status.last_synced_at.is_some());

        repo.shutdown().await;
    }

    #[tokio::test]
    async fn test_mirror_is_upsert_only_by_default() {
        let (repo, remote) = setup(fast_settings()).await;
        remote.external_save(Product::new("x", "Gone soon", 1.0, 1));

        let mut all = repo.get_all();
        wait_for(&mut all, |products| products.len() == 1).await;

        let mut status = repo.watch_mirror_status();
        let applied = status.borrow().snapshots_applied;
        remote.external_delete("x");
        timeout(WAIT, status.wait_for(|s| s.snapshots_applied > applied))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(repo.local().count().await.unwrap(), 1);

        repo.shutdown().await;
    }

    #[tokio::test]
    async fn test_mirror_prunes_when_enabled() {
        let settings = MirrorSettings {
            prune_remote_deletions: true,
            ..fast_settings()
        };
        let (repo, remote) = setup(settings).await;
        remote.external_save(Product::new("x", "Gone soon", 1.0, 1));

        let mut by_id = repo.get_by_id("x");
        wait_for(&mut by_id, |p| p.is_some()).await;

        remote.external_delete("x");
        wait_for(&mut by_id, |p| p.is_none()).await;
        assert!(repo.mirror_status().pruned >= 1);

        repo.shutdown().await;
    }

    #[tokio::test]
    async fn test_mirror_resubscribes_after_stream_failure() {
        let (repo, remote) = setup(fast_settings()).await;
        let mut status = repo.watch_mirror_status();
        timeout(WAIT, status.wait_for(|s| s.snapshots_applied >= 1))
            .await
            .unwrap()
            .unwrap();

        remote.set_available(false);
        remote.break_subscriptions("connection reset");
        timeout(WAIT, status.wait_for(|s| s.resubscriptions >= 1 && !s.subscribed))
            .await
            .unwrap()
            .unwrap();
        assert!(status.borrow().last_error.is_some());

        remote.set_available(true);
        remote.external_save(Product::new("x", "After reconnect", 1.0, 1));

        let mut by_id = repo.get_by_id("x");
        wait_for(&mut by_id, |p| p.is_some()).await;

        repo.shutdown().await;
    }

    /// Remote whose subscriptions end after one snapshot, counting them.
    struct OneShotRemote {
        subscriptions: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RemoteStore for OneShotRemote {
        fn observe_all(&self) -> BoxStream<'static, SyncResult<Vec<Product>>> {
            let n = self.subscriptions.fetch_add(1, Ordering::SeqCst);
            let product = Product::new(format!("p{n}"), format!("Product {n}"), 1.0, 1);
            stream::iter(vec![Ok(vec![product])]).boxed()
        }

        async fn save(&self, _product: &Product) -> SyncResult<()> {
            Ok(())
        }

        async fn delete(&self, _id: &str) -> SyncResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_mirror_resubscribes_after_stream_end() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let subscriptions = Arc::new(AtomicUsize::new(0));
        let remote = OneShotRemote {
            subscriptions: subscriptions.clone(),
        };
        let repo = SyncRepository::start(db.products(), Arc::new(remote), fast_settings());

        let mut count = repo.get_total_count();
        wait_for(&mut count, |n| *n >= 3).await;
        assert!(subscriptions.load(Ordering::SeqCst) >= 3);

        repo.shutdown().await;
        assert!(!repo.mirror_status().running);
    }

    /// Remote whose subscriptions deliver one snapshot and then fail.
    struct ResettingRemote;

    #[async_trait]
    impl RemoteStore for ResettingRemote {
        fn observe_all(&self) -> BoxStream<'static, SyncResult<Vec<Product>>> {
            stream::iter(vec![
                Ok(vec![Product::new("x", "Last words", 2.0, 5)]),
                Err(SyncError::Stream("connection reset".to_string())),
            ])
            .boxed()
        }

        async fn save(&self, _product: &Product) -> SyncResult<()> {
            Ok(())
        }

        async fn delete(&self, _id: &str) -> SyncResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_snapshot_before_stream_failure_is_applied() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = SyncRepository::start(db.products(), Arc::new(ResettingRemote), fast_settings());

        let mut by_id = repo.get_by_id("x");
        let found = wait_for(&mut by_id, |p| p.is_some()).await;
        assert_eq!(found, Some(Product::new("x", "Last words", 2.0, 5)));
        assert_eq!(repo.local().count().await.unwrap(), 1);

        let mut status = repo.watch_mirror_status();
        timeout(WAIT, status.wait_for(|s| s.snapshots_applied >= 1 && s.last_error.is_some()))
            .await
            .unwrap()
            .unwrap();

        repo.shutdown().await;
    }

    #[tokio::test]
    async fn test_totals_match_all() {
        let (repo, _remote) = setup(fast_settings()).await;

        let mut count = repo.get_total_count();
        let mut value = repo.get_total_value();
        assert_eq!(wait_for(&mut count, |_| true).await, 0);
        assert_eq!(wait_for(&mut value, |_| true).await, 0.0);

        repo.save(&Product::new("a", "A", 2.5, 4)).await.unwrap();
        repo.save(&Product::new("b", "B", 1.0, 3)).await.unwrap();

        let mut all = repo.get_all();
        let products = wait_for(&mut all, |p| p.len() == 2).await;
        let expected: f64 = products.iter().map(Product::stock_value).sum();

        wait_for(&mut count, |n| *n == products.len() as i64).await;
        wait_for(&mut value, |v| (v - expected).abs() < 1e-9).await;

        repo.shutdown().await;
    }
}
