//! Shared fixtures for view state tests.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;

use smartshop_core::Product;
use smartshop_db::{Database, DbConfig};
use smartshop_sync::{
    MemoryRemoteStore, MirrorSettings, ProductRepository, SyncError, SyncRepository, SyncResult,
};

/// A repository over a fresh in-memory database and remote.
pub async fn in_memory_repository() -> (Arc<SyncRepository>, MemoryRemoteStore) {
    let db = Database::new(DbConfig::in_memory())
        .await
        .expect("in-memory database");
    let remote = MemoryRemoteStore::new();
    let settings = MirrorSettings {
        initial_backoff_ms: 10,
        max_backoff_secs: 1,
        prune_remote_deletions: false,
    };
    let repo = SyncRepository::start(db.products(), Arc::new(remote.clone()), settings);
    (Arc::new(repo), remote)
}

/// Every stream fails immediately; every write is rejected.
pub struct FailingRepository;

fn failing<T: Send + 'static>() -> BoxStream<'static, SyncResult<T>> {
    stream::once(async { Err(SyncError::Stream("connection lost".to_string())) }).boxed()
}

#[async_trait]
impl ProductRepository for FailingRepository {
    fn get_all(&self) -> BoxStream<'static, SyncResult<Vec<Product>>> {
        failing()
    }

    fn get_by_id(&self, _id: &str) -> BoxStream<'static, SyncResult<Option<Product>>> {
        failing()
    }

    async fn save(&self, product: &Product) -> SyncResult<()> {
        Err(SyncError::remote_write("save", &product.id, "remote unavailable"))
    }

    async fn delete(&self, product: &Product) -> SyncResult<()> {
        Err(SyncError::remote_write("delete", &product.id, "remote unavailable"))
    }

    fn get_total_count(&self) -> BoxStream<'static, SyncResult<i64>> {
        failing()
    }

    fn get_total_value(&self) -> BoxStream<'static, SyncResult<f64>> {
        failing()
    }
}
