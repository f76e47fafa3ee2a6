//! # Product Store
//!
//! The local cache of the catalog: one `products` table plus live queries
//! over it.
//!
//! ## Live Queries
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    How Live Queries Work                                │
//! │                                                                         │
//! │  upsert / upsert_all / delete / retain_only                            │
//! │       │                                                                 │
//! │       ▼  (write_lock held)                                              │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │ 1. write committed to SQLite            │                           │
//! │  │ 2. snapshot reloaded in one read tx     │                           │
//! │  │    products ORDER BY name, COUNT, SUM   │                           │
//! │  │ 3. published on the watch channel,      │                           │
//! │  │    only if it differs from the last     │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  watch::Sender<snapshot> ──► observe_all()          Vec<Product>       │
//! │                          ├─► observe_by_id(id)      Option<Product>    │
//! │                          ├─► observe_count()        i64                │
//! │                          └─► observe_total_value()  f64                │
//! │                                                                         │
//! │  Every stream starts with the current value, then re-emits after each  │
//! │  mutation that changes what it projects. Readers only ever see whole   │
//! │  snapshots, never a half-applied write.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future;
use futures_util::stream::{BoxStream, Stream, StreamExt};
use sqlx::SqlitePool;
use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use smartshop_core::Product;

const UPSERT_SQL: &str = r#"
    INSERT INTO products (id, name, price, quantity)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT (id) DO UPDATE SET
        name = excluded.name,
        price = excluded.price,
        quantity = excluded.quantity
"#;

const SELECT_ALL_SQL: &str = "SELECT id, name, price, quantity FROM products ORDER BY name, id";

// =============================================================================
// Catalog Snapshot
// =============================================================================

/// The whole table at one point in time, with its aggregates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CatalogSnapshot {
    /// All products, ordered by name ascending.
    pub products: Vec<Product>,

    /// Number of products.
    pub count: i64,

    /// Sum of `price * quantity`; 0.0 for an empty table.
    pub total_value: f64,
}

/// What the live queries see: the last snapshot or the last refresh failure.
type LiveState = Result<Arc<CatalogSnapshot>, String>;

// =============================================================================
// Product Store
// =============================================================================

/// Durable local cache of products with live queries.
///
/// Cloning is cheap; all clones share the same table, write lock and
/// live snapshot.
///
/// ## Usage
/// ```rust,ignore
/// let store = db.products();
///
/// let mut all = store.observe_all();
/// store.upsert(&product).await?;
///
/// while let Some(products) = all.next().await {
///     println!("{} products", products?.len());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ProductStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    pool: SqlitePool,

    /// Serializes writes against snapshot reloads.
    write_lock: Mutex<()>,

    live: watch::Sender<LiveState>,
}

impl ProductStore {
    /// Creates a store over an existing pool.
    ///
    /// The live snapshot starts empty; call [`ProductStore::refresh`] once
    /// the schema exists to load the current rows.
    pub fn new(pool: SqlitePool) -> Self {
        let (live, _) = watch::channel(Ok(Arc::new(CatalogSnapshot::default())));

        ProductStore {
            inner: Arc::new(StoreInner {
                pool,
                write_lock: Mutex::new(()),
                live,
            }),
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a product, or fully replaces the one with the same id.
    ///
    /// Re-applying an identical product writes the same row and produces
    /// no new emission on any live query.
    pub async fn upsert(&self, product: &Product) -> DbResult<()> {
        check_record(product)?;

        let _guard = self.inner.write_lock.lock().await;

        bind_product(sqlx::query(UPSERT_SQL), product)
            .execute(&self.inner.pool)
            .await?;

        debug!(id = %product.id, name = %product.name, "Upserted product");

        self.publish_locked().await;
        Ok(())
    }

    /// Upserts a batch in one transaction.
    ///
    /// The batch is rejected as a whole if any record is invalid. Live
    /// queries see the batch as a single change.
    ///
    /// ## Returns
    /// Number of records written.
    pub async fn upsert_all(&self, products: &[Product]) -> DbResult<usize> {
        for product in products {
            check_record(product)?;
        }

        let _guard = self.inner.write_lock.lock().await;

        let mut tx = self.inner.pool.begin().await?;
        for product in products {
            bind_product(sqlx::query(UPSERT_SQL), product)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(count = products.len(), "Upserted product batch");

        self.publish_locked().await;
        Ok(products.len())
    }

    /// Removes a product by its id. Deleting a missing id is a no-op.
    pub async fn delete(&self, product: &Product) -> DbResult<bool> {
        self.delete_by_id(&product.id).await
    }

    /// Removes a product by id.
    ///
    /// ## Returns
    /// * `true` - A row was removed
    /// * `false` - No row had that id
    pub async fn delete_by_id(&self, id: &str) -> DbResult<bool> {
        let _guard = self.inner.write_lock.lock().await;

        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.inner.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        debug!(id = %id, removed, "Deleted product");

        if removed {
            self.publish_locked().await;
        }
        Ok(removed)
    }

    /// Removes every product whose id is not in `keep`.
    ///
    /// ## Returns
    /// Number of products removed.
    pub async fn retain_only(&self, keep: &HashSet<String>) -> DbResult<usize> {
        let _guard = self.inner.write_lock.lock().await;

        let mut tx = self.inner.pool.begin().await?;

        let ids: Vec<String> = sqlx::query_scalar("SELECT id FROM products")
            .fetch_all(&mut *tx)
            .await?;

        let mut removed = 0;
        for id in ids.iter().filter(|id| !keep.contains(*id)) {
            sqlx::query("DELETE FROM products WHERE id = ?1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            removed += 1;
        }
        tx.commit().await?;

        if removed > 0 {
            info!(removed, "Pruned products absent from the kept set");
            self.publish_locked().await;
        }
        Ok(removed)
    }

    /// Reloads the live snapshot from the table.
    ///
    /// ## When To Call
    /// - After migrations, so live queries start from the stored rows
    /// - After another process wrote to the same database file
    pub async fn refresh(&self) -> DbResult<()> {
        let _guard = self.inner.write_lock.lock().await;

        let snapshot = self.load_snapshot().await;
        let result = match &snapshot {
            Ok(_) => Ok(()),
            Err(e) => Err(DbError::LiveQuery(e.to_string())),
        };
        self.publish(snapshot);
        result
    }

    // =========================================================================
    // One-shot Queries
    // =========================================================================

    /// Gets a product by its id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT id, name, price, quantity FROM products WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.inner.pool)
        .await?;

        Ok(product)
    }

    /// Lists all products ordered by name.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(SELECT_ALL_SQL)
            .fetch_all(&self.inner.pool)
            .await?;

        Ok(products)
    }

    /// Counts products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.inner.pool)
            .await?;

        Ok(count)
    }

    /// Returns the snapshot live queries currently see.
    pub fn snapshot(&self) -> DbResult<Arc<CatalogSnapshot>> {
        self.inner.live.borrow().clone().map_err(DbError::LiveQuery)
    }

    // =========================================================================
    // Live Queries
    // =========================================================================

    /// Full set ordered by name, now and after every change.
    pub fn observe_all(&self) -> BoxStream<'static, DbResult<Vec<Product>>> {
        distinct(
            self.live()
                .map(|state| state.map(|snapshot| snapshot.products.clone())),
        )
        .boxed()
    }

    /// The product with `id` (or `None`), now and after every change to it.
    pub fn observe_by_id(&self, id: &str) -> BoxStream<'static, DbResult<Option<Product>>> {
        let id = id.to_string();
        distinct(self.live().map(move |state| {
            state.map(|snapshot| snapshot.products.iter().find(|p| p.id == id).cloned())
        }))
        .boxed()
    }

    /// Number of products.
    pub fn observe_count(&self) -> BoxStream<'static, DbResult<i64>> {
        distinct(self.live().map(|state| state.map(|snapshot| snapshot.count))).boxed()
    }

    /// Sum of `price * quantity`; 0.0 when empty.
    pub fn observe_total_value(&self) -> BoxStream<'static, DbResult<f64>> {
        distinct(self.live().map(|state| state.map(|snapshot| snapshot.total_value))).boxed()
    }

    /// Number of live query streams currently open.
    pub fn observer_count(&self) -> usize {
        self.inner.live.receiver_count()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn live(&self) -> impl Stream<Item = DbResult<Arc<CatalogSnapshot>>> + Send + 'static {
        WatchStream::new(self.inner.live.subscribe())
            .map(|state| state.map_err(DbError::LiveQuery))
    }

    /// Reloads and publishes. Caller holds `write_lock`.
    ///
    /// The triggering write is already committed, so a failed reload is
    /// reported on the live queries rather than to the writer.
    async fn publish_locked(&self) {
        let snapshot = self.load_snapshot().await;
        self.publish(snapshot);
    }

    fn publish(&self, snapshot: DbResult<CatalogSnapshot>) {
        match snapshot {
            Ok(snapshot) => {
                let count = snapshot.count;
                let changed = self.inner.live.send_if_modified(|current| match current {
                    Ok(existing) if **existing == snapshot => false,
                    _ => {
                        *current = Ok(Arc::new(snapshot));
                        true
                    }
                });

                if changed {
                    debug!(count, "Published catalog snapshot");
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to reload catalog snapshot");
                self.inner.live.send_replace(Err(e.to_string()));
            }
        }
    }

    async fn load_snapshot(&self) -> DbResult<CatalogSnapshot> {
        // One read transaction so the list and aggregates agree
        let mut tx = self.inner.pool.begin().await?;

        let products = sqlx::query_as::<_, Product>(SELECT_ALL_SQL)
            .fetch_all(&mut *tx)
            .await?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&mut *tx)
            .await?;

        let total_value: f64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(price * quantity), 0.0) FROM products")
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        Ok(CatalogSnapshot {
            products,
            count,
            total_value,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn check_record(product: &Product) -> DbResult<()> {
    product
        .check_invariants()
        .map_err(|e| DbError::InvalidRecord(e.to_string()))
}

fn bind_product<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    product: &'q Product,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.price)
        .bind(product.quantity)
}

/// Drops consecutive duplicate values. Errors always pass through.
fn distinct<T, S>(stream: S) -> impl Stream<Item = DbResult<T>> + Send + 'static
where
    T: PartialEq + Clone + Send + 'static,
    S: Stream<Item = DbResult<T>> + Send + 'static,
{
    let mut last: Option<T> = None;

    stream.filter_map(move |item| {
        let out = match item {
            Ok(value) if last.as_ref() == Some(&value) => None,
            Ok(value) => {
                last = Some(value.clone());
                Some(Ok(value))
            }
            Err(e) => {
                last = None;
                Some(Err(e))
            }
        };
        future::ready(out)
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use std::time::Duration;
    use tokio::time::timeout;

    const QUIET: Duration = Duration::from_millis(100);

    async fn test_store() -> ProductStore {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.products()
    }

    async fn next<T>(stream: &mut BoxStream<'static, DbResult<T>>) -> T {
        timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("stream did not emit")
            .expect("stream ended")
            .expect("stream emitted an error")
    }

    fn widget() -> Product {
        Product::new("p1", "Widget", 9.99, 3)
    }

    #[tokio::test]
    async fn test_upsert_then_get() {
        let store = test_store().await;

        store.upsert(&widget()).await.unwrap();
        assert_eq!(store.get_by_id("p1").await.unwrap(), Some(widget()));

        let mut changed = widget();
        changed.quantity = 7;
        store.upsert(&changed).await.unwrap();

        assert_eq!(store.get_by_id("p1").await.unwrap(), Some(changed));
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_observe_all_ordered_by_name() {
        let store = test_store().await;
        let mut all = store.observe_all();

        assert!(next(&mut all).await.is_empty());

        store.upsert(&Product::new("b", "Zebra", 1.0, 1)).await.unwrap();
        store.upsert(&Product::new("a", "Apple", 1.0, 1)).await.unwrap();

        // Intermediate snapshots may be skipped; wait for both
        let mut names = Vec::new();
        while names.len() < 2 {
            names = next(&mut all)
                .await
                .into_iter()
                .map(|p| p.name)
                .collect::<Vec<_>>();
        }
        assert_eq!(names, vec!["Apple", "Zebra"]);
    }

    #[tokio::test]
    async fn test_identical_upsert_is_silent() {
        let store = test_store().await;
        let mut all = store.observe_all();
        assert!(next(&mut all).await.is_empty());

        store.upsert(&widget()).await.unwrap();
        assert_eq!(next(&mut all).await, vec![widget()]);

        store.upsert(&widget()).await.unwrap();
        assert!(timeout(QUIET, all.next()).await.is_err());
    }

    #[tokio::test]
    async fn test_observe_by_id_follows_lifecycle() {
        let store = test_store().await;
        let mut by_id = store.observe_by_id("p1");

        assert_eq!(next(&mut by_id).await, None);

        store.upsert(&widget()).await.unwrap();
        assert_eq!(next(&mut by_id).await, Some(widget()));

        // Unrelated change: no emission
        store.upsert(&Product::new("p2", "Gadget", 2.0, 1)).await.unwrap();
        assert!(timeout(QUIET, by_id.next()).await.is_err());

        assert!(store.delete(&widget()).await.unwrap());
        assert_eq!(next(&mut by_id).await, None);
    }

    #[tokio::test]
    async fn test_observer_count_follows_streams() {
        let store = test_store().await;
        assert_eq!(store.observer_count(), 0);

        let all = store.observe_all();
        let count = store.observe_count();
        assert_eq!(store.observer_count(), 2);

        drop(all);
        assert_eq!(store.observer_count(), 1);
        drop(count);
        assert_eq!(store.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let store = test_store().await;
        store.upsert(&widget()).await.unwrap();

        assert!(!store.delete_by_id("missing").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_and_total_value() {
        let store = test_store().await;
        let mut count = store.observe_count();
        let mut total = store.observe_total_value();

        assert_eq!(next(&mut count).await, 0);
        assert_eq!(next(&mut total).await, 0.0);

        store
            .upsert_all(&[
                Product::new("p1", "Widget", 2.5, 4),
                Product::new("p2", "Gadget", 1.0, 3),
            ])
            .await
            .unwrap();

        assert_eq!(next(&mut count).await, 2);
        assert!((next(&mut total).await - 13.0).abs() < 1e-9);

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.count, snapshot.products.len() as i64);
    }

    #[tokio::test]
    async fn test_upsert_all_is_one_change() {
        let store = test_store().await;
        let mut all = store.observe_all();
        assert!(next(&mut all).await.is_empty());

        let batch = vec![
            Product::new("p1", "A", 1.0, 1),
            Product::new("p2", "B", 1.0, 1),
            Product::new("p3", "C", 1.0, 1),
        ];
        assert_eq!(store.upsert_all(&batch).await.unwrap(), 3);

        assert_eq!(next(&mut all).await.len(), 3);
        assert!(timeout(QUIET, all.next()).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_record_rejected() {
        let store = test_store().await;

        let err = store
            .upsert(&Product::new("p1", "Widget", -1.0, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidRecord(_)));

        let err = store
            .upsert_all(&[widget(), Product::new("", "Nameless id", 1.0, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidRecord(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retain_only() {
        let store = test_store().await;
        store
            .upsert_all(&[
                Product::new("keep", "Keep", 1.0, 1),
                Product::new("drop", "Drop", 1.0, 1),
            ])
            .await
            .unwrap();

        let keep: HashSet<String> = ["keep".to_string()].into_iter().collect();
        assert_eq!(store.retain_only(&keep).await.unwrap(), 1);

        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["keep"]);
    }
}
