//! # Catalog Lifecycle
//!
//! The process-wide repository: created once, shared everywhere, stopped
//! explicitly.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Catalog Lifecycle                                │
//! │                                                                         │
//! │  Catalog::initialize(config, remote)                                   │
//! │       │  (lock held)                                                    │
//! │       ├── already initialized? ──► return the existing instance        │
//! │       ▼                                                                 │
//! │  Database::new ──► SyncRepository::start ──► mirror task running       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Catalog::get() from anywhere ──► Arc<Catalog>                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Catalog::shutdown()                                                   │
//! │       │  (lock held)                                                    │
//! │       └── stop mirror ──► close pool ──► slot empty again              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`Catalog::open`] builds an instance outside the global slot, which is
//! what tests and short-lived tools use.

use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::info;

use smartshop_db::Database;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::RemoteStore;
use crate::repository::SyncRepository;

static INSTANCE: OnceLock<Mutex<Option<Arc<Catalog>>>> = OnceLock::new();

fn slot() -> &'static Mutex<Option<Arc<Catalog>>> {
    INSTANCE.get_or_init(|| Mutex::new(None))
}

/// A running catalog: local database plus sync repository.
#[derive(Debug)]
pub struct Catalog {
    config: SyncConfig,
    db: Database,
    repository: Arc<SyncRepository>,
}

impl Catalog {
    /// Opens a catalog that is not registered globally.
    pub async fn open(config: SyncConfig, remote: Arc<dyn RemoteStore>) -> SyncResult<Self> {
        config.validate()?;

        let db = Database::new(config.db_config()?).await?;
        let repository = Arc::new(SyncRepository::start(
            db.products(),
            remote,
            config.mirror.clone(),
        ));

        info!(in_memory = config.is_in_memory(), "Catalog opened");

        Ok(Catalog {
            config,
            db,
            repository,
        })
    }

    /// Creates the process-wide catalog, or returns the existing one.
    ///
    /// Concurrent callers are serialized; only the first creates.
    pub async fn initialize(
        config: SyncConfig,
        remote: Arc<dyn RemoteStore>,
    ) -> SyncResult<Arc<Catalog>> {
        let mut guard = slot().lock().await;

        if let Some(existing) = guard.as_ref() {
            info!("Catalog already initialized");
            return Ok(existing.clone());
        }

        let catalog = Arc::new(Self::open(config, remote).await?);
        *guard = Some(catalog.clone());

        info!("Catalog initialized");
        Ok(catalog)
    }

    /// Returns the process-wide catalog.
    pub async fn get() -> SyncResult<Arc<Catalog>> {
        slot()
            .lock()
            .await
            .as_ref()
            .cloned()
            .ok_or(SyncError::NotInitialized)
    }

    /// Stops and removes the process-wide catalog. No-op if none exists.
    pub async fn shutdown() {
        let taken = slot().lock().await.take();

        if let Some(catalog) = taken {
            catalog.close().await;
            info!("Catalog shut down");
        }
    }

    /// Stops the mirror and closes the database.
    pub async fn close(&self) {
        self.repository.shutdown().await;
        self.db.close().await;
    }

    /// The sync repository.
    pub fn repository(&self) -> Arc<SyncRepository> {
        self.repository.clone()
    }

    /// The local database.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// The configuration this catalog was opened with.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}
