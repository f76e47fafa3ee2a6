//! # smartshop-sync: Remote Sync for SmartShop
//!
//! Keeps the local cache in step with the authoritative remote store and
//! exposes the result as one reactive repository.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       SmartShop Sync Flow                               │
//! │                                                                         │
//! │   ┌───────────────────┐                                                │
//! │   │    RemoteStore    │  authoritative "products" collection           │
//! │   └─────────┬─────────┘                                                │
//! │        ▲    │ observe_all() snapshots                                  │
//! │        │    ▼                                                           │
//! │        │  ┌───────────────────┐                                        │
//! │  save  │  │   Mirror task     │  upsert_all (+ optional prune),        │
//! │  delete│  │   (mirror.rs)     │  resubscribe with backoff              │
//! │  (1st) │  └─────────┬─────────┘                                        │
//! │        │            ▼                                                   │
//! │  ┌─────┴──────────────────────┐     ┌──────────────────────────────┐   │
//! │  │      SyncRepository        │────►│  ProductStore (smartshop-db) │   │
//! │  │   (repository.rs)          │ 2nd │  live queries                │   │
//! │  └─────────────┬──────────────┘     └──────────────┬───────────────┘   │
//! │                │ ProductRepository trait            │                   │
//! │                ▼                                    │                   │
//! │        view states (smartshop-views) ◄──────────────┘                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`config`] - TOML/environment configuration
//! - [`error`] - `SyncError` and `ErrorKind`
//! - [`remote`] - `RemoteStore` trait and the in-memory remote
//! - [`mirror`] - Background remote-to-local mirror
//! - [`repository`] - `ProductRepository` and `SyncRepository`
//! - [`catalog`] - Process-wide initialize / shutdown

pub mod catalog;
pub mod config;
pub mod error;
pub mod mirror;
pub mod remote;
pub mod repository;

pub use catalog::Catalog;
pub use config::{MirrorSettings, SyncConfig, ViewSettings};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use mirror::{MirrorHandle, MirrorStatus};
pub use remote::{MemoryRemoteStore, RemoteStore};
pub use repository::{ProductRepository, SyncRepository};
