//! # Remote Mirror
//!
//! Background task that copies every remote snapshot into the local cache.
//!
//! ## Mirror Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Mirror State Machine                             │
//! │                                                                         │
//! │   ┌──────────────┐  observe_all()   ┌──────────────┐                   │
//! │   │   Starting   │─────────────────►│  Subscribed  │◄──────┐           │
//! │   └──────────────┘                  └──────┬───────┘       │           │
//! │                                            │               │           │
//! │             Ok(snapshot): upsert_all       │  Err / end    │ timer     │
//! │             (+ retain_only when pruning)   │               │ expired   │
//! │                                            ▼               │           │
//! │                                     ┌──────────────┐       │           │
//! │                                     │   Backoff    │───────┘           │
//! │                                     └──────────────┘                   │
//! │                                                                         │
//! │   shutdown signal (any state) ──► Stopped                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The backoff resets after every applied snapshot. A local write failure
//! does not break the subscription; the next snapshot carries the full
//! collection again.
//!
//! Snapshots are applied under the repository's write gate, and only the
//! newest one available at that point is written. A snapshot taken before
//! a repository delete can therefore never resurrect the deleted product.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use smartshop_core::Product;
use smartshop_db::ProductStore;

use crate::config::MirrorSettings;
use crate::error::SyncResult;
use crate::remote::RemoteStore;

// =============================================================================
// Mirror Status
// =============================================================================

/// Current mirror status for external queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MirrorStatus {
    /// Whether the mirror task is alive.
    pub running: bool,

    /// Whether a remote subscription is currently open.
    pub subscribed: bool,

    /// Remote snapshots written to the local cache.
    pub snapshots_applied: u64,

    /// Times the remote subscription was re-established after a failure.
    pub resubscriptions: u64,

    /// Products removed because the remote no longer had them.
    pub pruned: u64,

    /// When the last snapshot was applied.
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Last failure (stream or local write), if any.
    pub last_error: Option<String>,
}

// =============================================================================
// Mirror Handle
// =============================================================================

/// Handle for observing and stopping the mirror task.
#[derive(Debug, Clone)]
pub struct MirrorHandle {
    shutdown_tx: mpsc::Sender<()>,
    status: watch::Receiver<MirrorStatus>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MirrorHandle {
    /// Returns the current mirror status.
    pub fn status(&self) -> MirrorStatus {
        self.status.borrow().clone()
    }

    /// Returns a receiver that sees every status change.
    pub fn watch_status(&self) -> watch::Receiver<MirrorStatus> {
        self.status.clone()
    }

    /// Stops the mirror and waits for the task to finish.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        // Err means the task is already gone
        let _ = self.shutdown_tx.send(()).await;

        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Mirror task panicked");
            }
        }
    }
}

// =============================================================================
// Mirror Task
// =============================================================================

enum SubscriptionEnd {
    Shutdown,
    Failed(String),
}

/// The mirror task.
pub(crate) struct Mirror {
    local: ProductStore,
    remote: Arc<dyn RemoteStore>,
    settings: MirrorSettings,
    /// Shared with repository writes.
    write_gate: Arc<Mutex<()>>,
    status: watch::Sender<MirrorStatus>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl Mirror {
    /// Spawns the mirror task on the current runtime.
    pub(crate) fn spawn(
        local: ProductStore,
        remote: Arc<dyn RemoteStore>,
        settings: MirrorSettings,
        write_gate: Arc<Mutex<()>>,
    ) -> MirrorHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (status_tx, status_rx) = watch::channel(MirrorStatus {
            running: true,
            ..Default::default()
        });

        let mirror = Mirror {
            local,
            remote,
            settings,
            write_gate,
            status: status_tx,
            shutdown_rx,
        };

        let task = tokio::spawn(mirror.run());

        MirrorHandle {
            shutdown_tx,
            status: status_rx,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    /// Main mirror loop.
    async fn run(mut self) {
        info!(
            prune_remote_deletions = self.settings.prune_remote_deletions,
            "Mirror starting"
        );

        let mut backoff = self.create_backoff();

        loop {
            match self.follow_remote(&mut backoff).await {
                SubscriptionEnd::Shutdown => {
                    info!("Mirror received shutdown signal");
                    break;
                }
                SubscriptionEnd::Failed(reason) => {
                    warn!(reason = %reason, "Remote subscription lost");
                    self.status.send_modify(|s| {
                        s.subscribed = false;
                        s.last_error = Some(reason);
                    });
                }
            }

            let duration = backoff
                .next_backoff()
                .unwrap_or_else(|| self.settings.max_backoff());
            debug!(?duration, "Waiting before resubscribing");

            tokio::select! {
                _ = tokio::time::sleep(duration) => {
                    self.status.send_modify(|s| s.resubscriptions += 1);
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown during backoff");
                    break;
                }
            }
        }

        self.status.send_modify(|s| {
            s.running = false;
            s.subscribed = false;
        });
        info!("Mirror stopped");
    }

    /// Follows one remote subscription until it fails or shutdown arrives.
    async fn follow_remote(&mut self, backoff: &mut ExponentialBackoff) -> SubscriptionEnd {
        let mut snapshots = self.remote.observe_all();
        self.status.send_modify(|s| s.subscribed = true);
        debug!("Subscribed to remote collection");

        loop {
            tokio::select! {
                item = snapshots.next() => match item {
                    Some(Ok(products)) => {
                        backoff.reset();
                        let _gate = self.write_gate.lock().await;
                        let (products, end) = newest(&mut snapshots, products);
                        self.apply(products).await;
                        if let Some(end) = end {
                            return end;
                        }
                    }
                    Some(Err(e)) => return SubscriptionEnd::Failed(e.to_string()),
                    None => return SubscriptionEnd::Failed("remote stream ended".to_string()),
                },
                // None: every handle dropped
                _ = self.shutdown_rx.recv() => return SubscriptionEnd::Shutdown,
            }
        }
    }

    /// Writes one remote snapshot into the local cache.
    async fn apply(&self, products: Vec<Product>) {
        let remote_ids: HashSet<String> = products.iter().map(|p| p.id.clone()).collect();

        let (valid, invalid): (Vec<Product>, Vec<Product>) = products
            .into_iter()
            .partition(|p| p.check_invariants().is_ok());

        for product in &invalid {
            warn!(id = %product.id, "Skipping remote product that breaks invariants");
        }

        let written = match self.local.upsert_all(&valid).await {
            Ok(written) => written,
            Err(e) => {
                error!(error = %e, "Failed to apply remote snapshot");
                self.status.send_modify(|s| s.last_error = Some(e.to_string()));
                return;
            }
        };

        let mut pruned = 0;
        if self.settings.prune_remote_deletions {
            match self.local.retain_only(&remote_ids).await {
                Ok(removed) => pruned = removed,
                Err(e) => {
                    error!(error = %e, "Failed to prune local products");
                    self.status.send_modify(|s| s.last_error = Some(e.to_string()));
                }
            }
        }

        debug!(written, pruned, "Applied remote snapshot");

        self.status.send_modify(|s| {
            s.snapshots_applied += 1;
            s.pruned += pruned as u64;
            s.last_synced_at = Some(Utc::now());
        });
    }

    /// Creates the exponential backoff configuration.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.settings.initial_backoff(),
            max_interval: self.settings.max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None, // Resubscribe for the application lifetime
            ..Default::default()
        }
    }
}

/// Skips to the newest snapshot already waiting on the subscription.
///
/// A failure or end found while skipping is returned next to the newest
/// good snapshot, which still has to be applied.
fn newest(
    snapshots: &mut BoxStream<'static, SyncResult<Vec<Product>>>,
    mut products: Vec<Product>,
) -> (Vec<Product>, Option<SubscriptionEnd>) {
    while let Some(item) = snapshots.next().now_or_never() {
        match item {
            Some(Ok(newer)) => products = newer,
            Some(Err(e)) => return (products, Some(SubscriptionEnd::Failed(e.to_string()))),
            None => {
                let end = SubscriptionEnd::Failed("remote stream ended".to_string());
                return (products, Some(end));
            }
        }
    }
    (products, None)
}

// =============================================================================
// Unit Tests
// =============================================================================
