//! # Retained Value
//!
//! A latest value fed by an upstream stream that only runs while someone
//! is watching, plus a grace period.
//!
//! ## Sharing Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Retained Value Lifecycle                             │
//! │                                                                         │
//! │   ┌──────────┐  first subscribe()   ┌──────────────┐                   │
//! │   │   Idle   │─────────────────────►│  Collecting  │◄─────────┐        │
//! │   └──────────┘                      └──────┬───────┘          │        │
//! │        ▲                                   │ last receiver    │ new    │
//! │        │                                   │ dropped          │ sub-   │
//! │        │                                   ▼                  │ scribe │
//! │        │      grace period elapsed  ┌──────────────┐          │        │
//! │        └────────────────────────────│    Grace     │──────────┘        │
//! │          (upstream dropped)         └──────────────┘                   │
//! │                                                                         │
//! │  The value survives every state. A new subscriber always sees the     │
//! │  last delivered value first, even while Idle.                          │
//! │                                                                         │
//! │  Upstream Err: logged, collection stops until the next subscribe().    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use futures_util::stream::{BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error};

use smartshop_sync::SyncResult;

struct Shared<T> {
    value: watch::Sender<T>,
    /// Bumped by every subscribe().
    demand: watch::Sender<u64>,
    collecting: AtomicBool,
}

enum CollectEnd {
    /// Grace period ran out with no subscribers.
    Idle,
    /// Upstream failed or finished.
    Stopped,
}

/// Latest value of an upstream stream, shared with a grace period.
pub struct RetainedValue<T> {
    shared: Arc<Shared<T>>,
    task: JoinHandle<()>,
}

impl<T> RetainedValue<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Creates the value. Nothing is collected until the first subscriber.
    ///
    /// `name` only labels log lines.
    pub fn new<F>(name: &'static str, initial: T, grace: Duration, upstream: F) -> Self
    where
        F: Fn() -> BoxStream<'static, SyncResult<T>> + Send + Sync + 'static,
    {
        let (value, _) = watch::channel(initial);
        let (demand, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            value,
            demand,
            collecting: AtomicBool::new(false),
        });

        let task = tokio::spawn(run(name, shared.clone(), grace, upstream));

        RetainedValue { shared, task }
    }

    /// Subscribes. The receiver holds the last delivered value.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        let rx = self.shared.value.subscribe();
        self.shared.demand.send_modify(|n| *n += 1);
        rx
    }

    /// Last delivered value.
    pub fn get(&self) -> T {
        self.shared.value.borrow().clone()
    }

    /// Whether the upstream is currently running.
    pub fn is_collecting(&self) -> bool {
        self.shared.collecting.load(Ordering::SeqCst)
    }
}

impl<T> Drop for RetainedValue<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<T, F>(name: &'static str, shared: Arc<Shared<T>>, grace: Duration, upstream: F)
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> BoxStream<'static, SyncResult<T>> + Send + Sync + 'static,
{
    let mut demand = shared.demand.subscribe();

    loop {
        while shared.value.receiver_count() == 0 {
            if demand.changed().await.is_err() {
                return;
            }
        }

        shared.collecting.store(true, Ordering::SeqCst);
        debug!(value = name, "Started collecting");

        let end = collect(name, &shared, &mut demand, grace, upstream()).await;

        shared.collecting.store(false, Ordering::SeqCst);
        debug!(value = name, "Stopped collecting");

        if let CollectEnd::Stopped = end {
            // Current subscribers keep the last value; only a new one restarts
            demand.borrow_and_update();
            if demand.changed().await.is_err() {
                return;
            }
        }
    }
}

async fn collect<T>(
    name: &'static str,
    shared: &Shared<T>,
    demand: &mut watch::Receiver<u64>,
    grace: Duration,
    mut upstream: BoxStream<'static, SyncResult<T>>,
) -> CollectEnd
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let mut grace_deadline: Option<Instant> = None;

    loop {
        let deadline = grace_deadline;
        let grace_timer = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            item = upstream.next() => match item {
                Some(Ok(next)) => {
                    shared.value.send_if_modified(|current| {
                        if *current == next {
                            return false;
                        }
                        *current = next;
                        true
                    });
                }
                Some(Err(e)) => {
                    error!(value = name, error = %e, "Upstream failed");
                    return CollectEnd::Stopped;
                }
                None => return CollectEnd::Stopped,
            },
            _ = shared.value.closed(), if grace_deadline.is_none() => {
                debug!(value = name, ?grace, "Last subscriber left");
                grace_deadline = Some(Instant::now() + grace);
            }
            changed = demand.changed(), if grace_deadline.is_some() => {
                if changed.is_ok() && shared.value.receiver_count() > 0 {
                    grace_deadline = None;
                }
            }
            _ = grace_timer => return CollectEnd::Idle,
        }
    }
}
