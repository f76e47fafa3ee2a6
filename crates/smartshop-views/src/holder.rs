//! # State Holder
//!
//! Latest-value plus transition-log channel pair behind every view state.
//!
//! ```text
//!            set(next)
//!               │
//!               ▼
//!   ┌───────────────────────┐
//!   │  terminal already?    │── yes ──► refused, nothing published
//!   └───────────┬───────────┘
//!               │ no
//!               ├──► watch      latest state (late subscribers see it)
//!               └──► broadcast  every transition, in order
//! ```

use std::sync::Mutex;
use tokio::sync::{broadcast, watch};

const TRANSITION_CAPACITY: usize = 64;

/// A view state enum.
pub trait ViewState: Clone + Send + Sync + 'static {
    /// States that can never be left.
    fn is_terminal(&self) -> bool {
        false
    }
}

/// Holds the current state of one view and publishes its transitions.
#[derive(Debug)]
pub struct StateHolder<S> {
    current: watch::Sender<S>,
    transitions: broadcast::Sender<S>,
    /// Keeps watch and broadcast order identical under concurrent setters.
    publish: Mutex<()>,
}

impl<S: ViewState> StateHolder<S> {
    pub fn new(initial: S) -> Self {
        let (current, _) = watch::channel(initial);
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);

        StateHolder {
            current,
            transitions,
            publish: Mutex::new(()),
        }
    }

    /// Current state.
    pub fn get(&self) -> S {
        self.current.borrow().clone()
    }

    /// Moves to `next`. Returns false if the current state is terminal.
    pub fn set(&self, next: S) -> bool {
        let _order = self.publish.lock().unwrap_or_else(|e| e.into_inner());

        let accepted = self.current.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = next.clone();
            true
        });

        if accepted {
            // No transition subscribers is fine
            let _ = self.transitions.send(next);
        }
        accepted
    }

    /// Receiver of the latest state.
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.current.subscribe()
    }

    /// Receiver of every transition from now on.
    pub fn transitions(&self) -> broadcast::Receiver<S> {
        self.transitions.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Door {
        Open,
        Closed,
        Welded,
    }

    impl ViewState for Door {
        fn is_terminal(&self) -> bool {
            matches!(self, Door::Welded)
        }
    }

    #[tokio::test]
    async fn test_transitions_in_order() {
        let holder = StateHolder::new(Door::Open);
        let mut transitions = holder.transitions();

        assert!(holder.set(Door::Closed));
        assert!(holder.set(Door::Open));

        assert_eq!(transitions.recv().await.unwrap(), Door::Closed);
        assert_eq!(transitions.recv().await.unwrap(), Door::Open);
        assert_eq!(holder.get(), Door::Open);
    }

    #[tokio::test]
    async fn test_terminal_state_is_final() {
        let holder = StateHolder::new(Door::Open);
        let mut latest = holder.subscribe();

        assert!(holder.set(Door::Welded));
        assert!(!holder.set(Door::Open));
        assert_eq!(holder.get(), Door::Welded);

        latest.changed().await.unwrap();
        assert_eq!(*latest.borrow(), Door::Welded);
    }
}
