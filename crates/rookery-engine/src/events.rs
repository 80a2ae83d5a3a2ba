//! In-memory pub/sub of process state changes
//!
//! Two waiter tables: one keyed by `(colony_id, executor_type, state)` for
//! parked assigns and colony-wide subscriptions, one keyed by
//! `(process_id, state)` for single-process subscriptions. Signalling never
//! blocks: each waiter holds a capacity-1 channel and delivery drops on full.
//! A matched waiter is woken exactly once and removed; dropping a
//! subscription removes its entry without being signalled.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rookery_core::{Process, ProcessState};
use tokio::sync::mpsc;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ColonyKey {
    colony_id: String,
    executor_type: String,
    state: ProcessState,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProcessKey {
    process_id: String,
    state: ProcessState,
}

struct Waiter {
    id: u64,
    tx: mpsc::Sender<Process>,
}

#[derive(Default)]
struct WaiterTables {
    colony_waiters: HashMap<ColonyKey, Vec<Waiter>>,
    process_waiters: HashMap<ProcessKey, Vec<Waiter>>,
    next_id: u64,
}

/// Relay hook carrying signals to peer cluster nodes.
///
/// The cluster transport is an external collaborator; peers re-invoke
/// [`EventHandler::signal`] locally when a relayed event arrives.
pub trait EventRelay: Send + Sync + 'static {
    fn publish(&self, process: &Process);
}

/// Single-node deployment: nothing to relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRelay;

impl EventRelay for LocalRelay {
    fn publish(&self, _process: &Process) {}
}

/// Process state-change event hub.
pub struct EventHandler {
    tables: Arc<Mutex<WaiterTables>>,
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(WaiterTables::default())),
        }
    }

    /// Wait for any process of the colony to reach `state`. An empty
    /// `executor_type` on the future process matches every waiter.
    pub fn subscribe_colony(
        &self,
        colony_id: &str,
        executor_type: &str,
        state: ProcessState,
    ) -> EventSubscription {
        let (tx, rx) = mpsc::channel(1);
        let key = ColonyKey {
            colony_id: colony_id.to_string(),
            executor_type: executor_type.to_string(),
            state,
        };
        let mut tables = self.tables.lock();
        let id = tables.next_id;
        tables.next_id += 1;
        tables
            .colony_waiters
            .entry(key.clone())
            .or_default()
            .push(Waiter { id, tx });
        EventSubscription {
            rx,
            cleanup: Some(Cleanup {
                tables: Arc::clone(&self.tables),
                key: WaiterKey::Colony(key),
                id,
            }),
        }
    }

    /// Wait for one specific process to reach `state`.
    pub fn subscribe_process(&self, process_id: &str, state: ProcessState) -> EventSubscription {
        let (tx, rx) = mpsc::channel(1);
        let key = ProcessKey {
            process_id: process_id.to_string(),
            state,
        };
        let mut tables = self.tables.lock();
        let id = tables.next_id;
        tables.next_id += 1;
        tables
            .process_waiters
            .entry(key.clone())
            .or_default()
            .push(Waiter { id, tx });
        EventSubscription {
            rx,
            cleanup: Some(Cleanup {
                tables: Arc::clone(&self.tables),
                key: WaiterKey::Process(key),
                id,
            }),
        }
    }

    /// Wake all waiters matching the process's colony, executor type and
    /// state, plus all waiters on the process id itself.
    pub fn signal(&self, process: &Process) {
        let mut tables = self.tables.lock();

        let colony_id = &process.spec.conditions.colony_id;
        let executor_type = &process.spec.conditions.executor_type;
        let mut woken: Vec<Waiter> = Vec::new();

        if executor_type.is_empty() {
            // Type-agnostic process: wake every executor type in the colony.
            let keys: Vec<ColonyKey> = tables
                .colony_waiters
                .keys()
                .filter(|k| k.colony_id == *colony_id && k.state == process.state)
                .cloned()
                .collect();
            for key in keys {
                if let Some(waiters) = tables.colony_waiters.remove(&key) {
                    woken.extend(waiters);
                }
            }
        } else {
            let key = ColonyKey {
                colony_id: colony_id.clone(),
                executor_type: executor_type.clone(),
                state: process.state,
            };
            if let Some(waiters) = tables.colony_waiters.remove(&key) {
                woken.extend(waiters);
            }
        }

        let process_key = ProcessKey {
            process_id: process.id.clone(),
            state: process.state,
        };
        if let Some(waiters) = tables.process_waiters.remove(&process_key) {
            woken.extend(waiters);
        }
        drop(tables);

        trace!(
            process_id = %process.id,
            state = %process.state,
            woken = woken.len(),
            "signalling process event"
        );
        for waiter in woken {
            // Non-blocking; a full or closed receiver just misses the event.
            let _ = waiter.tx.try_send(process.clone());
        }
    }

    /// Total registered waiters (for tests).
    pub fn waiter_count(&self) -> usize {
        let tables = self.tables.lock();
        tables.colony_waiters.values().map(Vec::len).sum::<usize>()
            + tables.process_waiters.values().map(Vec::len).sum::<usize>()
    }
}

fn remove_waiter(tables: &Mutex<WaiterTables>, key: &WaiterKey, id: u64) {
    let mut tables = tables.lock();
    match key {
        WaiterKey::Colony(key) => {
            if let Some(waiters) = tables.colony_waiters.get_mut(key) {
                waiters.retain(|w| w.id != id);
                if waiters.is_empty() {
                    tables.colony_waiters.remove(key);
                }
            }
        }
        WaiterKey::Process(key) => {
            if let Some(waiters) = tables.process_waiters.get_mut(key) {
                waiters.retain(|w| w.id != id);
                if waiters.is_empty() {
                    tables.process_waiters.remove(key);
                }
            }
        }
    }
}

enum WaiterKey {
    Colony(ColonyKey),
    Process(ProcessKey),
}

struct Cleanup {
    tables: Arc<Mutex<WaiterTables>>,
    key: WaiterKey,
    id: u64,
}

/// A registered waiter. Dropping it deregisters without waking.
pub struct EventSubscription {
    rx: mpsc::Receiver<Process>,
    cleanup: Option<Cleanup>,
}

impl EventSubscription {
    /// Wait for the event. `None` when the handler went away.
    ///
    /// Signalled waiters are already removed from the tables; the cleanup on
    /// drop is then a no-op.
    pub async fn wait(mut self) -> Option<Process> {
        self.rx.recv().await
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        remove_waiter(&self.tables, &self.key, self.id);
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        // Cleanup's own Drop removes the table entry, if still present.
        self.cleanup.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rookery_core::{Conditions, FunctionSpec};
    use std::time::Duration;

    fn process(colony_id: &str, executor_type: &str, state: ProcessState) -> Process {
        let mut process = Process::from_spec(FunctionSpec::new(
            "noop",
            Conditions {
                colony_id: colony_id.to_string(),
                executor_type: executor_type.to_string(),
                ..Default::default()
            },
        ));
        process.state = state;
        process
    }

    #[tokio::test]
    async fn test_colony_waiter_woken_by_matching_type() {
        let handler = Arc::new(EventHandler::new());
        let colony_id = rookery_core::generate_id();
        let subscription = handler.subscribe_colony(&colony_id, "cli", ProcessState::Waiting);

        handler.signal(&process(&colony_id, "cli", ProcessState::Waiting));
        let woken = tokio::time::timeout(Duration::from_secs(1), subscription.wait())
            .await
            .unwrap();
        assert!(woken.is_some());
        assert_eq!(handler.waiter_count(), 0);
    }

    #[tokio::test]
    async fn test_typeless_process_wakes_all_types() {
        let handler = Arc::new(EventHandler::new());
        let colony_id = rookery_core::generate_id();
        let cli = handler.subscribe_colony(&colony_id, "cli", ProcessState::Waiting);
        let gpu = handler.subscribe_colony(&colony_id, "gpu", ProcessState::Waiting);

        handler.signal(&process(&colony_id, "", ProcessState::Waiting));
        assert!(cli.wait().await.is_some());
        assert!(gpu.wait().await.is_some());
    }

    #[tokio::test]
    async fn test_wrong_state_does_not_wake() {
        let handler = Arc::new(EventHandler::new());
        let colony_id = rookery_core::generate_id();
        let mut subscription =
            handler.subscribe_colony(&colony_id, "cli", ProcessState::Success);

        handler.signal(&process(&colony_id, "cli", ProcessState::Waiting));
        assert!(subscription.rx.try_recv().is_err());
        assert_eq!(handler.waiter_count(), 1);
    }

    #[tokio::test]
    async fn test_process_waiter() {
        let handler = Arc::new(EventHandler::new());
        let colony_id = rookery_core::generate_id();
        let target = process(&colony_id, "cli", ProcessState::Success);

        let subscription = handler.subscribe_process(&target.id, ProcessState::Success);
        handler.signal(&target);
        let woken = subscription.wait().await.unwrap();
        assert_eq!(woken.id, target.id);
    }

    #[tokio::test]
    async fn test_dropped_subscription_leaves_no_entry() {
        let handler = Arc::new(EventHandler::new());
        let colony_id = rookery_core::generate_id();
        let subscription = handler.subscribe_colony(&colony_id, "cli", ProcessState::Waiting);
        assert_eq!(handler.waiter_count(), 1);
        drop(subscription);
        assert_eq!(handler.waiter_count(), 0);
    }
}
