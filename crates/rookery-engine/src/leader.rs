//! Leader election seam
//!
//! A single cluster node runs the periodic loops (timeout sweeper, generator
//! and cron triggers). Election itself is an external coordination primitive;
//! the engine only consults `is_leader()` before each tick.

/// Cluster leadership oracle.
pub trait LeaderElector: Send + Sync + 'static {
    fn is_leader(&self) -> bool;
}

/// Single-node deployment: always the leader.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandaloneElector;

impl LeaderElector for StandaloneElector {
    fn is_leader(&self) -> bool {
        true
    }
}

/// Fixed answer elector, used by tests to model a follower node.
#[derive(Debug, Clone, Copy)]
pub struct FixedElector(pub bool);

impl LeaderElector for FixedElector {
    fn is_leader(&self) -> bool {
        self.0
    }
}
