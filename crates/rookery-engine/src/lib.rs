//! Process/workflow scheduling and lifecycle engine.
//!
//! The [`Controller`] owns two bounded command queues (one for fast
//! commands, one for long-wait assigns), an in-memory [`EventHandler`] used
//! to park waiters instead of busy-polling, and the leader-gated periodic
//! loops: timeout sweeper, generator trigger, cron trigger and retention.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       Controller                         │
//! │  command queue ─► worker ─► repository                   │
//! │  blocking queue ─► worker ─► assign / park on events     │
//! │  sweeper · generator · cron · retention (leader only)    │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod controller;
pub mod cron;
pub mod error;
pub mod events;
pub mod generator;
pub mod graph;
pub mod leader;

pub use config::ControllerConfig;
pub use controller::{Controller, MAX_EXEC_TIME_EXCEEDED, MAX_WAIT_TIME_EXCEEDED};
pub use error::EngineError;
pub use events::{EventHandler, EventRelay, EventSubscription, LocalRelay};
pub use graph::PARENT_FAILED;
pub use leader::{FixedElector, LeaderElector, StandaloneElector};
