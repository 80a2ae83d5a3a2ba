//! Domain model for the rookery meta-orchestrator.
//!
//! A *colony* is the tenant boundary. Executors register to a colony and poll
//! for work; processes are function-execution requests queued against a
//! colony; process graphs arrange processes into dependency-ordered
//! workflows. Generators and crons synthesize new workflows automatically.
//!
//! This crate holds the persistent entity types, the integer state codes used
//! on the wire, id derivation, and workflow-spec verification. It contains no
//! scheduling logic; that lives in `rookery-engine`.

pub mod attribute;
pub mod colony;
pub mod cron;
pub mod executor;
pub mod function;
pub mod generator;
pub mod graph;
pub mod identity;
pub mod process;
pub mod spec;
pub mod state;
pub mod stats;
pub mod workflow;

pub use attribute::{Attribute, AttributeType};
pub use colony::Colony;
pub use cron::Cron;
pub use executor::{Executor, ExecutorState, Location};
pub use function::Function;
pub use generator::{Generator, GeneratorArg};
pub use graph::ProcessGraph;
pub use identity::{generate_id, hash_of, identity_of, generate_secret};
pub use process::Process;
pub use spec::{Conditions, FunctionSpec};
pub use state::ProcessState;
pub use stats::{ColonyStatistics, ServerStatistics};
pub use workflow::{WorkflowSpec, WorkflowVerificationError};
