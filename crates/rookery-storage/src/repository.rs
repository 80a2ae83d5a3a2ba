//! Repository trait definition

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rookery_core::{
    Attribute, AttributeType, Colony, Cron, Executor, ExecutorState, Function, Generator,
    GeneratorArg, Process, ProcessGraph, ProcessState,
};

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Entity missing
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Uniqueness violation
    #[error("conflict: {0}")]
    Conflict(String),

    /// A state-dependent update found the row in the wrong state
    #[error("invalid state for {kind} {id}: {detail}")]
    InvalidState {
        kind: &'static str,
        id: String,
        detail: String,
    },

    /// Controller lock could not be acquired in time
    #[error("lock timed out")]
    LockTimeout,

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Persistence boundary for the orchestrator.
///
/// Implementations must be thread-safe; the engine serializes mutating
/// traffic through its command queue but reads arrive concurrently.
/// State-transition operations (`assign_process`, `mark_successful`,
/// `mark_failed`, `reset_process`) must apply all of their field updates in
/// one transaction.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    // =========================================================================
    // Colonies
    // =========================================================================

    async fn add_colony(&self, colony: &Colony) -> Result<(), StoreError>;

    async fn get_colony(&self, colony_id: &str) -> Result<Colony, StoreError>;

    async fn get_colonies(&self) -> Result<Vec<Colony>, StoreError>;

    async fn delete_colony(&self, colony_id: &str) -> Result<(), StoreError>;

    // =========================================================================
    // Executors
    // =========================================================================

    /// Conflict when the id or the `(colony_id, name)` pair already exists.
    async fn add_executor(&self, executor: &Executor) -> Result<(), StoreError>;

    async fn get_executor(&self, executor_id: &str) -> Result<Executor, StoreError>;

    async fn get_executor_by_name(
        &self,
        colony_id: &str,
        name: &str,
    ) -> Result<Option<Executor>, StoreError>;

    async fn get_executors(&self, colony_id: &str) -> Result<Vec<Executor>, StoreError>;

    async fn set_executor_state(
        &self,
        executor_id: &str,
        state: ExecutorState,
    ) -> Result<(), StoreError>;

    /// Stamp `last_heard_from_time` = now.
    async fn mark_executor_alive(&self, executor_id: &str) -> Result<(), StoreError>;

    async fn delete_executor(&self, executor_id: &str) -> Result<(), StoreError>;

    // =========================================================================
    // Functions
    // =========================================================================

    /// Conflict when `(executor_id, func_name)` already exists.
    async fn add_function(&self, function: &Function) -> Result<(), StoreError>;

    async fn get_function(
        &self,
        executor_id: &str,
        func_name: &str,
    ) -> Result<Option<Function>, StoreError>;

    async fn get_functions_by_executor(
        &self,
        executor_id: &str,
    ) -> Result<Vec<Function>, StoreError>;

    async fn get_functions_by_colony(&self, colony_id: &str) -> Result<Vec<Function>, StoreError>;

    async fn update_function_stats(&self, function: &Function) -> Result<(), StoreError>;

    async fn delete_function(&self, function_id: &str) -> Result<(), StoreError>;

    // =========================================================================
    // Processes
    // =========================================================================

    async fn add_process(&self, process: &Process) -> Result<(), StoreError>;

    async fn get_process(&self, process_id: &str) -> Result<Process, StoreError>;

    async fn get_processes(&self, process_ids: &[String]) -> Result<Vec<Process>, StoreError>;

    async fn find_processes(
        &self,
        colony_id: &str,
        state: ProcessState,
        count: usize,
    ) -> Result<Vec<Process>, StoreError>;

    /// Waiting processes eligible for an executor of `executor_type` in the
    /// colony: state Waiting, `wait_for_parents` false, and the spec's
    /// executor type equal to `executor_type` or empty. Ordered by priority
    /// descending, then `priority_time` ascending, then id.
    async fn candidates(
        &self,
        colony_id: &str,
        executor_type: &str,
        count: usize,
    ) -> Result<Vec<Process>, StoreError>;

    /// Atomically flip Waiting → Running for `executor_id`, stamping start
    /// time, the exec deadline derived from the spec, and the given input.
    /// InvalidState when the process is no longer Waiting.
    async fn assign_process(
        &self,
        process_id: &str,
        executor_id: &str,
        input: Vec<serde_json::Value>,
    ) -> Result<Process, StoreError>;

    /// Running → Success with output and end time.
    async fn mark_successful(
        &self,
        process_id: &str,
        output: Vec<serde_json::Value>,
    ) -> Result<Process, StoreError>;

    /// Any state → Failed with errors and end time.
    async fn mark_failed(
        &self,
        process_id: &str,
        errors: &[String],
    ) -> Result<Process, StoreError>;

    /// Running → Waiting in one transaction: clear assignment and start
    /// time, drop the exec deadline, increment the retry counter.
    async fn reset_process(&self, process_id: &str) -> Result<Process, StoreError>;

    async fn set_wait_for_parents(
        &self,
        process_id: &str,
        wait_for_parents: bool,
    ) -> Result<(), StoreError>;

    async fn set_parents(&self, process_id: &str, parents: &[String]) -> Result<(), StoreError>;

    async fn set_children(&self, process_id: &str, children: &[String]) -> Result<(), StoreError>;

    /// Running processes whose exec deadline passed.
    async fn find_expired_running(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Process>, StoreError>;

    /// Waiting processes whose wait deadline passed.
    async fn find_expired_waiting(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Process>, StoreError>;

    async fn delete_process(&self, process_id: &str) -> Result<(), StoreError>;

    async fn delete_processes_by_colony(&self, colony_id: &str) -> Result<(), StoreError>;

    /// Retention sweep; returns the number of deleted processes.
    async fn delete_successful_processes_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn count_processes(
        &self,
        colony_id: Option<&str>,
        state: ProcessState,
    ) -> Result<i64, StoreError>;

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Conflict when `(target_id, attribute_type, key)` already exists.
    async fn add_attribute(&self, attribute: &Attribute) -> Result<(), StoreError>;

    async fn get_attribute(&self, attribute_id: &str) -> Result<Attribute, StoreError>;

    async fn get_attribute_by_key(
        &self,
        target_id: &str,
        key: &str,
        attribute_type: AttributeType,
    ) -> Result<Option<Attribute>, StoreError>;

    async fn get_attributes(&self, target_id: &str) -> Result<Vec<Attribute>, StoreError>;

    async fn delete_attributes_by_target(&self, target_id: &str) -> Result<(), StoreError>;

    // =========================================================================
    // Process graphs
    // =========================================================================

    async fn add_graph(&self, graph: &ProcessGraph) -> Result<(), StoreError>;

    async fn get_graph(&self, graph_id: &str) -> Result<ProcessGraph, StoreError>;

    async fn find_graphs(
        &self,
        colony_id: &str,
        state: Option<ProcessState>,
        count: usize,
    ) -> Result<Vec<ProcessGraph>, StoreError>;

    async fn update_graph(&self, graph: &ProcessGraph) -> Result<(), StoreError>;

    /// Cascades to the graph's processes and their attributes.
    async fn delete_graph(&self, graph_id: &str) -> Result<(), StoreError>;

    async fn delete_successful_graphs_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn count_graphs(
        &self,
        colony_id: Option<&str>,
        state: ProcessState,
    ) -> Result<i64, StoreError>;

    // =========================================================================
    // Generators
    // =========================================================================

    /// Conflict when `(colony_id, name)` already exists.
    async fn add_generator(&self, generator: &Generator) -> Result<(), StoreError>;

    async fn get_generator(&self, generator_id: &str) -> Result<Generator, StoreError>;

    async fn get_generator_by_name(
        &self,
        colony_id: &str,
        name: &str,
    ) -> Result<Option<Generator>, StoreError>;

    async fn get_generators(&self, colony_id: &str) -> Result<Vec<Generator>, StoreError>;

    /// All generators across colonies; the leader's trigger loop input.
    async fn all_generators(&self) -> Result<Vec<Generator>, StoreError>;

    async fn update_generator(&self, generator: &Generator) -> Result<(), StoreError>;

    async fn delete_generator(&self, generator_id: &str) -> Result<(), StoreError>;

    async fn add_generator_arg(&self, arg: &GeneratorArg) -> Result<(), StoreError>;

    async fn count_generator_args(&self, generator_id: &str) -> Result<i64, StoreError>;

    /// Oldest args first (FIFO).
    async fn get_generator_args(
        &self,
        generator_id: &str,
        count: usize,
    ) -> Result<Vec<GeneratorArg>, StoreError>;

    async fn delete_generator_arg(&self, arg_id: &str) -> Result<(), StoreError>;

    // =========================================================================
    // Crons
    // =========================================================================

    /// Conflict when `(colony_id, name)` already exists.
    async fn add_cron(&self, cron: &Cron) -> Result<(), StoreError>;

    async fn get_cron(&self, cron_id: &str) -> Result<Cron, StoreError>;

    async fn get_crons(&self, colony_id: &str) -> Result<Vec<Cron>, StoreError>;

    /// All crons across colonies; the leader's trigger loop input.
    async fn all_crons(&self) -> Result<Vec<Cron>, StoreError>;

    async fn update_cron(&self, cron: &Cron) -> Result<(), StoreError>;

    async fn delete_cron(&self, cron_id: &str) -> Result<(), StoreError>;

    // =========================================================================
    // Controller lock
    // =========================================================================

    /// Coarse mutual exclusion for compound controller reads across cluster
    /// nodes. `LockTimeout` when not acquired within `timeout`.
    async fn lock(&self, timeout: Duration) -> Result<(), StoreError>;

    async fn unlock(&self) -> Result<(), StoreError>;

    // =========================================================================
    // Statistics
    // =========================================================================

    async fn count_colonies(&self) -> Result<i64, StoreError>;

    async fn count_executors(&self, colony_id: Option<&str>) -> Result<i64, StoreError>;
}
