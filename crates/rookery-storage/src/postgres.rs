//! PostgreSQL implementation of the repository
//!
//! Production persistence: state transitions run as single statements or
//! short transactions so the scheduler invariants (assignment flag vs state,
//! retry counter vs unassignment) commit together. The controller lock maps
//! to a session-scoped advisory lock on a dedicated pool connection.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rookery_core::{
    Attribute, AttributeType, Colony, Cron, Executor, ExecutorState, Function, Generator,
    GeneratorArg, Process, ProcessGraph, ProcessState,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{FromRow, Postgres};
use tracing::{debug, error, instrument};

use crate::repository::{Repository, StoreError};

/// Advisory lock key for the controller lock.
const CONTROLLER_LOCK_KEY: i64 = 0x726f_6f6b;

/// PostgreSQL repository backed by a connection pool.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
    lock_conn: std::sync::Arc<tokio::sync::Mutex<Option<PoolConnection<Postgres>>>>,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_conn: std::sync::Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// Connect and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(db_err)?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> StoreError {
    error!("database error: {}", e);
    StoreError::Database(e.to_string())
}

fn conflict_or_db(e: sqlx::Error, what: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(what.to_string())
        }
        _ => db_err(e),
    }
}

fn ser_err(e: serde_json::Error) -> StoreError {
    StoreError::Serialization(e.to_string())
}

fn state_err(e: String) -> StoreError {
    StoreError::Serialization(e)
}

// =============================================================================
// Row types
// =============================================================================

#[derive(FromRow)]
struct ColonyRow {
    colony_id: String,
    name: String,
}

impl From<ColonyRow> for Colony {
    fn from(row: ColonyRow) -> Self {
        Colony::new(row.colony_id, row.name)
    }
}

#[derive(FromRow)]
struct ExecutorRow {
    executor_id: String,
    executor_type: String,
    name: String,
    colony_id: String,
    state: i32,
    require_func_reg: bool,
    commission_time: DateTime<Utc>,
    last_heard_from_time: DateTime<Utc>,
    long: f64,
    lat: f64,
}

impl TryFrom<ExecutorRow> for Executor {
    type Error = StoreError;

    fn try_from(row: ExecutorRow) -> Result<Self, StoreError> {
        Ok(Executor {
            id: row.executor_id,
            executor_type: row.executor_type,
            name: row.name,
            colony_id: row.colony_id,
            state: ExecutorState::try_from(row.state).map_err(state_err)?,
            require_func_reg: row.require_func_reg,
            commission_time: row.commission_time,
            last_heard_from_time: row.last_heard_from_time,
            location: rookery_core::Location {
                long: row.long,
                lat: row.lat,
            },
        })
    }
}

#[derive(FromRow)]
struct FunctionRow {
    function_id: String,
    executor_id: String,
    colony_id: String,
    func_name: String,
    counter: i64,
    min_wait_time: f64,
    max_wait_time: f64,
    min_exec_time: f64,
    max_exec_time: f64,
    avg_wait_time: f64,
    avg_exec_time: f64,
}

impl From<FunctionRow> for Function {
    fn from(row: FunctionRow) -> Self {
        Function {
            function_id: row.function_id,
            executor_id: row.executor_id,
            colony_id: row.colony_id,
            func_name: row.func_name,
            counter: row.counter,
            min_wait_time: row.min_wait_time,
            max_wait_time: row.max_wait_time,
            min_exec_time: row.min_exec_time,
            max_exec_time: row.max_exec_time,
            avg_wait_time: row.avg_wait_time,
            avg_exec_time: row.avg_exec_time,
        }
    }
}

#[derive(FromRow)]
struct ProcessRow {
    process_id: String,
    assigned_executor_id: String,
    is_assigned: bool,
    state: i32,
    priority_time: i64,
    submission_time: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    wait_deadline: Option<DateTime<Utc>>,
    exec_deadline: Option<DateTime<Utc>>,
    retries: i64,
    wait_for_parents: bool,
    parents: Vec<String>,
    children: Vec<String>,
    process_graph_id: String,
    input: serde_json::Value,
    output: serde_json::Value,
    errors: Vec<String>,
    spec: serde_json::Value,
}

impl TryFrom<ProcessRow> for Process {
    type Error = StoreError;

    fn try_from(row: ProcessRow) -> Result<Self, StoreError> {
        Ok(Process {
            id: row.process_id,
            assigned_executor_id: row.assigned_executor_id,
            is_assigned: row.is_assigned,
            state: ProcessState::try_from(row.state).map_err(state_err)?,
            priority_time: row.priority_time,
            submission_time: row.submission_time,
            start_time: row.start_time,
            end_time: row.end_time,
            wait_deadline: row.wait_deadline,
            exec_deadline: row.exec_deadline,
            retries: row.retries,
            attributes: Vec::new(),
            spec: serde_json::from_value(row.spec).map_err(ser_err)?,
            wait_for_parents: row.wait_for_parents,
            parents: row.parents,
            children: row.children,
            process_graph_id: row.process_graph_id,
            input: serde_json::from_value(row.input).map_err(ser_err)?,
            output: serde_json::from_value(row.output).map_err(ser_err)?,
            errors: row.errors,
        })
    }
}

const PROCESS_COLUMNS: &str = "process_id, assigned_executor_id, is_assigned, state, \
     priority_time, submission_time, start_time, end_time, wait_deadline, exec_deadline, \
     retries, wait_for_parents, parents, children, process_graph_id, input, output, errors, spec";

#[derive(FromRow)]
struct AttributeRow {
    attribute_id: String,
    target_id: String,
    target_colony_id: String,
    target_process_graph_id: String,
    attribute_type: i32,
    key: String,
    value: String,
}

impl TryFrom<AttributeRow> for Attribute {
    type Error = StoreError;

    fn try_from(row: AttributeRow) -> Result<Self, StoreError> {
        Ok(Attribute {
            id: row.attribute_id,
            target_id: row.target_id,
            target_colony_id: row.target_colony_id,
            target_process_graph_id: row.target_process_graph_id,
            attribute_type: AttributeType::try_from(row.attribute_type).map_err(state_err)?,
            key: row.key,
            value: row.value,
        })
    }
}

#[derive(FromRow)]
struct GraphRow {
    process_graph_id: String,
    colony_id: String,
    state: i32,
    submission_time: DateTime<Utc>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    process_ids: Vec<String>,
    roots: Vec<String>,
}

impl TryFrom<GraphRow> for ProcessGraph {
    type Error = StoreError;

    fn try_from(row: GraphRow) -> Result<Self, StoreError> {
        Ok(ProcessGraph {
            id: row.process_graph_id,
            colony_id: row.colony_id,
            state: ProcessState::try_from(row.state).map_err(state_err)?,
            submission_time: row.submission_time,
            start_time: row.start_time,
            end_time: row.end_time,
            process_ids: row.process_ids,
            roots: row.roots,
        })
    }
}

#[derive(FromRow)]
struct GeneratorRow {
    generator_id: String,
    colony_id: String,
    name: String,
    workflow_spec: String,
    trigger_count: i64,
    timeout_seconds: i64,
    last_run: Option<DateTime<Utc>>,
    first_pack: Option<DateTime<Utc>>,
    checker_period: i64,
}

impl From<GeneratorRow> for Generator {
    fn from(row: GeneratorRow) -> Self {
        Generator {
            id: row.generator_id,
            colony_id: row.colony_id,
            name: row.name,
            workflow_spec: row.workflow_spec,
            trigger: row.trigger_count,
            timeout: row.timeout_seconds,
            last_run: row.last_run,
            first_pack: row.first_pack,
            checker_period: row.checker_period,
        }
    }
}

#[derive(FromRow)]
struct GeneratorArgRow {
    generator_arg_id: String,
    generator_id: String,
    colony_id: String,
    arg: String,
}

impl From<GeneratorArgRow> for GeneratorArg {
    fn from(row: GeneratorArgRow) -> Self {
        GeneratorArg {
            id: row.generator_arg_id,
            generator_id: row.generator_id,
            colony_id: row.colony_id,
            arg: row.arg,
        }
    }
}

#[derive(FromRow)]
struct CronRow {
    cron_id: String,
    colony_id: String,
    name: String,
    cron_expression: String,
    interval_seconds: i64,
    random: bool,
    next_run: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
    workflow_spec: String,
    prev_process_graph_id: String,
    wait_for_prev: bool,
    checker_period: i64,
}

impl From<CronRow> for Cron {
    fn from(row: CronRow) -> Self {
        Cron {
            id: row.cron_id,
            colony_id: row.colony_id,
            name: row.name,
            cron_expression: row.cron_expression,
            interval: row.interval_seconds,
            random: row.random,
            next_run: row.next_run,
            last_run: row.last_run,
            workflow_spec: row.workflow_spec,
            prev_process_graph_id: row.prev_process_graph_id,
            wait_for_prev_process_graph: row.wait_for_prev,
            checker_period: row.checker_period,
        }
    }
}

// =============================================================================
// Repository implementation
// =============================================================================

#[async_trait]
impl Repository for PostgresRepository {
    async fn add_colony(&self, colony: &Colony) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO colonies (colony_id, name) VALUES ($1, $2)")
            .bind(&colony.id)
            .bind(&colony.name)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or_db(e, "colony already exists"))?;
        Ok(())
    }

    async fn get_colony(&self, colony_id: &str) -> Result<Colony, StoreError> {
        sqlx::query_as::<_, ColonyRow>(
            "SELECT colony_id, name FROM colonies WHERE colony_id = $1",
        )
        .bind(colony_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(Colony::from)
        .ok_or_else(|| StoreError::not_found("colony", colony_id))
    }

    async fn get_colonies(&self) -> Result<Vec<Colony>, StoreError> {
        let rows =
            sqlx::query_as::<_, ColonyRow>("SELECT colony_id, name FROM colonies ORDER BY name")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(rows.into_iter().map(Colony::from).collect())
    }

    async fn delete_colony(&self, colony_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM colonies WHERE colony_id = $1")
            .bind(colony_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("colony", colony_id));
        }
        Ok(())
    }

    #[instrument(skip(self, executor), fields(executor_id = %executor.id))]
    async fn add_executor(&self, executor: &Executor) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO executors (executor_id, executor_type, name, colony_id, state,
                require_func_reg, commission_time, last_heard_from_time, long, lat)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&executor.id)
        .bind(&executor.executor_type)
        .bind(&executor.name)
        .bind(&executor.colony_id)
        .bind(i32::from(executor.state))
        .bind(executor.require_func_reg)
        .bind(executor.commission_time)
        .bind(executor.last_heard_from_time)
        .bind(executor.location.long)
        .bind(executor.location.lat)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "executor already exists"))?;
        debug!("added executor");
        Ok(())
    }

    async fn get_executor(&self, executor_id: &str) -> Result<Executor, StoreError> {
        sqlx::query_as::<_, ExecutorRow>("SELECT * FROM executors WHERE executor_id = $1")
            .bind(executor_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::not_found("executor", executor_id))?
            .try_into()
    }

    async fn get_executor_by_name(
        &self,
        colony_id: &str,
        name: &str,
    ) -> Result<Option<Executor>, StoreError> {
        sqlx::query_as::<_, ExecutorRow>(
            "SELECT * FROM executors WHERE colony_id = $1 AND name = $2",
        )
        .bind(colony_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(Executor::try_from)
        .transpose()
    }

    async fn get_executors(&self, colony_id: &str) -> Result<Vec<Executor>, StoreError> {
        let rows = sqlx::query_as::<_, ExecutorRow>(
            "SELECT * FROM executors WHERE colony_id = $1 ORDER BY name",
        )
        .bind(colony_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(Executor::try_from).collect()
    }

    async fn set_executor_state(
        &self,
        executor_id: &str,
        state: ExecutorState,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE executors SET state = $2 WHERE executor_id = $1")
            .bind(executor_id)
            .bind(i32::from(state))
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("executor", executor_id));
        }
        Ok(())
    }

    async fn mark_executor_alive(&self, executor_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE executors SET last_heard_from_time = NOW() WHERE executor_id = $1",
        )
        .bind(executor_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("executor", executor_id));
        }
        Ok(())
    }

    async fn delete_executor(&self, executor_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM executors WHERE executor_id = $1")
            .bind(executor_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("executor", executor_id));
        }
        sqlx::query("DELETE FROM functions WHERE executor_id = $1")
            .bind(executor_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn add_function(&self, function: &Function) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO functions (function_id, executor_id, colony_id, func_name, counter,
                min_wait_time, max_wait_time, min_exec_time, max_exec_time,
                avg_wait_time, avg_exec_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&function.function_id)
        .bind(&function.executor_id)
        .bind(&function.colony_id)
        .bind(&function.func_name)
        .bind(function.counter)
        .bind(function.min_wait_time)
        .bind(function.max_wait_time)
        .bind(function.min_exec_time)
        .bind(function.max_exec_time)
        .bind(function.avg_wait_time)
        .bind(function.avg_exec_time)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "function already registered for executor"))?;
        Ok(())
    }

    async fn get_function(
        &self,
        executor_id: &str,
        func_name: &str,
    ) -> Result<Option<Function>, StoreError> {
        Ok(sqlx::query_as::<_, FunctionRow>(
            "SELECT * FROM functions WHERE executor_id = $1 AND func_name = $2",
        )
        .bind(executor_id)
        .bind(func_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(Function::from))
    }

    async fn get_functions_by_executor(
        &self,
        executor_id: &str,
    ) -> Result<Vec<Function>, StoreError> {
        let rows = sqlx::query_as::<_, FunctionRow>(
            "SELECT * FROM functions WHERE executor_id = $1 ORDER BY func_name",
        )
        .bind(executor_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Function::from).collect())
    }

    async fn get_functions_by_colony(&self, colony_id: &str) -> Result<Vec<Function>, StoreError> {
        let rows = sqlx::query_as::<_, FunctionRow>(
            "SELECT * FROM functions WHERE colony_id = $1 ORDER BY func_name",
        )
        .bind(colony_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Function::from).collect())
    }

    async fn update_function_stats(&self, function: &Function) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE functions SET counter = $2,
                min_wait_time = $3, max_wait_time = $4,
                min_exec_time = $5, max_exec_time = $6,
                avg_wait_time = $7, avg_exec_time = $8
            WHERE function_id = $1
            "#,
        )
        .bind(&function.function_id)
        .bind(function.counter)
        .bind(function.min_wait_time)
        .bind(function.max_wait_time)
        .bind(function.min_exec_time)
        .bind(function.max_exec_time)
        .bind(function.avg_wait_time)
        .bind(function.avg_exec_time)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("function", &function.function_id));
        }
        Ok(())
    }

    async fn delete_function(&self, function_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM functions WHERE function_id = $1")
            .bind(function_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("function", function_id));
        }
        Ok(())
    }

    #[instrument(skip(self, process), fields(process_id = %process.id))]
    async fn add_process(&self, process: &Process) -> Result<(), StoreError> {
        let spec = serde_json::to_value(&process.spec).map_err(ser_err)?;
        let input = serde_json::to_value(&process.input).map_err(ser_err)?;
        let output = serde_json::to_value(&process.output).map_err(ser_err)?;
        sqlx::query(
            r#"
            INSERT INTO processes (process_id, colony_id, executor_type, priority,
                assigned_executor_id, is_assigned, state, priority_time, submission_time,
                start_time, end_time, wait_deadline, exec_deadline, retries,
                wait_for_parents, parents, children, process_graph_id,
                input, output, errors, spec)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(&process.id)
        .bind(&process.spec.conditions.colony_id)
        .bind(&process.spec.conditions.executor_type)
        .bind(process.spec.priority)
        .bind(&process.assigned_executor_id)
        .bind(process.is_assigned)
        .bind(i32::from(process.state))
        .bind(process.priority_time)
        .bind(process.submission_time)
        .bind(process.start_time)
        .bind(process.end_time)
        .bind(process.wait_deadline)
        .bind(process.exec_deadline)
        .bind(process.retries)
        .bind(process.wait_for_parents)
        .bind(&process.parents)
        .bind(&process.children)
        .bind(&process.process_graph_id)
        .bind(input)
        .bind(output)
        .bind(&process.errors)
        .bind(spec)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "process already exists"))?;
        Ok(())
    }

    async fn get_process(&self, process_id: &str) -> Result<Process, StoreError> {
        sqlx::query_as::<_, ProcessRow>(&format!(
            "SELECT {PROCESS_COLUMNS} FROM processes WHERE process_id = $1"
        ))
        .bind(process_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| StoreError::not_found("process", process_id))?
        .try_into()
    }

    async fn get_processes(&self, process_ids: &[String]) -> Result<Vec<Process>, StoreError> {
        let rows = sqlx::query_as::<_, ProcessRow>(&format!(
            "SELECT {PROCESS_COLUMNS} FROM processes WHERE process_id = ANY($1)"
        ))
        .bind(process_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        if rows.len() != process_ids.len() {
            let found: std::collections::HashSet<String> =
                rows.iter().map(|r| r.process_id.clone()).collect();
            let missing = process_ids
                .iter()
                .find(|id| !found.contains(*id))
                .cloned()
                .unwrap_or_default();
            return Err(StoreError::not_found("process", missing));
        }
        rows.into_iter().map(Process::try_from).collect()
    }

    async fn find_processes(
        &self,
        colony_id: &str,
        state: ProcessState,
        count: usize,
    ) -> Result<Vec<Process>, StoreError> {
        let rows = sqlx::query_as::<_, ProcessRow>(&format!(
            r#"
            SELECT {PROCESS_COLUMNS} FROM processes
            WHERE colony_id = $1 AND state = $2
            ORDER BY priority DESC, priority_time ASC, process_id ASC
            LIMIT $3
            "#
        ))
        .bind(colony_id)
        .bind(i32::from(state))
        .bind(count as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(Process::try_from).collect()
    }

    async fn candidates(
        &self,
        colony_id: &str,
        executor_type: &str,
        count: usize,
    ) -> Result<Vec<Process>, StoreError> {
        let rows = sqlx::query_as::<_, ProcessRow>(&format!(
            r#"
            SELECT {PROCESS_COLUMNS} FROM processes
            WHERE colony_id = $1 AND state = 0 AND wait_for_parents = FALSE
              AND (executor_type = '' OR executor_type = $2)
            ORDER BY priority DESC, priority_time ASC, process_id ASC
            LIMIT $3
            "#
        ))
        .bind(colony_id)
        .bind(executor_type)
        .bind(count as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(Process::try_from).collect()
    }

    #[instrument(skip(self, input))]
    async fn assign_process(
        &self,
        process_id: &str,
        executor_id: &str,
        input: Vec<serde_json::Value>,
    ) -> Result<Process, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query_as::<_, ProcessRow>(&format!(
            "SELECT {PROCESS_COLUMNS} FROM processes WHERE process_id = $1 FOR UPDATE SKIP LOCKED"
        ))
        .bind(process_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or_else(|| StoreError::not_found("process", process_id))?;

        let process: Process = row.try_into()?;
        if process.state != ProcessState::Waiting {
            return Err(StoreError::InvalidState {
                kind: "process",
                id: process_id.to_string(),
                detail: format!("expected waiting, found {}", process.state),
            });
        }

        let now = Utc::now();
        let exec_deadline = rookery_core::process::deadline_after(now, process.spec.max_exec_time);
        let input_json = serde_json::to_value(&input).map_err(ser_err)?;
        sqlx::query(
            r#"
            UPDATE processes
            SET state = 1, is_assigned = TRUE, assigned_executor_id = $2,
                start_time = $3, exec_deadline = $4, input = $5
            WHERE process_id = $1
            "#,
        )
        .bind(process_id)
        .bind(executor_id)
        .bind(now)
        .bind(exec_deadline)
        .bind(input_json)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        let mut assigned = process;
        assigned.input = input;
        assigned.assign(executor_id, now);
        assigned.exec_deadline = exec_deadline;
        Ok(assigned)
    }

    async fn mark_successful(
        &self,
        process_id: &str,
        output: Vec<serde_json::Value>,
    ) -> Result<Process, StoreError> {
        let output_json = serde_json::to_value(&output).map_err(ser_err)?;
        let row = sqlx::query_as::<_, ProcessRow>(&format!(
            r#"
            UPDATE processes
            SET state = 2, is_assigned = FALSE, output = $2, end_time = NOW()
            WHERE process_id = $1 AND state = 1
            RETURNING {PROCESS_COLUMNS}
            "#
        ))
        .bind(process_id)
        .bind(output_json)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => row.try_into(),
            None => {
                let current = self.get_process(process_id).await?;
                Err(StoreError::InvalidState {
                    kind: "process",
                    id: process_id.to_string(),
                    detail: format!("expected running, found {}", current.state),
                })
            }
        }
    }

    async fn mark_failed(
        &self,
        process_id: &str,
        errors: &[String],
    ) -> Result<Process, StoreError> {
        sqlx::query_as::<_, ProcessRow>(&format!(
            r#"
            UPDATE processes
            SET state = 3, is_assigned = FALSE, errors = $2, end_time = NOW()
            WHERE process_id = $1
            RETURNING {PROCESS_COLUMNS}
            "#
        ))
        .bind(process_id)
        .bind(errors)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| StoreError::not_found("process", process_id))?
        .try_into()
    }

    async fn reset_process(&self, process_id: &str) -> Result<Process, StoreError> {
        let row = sqlx::query_as::<_, ProcessRow>(&format!(
            r#"
            UPDATE processes
            SET state = 0, is_assigned = FALSE, assigned_executor_id = '',
                start_time = NULL, exec_deadline = NULL, retries = retries + 1
            WHERE process_id = $1 AND state = 1
            RETURNING {PROCESS_COLUMNS}
            "#
        ))
        .bind(process_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => row.try_into(),
            None => {
                let current = self.get_process(process_id).await?;
                Err(StoreError::InvalidState {
                    kind: "process",
                    id: process_id.to_string(),
                    detail: format!("expected running, found {}", current.state),
                })
            }
        }
    }

    async fn set_wait_for_parents(
        &self,
        process_id: &str,
        wait_for_parents: bool,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE processes SET wait_for_parents = $2 WHERE process_id = $1")
                .bind(process_id)
                .bind(wait_for_parents)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("process", process_id));
        }
        Ok(())
    }

    async fn set_parents(&self, process_id: &str, parents: &[String]) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE processes SET parents = $2 WHERE process_id = $1")
            .bind(process_id)
            .bind(parents)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("process", process_id));
        }
        Ok(())
    }

    async fn set_children(&self, process_id: &str, children: &[String]) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE processes SET children = $2 WHERE process_id = $1")
            .bind(process_id)
            .bind(children)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("process", process_id));
        }
        Ok(())
    }

    async fn find_expired_running(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Process>, StoreError> {
        let rows = sqlx::query_as::<_, ProcessRow>(&format!(
            "SELECT {PROCESS_COLUMNS} FROM processes WHERE state = 1 AND exec_deadline < $1"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(Process::try_from).collect()
    }

    async fn find_expired_waiting(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Process>, StoreError> {
        let rows = sqlx::query_as::<_, ProcessRow>(&format!(
            "SELECT {PROCESS_COLUMNS} FROM processes WHERE state = 0 AND wait_deadline < $1"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(Process::try_from).collect()
    }

    async fn delete_process(&self, process_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM processes WHERE process_id = $1")
            .bind(process_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("process", process_id));
        }
        sqlx::query("DELETE FROM attributes WHERE target_id = $1")
            .bind(process_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_processes_by_colony(&self, colony_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM processes WHERE colony_id = $1")
            .bind(colony_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM attributes WHERE target_colony_id = $1")
            .bind(colony_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_successful_processes_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM processes
            WHERE state = 2 AND process_graph_id = '' AND end_time < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn count_processes(
        &self,
        colony_id: Option<&str>,
        state: ProcessState,
    ) -> Result<i64, StoreError> {
        let count: (i64,) = match colony_id {
            Some(colony_id) => sqlx::query_as(
                "SELECT COUNT(*) FROM processes WHERE colony_id = $1 AND state = $2",
            )
            .bind(colony_id)
            .bind(i32::from(state))
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?,
            None => sqlx::query_as("SELECT COUNT(*) FROM processes WHERE state = $1")
                .bind(i32::from(state))
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?,
        };
        Ok(count.0)
    }

    async fn add_attribute(&self, attribute: &Attribute) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO attributes (attribute_id, target_id, target_colony_id,
                target_process_graph_id, attribute_type, key, value)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&attribute.id)
        .bind(&attribute.target_id)
        .bind(&attribute.target_colony_id)
        .bind(&attribute.target_process_graph_id)
        .bind(i32::from(attribute.attribute_type))
        .bind(&attribute.key)
        .bind(&attribute.value)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "attribute already set on target"))?;
        Ok(())
    }

    async fn get_attribute(&self, attribute_id: &str) -> Result<Attribute, StoreError> {
        sqlx::query_as::<_, AttributeRow>("SELECT * FROM attributes WHERE attribute_id = $1")
            .bind(attribute_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| StoreError::not_found("attribute", attribute_id))?
            .try_into()
    }

    async fn get_attribute_by_key(
        &self,
        target_id: &str,
        key: &str,
        attribute_type: AttributeType,
    ) -> Result<Option<Attribute>, StoreError> {
        sqlx::query_as::<_, AttributeRow>(
            "SELECT * FROM attributes WHERE target_id = $1 AND key = $2 AND attribute_type = $3",
        )
        .bind(target_id)
        .bind(key)
        .bind(i32::from(attribute_type))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(Attribute::try_from)
        .transpose()
    }

    async fn get_attributes(&self, target_id: &str) -> Result<Vec<Attribute>, StoreError> {
        let rows = sqlx::query_as::<_, AttributeRow>(
            "SELECT * FROM attributes WHERE target_id = $1 ORDER BY key",
        )
        .bind(target_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(Attribute::try_from).collect()
    }

    async fn delete_attributes_by_target(&self, target_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM attributes WHERE target_id = $1")
            .bind(target_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn add_graph(&self, graph: &ProcessGraph) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO process_graphs (process_graph_id, colony_id, state,
                submission_time, start_time, end_time, process_ids, roots)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&graph.id)
        .bind(&graph.colony_id)
        .bind(i32::from(graph.state))
        .bind(graph.submission_time)
        .bind(graph.start_time)
        .bind(graph.end_time)
        .bind(&graph.process_ids)
        .bind(&graph.roots)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "process graph already exists"))?;
        Ok(())
    }

    async fn get_graph(&self, graph_id: &str) -> Result<ProcessGraph, StoreError> {
        sqlx::query_as::<_, GraphRow>(
            "SELECT * FROM process_graphs WHERE process_graph_id = $1",
        )
        .bind(graph_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .ok_or_else(|| StoreError::not_found("process graph", graph_id))?
        .try_into()
    }

    async fn find_graphs(
        &self,
        colony_id: &str,
        state: Option<ProcessState>,
        count: usize,
    ) -> Result<Vec<ProcessGraph>, StoreError> {
        let rows = match state {
            Some(state) => sqlx::query_as::<_, GraphRow>(
                r#"
                SELECT * FROM process_graphs WHERE colony_id = $1 AND state = $2
                ORDER BY submission_time LIMIT $3
                "#,
            )
            .bind(colony_id)
            .bind(i32::from(state))
            .bind(count as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?,
            None => sqlx::query_as::<_, GraphRow>(
                r#"
                SELECT * FROM process_graphs WHERE colony_id = $1
                ORDER BY submission_time LIMIT $2
                "#,
            )
            .bind(colony_id)
            .bind(count as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?,
        };
        rows.into_iter().map(ProcessGraph::try_from).collect()
    }

    async fn update_graph(&self, graph: &ProcessGraph) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE process_graphs
            SET state = $2, start_time = $3, end_time = $4, process_ids = $5, roots = $6
            WHERE process_graph_id = $1
            "#,
        )
        .bind(&graph.id)
        .bind(i32::from(graph.state))
        .bind(graph.start_time)
        .bind(graph.end_time)
        .bind(&graph.process_ids)
        .bind(&graph.roots)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("process graph", &graph.id));
        }
        Ok(())
    }

    async fn delete_graph(&self, graph_id: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let row = sqlx::query_as::<_, GraphRow>(
            "SELECT * FROM process_graphs WHERE process_graph_id = $1",
        )
        .bind(graph_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?
        .ok_or_else(|| StoreError::not_found("process graph", graph_id))?;

        sqlx::query("DELETE FROM attributes WHERE target_id = ANY($1)")
            .bind(&row.process_ids)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM processes WHERE process_id = ANY($1)")
            .bind(&row.process_ids)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM process_graphs WHERE process_graph_id = $1")
            .bind(graph_id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn delete_successful_graphs_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let expired: Vec<(String,)> = sqlx::query_as(
            "SELECT process_graph_id FROM process_graphs WHERE state = 2 AND end_time < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        let deleted = expired.len() as u64;
        for (graph_id,) in expired {
            self.delete_graph(&graph_id).await?;
        }
        Ok(deleted)
    }

    async fn count_graphs(
        &self,
        colony_id: Option<&str>,
        state: ProcessState,
    ) -> Result<i64, StoreError> {
        let count: (i64,) = match colony_id {
            Some(colony_id) => sqlx::query_as(
                "SELECT COUNT(*) FROM process_graphs WHERE colony_id = $1 AND state = $2",
            )
            .bind(colony_id)
            .bind(i32::from(state))
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?,
            None => sqlx::query_as("SELECT COUNT(*) FROM process_graphs WHERE state = $1")
                .bind(i32::from(state))
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?,
        };
        Ok(count.0)
    }

    async fn add_generator(&self, generator: &Generator) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO generators (generator_id, colony_id, name, workflow_spec,
                trigger_count, timeout_seconds, last_run, first_pack, checker_period)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&generator.id)
        .bind(&generator.colony_id)
        .bind(&generator.name)
        .bind(&generator.workflow_spec)
        .bind(generator.trigger)
        .bind(generator.timeout)
        .bind(generator.last_run)
        .bind(generator.first_pack)
        .bind(generator.checker_period)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "generator name already taken in colony"))?;
        Ok(())
    }

    async fn get_generator(&self, generator_id: &str) -> Result<Generator, StoreError> {
        Ok(sqlx::query_as::<_, GeneratorRow>(
            "SELECT * FROM generators WHERE generator_id = $1",
        )
        .bind(generator_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(Generator::from)
        .ok_or_else(|| StoreError::not_found("generator", generator_id))?)
    }

    async fn get_generator_by_name(
        &self,
        colony_id: &str,
        name: &str,
    ) -> Result<Option<Generator>, StoreError> {
        Ok(sqlx::query_as::<_, GeneratorRow>(
            "SELECT * FROM generators WHERE colony_id = $1 AND name = $2",
        )
        .bind(colony_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?
        .map(Generator::from))
    }

    async fn get_generators(&self, colony_id: &str) -> Result<Vec<Generator>, StoreError> {
        let rows = sqlx::query_as::<_, GeneratorRow>(
            "SELECT * FROM generators WHERE colony_id = $1 ORDER BY name",
        )
        .bind(colony_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Generator::from).collect())
    }

    async fn all_generators(&self) -> Result<Vec<Generator>, StoreError> {
        let rows = sqlx::query_as::<_, GeneratorRow>("SELECT * FROM generators")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(Generator::from).collect())
    }

    async fn update_generator(&self, generator: &Generator) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE generators
            SET workflow_spec = $2, trigger_count = $3, timeout_seconds = $4,
                last_run = $5, first_pack = $6, checker_period = $7
            WHERE generator_id = $1
            "#,
        )
        .bind(&generator.id)
        .bind(&generator.workflow_spec)
        .bind(generator.trigger)
        .bind(generator.timeout)
        .bind(generator.last_run)
        .bind(generator.first_pack)
        .bind(generator.checker_period)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("generator", &generator.id));
        }
        Ok(())
    }

    async fn delete_generator(&self, generator_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM generators WHERE generator_id = $1")
            .bind(generator_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("generator", generator_id));
        }
        sqlx::query("DELETE FROM generator_args WHERE generator_id = $1")
            .bind(generator_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn add_generator_arg(&self, arg: &GeneratorArg) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO generator_args (generator_arg_id, generator_id, colony_id, arg)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&arg.id)
        .bind(&arg.generator_id)
        .bind(&arg.colony_id)
        .bind(&arg.arg)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn count_generator_args(&self, generator_id: &str) -> Result<i64, StoreError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM generator_args WHERE generator_id = $1")
                .bind(generator_id)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(count.0)
    }

    async fn get_generator_args(
        &self,
        generator_id: &str,
        count: usize,
    ) -> Result<Vec<GeneratorArg>, StoreError> {
        let rows = sqlx::query_as::<_, GeneratorArgRow>(
            r#"
            SELECT generator_arg_id, generator_id, colony_id, arg
            FROM generator_args WHERE generator_id = $1
            ORDER BY seq LIMIT $2
            "#,
        )
        .bind(generator_id)
        .bind(count as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(GeneratorArg::from).collect())
    }

    async fn delete_generator_arg(&self, arg_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM generator_args WHERE generator_arg_id = $1")
            .bind(arg_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("generator arg", arg_id));
        }
        Ok(())
    }

    async fn add_cron(&self, cron: &Cron) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO crons (cron_id, colony_id, name, cron_expression, interval_seconds,
                random, next_run, last_run, workflow_spec, prev_process_graph_id,
                wait_for_prev, checker_period)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&cron.id)
        .bind(&cron.colony_id)
        .bind(&cron.name)
        .bind(&cron.cron_expression)
        .bind(cron.interval)
        .bind(cron.random)
        .bind(cron.next_run)
        .bind(cron.last_run)
        .bind(&cron.workflow_spec)
        .bind(&cron.prev_process_graph_id)
        .bind(cron.wait_for_prev_process_graph)
        .bind(cron.checker_period)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or_db(e, "cron name already taken in colony"))?;
        Ok(())
    }

    async fn get_cron(&self, cron_id: &str) -> Result<Cron, StoreError> {
        Ok(
            sqlx::query_as::<_, CronRow>("SELECT * FROM crons WHERE cron_id = $1")
                .bind(cron_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?
                .map(Cron::from)
                .ok_or_else(|| StoreError::not_found("cron", cron_id))?,
        )
    }

    async fn get_crons(&self, colony_id: &str) -> Result<Vec<Cron>, StoreError> {
        let rows = sqlx::query_as::<_, CronRow>(
            "SELECT * FROM crons WHERE colony_id = $1 ORDER BY name",
        )
        .bind(colony_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(Cron::from).collect())
    }

    async fn all_crons(&self) -> Result<Vec<Cron>, StoreError> {
        let rows = sqlx::query_as::<_, CronRow>("SELECT * FROM crons")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(rows.into_iter().map(Cron::from).collect())
    }

    async fn update_cron(&self, cron: &Cron) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE crons
            SET cron_expression = $2, interval_seconds = $3, random = $4, next_run = $5,
                last_run = $6, workflow_spec = $7, prev_process_graph_id = $8,
                wait_for_prev = $9, checker_period = $10
            WHERE cron_id = $1
            "#,
        )
        .bind(&cron.id)
        .bind(&cron.cron_expression)
        .bind(cron.interval)
        .bind(cron.random)
        .bind(cron.next_run)
        .bind(cron.last_run)
        .bind(&cron.workflow_spec)
        .bind(&cron.prev_process_graph_id)
        .bind(cron.wait_for_prev_process_graph)
        .bind(cron.checker_period)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("cron", &cron.id));
        }
        Ok(())
    }

    async fn delete_cron(&self, cron_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM crons WHERE cron_id = $1")
            .bind(cron_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("cron", cron_id));
        }
        Ok(())
    }

    async fn lock(&self, timeout: Duration) -> Result<(), StoreError> {
        let mut held = self.lock_conn.lock().await;
        if held.is_some() {
            return Err(StoreError::LockTimeout);
        }
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let acquired: (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock($1)")
                .bind(CONTROLLER_LOCK_KEY)
                .fetch_one(&mut *conn)
                .await
                .map_err(db_err)?;
            if acquired.0 {
                *held = Some(conn);
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(StoreError::LockTimeout);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    async fn unlock(&self) -> Result<(), StoreError> {
        let mut held = self.lock_conn.lock().await;
        if let Some(mut conn) = held.take() {
            sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(CONTROLLER_LOCK_KEY)
                .execute(&mut *conn)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    async fn count_colonies(&self) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM colonies")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(count.0)
    }

    async fn count_executors(&self, colony_id: Option<&str>) -> Result<i64, StoreError> {
        let count: (i64,) = match colony_id {
            Some(colony_id) => {
                sqlx::query_as("SELECT COUNT(*) FROM executors WHERE colony_id = $1")
                    .bind(colony_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(db_err)?
            }
            None => sqlx::query_as("SELECT COUNT(*) FROM executors")
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?,
        };
        Ok(count.0)
    }
}
