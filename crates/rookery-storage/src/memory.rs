//! In-memory implementation of the repository for tests and dev mode

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rookery_core::{
    Attribute, AttributeType, Colony, Cron, Executor, ExecutorState, Function, Generator,
    GeneratorArg, Process, ProcessGraph, ProcessState,
};
use tokio::sync::OwnedMutexGuard;

use crate::repository::{Repository, StoreError};

/// In-memory repository.
///
/// Primarily for tests and single-node dev mode; semantics match the
/// PostgreSQL implementation, including transition atomicity (each mutation
/// happens under one write guard).
#[derive(Default)]
pub struct InMemoryRepository {
    colonies: RwLock<HashMap<String, Colony>>,
    executors: RwLock<HashMap<String, Executor>>,
    functions: RwLock<HashMap<String, Function>>,
    processes: RwLock<HashMap<String, Process>>,
    attributes: RwLock<HashMap<String, Attribute>>,
    graphs: RwLock<HashMap<String, ProcessGraph>>,
    generators: RwLock<HashMap<String, Generator>>,
    generator_args: RwLock<Vec<GeneratorArg>>,
    crons: RwLock<HashMap<String, Cron>>,
    controller_lock: Arc<tokio::sync::Mutex<()>>,
    held_guard: Mutex<Option<OwnedMutexGuard<()>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored processes (for tests).
    pub fn process_count(&self) -> usize {
        self.processes.read().len()
    }

    /// Drop all data (for tests).
    pub fn clear(&self) {
        self.colonies.write().clear();
        self.executors.write().clear();
        self.functions.write().clear();
        self.processes.write().clear();
        self.attributes.write().clear();
        self.graphs.write().clear();
        self.generators.write().clear();
        self.generator_args.write().clear();
        self.crons.write().clear();
    }
}

fn candidate_order(a: &Process, b: &Process) -> std::cmp::Ordering {
    b.spec
        .priority
        .cmp(&a.spec.priority)
        .then(a.priority_time.cmp(&b.priority_time))
        .then(a.id.cmp(&b.id))
}

#[async_trait]
impl Repository for InMemoryRepository {
    // =========================================================================
    // Colonies
    // =========================================================================

    async fn add_colony(&self, colony: &Colony) -> Result<(), StoreError> {
        let mut colonies = self.colonies.write();
        if colonies.contains_key(&colony.id) {
            return Err(StoreError::Conflict(format!(
                "colony {} already exists",
                colony.id
            )));
        }
        colonies.insert(colony.id.clone(), colony.clone());
        Ok(())
    }

    async fn get_colony(&self, colony_id: &str) -> Result<Colony, StoreError> {
        self.colonies
            .read()
            .get(colony_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("colony", colony_id))
    }

    async fn get_colonies(&self) -> Result<Vec<Colony>, StoreError> {
        Ok(self.colonies.read().values().cloned().collect())
    }

    async fn delete_colony(&self, colony_id: &str) -> Result<(), StoreError> {
        self.colonies
            .write()
            .remove(colony_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("colony", colony_id))
    }

    // =========================================================================
    // Executors
    // =========================================================================

    async fn add_executor(&self, executor: &Executor) -> Result<(), StoreError> {
        let mut executors = self.executors.write();
        if executors.contains_key(&executor.id) {
            return Err(StoreError::Conflict(format!(
                "executor {} already exists",
                executor.id
            )));
        }
        if executors
            .values()
            .any(|e| e.colony_id == executor.colony_id && e.name == executor.name)
        {
            return Err(StoreError::Conflict(format!(
                "executor name {} already taken in colony",
                executor.name
            )));
        }
        executors.insert(executor.id.clone(), executor.clone());
        Ok(())
    }

    async fn get_executor(&self, executor_id: &str) -> Result<Executor, StoreError> {
        self.executors
            .read()
            .get(executor_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("executor", executor_id))
    }

    async fn get_executor_by_name(
        &self,
        colony_id: &str,
        name: &str,
    ) -> Result<Option<Executor>, StoreError> {
        Ok(self
            .executors
            .read()
            .values()
            .find(|e| e.colony_id == colony_id && e.name == name)
            .cloned())
    }

    async fn get_executors(&self, colony_id: &str) -> Result<Vec<Executor>, StoreError> {
        let mut executors: Vec<Executor> = self
            .executors
            .read()
            .values()
            .filter(|e| e.colony_id == colony_id)
            .cloned()
            .collect();
        executors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(executors)
    }

    async fn set_executor_state(
        &self,
        executor_id: &str,
        state: ExecutorState,
    ) -> Result<(), StoreError> {
        let mut executors = self.executors.write();
        let executor = executors
            .get_mut(executor_id)
            .ok_or_else(|| StoreError::not_found("executor", executor_id))?;
        executor.state = state;
        Ok(())
    }

    async fn mark_executor_alive(&self, executor_id: &str) -> Result<(), StoreError> {
        let mut executors = self.executors.write();
        let executor = executors
            .get_mut(executor_id)
            .ok_or_else(|| StoreError::not_found("executor", executor_id))?;
        executor.last_heard_from_time = Utc::now();
        Ok(())
    }

    async fn delete_executor(&self, executor_id: &str) -> Result<(), StoreError> {
        self.executors
            .write()
            .remove(executor_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("executor", executor_id))?;
        self.functions
            .write()
            .retain(|_, f| f.executor_id != executor_id);
        Ok(())
    }

    // =========================================================================
    // Functions
    // =========================================================================

    async fn add_function(&self, function: &Function) -> Result<(), StoreError> {
        let mut functions = self.functions.write();
        if functions
            .values()
            .any(|f| f.executor_id == function.executor_id && f.func_name == function.func_name)
        {
            return Err(StoreError::Conflict(format!(
                "function {} already registered for executor",
                function.func_name
            )));
        }
        functions.insert(function.function_id.clone(), function.clone());
        Ok(())
    }

    async fn get_function(
        &self,
        executor_id: &str,
        func_name: &str,
    ) -> Result<Option<Function>, StoreError> {
        Ok(self
            .functions
            .read()
            .values()
            .find(|f| f.executor_id == executor_id && f.func_name == func_name)
            .cloned())
    }

    async fn get_functions_by_executor(
        &self,
        executor_id: &str,
    ) -> Result<Vec<Function>, StoreError> {
        Ok(self
            .functions
            .read()
            .values()
            .filter(|f| f.executor_id == executor_id)
            .cloned()
            .collect())
    }

    async fn get_functions_by_colony(&self, colony_id: &str) -> Result<Vec<Function>, StoreError> {
        Ok(self
            .functions
            .read()
            .values()
            .filter(|f| f.colony_id == colony_id)
            .cloned()
            .collect())
    }

    async fn update_function_stats(&self, function: &Function) -> Result<(), StoreError> {
        let mut functions = self.functions.write();
        if !functions.contains_key(&function.function_id) {
            return Err(StoreError::not_found("function", &function.function_id));
        }
        functions.insert(function.function_id.clone(), function.clone());
        Ok(())
    }

    async fn delete_function(&self, function_id: &str) -> Result<(), StoreError> {
        self.functions
            .write()
            .remove(function_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("function", function_id))
    }

    // =========================================================================
    // Processes
    // =========================================================================

    async fn add_process(&self, process: &Process) -> Result<(), StoreError> {
        let mut processes = self.processes.write();
        if processes.contains_key(&process.id) {
            return Err(StoreError::Conflict(format!(
                "process {} already exists",
                process.id
            )));
        }
        processes.insert(process.id.clone(), process.clone());
        Ok(())
    }

    async fn get_process(&self, process_id: &str) -> Result<Process, StoreError> {
        self.processes
            .read()
            .get(process_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("process", process_id))
    }

    async fn get_processes(&self, process_ids: &[String]) -> Result<Vec<Process>, StoreError> {
        let processes = self.processes.read();
        process_ids
            .iter()
            .map(|id| {
                processes
                    .get(id)
                    .cloned()
                    .ok_or_else(|| StoreError::not_found("process", id))
            })
            .collect()
    }

    async fn find_processes(
        &self,
        colony_id: &str,
        state: ProcessState,
        count: usize,
    ) -> Result<Vec<Process>, StoreError> {
        let mut matches: Vec<Process> = self
            .processes
            .read()
            .values()
            .filter(|p| p.spec.conditions.colony_id == colony_id && p.state == state)
            .cloned()
            .collect();
        matches.sort_by(candidate_order);
        matches.truncate(count);
        Ok(matches)
    }

    async fn candidates(
        &self,
        colony_id: &str,
        executor_type: &str,
        count: usize,
    ) -> Result<Vec<Process>, StoreError> {
        let mut matches: Vec<Process> = self
            .processes
            .read()
            .values()
            .filter(|p| {
                p.state == ProcessState::Waiting
                    && !p.wait_for_parents
                    && p.spec.conditions.colony_id == colony_id
                    && (p.spec.conditions.executor_type.is_empty()
                        || p.spec.conditions.executor_type == executor_type)
            })
            .cloned()
            .collect();
        matches.sort_by(candidate_order);
        matches.truncate(count);
        Ok(matches)
    }

    async fn assign_process(
        &self,
        process_id: &str,
        executor_id: &str,
        input: Vec<serde_json::Value>,
    ) -> Result<Process, StoreError> {
        let mut processes = self.processes.write();
        let process = processes
            .get_mut(process_id)
            .ok_or_else(|| StoreError::not_found("process", process_id))?;
        if process.state != ProcessState::Waiting {
            return Err(StoreError::InvalidState {
                kind: "process",
                id: process_id.to_string(),
                detail: format!("expected waiting, found {}", process.state),
            });
        }
        process.input = input;
        process.assign(executor_id, Utc::now());
        Ok(process.clone())
    }

    async fn mark_successful(
        &self,
        process_id: &str,
        output: Vec<serde_json::Value>,
    ) -> Result<Process, StoreError> {
        let mut processes = self.processes.write();
        let process = processes
            .get_mut(process_id)
            .ok_or_else(|| StoreError::not_found("process", process_id))?;
        if process.state != ProcessState::Running {
            return Err(StoreError::InvalidState {
                kind: "process",
                id: process_id.to_string(),
                detail: format!("expected running, found {}", process.state),
            });
        }
        process.state = ProcessState::Success;
        process.is_assigned = false;
        process.output = output;
        process.end_time = Some(Utc::now());
        Ok(process.clone())
    }

    async fn mark_failed(
        &self,
        process_id: &str,
        errors: &[String],
    ) -> Result<Process, StoreError> {
        let mut processes = self.processes.write();
        let process = processes
            .get_mut(process_id)
            .ok_or_else(|| StoreError::not_found("process", process_id))?;
        process.state = ProcessState::Failed;
        process.is_assigned = false;
        process.errors = errors.to_vec();
        process.end_time = Some(Utc::now());
        Ok(process.clone())
    }

    async fn reset_process(&self, process_id: &str) -> Result<Process, StoreError> {
        let mut processes = self.processes.write();
        let process = processes
            .get_mut(process_id)
            .ok_or_else(|| StoreError::not_found("process", process_id))?;
        if process.state != ProcessState::Running {
            return Err(StoreError::InvalidState {
                kind: "process",
                id: process_id.to_string(),
                detail: format!("expected running, found {}", process.state),
            });
        }
        process.unassign();
        process.retries += 1;
        Ok(process.clone())
    }

    async fn set_wait_for_parents(
        &self,
        process_id: &str,
        wait_for_parents: bool,
    ) -> Result<(), StoreError> {
        let mut processes = self.processes.write();
        let process = processes
            .get_mut(process_id)
            .ok_or_else(|| StoreError::not_found("process", process_id))?;
        process.wait_for_parents = wait_for_parents;
        Ok(())
    }

    async fn set_parents(&self, process_id: &str, parents: &[String]) -> Result<(), StoreError> {
        let mut processes = self.processes.write();
        let process = processes
            .get_mut(process_id)
            .ok_or_else(|| StoreError::not_found("process", process_id))?;
        process.parents = parents.to_vec();
        Ok(())
    }

    async fn set_children(&self, process_id: &str, children: &[String]) -> Result<(), StoreError> {
        let mut processes = self.processes.write();
        let process = processes
            .get_mut(process_id)
            .ok_or_else(|| StoreError::not_found("process", process_id))?;
        process.children = children.to_vec();
        Ok(())
    }

    async fn find_expired_running(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Process>, StoreError> {
        Ok(self
            .processes
            .read()
            .values()
            .filter(|p| {
                p.state == ProcessState::Running
                    && p.exec_deadline.map(|d| d < now).unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn find_expired_waiting(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Process>, StoreError> {
        Ok(self
            .processes
            .read()
            .values()
            .filter(|p| {
                p.state == ProcessState::Waiting
                    && p.wait_deadline.map(|d| d < now).unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn delete_process(&self, process_id: &str) -> Result<(), StoreError> {
        self.processes
            .write()
            .remove(process_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("process", process_id))?;
        self.attributes
            .write()
            .retain(|_, a| a.target_id != process_id);
        Ok(())
    }

    async fn delete_processes_by_colony(&self, colony_id: &str) -> Result<(), StoreError> {
        self.processes
            .write()
            .retain(|_, p| p.spec.conditions.colony_id != colony_id);
        self.attributes
            .write()
            .retain(|_, a| a.target_colony_id != colony_id);
        Ok(())
    }

    async fn delete_successful_processes_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut processes = self.processes.write();
        let before = processes.len();
        processes.retain(|_, p| {
            !(p.state == ProcessState::Success
                && p.process_graph_id.is_empty()
                && p.end_time.map(|t| t < cutoff).unwrap_or(false))
        });
        Ok((before - processes.len()) as u64)
    }

    async fn count_processes(
        &self,
        colony_id: Option<&str>,
        state: ProcessState,
    ) -> Result<i64, StoreError> {
        Ok(self
            .processes
            .read()
            .values()
            .filter(|p| {
                p.state == state
                    && colony_id
                        .map(|c| p.spec.conditions.colony_id == c)
                        .unwrap_or(true)
            })
            .count() as i64)
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    async fn add_attribute(&self, attribute: &Attribute) -> Result<(), StoreError> {
        let mut attributes = self.attributes.write();
        if attributes.contains_key(&attribute.id) {
            return Err(StoreError::Conflict(format!(
                "attribute {} already set on target",
                attribute.key
            )));
        }
        attributes.insert(attribute.id.clone(), attribute.clone());
        Ok(())
    }

    async fn get_attribute(&self, attribute_id: &str) -> Result<Attribute, StoreError> {
        self.attributes
            .read()
            .get(attribute_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("attribute", attribute_id))
    }

    async fn get_attribute_by_key(
        &self,
        target_id: &str,
        key: &str,
        attribute_type: AttributeType,
    ) -> Result<Option<Attribute>, StoreError> {
        Ok(self
            .attributes
            .read()
            .values()
            .find(|a| {
                a.target_id == target_id && a.key == key && a.attribute_type == attribute_type
            })
            .cloned())
    }

    async fn get_attributes(&self, target_id: &str) -> Result<Vec<Attribute>, StoreError> {
        Ok(self
            .attributes
            .read()
            .values()
            .filter(|a| a.target_id == target_id)
            .cloned()
            .collect())
    }

    async fn delete_attributes_by_target(&self, target_id: &str) -> Result<(), StoreError> {
        self.attributes
            .write()
            .retain(|_, a| a.target_id != target_id);
        Ok(())
    }

    // =========================================================================
    // Process graphs
    // =========================================================================

    async fn add_graph(&self, graph: &ProcessGraph) -> Result<(), StoreError> {
        let mut graphs = self.graphs.write();
        if graphs.contains_key(&graph.id) {
            return Err(StoreError::Conflict(format!(
                "process graph {} already exists",
                graph.id
            )));
        }
        graphs.insert(graph.id.clone(), graph.clone());
        Ok(())
    }

    async fn get_graph(&self, graph_id: &str) -> Result<ProcessGraph, StoreError> {
        self.graphs
            .read()
            .get(graph_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("process graph", graph_id))
    }

    async fn find_graphs(
        &self,
        colony_id: &str,
        state: Option<ProcessState>,
        count: usize,
    ) -> Result<Vec<ProcessGraph>, StoreError> {
        let mut matches: Vec<ProcessGraph> = self
            .graphs
            .read()
            .values()
            .filter(|g| g.colony_id == colony_id && state.map(|s| g.state == s).unwrap_or(true))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.submission_time.cmp(&b.submission_time));
        matches.truncate(count);
        Ok(matches)
    }

    async fn update_graph(&self, graph: &ProcessGraph) -> Result<(), StoreError> {
        let mut graphs = self.graphs.write();
        if !graphs.contains_key(&graph.id) {
            return Err(StoreError::not_found("process graph", &graph.id));
        }
        graphs.insert(graph.id.clone(), graph.clone());
        Ok(())
    }

    async fn delete_graph(&self, graph_id: &str) -> Result<(), StoreError> {
        let graph = self
            .graphs
            .write()
            .remove(graph_id)
            .ok_or_else(|| StoreError::not_found("process graph", graph_id))?;
        let mut processes = self.processes.write();
        let mut attributes = self.attributes.write();
        for process_id in &graph.process_ids {
            processes.remove(process_id);
            attributes.retain(|_, a| a.target_id != *process_id);
        }
        Ok(())
    }

    async fn delete_successful_graphs_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let expired: Vec<String> = self
            .graphs
            .read()
            .values()
            .filter(|g| {
                g.state == ProcessState::Success
                    && g.end_time.map(|t| t < cutoff).unwrap_or(false)
            })
            .map(|g| g.id.clone())
            .collect();
        let deleted = expired.len() as u64;
        for graph_id in expired {
            self.delete_graph(&graph_id).await?;
        }
        Ok(deleted)
    }

    async fn count_graphs(
        &self,
        colony_id: Option<&str>,
        state: ProcessState,
    ) -> Result<i64, StoreError> {
        Ok(self
            .graphs
            .read()
            .values()
            .filter(|g| {
                g.state == state && colony_id.map(|c| g.colony_id == c).unwrap_or(true)
            })
            .count() as i64)
    }

    // =========================================================================
    // Generators
    // =========================================================================

    async fn add_generator(&self, generator: &Generator) -> Result<(), StoreError> {
        let mut generators = self.generators.write();
        if generators
            .values()
            .any(|g| g.colony_id == generator.colony_id && g.name == generator.name)
        {
            return Err(StoreError::Conflict(format!(
                "generator name {} already taken in colony",
                generator.name
            )));
        }
        generators.insert(generator.id.clone(), generator.clone());
        Ok(())
    }

    async fn get_generator(&self, generator_id: &str) -> Result<Generator, StoreError> {
        self.generators
            .read()
            .get(generator_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("generator", generator_id))
    }

    async fn get_generator_by_name(
        &self,
        colony_id: &str,
        name: &str,
    ) -> Result<Option<Generator>, StoreError> {
        Ok(self
            .generators
            .read()
            .values()
            .find(|g| g.colony_id == colony_id && g.name == name)
            .cloned())
    }

    async fn get_generators(&self, colony_id: &str) -> Result<Vec<Generator>, StoreError> {
        Ok(self
            .generators
            .read()
            .values()
            .filter(|g| g.colony_id == colony_id)
            .cloned()
            .collect())
    }

    async fn all_generators(&self) -> Result<Vec<Generator>, StoreError> {
        Ok(self.generators.read().values().cloned().collect())
    }

    async fn update_generator(&self, generator: &Generator) -> Result<(), StoreError> {
        let mut generators = self.generators.write();
        if !generators.contains_key(&generator.id) {
            return Err(StoreError::not_found("generator", &generator.id));
        }
        generators.insert(generator.id.clone(), generator.clone());
        Ok(())
    }

    async fn delete_generator(&self, generator_id: &str) -> Result<(), StoreError> {
        self.generators
            .write()
            .remove(generator_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("generator", generator_id))?;
        self.generator_args
            .write()
            .retain(|a| a.generator_id != generator_id);
        Ok(())
    }

    async fn add_generator_arg(&self, arg: &GeneratorArg) -> Result<(), StoreError> {
        self.generator_args.write().push(arg.clone());
        Ok(())
    }

    async fn count_generator_args(&self, generator_id: &str) -> Result<i64, StoreError> {
        Ok(self
            .generator_args
            .read()
            .iter()
            .filter(|a| a.generator_id == generator_id)
            .count() as i64)
    }

    async fn get_generator_args(
        &self,
        generator_id: &str,
        count: usize,
    ) -> Result<Vec<GeneratorArg>, StoreError> {
        Ok(self
            .generator_args
            .read()
            .iter()
            .filter(|a| a.generator_id == generator_id)
            .take(count)
            .cloned()
            .collect())
    }

    async fn delete_generator_arg(&self, arg_id: &str) -> Result<(), StoreError> {
        let mut args = self.generator_args.write();
        let before = args.len();
        args.retain(|a| a.id != arg_id);
        if args.len() == before {
            return Err(StoreError::not_found("generator arg", arg_id));
        }
        Ok(())
    }

    // =========================================================================
    // Crons
    // =========================================================================

    async fn add_cron(&self, cron: &Cron) -> Result<(), StoreError> {
        let mut crons = self.crons.write();
        if crons
            .values()
            .any(|c| c.colony_id == cron.colony_id && c.name == cron.name)
        {
            return Err(StoreError::Conflict(format!(
                "cron name {} already taken in colony",
                cron.name
            )));
        }
        crons.insert(cron.id.clone(), cron.clone());
        Ok(())
    }

    async fn get_cron(&self, cron_id: &str) -> Result<Cron, StoreError> {
        self.crons
            .read()
            .get(cron_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("cron", cron_id))
    }

    async fn get_crons(&self, colony_id: &str) -> Result<Vec<Cron>, StoreError> {
        Ok(self
            .crons
            .read()
            .values()
            .filter(|c| c.colony_id == colony_id)
            .cloned()
            .collect())
    }

    async fn all_crons(&self) -> Result<Vec<Cron>, StoreError> {
        Ok(self.crons.read().values().cloned().collect())
    }

    async fn update_cron(&self, cron: &Cron) -> Result<(), StoreError> {
        let mut crons = self.crons.write();
        if !crons.contains_key(&cron.id) {
            return Err(StoreError::not_found("cron", &cron.id));
        }
        crons.insert(cron.id.clone(), cron.clone());
        Ok(())
    }

    async fn delete_cron(&self, cron_id: &str) -> Result<(), StoreError> {
        self.crons
            .write()
            .remove(cron_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("cron", cron_id))
    }

    // =========================================================================
    // Controller lock
    // =========================================================================

    async fn lock(&self, timeout: Duration) -> Result<(), StoreError> {
        let guard = tokio::time::timeout(timeout, self.controller_lock.clone().lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout)?;
        *self.held_guard.lock() = Some(guard);
        Ok(())
    }

    async fn unlock(&self) -> Result<(), StoreError> {
        self.held_guard.lock().take();
        Ok(())
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    async fn count_colonies(&self) -> Result<i64, StoreError> {
        Ok(self.colonies.read().len() as i64)
    }

    async fn count_executors(&self, colony_id: Option<&str>) -> Result<i64, StoreError> {
        Ok(self
            .executors
            .read()
            .values()
            .filter(|e| colony_id.map(|c| e.colony_id == c).unwrap_or(true))
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rookery_core::{generate_id, Conditions, FunctionSpec};

    fn repo() -> InMemoryRepository {
        InMemoryRepository::new()
    }

    fn waiting_process(colony_id: &str, executor_type: &str, priority: i32) -> Process {
        Process::from_spec(
            FunctionSpec::new(
                "echo",
                Conditions {
                    colony_id: colony_id.to_string(),
                    executor_type: executor_type.to_string(),
                    ..Default::default()
                },
            )
            .with_priority(priority),
        )
    }

    #[tokio::test]
    async fn test_duplicate_colony_conflicts() {
        let repo = repo();
        let colony = Colony::new(generate_id(), "dev");
        repo.add_colony(&colony).await.unwrap();
        assert!(matches!(
            repo.add_colony(&colony).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_executor_name_conflicts() {
        let repo = repo();
        let colony_id = generate_id();
        let first = Executor::new(generate_id(), "cli", "worker", &colony_id);
        let second = Executor::new(generate_id(), "cli", "worker", &colony_id);
        repo.add_executor(&first).await.unwrap();
        assert!(matches!(
            repo.add_executor(&second).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_candidate_ordering() {
        let repo = repo();
        let colony_id = generate_id();
        let low = waiting_process(&colony_id, "cli", 0);
        let high = waiting_process(&colony_id, "cli", 5);
        let any_type = waiting_process(&colony_id, "", 0);
        let other_type = waiting_process(&colony_id, "gpu", 9);
        for p in [&low, &high, &any_type, &other_type] {
            repo.add_process(p).await.unwrap();
        }

        let candidates = repo.candidates(&colony_id, "cli", 10).await.unwrap();
        let ids: Vec<&str> = candidates.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(candidates.len(), 3);
        assert_eq!(ids[0], high.id);
        assert!(!ids.contains(&other_type.id.as_str()));
    }

    #[tokio::test]
    async fn test_candidates_skip_wait_for_parents() {
        let repo = repo();
        let colony_id = generate_id();
        let mut blocked = waiting_process(&colony_id, "cli", 0);
        blocked.wait_for_parents = true;
        repo.add_process(&blocked).await.unwrap();
        assert!(repo.candidates(&colony_id, "cli", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_assign_requires_waiting() {
        let repo = repo();
        let colony_id = generate_id();
        let process = waiting_process(&colony_id, "cli", 0);
        repo.add_process(&process).await.unwrap();

        let executor_id = generate_id();
        let assigned = repo
            .assign_process(&process.id, &executor_id, vec![])
            .await
            .unwrap();
        assert_eq!(assigned.state, ProcessState::Running);
        assert!(assigned.is_assigned);

        assert!(matches!(
            repo.assign_process(&process.id, &executor_id, vec![]).await,
            Err(StoreError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_reset_increments_retries_and_unassigns() {
        let repo = repo();
        let colony_id = generate_id();
        let process = waiting_process(&colony_id, "cli", 0);
        repo.add_process(&process).await.unwrap();
        repo.assign_process(&process.id, &generate_id(), vec![])
            .await
            .unwrap();

        let reset = repo.reset_process(&process.id).await.unwrap();
        assert_eq!(reset.state, ProcessState::Waiting);
        assert_eq!(reset.retries, 1);
        assert!(!reset.is_assigned);
        assert!(reset.assigned_executor_id.is_empty());
        assert!(reset.start_time.is_none());
    }

    #[tokio::test]
    async fn test_generator_args_fifo() {
        let repo = repo();
        let generator_id = generate_id();
        let colony_id = generate_id();
        for i in 0..5 {
            repo.add_generator_arg(&GeneratorArg::new(&generator_id, &colony_id, i.to_string()))
                .await
                .unwrap();
        }
        assert_eq!(repo.count_generator_args(&generator_id).await.unwrap(), 5);
        let args = repo.get_generator_args(&generator_id, 3).await.unwrap();
        let values: Vec<&str> = args.iter().map(|a| a.arg.as_str()).collect();
        assert_eq!(values, vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn test_delete_graph_cascades() {
        let repo = repo();
        let colony_id = generate_id();
        let process = waiting_process(&colony_id, "cli", 0);
        repo.add_process(&process).await.unwrap();

        let mut graph = ProcessGraph::new(&colony_id);
        graph.process_ids = vec![process.id.clone()];
        graph.roots = vec![process.id.clone()];
        repo.add_graph(&graph).await.unwrap();

        repo.delete_graph(&graph.id).await.unwrap();
        assert!(repo.get_process(&process.id).await.is_err());
    }

    #[tokio::test]
    async fn test_lock_times_out_when_held() {
        let repo = repo();
        repo.lock(Duration::from_millis(50)).await.unwrap();
        assert!(matches!(
            repo.lock(Duration::from_millis(50)).await,
            Err(StoreError::LockTimeout)
        ));
        repo.unlock().await.unwrap();
        repo.lock(Duration::from_millis(50)).await.unwrap();
        repo.unlock().await.unwrap();
    }
}
