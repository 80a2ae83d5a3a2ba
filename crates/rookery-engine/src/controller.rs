//! The controller: command queues, dispatch and periodic loops
//!
//! Every state-changing operation is packaged as a [`Command`], pushed onto a
//! bounded channel and executed by a single worker, which makes all mutating
//! traffic totally ordered per node. A second channel carries the long-wait
//! `Assign`: when no candidate exists the worker installs an event waiter and
//! completes asynchronously, re-enqueueing the command when a matching
//! process event fires. The periodic loops (timeout sweeper, generator and
//! cron triggers, retention) tick on their own tasks and enqueue commands,
//! gated on leadership.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rookery_core::{
    Colony, Cron, Executor, ExecutorState, Function, FunctionSpec, Generator, GeneratorArg,
    Process, ProcessGraph, ProcessState, WorkflowSpec,
};
use rookery_storage::{Repository, StoreError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::cron as cron_schedule;
use crate::error::EngineError;
use crate::events::{EventHandler, EventRelay, LocalRelay};
use crate::generator as generator_trigger;
use crate::graph;
use crate::leader::{LeaderElector, StandaloneElector};

type Reply<T> = oneshot::Sender<Result<T, EngineError>>;

/// Error text attached when an exec deadline exhausts its retries.
pub const MAX_EXEC_TIME_EXCEEDED: &str = "max execution time exceeded";

/// Error text attached when a wait deadline expires.
pub const MAX_WAIT_TIME_EXCEEDED: &str = "max wait time exceeded";

enum Command {
    AddColony {
        colony: Colony,
        reply: Reply<Colony>,
    },
    DeleteColony {
        colony_id: String,
        reply: Reply<()>,
    },
    AddExecutor {
        executor: Executor,
        reply: Reply<Executor>,
    },
    SetExecutorState {
        executor_id: String,
        state: ExecutorState,
        reply: Reply<()>,
    },
    DeleteExecutor {
        executor_id: String,
        reply: Reply<()>,
    },
    AddFunction {
        function: Function,
        reply: Reply<Function>,
    },
    Submit {
        spec: FunctionSpec,
        reply: Reply<Process>,
    },
    SubmitWorkflow {
        spec: WorkflowSpec,
        reply: Reply<ProcessGraph>,
    },
    CloseSuccessful {
        process_id: String,
        executor_id: String,
        output: Vec<serde_json::Value>,
        reply: Reply<Process>,
    },
    CloseFailed {
        process_id: String,
        executor_id: String,
        errors: Vec<String>,
        reply: Reply<Process>,
    },
    AddChild {
        graph_id: String,
        parent_id: String,
        insert_before: Option<String>,
        spec: FunctionSpec,
        as_insert: bool,
        executor_id: String,
        reply: Reply<Process>,
    },
    DeleteProcess {
        process_id: String,
        reply: Reply<()>,
    },
    DeleteGraph {
        graph_id: String,
        reply: Reply<()>,
    },
    AddGenerator {
        generator: Generator,
        reply: Reply<Generator>,
    },
    PackGenerator {
        generator_id: String,
        arg: String,
        reply: Reply<()>,
    },
    DeleteGenerator {
        generator_id: String,
        reply: Reply<()>,
    },
    AddCron {
        cron: Cron,
        reply: Reply<Cron>,
    },
    RunCron {
        cron_id: String,
        reply: Reply<Cron>,
    },
    DeleteCron {
        cron_id: String,
        reply: Reply<()>,
    },
    TriggerGenerators {
        reply: Reply<usize>,
    },
    TriggerCrons {
        reply: Reply<usize>,
    },
    SweepTimeouts {
        reply: Reply<usize>,
    },
    SweepRetention {
        reply: Reply<u64>,
    },
    Assign {
        executor_id: String,
        colony_id: String,
        deadline: Option<tokio::time::Instant>,
        reply: Reply<Process>,
    },
}

struct ControllerInner {
    repo: Arc<dyn Repository>,
    events: Arc<EventHandler>,
    relay: Arc<dyn EventRelay>,
    elector: Arc<dyn LeaderElector>,
    config: ControllerConfig,
    blocking_tx: mpsc::Sender<Command>,
}

/// The scheduling controller.
///
/// Owns the command queues and the event handler; everything else reaches
/// them through the async methods below.
pub struct Controller {
    inner: Arc<ControllerInner>,
    cmd_tx: mpsc::Sender<Command>,
    shutdown_tx: watch::Sender<bool>,
    handles: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl Controller {
    /// Single-node controller: local events, always the leader.
    pub fn new(repo: Arc<dyn Repository>, config: ControllerConfig) -> Self {
        Self::with_cluster(
            repo,
            config,
            Arc::new(LocalRelay),
            Arc::new(StandaloneElector),
        )
    }

    /// Cluster-aware controller with external relay and elector.
    pub fn with_cluster(
        repo: Arc<dyn Repository>,
        config: ControllerConfig,
        relay: Arc<dyn EventRelay>,
        elector: Arc<dyn LeaderElector>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.queue_size);
        let (blocking_tx, blocking_rx) = mpsc::channel(config.queue_size);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(ControllerInner {
            repo,
            events: Arc::new(EventHandler::new()),
            relay,
            elector,
            config,
            blocking_tx,
        });

        let controller = Self {
            inner: Arc::clone(&inner),
            cmd_tx,
            shutdown_tx,
            handles: parking_lot::Mutex::new(Vec::new()),
        };
        controller.spawn_workers(cmd_rx, blocking_rx, shutdown_rx);
        controller
    }

    fn spawn_workers(
        &self,
        cmd_rx: mpsc::Receiver<Command>,
        blocking_rx: mpsc::Receiver<Command>,
        shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut handles = self.handles.lock();
        handles.push(tokio::spawn(drain_queue(
            Arc::clone(&self.inner),
            cmd_rx,
            shutdown_rx.clone(),
        )));
        handles.push(tokio::spawn(drain_queue(
            Arc::clone(&self.inner),
            blocking_rx,
            shutdown_rx.clone(),
        )));
        handles.push(tokio::spawn(sweeper_loop(
            Arc::clone(&self.inner),
            self.cmd_tx.clone(),
            shutdown_rx.clone(),
        )));
        handles.push(tokio::spawn(generator_loop(
            Arc::clone(&self.inner),
            self.cmd_tx.clone(),
            shutdown_rx.clone(),
        )));
        handles.push(tokio::spawn(cron_loop(
            Arc::clone(&self.inner),
            self.cmd_tx.clone(),
            shutdown_rx.clone(),
        )));
        if self.inner.config.retention {
            handles.push(tokio::spawn(retention_loop(
                Arc::clone(&self.inner),
                self.cmd_tx.clone(),
                shutdown_rx,
            )));
        }
    }

    /// Repository handle for boundary reads.
    pub fn repository(&self) -> Arc<dyn Repository> {
        Arc::clone(&self.inner.repo)
    }

    /// Event handler for boundary subscriptions.
    pub fn events(&self) -> Arc<EventHandler> {
        Arc::clone(&self.inner.events)
    }

    /// Ingest an event relayed from a peer node: wake local waiters only.
    pub fn handle_relayed(&self, process: &Process) {
        self.inner.events.signal(process);
    }

    /// Stop all workers and loops. Pending commands get `ShuttingDown`.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.await;
        }
        info!("controller stopped");
    }

    async fn send<T>(
        &self,
        command: Command,
        rx: oneshot::Receiver<Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        self.cmd_tx
            .send_timeout(command, self.inner.config.admission_timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => EngineError::QueueFull,
                mpsc::error::SendTimeoutError::Closed(_) => EngineError::ShuttingDown,
            })?;
        rx.await
            .map_err(|_| EngineError::Internal("command execution aborted".to_string()))?
    }

    // =========================================================================
    // Public API
    // =========================================================================

    pub async fn add_colony(&self, colony: Colony) -> Result<Colony, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddColony { colony, reply }, rx).await
    }

    pub async fn delete_colony(&self, colony_id: &str) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        let colony_id = colony_id.to_string();
        self.send(Command::DeleteColony { colony_id, reply }, rx).await
    }

    pub async fn add_executor(&self, executor: Executor) -> Result<Executor, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddExecutor { executor, reply }, rx).await
    }

    pub async fn approve_executor(&self, executor_id: &str) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        let executor_id = executor_id.to_string();
        self.send(
            Command::SetExecutorState {
                executor_id,
                state: ExecutorState::Approved,
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn reject_executor(&self, executor_id: &str) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        let executor_id = executor_id.to_string();
        self.send(
            Command::SetExecutorState {
                executor_id,
                state: ExecutorState::Rejected,
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn delete_executor(&self, executor_id: &str) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        let executor_id = executor_id.to_string();
        self.send(Command::DeleteExecutor { executor_id, reply }, rx)
            .await
    }

    pub async fn add_function(&self, function: Function) -> Result<Function, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddFunction { function, reply }, rx).await
    }

    pub async fn submit(&self, spec: FunctionSpec) -> Result<Process, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Submit { spec, reply }, rx).await
    }

    pub async fn submit_workflow(&self, spec: WorkflowSpec) -> Result<ProcessGraph, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SubmitWorkflow { spec, reply }, rx).await
    }

    /// Hand a waiting process to the executor, parking up to
    /// `timeout_seconds` (−1 = forever, 0 = non-blocking) when none is
    /// eligible yet.
    pub async fn assign(
        &self,
        executor_id: &str,
        colony_id: &str,
        timeout_seconds: i64,
    ) -> Result<Process, EngineError> {
        let deadline = match timeout_seconds {
            t if t < 0 => None,
            t => Some(tokio::time::Instant::now() + Duration::from_secs(t as u64)),
        };
        let (reply, rx) = oneshot::channel();
        let command = Command::Assign {
            executor_id: executor_id.to_string(),
            colony_id: colony_id.to_string(),
            deadline,
            reply,
        };
        self.inner
            .blocking_tx
            .send_timeout(command, self.inner.config.admission_timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => EngineError::QueueFull,
                mpsc::error::SendTimeoutError::Closed(_) => EngineError::ShuttingDown,
            })?;
        rx.await
            .map_err(|_| EngineError::Internal("command execution aborted".to_string()))?
    }

    pub async fn close_successful(
        &self,
        process_id: &str,
        executor_id: &str,
        output: Vec<serde_json::Value>,
    ) -> Result<Process, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::CloseSuccessful {
                process_id: process_id.to_string(),
                executor_id: executor_id.to_string(),
                output,
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn close_failed(
        &self,
        process_id: &str,
        executor_id: &str,
        errors: Vec<String>,
    ) -> Result<Process, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::CloseFailed {
                process_id: process_id.to_string(),
                executor_id: executor_id.to_string(),
                errors,
                reply,
            },
            rx,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add_child(
        &self,
        graph_id: &str,
        parent_id: &str,
        insert_before: Option<String>,
        spec: FunctionSpec,
        as_insert: bool,
        executor_id: &str,
    ) -> Result<Process, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::AddChild {
                graph_id: graph_id.to_string(),
                parent_id: parent_id.to_string(),
                insert_before,
                spec,
                as_insert,
                executor_id: executor_id.to_string(),
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn delete_process(&self, process_id: &str) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        let process_id = process_id.to_string();
        self.send(Command::DeleteProcess { process_id, reply }, rx)
            .await
    }

    pub async fn delete_graph(&self, graph_id: &str) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        let graph_id = graph_id.to_string();
        self.send(Command::DeleteGraph { graph_id, reply }, rx).await
    }

    pub async fn add_generator(&self, generator: Generator) -> Result<Generator, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddGenerator { generator, reply }, rx)
            .await
    }

    pub async fn pack_generator(&self, generator_id: &str, arg: &str) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(
            Command::PackGenerator {
                generator_id: generator_id.to_string(),
                arg: arg.to_string(),
                reply,
            },
            rx,
        )
        .await
    }

    pub async fn delete_generator(&self, generator_id: &str) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        let generator_id = generator_id.to_string();
        self.send(Command::DeleteGenerator { generator_id, reply }, rx)
            .await
    }

    pub async fn add_cron(&self, cron: Cron) -> Result<Cron, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::AddCron { cron, reply }, rx).await
    }

    /// Force a cron to fire now, regardless of its schedule.
    pub async fn run_cron(&self, cron_id: &str) -> Result<Cron, EngineError> {
        let (reply, rx) = oneshot::channel();
        let cron_id = cron_id.to_string();
        self.send(Command::RunCron { cron_id, reply }, rx).await
    }

    pub async fn delete_cron(&self, cron_id: &str) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        let cron_id = cron_id.to_string();
        self.send(Command::DeleteCron { cron_id, reply }, rx).await
    }

    /// Run one generator trigger pass (also driven periodically when leader).
    pub async fn trigger_generators(&self) -> Result<usize, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::TriggerGenerators { reply }, rx).await
    }

    /// Run one cron trigger pass (also driven periodically when leader).
    pub async fn trigger_crons(&self) -> Result<usize, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::TriggerCrons { reply }, rx).await
    }

    /// Run one timeout sweep (also driven periodically when leader).
    pub async fn sweep_timeouts(&self) -> Result<usize, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SweepTimeouts { reply }, rx).await
    }

    /// Hold until the process reaches `state` or the timeout elapses.
    /// Returns the process immediately when it is already there.
    pub async fn subscribe_process(
        &self,
        process_id: &str,
        state: ProcessState,
        timeout_seconds: i64,
    ) -> Result<Process, EngineError> {
        let subscription = self.inner.events.subscribe_process(process_id, state);
        let current = self.inner.repo.get_process(process_id).await?;
        if current.state == state {
            return Ok(current);
        }
        wait_subscription(subscription, timeout_seconds).await
    }

    /// Hold until any process of the colony/executor type reaches `state`.
    pub async fn subscribe_processes(
        &self,
        colony_id: &str,
        executor_type: &str,
        state: ProcessState,
        timeout_seconds: i64,
    ) -> Result<Process, EngineError> {
        let subscription = self
            .inner
            .events
            .subscribe_colony(colony_id, executor_type, state);
        wait_subscription(subscription, timeout_seconds).await
    }
}

async fn wait_subscription(
    subscription: crate::events::EventSubscription,
    timeout_seconds: i64,
) -> Result<Process, EngineError> {
    let woken = if timeout_seconds < 0 {
        subscription.wait().await
    } else {
        tokio::time::timeout(
            Duration::from_secs(timeout_seconds as u64),
            subscription.wait(),
        )
        .await
        .unwrap_or(None)
    };
    woken.ok_or(EngineError::NoProcessesAvailable)
}

// =============================================================================
// Queue workers
// =============================================================================

async fn drain_queue(
    inner: Arc<ControllerInner>,
    mut rx: mpsc::Receiver<Command>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let command = tokio::select! {
            command = rx.recv() => match command {
                Some(command) => command,
                None => break,
            },
            _ = shutdown.changed() => break,
        };
        // Run on its own task so a panicking command cannot take the worker
        // down; awaiting the handle keeps execution strictly ordered.
        let execution = tokio::spawn(Arc::clone(&inner).execute(command));
        if let Err(e) = execution.await {
            if e.is_panic() {
                tracing::error!("command execution panicked: {}", e);
            }
        }
    }
    debug!("command queue worker stopped");
}

impl ControllerInner {
    async fn execute(self: Arc<Self>, command: Command) {
        match command {
            Command::AddColony { colony, reply } => {
                let result = self.repo.add_colony(&colony).await;
                let _ = reply.send(result.map(|()| colony).map_err(EngineError::from));
            }
            Command::DeleteColony { colony_id, reply } => {
                let _ = reply.send(self.exec_delete_colony(&colony_id).await);
            }
            Command::AddExecutor { executor, reply } => {
                let _ = reply.send(self.exec_add_executor(executor).await);
            }
            Command::SetExecutorState {
                executor_id,
                state,
                reply,
            } => {
                let result = self.repo.set_executor_state(&executor_id, state).await;
                let _ = reply.send(result.map_err(EngineError::from));
            }
            Command::DeleteExecutor { executor_id, reply } => {
                let result = self.repo.delete_executor(&executor_id).await;
                let _ = reply.send(result.map_err(EngineError::from));
            }
            Command::AddFunction { function, reply } => {
                let result = self.repo.add_function(&function).await;
                let _ = reply.send(result.map(|()| function).map_err(EngineError::from));
            }
            Command::Submit { spec, reply } => {
                let _ = reply.send(self.exec_submit(spec).await);
            }
            Command::SubmitWorkflow { spec, reply } => {
                let _ = reply.send(self.exec_submit_workflow(spec).await);
            }
            Command::CloseSuccessful {
                process_id,
                executor_id,
                output,
                reply,
            } => {
                let _ = reply.send(
                    self.exec_close_successful(&process_id, &executor_id, output)
                        .await,
                );
            }
            Command::CloseFailed {
                process_id,
                executor_id,
                errors,
                reply,
            } => {
                let _ = reply.send(
                    self.exec_close_failed(&process_id, &executor_id, errors)
                        .await,
                );
            }
            Command::AddChild {
                graph_id,
                parent_id,
                insert_before,
                spec,
                as_insert,
                executor_id,
                reply,
            } => {
                let _ = reply.send(
                    self.exec_add_child(
                        &graph_id,
                        &parent_id,
                        insert_before.as_deref(),
                        spec,
                        as_insert,
                        &executor_id,
                    )
                    .await,
                );
            }
            Command::DeleteProcess { process_id, reply } => {
                let result = self.repo.delete_process(&process_id).await;
                let _ = reply.send(result.map_err(EngineError::from));
            }
            Command::DeleteGraph { graph_id, reply } => {
                let result = self.repo.delete_graph(&graph_id).await;
                let _ = reply.send(result.map_err(EngineError::from));
            }
            Command::AddGenerator { generator, reply } => {
                let _ = reply.send(self.exec_add_generator(generator).await);
            }
            Command::PackGenerator {
                generator_id,
                arg,
                reply,
            } => {
                let _ = reply.send(self.exec_pack_generator(&generator_id, &arg).await);
            }
            Command::DeleteGenerator { generator_id, reply } => {
                let result = self.repo.delete_generator(&generator_id).await;
                let _ = reply.send(result.map_err(EngineError::from));
            }
            Command::AddCron { cron, reply } => {
                let _ = reply.send(self.exec_add_cron(cron).await);
            }
            Command::RunCron { cron_id, reply } => {
                let _ = reply.send(self.exec_run_cron(&cron_id).await);
            }
            Command::DeleteCron { cron_id, reply } => {
                let result = self.repo.delete_cron(&cron_id).await;
                let _ = reply.send(result.map_err(EngineError::from));
            }
            Command::TriggerGenerators { reply } => {
                let _ = reply.send(self.exec_trigger_generators().await);
            }
            Command::TriggerCrons { reply } => {
                let _ = reply.send(self.exec_trigger_crons().await);
            }
            Command::SweepTimeouts { reply } => {
                let _ = reply.send(self.exec_sweep_timeouts().await);
            }
            Command::SweepRetention { reply } => {
                let _ = reply.send(self.exec_sweep_retention().await);
            }
            Command::Assign {
                executor_id,
                colony_id,
                deadline,
                reply,
            } => {
                Arc::clone(&self)
                    .exec_assign(executor_id, colony_id, deadline, reply)
                    .await;
            }
        }
    }

    fn publish(&self, process: &Process) {
        self.events.signal(process);
        self.relay.publish(process);
    }

    async fn exec_delete_colony(&self, colony_id: &str) -> Result<(), EngineError> {
        self.repo.delete_processes_by_colony(colony_id).await?;
        self.repo.delete_colony(colony_id).await?;
        Ok(())
    }

    async fn exec_add_executor(&self, executor: Executor) -> Result<Executor, EngineError> {
        self.repo.get_colony(&executor.colony_id).await?;
        if self.config.allow_executor_reregister {
            if let Some(existing) = self
                .repo
                .get_executor_by_name(&executor.colony_id, &executor.name)
                .await?
            {
                self.repo.delete_executor(&existing.id).await?;
            }
        }
        self.repo.add_executor(&executor).await?;
        Ok(executor)
    }

    async fn exec_submit(&self, spec: FunctionSpec) -> Result<Process, EngineError> {
        self.repo.get_colony(&spec.conditions.colony_id).await?;
        let process = Process::from_spec(spec);
        self.repo.add_process(&process).await?;
        debug!(process_id = %process.id, "submitted process");
        self.publish(&process);
        Ok(process)
    }

    async fn exec_submit_workflow(
        &self,
        spec: WorkflowSpec,
    ) -> Result<ProcessGraph, EngineError> {
        self.repo.get_colony(&spec.colony_id).await?;
        let (graph, processes) = graph::instantiate(&spec)?;
        self.repo.add_graph(&graph).await?;
        for process in &processes {
            self.repo.add_process(process).await?;
        }
        debug!(graph_id = %graph.id, processes = processes.len(), "submitted workflow");
        for process in processes.iter().filter(|p| !p.wait_for_parents) {
            self.publish(process);
        }
        Ok(graph)
    }

    /// Try to hand one eligible process to the executor right now.
    async fn try_assign(&self, executor: &Executor) -> Result<Option<Process>, EngineError> {
        let candidates = self
            .repo
            .candidates(
                &executor.colony_id,
                &executor.executor_type,
                self.config.assign_batch,
            )
            .await?;
        for candidate in candidates {
            let allowed_ids = &candidate.spec.conditions.executor_ids;
            if !allowed_ids.is_empty() && !allowed_ids.contains(&executor.id) {
                continue;
            }
            if executor.require_func_reg
                && self
                    .repo
                    .get_function(&executor.id, &candidate.spec.func_name)
                    .await?
                    .is_none()
            {
                continue;
            }
            let input = graph::assemble_input(self.repo.as_ref(), &candidate).await?;
            match self
                .repo
                .assign_process(&candidate.id, &executor.id, input)
                .await
            {
                Ok(assigned) => {
                    if !assigned.process_graph_id.is_empty() {
                        graph::recompute_state(self.repo.as_ref(), &assigned.process_graph_id)
                            .await?;
                    }
                    debug!(
                        process_id = %assigned.id,
                        executor_id = %executor.id,
                        "assigned process"
                    );
                    self.publish(&assigned);
                    return Ok(Some(assigned));
                }
                // Lost the race for this candidate; try the next one.
                Err(StoreError::InvalidState { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    async fn exec_assign(
        self: Arc<Self>,
        executor_id: String,
        colony_id: String,
        deadline: Option<tokio::time::Instant>,
        reply: Reply<Process>,
    ) {
        let executor = match self.repo.get_executor(&executor_id).await {
            Ok(executor) => executor,
            Err(e) => {
                let _ = reply.send(Err(e.into()));
                return;
            }
        };
        if executor.colony_id != colony_id {
            let _ = reply.send(Err(EngineError::AccessDenied(
                "executor is not a member of the colony".to_string(),
            )));
            return;
        }
        if !executor.is_approved() {
            let _ = reply.send(Err(EngineError::AccessDenied(
                "executor is not approved".to_string(),
            )));
            return;
        }
        if let Err(e) = self.repo.mark_executor_alive(&executor.id).await {
            let _ = reply.send(Err(e.into()));
            return;
        }

        // Register the waiter before scanning so a submission racing with the
        // scan cannot be missed.
        let subscription = self.events.subscribe_colony(
            &colony_id,
            &executor.executor_type,
            ProcessState::Waiting,
        );
        match self.try_assign(&executor).await {
            Ok(Some(process)) => {
                let _ = reply.send(Ok(process));
            }
            Ok(None) => {
                if deadline.map(|d| d <= tokio::time::Instant::now()) == Some(true) {
                    let _ = reply.send(Err(EngineError::NoProcessesAvailable));
                    return;
                }
                // Park: complete asynchronously, re-enqueueing the command
                // when a matching event fires.
                let inner = Arc::clone(&self);
                tokio::spawn(async move {
                    inner
                        .park_assign(executor_id, colony_id, deadline, subscription, reply)
                        .await;
                });
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    async fn park_assign(
        &self,
        executor_id: String,
        colony_id: String,
        deadline: Option<tokio::time::Instant>,
        subscription: crate::events::EventSubscription,
        mut reply: Reply<Process>,
    ) {
        enum Park {
            Woken,
            TimedOut,
            // Caller abandoned the request; the waiter deregisters on drop.
            Abandoned,
        }

        let outcome = {
            let abandoned = reply.closed();
            tokio::pin!(abandoned);
            tokio::select! {
                () = &mut abandoned => Park::Abandoned,
                woken = subscription.wait() => match woken {
                    Some(_) => Park::Woken,
                    None => Park::TimedOut,
                },
                () = sleep_until(deadline) => Park::TimedOut,
            }
        };

        match outcome {
            Park::Abandoned => {}
            Park::TimedOut => {
                let _ = reply.send(Err(EngineError::NoProcessesAvailable));
            }
            Park::Woken => {
                // A matching process appeared: go through the queue again so
                // the selection still happens on the single worker.
                let command = Command::Assign {
                    executor_id,
                    colony_id,
                    deadline,
                    reply,
                };
                if let Err(mpsc::error::SendError(Command::Assign { reply, .. })) =
                    self.blocking_tx.send(command).await
                {
                    let _ = reply.send(Err(EngineError::ShuttingDown));
                }
            }
        }
    }

    async fn exec_close_successful(
        &self,
        process_id: &str,
        executor_id: &str,
        output: Vec<serde_json::Value>,
    ) -> Result<Process, EngineError> {
        let process = self.repo.get_process(process_id).await?;
        if process.assigned_executor_id != executor_id {
            return Err(EngineError::AccessDenied(
                "process is not assigned to the caller".to_string(),
            ));
        }
        let updated = self.repo.mark_successful(process_id, output).await?;
        self.record_function_stats(&updated).await;

        if !updated.process_graph_id.is_empty() {
            let unblocked = graph::unblock_children(self.repo.as_ref(), &updated).await?;
            graph::recompute_state(self.repo.as_ref(), &updated.process_graph_id).await?;
            for child in &unblocked {
                self.publish(child);
            }
        }
        self.publish(&updated);
        Ok(updated)
    }

    async fn exec_close_failed(
        &self,
        process_id: &str,
        executor_id: &str,
        errors: Vec<String>,
    ) -> Result<Process, EngineError> {
        let process = self.repo.get_process(process_id).await?;
        if process.assigned_executor_id != executor_id {
            return Err(EngineError::AccessDenied(
                "process is not assigned to the caller".to_string(),
            ));
        }
        let updated = self.repo.mark_failed(process_id, &errors).await?;
        self.fail_graph_branch(&updated).await?;
        self.publish(&updated);
        Ok(updated)
    }

    /// Shared failure path: propagate to descendants and refresh the graph.
    async fn fail_graph_branch(&self, failed: &Process) -> Result<(), EngineError> {
        if failed.process_graph_id.is_empty() {
            return Ok(());
        }
        let descendants = graph::fail_descendants(self.repo.as_ref(), failed).await?;
        graph::recompute_state(self.repo.as_ref(), &failed.process_graph_id).await?;
        for process in &descendants {
            self.publish(process);
        }
        Ok(())
    }

    /// Fold a finished process's timings into its function's statistics.
    async fn record_function_stats(&self, process: &Process) {
        let (Some(wait), Some(exec)) = (process.waiting_time(), process.processing_time())
        else {
            return;
        };
        let result = async {
            if let Some(mut function) = self
                .repo
                .get_function(&process.assigned_executor_id, &process.spec.func_name)
                .await?
            {
                function.record_execution(
                    wait.num_milliseconds() as f64 / 1000.0,
                    exec.num_milliseconds() as f64 / 1000.0,
                );
                self.repo.update_function_stats(&function).await?;
            }
            Ok::<(), StoreError>(())
        }
        .await;
        if let Err(e) = result {
            warn!("failed to update function statistics: {}", e);
        }
    }

    async fn exec_add_child(
        &self,
        graph_id: &str,
        parent_id: &str,
        insert_before: Option<&str>,
        spec: FunctionSpec,
        as_insert: bool,
        executor_id: &str,
    ) -> Result<Process, EngineError> {
        let parent = self.repo.get_process(parent_id).await?;
        if parent.state != ProcessState::Running {
            return Err(EngineError::InvalidArgument(
                "parent process is not running".to_string(),
            ));
        }
        if parent.assigned_executor_id != executor_id {
            return Err(EngineError::AccessDenied(
                "parent process is not assigned to the caller".to_string(),
            ));
        }
        let child = graph::add_child(
            self.repo.as_ref(),
            graph_id,
            parent_id,
            insert_before,
            spec,
            as_insert,
        )
        .await?;
        if !child.wait_for_parents {
            self.publish(&child);
        }
        Ok(child)
    }

    async fn exec_add_generator(&self, generator: Generator) -> Result<Generator, EngineError> {
        self.repo.get_colony(&generator.colony_id).await?;
        // Reject templates that could never instantiate.
        generator_trigger::instantiate_template(&generator, &[])?;
        self.repo.add_generator(&generator).await?;
        Ok(generator)
    }

    async fn exec_pack_generator(
        &self,
        generator_id: &str,
        arg: &str,
    ) -> Result<(), EngineError> {
        let mut generator = self.repo.get_generator(generator_id).await?;
        self.repo
            .add_generator_arg(&GeneratorArg::new(
                generator_id,
                &generator.colony_id,
                arg,
            ))
            .await?;
        if generator.first_pack.is_none() {
            generator.first_pack = Some(Utc::now());
            self.repo.update_generator(&generator).await?;
        }
        Ok(())
    }

    /// Periodic passes do compound read-then-write work across many rows;
    /// the coarse repository lock keeps cluster nodes from interleaving a
    /// pass even if leadership flaps mid-tick.
    async fn locked<T, F>(&self, pass: F) -> Result<T, EngineError>
    where
        T: Default,
        F: std::future::Future<Output = Result<T, EngineError>>,
    {
        match self.repo.lock(self.config.lock_timeout).await {
            Ok(()) => {}
            Err(StoreError::LockTimeout) => {
                warn!("controller lock busy, skipping periodic pass");
                return Ok(T::default());
            }
            Err(e) => return Err(e.into()),
        }
        let result = pass.await;
        if let Err(e) = self.repo.unlock().await {
            warn!("failed to release controller lock: {}", e);
        }
        result
    }

    async fn exec_trigger_generators(&self) -> Result<usize, EngineError> {
        self.locked(self.trigger_generators_pass()).await
    }

    async fn trigger_generators_pass(&self) -> Result<usize, EngineError> {
        let mut fired = 0;
        for mut generator in self.repo.all_generators().await? {
            loop {
                let now = Utc::now();
                let count = self.repo.count_generator_args(&generator.id).await?;
                let Some(batch) = generator_trigger::due_batch(&generator, count, now) else {
                    break;
                };
                let args = self.repo.get_generator_args(&generator.id, batch).await?;
                let spec = match generator_trigger::instantiate_template(&generator, &args) {
                    Ok(spec) => spec,
                    Err(e) => {
                        warn!(generator = %generator.name, "generator template rejected: {}", e);
                        break;
                    }
                };
                if let Err(e) = self.exec_submit_workflow(spec).await {
                    warn!(generator = %generator.name, "generator workflow rejected: {}", e);
                    break;
                }
                for arg in &args {
                    self.repo.delete_generator_arg(&arg.id).await?;
                }
                generator.last_run = Some(now);
                if count - args.len() as i64 <= 0 {
                    generator.first_pack = None;
                }
                self.repo.update_generator(&generator).await?;
                fired += 1;
            }
        }
        Ok(fired)
    }

    async fn exec_add_cron(&self, mut cron: Cron) -> Result<Cron, EngineError> {
        self.repo.get_colony(&cron.colony_id).await?;
        if !cron.has_schedule() {
            return Err(EngineError::InvalidArgument(
                "cron needs an expression or an interval".to_string(),
            ));
        }
        // Validates the expression as a side effect.
        cron.next_run = Some(cron_schedule::next_run(&cron, Utc::now())?);
        self.repo.add_cron(&cron).await?;
        Ok(cron)
    }

    async fn exec_run_cron(&self, cron_id: &str) -> Result<Cron, EngineError> {
        let mut cron = self.repo.get_cron(cron_id).await?;
        self.fire_cron(&mut cron).await?;
        Ok(cron)
    }

    async fn exec_trigger_crons(&self) -> Result<usize, EngineError> {
        self.locked(self.trigger_crons_pass()).await
    }

    async fn trigger_crons_pass(&self) -> Result<usize, EngineError> {
        let now = Utc::now();
        let mut fired = 0;
        for mut cron in self.repo.all_crons().await? {
            if cron.next_run.is_none() {
                // Fresh server start: schedule from now, no backlog.
                if let Ok(next) = cron_schedule::next_run(&cron, now) {
                    cron.next_run = Some(next);
                    self.repo.update_cron(&cron).await?;
                }
                continue;
            }
            if !cron_schedule::is_due(&cron, now) {
                continue;
            }
            if cron.wait_for_prev_process_graph && !cron.prev_process_graph_id.is_empty() {
                if let Ok(prev) = self.repo.get_graph(&cron.prev_process_graph_id).await {
                    if !prev.state.is_terminal() {
                        continue;
                    }
                }
            }
            match self.fire_cron(&mut cron).await {
                Ok(()) => fired += 1,
                Err(e) => warn!(cron = %cron.name, "cron firing failed: {}", e),
            }
        }
        Ok(fired)
    }

    async fn fire_cron(&self, cron: &mut Cron) -> Result<(), EngineError> {
        let now = Utc::now();
        // Reschedule first so a bad workflow spec cannot make the cron fire
        // on every tick.
        cron.next_run = Some(cron_schedule::next_run(cron, now)?);
        cron.last_run = Some(now);

        let submit_result = async {
            let mut spec: WorkflowSpec =
                serde_json::from_str(&cron.workflow_spec).map_err(|e| {
                    EngineError::InvalidArgument(format!("bad cron workflow spec: {e}"))
                })?;
            spec.colony_id = cron.colony_id.clone();
            self.exec_submit_workflow(spec).await
        }
        .await;

        match submit_result {
            Ok(graph) => cron.prev_process_graph_id = graph.id,
            Err(e) => {
                self.repo.update_cron(cron).await?;
                return Err(e);
            }
        }
        self.repo.update_cron(cron).await?;
        Ok(())
    }

    async fn exec_sweep_timeouts(&self) -> Result<usize, EngineError> {
        self.locked(self.sweep_timeouts_pass()).await
    }

    async fn sweep_timeouts_pass(&self) -> Result<usize, EngineError> {
        let now = Utc::now();
        let mut transitions = 0;

        for process in self.repo.find_expired_running(now).await? {
            let retry_budget_left =
                process.spec.max_retries < 0 || process.retries < process.spec.max_retries;
            if retry_budget_left {
                match self.repo.reset_process(&process.id).await {
                    Ok(reset) => {
                        debug!(process_id = %reset.id, retries = reset.retries, "exec timeout, retrying");
                        if !reset.process_graph_id.is_empty() {
                            graph::recompute_state(self.repo.as_ref(), &reset.process_graph_id)
                                .await?;
                        }
                        self.publish(&reset);
                        transitions += 1;
                    }
                    Err(StoreError::InvalidState { .. }) => continue,
                    Err(e) => return Err(e.into()),
                }
            } else {
                let failed = self
                    .repo
                    .mark_failed(&process.id, &[MAX_EXEC_TIME_EXCEEDED.to_string()])
                    .await?;
                debug!(process_id = %failed.id, "exec timeout, retries exhausted");
                self.fail_graph_branch(&failed).await?;
                self.publish(&failed);
                transitions += 1;
            }
        }

        for process in self.repo.find_expired_waiting(now).await? {
            let failed = self
                .repo
                .mark_failed(&process.id, &[MAX_WAIT_TIME_EXCEEDED.to_string()])
                .await?;
            debug!(process_id = %failed.id, "wait deadline expired");
            self.fail_graph_branch(&failed).await?;
            self.publish(&failed);
            transitions += 1;
        }
        Ok(transitions)
    }

    async fn exec_sweep_retention(&self) -> Result<u64, EngineError> {
        self.locked(self.sweep_retention_pass()).await
    }

    async fn sweep_retention_pass(&self) -> Result<u64, EngineError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.retention_age)
                .unwrap_or_else(|_| chrono::Duration::seconds(3600));
        let processes = self.repo.delete_successful_processes_before(cutoff).await?;
        let graphs = self.repo.delete_successful_graphs_before(cutoff).await?;
        if processes + graphs > 0 {
            info!(processes, graphs, "retention sweep deleted old entries");
        }
        Ok(processes + graphs)
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// =============================================================================
// Periodic loops (leader-gated)
// =============================================================================

async fn periodic<F>(
    inner: Arc<ControllerInner>,
    cmd_tx: mpsc::Sender<Command>,
    mut shutdown: watch::Receiver<bool>,
    period: Duration,
    make_command: F,
) where
    F: Fn(oneshot::Sender<Result<usize, EngineError>>) -> Command,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if !inner.elector.is_leader() {
            continue;
        }
        let (reply, rx) = oneshot::channel();
        if cmd_tx.send(make_command(reply)).await.is_err() {
            break;
        }
        match rx.await {
            Ok(Err(e)) => warn!("periodic pass failed: {}", e),
            Err(_) => break,
            _ => {}
        }
    }
}

async fn sweeper_loop(
    inner: Arc<ControllerInner>,
    cmd_tx: mpsc::Sender<Command>,
    shutdown: watch::Receiver<bool>,
) {
    let period = inner.config.sweeper_period;
    periodic(inner, cmd_tx, shutdown, period, |reply| {
        Command::SweepTimeouts { reply }
    })
    .await;
}

async fn generator_loop(
    inner: Arc<ControllerInner>,
    cmd_tx: mpsc::Sender<Command>,
    shutdown: watch::Receiver<bool>,
) {
    let period = inner.config.generator_period;
    periodic(inner, cmd_tx, shutdown, period, |reply| {
        Command::TriggerGenerators { reply }
    })
    .await;
}

async fn cron_loop(
    inner: Arc<ControllerInner>,
    cmd_tx: mpsc::Sender<Command>,
    shutdown: watch::Receiver<bool>,
) {
    let period = inner.config.cron_period;
    periodic(inner, cmd_tx, shutdown, period, |reply| {
        Command::TriggerCrons { reply }
    })
    .await;
}

async fn retention_loop(
    inner: Arc<ControllerInner>,
    cmd_tx: mpsc::Sender<Command>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(inner.config.retention_period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if !inner.elector.is_leader() {
            continue;
        }
        let (reply, rx) = oneshot::channel();
        if cmd_tx.send(Command::SweepRetention { reply }).await.is_err() {
            break;
        }
        match rx.await {
            Ok(Err(e)) => warn!("retention sweep failed: {}", e),
            Err(_) => break,
            _ => {}
        }
    }
}
