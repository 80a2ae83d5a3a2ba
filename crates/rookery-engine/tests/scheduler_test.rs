//! End-to-end scheduler scenarios against the in-memory repository.

use std::sync::Arc;
use std::time::Duration;

use rookery_core::{
    Colony, Conditions, Cron, Executor, FunctionSpec, Generator, ProcessState, WorkflowSpec,
};
use rookery_engine::{Controller, ControllerConfig, EngineError, FixedElector, LocalRelay};
use rookery_storage::{InMemoryRepository, Repository};

const EXECUTOR_TYPE: &str = "cli";

struct Harness {
    controller: Controller,
    repo: Arc<InMemoryRepository>,
    colony: Colony,
    executor: Executor,
}

async fn harness_with_config(config: ControllerConfig) -> Harness {
    let repo = Arc::new(InMemoryRepository::new());
    let controller = Controller::new(repo.clone(), config);

    let colony = controller
        .add_colony(Colony::new(rookery_core::generate_id(), "test"))
        .await
        .unwrap();
    let executor = controller
        .add_executor(Executor::new(
            rookery_core::generate_id(),
            EXECUTOR_TYPE,
            "worker-1",
            &colony.id,
        ))
        .await
        .unwrap();
    controller.approve_executor(&executor.id).await.unwrap();

    Harness {
        controller,
        repo,
        colony,
        executor,
    }
}

async fn harness() -> Harness {
    // Long periods so the loops never interfere with a scenario unless the
    // test drives them explicitly.
    harness_with_config(
        ControllerConfig::new()
            .with_sweeper_period(Duration::from_secs(3600))
            .with_generator_period(Duration::from_secs(3600))
            .with_cron_period(Duration::from_secs(3600)),
    )
    .await
}

fn spec(colony_id: &str) -> FunctionSpec {
    FunctionSpec::new(
        "echo",
        Conditions {
            colony_id: colony_id.to_string(),
            executor_type: EXECUTOR_TYPE.to_string(),
            ..Default::default()
        },
    )
}

fn node(colony_id: &str, name: &str, dependencies: &[&str]) -> FunctionSpec {
    spec(colony_id)
        .with_node_name(name)
        .with_dependencies(dependencies.iter().map(|d| d.to_string()).collect())
}

fn diamond(colony_id: &str) -> WorkflowSpec {
    let mut workflow = WorkflowSpec::new(colony_id);
    workflow.add(node(colony_id, "task1", &[]));
    workflow.add(node(colony_id, "task2", &["task1"]));
    workflow.add(node(colony_id, "task3", &["task1"]));
    workflow.add(node(colony_id, "task4", &["task2", "task3"]));
    workflow
}

#[tokio::test]
async fn test_submit_and_assign_single_process() {
    let h = harness().await;
    let submitted = h.controller.submit(spec(&h.colony.id)).await.unwrap();
    assert_eq!(submitted.state, ProcessState::Waiting);

    let assigned = h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();
    assert_eq!(assigned.id, submitted.id);
    assert_eq!(assigned.state, ProcessState::Running);
    assert!(assigned.is_assigned);
    assert_eq!(assigned.assigned_executor_id, h.executor.id);
}

#[tokio::test]
async fn test_assign_non_blocking_empty_queue() {
    let h = harness().await;
    let result = h.controller.assign(&h.executor.id, &h.colony.id, 0).await;
    assert!(matches!(result, Err(EngineError::NoProcessesAvailable)));
}

#[tokio::test]
async fn test_assign_requires_approval() {
    let h = harness().await;
    let pending = h
        .controller
        .add_executor(Executor::new(
            rookery_core::generate_id(),
            EXECUTOR_TYPE,
            "worker-2",
            &h.colony.id,
        ))
        .await
        .unwrap();
    let result = h.controller.assign(&pending.id, &h.colony.id, 0).await;
    assert!(matches!(result, Err(EngineError::AccessDenied(_))));
}

#[tokio::test]
async fn test_assign_priority_then_fifo() {
    let h = harness().await;
    let low_first = h.controller.submit(spec(&h.colony.id)).await.unwrap();
    let high = h
        .controller
        .submit(spec(&h.colony.id).with_priority(5))
        .await
        .unwrap();
    let low_second = h.controller.submit(spec(&h.colony.id)).await.unwrap();

    let order = [
        h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap().id,
        h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap().id,
        h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap().id,
    ];
    assert_eq!(order[0], high.id);
    assert_eq!(order[1], low_first.id);
    assert_eq!(order[2], low_second.id);
}

#[tokio::test]
async fn test_assign_respects_executor_allow_list() {
    let h = harness().await;
    let mut restricted = spec(&h.colony.id);
    restricted.conditions.executor_ids = vec![rookery_core::generate_id()];
    h.controller.submit(restricted).await.unwrap();

    let result = h.controller.assign(&h.executor.id, &h.colony.id, 0).await;
    assert!(matches!(result, Err(EngineError::NoProcessesAvailable)));
}

#[tokio::test]
async fn test_assign_blocks_until_submission() {
    let h = harness().await;
    let controller = h.controller;
    let executor_id = h.executor.id.clone();
    let colony_id = h.colony.id.clone();

    let controller = Arc::new(controller);
    let assign_side = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.assign(&executor_id, &colony_id, 5).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    let submitted = controller.submit(spec(&h.colony.id)).await.unwrap();

    let assigned = assign_side.await.unwrap().unwrap();
    assert_eq!(assigned.id, submitted.id);
    assert_eq!(assigned.state, ProcessState::Running);
}

#[tokio::test]
async fn test_assign_times_out_parked() {
    let h = harness().await;
    let started = tokio::time::Instant::now();
    let result = h.controller.assign(&h.executor.id, &h.colony.id, 1).await;
    assert!(matches!(result, Err(EngineError::NoProcessesAvailable)));
    assert!(started.elapsed() >= Duration::from_millis(900));
}

// Scenario 1: diamond workflow runs to completion in dependency order.
#[tokio::test]
async fn test_diamond_workflow() {
    let h = harness().await;
    let graph = h.controller.submit_workflow(diamond(&h.colony.id)).await.unwrap();
    assert_eq!(graph.roots.len(), 1);

    let task1 = h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();
    assert_eq!(task1.spec.node_name, "task1");

    // Nothing else is schedulable while task1 runs.
    let empty = h.controller.assign(&h.executor.id, &h.colony.id, 0).await;
    assert!(matches!(empty, Err(EngineError::NoProcessesAvailable)));

    h.controller
        .close_successful(&task1.id, &h.executor.id, vec![serde_json::json!("r1")])
        .await
        .unwrap();

    let mid1 = h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();
    let mid2 = h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();
    let mut names = vec![mid1.spec.node_name.clone(), mid2.spec.node_name.clone()];
    names.sort();
    assert_eq!(names, vec!["task2", "task3"]);
    // Parent output flows into the children's input.
    assert_eq!(mid1.input, vec![serde_json::json!("r1")]);

    h.controller
        .close_successful(&mid1.id, &h.executor.id, vec![])
        .await
        .unwrap();
    // task4 still blocked on its second parent.
    let blocked = h.controller.assign(&h.executor.id, &h.colony.id, 0).await;
    assert!(matches!(blocked, Err(EngineError::NoProcessesAvailable)));

    h.controller
        .close_successful(&mid2.id, &h.executor.id, vec![])
        .await
        .unwrap();

    let task4 = h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();
    assert_eq!(task4.spec.node_name, "task4");
    h.controller
        .close_successful(&task4.id, &h.executor.id, vec![])
        .await
        .unwrap();

    let graph = h.repo.get_graph(&graph.id).await.unwrap();
    assert_eq!(graph.state, ProcessState::Success);
    assert!(graph.end_time.is_some());
}

// Scenario 2: failing the root fails the whole graph.
#[tokio::test]
async fn test_failure_propagation() {
    let h = harness().await;
    let graph = h.controller.submit_workflow(diamond(&h.colony.id)).await.unwrap();

    let task1 = h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();
    h.controller
        .close_failed(&task1.id, &h.executor.id, vec!["boom".to_string()])
        .await
        .unwrap();

    let graph = h.repo.get_graph(&graph.id).await.unwrap();
    assert_eq!(graph.state, ProcessState::Failed);

    let empty = h.controller.assign(&h.executor.id, &h.colony.id, 0).await;
    assert!(matches!(empty, Err(EngineError::NoProcessesAvailable)));

    for process_id in &graph.process_ids {
        let process = h.repo.get_process(process_id).await.unwrap();
        assert_eq!(process.state, ProcessState::Failed);
        if process.id != task1.id {
            assert!(process.errors.iter().any(|e| e.contains("parent failed")));
        }
    }
}

// Scenario 3: exec timeout resets once, then fails for good.
#[tokio::test]
async fn test_exec_timeout_retry_then_fail() {
    let h = harness().await;
    let submitted = h
        .controller
        .submit(spec(&h.colony.id).with_max_exec_time(1).with_max_retries(1))
        .await
        .unwrap();

    let first = h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();
    assert_eq!(first.id, submitted.id);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    h.controller.sweep_timeouts().await.unwrap();

    let reset = h.repo.get_process(&submitted.id).await.unwrap();
    assert_eq!(reset.state, ProcessState::Waiting);
    assert_eq!(reset.retries, 1);
    assert!(!reset.is_assigned);
    assert!(reset.assigned_executor_id.is_empty());

    let second = h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();
    assert_eq!(second.id, submitted.id);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    h.controller.sweep_timeouts().await.unwrap();

    let failed = h.repo.get_process(&submitted.id).await.unwrap();
    assert_eq!(failed.state, ProcessState::Failed);
    assert_eq!(failed.errors, vec!["max execution time exceeded".to_string()]);
}

#[tokio::test]
async fn test_wait_timeout_fails_process() {
    let h = harness().await;
    let submitted = h
        .controller
        .submit(spec(&h.colony.id).with_max_wait_time(1))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1100)).await;
    h.controller.sweep_timeouts().await.unwrap();

    let failed = h.repo.get_process(&submitted.id).await.unwrap();
    assert_eq!(failed.state, ProcessState::Failed);
    assert_eq!(failed.errors, vec!["max wait time exceeded".to_string()]);
}

#[tokio::test]
async fn test_unbounded_deadlines_never_sweep() {
    let h = harness().await;
    let submitted = h.controller.submit(spec(&h.colony.id)).await.unwrap();
    h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();

    tokio::time::sleep(Duration::from_millis(600)).await;
    let transitions = h.controller.sweep_timeouts().await.unwrap();
    assert_eq!(transitions, 0);
    let process = h.repo.get_process(&submitted.id).await.unwrap();
    assert_eq!(process.state, ProcessState::Running);
}

// Scenario 4: dynamic insert wedges the new node between task1 and its children.
#[tokio::test]
async fn test_dynamic_insert() {
    let h = harness().await;
    let mut workflow = WorkflowSpec::new(&h.colony.id);
    workflow.add(node(&h.colony.id, "task1", &[]));
    workflow.add(node(&h.colony.id, "task2", &["task1"]));
    workflow.add(node(&h.colony.id, "task3", &["task1"]));
    let graph = h.controller.submit_workflow(workflow).await.unwrap();

    let task1 = h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();

    let task4 = h
        .controller
        .add_child(
            &graph.id,
            &task1.id,
            None,
            spec(&h.colony.id).with_node_name("task4"),
            true,
            &h.executor.id,
        )
        .await
        .unwrap();

    let task1 = h.repo.get_process(&task1.id).await.unwrap();
    assert_eq!(task1.children, vec![task4.id.clone()]);
    for process_id in &task4.children {
        let former = h.repo.get_process(process_id).await.unwrap();
        assert_eq!(former.parents, vec![task4.id.clone()]);
    }
    let graph = h.repo.get_graph(&graph.id).await.unwrap();
    assert_eq!(graph.process_ids.len(), 4);
}

#[tokio::test]
async fn test_add_child_requires_assignment() {
    let h = harness().await;
    let mut workflow = WorkflowSpec::new(&h.colony.id);
    workflow.add(node(&h.colony.id, "task1", &[]));
    let graph = h.controller.submit_workflow(workflow).await.unwrap();
    let task1 = h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();

    let other = rookery_core::generate_id();
    let result = h
        .controller
        .add_child(
            &graph.id,
            &task1.id,
            None,
            spec(&h.colony.id).with_node_name("task2"),
            false,
            &other,
        )
        .await;
    assert!(matches!(result, Err(EngineError::AccessDenied(_))));
}

// Scenario 5: generator fires once after three packed args.
#[tokio::test]
async fn test_generator_trigger() {
    let h = harness().await;
    let mut template = WorkflowSpec::new(&h.colony.id);
    template.add(node(&h.colony.id, "task1", &[]));
    let generator = h
        .controller
        .add_generator(Generator::new(
            &h.colony.id,
            "batcher",
            serde_json::to_string(&template).unwrap(),
            3,
        ))
        .await
        .unwrap();

    for arg in ["a", "b", "c"] {
        h.controller.pack_generator(&generator.id, arg).await.unwrap();
    }

    let fired = h.controller.trigger_generators().await.unwrap();
    assert_eq!(fired, 1);
    assert_eq!(h.repo.count_generator_args(&generator.id).await.unwrap(), 0);

    let graphs = h.repo.find_graphs(&h.colony.id, None, 10).await.unwrap();
    assert_eq!(graphs.len(), 1);
    let root = h.repo.get_process(&graphs[0].roots[0]).await.unwrap();
    assert_eq!(
        root.spec.args,
        vec![
            serde_json::json!("a"),
            serde_json::json!("b"),
            serde_json::json!("c")
        ]
    );

    // Below threshold again: no further firing.
    h.controller.pack_generator(&generator.id, "d").await.unwrap();
    assert_eq!(h.controller.trigger_generators().await.unwrap(), 0);
}

#[tokio::test]
async fn test_generator_timeout_drains_partial_batch() {
    let h = harness().await;
    let mut template = WorkflowSpec::new(&h.colony.id);
    template.add(node(&h.colony.id, "task1", &[]));
    let generator = h
        .controller
        .add_generator(
            Generator::new(
                &h.colony.id,
                "slow-batcher",
                serde_json::to_string(&template).unwrap(),
                100,
            )
            .with_timeout(1),
        )
        .await
        .unwrap();

    h.controller.pack_generator(&generator.id, "only").await.unwrap();
    assert_eq!(h.controller.trigger_generators().await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.controller.trigger_generators().await.unwrap(), 1);
    assert_eq!(h.repo.count_generator_args(&generator.id).await.unwrap(), 0);

    let stored = h.repo.get_generator(&generator.id).await.unwrap();
    assert!(stored.first_pack.is_none());
    assert!(stored.last_run.is_some());
}

// Scenario 6: a subscriber parks until the process closes successfully.
#[tokio::test]
async fn test_subscribe_process_unparks_on_close() {
    let h = harness().await;
    let submitted = h.controller.submit(spec(&h.colony.id)).await.unwrap();
    let assigned = h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();

    let controller = Arc::new(h.controller);
    let subscriber = {
        let controller = Arc::clone(&controller);
        let process_id = submitted.id.clone();
        tokio::spawn(async move {
            controller
                .subscribe_process(&process_id, ProcessState::Success, 5)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    controller
        .close_successful(&assigned.id, &h.executor.id, vec![serde_json::json!(42)])
        .await
        .unwrap();

    let observed = subscriber.await.unwrap().unwrap();
    assert_eq!(observed.id, submitted.id);
    assert_eq!(observed.state, ProcessState::Success);
    assert_eq!(observed.output, vec![serde_json::json!(42)]);
}

#[tokio::test]
async fn test_subscribe_already_reached_state_returns_immediately() {
    let h = harness().await;
    let submitted = h.controller.submit(spec(&h.colony.id)).await.unwrap();
    let observed = h
        .controller
        .subscribe_process(&submitted.id, ProcessState::Waiting, 5)
        .await
        .unwrap();
    assert_eq!(observed.id, submitted.id);
}

// Open-question decision: inputs follow the parent-list order stored on the
// child, never the order the parents happened to finish in.
#[tokio::test]
async fn test_input_follows_parent_list_order() {
    let h = harness().await;
    let mut workflow = WorkflowSpec::new(&h.colony.id);
    workflow.add(node(&h.colony.id, "task1", &[]));
    workflow.add(node(&h.colony.id, "task2", &["task1"]));
    workflow.add(node(&h.colony.id, "task3", &["task1"]));
    workflow.add(node(&h.colony.id, "task4", &["task2", "task3"]));
    h.controller.submit_workflow(workflow).await.unwrap();

    let task1 = h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();
    h.controller
        .close_successful(&task1.id, &h.executor.id, vec![])
        .await
        .unwrap();

    let mid1 = h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();
    let mid2 = h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();
    let (task2, task3) = if mid1.spec.node_name == "task2" {
        (mid1, mid2)
    } else {
        (mid2, mid1)
    };

    // Close task3 first, task2 second: completion order reversed.
    h.controller
        .close_successful(&task3.id, &h.executor.id, vec![serde_json::json!("from-task3")])
        .await
        .unwrap();
    h.controller
        .close_successful(&task2.id, &h.executor.id, vec![serde_json::json!("from-task2")])
        .await
        .unwrap();

    let task4 = h.controller.assign(&h.executor.id, &h.colony.id, 0).await.unwrap();
    assert_eq!(task4.spec.node_name, "task4");
    assert_eq!(task4.parents.len(), 2);
    let expected: Vec<serde_json::Value> = task4
        .parents
        .iter()
        .map(|parent_id| {
            if *parent_id == task2.id {
                serde_json::json!("from-task2")
            } else {
                serde_json::json!("from-task3")
            }
        })
        .collect();
    assert_eq!(task4.input, expected);
}

#[tokio::test]
async fn test_cron_run_now_submits_workflow() {
    let h = harness().await;
    let mut template = WorkflowSpec::new(&h.colony.id);
    template.add(node(&h.colony.id, "task1", &[]));
    let cron = h
        .controller
        .add_cron(
            Cron::new(&h.colony.id, "minutely", serde_json::to_string(&template).unwrap())
                .with_interval(60),
        )
        .await
        .unwrap();
    assert!(cron.next_run.is_some());

    let fired = h.controller.run_cron(&cron.id).await.unwrap();
    assert!(!fired.prev_process_graph_id.is_empty());
    assert!(fired.last_run.is_some());

    let graph = h.repo.get_graph(&fired.prev_process_graph_id).await.unwrap();
    assert_eq!(graph.state, ProcessState::Waiting);
}

#[tokio::test]
async fn test_cron_without_schedule_rejected() {
    let h = harness().await;
    let result = h
        .controller
        .add_cron(Cron::new(&h.colony.id, "never", "{}"))
        .await;
    assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_follower_skips_periodic_loops() {
    let repo = Arc::new(InMemoryRepository::new());
    let controller = Controller::with_cluster(
        repo.clone(),
        ControllerConfig::new().with_sweeper_period(Duration::from_millis(50)),
        Arc::new(LocalRelay),
        Arc::new(FixedElector(false)),
    );
    let colony = controller
        .add_colony(Colony::new(rookery_core::generate_id(), "test"))
        .await
        .unwrap();
    let executor = controller
        .add_executor(Executor::new(
            rookery_core::generate_id(),
            EXECUTOR_TYPE,
            "worker-1",
            &colony.id,
        ))
        .await
        .unwrap();
    controller.approve_executor(&executor.id).await.unwrap();

    let mut expiring = spec(&colony.id);
    expiring.max_exec_time = 1;
    let submitted = controller.submit(expiring).await.unwrap();
    controller.assign(&executor.id, &colony.id, 0).await.unwrap();

    // The follower's sweeper ticks but never mutates.
    tokio::time::sleep(Duration::from_millis(1300)).await;
    let process = repo.get_process(&submitted.id).await.unwrap();
    assert_eq!(process.state, ProcessState::Running);
    controller.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_executor_is_conflict_unless_reregister() {
    let h = harness().await;
    let duplicate = Executor::new(
        rookery_core::generate_id(),
        EXECUTOR_TYPE,
        "worker-1",
        &h.colony.id,
    );
    let result = h.controller.add_executor(duplicate.clone()).await;
    assert!(matches!(
        result,
        Err(EngineError::Store(rookery_storage::StoreError::Conflict(_)))
    ));

    let permissive = harness_with_config(
        ControllerConfig::new()
            .with_sweeper_period(Duration::from_secs(3600))
            .with_generator_period(Duration::from_secs(3600))
            .with_cron_period(Duration::from_secs(3600))
            .with_executor_reregister(true),
    )
    .await;
    let replacement = Executor::new(
        rookery_core::generate_id(),
        EXECUTOR_TYPE,
        "worker-1",
        &permissive.colony.id,
    );
    let replaced = permissive.controller.add_executor(replacement).await.unwrap();
    assert_ne!(replaced.id, permissive.executor.id);
}

#[tokio::test]
async fn test_approve_executor_is_idempotent() {
    let h = harness().await;
    h.controller.approve_executor(&h.executor.id).await.unwrap();
    h.controller.approve_executor(&h.executor.id).await.unwrap();
    let executor = h.repo.get_executor(&h.executor.id).await.unwrap();
    assert!(executor.is_approved());
}

#[tokio::test]
async fn test_invalid_workflow_rejected_before_writes() {
    let h = harness().await;
    let mut workflow = WorkflowSpec::new(&h.colony.id);
    workflow.add(node(&h.colony.id, "task1", &[]));
    workflow.add(node(&h.colony.id, "task2", &["ghost"]));
    let result = h.controller.submit_workflow(workflow).await;
    assert!(matches!(result, Err(EngineError::InvalidWorkflow(_))));
    assert_eq!(h.repo.process_count(), 0);
}
