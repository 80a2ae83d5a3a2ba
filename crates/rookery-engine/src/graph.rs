//! Graph engine: dependency ordering inside process graphs
//!
//! Pure logic plus the repository round-trips that keep a graph's members
//! and derived state consistent. Called from the controller's command
//! execution; never signals events itself, the controller does that with the
//! processes these functions return.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use rookery_core::{
    graph::derive_state, FunctionSpec, Process, ProcessGraph, ProcessState, WorkflowSpec,
};
use rookery_storage::Repository;

use crate::error::EngineError;

/// Error text attached to descendants of a failed process.
pub const PARENT_FAILED: &str = "parent failed";

/// Instantiate a verified workflow spec into a graph plus its member
/// processes. Dependencies are resolved by node name; non-roots start with
/// `wait_for_parents` set.
pub fn instantiate(spec: &WorkflowSpec) -> Result<(ProcessGraph, Vec<Process>), EngineError> {
    spec.verify()?;

    let mut graph = ProcessGraph::new(&spec.colony_id);
    let mut processes: Vec<Process> = Vec::with_capacity(spec.function_specs.len());
    let mut ids_by_node: HashMap<String, String> = HashMap::new();

    for function_spec in &spec.function_specs {
        let mut function_spec = function_spec.clone();
        function_spec.conditions.colony_id = spec.colony_id.clone();
        let mut process = Process::from_spec(function_spec);
        process.process_graph_id = graph.id.clone();
        ids_by_node.insert(process.spec.node_name.clone(), process.id.clone());
        processes.push(process);
    }

    // Wire parents/children from the declared dependencies.
    let dependency_edges: Vec<(String, String)> = processes
        .iter()
        .flat_map(|process| {
            process.spec.conditions.dependencies.iter().map(|dep| {
                (
                    ids_by_node[dep.as_str()].clone(), // parent
                    process.id.clone(),                // child
                )
            })
        })
        .collect();
    let mut by_id: HashMap<String, &mut Process> =
        processes.iter_mut().map(|p| (p.id.clone(), p)).collect();
    for (parent_id, child_id) in dependency_edges {
        if let Some(parent) = by_id.get_mut(&parent_id) {
            parent.children.push(child_id.clone());
        }
        if let Some(child) = by_id.get_mut(&child_id) {
            child.parents.push(parent_id);
            child.wait_for_parents = true;
        }
    }
    drop(by_id);

    graph.process_ids = processes.iter().map(|p| p.id.clone()).collect();
    graph.roots = processes
        .iter()
        .filter(|p| p.parents.is_empty())
        .map(|p| p.id.clone())
        .collect();
    Ok((graph, processes))
}

/// Concatenate the parents' outputs in the parent-list order stored on the
/// child. Standalone processes and roots get an empty input.
pub async fn assemble_input(
    repo: &dyn Repository,
    process: &Process,
) -> Result<Vec<serde_json::Value>, EngineError> {
    let mut input = Vec::new();
    for parent_id in &process.parents {
        let parent = repo.get_process(parent_id).await?;
        input.extend(parent.output);
    }
    Ok(input)
}

/// After a parent succeeded: clear `wait_for_parents` on every child whose
/// parents are now all Success. Returns the children that became
/// schedulable, with the flag already cleared.
pub async fn unblock_children(
    repo: &dyn Repository,
    parent: &Process,
) -> Result<Vec<Process>, EngineError> {
    let mut unblocked = Vec::new();
    for child_id in &parent.children {
        let child = repo.get_process(child_id).await?;
        if !child.wait_for_parents {
            continue;
        }
        let mut all_parents_done = true;
        for parent_id in &child.parents {
            let state = if parent_id == &parent.id {
                parent.state
            } else {
                repo.get_process(parent_id).await?.state
            };
            if state != ProcessState::Success {
                all_parents_done = false;
                break;
            }
        }
        if all_parents_done {
            repo.set_wait_for_parents(child_id, false).await?;
            let mut child = child;
            child.wait_for_parents = false;
            unblocked.push(child);
        }
    }
    Ok(unblocked)
}

/// Mark every descendant of `from` as Failed. Returns the failed
/// descendants; `from` itself is expected to be Failed already.
pub async fn fail_descendants(
    repo: &dyn Repository,
    from: &Process,
) -> Result<Vec<Process>, EngineError> {
    let mut failed = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = from.children.iter().cloned().collect();
    let errors = vec![PARENT_FAILED.to_string()];

    while let Some(process_id) = queue.pop_front() {
        if !seen.insert(process_id.clone()) {
            continue;
        }
        let process = repo.get_process(&process_id).await?;
        queue.extend(process.children.iter().cloned());
        if process.state != ProcessState::Failed {
            failed.push(repo.mark_failed(&process_id, &errors).await?);
        }
    }
    Ok(failed)
}

/// Reload a graph's members, derive its state, stamp start/end times on
/// transitions, and persist. Returns the updated graph.
pub async fn recompute_state(
    repo: &dyn Repository,
    graph_id: &str,
) -> Result<ProcessGraph, EngineError> {
    let mut graph = repo.get_graph(graph_id).await?;
    let members = repo.get_processes(&graph.process_ids).await?;
    let state = derive_state(&members);

    if state != graph.state {
        let now = Utc::now();
        if graph.start_time.is_none() && state != ProcessState::Waiting {
            graph.start_time = Some(now);
        }
        if state.is_terminal() {
            graph.end_time = Some(now);
        } else {
            graph.end_time = None;
        }
        graph.state = state;
        repo.update_graph(&graph).await?;
    }
    Ok(graph)
}

/// Dynamic child insertion under a running parent.
///
/// Three wedge semantics, selected by `insert_before` and `as_insert`:
/// between parent and all its children, between parent and one child, or
/// appended as a plain extra child.
pub async fn add_child(
    repo: &dyn Repository,
    graph_id: &str,
    parent_id: &str,
    insert_before: Option<&str>,
    spec: FunctionSpec,
    as_insert: bool,
) -> Result<Process, EngineError> {
    let mut graph = repo.get_graph(graph_id).await?;
    let parent = repo.get_process(parent_id).await?;
    if parent.process_graph_id != graph.id {
        return Err(EngineError::InvalidArgument(format!(
            "process {parent_id} is not part of graph {graph_id}"
        )));
    }

    let mut spec = spec;
    spec.conditions.colony_id = graph.colony_id.clone();
    let mut child = Process::from_spec(spec);
    child.process_graph_id = graph.id.clone();
    child.parents = vec![parent.id.clone()];
    child.wait_for_parents = parent.state != ProcessState::Success;

    match insert_before {
        Some(target_id) => {
            // Wedge on a single edge: parent → new → target.
            let target = repo.get_process(target_id).await?;
            if !parent.children.contains(&target.id) {
                return Err(EngineError::InvalidArgument(format!(
                    "process {target_id} is not a child of {parent_id}"
                )));
            }
            child.children = vec![target.id.clone()];

            let rewired: Vec<String> = target
                .parents
                .iter()
                .map(|p| {
                    if p == &parent.id {
                        child.id.clone()
                    } else {
                        p.clone()
                    }
                })
                .collect();
            repo.add_process(&child).await?;
            repo.set_parents(&target.id, &rewired).await?;
            let parent_children: Vec<String> = parent
                .children
                .iter()
                .map(|c| if c == &target.id { child.id.clone() } else { c.clone() })
                .collect();
            repo.set_children(&parent.id, &parent_children).await?;
        }
        None if as_insert => {
            // Wedge between parent and all of its current children.
            child.children = parent.children.clone();
            repo.add_process(&child).await?;
            for former_child_id in &parent.children {
                let former = repo.get_process(former_child_id).await?;
                let rewired: Vec<String> = former
                    .parents
                    .iter()
                    .map(|p| {
                        if p == &parent.id {
                            child.id.clone()
                        } else {
                            p.clone()
                        }
                    })
                    .collect();
                repo.set_parents(former_child_id, &rewired).await?;
            }
            repo.set_children(&parent.id, std::slice::from_ref(&child.id))
                .await?;
        }
        None => {
            // Plain extra child.
            repo.add_process(&child).await?;
            let mut parent_children = parent.children.clone();
            parent_children.push(child.id.clone());
            repo.set_children(&parent.id, &parent_children).await?;
        }
    }

    graph.process_ids.push(child.id.clone());
    repo.update_graph(&graph).await?;
    repo.get_process(&child.id).await.map_err(EngineError::from)
}
