//! Workflow / process-graph handlers

use rookery_contracts::{msgs, Envelope, Reply};
use rookery_core::ProcessState;

use crate::error::ApiError;
use crate::AppState;

pub async fn submit_workflow(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::SubmitWorkflowSpecMsg = envelope.decode(msgs::SUBMIT_WORKFLOW_SPEC)?;
    state
        .validator
        .require_executor_membership(caller, &msg.spec.colony_id, true)
        .await?;
    let graph = state.controller.submit_workflow(msg.spec).await?;
    Ok(Reply::ok(msgs::SUBMIT_WORKFLOW_SPEC, &graph)?)
}

pub async fn add_child(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::AddChildMsg = envelope.decode(msgs::ADD_CHILD)?;
    let graph = state
        .controller
        .repository()
        .get_graph(&msg.process_graph_id)
        .await?;
    state
        .validator
        .require_executor_membership(caller, &graph.colony_id, true)
        .await?;
    let insert_before = if msg.insert_before_process_id.is_empty() {
        None
    } else {
        Some(msg.insert_before_process_id.clone())
    };
    let child = state
        .controller
        .add_child(
            &msg.process_graph_id,
            &msg.parent_process_id,
            insert_before,
            msg.spec,
            msg.insert,
            caller,
        )
        .await?;
    Ok(Reply::ok(msgs::ADD_CHILD, &child)?)
}

pub async fn get_graph(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::GetProcessGraphMsg = envelope.decode(msgs::GET_PROCESS_GRAPH)?;
    state
        .validator
        .require_executor_membership(caller, &msg.colony_id, false)
        .await?;
    let graph = state
        .controller
        .repository()
        .get_graph(&msg.process_graph_id)
        .await?;
    if graph.colony_id != msg.colony_id {
        return Err(ApiError::NotFound(format!(
            "process graph not found: {}",
            msg.process_graph_id
        )));
    }
    Ok(Reply::ok(msgs::GET_PROCESS_GRAPH, &graph)?)
}

pub async fn get_graphs(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::GetProcessGraphsMsg = envelope.decode(msgs::GET_PROCESS_GRAPHS)?;
    state
        .validator
        .require_executor_membership(caller, &msg.colony_id, false)
        .await?;
    let state_filter = if msg.state < 0 {
        None
    } else {
        Some(ProcessState::try_from(msg.state).map_err(ApiError::InvalidPayload)?)
    };
    let graphs = state
        .controller
        .repository()
        .find_graphs(&msg.colony_id, state_filter, msg.count.max(0) as usize)
        .await?;
    Ok(Reply::ok(msgs::GET_PROCESS_GRAPHS, &graphs)?)
}

pub async fn delete_graph(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::DeleteProcessGraphMsg = envelope.decode(msgs::DELETE_PROCESS_GRAPH)?;
    state
        .validator
        .require_colony_owner(caller, &msg.colony_id)
        .await?;
    state.controller.delete_graph(&msg.process_graph_id).await?;
    Ok(Reply::ok(msgs::DELETE_PROCESS_GRAPH, &msg)?)
}
