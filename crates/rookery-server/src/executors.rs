//! Executor handlers
//!
//! Executors self-register (the recovered identity must match the executor
//! id being added) and stay Pending until the colony owner approves them.

use rookery_contracts::{msgs, Envelope, Reply};

use crate::error::ApiError;
use crate::AppState;

pub async fn add_executor(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::AddExecutorMsg = envelope.decode(msgs::ADD_EXECUTOR)?;
    if msg.executor.id != caller {
        return Err(ApiError::Unauthorized(
            "executor must register with its own identity".to_string(),
        ));
    }
    let executor = state.controller.add_executor(msg.executor).await?;
    Ok(Reply::ok(msgs::ADD_EXECUTOR, &executor)?)
}

pub async fn get_executors(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::GetExecutorsMsg = envelope.decode(msgs::GET_EXECUTORS)?;
    if state
        .validator
        .require_colony_owner(caller, &msg.colony_id)
        .await
        .is_err()
    {
        state
            .validator
            .require_executor_membership(caller, &msg.colony_id, false)
            .await?;
    }
    let executors = state
        .controller
        .repository()
        .get_executors(&msg.colony_id)
        .await?;
    Ok(Reply::ok(msgs::GET_EXECUTORS, &executors)?)
}

pub async fn approve_executor(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::ApproveExecutorMsg = envelope.decode(msgs::APPROVE_EXECUTOR)?;
    state
        .validator
        .require_colony_owner(caller, &msg.colony_id)
        .await?;
    state.controller.approve_executor(&msg.executor_id).await?;
    Ok(Reply::ok(msgs::APPROVE_EXECUTOR, &msg)?)
}

pub async fn reject_executor(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::RejectExecutorMsg = envelope.decode(msgs::REJECT_EXECUTOR)?;
    state
        .validator
        .require_colony_owner(caller, &msg.colony_id)
        .await?;
    state.controller.reject_executor(&msg.executor_id).await?;
    Ok(Reply::ok(msgs::REJECT_EXECUTOR, &msg)?)
}

pub async fn delete_executor(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::DeleteExecutorMsg = envelope.decode(msgs::DELETE_EXECUTOR)?;
    state
        .validator
        .require_colony_owner(caller, &msg.colony_id)
        .await?;
    state.controller.delete_executor(&msg.executor_id).await?;
    Ok(Reply::ok(msgs::DELETE_EXECUTOR, &msg)?)
}
