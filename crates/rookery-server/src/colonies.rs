//! Colony handlers (server-owner scope)

use rookery_contracts::{msgs, Envelope, Reply};

use crate::error::ApiError;
use crate::AppState;

pub async fn add_colony(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    state.validator.require_server_owner(caller)?;
    let msg: msgs::AddColonyMsg = envelope.decode(msgs::ADD_COLONY)?;
    let colony = state.controller.add_colony(msg.colony).await?;
    Ok(Reply::ok(msgs::ADD_COLONY, &colony)?)
}

pub async fn get_colony(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::GetColonyMsg = envelope.decode(msgs::GET_COLONY)?;
    if state.validator.require_colony_owner(caller, &msg.colony_id).await.is_err() {
        state
            .validator
            .require_executor_membership(caller, &msg.colony_id, false)
            .await?;
    }
    let colony = state.controller.repository().get_colony(&msg.colony_id).await?;
    Ok(Reply::ok(msgs::GET_COLONY, &colony)?)
}

pub async fn get_colonies(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    state.validator.require_server_owner(caller)?;
    let _msg: msgs::GetColoniesMsg = envelope.decode(msgs::GET_COLONIES)?;
    let colonies = state.controller.repository().get_colonies().await?;
    Ok(Reply::ok(msgs::GET_COLONIES, &colonies)?)
}

pub async fn delete_colony(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    state.validator.require_server_owner(caller)?;
    let msg: msgs::DeleteColonyMsg = envelope.decode(msgs::DELETE_COLONY)?;
    state.controller.delete_colony(&msg.colony_id).await?;
    Ok(Reply::ok(msgs::DELETE_COLONY, &msg)?)
}
