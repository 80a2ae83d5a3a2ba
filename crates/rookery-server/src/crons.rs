//! Cron handlers

use rookery_contracts::{msgs, Envelope, Reply};

use crate::error::ApiError;
use crate::AppState;

pub async fn add_cron(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::AddCronMsg = envelope.decode(msgs::ADD_CRON)?;
    state
        .validator
        .require_executor_membership(caller, &msg.cron.colony_id, true)
        .await?;
    let cron = state.controller.add_cron(msg.cron).await?;
    Ok(Reply::ok(msgs::ADD_CRON, &cron)?)
}

pub async fn get_cron(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::GetCronMsg = envelope.decode(msgs::GET_CRON)?;
    state
        .validator
        .require_executor_membership(caller, &msg.colony_id, false)
        .await?;
    let cron = state.controller.repository().get_cron(&msg.cron_id).await?;
    if cron.colony_id != msg.colony_id {
        return Err(ApiError::NotFound(format!("cron not found: {}", msg.cron_id)));
    }
    Ok(Reply::ok(msgs::GET_CRON, &cron)?)
}

pub async fn run_cron(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::RunCronMsg = envelope.decode(msgs::RUN_CRON)?;
    state
        .validator
        .require_executor_membership(caller, &msg.colony_id, true)
        .await?;
    let cron = state.controller.run_cron(&msg.cron_id).await?;
    Ok(Reply::ok(msgs::RUN_CRON, &cron)?)
}
