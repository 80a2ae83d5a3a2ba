//! Generator handlers

use rookery_contracts::{msgs, Envelope, Reply};

use crate::error::ApiError;
use crate::AppState;

pub async fn add_generator(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::AddGeneratorMsg = envelope.decode(msgs::ADD_GENERATOR)?;
    state
        .validator
        .require_executor_membership(caller, &msg.generator.colony_id, true)
        .await?;
    let generator = state.controller.add_generator(msg.generator).await?;
    Ok(Reply::ok(msgs::ADD_GENERATOR, &generator)?)
}

pub async fn get_generator(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::GetGeneratorMsg = envelope.decode(msgs::GET_GENERATOR)?;
    state
        .validator
        .require_executor_membership(caller, &msg.colony_id, false)
        .await?;
    let generator = state
        .controller
        .repository()
        .get_generator(&msg.generator_id)
        .await?;
    if generator.colony_id != msg.colony_id {
        return Err(ApiError::NotFound(format!(
            "generator not found: {}",
            msg.generator_id
        )));
    }
    Ok(Reply::ok(msgs::GET_GENERATOR, &generator)?)
}

pub async fn pack_generator(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::PackGeneratorMsg = envelope.decode(msgs::PACK_GENERATOR)?;
    state
        .validator
        .require_executor_membership(caller, &msg.colony_id, true)
        .await?;
    state
        .controller
        .pack_generator(&msg.generator_id, &msg.arg)
        .await?;
    Ok(Reply::ok(msgs::PACK_GENERATOR, &msg)?)
}

pub async fn resolve_generator(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::ResolveGeneratorMsg = envelope.decode(msgs::RESOLVE_GENERATOR)?;
    state
        .validator
        .require_executor_membership(caller, &msg.colony_id, false)
        .await?;
    let generator = state
        .controller
        .repository()
        .get_generator_by_name(&msg.colony_id, &msg.generator_name)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("generator not found: {}", msg.generator_name))
        })?;
    Ok(Reply::ok(msgs::RESOLVE_GENERATOR, &generator)?)
}
