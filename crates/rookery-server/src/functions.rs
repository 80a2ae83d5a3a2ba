//! Function registration handlers

use rookery_contracts::{msgs, Envelope, Reply};

use crate::error::ApiError;
use crate::AppState;

pub async fn add_function(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::AddFunctionMsg = envelope.decode(msgs::ADD_FUNCTION)?;
    state
        .validator
        .require_executor_membership(caller, &msg.function.colony_id, true)
        .await?;
    if msg.function.executor_id != caller {
        return Err(ApiError::Unauthorized(
            "functions can only be registered for the caller".to_string(),
        ));
    }
    let function = state.controller.add_function(msg.function).await?;
    Ok(Reply::ok(msgs::ADD_FUNCTION, &function)?)
}

pub async fn get_functions(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::GetFunctionsMsg = envelope.decode(msgs::GET_FUNCTIONS)?;
    state
        .validator
        .require_executor_membership(caller, &msg.colony_id, false)
        .await?;
    let functions = if msg.executor_id.is_empty() {
        state
            .controller
            .repository()
            .get_functions_by_colony(&msg.colony_id)
            .await?
    } else {
        state
            .controller
            .repository()
            .get_functions_by_executor(&msg.executor_id)
            .await?
    };
    Ok(Reply::ok(msgs::GET_FUNCTIONS, &functions)?)
}
