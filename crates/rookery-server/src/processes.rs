//! Process handlers (executor-membership scope)

use rookery_contracts::{msgs, Envelope, Reply};
use rookery_core::ProcessState;

use crate::error::ApiError;
use crate::AppState;

fn parse_state(code: i32) -> Result<ProcessState, ApiError> {
    ProcessState::try_from(code).map_err(ApiError::InvalidPayload)
}

pub async fn submit_func_spec(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::SubmitFunctionSpecMsg = envelope.decode(msgs::SUBMIT_FUNC_SPEC)?;
    state
        .validator
        .require_executor_membership(caller, &msg.spec.conditions.colony_id, true)
        .await?;
    let process = state.controller.submit(msg.spec).await?;
    Ok(Reply::ok(msgs::SUBMIT_FUNC_SPEC, &process)?)
}

pub async fn assign_process(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::AssignProcessMsg = envelope.decode(msgs::ASSIGN_PROCESS)?;
    state
        .validator
        .require_executor_membership(caller, &msg.colony_id, true)
        .await?;
    let process = state
        .controller
        .assign(caller, &msg.colony_id, msg.timeout)
        .await?;
    Ok(Reply::ok(msgs::ASSIGN_PROCESS, &process)?)
}

pub async fn get_process(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::GetProcessMsg = envelope.decode(msgs::GET_PROCESS)?;
    state
        .validator
        .require_executor_membership(caller, &msg.colony_id, false)
        .await?;
    let process = state
        .controller
        .repository()
        .get_process(&msg.process_id)
        .await?;
    if process.spec.conditions.colony_id != msg.colony_id {
        return Err(ApiError::NotFound(format!(
            "process not found: {}",
            msg.process_id
        )));
    }
    Ok(Reply::ok(msgs::GET_PROCESS, &process)?)
}

pub async fn get_processes(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::GetProcessesMsg = envelope.decode(msgs::GET_PROCESSES)?;
    state
        .validator
        .require_executor_membership(caller, &msg.colony_id, false)
        .await?;
    let processes = state
        .controller
        .repository()
        .find_processes(&msg.colony_id, parse_state(msg.state)?, msg.count.max(0) as usize)
        .await?;
    Ok(Reply::ok(msgs::GET_PROCESSES, &processes)?)
}

pub async fn delete_process(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::DeleteProcessMsg = envelope.decode(msgs::DELETE_PROCESS)?;
    state
        .validator
        .require_colony_owner(caller, &msg.colony_id)
        .await?;
    state.controller.delete_process(&msg.process_id).await?;
    Ok(Reply::ok(msgs::DELETE_PROCESS, &msg)?)
}

pub async fn delete_all_processes(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::DeleteAllProcessesMsg = envelope.decode(msgs::DELETE_ALL_PROCESSES)?;
    state
        .validator
        .require_colony_owner(caller, &msg.colony_id)
        .await?;
    state
        .controller
        .repository()
        .delete_processes_by_colony(&msg.colony_id)
        .await?;
    Ok(Reply::ok(msgs::DELETE_ALL_PROCESSES, &msg)?)
}

pub async fn close_successful(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::CloseSuccessfulMsg = envelope.decode(msgs::CLOSE_SUCCESSFUL)?;
    state
        .validator
        .require_executor_membership(caller, &msg.colony_id, true)
        .await?;
    let process = state
        .controller
        .close_successful(&msg.process_id, caller, msg.output)
        .await?;
    Ok(Reply::ok(msgs::CLOSE_SUCCESSFUL, &process)?)
}

pub async fn close_failed(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::CloseFailedMsg = envelope.decode(msgs::CLOSE_FAILED)?;
    state
        .validator
        .require_executor_membership(caller, &msg.colony_id, true)
        .await?;
    let process = state
        .controller
        .close_failed(&msg.process_id, caller, msg.errors)
        .await?;
    Ok(Reply::ok(msgs::CLOSE_FAILED, &process)?)
}

pub async fn add_attribute(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::AddAttributeMsg = envelope.decode(msgs::ADD_ATTRIBUTE)?;
    state
        .validator
        .require_executor_membership(caller, &msg.attribute.target_colony_id, true)
        .await?;
    let target = state
        .controller
        .repository()
        .get_process(&msg.attribute.target_id)
        .await?;
    if target.assigned_executor_id != caller {
        return Err(ApiError::Unauthorized(
            "process is not assigned to the caller".to_string(),
        ));
    }
    state
        .controller
        .repository()
        .add_attribute(&msg.attribute)
        .await?;
    Ok(Reply::ok(msgs::ADD_ATTRIBUTE, &msg.attribute)?)
}

pub async fn get_attribute(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::GetAttributeMsg = envelope.decode(msgs::GET_ATTRIBUTE)?;
    state
        .validator
        .require_executor_membership(caller, &msg.colony_id, false)
        .await?;
    let attribute = state
        .controller
        .repository()
        .get_attribute(&msg.attribute_id)
        .await?;
    if attribute.target_colony_id != msg.colony_id {
        return Err(ApiError::NotFound(format!(
            "attribute not found: {}",
            msg.attribute_id
        )));
    }
    Ok(Reply::ok(msgs::GET_ATTRIBUTE, &attribute)?)
}
