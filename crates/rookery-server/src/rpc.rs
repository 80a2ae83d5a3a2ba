//! Envelope dispatch: payload type → handler

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rookery_contracts::{msgs, Envelope, Reply};
use tracing::debug;

use crate::error::ApiError;
use crate::{colonies, crons, executors, functions, generators, graphs, processes, stats};
use crate::AppState;

pub async fn handle(State(state): State<AppState>, Json(envelope): Json<Envelope>) -> Response {
    match dispatch(&state, &envelope).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(e) => {
            debug!(payload_type = %envelope.payload_type, "request failed: {}", e);
            e.into_response()
        }
    }
}

/// The flat dispatch table. Identity recovery happens once, up front; each
/// handler then enforces its own authorization rule.
pub async fn dispatch(state: &AppState, envelope: &Envelope) -> Result<Reply, ApiError> {
    let caller = state
        .recovery
        .recover(&envelope.payload, &envelope.signature)?;

    match envelope.payload_type.as_str() {
        msgs::ADD_COLONY => colonies::add_colony(state, &caller, envelope).await,
        msgs::GET_COLONY => colonies::get_colony(state, &caller, envelope).await,
        msgs::GET_COLONIES => colonies::get_colonies(state, &caller, envelope).await,
        msgs::DELETE_COLONY => colonies::delete_colony(state, &caller, envelope).await,
        msgs::ADD_EXECUTOR => executors::add_executor(state, &caller, envelope).await,
        msgs::GET_EXECUTORS => executors::get_executors(state, &caller, envelope).await,
        msgs::APPROVE_EXECUTOR => executors::approve_executor(state, &caller, envelope).await,
        msgs::REJECT_EXECUTOR => executors::reject_executor(state, &caller, envelope).await,
        msgs::DELETE_EXECUTOR => executors::delete_executor(state, &caller, envelope).await,
        msgs::SUBMIT_FUNC_SPEC => processes::submit_func_spec(state, &caller, envelope).await,
        msgs::ASSIGN_PROCESS => processes::assign_process(state, &caller, envelope).await,
        msgs::GET_PROCESS => processes::get_process(state, &caller, envelope).await,
        msgs::GET_PROCESSES => processes::get_processes(state, &caller, envelope).await,
        msgs::DELETE_PROCESS => processes::delete_process(state, &caller, envelope).await,
        msgs::DELETE_ALL_PROCESSES => {
            processes::delete_all_processes(state, &caller, envelope).await
        }
        msgs::CLOSE_SUCCESSFUL => processes::close_successful(state, &caller, envelope).await,
        msgs::CLOSE_FAILED => processes::close_failed(state, &caller, envelope).await,
        msgs::SUBMIT_WORKFLOW_SPEC => graphs::submit_workflow(state, &caller, envelope).await,
        msgs::ADD_CHILD => graphs::add_child(state, &caller, envelope).await,
        msgs::GET_PROCESS_GRAPH => graphs::get_graph(state, &caller, envelope).await,
        msgs::GET_PROCESS_GRAPHS => graphs::get_graphs(state, &caller, envelope).await,
        msgs::DELETE_PROCESS_GRAPH => graphs::delete_graph(state, &caller, envelope).await,
        msgs::ADD_ATTRIBUTE => processes::add_attribute(state, &caller, envelope).await,
        msgs::GET_ATTRIBUTE => processes::get_attribute(state, &caller, envelope).await,
        msgs::ADD_FUNCTION => functions::add_function(state, &caller, envelope).await,
        msgs::GET_FUNCTIONS => functions::get_functions(state, &caller, envelope).await,
        msgs::ADD_GENERATOR => generators::add_generator(state, &caller, envelope).await,
        msgs::GET_GENERATOR => generators::get_generator(state, &caller, envelope).await,
        msgs::PACK_GENERATOR => generators::pack_generator(state, &caller, envelope).await,
        msgs::RESOLVE_GENERATOR => generators::resolve_generator(state, &caller, envelope).await,
        msgs::ADD_CRON => crons::add_cron(state, &caller, envelope).await,
        msgs::GET_CRON => crons::get_cron(state, &caller, envelope).await,
        msgs::RUN_CRON => crons::run_cron(state, &caller, envelope).await,
        msgs::COLONY_STATISTICS => stats::colony_statistics(state, &caller, envelope).await,
        msgs::SERVER_STATISTICS => stats::server_statistics(state, &caller, envelope).await,
        other => Err(ApiError::InvalidPayload(format!(
            "unknown payload type: {other}"
        ))),
    }
}
