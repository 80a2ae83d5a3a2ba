//! Statistics handlers

use rookery_contracts::{msgs, Envelope, Reply};
use rookery_core::{ColonyStatistics, ProcessState, ServerStatistics};

use crate::error::ApiError;
use crate::AppState;

pub async fn colony_statistics(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    let msg: msgs::ColonyStatisticsMsg = envelope.decode(msgs::COLONY_STATISTICS)?;
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
    let repo = state.controller.repository();
    let colony = Some(msg.colony_id.as_str());
    let stats = ColonyStatistics {
        colony_id: msg.colony_id.clone(),
        executors: repo.count_executors(colony).await?,
        waiting_processes: repo.count_processes(colony, ProcessState::Waiting).await?,
        running_processes: repo.count_processes(colony, ProcessState::Running).await?,
        successful_processes: repo.count_processes(colony, ProcessState::Success).await?,
        failed_processes: repo.count_processes(colony, ProcessState::Failed).await?,
        waiting_workflows: repo.count_graphs(colony, ProcessState::Waiting).await?,
        running_workflows: repo.count_graphs(colony, ProcessState::Running).await?,
        successful_workflows: repo.count_graphs(colony, ProcessState::Success).await?,
        failed_workflows: repo.count_graphs(colony, ProcessState::Failed).await?,
    };
    Ok(Reply::ok(msgs::COLONY_STATISTICS, &stats)?)
}

pub async fn server_statistics(
    state: &AppState,
    caller: &str,
    envelope: &Envelope,
) -> Result<Reply, ApiError> {
    state.validator.require_server_owner(caller)?;
    let _msg: msgs::ServerStatisticsMsg = envelope.decode(msgs::SERVER_STATISTICS)?;
    let repo = state.controller.repository();
    let stats = ServerStatistics {
        colonies: repo.count_colonies().await?,
        executors: repo.count_executors(None).await?,
        waiting_processes: repo.count_processes(None, ProcessState::Waiting).await?,
        running_processes: repo.count_processes(None, ProcessState::Running).await?,
        successful_processes: repo.count_processes(None, ProcessState::Success).await?,
        failed_processes: repo.count_processes(None, ProcessState::Failed).await?,
    };
    Ok(Reply::ok(msgs::SERVER_STATISTICS, &stats)?)
}
