use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::process::Process;
use crate::state::ProcessState;

/// A top-level workflow: a DAG of processes identified by id.
///
/// Graphs store id lists rather than pointers; cycles are rejected at
/// submission time so the stored lists always describe a DAG. The graph
/// state is derived from its members (see [`derive_state`]) and persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessGraph {
    #[serde(rename = "processgraphid")]
    pub id: String,

    #[serde(rename = "colonyid")]
    pub colony_id: String,

    pub state: ProcessState,

    #[serde(rename = "submissiontime")]
    pub submission_time: DateTime<Utc>,

    #[serde(rename = "starttime", default)]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(rename = "endtime", default)]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(rename = "processids", default)]
    pub process_ids: Vec<String>,

    #[serde(default)]
    pub roots: Vec<String>,
}

impl ProcessGraph {
    pub fn new(colony_id: impl Into<String>) -> Self {
        Self {
            id: crate::generate_id(),
            colony_id: colony_id.into(),
            state: ProcessState::Waiting,
            submission_time: Utc::now(),
            start_time: None,
            end_time: None,
            process_ids: Vec::new(),
            roots: Vec::new(),
        }
    }
}

/// Derive a graph's state from its member processes.
///
/// Any Failed member fails the graph; otherwise all-Success succeeds it;
/// otherwise any Running member makes it Running; otherwise Waiting.
pub fn derive_state(members: &[Process]) -> ProcessState {
    let mut all_success = !members.is_empty();
    let mut any_running = false;
    for process in members {
        match process.state {
            ProcessState::Failed => return ProcessState::Failed,
            ProcessState::Success => {}
            ProcessState::Running => {
                any_running = true;
                all_success = false;
            }
            ProcessState::Waiting => all_success = false,
        }
    }
    if all_success {
        ProcessState::Success
    } else if any_running {
        ProcessState::Running
    } else {
        ProcessState::Waiting
    }
}
