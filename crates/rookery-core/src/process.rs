use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::attribute::Attribute;
use crate::spec::FunctionSpec;
use crate::state::ProcessState;

/// A runnable instance of a [`FunctionSpec`] plus its lifecycle state.
///
/// Invariant: `is_assigned` holds exactly when `state == Running`. For graph
/// members, `parents`/`children` are process ids within the same graph and a
/// process with `wait_for_parents` set is never selectable for assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    #[serde(rename = "processid")]
    pub id: String,

    #[serde(rename = "assignedexecutorid", default)]
    pub assigned_executor_id: String,

    #[serde(rename = "isassigned", default)]
    pub is_assigned: bool,

    pub state: ProcessState,

    /// Submission timestamp in nanoseconds; FIFO tiebreaker within a priority.
    #[serde(rename = "prioritytime", default)]
    pub priority_time: i64,

    #[serde(rename = "submissiontime")]
    pub submission_time: DateTime<Utc>,

    #[serde(rename = "starttime", default)]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(rename = "endtime", default)]
    pub end_time: Option<DateTime<Utc>>,

    /// Instant after which a Waiting process fails; unset when unbounded.
    #[serde(rename = "waitdeadline", default)]
    pub wait_deadline: Option<DateTime<Utc>>,

    /// Instant after which a Running process is reset or failed.
    #[serde(rename = "execdeadline", default)]
    pub exec_deadline: Option<DateTime<Utc>>,

    #[serde(default)]
    pub retries: i64,

    #[serde(default)]
    pub attributes: Vec<Attribute>,

    pub spec: FunctionSpec,

    #[serde(rename = "waitforparents", default)]
    pub wait_for_parents: bool,

    #[serde(default)]
    pub parents: Vec<String>,

    #[serde(default)]
    pub children: Vec<String>,

    #[serde(rename = "processgraphid", default)]
    pub process_graph_id: String,

    #[serde(rename = "in", default)]
    pub input: Vec<serde_json::Value>,

    #[serde(rename = "out", default)]
    pub output: Vec<serde_json::Value>,

    #[serde(default)]
    pub errors: Vec<String>,
}

impl Process {
    /// Create a Waiting process from a spec, stamping submission time and
    /// the derived wait deadline.
    pub fn from_spec(spec: FunctionSpec) -> Self {
        let now = Utc::now();
        let wait_deadline = deadline_after(now, spec.max_wait_time);
        Self {
            id: crate::generate_id(),
            assigned_executor_id: String::new(),
            is_assigned: false,
            state: ProcessState::Waiting,
            priority_time: now.timestamp_nanos_opt().unwrap_or_default(),
            submission_time: now,
            start_time: None,
            end_time: None,
            wait_deadline,
            exec_deadline: None,
            retries: 0,
            attributes: Vec::new(),
            spec,
            wait_for_parents: false,
            parents: Vec::new(),
            children: Vec::new(),
            process_graph_id: String::new(),
            input: Vec::new(),
            output: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Flip to Running for the given executor, stamping start time and the
    /// exec deadline. Mirrors the repository-side transition; kept here so
    /// in-memory mutation and tests share one definition.
    pub fn assign(&mut self, executor_id: &str, now: DateTime<Utc>) {
        self.assigned_executor_id = executor_id.to_string();
        self.is_assigned = true;
        self.state = ProcessState::Running;
        self.start_time = Some(now);
        self.exec_deadline = deadline_after(now, self.spec.max_exec_time);
    }

    /// Undo an assignment, returning the process to the queue.
    pub fn unassign(&mut self) {
        self.assigned_executor_id = String::new();
        self.is_assigned = false;
        self.state = ProcessState::Waiting;
        self.start_time = None;
        self.exec_deadline = None;
    }

    pub fn waiting_time(&self) -> Option<Duration> {
        self.start_time.map(|start| start - self.submission_time)
    }

    pub fn processing_time(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// `now + seconds`, or None when seconds is negative (unbounded).
pub fn deadline_after(now: DateTime<Utc>, seconds: i64) -> Option<DateTime<Utc>> {
    if seconds < 0 {
        None
    } else {
        Some(now + Duration::seconds(seconds))
    }
}
