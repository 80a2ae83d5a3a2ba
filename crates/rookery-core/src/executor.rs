use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registration state of an executor.
///
/// Wire codes: Pending=0, Approved=1, Rejected=2. Only approved executors
/// may be assigned processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ExecutorState {
    Pending,
    Approved,
    Rejected,
}

impl From<ExecutorState> for i32 {
    fn from(state: ExecutorState) -> i32 {
        match state {
            ExecutorState::Pending => 0,
            ExecutorState::Approved => 1,
            ExecutorState::Rejected => 2,
        }
    }
}

impl TryFrom<i32> for ExecutorState {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Approved),
            2 => Ok(Self::Rejected),
            other => Err(format!("invalid executor state code: {other}")),
        }
    }
}

/// Physical location hint, purely informational.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub long: f64,
    pub lat: f64,
}

/// A worker identity bound to a colony.
///
/// The `executor_type` is a free-form capability string matched against
/// process conditions at assignment. `(colony_id, name)` is unique within
/// the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Executor {
    #[serde(rename = "executorid")]
    pub id: String,

    #[serde(rename = "executortype")]
    pub executor_type: String,

    #[serde(rename = "executorname")]
    pub name: String,

    #[serde(rename = "colonyid")]
    pub colony_id: String,

    pub state: ExecutorState,

    /// When set, only functions the executor has registered are assignable.
    #[serde(rename = "requirefuncreg")]
    pub require_func_reg: bool,

    #[serde(rename = "commissiontime")]
    pub commission_time: DateTime<Utc>,

    #[serde(rename = "lastheardfromtime")]
    pub last_heard_from_time: DateTime<Utc>,

    pub location: Location,
}

impl Executor {
    pub fn new(
        id: impl Into<String>,
        executor_type: impl Into<String>,
        name: impl Into<String>,
        colony_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            executor_type: executor_type.into(),
            name: name.into(),
            colony_id: colony_id.into(),
            state: ExecutorState::Pending,
            require_func_reg: false,
            commission_time: now,
            last_heard_from_time: now,
            location: Location::default(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.state == ExecutorState::Approved
    }

    pub fn approve(&mut self) {
        self.state = ExecutorState::Approved;
    }

    pub fn reject(&mut self) {
        self.state = ExecutorState::Rejected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_executor_is_pending() {
        let executor = Executor::new(crate::generate_id(), "cli", "worker-1", crate::generate_id());
        assert_eq!(executor.state, ExecutorState::Pending);
        assert!(!executor.is_approved());
    }

    #[test]
    fn test_approve_reject() {
        let mut executor =
            Executor::new(crate::generate_id(), "cli", "worker-1", crate::generate_id());
        executor.approve();
        assert!(executor.is_approved());
        executor.reject();
        assert_eq!(executor.state, ExecutorState::Rejected);
    }

    #[test]
    fn test_executor_state_wire_codes() {
        assert_eq!(serde_json::to_string(&ExecutorState::Approved).unwrap(), "1");
        let state: ExecutorState = serde_json::from_str("2").unwrap();
        assert_eq!(state, ExecutorState::Rejected);
    }

    #[test]
    fn test_executor_json_round_trip() {
        let executor = Executor::new(crate::generate_id(), "gpu", "worker-2", crate::generate_id());
        let json = serde_json::to_string(&executor).unwrap();
        let parsed: Executor = serde_json::from_str(&json).unwrap();
        assert_eq!(executor, parsed);
    }
}
