//! Process lifecycle states and their integer wire codes

use serde::{Deserialize, Serialize};

/// Lifecycle state of a process.
///
/// The integer codes are part of the wire protocol: Waiting=0, Running=1,
/// Success=2, Failed=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum ProcessState {
    Waiting,
    Running,
    Success,
    Failed,
}

impl ProcessState {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl From<ProcessState> for i32 {
    fn from(state: ProcessState) -> i32 {
        match state {
            ProcessState::Waiting => 0,
            ProcessState::Running => 1,
            ProcessState::Success => 2,
            ProcessState::Failed => 3,
        }
    }
}

impl TryFrom<i32> for ProcessState {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Waiting),
            1 => Ok(Self::Running),
            2 => Ok(Self::Success),
            3 => Ok(Self::Failed),
            other => Err(format!("invalid process state code: {other}")),
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_codes_round_trip() {
        for code in 0..4 {
            let state = ProcessState::try_from(code).unwrap();
            assert_eq!(i32::from(state), code);
        }
        assert!(ProcessState::try_from(4).is_err());
        assert!(ProcessState::try_from(-1).is_err());
    }

    #[test]
    fn test_state_serializes_as_integer() {
        let json = serde_json::to_string(&ProcessState::Success).unwrap();
        assert_eq!(json, "2");
        let state: ProcessState = serde_json::from_str("1").unwrap();
        assert_eq!(state, ProcessState::Running);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ProcessState::Waiting.is_terminal());
        assert!(!ProcessState::Running.is_terminal());
        assert!(ProcessState::Success.is_terminal());
        assert!(ProcessState::Failed.is_terminal());
    }
}
