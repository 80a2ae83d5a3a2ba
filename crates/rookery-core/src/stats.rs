use serde::{Deserialize, Serialize};

/// Per-colony process and graph counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColonyStatistics {
    #[serde(rename = "colonyid", default)]
    pub colony_id: String,

    pub executors: i64,

    #[serde(rename = "waitingprocesses")]
    pub waiting_processes: i64,

    #[serde(rename = "runningprocesses")]
    pub running_processes: i64,

    #[serde(rename = "successfulprocesses")]
    pub successful_processes: i64,

    #[serde(rename = "failedprocesses")]
    pub failed_processes: i64,

    #[serde(rename = "waitingworkflows")]
    pub waiting_workflows: i64,

    #[serde(rename = "runningworkflows")]
    pub running_workflows: i64,

    #[serde(rename = "successfulworkflows")]
    pub successful_workflows: i64,

    #[serde(rename = "failedworkflows")]
    pub failed_workflows: i64,
}

/// Server-wide counts across all colonies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatistics {
    pub colonies: i64,

    pub executors: i64,

    #[serde(rename = "waitingprocesses")]
    pub waiting_processes: i64,

    #[serde(rename = "runningprocesses")]
    pub running_processes: i64,

    #[serde(rename = "successfulprocesses")]
    pub successful_processes: i64,

    #[serde(rename = "failedprocesses")]
    pub failed_processes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_round_trip() {
        let stats = ColonyStatistics {
            colony_id: crate::generate_id(),
            executors: 2,
            waiting_processes: 5,
            ..Default::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        let parsed: ColonyStatistics = serde_json::from_str(&json).unwrap();
        assert_eq!(stats, parsed);
    }
}
