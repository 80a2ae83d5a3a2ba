use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Calendar-triggered workflow factory.
///
/// `cron_expression` drives the schedule; when it is empty, `interval`
/// seconds is the fallback cadence and `random` adds jitter on top of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cron {
    #[serde(rename = "cronid")]
    pub id: String,

    #[serde(rename = "colonyid")]
    pub colony_id: String,

    pub name: String,

    #[serde(rename = "cronexpression", default)]
    pub cron_expression: String,

    /// Fallback cadence in seconds when no expression is set.
    #[serde(default)]
    pub interval: i64,

    /// Add uniform jitter in [0, interval) to interval-based schedules.
    #[serde(default)]
    pub random: bool,

    #[serde(rename = "nextrun", default)]
    pub next_run: Option<DateTime<Utc>>,

    #[serde(rename = "lastrun", default)]
    pub last_run: Option<DateTime<Utc>>,

    #[serde(rename = "workflowspec")]
    pub workflow_spec: String,

    /// Graph created by the previous firing.
    #[serde(rename = "prevprocessgraphid", default)]
    pub prev_process_graph_id: String,

    /// Skip firing while the previous graph is still Waiting or Running.
    #[serde(rename = "waitforprevprocessgraph", default)]
    pub wait_for_prev_process_graph: bool,

    #[serde(rename = "checkerperiod", default)]
    pub checker_period: i64,
}

impl Cron {
    pub fn new(
        colony_id: impl Into<String>,
        name: impl Into<String>,
        workflow_spec: impl Into<String>,
    ) -> Self {
        Self {
            id: crate::generate_id(),
            colony_id: colony_id.into(),
            name: name.into(),
            cron_expression: String::new(),
            interval: 0,
            random: false,
            next_run: None,
            last_run: None,
            workflow_spec: workflow_spec.into(),
            prev_process_graph_id: String::new(),
            wait_for_prev_process_graph: false,
            checker_period: 0,
        }
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.cron_expression = expression.into();
        self
    }

    pub fn with_interval(mut self, seconds: i64) -> Self {
        self.interval = seconds;
        self
    }

    /// A cron with neither expression nor positive interval can never fire.
    pub fn has_schedule(&self) -> bool {
        !self.cron_expression.is_empty() || self.interval > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_json_round_trip() {
        let cron = Cron::new(crate::generate_id(), "hourly-report", "{}")
            .with_expression("0 * * * *");
        let json = serde_json::to_string(&cron).unwrap();
        let parsed: Cron = serde_json::from_str(&json).unwrap();
        assert_eq!(cron, parsed);
    }

    #[test]
    fn test_has_schedule() {
        let base = Cron::new(crate::generate_id(), "c", "{}");
        assert!(!base.has_schedule());
        assert!(base.clone().with_interval(30).has_schedule());
        assert!(base.with_expression("*/5 * * * *").has_schedule());
    }
}
