use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Periodic workflow factory fed by packed arguments.
///
/// A generator fires when enough args have accumulated (`trigger`) or when
/// `timeout` seconds have elapsed since the first pack of the current batch
/// and at least one arg is present. The `workflow_spec` field is a JSON
/// workflow-spec template; packed args are appended to each node's args at
/// instantiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    #[serde(rename = "generatorid")]
    pub id: String,

    #[serde(rename = "colonyid")]
    pub colony_id: String,

    pub name: String,

    #[serde(rename = "workflowspec")]
    pub workflow_spec: String,

    /// Argument count threshold.
    pub trigger: i64,

    /// Seconds since `first_pack` after which a partial batch is drained;
    /// −1 disables the timeout path.
    #[serde(default = "default_timeout")]
    pub timeout: i64,

    #[serde(rename = "lastrun", default)]
    pub last_run: Option<DateTime<Utc>>,

    /// Stamped by the first pack of a batch; cleared when the batch drains.
    #[serde(rename = "firstpack", default)]
    pub first_pack: Option<DateTime<Utc>>,

    /// Trigger-loop cadence hint in milliseconds.
    #[serde(rename = "checkerperiod", default)]
    pub checker_period: i64,
}

fn default_timeout() -> i64 {
    -1
}

impl Generator {
    pub fn new(
        colony_id: impl Into<String>,
        name: impl Into<String>,
        workflow_spec: impl Into<String>,
        trigger: i64,
    ) -> Self {
        Self {
            id: crate::generate_id(),
            colony_id: colony_id.into(),
            name: name.into(),
            workflow_spec: workflow_spec.into(),
            trigger,
            timeout: -1,
            last_run: None,
            first_pack: None,
            checker_period: 0,
        }
    }

    pub fn with_timeout(mut self, seconds: i64) -> Self {
        self.timeout = seconds;
        self
    }
}

/// One packed argument waiting to be consumed by a generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorArg {
    #[serde(rename = "generatorargid")]
    pub id: String,

    #[serde(rename = "generatorid")]
    pub generator_id: String,

    #[serde(rename = "colonyid")]
    pub colony_id: String,

    pub arg: String,
}

impl GeneratorArg {
    pub fn new(
        generator_id: impl Into<String>,
        colony_id: impl Into<String>,
        arg: impl Into<String>,
    ) -> Self {
        Self {
            id: crate::generate_id(),
            generator_id: generator_id.into(),
            colony_id: colony_id.into(),
            arg: arg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_json_round_trip() {
        let generator =
            Generator::new(crate::generate_id(), "nightly", "{}", 3).with_timeout(60);
        let json = serde_json::to_string(&generator).unwrap();
        let parsed: Generator = serde_json::from_str(&json).unwrap();
        assert_eq!(generator, parsed);
    }

    #[test]
    fn test_generator_defaults() {
        let generator = Generator::new(crate::generate_id(), "nightly", "{}", 10);
        assert_eq!(generator.timeout, -1);
        assert!(generator.first_pack.is_none());
        assert!(generator.last_run.is_none());
    }
}
