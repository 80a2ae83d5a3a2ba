use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Placement constraints for a function spec.
///
/// Scheduling consults `colony_id`, `executor_type`, `executor_ids` and
/// `dependencies`; the resource fields ride along for executors that care.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    /// When non-empty, only these executors may be assigned the process.
    #[serde(rename = "executorids", default)]
    pub executor_ids: Vec<String>,

    /// Capability string; empty means any executor type matches.
    #[serde(rename = "executortype", default)]
    pub executor_type: String,

    /// Node names this node depends on, within the same workflow spec.
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub nodes: i32,

    #[serde(default)]
    pub cpu: String,

    #[serde(default)]
    pub mem: String,

    #[serde(default)]
    pub gpu: String,

    /// Requested wall time in seconds, informational.
    #[serde(default)]
    pub walltime: i64,
}

/// Declarative request for one unit of work.
///
/// Sentinel −1 on `max_wait_time`, `max_exec_time` and `max_retries` means
/// infinite/unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Graph key; must be unique within a workflow spec.
    #[serde(rename = "nodename", default)]
    pub node_name: String,

    #[serde(rename = "funcname")]
    pub func_name: String,

    #[serde(default)]
    pub args: Vec<serde_json::Value>,

    #[serde(default)]
    pub kwargs: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub priority: i32,

    /// Seconds a process may stay Waiting before it fails; −1 = forever.
    #[serde(rename = "maxwaittime", default = "default_unbounded")]
    pub max_wait_time: i64,

    /// Seconds a process may stay Running before it is reset; −1 = forever.
    #[serde(rename = "maxexectime", default = "default_unbounded")]
    pub max_exec_time: i64,

    /// Exec-timeout retries before the process fails; −1 = unlimited.
    #[serde(rename = "maxretries", default)]
    pub max_retries: i64,

    pub conditions: Conditions,

    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_unbounded() -> i64 {
    -1
}

impl FunctionSpec {
    pub fn new(func_name: impl Into<String>, conditions: Conditions) -> Self {
        Self {
            node_name: String::new(),
            func_name: func_name.into(),
            args: Vec::new(),
            kwargs: HashMap::new(),
            priority: 0,
            max_wait_time: -1,
            max_exec_time: -1,
            max_retries: 0,
            conditions,
            env: HashMap::new(),
        }
    }

    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    pub fn with_args(mut self, args: Vec<serde_json::Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_wait_time(mut self, seconds: i64) -> Self {
        self.max_wait_time = seconds;
        self
    }

    pub fn with_max_exec_time(mut self, seconds: i64) -> Self {
        self.max_exec_time = seconds;
        self
    }

    pub fn with_max_retries(mut self, retries: i64) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.conditions.dependencies = dependencies;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conditions() -> Conditions {
        Conditions {
            colony_id: crate::generate_id(),
            executor_type: "cli".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_spec_defaults() {
        let spec = FunctionSpec::new("echo", conditions());
        assert_eq!(spec.max_wait_time, -1);
        assert_eq!(spec.max_exec_time, -1);
        assert_eq!(spec.max_retries, 0);
        assert_eq!(spec.priority, 0);
    }

    #[test]
    fn test_spec_json_round_trip() {
        let spec = FunctionSpec::new("gen_nums", conditions())
            .with_node_name("task1")
            .with_args(vec![json!(42), json!("x")])
            .with_max_exec_time(55)
            .with_dependencies(vec!["task0".to_string()]);
        let json = serde_json::to_string(&spec).unwrap();
        let parsed: FunctionSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, parsed);
    }

    #[test]
    fn test_missing_optional_fields_deserialize() {
        let json = format!(
            "{{\"funcname\":\"echo\",\"conditions\":{{\"colonyid\":\"{}\"}}}}",
            "a".repeat(64)
        );
        let spec: FunctionSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec.max_wait_time, -1);
        assert!(spec.conditions.executor_type.is_empty());
    }
}
