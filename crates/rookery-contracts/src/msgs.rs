//! RPC payload structs, one per operation, with their payload-type tags.

use rookery_core::{
    Attribute, Colony, Cron, Executor, Function, FunctionSpec, Generator, WorkflowSpec,
};
use serde::{Deserialize, Serialize};

pub const ADD_COLONY: &str = "addcolony";
pub const GET_COLONY: &str = "getcolony";
pub const GET_COLONIES: &str = "getcolonies";
pub const DELETE_COLONY: &str = "deletecolony";
pub const ADD_EXECUTOR: &str = "addexecutor";
pub const GET_EXECUTORS: &str = "getexecutors";
pub const APPROVE_EXECUTOR: &str = "approveexecutor";
pub const REJECT_EXECUTOR: &str = "rejectexecutor";
pub const DELETE_EXECUTOR: &str = "deleteexecutor";
pub const SUBMIT_FUNC_SPEC: &str = "submitfuncspec";
pub const SUBMIT_WORKFLOW_SPEC: &str = "submitworkflowspec";
pub const ASSIGN_PROCESS: &str = "assignprocess";
pub const GET_PROCESS: &str = "getprocess";
pub const GET_PROCESSES: &str = "getprocesses";
pub const DELETE_PROCESS: &str = "deleteprocess";
pub const DELETE_ALL_PROCESSES: &str = "deleteallprocesses";
pub const CLOSE_SUCCESSFUL: &str = "closesuccessful";
pub const CLOSE_FAILED: &str = "closefailed";
pub const ADD_CHILD: &str = "addchild";
pub const GET_PROCESS_GRAPH: &str = "getprocessgraph";
pub const GET_PROCESS_GRAPHS: &str = "getprocessgraphs";
pub const DELETE_PROCESS_GRAPH: &str = "deleteprocessgraph";
pub const ADD_ATTRIBUTE: &str = "addattribute";
pub const GET_ATTRIBUTE: &str = "getattribute";
pub const ADD_FUNCTION: &str = "addfunction";
pub const GET_FUNCTIONS: &str = "getfunctions";
pub const ADD_GENERATOR: &str = "addgenerator";
pub const GET_GENERATOR: &str = "getgenerator";
pub const PACK_GENERATOR: &str = "packgenerator";
pub const RESOLVE_GENERATOR: &str = "resolvegenerator";
pub const ADD_CRON: &str = "addcron";
pub const GET_CRON: &str = "getcron";
pub const RUN_CRON: &str = "runcron";
pub const SUBSCRIBE_PROCESS: &str = "subscribeprocess";
pub const SUBSCRIBE_PROCESSES: &str = "subscribeprocesses";
pub const COLONY_STATISTICS: &str = "colonystatistics";
pub const SERVER_STATISTICS: &str = "serverstatistics";
pub const ERROR: &str = "error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddColonyMsg {
    pub colony: Colony,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetColonyMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetColoniesMsg {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteColonyMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddExecutorMsg {
    pub executor: Executor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetExecutorsMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveExecutorMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "executorid")]
    pub executor_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectExecutorMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "executorid")]
    pub executor_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteExecutorMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "executorid")]
    pub executor_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitFunctionSpecMsg {
    pub spec: FunctionSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitWorkflowSpecMsg {
    pub spec: WorkflowSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignProcessMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    /// Seconds to wait for work; −1 = forever, 0 = non-blocking.
    pub timeout: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetProcessMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "processid")]
    pub process_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetProcessesMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    pub state: i32,

    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProcessMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "processid")]
    pub process_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAllProcessesMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloseSuccessfulMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "processid")]
    pub process_id: String,

    #[serde(rename = "out", default)]
    pub output: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseFailedMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "processid")]
    pub process_id: String,

    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddChildMsg {
    #[serde(rename = "processgraphid")]
    pub process_graph_id: String,

    #[serde(rename = "parentprocessid")]
    pub parent_process_id: String,

    /// When set, the new node is wedged only on the edge to this child.
    #[serde(rename = "insertbeforeprocessid", default)]
    pub insert_before_process_id: String,

    pub spec: FunctionSpec,

    /// Wedge between the parent and all its children.
    #[serde(default)]
    pub insert: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetProcessGraphMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "processgraphid")]
    pub process_graph_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetProcessGraphsMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    pub state: i32,

    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProcessGraphMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "processgraphid")]
    pub process_graph_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAttributeMsg {
    pub attribute: Attribute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAttributeMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "attributeid")]
    pub attribute_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddFunctionMsg {
    pub function: Function,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetFunctionsMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    /// Restrict to one executor when non-empty.
    #[serde(rename = "executorid", default)]
    pub executor_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddGeneratorMsg {
    pub generator: Generator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetGeneratorMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "generatorid")]
    pub generator_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackGeneratorMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "generatorid")]
    pub generator_id: String,

    pub arg: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveGeneratorMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "generatorname")]
    pub generator_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddCronMsg {
    pub cron: Cron,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCronMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "cronid")]
    pub cron_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCronMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "cronid")]
    pub cron_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeProcessMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "processid")]
    pub process_id: String,

    pub state: i32,

    /// Seconds to hold the subscription; −1 = no limit.
    pub timeout: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeProcessesMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,

    #[serde(rename = "executortype")]
    pub executor_type: String,

    pub state: i32,

    pub timeout: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColonyStatisticsMsg {
    #[serde(rename = "colonyid")]
    pub colony_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatisticsMsg {}

/// Error reply payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureMsg {
    pub status: i32,

    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rookery_core::Conditions;

    #[test]
    fn test_submit_msg_round_trip() {
        let msg = SubmitFunctionSpecMsg {
            spec: FunctionSpec::new(
                "echo",
                Conditions {
                    colony_id: "c".repeat(64),
                    executor_type: "cli".to_string(),
                    ..Default::default()
                },
            ),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: SubmitFunctionSpecMsg = serde_json::from_str(&json).unwrap();
        assert_eq!(msg, parsed);
    }

    #[test]
    fn test_assign_msg_field_names() {
        let msg = AssignProcessMsg {
            colony_id: "c".repeat(64),
            timeout: -1,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"colonyid\""));
        assert!(json.contains("\"timeout\":-1"));
    }

    #[test]
    fn test_add_child_msg_defaults() {
        let json = format!(
            "{{\"processgraphid\":\"g\",\"parentprocessid\":\"p\",\"spec\":{}}}",
            serde_json::to_string(&FunctionSpec::new("f", Conditions::default())).unwrap()
        );
        let msg: AddChildMsg = serde_json::from_str(&json).unwrap();
        assert!(msg.insert_before_process_id.is_empty());
        assert!(!msg.insert);
    }
}
