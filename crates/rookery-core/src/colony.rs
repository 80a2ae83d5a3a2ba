use serde::{Deserialize, Serialize};

/// Tenant unit. A colony owns executors, processes, graphs, generators,
/// crons and functions; the colony id doubles as the owner identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Colony {
    #[serde(rename = "colonyid")]
    pub id: String,

    pub name: String,
}

impl Colony {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colony_json_round_trip() {
        let colony = Colony::new(crate::generate_id(), "dev");
        let json = serde_json::to_string(&colony).unwrap();
        assert!(json.contains("\"colonyid\""));
        let parsed: Colony = serde_json::from_str(&json).unwrap();
        assert_eq!(colony, parsed);
    }
}
