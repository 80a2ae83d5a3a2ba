use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Attribute kind. Wire codes: In=0, Out=1, Err=2, Env=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum AttributeType {
    In,
    Out,
    Err,
    Env,
}

impl From<AttributeType> for i32 {
    fn from(t: AttributeType) -> i32 {
        match t {
            AttributeType::In => 0,
            AttributeType::Out => 1,
            AttributeType::Err => 2,
            AttributeType::Env => 3,
        }
    }
}

impl TryFrom<i32> for AttributeType {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::In),
            1 => Ok(Self::Out),
            2 => Ok(Self::Err),
            3 => Ok(Self::Env),
            other => Err(format!("invalid attribute type code: {other}")),
        }
    }
}

/// Typed key-value annotation on a process.
///
/// The id is a hash over (graph, target, key, type), making attributes
/// naturally unique per `(target_id, attribute_type, key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(rename = "attributeid")]
    pub id: String,

    #[serde(rename = "targetid")]
    pub target_id: String,

    #[serde(rename = "targetcolonyid")]
    pub target_colony_id: String,

    #[serde(rename = "targetprocessgraphid", default)]
    pub target_process_graph_id: String,

    #[serde(rename = "attributetype")]
    pub attribute_type: AttributeType,

    pub key: String,

    pub value: String,
}

impl Attribute {
    pub fn new(
        target_colony_id: impl Into<String>,
        target_process_graph_id: impl Into<String>,
        target_id: impl Into<String>,
        attribute_type: AttributeType,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let target_colony_id = target_colony_id.into();
        let target_process_graph_id = target_process_graph_id.into();
        let target_id = target_id.into();
        let key = key.into();
        let mut hasher = Sha256::new();
        hasher.update(target_process_graph_id.as_bytes());
        hasher.update(target_id.as_bytes());
        hasher.update(key.as_bytes());
        hasher.update([i32::from(attribute_type) as u8]);
        let id = hex::encode(hasher.finalize());
        Self {
            id,
            target_id,
            target_colony_id,
            target_process_graph_id,
            attribute_type,
            key,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_id_is_deterministic() {
        let colony = crate::generate_id();
        let target = crate::generate_id();
        let a = Attribute::new(&colony, "", &target, AttributeType::Out, "result", "1");
        let b = Attribute::new(&colony, "", &target, AttributeType::Out, "result", "2");
        assert_eq!(a.id, b.id);

        let c = Attribute::new(&colony, "", &target, AttributeType::Err, "result", "1");
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_attribute_type_codes() {
        assert_eq!(serde_json::to_string(&AttributeType::Env).unwrap(), "3");
        let t: AttributeType = serde_json::from_str("1").unwrap();
        assert_eq!(t, AttributeType::Out);
    }

    #[test]
    fn test_attribute_json_round_trip() {
        let attribute = Attribute::new(
            crate::generate_id(),
            crate::generate_id(),
            crate::generate_id(),
            AttributeType::In,
            "threshold",
            "0.5",
        );
        let json = serde_json::to_string(&attribute).unwrap();
        let parsed: Attribute = serde_json::from_str(&json).unwrap();
        assert_eq!(attribute, parsed);
    }
}
