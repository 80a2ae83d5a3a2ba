use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Wire-level decode/encode failures.
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload type mismatch: expected {expected}, got {actual}")]
    PayloadTypeMismatch { expected: String, actual: String },
}

/// Signed request envelope: `payload` is base64-encoded JSON and `signature`
/// identifies the caller (recovery happens at the boundary).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "payloadtype")]
    pub payload_type: String,

    pub payload: String,

    pub signature: String,
}

impl Envelope {
    pub fn pack<T: Serialize>(
        payload_type: &str,
        msg: &T,
        signature: &str,
    ) -> Result<Self, ContractError> {
        let json = serde_json::to_vec(msg)?;
        Ok(Self {
            payload_type: payload_type.to_string(),
            payload: BASE64.encode(json),
            signature: signature.to_string(),
        })
    }

    /// Decode the payload, checking the declared type first.
    pub fn decode<T: DeserializeOwned>(&self, expected_type: &str) -> Result<T, ContractError> {
        if self.payload_type != expected_type {
            return Err(ContractError::PayloadTypeMismatch {
                expected: expected_type.to_string(),
                actual: self.payload_type.clone(),
            });
        }
        let bytes = BASE64.decode(&self.payload)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Reply envelope. `error` marks the payload as a [`crate::msgs::FailureMsg`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(rename = "payloadtype")]
    pub payload_type: String,

    pub payload: String,

    #[serde(default)]
    pub error: bool,
}

impl Reply {
    pub fn ok<T: Serialize>(payload_type: &str, msg: &T) -> Result<Self, ContractError> {
        let json = serde_json::to_vec(msg)?;
        Ok(Self {
            payload_type: payload_type.to_string(),
            payload: BASE64.encode(json),
            error: false,
        })
    }

    pub fn failure<T: Serialize>(payload_type: &str, msg: &T) -> Result<Self, ContractError> {
        let mut reply = Self::ok(payload_type, msg)?;
        reply.error = true;
        Ok(reply)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ContractError> {
        let bytes = BASE64.decode(&self.payload)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgs;

    #[test]
    fn test_envelope_round_trip() {
        let msg = msgs::GetProcessMsg {
            colony_id: "a".repeat(64),
            process_id: "b".repeat(64),
        };
        let envelope = Envelope::pack(msgs::GET_PROCESS, &msg, "secret").unwrap();
        assert_eq!(envelope.payload_type, "getprocess");

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"payloadtype\""));
        let parsed: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope, parsed);

        let decoded: msgs::GetProcessMsg = parsed.decode(msgs::GET_PROCESS).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let msg = msgs::ServerStatisticsMsg {};
        let envelope = Envelope::pack(msgs::SERVER_STATISTICS, &msg, "s").unwrap();
        let result: Result<msgs::GetProcessMsg, _> = envelope.decode(msgs::GET_PROCESS);
        assert!(matches!(
            result,
            Err(ContractError::PayloadTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_bad_base64_rejected() {
        let envelope = Envelope {
            payload_type: "getprocess".to_string(),
            payload: "!!not base64!!".to_string(),
            signature: String::new(),
        };
        let result: Result<msgs::GetProcessMsg, _> = envelope.decode(msgs::GET_PROCESS);
        assert!(matches!(result, Err(ContractError::Base64(_))));
    }

    #[test]
    fn test_failure_reply() {
        let failure = msgs::FailureMsg {
            status: 403,
            message: "access denied".to_string(),
        };
        let reply = Reply::failure(msgs::ERROR, &failure).unwrap();
        assert!(reply.error);
        let decoded: msgs::FailureMsg = reply.decode().unwrap();
        assert_eq!(decoded, failure);
    }
}
