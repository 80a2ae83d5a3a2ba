//! Identity recovery and ownership validation
//!
//! Real deployments recover the caller identity from a cryptographic
//! signature over the payload; that capability is pluggable behind
//! [`IdentityRecoverer`]. The bundled [`ApiKeyIdentity`] treats the envelope
//! signature as an opaque secret token and derives the identity as its
//! sha256 hash, which is exactly how colony and executor ids are minted: a
//! caller holding the secret a colony or executor was created from *is* that
//! identity.

use std::sync::Arc;

use rookery_core::{identity_of, Executor};
use rookery_storage::{Repository, StoreError};

use crate::error::ApiError;

/// Recover the caller identity from an envelope signature.
pub trait IdentityRecoverer: Send + Sync + 'static {
    fn recover(&self, payload: &str, signature: &str) -> Result<String, ApiError>;
}

/// Hashed-token identity scheme for dev and test deployments.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiKeyIdentity;

impl IdentityRecoverer for ApiKeyIdentity {
    fn recover(&self, _payload: &str, signature: &str) -> Result<String, ApiError> {
        if signature.is_empty() {
            return Err(ApiError::Unauthorized("missing signature".to_string()));
        }
        Ok(identity_of(signature))
    }
}

/// Ownership rules from the wire contract: server owner for structural
/// server operations, colony owner for colony administration, approved
/// executor membership for operational calls.
pub struct Validator {
    repo: Arc<dyn Repository>,
    server_owner_id: String,
}

impl Validator {
    pub fn new(repo: Arc<dyn Repository>, server_owner_id: String) -> Self {
        Self {
            repo,
            server_owner_id,
        }
    }

    pub fn require_server_owner(&self, caller: &str) -> Result<(), ApiError> {
        if caller != self.server_owner_id {
            return Err(ApiError::Unauthorized(
                "server owner key required".to_string(),
            ));
        }
        Ok(())
    }

    /// The colony id doubles as the owner identity.
    pub async fn require_colony_owner(
        &self,
        caller: &str,
        colony_id: &str,
    ) -> Result<(), ApiError> {
        self.repo.get_colony(colony_id).await.map_err(|e| match e {
            StoreError::NotFound { .. } => ApiError::NotFound(e.to_string()),
            other => ApiError::from(other),
        })?;
        if caller != colony_id {
            return Err(ApiError::Unauthorized(
                "colony owner key required".to_string(),
            ));
        }
        Ok(())
    }

    /// The caller must be an executor registered to the colony.
    pub async fn require_executor_membership(
        &self,
        caller: &str,
        colony_id: &str,
        must_be_approved: bool,
    ) -> Result<Executor, ApiError> {
        let executor = match self.repo.get_executor(caller).await {
            Ok(executor) => executor,
            Err(StoreError::NotFound { .. }) => {
                return Err(ApiError::Unauthorized(
                    "caller is not a registered executor".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        if executor.colony_id != colony_id {
            return Err(ApiError::Unauthorized(
                "executor is not a member of the colony".to_string(),
            ));
        }
        if must_be_approved && !executor.is_approved() {
            return Err(ApiError::Unauthorized(
                "executor is not approved".to_string(),
            ));
        }
        Ok(executor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rookery_core::{generate_secret, Colony};
    use rookery_storage::InMemoryRepository;

    #[test]
    fn test_recovery_is_hash_of_secret() {
        let (secret, id) = generate_secret();
        let recovered = ApiKeyIdentity.recover("payload", &secret).unwrap();
        assert_eq!(recovered, id);
    }

    #[test]
    fn test_empty_signature_rejected() {
        assert!(ApiKeyIdentity.recover("payload", "").is_err());
    }

    #[tokio::test]
    async fn test_colony_owner_check() {
        let repo = Arc::new(InMemoryRepository::new());
        let (owner_secret, colony_id) = generate_secret();
        repo.add_colony(&Colony::new(&colony_id, "dev")).await.unwrap();

        let validator = Validator::new(repo, "server-owner".to_string());
        let caller = ApiKeyIdentity.recover("", &owner_secret).unwrap();
        assert!(validator.require_colony_owner(&caller, &colony_id).await.is_ok());
        assert!(validator
            .require_colony_owner("someone-else", &colony_id)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_membership_requires_approval() {
        let repo = Arc::new(InMemoryRepository::new());
        let colony_id = rookery_core::generate_id();
        repo.add_colony(&Colony::new(&colony_id, "dev")).await.unwrap();
        let executor = Executor::new(rookery_core::generate_id(), "cli", "w", &colony_id);
        repo.add_executor(&executor).await.unwrap();

        let validator = Validator::new(repo.clone(), "server-owner".to_string());
        assert!(validator
            .require_executor_membership(&executor.id, &colony_id, false)
            .await
            .is_ok());
        assert!(validator
            .require_executor_membership(&executor.id, &colony_id, true)
            .await
            .is_err());

        repo.set_executor_state(&executor.id, rookery_core::ExecutorState::Approved)
            .await
            .unwrap();
        assert!(validator
            .require_executor_membership(&executor.id, &colony_id, true)
            .await
            .is_ok());
    }
}
