use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rookery_contracts::{msgs, ContractError, Reply};
use rookery_engine::EngineError;
use rookery_storage::StoreError;

/// Boundary error: every variant maps to an HTTP status plus an error reply.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("no processes available")]
    NoProcessesAvailable,

    #[error("rate limited")]
    RateLimited,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidPayload(_)
            | Self::NotFound(_)
            | Self::Conflict(_)
            | Self::InvalidWorkflow(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::FORBIDDEN,
            Self::NoProcessesAvailable => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The error reply envelope sent alongside the status code.
    pub fn reply(&self) -> Reply {
        let failure = msgs::FailureMsg {
            status: self.status().as_u16() as i32,
            message: self.to_string(),
        };
        Reply::failure(msgs::ERROR, &failure).unwrap_or(Reply {
            payload_type: msgs::ERROR.to_string(),
            payload: String::new(),
            error: true,
        })
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::NoProcessesAvailable => Self::NoProcessesAvailable,
            EngineError::InvalidWorkflow(inner) => Self::InvalidWorkflow(inner.to_string()),
            EngineError::InvalidArgument(msg) => Self::InvalidPayload(msg),
            EngineError::AccessDenied(msg) => Self::Unauthorized(msg),
            EngineError::QueueFull => Self::RateLimited,
            EngineError::ShuttingDown => Self::Internal("server is shutting down".to_string()),
            EngineError::Store(inner) => Self::from(inner),
            EngineError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => Self::NotFound(e.to_string()),
            StoreError::Conflict(_) | StoreError::InvalidState { .. } => {
                Self::Conflict(e.to_string())
            }
            StoreError::LockTimeout
            | StoreError::Database(_)
            | StoreError::Serialization(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<ContractError> for ApiError {
    fn from(e: ContractError) -> Self {
        Self::InvalidPayload(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.reply())).into_response()
    }
}
