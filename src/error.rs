//! Errors surfaced by the read and preference services.
//!
//! Each variant maps onto the status code the HTTP collaborator should answer
//! with; provider failures never reach this type because provider clients
//! absorb them.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{resource} with id {id} not found")]
    NotFound { resource: &'static str, id: i64 },

    #[error("validation failed for `{field}`: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("User not found. Please authenticate or provide user_id.")]
    Unauthorized,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    /// Repository errors arrive as `anyhow`; keep database failures typed.
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<sqlx::Error>() {
            Ok(db) => ApiError::Database(db),
            Err(other) => ApiError::Internal(other),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ApiError::Validation {
            field,
            message: message.into(),
        }
    }

    /// HTTP status the caller should respond with.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound { .. } => 404,
            ApiError::Validation { .. } => 422,
            ApiError::Unauthorized => 401,
            ApiError::Database(_) | ApiError::Internal(_) => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}
