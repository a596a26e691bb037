use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::core::ai::AiError;
use crate::core::lifecycle::LifecycleError;
use crate::core::period::PeriodError;
use crate::db::StoreError;
use crate::models::UnknownVariant;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// JSON error response structure.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// The central error type used for HTTP responses.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("patient {0} already exists")]
    Conflict(Uuid),

    #[error("patient {0} was changed by another request; reload and retry")]
    StaleWrite(Uuid),

    #[error("invalid input: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Period(#[from] PeriodError),

    #[error("the AI assistant is not configured")]
    AssistantUnavailable,

    #[error("failed to generate: {0}")]
    Ai(#[source] AiError),

    /// Storage failure
    #[error("internal server error")]
    Store(#[source] StoreError),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::NotFound,
            StoreError::Conflict(id) => AppError::Conflict(id),
            StoreError::StaleWrite(id) => AppError::StaleWrite(id),
            other => AppError::Store(other),
        }
    }
}

impl From<AiError> for AppError {
    fn from(e: AiError) -> Self {
        match e {
            AiError::NotConfigured => AppError::AssistantUnavailable,
            other => AppError::Ai(other),
        }
    }
}

impl From<UnknownVariant> for AppError {
    fn from(e: UnknownVariant) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::Period(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) | AppError::StaleWrite(_) | AppError::Lifecycle(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AssistantUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Ai(_) => StatusCode::BAD_GATEWAY,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Store(e) => error!(error = %e, "storage error"),
            AppError::Ai(e) => warn!(error = %e, "assistant request failed"),
            _ => {}
        }

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}
