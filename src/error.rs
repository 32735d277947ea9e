use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Everything a guestbook operation can fail with.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{message}")]
    Validation { message: String },

    #[error("Maximum number of messages reached")]
    CapacityExceeded,

    #[error("Too many messages from this address, please try again later.")]
    RateLimited { retry_after_secs: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("template error: {0}")]
    Template(#[from] tera::Error),
}

impl AppError {
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Stable machine-readable kind, sent next to the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "validation_error",
            AppError::CapacityExceeded => "capacity_exceeded",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::Storage(_) | AppError::Template(_) => "internal_error",
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Storage(_) | AppError::Template(_) => {
                "Something went wrong, please try again later".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::CapacityExceeded => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Storage(_) | AppError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Storage(_) | AppError::Template(_) => {
                tracing::error!("request failed: {}", self);
            }
            _ => {
                tracing::info!("request rejected: {}", self);
            }
        }

        let mut builder = HttpResponse::build(self.status_code());
        if let AppError::RateLimited { retry_after_secs } = self {
            builder.insert_header((header::RETRY_AFTER, retry_after_secs.to_string()));
        }
        builder.json(json!({
            "error": self.public_message(),
            "code": self.code(),
        }))
    }
}

pub type AppResult<T> = Result<T, AppError>;
