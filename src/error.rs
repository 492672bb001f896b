//! Error type shared by the library and the HTTP layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// Bad or missing upload, or an unsupported extension
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    /// No survey with this identifier, or its template file is gone
    #[error("Survey not found: {0}")]
    TemplateNotFound(String),

    /// Export requested but the template file is no longer in storage
    #[error("Template missing for survey {0}")]
    TemplateMissing(String),

    /// The template exists but is not readable tabular data
    #[error("Template unreadable: {0}")]
    TemplateUnreadable(String),

    #[error("Failed to store response: {0}")]
    ResponsePersistFailure(String),

    #[error("Failed to deliver email: {0}")]
    EmailDeliveryFailure(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Render failed: {0}")]
    Render(String),

    /// A server-side failure with no more specific variant
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<csv::Error> for AppError {
    fn from(e: csv::Error) -> Self {
        AppError::Export(e.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for AppError {
    fn from(e: rust_xlsxwriter::XlsxError) -> Self {
        AppError::Export(e.to_string())
    }
}

#[cfg(feature = "web")]
mod http {
    use super::AppError;
    use axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    };

    impl AppError {
        pub fn status(&self) -> StatusCode {
            match self {
                AppError::UploadRejected(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                AppError::TemplateNotFound(_) | AppError::TemplateMissing(_) => {
                    StatusCode::NOT_FOUND
                }
                AppError::Unauthorized => StatusCode::UNAUTHORIZED,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }

        /// Message safe to show to the client. Server-side failures only
        /// expose a generic text; the detail goes to the log.
        pub fn public_message(&self) -> String {
            match self {
                AppError::UploadRejected(msg) | AppError::InvalidInput(msg) => msg.clone(),
                AppError::TemplateNotFound(_) => "Survey not found.".to_string(),
                AppError::TemplateMissing(_) => "No survey file found to export.".to_string(),
                AppError::TemplateUnreadable(_) => "Could not process the survey file.".to_string(),
                AppError::ResponsePersistFailure(_) => "Could not save your response.".to_string(),
                AppError::EmailDeliveryFailure(_) => "Could not send the email.".to_string(),
                AppError::Unauthorized => "Unauthorized".to_string(),
                _ => "Internal server error".to_string(),
            }
        }
    }

    impl IntoResponse for AppError {
        fn into_response(self) -> Response {
            let status = self.status();
            if status.is_server_error() {
                log::error!("{}", self);
            } else {
                log::warn!("{}", self);
            }

            (
                status,
                Json(serde_json::json!({ "error": self.public_message() })),
            )
                .into_response()
        }
    }
}
