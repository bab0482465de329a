use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Maximum number of characters of an upstream error body surfaced to callers.
pub const MAX_ERROR_DETAIL_CHARS: usize = 500;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Required request data is missing or malformed.
    BadRequest(String),
    /// The service is missing configuration needed to serve the request.
    Configuration(String),
    /// The completion API failed at transport level or answered with a non-success status.
    Upstream {
        /// HTTP status returned upstream, `None` for transport failures.
        status: Option<u16>,
        /// Error body or transport message, already truncated.
        detail: String,
    },
    /// Internal server error.
    Internal(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Builds an upstream error, truncating the detail so large HTML error pages
    /// don't end up in responses or logs.
    pub fn upstream(status: Option<u16>, detail: impl AsRef<str>) -> Self {
        AppError::Upstream {
            status,
            detail: truncate_chars(detail.as_ref(), MAX_ERROR_DETAIL_CHARS),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Upstream {
                status: Some(status),
                detail,
            } => write!(f, "Upstream error (status {}): {}", status, detail),
            AppError::Upstream { status: None, detail } => {
                write!(f, "Upstream error: {}", detail)
            }
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Maps each error variant to a status code and the `{error, detalle}` body
    /// the CRM front end expects.
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => {
                tracing::warn!("Rejected request: {}", msg);
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "El backend IA no está configurado correctamente",
                        "detalle": msg,
                    }),
                )
            }
            AppError::Upstream { status, detail } => {
                tracing::error!("OpenAI error (status {:?}): {}", status, detail);
                let detalle = match status {
                    Some(code) => format!("OpenAI respondió {}: {}", code, detail),
                    None => detail,
                };
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "Error llamando a OpenAI",
                        "detalle": detalle,
                    }),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "Error interno del backend IA",
                        "detalle": msg,
                    }),
                )
            }
            AppError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source);
                return source.into_response();
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }
}

/// Truncates to at most `max` characters, appending an ellipsis when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
