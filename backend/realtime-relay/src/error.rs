use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

/// Wire text for every authorization failure, including unknown conversations.
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";
pub const SELF_CONVERSATION_MESSAGE: &str = "You cannot chat with yourself.";
pub const INVALID_PAYLOAD_MESSAGE: &str = "Invalid payload";
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("cannot start a conversation with yourself")]
    SelfConversation,

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(String),
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        AppError::Database(e.to_string())
    }
}

impl AppError {
    /// Message safe to put on the wire. Never carries internal detail, and
    /// `NotFound` is indistinguishable from `Unauthorized`.
    pub fn client_message(&self) -> &'static str {
        match self {
            AppError::Unauthorized | AppError::NotFound => UNAUTHORIZED_MESSAGE,
            AppError::SelfConversation => SELF_CONVERSATION_MESSAGE,
            AppError::InvalidPayload(_) => INVALID_PAYLOAD_MESSAGE,
            AppError::Config(_) | AppError::StartServer(_) | AppError::Database(_) => {
                INTERNAL_ERROR_MESSAGE
            }
        }
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::StartServer(_) => "start_server",
            AppError::Unauthorized => "unauthorized",
            AppError::SelfConversation => "self_conversation",
            AppError::InvalidPayload(_) => "invalid_payload",
            AppError::NotFound => "not_found",
            AppError::Database(_) => "database",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::UNAUTHORIZED,
            AppError::SelfConversation | AppError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "message": self.client_message() }))
    }
}
