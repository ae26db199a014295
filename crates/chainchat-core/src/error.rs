use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainChatError {
    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Validation(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChainChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        ChainChatError::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ChainChatError>;
