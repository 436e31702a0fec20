use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("Telegram API error: {0}")]
    Telegram(String),
    #[error("Generation error: {0}")]
    Generate(String),
    #[error("Mail error: {0}")]
    Mail(String),
    #[error("Invalid time format: {0}")]
    InvalidTime(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Other(s)
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::Other(s.to_string())
    }
}
