use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("could not resolve place from link: {0}")]
    Resolution(String),
    #[error("{0}")]
    Validation(String),
    #[error("missing or invalid shared secret")]
    Unauthorized,
    #[error("database write rejected ({status}): {detail}")]
    Sync { status: u16, detail: String },
    #[error("place not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl AppError {
    pub fn is_resolution(&self) -> bool {
        matches!(self, AppError::Resolution(_) | AppError::Url(_))
    }
}
