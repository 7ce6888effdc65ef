use std::io;

#[derive(thiserror::Error, Debug)]
pub enum TriageError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("db error: {0}")]
    Db(String),
    #[error("incident id collision: {0}")]
    IdCollision(String),
    #[error("invalid status transition: {0}")]
    InvalidTransition(String),
    #[error("notification error: {0}")]
    Notify(String),
    #[error("notification timeout")]
    NotifyTimeout,
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Caller-correctable rejection reasons; the submission is never persisted.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no evidence provided")]
    MissingEvidence,
    #[error("file exceeds {limit} bytes: {size}")]
    OversizedFile { size: u64, limit: u64 },
    #[error("malformed url: {reason}")]
    MalformedUrl { reason: String },
    #[error("reporter must be verified to submit")]
    UnverifiedReporter,
}

impl From<rusqlite::Error> for TriageError {
    fn from(err: rusqlite::Error) -> Self {
        TriageError::Db(err.to_string())
    }
}

impl From<serde_json::Error> for TriageError {
    fn from(err: serde_json::Error) -> Self {
        TriageError::Db(format!("record encoding: {}", err))
    }
}

impl From<reqwest::Error> for TriageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TriageError::NotifyTimeout
        } else {
            TriageError::Notify(err.to_string())
        }
    }
}
