use std::error::Error;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum InterceptorError {
    ConfigInvalid(String),
    JournalFailed(String),
    StoragePersistFailed(String),
    RecordNotFound(String),
    UpstreamUnreachable(String),
    UpstreamTimeout(String),
    UpstreamHTTPError(String),
    MetadataPersistFailed(String),
    CheckpointBackendFailed(String),
    Cancelled,
}

impl fmt::Display for InterceptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptorError::ConfigInvalid(msg) => write!(f, "invalid configuration: {msg}"),
            InterceptorError::JournalFailed(msg) => write!(f, "journal write failed: {msg}"),
            InterceptorError::StoragePersistFailed(msg) => {
                write!(f, "storage persist failed: {msg}")
            }
            InterceptorError::RecordNotFound(id) => write!(f, "no record found with id: {id}"),
            InterceptorError::UpstreamUnreachable(msg) => {
                write!(f, "upstream unreachable: {msg}")
            }
            InterceptorError::UpstreamTimeout(msg) => write!(f, "upstream timeout: {msg}"),
            InterceptorError::UpstreamHTTPError(msg) => write!(f, "upstream http error: {msg}"),
            InterceptorError::MetadataPersistFailed(msg) => {
                write!(f, "metadata persist failed: {msg}")
            }
            InterceptorError::CheckpointBackendFailed(msg) => {
                write!(f, "checkpoint backend failed: {msg}")
            }
            InterceptorError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl Error for InterceptorError {}

impl From<io::Error> for InterceptorError {
    fn from(err: io::Error) -> Self {
        InterceptorError::StoragePersistFailed(err.to_string())
    }
}

impl From<sqlx::Error> for InterceptorError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => InterceptorError::RecordNotFound("unknown".to_string()),
            other => InterceptorError::StoragePersistFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for InterceptorError {
    fn from(err: serde_json::Error) -> Self {
        InterceptorError::StoragePersistFailed(err.to_string())
    }
}

impl From<reqwest::Error> for InterceptorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            InterceptorError::UpstreamTimeout(err.to_string())
        } else if err.is_connect() {
            InterceptorError::UpstreamUnreachable(err.to_string())
        } else {
            InterceptorError::UpstreamUnreachable(err.to_string())
        }
    }
}

impl From<String> for InterceptorError {
    fn from(err: String) -> Self {
        InterceptorError::ConfigInvalid(err)
    }
}
