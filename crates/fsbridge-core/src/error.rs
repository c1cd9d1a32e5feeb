//! Error types for fsbridge core

use fsbridge_types::{FailureKind, JobId};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in fsbridge core
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Destination {} is not writable: {reason}", path.display())]
    DestinationNotWritable { path: PathBuf, reason: String },

    #[error("Invalid request header: {0}")]
    InvalidHeader(String),

    #[error("Download job {0} is already active")]
    JobAlreadyActive(JobId),

    #[error("Invalid asset path: {0}")]
    InvalidAssetPath(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server error: {status}")]
    Http { status: u16 },

    #[error("No data received for {0} seconds")]
    ReadTimeout(u64),

    #[error("File does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Asset '{0}' could not be opened")]
    AssetNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BridgeError {
    /// Errors raised by `submit` before any job exists
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidUrl(_)
                | BridgeError::UnsupportedScheme(_)
                | BridgeError::DestinationNotWritable { .. }
                | BridgeError::InvalidHeader(_)
                | BridgeError::JobAlreadyActive(_)
                | BridgeError::InvalidAssetPath(_)
        )
    }

    /// How a background failure is reported in a `DownloadResult`
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            BridgeError::Network(e) if e.is_connect() || e.is_builder() || e.is_redirect() => {
                FailureKind::Connection
            }
            BridgeError::Http { .. } => FailureKind::Http,
            _ => FailureKind::Transfer,
        }
    }
}

// Allow converting to String for host bindings
impl From<BridgeError> for String {
    fn from(error: BridgeError) -> Self {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(BridgeError::InvalidUrl("nope".into()).is_validation());
        assert!(BridgeError::JobAlreadyActive(4).is_validation());
        assert!(BridgeError::InvalidHeader("bad name".into()).is_validation());
        assert!(!BridgeError::ReadTimeout(5).is_validation());
        assert!(!BridgeError::NotFound(PathBuf::from("/x")).is_validation());
    }

    #[test]
    fn test_failure_kinds() {
        assert_eq!(BridgeError::Http { status: 404 }.failure_kind(), FailureKind::Http);
        assert_eq!(BridgeError::ReadTimeout(5).failure_kind(), FailureKind::Transfer);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert_eq!(BridgeError::Io(io).failure_kind(), FailureKind::Transfer);
    }

    #[test]
    fn test_messages_are_human_readable() {
        let err = BridgeError::AssetNotFound("fonts/a.ttf".into());
        assert_eq!(err.to_string(), "Asset 'fonts/a.ttf' could not be opened");
        let message: String = BridgeError::Http { status: 503 }.into();
        assert_eq!(message, "Server error: 503");
    }
}
