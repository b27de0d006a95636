use serde::Serialize;
use thiserror::Error;

/// Scan-level failures that reach the caller.
///
/// Probe transport errors and remediation-service errors never appear here:
/// the engine treats the former as "no match" and the remediation cache
/// answers the latter with fallback text.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Malformed target or no query parameters. Raised before any request.
    #[error("{0}")]
    Input(String),

    /// The findings table could not be written.
    #[error("failed to persist findings table: {0}")]
    SinkPersistence(#[from] csv::Error),

    /// Anything else that went wrong while orchestrating a scan.
    #[error("System Failure during scan: {0}")]
    Unhandled(String),
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::Input(_) => ErrorKind::InputError,
            ScanError::SinkPersistence(_) => ErrorKind::SinkPersistenceError,
            ScanError::Unhandled(_) => ErrorKind::UnhandledError,
        }
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::SinkPersistence(csv::Error::from(err))
    }
}

/// Serializable error classification carried in a failed scan summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InputError,
    SinkPersistenceError,
    UnhandledError,
}

impl ErrorKind {
    /// Status an HTTP-facing wrapper should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::InputError => 400,
            ErrorKind::SinkPersistenceError | ErrorKind::UnhandledError => 500,
        }
    }
}
