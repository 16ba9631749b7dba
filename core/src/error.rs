use thiserror::Error;

/// Failures that cross the session boundary.
///
/// Everything else (probe failures, refresh failures) is absorbed into logs or
/// a user notification and never surfaces here.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{accessor} must be used within a SessionProvider")]
    OutsideProvider { accessor: &'static str },
}

#[derive(Debug, Error)]
pub enum ApiKeyStoreError {
    #[error("failed to access api key store at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("api key store at {path} is corrupt: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
