/// Core error type for the checker.
///
/// Adapter crates should map their specific errors into this type so the run
/// loop can tell retryable failures (network, malformed response) apart from
/// setup problems.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),

    #[error("invalid relay: {0}")]
    InvalidRelay(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Whether a verification attempt that failed with this error may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::MalformedResponse(_) | Error::Json(_) | Error::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
