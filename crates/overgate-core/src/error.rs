use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Rate limit exceeded, request denied")]
    RateLimited,

    #[error("Method name missing from call metadata")]
    MissingMethod,

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("No handler registered for method: {0}")]
    HandlerNotFound(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error was caused by the caller's request rather than the
    /// server. Caller faults are safe to report verbatim on the wire.
    pub fn is_caller_fault(&self) -> bool {
        matches!(
            self,
            Error::RateLimited
                | Error::MissingMethod
                | Error::UnknownMethod(_)
                | Error::HandlerNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
