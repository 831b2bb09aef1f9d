// Error type shared by the library modules. `main` wraps these in
// `anyhow` for context; everything below returns `Result<T>`.

use thiserror::Error;

/// Everything that can go wrong while enrolling a host.
#[derive(Error, Debug)]
pub enum EnrollError {
    /// Transport level failure (DNS, TLS, connection reset, ...).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response whose body was not a Delphix error object.
    #[error("engine returned {status}: {body}")]
    Status { status: u16, body: String },

    /// `ErrorResult` returned by the engine.
    #[error("engine error {id}: {details}")]
    Api {
        id: String,
        details: String,
        action: Option<String>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("did not find the sshPublicKey in the system object")]
    MissingPublicKey,

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("job {job} finished in state {state}")]
    JobFailed { job: String, state: String },

    #[error("job {job} did not finish within {secs} seconds")]
    JobTimeout { job: String, secs: u64 },
}

pub type Result<T> = std::result::Result<T, EnrollError>;

impl EnrollError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::UnexpectedResponse(msg.into())
    }

    /// The engine's error id (e.g. `exception.executor.object.exists`),
    /// if this is an API error.
    pub fn api_id(&self) -> Option<&str> {
        match self {
            Self::Api { id, .. } => Some(id),
            _ => None,
        }
    }
}
