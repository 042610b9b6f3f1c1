//! Error taxonomy shared by the ingestion and retrieval crates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Rate limit, timeout or 5xx from a remote provider. Retried locally.
    #[error("transient provider error: {0}")]
    TransientProvider(String),

    /// Provider failure that retrying will not fix (bad request, auth, ...).
    #[error("provider error: {0}")]
    Provider(String),

    /// The LLM answered but the payload could not be parsed.
    #[error("malformed extraction: {0}")]
    MalformedExtraction(String),

    /// A single record failed validation and was dropped.
    #[error("validation error: {0}")]
    Validation(String),

    /// A store could not be written; the current ingestion fails.
    #[error("write unavailable: {0}")]
    WriteUnavailable(String),

    /// One retrieval path failed; the other may still answer.
    #[error("{path} retrieval failed: {message}")]
    RetrievalPath { path: RetrievalPath, message: String },

    /// Every enabled retrieval path failed.
    #[error("retrieval failed: {}", .0.join("; "))]
    RetrievalFailed(Vec<String>),

    #[error("usage error: {0}")]
    UsagePrecondition(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientProvider(_))
    }

    pub fn retrieval(path: RetrievalPath, message: impl Into<String>) -> Self {
        Error::RetrievalPath {
            path,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalPath {
    Vector,
    Graph,
}

impl std::fmt::Display for RetrievalPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrievalPath::Vector => write!(f, "vector"),
            RetrievalPath::Graph => write!(f, "graph"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
