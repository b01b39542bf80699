//! Custom error types for ragsync

use thiserror::Error;

/// Main error type for ragsync operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Qdrant error: {0}")]
    Qdrant(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Chatbot not found: {0}")]
    ChatbotNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Dialogue not found: {0}")]
    DialogueNotFound(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Not initialized: run 'ragsync init' first")]
    NotInitialized,

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether retrying the failed operation can ever succeed.
    ///
    /// The workflow engine consults this instead of catching individual
    /// error types ad hoc: transient external failures (network, rate
    /// limits, timeouts, store hiccups) are retried under the step's
    /// policy, while conditions no retry can fix — a deleted entity, an
    /// unknown embedding model, a document the parser rejects as
    /// malformed — fail the run immediately.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Config(_)
                | Error::ChatbotNotFound(_)
                | Error::DocumentNotFound(_)
                | Error::DialogueNotFound(_)
                | Error::UnsupportedContentType(_)
                | Error::MalformedDocument(_)
                | Error::TomlParse(_)
                | Error::TomlSerialize(_)
                | Error::NotInitialized
                | Error::AlreadyInitialized(_)
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

/// Result type alias for ragsync
pub type Result<T> = std::result::Result<T, Error>;

/// Convert qdrant errors
impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::Qdrant(err.to_string())
    }
}
