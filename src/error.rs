//! Top-level error types for the deliberation core.

use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Persona(#[from] PersonaError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Deliberation(#[from] DeliberationError),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error(transparent)]
    Board(#[from] BoardError),

    #[error(transparent)]
    Secrets(#[from] SecretsError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: Arc<std::io::Error>,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Chat transport errors (platform API failures, websocket drops).
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("post failed: {0}")]
    PostFailed(String),

    #[error("transport unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider request failed: {0}")]
    ProviderRequest(String),

    #[error("completion timed out")]
    Timeout,

    #[error("empty response body")]
    EmptyResponse,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Persona store errors.
#[derive(Debug, thiserror::Error)]
pub enum PersonaError {
    #[error("persona not found: {id}")]
    NotFound { id: String },

    #[error("duplicate persona name: {name}")]
    DuplicateName { name: String },

    #[error("no active personas configured")]
    NoneConfigured,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Memory store errors.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("failed to read memory: {0}")]
    ReadFailed(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Deliberation engine errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliberationError {
    #[error("discussion {id} not found")]
    NotFound { id: uuid::Uuid },

    #[error("no channel resolved for project {project_path}")]
    NoChannel { project_path: String },

    #[error("no personas available for trigger type {trigger_type}")]
    NoParticipants { trigger_type: String },

    #[error("malformed trigger ref: {0}")]
    MalformedRef(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Job spawner errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("runtime binary could not be resolved")]
    BinaryUnresolved,

    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Board integration errors.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("board not configured")]
    NotConfigured,

    #[error("create issue failed: {0}")]
    CreateFailed(String),

    #[error("move issue failed: {0}")]
    MoveFailed(String),

    #[error("CLI fallback failed: {0}")]
    CliFallbackFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Secrets and credential errors.
#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
    #[error("failed to encrypt secret: {0}")]
    EncryptionFailed(String),

    #[error("failed to decrypt secret: {0}")]
    DecryptionFailed(String),

    #[error("invalid key format")]
    InvalidKey,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
