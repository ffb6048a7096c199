/// Shared error type used across all operative-engine crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("container runtime: {0}")]
    Container(#[from] bollard::errors::Error),

    /// Entity lookup misses (operative, note, stream entry).
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed tool input, unknown role, bad compaction cut point.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A compaction cut point would split a tool_call/tool_result pair, or
    /// another write would violate an append-only invariant.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Sandbox not running, model transport failure — retryable.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A programming invariant was violated; fatal for the current step.
    #[error("internal: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
