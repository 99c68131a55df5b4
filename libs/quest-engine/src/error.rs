use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Faults of the engine itself, as opposed to faults of the submitted code
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid forbidden pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("grading registry: {0}")]
    Registry(String),

    #[error("source code exceeds maximum size of {limit} bytes ({actual} bytes)")]
    SourceTooLarge { limit: usize, actual: usize },

    #[error("failed to start sandbox worker `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sandbox I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("docker: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("sandbox protocol: {0}")]
    Protocol(String),
}
