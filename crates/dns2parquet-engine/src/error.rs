use thiserror::Error;

/// Errors raised while talking to the query engine.
///
/// A statement the engine accepted but failed to run is not an error: it is
/// reported as `Ok(false)` by [`crate::QueryEngine::execute`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("partition '{0}' is missing a value")]
    MissingPartitionValue(String),

    #[error("query engine request failed: {0:#}")]
    Transport(anyhow::Error),

    #[error("query engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected query engine response: {0}")]
    Protocol(String),

    #[error("statement still running after {polls} polls")]
    Timeout { polls: usize },
}

pub type Result<T> = std::result::Result<T, EngineError>;
