use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while running rules over an input buffer
#[derive(Error, Debug)]
pub enum EngineError {
    /// A parse listener hook failed; the run was aborted at the next dispatch boundary
    #[error("parse listener error: {0}")]
    Listener(#[source] anyhow::Error),

    /// Line numbers are 1-based
    #[error("invalid line number: {0}")]
    InvalidLine(usize),

    /// A proxy rule was matched before being bound, or its target was dropped
    #[error("unbound proxy rule: {0}")]
    UnboundProxy(String),

    /// A rule action failed
    #[error("action '{label}' failed: {source}")]
    Action {
        label: String,
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    /// Wrap a hook failure
    pub fn listener(err: impl Into<anyhow::Error>) -> Self {
        Self::Listener(err.into())
    }

    /// The hook failure that aborted the run, if any
    #[must_use]
    pub fn listener_cause(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Listener(err) => Some(err),
            _ => None,
        }
    }
}
