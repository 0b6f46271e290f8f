use rule_trace_engine::EngineError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for tracing operations
pub type Result<T> = std::result::Result<T, TraceError>;

/// Errors that end a traced parse run.
///
/// Every variant is fatal: a trace is only useful when complete, so nothing
/// is retried and no partial archive is ever published.
#[derive(Error, Debug)]
pub enum TraceError {
    /// The classifier has no entry for a rule class or any of its supertypes
    #[error("cannot determine matcher category for {class}; register this class with the classifier")]
    UnresolvedCategory { class: String },

    /// A parse listener hook failed
    #[error("parse listener error: {0:#}")]
    Listener(#[source] anyhow::Error),

    /// Staging, draining or archive writing failed
    #[error(transparent)]
    ArchiveIo(#[from] ArchiveFailure),

    /// The archive path is taken; archives are never overwritten
    #[error("archive path already exists: {}", .0.display())]
    ArchiveExists(PathBuf),

    /// The engine reported an exit with no open invocation at that level
    #[error("exit at level {level} has no matching enter")]
    UnbalancedExit { level: usize },

    /// The engine entered a level while `open` levels were active
    #[error("enter at level {level} with {open} open level(s)")]
    UnbalancedEnter { level: usize, open: usize },

    /// Matcher ids are `u32`; a run saw more distinct rules than that
    #[error("too many distinct matchers: {count}")]
    TooManyMatchers { count: usize },

    /// The background writer is gone; its own failure explains why
    #[error("trace writer stopped accepting events")]
    WriterClosed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tracing needs a tokio runtime for its background tasks
    #[error("tokio runtime unavailable: {0}")]
    Runtime(String),

    /// The parse itself failed for reasons other than a listener
    #[error("Engine error: {0}")]
    Engine(#[source] EngineError),

    /// An archive entry could not be decoded
    #[error("malformed archive entry {entry}: {reason}")]
    MalformedArchive { entry: String, reason: String },
}

impl TraceError {
    pub fn unresolved(class: impl Into<String>) -> Self {
        Self::UnresolvedCategory {
            class: class.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn malformed(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedArchive {
            entry: entry.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an I/O error with what was being attempted
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::ArchiveIo(ArchiveFailure::new(context, source))
    }

    /// Whether this error is a listener failure (ours or a caller's)
    #[must_use]
    pub fn is_listener_failure(&self) -> bool {
        matches!(self, Self::Listener(_))
    }
}

impl From<EngineError> for TraceError {
    fn from(err: EngineError) -> Self {
        match err {
            // Our own capture hooks fail with a TraceError; surface it as is
            EngineError::Listener(cause) => match cause.downcast::<TraceError>() {
                Ok(own) => own,
                Err(cause) => Self::Listener(cause),
            },
            other => Self::Engine(other),
        }
    }
}

/// An I/O failure during staging or archive writing, plus any failures of
/// the cleanup that followed it.
#[derive(Debug)]
pub struct ArchiveFailure {
    context: String,
    source: io::Error,
    suppressed: Vec<io::Error>,
}

impl ArchiveFailure {
    pub fn new(context: impl Into<String>, source: io::Error) -> Self {
        Self {
            context: context.into(),
            source,
            suppressed: Vec::new(),
        }
    }

    /// Record a cleanup failure without replacing the original cause
    pub fn suppress(&mut self, err: io::Error) {
        self.suppressed.push(err);
    }

    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    #[must_use]
    pub fn cause(&self) -> &io::Error {
        &self.source
    }

    #[must_use]
    pub fn suppressed(&self) -> &[io::Error] {
        &self.suppressed
    }
}

impl fmt::Display for ArchiveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to {}: {}", self.context, self.source)?;
        if !self.suppressed.is_empty() {
            write!(f, " ({} cleanup error(s) suppressed)", self.suppressed.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for ArchiveFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
