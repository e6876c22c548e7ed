use thiserror::Error;

/// Unified error type for the engine.
///
/// The retry policy only ever looks at `is_retryable()`; everything else
/// (events, metrics, logs) goes through `category()`.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rejected before any work ran: malformed submission or progress update.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Transient failure (network, contention); eligible for retry.
    #[error("Transient failure: {message}")]
    Transient {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Logic error in the action; retrying will not help.
    #[error("Permanent failure: {message}")]
    Permanent {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An attempt exceeded its bound, including the cancellation grace period.
    #[error("Task {task_id} timed out after {timeout_ms}ms")]
    Timeout { task_id: String, timeout_ms: u64 },

    /// Terminal cancellation; recorded as Cancelled, never as Failed.
    #[error("Task {task_id} was cancelled")]
    Cancelled {
        task_id: String,
        reason: Option<String>,
    },

    /// Checkpoint store or serialization failure.
    #[error("Storage operation failed: {operation}")]
    Storage {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Event bus or internal channel failure.
    #[error("Channel error: {message}")]
    Channel { message: String },
}

impl EngineError {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self::Transient {
            message: message.into(),
            source: None,
        }
    }

    pub fn permanent<S: Into<String>>(message: S) -> Self {
        Self::Permanent {
            message: message.into(),
            source: None,
        }
    }

    pub fn timeout<S: Into<String>>(task_id: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            task_id: task_id.into(),
            timeout_ms,
        }
    }

    pub fn cancelled<S: Into<String>>(task_id: S) -> Self {
        Self::Cancelled {
            task_id: task_id.into(),
            reason: None,
        }
    }

    pub fn cancelled_because<S: Into<String>, R: Into<String>>(task_id: S, reason: R) -> Self {
        Self::Cancelled {
            task_id: task_id.into(),
            reason: Some(reason.into()),
        }
    }

    pub fn storage<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        operation: S,
        source: E,
    ) -> Self {
        Self::Storage {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    pub fn channel<S: Into<String>>(message: S) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    /// Whether the retry policy may re-attempt after this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transient { .. } | Self::Storage { .. } => true,
            Self::Validation { .. }
            | Self::Permanent { .. }
            | Self::Timeout { .. }
            | Self::Cancelled { .. }
            | Self::Channel { .. } => false,
        }
    }

    /// Error category for metrics and logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Transient { .. } => "transient",
            Self::Permanent { .. } => "permanent",
            Self::Timeout { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::Storage { .. } => "storage",
            Self::Channel { .. } => "channel",
        }
    }
}

impl From<sled::Error> for EngineError {
    fn from(err: sled::Error) -> Self {
        Self::storage("sled_operation", err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::storage("json_serialization", err)
    }
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error returned by plugin-supplied actions.
///
/// Actions classify their own failures; the executor maps this onto
/// [`EngineError`] and decides retryability from it.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Transient action failure: {0}")]
    Transient(String),
    #[error("Permanent action failure: {0}")]
    Permanent(String),
    /// The action observed its cancellation token and stopped.
    #[error("Action observed cancellation")]
    Cancelled,
}

impl ActionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionError::Transient(_))
    }

    pub(crate) fn into_engine_error(self, task_id: &str) -> EngineError {
        match self {
            ActionError::Transient(message) => EngineError::Transient {
                message,
                source: None,
            },
            ActionError::Permanent(message) => EngineError::Permanent {
                message,
                source: None,
            },
            ActionError::Cancelled => EngineError::cancelled(task_id),
        }
    }
}

/// Unclassified errors from action internals default to permanent: retrying
/// a logic error burns attempts without changing the outcome.
impl From<anyhow::Error> for ActionError {
    fn from(err: anyhow::Error) -> Self {
        ActionError::Permanent(err.to_string())
    }
}
