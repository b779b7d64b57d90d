use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Severity of a progress message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Error,
}

/// A single human-readable status update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub severity: MessageSeverity,
    pub text: String,
}

impl Message {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            severity: MessageSeverity::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            severity: MessageSeverity::Error,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == MessageSeverity::Error
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.severity {
            MessageSeverity::Info => write!(f, "{}", self.text),
            MessageSeverity::Error => write!(f, "ERROR: {}", self.text),
        }
    }
}

/// Sink for user-facing progress messages.
///
/// Every component receives one at construction; nothing falls back to a
/// global instance.
pub trait Progress: Send + Sync {
    fn set_status(&self, message: Message);
}

/// Shared handle to a progress sink
pub type SharedProgress = Arc<dyn Progress>;

/// Discards every message
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl NoopProgress {
    pub fn shared() -> SharedProgress {
        Arc::new(NoopProgress)
    }
}

impl Progress for NoopProgress {
    fn set_status(&self, _message: Message) {}
}

/// Forwards messages to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl TracingProgress {
    pub fn shared() -> SharedProgress {
        Arc::new(TracingProgress)
    }
}

impl Progress for TracingProgress {
    fn set_status(&self, message: Message) {
        match message.severity {
            MessageSeverity::Info => info!("{}", message.text),
            MessageSeverity::Error => error!("{}", message.text),
        }
    }
}
