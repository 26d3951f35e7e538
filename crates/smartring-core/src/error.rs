//! Error types for smartring-core.
//!
//! Every failure that reaches a caller of the command queue is one of four
//! kinds, exposed through [`Error::kind`]:
//!
//! | Kind | Meaning | Queue behaviour |
//! |------|---------|-----------------|
//! | [`ErrorKind::Busy`] | Link occupied by an unresolved exchange | Retried once for busy-retryable reads; cancel-and-settle for pending-resolver operations |
//! | [`ErrorKind::NotConnected`] | No active link | Surfaced immediately |
//! | [`ErrorKind::Timeout`] | Deadline elapsed before the bridge answered | Cancel-and-settle for pending-resolver operations, then surfaced |
//! | [`ErrorKind::Unknown`] | Any other bridge failure, message preserved | Surfaced immediately |
//!
//! Reconstruction code never returns these errors: malformed device data
//! degrades to "no value" instead.
//!
//! ## Mapping to UI affordances
//!
//! ```ignore
//! use smartring_core::{ErrorKind, RingClient};
//!
//! match client.battery().await {
//!     Ok(battery) => println!("{}%", battery.level),
//!     Err(e) if e.kind() == ErrorKind::NotConnected => show_disconnected(),
//!     Err(e) if e.is_transient() => offer_retry(),
//!     Err(e) => eprintln!("battery failed: {}", e),
//! }
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed failure taxonomy of the command queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The link is occupied by a prior unresolved exchange.
    Busy,
    /// There is no active link.
    NotConnected,
    /// The deadline elapsed without a native resolution.
    Timeout,
    /// Any other native failure.
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Busy => write!(f, "BUSY"),
            ErrorKind::NotConnected => write!(f, "NOT_CONNECTED"),
            ErrorKind::Timeout => write!(f, "TIMEOUT"),
            ErrorKind::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Errors returned by smartring-core.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The ring reported that it is busy with another request.
    #[error("BUSY: {operation}: {message}")]
    Busy {
        /// The operation that failed.
        operation: String,
        /// The bridge's original message.
        message: String,
    },

    /// No ring is connected.
    #[error("NOT_CONNECTED: {operation}: {message}")]
    NotConnected {
        /// The operation that failed.
        operation: String,
        /// The bridge's original message.
        message: String,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout budget that elapsed.
        duration: Duration,
    },

    /// Any other bridge failure.
    #[error("{operation} failed: {message}")]
    Unknown {
        /// The operation that failed.
        operation: String,
        /// The bridge's original message.
        message: String,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error while loading configuration.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a busy error.
    pub fn busy(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Busy {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a not-connected error.
    pub fn not_connected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotConnected {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create an unknown error that preserves the bridge message.
    pub fn unknown(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unknown {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Project this error onto the four-kind taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Busy { .. } => ErrorKind::Busy,
            Error::NotConnected { .. } => ErrorKind::NotConnected,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Unknown { .. } | Error::InvalidConfig(_) | Error::Io(_) | Error::Json(_) => {
                ErrorKind::Unknown
            }
        }
    }

    /// The operation name, when the error came from the queue.
    pub fn operation(&self) -> Option<&str> {
        match self {
            Error::Busy { operation, .. }
            | Error::NotConnected { operation, .. }
            | Error::Timeout { operation, .. }
            | Error::Unknown { operation, .. } => Some(operation),
            _ => None,
        }
    }

    /// Whether a caller-level retry affordance makes sense.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::Busy | ErrorKind::Timeout)
    }
}

/// Result type alias using smartring-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
