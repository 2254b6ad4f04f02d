//! Core error types for QUARRY.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Invalid encoding
    InvalidEncoding,

    /// Membership could not be established
    Setup {
        /// Why setup failed
        reason: String,
    },

    /// A collective operation could not complete
    Transport {
        /// Why the transport failed
        reason: String,
    },

    /// A component was driven out of its required order
    Protocol {
        /// What was misused
        reason: String,
    },

    /// Validation error
    Validation {
        /// Field that failed validation
        field: String,
        /// Why validation failed
        reason: String,
    },

    /// Cancelled
    Cancelled,

    /// Internal error (for unexpected errors)
    Internal {
        /// Error message
        message: String,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEncoding => write!(f, "Invalid encoding"),
            Self::Setup { reason } => write!(f, "Cluster setup failed: {}", reason),
            Self::Transport { reason } => write!(f, "Transport error: {}", reason),
            Self::Protocol { reason } => write!(f, "Protocol misuse: {}", reason),
            Self::Validation { field, reason } => {
                write!(f, "Validation failed for {}: {}", field, reason)
            }
            Self::Cancelled => write!(f, "Operation cancelled"),
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<postcard::Error> for CoreError {
    fn from(_: postcard::Error) -> Self {
        Self::InvalidEncoding
    }
}
