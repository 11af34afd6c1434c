//! Error types for parallax-vision.

use crate::backend::BackendStatus;
use thiserror::Error;

/// Result type alias using parallax-vision's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the vision transform element.
#[derive(Error, Debug)]
pub enum Error {
    /// The target GPU could not be selected for the calling thread.
    #[error("failed to select GPU {gpu_id}: {reason}")]
    Device {
        /// Requested device index.
        gpu_id: u32,
        /// Driver-provided reason.
        reason: String,
    },

    /// A pipeline buffer could not be mapped.
    #[error("buffer mapping failed: {0}")]
    Mapping(String),

    /// The vision backend refused to wrap a device buffer.
    #[error("backend could not wrap image: {name} ({status:?}): {message}")]
    Wrap {
        /// Backend status code.
        status: BackendStatus,
        /// Backend name of the status code.
        name: &'static str,
        /// Last status message reported by the backend.
        message: String,
    },

    /// Caps could not be parsed or the output pool could not be set up.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// No buffer is available from the output pool.
    #[error("buffer pool exhausted: no buffers available")]
    PoolExhausted,

    /// The output pool is inactive.
    #[error("buffer pool is flushing")]
    Flushing,

    /// A frame arrived before caps were negotiated.
    #[error("element is not negotiated")]
    NotNegotiated,

    /// A lifecycle call was made in the wrong state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Configuration rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A subclass hook reported failure.
    #[error("transform hook failed: {0}")]
    Hook(String),
}

impl Error {
    /// Build a wrap error from a backend status and its last message.
    pub fn wrap(status: BackendStatus, message: impl Into<String>) -> Self {
        Self::Wrap {
            status,
            name: status.name(),
            message: message.into(),
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Device { .. } => "device",
            Self::Mapping(_) => "mapping",
            Self::Wrap { .. } => "wrap",
            Self::Negotiation(_) => "negotiation",
            Self::PoolExhausted => "pool_exhausted",
            Self::Flushing => "flushing",
            Self::NotNegotiated => "not_negotiated",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Hook(_) => "hook",
        }
    }
}
