use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to decode or encode one frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame length {length} exceeds maximum {max}")]
    TooLarge { length: usize, max: usize },

    #[error("stream ended inside a frame with {pending} bytes pending")]
    Truncated { pending: usize },

    #[error("malformed log entry payload: {0}")]
    Payload(#[from] prost::DecodeError),

    #[error("failed to encode log entry: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("I/O error on log stream: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// True for failures confined to a single frame; the stream itself is still usable.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// Failure reported by a persistence sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("log sink is closed")]
    Closed,

    #[error("log sink backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("{0}")]
    Other(String),
}

impl SinkError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("logger for {stream_id:?} already exists")]
    AlreadyExists { stream_id: String },

    #[error("no logger registered for {stream_id:?}")]
    NotFound { stream_id: String },
}

/// Errors surfaced synchronously by the driver's administrative operations.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("logger for {stream_id:?} already exists")]
    AlreadyExists { stream_id: String },

    #[error("image name not provided in logging info")]
    MissingImageName,

    #[error("error creating log sink: {0}")]
    SinkInit(#[source] SinkError),

    #[error("error opening logger file {stream_id:?}: {source}")]
    OpenStream {
        stream_id: String,
        #[source]
        source: io::Error,
    },
}
