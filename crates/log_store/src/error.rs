use std::path::PathBuf;

use logdriver::{FrameError, SinkError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt log data at byte {offset} in {path}: {source}")]
    Corrupt {
        path: PathBuf,
        offset: u64,
        #[source]
        source: FrameError,
    },

    #[error("failed to encode log record for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: FrameError,
    },

    #[error("image name {image:?} does not map to a log file path")]
    InvalidImageName { image: String },
}

impl StoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn corrupt(path: impl Into<PathBuf>, offset: u64, source: FrameError) -> Self {
        Self::Corrupt {
            path: path.into(),
            offset,
            source,
        }
    }
}

impl From<StoreError> for SinkError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Io {
                operation,
                path,
                source,
            } => SinkError::io(operation, path, source),
            other => SinkError::Backend(Box::new(other)),
        }
    }
}
