//! File-backed log sink.
//!
//! One append-only file per image name, holding the same length-delimited
//! frames the driver ingests.

mod error;
mod paths;
mod reader;
mod store;

pub use error::StoreError;
pub use paths::{log_file_path, sanitize_segment, DEFAULT_LOG_ROOT};
pub use store::{LocalLogFile, LocalStore, DEFAULT_FOLLOW_POLL_INTERVAL};
