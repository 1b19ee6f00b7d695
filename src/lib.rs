//! Streaming ingestion and read-back core for a container log driver.
//!
//! The container runtime hands the driver one framed input stream per workload.
//! Each stream gets an ingest session that decodes length-delimited protobuf
//! records and persists them through a [`sink::LogSink`]. Stored records are
//! replayed on request as the same framed wire format.
//!
//! # Public API Overview
//! - [`LogDriver`] runs the `start_logging` / `stop_logging` / `read_logs` lifecycle.
//! - [`codec::FrameCodec`] and [`codec::FrameReader`] handle the wire format.
//! - [`sink::SinkFactory`] and [`stream::StreamOpener`] are the persistence and
//!   input seams; [`sink::MemoryStore`] and [`stream::MemoryStreams`] are in-process
//!   implementations of both.

use std::sync::{Mutex, MutexGuard};

pub mod codec;
pub mod config;
pub mod context;
pub mod driver;
pub mod entry;
pub mod error;
pub mod ingest;
pub mod readback;
pub mod record;
pub mod registry;
pub mod sink;
pub mod stream;

pub use crate::config::DriverConfig;
pub use crate::context::{ReadConfig, WorkloadLogContext, TAIL_ALL};
pub use crate::driver::{Capabilities, LogDriver};
pub use crate::error::{DriverError, FrameError, RegistryError, SinkError};
pub use crate::ingest::{IngestEnd, IngestReport};
pub use crate::readback::LogStream;
pub use crate::record::{LogRecord, PartialMetadata};

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
