//! Persistence seam for decoded records.
//!
//! A sink is opened per workload (for ingestion) or per read request. Read-back
//! goes through [`LogSink::subscribe`], which hands out a [`Subscription`] whose
//! drop is the sink's consumer-gone signal.

mod memory;
mod subscription;

use async_trait::async_trait;

use crate::context::{ReadConfig, WorkloadLogContext};
use crate::error::SinkError;
use crate::record::LogRecord;

pub use memory::{MemorySink, MemorySinkFactory, MemoryStore};
pub use subscription::{
    Subscription, SubscriptionEvent, SubscriptionProducer, DEFAULT_SUBSCRIPTION_CAPACITY,
};

#[async_trait]
pub trait LogSink: Send {
    /// Persists one record. Records must be stored in call order.
    async fn write(&mut self, record: LogRecord) -> Result<(), SinkError>;

    /// Starts delivering stored (and, when following, future) records.
    ///
    /// Must be called from within a tokio runtime.
    fn subscribe(&self, config: ReadConfig) -> Subscription;

    /// Flushes and releases resources. Later writes fail with [`SinkError::Closed`].
    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[async_trait]
pub trait SinkFactory: Send + Sync + 'static {
    async fn open(&self, context: &WorkloadLogContext) -> Result<Box<dyn LogSink>, SinkError>;
}
