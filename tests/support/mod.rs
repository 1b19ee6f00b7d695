#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::StreamExt;
use logdriver::codec::FrameCodec;
use logdriver::entry::{LogEntry, PartialLogEntryMetadata};
use logdriver::sink::{
    LogSink, MemoryStore, SinkFactory, Subscription, SubscriptionProducer,
};
use logdriver::stream::MemoryStreams;
use logdriver::{
    DriverConfig, LogDriver, LogRecord, LogStream, ReadConfig, SinkError, WorkloadLogContext,
};
use tokio_util::codec::{Decoder, Encoder};

pub const IMAGE: &str = "registry.local/web:1.2";

pub fn context() -> WorkloadLogContext {
    WorkloadLogContext::for_image(IMAGE).with_container_id("c0ffee")
}

pub fn entry(line: &str, time_nano: i64) -> LogEntry {
    LogEntry {
        source: b"stdout".to_vec(),
        time_nano,
        line: line.as_bytes().to_vec(),
        partial: false,
        partial_log_metadata: None,
    }
}

pub fn partial_entry(line: &str, time_nano: i64, id: &str, ordinal: i32, last: bool) -> LogEntry {
    LogEntry {
        partial: true,
        partial_log_metadata: Some(PartialLogEntryMetadata {
            last,
            id: id.to_owned(),
            ordinal,
        }),
        ..entry(line, time_nano)
    }
}

pub fn frame(entry: LogEntry) -> Vec<u8> {
    let mut buf = BytesMut::new();
    FrameCodec::new()
        .encode(entry, &mut buf)
        .expect("entry should encode");
    buf.to_vec()
}

/// A length-prefixed frame whose payload is not valid protobuf.
pub fn malformed_frame() -> Vec<u8> {
    vec![0x00, 0x00, 0x00, 0x03, 0x0a, 0x05, b'a']
}

pub fn decode_frames(bytes: &[u8]) -> Vec<LogEntry> {
    let mut buf = BytesMut::from(bytes);
    let mut codec = FrameCodec::new();
    let mut entries = Vec::new();
    while let Some(entry) = codec
        .decode_eof(&mut buf)
        .expect("read-back output should be well framed")
    {
        entries.push(entry);
    }
    entries
}

pub fn lines(records: &[LogRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| String::from_utf8_lossy(&record.line).into_owned())
        .collect()
}

pub fn entry_lines(entries: &[LogEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| String::from_utf8_lossy(&entry.line).into_owned())
        .collect()
}

/// Drains a finite read-back stream, returning its bytes and the error that ended it, if any.
pub async fn collect(mut stream: LogStream) -> (Vec<u8>, Option<io::Error>) {
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(error) => return (bytes, Some(error)),
        }
    }
    (bytes, None)
}

pub async fn next_entry(stream: &mut LogStream) -> LogEntry {
    let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("frame should arrive in time")
        .expect("stream should still be open")
        .expect("frame should not be an error");
    let mut entries = decode_frames(&chunk);
    assert_eq!(entries.len(), 1, "each chunk carries one frame");
    entries.remove(0)
}

pub async fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    predicate()
}

pub struct Harness {
    pub driver: LogDriver,
    pub store: MemoryStore,
    pub streams: MemoryStreams,
}

pub fn memory_harness() -> Harness {
    let store = MemoryStore::new();
    let streams = MemoryStreams::new();
    let driver = LogDriver::new(
        Arc::new(store.factory()),
        Arc::new(streams.clone()),
        DriverConfig::default(),
    );
    Harness {
        driver,
        store,
        streams,
    }
}

/// Sinks whose subscriptions are fed by the test through the captured producers.
#[derive(Clone, Default)]
pub struct ScriptedSinks {
    producers: Arc<Mutex<Vec<SubscriptionProducer>>>,
    configs: Arc<Mutex<Vec<ReadConfig>>>,
}

impl ScriptedSinks {
    pub fn take_producer(&self) -> Option<SubscriptionProducer> {
        let mut producers = lock_unpoisoned(&self.producers);
        if producers.is_empty() {
            None
        } else {
            Some(producers.remove(0))
        }
    }

    pub fn configs(&self) -> Vec<ReadConfig> {
        lock_unpoisoned(&self.configs).clone()
    }
}

struct ScriptedSink {
    sinks: ScriptedSinks,
}

#[async_trait]
impl SinkFactory for ScriptedSinks {
    async fn open(&self, _context: &WorkloadLogContext) -> Result<Box<dyn LogSink>, SinkError> {
        Ok(Box::new(ScriptedSink {
            sinks: self.clone(),
        }))
    }
}

#[async_trait]
impl LogSink for ScriptedSink {
    async fn write(&mut self, _record: LogRecord) -> Result<(), SinkError> {
        Ok(())
    }

    fn subscribe(&self, config: ReadConfig) -> Subscription {
        let (producer, subscription) = Subscription::channel(4);
        lock_unpoisoned(&self.sinks.producers).push(producer);
        lock_unpoisoned(&self.sinks.configs).push(config);
        subscription
    }
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
