use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use super::subscription::{Subscription, SubscriptionProducer, DEFAULT_SUBSCRIPTION_CAPACITY};
use super::{LogSink, SinkFactory};
use crate::context::{ReadConfig, WorkloadLogContext};
use crate::error::SinkError;
use crate::lock_unpoisoned;
use crate::record::LogRecord;

/// In-process record storage keyed by image name.
///
/// Clones share the same storage. Useful for embedding and tests; failure
/// injection hooks let callers exercise the error paths of the driver.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreState>>,
}

#[derive(Debug, Default)]
struct StoreState {
    logs: HashMap<String, Arc<MemoryLog>>,
    failing_writes: usize,
    failing_opens: usize,
}

#[derive(Debug, Clone, Copy)]
enum Injected {
    Open,
    Write,
}

#[derive(Debug)]
struct MemoryLog {
    records: Mutex<Vec<LogRecord>>,
    appended: watch::Sender<usize>,
}

impl MemoryLog {
    fn new() -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            records: Mutex::new(Vec::new()),
            appended,
        }
    }

    fn push(&self, record: LogRecord) {
        let len = {
            let mut records = lock_unpoisoned(&self.records);
            records.push(record);
            records.len()
        };
        self.appended.send_replace(len);
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn factory(&self) -> MemorySinkFactory {
        MemorySinkFactory {
            store: self.clone(),
        }
    }

    /// Snapshot of everything stored for `image`.
    #[must_use]
    pub fn records(&self, image: &str) -> Vec<LogRecord> {
        let log = lock_unpoisoned(&self.inner).logs.get(image).cloned();
        log.map(|log| lock_unpoisoned(&log.records).clone())
            .unwrap_or_default()
    }

    pub fn append(&self, image: &str, record: LogRecord) {
        self.log_for(image).push(record);
    }

    /// Makes the next `count` sink writes fail.
    pub fn fail_next_writes(&self, count: usize) {
        lock_unpoisoned(&self.inner).failing_writes = count;
    }

    /// Makes the next `count` sink opens fail.
    pub fn fail_next_opens(&self, count: usize) {
        lock_unpoisoned(&self.inner).failing_opens = count;
    }

    fn log_for(&self, image: &str) -> Arc<MemoryLog> {
        let mut state = lock_unpoisoned(&self.inner);
        Arc::clone(
            state
                .logs
                .entry(image.to_owned())
                .or_insert_with(|| Arc::new(MemoryLog::new())),
        )
    }

    fn take_failure(&self, kind: Injected) -> bool {
        let mut state = lock_unpoisoned(&self.inner);
        let remaining = match kind {
            Injected::Open => &mut state.failing_opens,
            Injected::Write => &mut state.failing_writes,
        };
        if *remaining == 0 {
            return false;
        }
        *remaining -= 1;
        true
    }
}

#[derive(Debug, Clone)]
pub struct MemorySinkFactory {
    store: MemoryStore,
}

impl MemorySinkFactory {
    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl SinkFactory for MemorySinkFactory {
    async fn open(&self, context: &WorkloadLogContext) -> Result<Box<dyn LogSink>, SinkError> {
        if self.store.take_failure(Injected::Open) {
            return Err(SinkError::other("injected open failure"));
        }
        Ok(Box::new(MemorySink {
            log: self.store.log_for(&context.container_image_name),
            store: self.store.clone(),
            closed: false,
        }))
    }
}

#[derive(Debug)]
pub struct MemorySink {
    log: Arc<MemoryLog>,
    store: MemoryStore,
    closed: bool,
}

#[async_trait]
impl LogSink for MemorySink {
    async fn write(&mut self, record: LogRecord) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        if self.store.take_failure(Injected::Write) {
            return Err(SinkError::other("injected write failure"));
        }
        self.log.push(record);
        Ok(())
    }

    fn subscribe(&self, config: ReadConfig) -> Subscription {
        let (producer, subscription) = Subscription::channel(DEFAULT_SUBSCRIPTION_CAPACITY);
        tokio::spawn(replay(Arc::clone(&self.log), config, producer));
        subscription
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.closed = true;
        Ok(())
    }
}

async fn replay(log: Arc<MemoryLog>, config: ReadConfig, producer: SubscriptionProducer) {
    // Subscribe before the snapshot so appends racing with it are not missed.
    let mut appended = log.appended.subscribe();
    let (history, mut cursor) = {
        let records = lock_unpoisoned(&log.records);
        (config.select_history(records.iter().cloned()), records.len())
    };

    for record in history {
        if !producer.send(record).await {
            return;
        }
    }
    if !config.follow || config.until_elapsed(time::OffsetDateTime::now_utc()) {
        return;
    }

    loop {
        let fresh = {
            let records = lock_unpoisoned(&log.records);
            let fresh = records[cursor..].to_vec();
            cursor = records.len();
            fresh
        };
        for record in fresh {
            if config.is_past_until(record.timestamp) {
                return;
            }
            if !config.admits(record.timestamp) {
                continue;
            }
            if !producer.send(record).await {
                return;
            }
        }

        tokio::select! {
            biased;
            _ = producer.consumer_gone() => {
                debug!("memory replay stopped: consumer gone");
                return;
            }
            changed = appended.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SubscriptionEvent;
    use time::macros::datetime;

    fn record(line: &str) -> LogRecord {
        LogRecord::new(line, "stdout", datetime!(2026-03-01 12:00 UTC))
    }

    async fn open(store: &MemoryStore, image: &str) -> Box<dyn LogSink> {
        store
            .factory()
            .open(&WorkloadLogContext::for_image(image))
            .await
            .expect("memory sink should open")
    }

    #[tokio::test]
    async fn writes_are_kept_per_image_in_order() {
        let store = MemoryStore::new();
        let mut web = open(&store, "web").await;
        let mut db = open(&store, "db").await;

        web.write(record("1")).await.expect("write");
        db.write(record("x")).await.expect("write");
        web.write(record("2")).await.expect("write");

        assert_eq!(store.records("web"), vec![record("1"), record("2")]);
        assert_eq!(store.records("db"), vec![record("x")]);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next_opens(1);
        assert!(store
            .factory()
            .open(&WorkloadLogContext::for_image("web"))
            .await
            .is_err());

        let mut sink = open(&store, "web").await;
        store.fail_next_writes(1);
        assert!(sink.write(record("dropped")).await.is_err());
        sink.write(record("kept")).await.expect("second write succeeds");
        assert_eq!(store.records("web"), vec![record("kept")]);
    }

    #[tokio::test]
    async fn closed_sink_rejects_writes() {
        let store = MemoryStore::new();
        let mut sink = open(&store, "web").await;
        sink.close().await.expect("close");

        assert!(matches!(
            sink.write(record("late")).await,
            Err(SinkError::Closed)
        ));
    }

    #[tokio::test]
    async fn follow_delivers_appends_after_history() {
        let store = MemoryStore::new();
        store.append("web", record("old"));
        let sink = open(&store, "web").await;

        let mut subscription = sink.subscribe(ReadConfig::default().with_follow(true));
        assert!(matches!(
            subscription.next().await,
            SubscriptionEvent::Record(r) if r.line == b"old"
        ));

        store.append("web", record("new"));
        assert!(matches!(
            subscription.next().await,
            SubscriptionEvent::Record(r) if r.line == b"new"
        ));
    }
}
