use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use logdriver::codec::encode_record;
use logdriver::sink::{LogSink, SinkFactory, Subscription, DEFAULT_SUBSCRIPTION_CAPACITY};
use logdriver::{LogRecord, ReadConfig, SinkError, WorkloadLogContext};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::StoreError;
use crate::paths::{log_file_path, DEFAULT_LOG_ROOT};
use crate::reader;

pub const DEFAULT_FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Opens one [`LocalLogFile`] per image name under a root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    follow_poll_interval: Duration,
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_ROOT)
    }
}

impl LocalStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            follow_poll_interval: DEFAULT_FOLLOW_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_follow_poll_interval(mut self, interval: Duration) -> Self {
        self.follow_poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, context: &WorkloadLogContext) -> Result<PathBuf, StoreError> {
        log_file_path(&self.root, &context.container_image_name)
    }

    pub async fn open_file(&self, context: &WorkloadLogContext) -> Result<LocalLogFile, StoreError> {
        let path = self.path_for(context)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::io("creating log directory", parent, source))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| StoreError::io("opening log file for append", &path, source))?;

        debug!(path = %path.display(), "opened log file");
        Ok(LocalLogFile {
            path,
            file: Some(file),
            follow_poll_interval: self.follow_poll_interval,
        })
    }
}

#[async_trait]
impl SinkFactory for LocalStore {
    async fn open(&self, context: &WorkloadLogContext) -> Result<Box<dyn LogSink>, SinkError> {
        Ok(Box::new(self.open_file(context).await?))
    }
}

/// Append-only frame log for one image.
#[derive(Debug)]
pub struct LocalLogFile {
    path: PathBuf,
    file: Option<File>,
    follow_poll_interval: Duration,
}

impl LocalLogFile {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&mut self, record: &LogRecord) -> Result<(), StoreError> {
        let frame = encode_record(record).map_err(|source| StoreError::Encode {
            path: self.path.clone(),
            source,
        })?;
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        file.write_all(&frame)
            .await
            .map_err(|source| StoreError::io("appending log record", &self.path, source))?;
        file.flush()
            .await
            .map_err(|source| StoreError::io("flushing log file", &self.path, source))
    }
}

#[async_trait]
impl LogSink for LocalLogFile {
    async fn write(&mut self, record: LogRecord) -> Result<(), SinkError> {
        if self.file.is_none() {
            return Err(SinkError::Closed);
        }
        self.append(&record).await.map_err(SinkError::from)
    }

    fn subscribe(&self, config: ReadConfig) -> Subscription {
        let (producer, subscription) = Subscription::channel(DEFAULT_SUBSCRIPTION_CAPACITY);
        tokio::spawn(reader::replay(
            self.path.clone(),
            config,
            self.follow_poll_interval,
            producer,
        ));
        subscription
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        file.flush()
            .await
            .map_err(|source| SinkError::io("flushing log file", &self.path, source))?;
        file.sync_data()
            .await
            .map_err(|source| SinkError::io("syncing log file", &self.path, source))
    }
}
