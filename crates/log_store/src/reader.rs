use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::BytesMut;
use logdriver::codec::FrameCodec;
use logdriver::sink::SubscriptionProducer;
use logdriver::{LogRecord, ReadConfig};
use time::OffsetDateTime;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Upper bound on a single read from the log file.
pub(crate) const READ_CHUNK: usize = 64 * 1024;

pub(crate) async fn replay(
    path: PathBuf,
    config: ReadConfig,
    poll_interval: Duration,
    producer: SubscriptionProducer,
) {
    if let Err(error) = replay_records(&path, &config, poll_interval, &producer).await {
        warn!(path = %path.display(), %error, "log read-back failed");
        producer.fail(error.into()).await;
    }
}

async fn replay_records(
    path: &Path,
    config: &ReadConfig,
    poll_interval: Duration,
    producer: &SubscriptionProducer,
) -> Result<(), StoreError> {
    let mut tail = FrameTail::open(path).await?;

    let mut window = config.history_window();
    while let Some(record) = tail.next_record().await? {
        if producer.is_consumer_gone() {
            return Ok(());
        }
        if let Some(record) = window.offer(record) {
            if !producer.send(record).await {
                return Ok(());
            }
        }
    }
    for record in window.into_retained() {
        if !producer.send(record).await {
            return Ok(());
        }
    }
    if !config.follow || config.until_elapsed(OffsetDateTime::now_utc()) {
        return Ok(());
    }

    loop {
        tokio::select! {
            biased;
            _ = producer.consumer_gone() => {
                debug!(path = %path.display(), "follow stopped: consumer gone");
                return Ok(());
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }

        tail.rewind_if_shrunk().await?;
        while let Some(record) = tail.next_record().await? {
            if config.is_past_until(record.timestamp) {
                return Ok(());
            }
            if !config.admits(record.timestamp) {
                continue;
            }
            if !producer.send(record).await {
                return Ok(());
            }
        }
    }
}

/// Incremental decoder over a growing frame log.
///
/// Holds at most one read chunk plus one partially decoded frame in memory.
struct FrameTail {
    path: PathBuf,
    file: File,
    /// Bytes consumed from the file so far.
    offset: u64,
    /// File offset of the first byte in `buffer`.
    buffer_start: u64,
    buffer: BytesMut,
    chunk: Vec<u8>,
    codec: FrameCodec,
}

impl FrameTail {
    async fn open(path: &Path) -> Result<Self, StoreError> {
        let file = File::open(path)
            .await
            .map_err(|source| StoreError::io("opening log file for reading", path, source))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            offset: 0,
            buffer_start: 0,
            buffer: BytesMut::new(),
            chunk: vec![0; READ_CHUNK],
            codec: FrameCodec::new(),
        })
    }

    /// Next complete record, or `None` when the file holds no further
    /// complete frame yet. A partially written trailing frame stays buffered.
    async fn next_record(&mut self) -> Result<Option<LogRecord>, StoreError> {
        loop {
            let before = self.buffer.len();
            let decoded = self
                .codec
                .decode(&mut self.buffer)
                .map_err(|source| StoreError::corrupt(&self.path, self.buffer_start, source))?;
            self.buffer_start += (before - self.buffer.len()) as u64;
            if let Some(entry) = decoded {
                return Ok(Some(LogRecord::from(entry)));
            }

            let read = self
                .file
                .read(&mut self.chunk)
                .await
                .map_err(|source| StoreError::io("reading log file", &self.path, source))?;
            if read == 0 {
                return Ok(None);
            }
            self.offset += read as u64;
            self.buffer.extend_from_slice(&self.chunk[..read]);
        }
    }

    /// Starts over from the beginning when the file is now shorter than what
    /// has already been consumed.
    async fn rewind_if_shrunk(&mut self) -> Result<(), StoreError> {
        let len = self
            .file
            .metadata()
            .await
            .map_err(|source| StoreError::io("reading log file metadata", &self.path, source))?
            .len();
        if len >= self.offset {
            return Ok(());
        }

        debug!(path = %self.path.display(), "log file shrank, reading from the start");
        self.file
            .seek(SeekFrom::Start(0))
            .await
            .map_err(|source| StoreError::io("rewinding log file", &self.path, source))?;
        self.offset = 0;
        self.buffer_start = 0;
        self.buffer.clear();
        self.codec = FrameCodec::new();
        Ok(())
    }
}
