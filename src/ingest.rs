//! Per-stream ingestion: decode frames off the input stream and persist them.
//!
//! A bad frame never ends the session. The worker resynchronises and keeps
//! reading until the stream reports end-of-stream, the session is stopped, or
//! the stream itself fails.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::codec::FrameReader;
use crate::record::LogRecord;
use crate::registry::{SessionRegistry, SessionSerial};
use crate::sink::LogSink;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IngestEnd {
    /// The session was discarded before ingestion began.
    #[default]
    NotStarted,
    /// The writer closed the stream.
    EndOfStream,
    /// The session was stopped through its close handle.
    Stopped,
    /// Reading from the stream failed outright.
    StreamFailed,
}

/// Counters collected over one session's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub frames: u64,
    pub decode_errors: u64,
    pub write_errors: u64,
    pub end: IngestEnd,
}

pub(crate) struct IngestWorker<R> {
    stream_id: String,
    frames: FrameReader<R>,
    sink: Box<dyn LogSink>,
    close: CancellationToken,
    decode_error_backoff: Option<Duration>,
    report: IngestReport,
}

impl<R> IngestWorker<R>
where
    R: AsyncRead + Unpin,
{
    pub(crate) fn new(
        stream_id: impl Into<String>,
        reader: R,
        sink: Box<dyn LogSink>,
        close: CancellationToken,
        decode_error_backoff: Option<Duration>,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            frames: FrameReader::new(reader),
            sink,
            close,
            decode_error_backoff,
            report: IngestReport::default(),
        }
    }

    pub(crate) async fn run(mut self) -> IngestReport {
        self.report.end = loop {
            let next = tokio::select! {
                biased;
                _ = self.close.cancelled() => break IngestEnd::Stopped,
                next = self.frames.next_frame() => next,
            };

            match next {
                None => break IngestEnd::EndOfStream,
                Some(Ok(entry)) => {
                    self.report.frames += 1;
                    self.persist(LogRecord::from(entry)).await;
                }
                Some(Err(err)) if err.is_recoverable() => {
                    self.report.decode_errors += 1;
                    warn!(
                        stream_id = %self.stream_id,
                        error = %err,
                        "error decoding log message, resyncing"
                    );
                    self.frames.resync();
                    if let Some(delay) = self.decode_error_backoff {
                        tokio::time::sleep(delay).await;
                    }
                }
                Some(Err(err)) => {
                    warn!(stream_id = %self.stream_id, error = %err, "log stream failed");
                    break IngestEnd::StreamFailed;
                }
            }
        };

        debug!(stream_id = %self.stream_id, end = ?self.report.end, "closing logger stream");
        if let Err(err) = self.sink.close().await {
            warn!(stream_id = %self.stream_id, error = %err, "error closing log sink");
        }
        self.report
    }

    async fn persist(&mut self, record: LogRecord) {
        if let Err(err) = self.sink.write(record).await {
            self.report.write_errors += 1;
            error!(
                stream_id = %self.stream_id,
                error = %err,
                "error writing log message"
            );
        }
    }
}

/// Task body for one session.
///
/// Waits on `start` so no record is consumed before the session is visible in
/// the registry; a dropped `start` discards the session unread. When the
/// worker ends on its own the session removes itself.
pub(crate) async fn run_session<R>(
    registry: Arc<SessionRegistry>,
    serial: SessionSerial,
    start: oneshot::Receiver<()>,
    worker: IngestWorker<R>,
) -> IngestReport
where
    R: AsyncRead + Unpin,
{
    if start.await.is_err() {
        return IngestReport::default();
    }

    let stream_id = worker.stream_id.clone();
    let report = worker.run().await;
    if report.end != IngestEnd::Stopped {
        registry.remove_if_current(&stream_id, serial);
    }
    debug!(
        stream_id = %stream_id,
        frames = report.frames,
        decode_errors = report.decode_errors,
        write_errors = report.write_errors,
        "ingest worker finished"
    );
    report
}
