//! Read-back: replays a sink's records to a consumer as a framed byte stream.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::codec::encode_record;
use crate::context::ReadConfig;
use crate::sink::{LogSink, Subscription, SubscriptionEvent};

/// Framed records for one read request, in the same wire format as ingestion.
///
/// Dropping the stream tells the producer the consumer is gone.
#[derive(Debug)]
pub struct LogStream {
    frames: mpsc::Receiver<io::Result<Bytes>>,
}

impl Stream for LogStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.frames.poll_recv(cx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadBackEnd {
    Completed,
    ConsumerGone,
    Failed,
    Shutdown,
}

pub(crate) fn spawn_read_back(
    mut sink: Box<dyn LogSink>,
    config: ReadConfig,
    buffer: usize,
    shutdown: CancellationToken,
) -> LogStream {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    tokio::spawn(async move {
        let subscription = sink.subscribe(config);
        let end = forward(subscription, tx, &shutdown).await;
        debug!(end = ?end, "read-back finished");
        if let Err(err) = sink.close().await {
            debug!(error = %err, "error closing read-back sink");
        }
    });
    LogStream { frames: rx }
}

/// Ends cleanly, without an error item, when `shutdown` fires.
async fn forward(
    mut subscription: Subscription,
    out: mpsc::Sender<io::Result<Bytes>>,
    shutdown: &CancellationToken,
) -> ReadBackEnd {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return ReadBackEnd::Shutdown,
            _ = out.closed() => return ReadBackEnd::ConsumerGone,
            event = subscription.next() => event,
        };

        match event {
            SubscriptionEvent::Record(record) => {
                let frame = match encode_record(&record) {
                    Ok(frame) => frame,
                    Err(err) => {
                        error!(error = %err, "error encoding log message");
                        let _ = out
                            .send(Err(io::Error::new(io::ErrorKind::InvalidData, err)))
                            .await;
                        return ReadBackEnd::Failed;
                    }
                };
                let sent = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => return ReadBackEnd::Shutdown,
                    sent = out.send(Ok(frame)) => sent,
                };
                if sent.is_err() {
                    return ReadBackEnd::ConsumerGone;
                }
            }
            SubscriptionEvent::Failed(err) => {
                error!(error = %err, "error reading logs");
                let _ = out.send(Err(io::Error::other(err))).await;
                return ReadBackEnd::Failed;
            }
            SubscriptionEvent::Closed => return ReadBackEnd::Completed,
        }
    }
}
