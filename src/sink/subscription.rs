use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SinkError;
use crate::record::LogRecord;

pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 64;

#[derive(Debug)]
pub enum SubscriptionEvent {
    Record(LogRecord),
    /// Terminal: the sink could not continue. No further events follow.
    Failed(SinkError),
    /// Terminal: history exhausted (or follow ended).
    Closed,
}

/// Consumer half of a read-back subscription.
///
/// Dropping it signals consumer-gone to the producer exactly once.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<Result<LogRecord, SinkError>>,
    consumer_gone: CancellationToken,
    finished: bool,
}

/// Producer half handed to whatever task replays records for a sink.
#[derive(Debug, Clone)]
pub struct SubscriptionProducer {
    events: mpsc::Sender<Result<LogRecord, SinkError>>,
    consumer_gone: CancellationToken,
}

impl Subscription {
    #[must_use]
    pub fn channel(capacity: usize) -> (SubscriptionProducer, Subscription) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let consumer_gone = CancellationToken::new();
        (
            SubscriptionProducer {
                events: tx,
                consumer_gone: consumer_gone.clone(),
            },
            Subscription {
                events: rx,
                consumer_gone,
                finished: false,
            },
        )
    }

    /// Waits for the next event. After a terminal event this keeps returning `Closed`.
    pub async fn next(&mut self) -> SubscriptionEvent {
        if self.finished {
            return SubscriptionEvent::Closed;
        }
        match self.events.recv().await {
            Some(Ok(record)) => SubscriptionEvent::Record(record),
            Some(Err(error)) => {
                self.finished = true;
                self.events.close();
                SubscriptionEvent::Failed(error)
            }
            None => {
                self.finished = true;
                SubscriptionEvent::Closed
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.consumer_gone.cancel();
    }
}

impl SubscriptionProducer {
    /// Delivers one record. Returns `false` once the consumer is gone.
    pub async fn send(&self, record: LogRecord) -> bool {
        tokio::select! {
            biased;
            _ = self.consumer_gone.cancelled() => false,
            sent = self.events.send(Ok(record)) => sent.is_ok(),
        }
    }

    /// Ends the subscription with an error.
    pub async fn fail(self, error: SinkError) {
        tokio::select! {
            biased;
            _ = self.consumer_gone.cancelled() => {}
            _ = self.events.send(Err(error)) => {}
        }
    }

    #[must_use]
    pub fn is_consumer_gone(&self) -> bool {
        self.consumer_gone.is_cancelled()
    }

    /// Resolves once the consumer has dropped its [`Subscription`].
    pub async fn consumer_gone(&self) {
        self.consumer_gone.cancelled().await;
    }
}
