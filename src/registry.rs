use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::context::WorkloadLogContext;
use crate::error::RegistryError;
use crate::ingest::IngestReport;
use crate::lock_unpoisoned;

/// Distinguishes successive sessions that reuse the same stream id.
pub type SessionSerial = u64;

/// The live binding between one input stream and its ingest worker.
#[derive(Debug)]
pub struct Session {
    serial: SessionSerial,
    context: Arc<WorkloadLogContext>,
    started_at: OffsetDateTime,
    close: CancellationToken,
    worker: JoinHandle<IngestReport>,
}

impl Session {
    pub(crate) fn new(
        serial: SessionSerial,
        context: Arc<WorkloadLogContext>,
        close: CancellationToken,
        worker: JoinHandle<IngestReport>,
    ) -> Self {
        Self {
            serial,
            context,
            started_at: OffsetDateTime::now_utc(),
            close,
            worker,
        }
    }

    #[must_use]
    pub fn serial(&self) -> SessionSerial {
        self.serial
    }

    #[must_use]
    pub fn context(&self) -> &WorkloadLogContext {
        &self.context
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Closes the input stream and waits for the worker to drain out.
    ///
    /// Returns `None` if the worker panicked or was aborted.
    pub async fn stop(self) -> Option<IngestReport> {
        self.close.cancel();
        match self.worker.await {
            Ok(report) => Some(report),
            Err(error) => {
                warn!(serial = self.serial, %error, "ingest worker did not finish cleanly");
                None
            }
        }
    }

    fn info(&self, stream_id: &str) -> SessionInfo {
        SessionInfo {
            stream_id: stream_id.to_owned(),
            serial: self.serial,
            context: Arc::clone(&self.context),
            started_at: self.started_at,
        }
    }
}

/// Point-in-time view of a registered session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub stream_id: String,
    pub serial: SessionSerial,
    pub context: Arc<WorkloadLogContext>,
    pub started_at: OffsetDateTime,
}

/// Concurrent map from stream id to its active session.
///
/// Every operation holds the lock only for the map access itself.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Session>>,
    next_serial: AtomicU64,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_serial(&self) -> SessionSerial {
        self.next_serial.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Inserts `session` unless `stream_id` is already taken. The check and the
    /// insert are one atomic step.
    pub fn register(&self, stream_id: &str, session: Session) -> Result<(), RegistryError> {
        let mut sessions = self.lock();
        if sessions.contains_key(stream_id) {
            return Err(RegistryError::AlreadyExists {
                stream_id: stream_id.to_owned(),
            });
        }
        sessions.insert(stream_id.to_owned(), session);
        Ok(())
    }

    pub fn unregister(&self, stream_id: &str) -> Result<Session, RegistryError> {
        self.lock()
            .remove(stream_id)
            .ok_or_else(|| RegistryError::NotFound {
                stream_id: stream_id.to_owned(),
            })
    }

    pub fn lookup(&self, stream_id: &str) -> Result<SessionInfo, RegistryError> {
        self.lock()
            .get(stream_id)
            .map(|session| session.info(stream_id))
            .ok_or_else(|| RegistryError::NotFound {
                stream_id: stream_id.to_owned(),
            })
    }

    #[must_use]
    pub fn contains(&self, stream_id: &str) -> bool {
        self.lock().contains_key(stream_id)
    }

    /// Removes the entry only if it still belongs to the session with `serial`.
    pub(crate) fn remove_if_current(
        &self,
        stream_id: &str,
        serial: SessionSerial,
    ) -> Option<Session> {
        let mut sessions = self.lock();
        if sessions.get(stream_id).map(Session::serial) != Some(serial) {
            return None;
        }
        sessions.remove(stream_id)
    }

    /// Empties the registry, handing every session back to the caller.
    pub fn drain(&self) -> Vec<(String, Session)> {
        self.lock().drain().collect()
    }

    #[must_use]
    pub fn stream_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        lock_unpoisoned(&self.sessions)
    }
}
