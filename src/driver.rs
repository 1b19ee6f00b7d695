use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::DriverConfig;
use crate::context::{ReadConfig, WorkloadLogContext};
use crate::error::{DriverError, RegistryError};
use crate::ingest::{run_session, IngestReport, IngestWorker};
use crate::readback::{spawn_read_back, LogStream};
use crate::registry::{Session, SessionRegistry};
use crate::sink::SinkFactory;
use crate::stream::StreamOpener;

/// Optional features advertised to the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Capabilities {
    pub read_logs: bool,
}

/// Owns every ingest session and serves read-back requests.
pub struct LogDriver {
    registry: Arc<SessionRegistry>,
    sinks: Arc<dyn SinkFactory>,
    streams: Arc<dyn StreamOpener>,
    config: DriverConfig,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for LogDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogDriver")
            .field("sessions", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LogDriver {
    pub fn new(
        sinks: Arc<dyn SinkFactory>,
        streams: Arc<dyn StreamOpener>,
        config: DriverConfig,
    ) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            sinks,
            streams,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// A driver whose stream ids are FIFO paths.
    #[cfg(unix)]
    pub fn with_fifo_streams(sinks: Arc<dyn SinkFactory>, config: DriverConfig) -> Self {
        Self::new(sinks, Arc::new(crate::stream::FifoOpener), config)
    }

    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        Capabilities { read_logs: true }
    }

    /// Opens a sink and the input stream for `stream_id`, then starts ingesting.
    ///
    /// Returns once the session is registered; records flow in the background.
    pub async fn start_logging(
        &self,
        stream_id: &str,
        context: WorkloadLogContext,
    ) -> Result<(), DriverError> {
        debug!(
            stream_id,
            container_id = %context.container_id,
            image = %context.container_image_name,
            "start logging request"
        );
        if self.registry.contains(stream_id) {
            return Err(already_exists(stream_id));
        }
        require_image_name(&context)?;

        let sink = self
            .sinks
            .open(&context)
            .await
            .map_err(DriverError::SinkInit)?;
        let reader = self
            .streams
            .open(stream_id)
            .await
            .map_err(|source| DriverError::OpenStream {
                stream_id: stream_id.to_owned(),
                source,
            })?;

        let serial = self.registry.next_serial();
        let close = CancellationToken::new();
        let (start, gate) = oneshot::channel();
        let worker = IngestWorker::new(
            stream_id,
            reader,
            sink,
            close.clone(),
            self.config.decode_error_backoff,
        );
        let handle = tokio::spawn(run_session(
            Arc::clone(&self.registry),
            serial,
            gate,
            worker,
        ));

        let session = Session::new(serial, Arc::new(context), close, handle);
        self.registry
            .register(stream_id, session)
            .map_err(|error| match error {
                RegistryError::AlreadyExists { stream_id } | RegistryError::NotFound { stream_id } => {
                    DriverError::AlreadyExists { stream_id }
                }
            })?;
        let _ = start.send(());

        info!(stream_id, serial, "logging started");
        Ok(())
    }

    /// Ends the session for `stream_id`, if any, and waits for its worker.
    ///
    /// Unknown ids are a no-op. Returns the stopped session's report.
    pub async fn stop_logging(&self, stream_id: &str) -> Option<IngestReport> {
        debug!(stream_id, "stop logging request");
        let session = self.registry.unregister(stream_id).ok()?;
        let report = session.stop().await;
        info!(stream_id, "logging stopped");
        report
    }

    /// Streams the records stored for `context`'s image, filtered by `config`.
    pub async fn read_logs(
        &self,
        context: WorkloadLogContext,
        config: ReadConfig,
    ) -> Result<LogStream, DriverError> {
        debug!(
            image = %context.container_image_name,
            follow = config.follow,
            tail = config.tail,
            "read logs request"
        );
        require_image_name(&context)?;

        let sink = self
            .sinks
            .open(&context)
            .await
            .map_err(DriverError::SinkInit)?;
        Ok(spawn_read_back(
            sink,
            config,
            self.config.read_buffer,
            self.shutdown.child_token(),
        ))
    }

    /// Ends every open read-back stream, then stops every session and waits
    /// for the workers. Read-backs requested afterwards end immediately.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let sessions = self.registry.drain();
        if !sessions.is_empty() {
            info!(count = sessions.len(), "stopping active logging sessions");
        }
        for (stream_id, session) in sessions {
            if session.stop().await.is_none() {
                debug!(stream_id = %stream_id, "session ended without a report");
            }
        }
    }
}

fn require_image_name(context: &WorkloadLogContext) -> Result<(), DriverError> {
    context
        .image_name()
        .map(|_| ())
        .ok_or(DriverError::MissingImageName)
}

fn already_exists(stream_id: &str) -> DriverError {
    DriverError::AlreadyExists {
        stream_id: stream_id.to_owned(),
    }
}
