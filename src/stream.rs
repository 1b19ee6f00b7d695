//! Sources of framed input streams, keyed by stream id.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncRead, DuplexStream};

use crate::lock_unpoisoned;

pub type InputStream = Box<dyn AsyncRead + Send + Unpin>;

#[async_trait]
pub trait StreamOpener: Send + Sync + 'static {
    async fn open(&self, stream_id: &str) -> io::Result<InputStream>;
}

/// Treats each stream id as the path of a named pipe and opens it read-only.
///
/// The open blocks (off the runtime) until the writer end is open, so the
/// reader only sees end-of-stream once that writer closes.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoOpener;

#[cfg(unix)]
#[async_trait]
impl StreamOpener for FifoOpener {
    async fn open(&self, stream_id: &str) -> io::Result<InputStream> {
        let path = std::path::PathBuf::from(stream_id);
        let file = tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new().read(true).open(path)
        })
        .await
        .map_err(io::Error::other)??;
        let receiver = tokio::net::unix::pipe::Receiver::from_file(file)?;
        Ok(Box::new(receiver))
    }
}

/// In-process streams: [`MemoryStreams::connect`] hands back the writer half,
/// and the next `open` of that id yields the reader half.
#[derive(Debug, Clone, Default)]
pub struct MemoryStreams {
    pending: Arc<Mutex<HashMap<String, DuplexStream>>>,
}

impl MemoryStreams {
    pub const BUFFER_SIZE: usize = 64 * 1024;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn connect(&self, stream_id: &str) -> DuplexStream {
        let (writer, reader) = tokio::io::duplex(Self::BUFFER_SIZE);
        lock_unpoisoned(&self.pending).insert(stream_id.to_owned(), reader);
        writer
    }
}

#[async_trait]
impl StreamOpener for MemoryStreams {
    async fn open(&self, stream_id: &str) -> io::Result<InputStream> {
        let reader = lock_unpoisoned(&self.pending).remove(stream_id);
        match reader {
            Some(reader) => Ok(Box::new(reader)),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no stream connected for {stream_id}"),
            )),
        }
    }
}
