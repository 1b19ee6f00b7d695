//! Length-delimited framing for [`LogEntry`] messages.
//!
//! Frame format:
//!
//! ```text
//! +---------------------------+------------------------------+
//! | length (u32, big-endian)  | protobuf `LogEntry` payload  |
//! +---------------------------+------------------------------+
//! ```
//!
//! Frames whose declared length exceeds [`MAX_FRAME_SIZE`] are rejected after
//! their header is consumed, so the next decode starts at the following bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::entry::LogEntry;
use crate::error::FrameError;
use crate::record::LogRecord;

pub const MAX_FRAME_SIZE: usize = 1_000_000;

const LENGTH_PREFIX: usize = 4;
const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Head,
    Payload(usize),
}

#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
    state: DecodeState,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            state: DecodeState::Head,
        }
    }

    #[must_use]
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size.min(u32::MAX as usize);
        self
    }

    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// True when no partially read frame is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::Head
    }
}

impl Decoder for FrameCodec {
    type Item = LogEntry;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<LogEntry>, FrameError> {
        let length = match self.state {
            DecodeState::Head => {
                if src.len() < LENGTH_PREFIX {
                    src.reserve(LENGTH_PREFIX - src.len());
                    return Ok(None);
                }

                let length = src.get_u32() as usize;
                if length > self.max_frame_size {
                    return Err(FrameError::TooLarge {
                        length,
                        max: self.max_frame_size,
                    });
                }
                self.state = DecodeState::Payload(length);
                length
            }
            DecodeState::Payload(length) => length,
        };

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let payload = src.split_to(length);
        self.state = DecodeState::Head;
        LogEntry::decode(payload.freeze())
            .map(Some)
            .map_err(FrameError::from)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<LogEntry>, FrameError> {
        if let Some(entry) = self.decode(src)? {
            return Ok(Some(entry));
        }
        if src.is_empty() && self.is_idle() {
            return Ok(None);
        }

        let pending = src.len();
        src.clear();
        self.state = DecodeState::Head;
        Err(FrameError::Truncated { pending })
    }
}

impl Encoder<LogEntry> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, entry: LogEntry, dst: &mut BytesMut) -> Result<(), FrameError> {
        let length = entry.encoded_len();
        if length > self.max_frame_size {
            return Err(FrameError::TooLarge {
                length,
                max: self.max_frame_size,
            });
        }

        dst.reserve(LENGTH_PREFIX + length);
        // max_frame_size is clamped to u32::MAX
        dst.put_u32(length as u32);
        entry.encode(dst)?;
        Ok(())
    }
}

/// Encodes one record as a standalone frame.
pub fn encode_record(record: &LogRecord) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::new();
    FrameCodec::new().encode(LogEntry::from(record), &mut buf)?;
    Ok(buf.freeze())
}

/// Pulls frames off a byte stream, keeping unconsumed bytes across decode errors.
///
/// `next_frame` is cancel safe: dropping its future never loses buffered bytes.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    buffer: BytesMut,
    codec: FrameCodec,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            codec: FrameCodec::new(),
        }
    }

    /// Returns `None` once the stream reports end-of-stream with nothing pending.
    pub async fn next_frame(&mut self) -> Option<Result<LogEntry, FrameError>> {
        loop {
            match self.codec.decode(&mut self.buffer) {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => {}
                Err(error) => return Some(Err(error)),
            }

            self.buffer.reserve(READ_CHUNK);
            match self.reader.read_buf(&mut self.buffer).await {
                Ok(0) => return self.codec.decode_eof(&mut self.buffer).transpose(),
                Ok(_) => {}
                Err(error) => return Some(Err(FrameError::Io(error))),
            }
        }
    }

    /// Replaces the decode cursor after an error. Bytes already read past the
    /// failed frame stay buffered and are decoded next.
    pub fn resync(&mut self) {
        self.codec = FrameCodec::new();
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}
