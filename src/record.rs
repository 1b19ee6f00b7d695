use time::OffsetDateTime;

use crate::entry::{LogEntry, PartialLogEntryMetadata};

/// Grouping metadata for one fragment of a split log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialMetadata {
    /// Shared by every fragment of the same logical line.
    pub id: String,
    /// Set on the final fragment.
    pub last: bool,
    /// Position of this fragment within its group.
    pub ordinal: i32,
}

/// One decoded log line, handed to the sink by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub line: Vec<u8>,
    pub source: String,
    pub timestamp: OffsetDateTime,
    pub partial: Option<PartialMetadata>,
}

impl LogRecord {
    #[must_use]
    pub fn new(
        line: impl Into<Vec<u8>>,
        source: impl Into<String>,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            line: line.into(),
            source: source.into(),
            timestamp,
            partial: None,
        }
    }

    #[must_use]
    pub fn with_partial(mut self, partial: PartialMetadata) -> Self {
        self.partial = Some(partial);
        self
    }

    /// Nanoseconds since the Unix epoch, saturated to the `i64` wire range.
    #[must_use]
    pub fn timestamp_nanos(&self) -> i64 {
        timestamp_to_nanos(self.timestamp)
    }
}

impl From<LogEntry> for LogRecord {
    fn from(entry: LogEntry) -> Self {
        let partial = entry
            .partial_log_metadata
            .map(|metadata| PartialMetadata {
                id: metadata.id,
                last: metadata.last,
                ordinal: metadata.ordinal,
            });

        Self {
            line: entry.line,
            source: source_tag(entry.source),
            timestamp: timestamp_from_nanos(entry.time_nano),
            partial,
        }
    }
}

impl From<&LogRecord> for LogEntry {
    fn from(record: &LogRecord) -> Self {
        Self {
            source: record.source.as_bytes().to_vec(),
            time_nano: record.timestamp_nanos(),
            line: record.line.clone(),
            partial: record.partial.is_some(),
            partial_log_metadata: record.partial.as_ref().map(|partial| {
                PartialLogEntryMetadata {
                    last: partial.last,
                    id: partial.id.clone(),
                    ordinal: partial.ordinal,
                }
            }),
        }
    }
}

fn source_tag(raw: Vec<u8>) -> String {
    String::from_utf8(raw)
        .unwrap_or_else(|error| String::from_utf8_lossy(error.as_bytes()).into_owned())
}

#[must_use]
pub fn timestamp_from_nanos(nanos: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[must_use]
pub fn timestamp_to_nanos(timestamp: OffsetDateTime) -> i64 {
    let nanos = timestamp.unix_timestamp_nanos();
    i64::try_from(nanos).unwrap_or(if nanos < 0 { i64::MIN } else { i64::MAX })
}
