//! Protobuf messages carried inside each frame.
//!
//! Field numbers match the container runtime's `entry.proto`, so frames produced
//! here are readable by existing log drivers and vice versa.

/// One log line as it travels on the wire.
///
/// `source` is declared `string` upstream but decoded as raw bytes here, so a
/// writer that puts invalid UTF-8 in it does not lose the whole line.
#[derive(Clone, PartialEq, prost::Message)]
pub struct LogEntry {
    #[prost(bytes = "vec", tag = "1")]
    pub source: Vec<u8>,
    #[prost(int64, tag = "2")]
    pub time_nano: i64,
    #[prost(bytes = "vec", tag = "3")]
    pub line: Vec<u8>,
    #[prost(bool, tag = "4")]
    pub partial: bool,
    #[prost(message, optional, tag = "5")]
    pub partial_log_metadata: Option<PartialLogEntryMetadata>,
}

/// Grouping info for a logical line split across several entries.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PartialLogEntryMetadata {
    #[prost(bool, tag = "1")]
    pub last: bool,
    #[prost(string, tag = "2")]
    pub id: String,
    #[prost(int32, tag = "3")]
    pub ordinal: i32,
}
