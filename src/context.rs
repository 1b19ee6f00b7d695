//! Metadata describing a logging workload and the filters applied when its
//! records are read back.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::record::LogRecord;

/// `tail` value selecting the full history.
pub const TAIL_ALL: i64 = -1;

/// Workload metadata as supplied by the container runtime.
///
/// Keys use the runtime's PascalCase JSON names. Missing fields and explicit
/// `null` collections both decode to empty values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct WorkloadLogContext {
    #[serde(deserialize_with = "null_as_default")]
    pub config: BTreeMap<String, String>,
    #[serde(rename = "ContainerID")]
    pub container_id: String,
    pub container_name: String,
    pub container_entrypoint: String,
    #[serde(deserialize_with = "null_as_default")]
    pub container_args: Vec<String>,
    #[serde(rename = "ContainerImageID")]
    pub container_image_id: String,
    pub container_image_name: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub container_created: Option<OffsetDateTime>,
    #[serde(deserialize_with = "null_as_default")]
    pub container_env: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub container_labels: BTreeMap<String, String>,
    pub log_path: String,
    pub daemon_name: String,
}

impl WorkloadLogContext {
    #[must_use]
    pub fn for_image(image: impl Into<String>) -> Self {
        Self {
            container_image_name: image.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_container_id(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = container_id.into();
        self
    }

    /// The image name, if one was supplied.
    #[must_use]
    pub fn image_name(&self) -> Option<&str> {
        let image = self.container_image_name.trim();
        (!image.is_empty()).then_some(image)
    }
}

/// Filters for a read-back request.
///
/// Timestamps at or before the Unix epoch count as unset, which covers the
/// runtime's zero-time encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReadConfig {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub since: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub until: Option<OffsetDateTime>,
    /// Negative for everything, zero for no history, `n` for the last `n` records.
    #[serde(default = "tail_all")]
    pub tail: i64,
    #[serde(default)]
    pub follow: bool,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            since: None,
            until: None,
            tail: TAIL_ALL,
            follow: false,
        }
    }
}

impl ReadConfig {
    #[must_use]
    pub fn with_follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    #[must_use]
    pub fn with_tail(mut self, tail: i64) -> Self {
        self.tail = tail;
        self
    }

    #[must_use]
    pub fn with_since(mut self, since: OffsetDateTime) -> Self {
        self.since = Some(since);
        self
    }

    #[must_use]
    pub fn with_until(mut self, until: OffsetDateTime) -> Self {
        self.until = Some(until);
        self
    }

    #[must_use]
    pub fn effective_since(&self) -> Option<OffsetDateTime> {
        self.since.filter(|since| *since > OffsetDateTime::UNIX_EPOCH)
    }

    #[must_use]
    pub fn effective_until(&self) -> Option<OffsetDateTime> {
        self.until.filter(|until| *until > OffsetDateTime::UNIX_EPOCH)
    }

    /// Whether a record at `timestamp` falls inside the since/until window.
    #[must_use]
    pub fn admits(&self, timestamp: OffsetDateTime) -> bool {
        let before_since = self
            .effective_since()
            .is_some_and(|since| timestamp < since);
        !before_since && !self.is_past_until(timestamp)
    }

    #[must_use]
    pub fn is_past_until(&self, timestamp: OffsetDateTime) -> bool {
        self.effective_until().is_some_and(|until| timestamp > until)
    }

    /// Follow mode has nothing left to wait for once `until` lies in the past.
    #[must_use]
    pub fn until_elapsed(&self, now: OffsetDateTime) -> bool {
        self.effective_until().is_some_and(|until| until <= now)
    }

    /// Applies the time window and tail limit to stored history, oldest first.
    pub fn select_history<I>(&self, records: I) -> Vec<LogRecord>
    where
        I: IntoIterator<Item = LogRecord>,
    {
        let mut window = self.history_window();
        let mut selected: Vec<LogRecord> = records
            .into_iter()
            .filter_map(|record| window.offer(record))
            .collect();
        selected.extend(window.into_retained());
        selected
    }

    /// Incremental form of [`ReadConfig::select_history`] for histories too
    /// large to collect first.
    #[must_use]
    pub fn history_window(&self) -> HistoryWindow<'_> {
        HistoryWindow {
            config: self,
            limit: usize::try_from(self.tail).ok(),
            retained: VecDeque::new(),
        }
    }
}

/// Walks stored history oldest first, holding back at most `tail` records.
///
/// Without a tail limit every admitted record is handed straight back from
/// [`HistoryWindow::offer`]; with one, the last `tail` admitted records are
/// kept and released by [`HistoryWindow::into_retained`].
#[derive(Debug)]
pub struct HistoryWindow<'a> {
    config: &'a ReadConfig,
    limit: Option<usize>,
    retained: VecDeque<LogRecord>,
}

impl HistoryWindow<'_> {
    /// Returns the record when it should be delivered immediately.
    pub fn offer(&mut self, record: LogRecord) -> Option<LogRecord> {
        if !self.config.admits(record.timestamp) {
            return None;
        }
        let Some(limit) = self.limit else {
            return Some(record);
        };
        if limit == 0 {
            return None;
        }
        self.retained.push_back(record);
        if self.retained.len() > limit {
            self.retained.pop_front();
        }
        None
    }

    #[must_use]
    pub fn retained(&self) -> usize {
        self.retained.len()
    }

    /// The held-back tail, oldest first.
    pub fn into_retained(self) -> impl Iterator<Item = LogRecord> {
        self.retained.into_iter()
    }
}

fn tail_all() -> i64 {
    TAIL_ALL
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
