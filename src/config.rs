//! Environment configuration.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::sink::DEFAULT_SUBSCRIPTION_CAPACITY;

pub const ENV_READ_BUFFER: &str = "LOGDRIVER_READ_BUFFER";
pub const ENV_DECODE_BACKOFF_MS: &str = "LOGDRIVER_DECODE_BACKOFF_MS";

/// Tuning for [`crate::LogDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Frames buffered between a read-back producer and its consumer.
    pub read_buffer: usize,
    /// Pause after each decode error. `None` retries immediately.
    pub decode_error_backoff: Option<Duration>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            read_buffer: DEFAULT_SUBSCRIPTION_CAPACITY,
            decode_error_backoff: None,
        }
    }
}

impl DriverConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            read_buffer: env_parse::<usize>(ENV_READ_BUFFER)
                .filter(|size| *size > 0)
                .unwrap_or(defaults.read_buffer),
            decode_error_backoff: env_parse::<u64>(ENV_DECODE_BACKOFF_MS)
                .filter(|millis| *millis > 0)
                .map(Duration::from_millis),
        }
    }

    #[must_use]
    pub fn with_read_buffer(mut self, read_buffer: usize) -> Self {
        self.read_buffer = read_buffer.max(1);
        self
    }

    #[must_use]
    pub fn with_decode_error_backoff(mut self, backoff: Duration) -> Self {
        self.decode_error_backoff = Some(backoff);
        self
    }
}

/// Non-blank value of `key`, if set.
pub fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

/// Parsed value of `key`. Unparseable values are logged and ignored.
pub fn env_parse<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env_string_opt(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(key, value = %raw, %error, "ignoring invalid environment value");
            None
        }
    }
}

/// Scoped environment overrides for tests that read process env.
#[cfg(any(test, feature = "test-util"))]
pub mod env_guard {
    use std::env;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    /// Restores the previous value of its variable on drop.
    pub struct EnvGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.previous {
                env::set_var(self.key, value);
            } else {
                env::remove_var(self.key);
            }
        }
    }

    /// Serialises env-mutating tests within one test binary.
    pub fn env_lock() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        crate::lock_unpoisoned(LOCK.get_or_init(|| Mutex::new(())))
    }

    pub fn set_env_guard(key: &'static str, value: Option<&str>) -> EnvGuard {
        let previous = env::var(key).ok();
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
        EnvGuard { key, previous }
    }
}
