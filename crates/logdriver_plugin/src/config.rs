//! Environment configuration for the plugin process.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log_store::{DEFAULT_FOLLOW_POLL_INTERVAL, DEFAULT_LOG_ROOT};
use logdriver::config::{env_parse, env_string_opt};
use logdriver::DriverConfig;
use thiserror::Error;
use tracing::warn;

pub const ENV_LOG_ROOT: &str = "LOGDRIVER_LOG_ROOT";
pub const ENV_LISTEN: &str = "LOGDRIVER_LISTEN";
pub const ENV_LOG_LEVEL: &str = "LOGDRIVER_LOG_LEVEL";
pub const ENV_FOLLOW_POLL_MS: &str = "LOGDRIVER_FOLLOW_POLL_MS";

pub const DEFAULT_LISTEN: &str = "unix:///run/docker/plugins/logdriver.sock";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Where the plugin API is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    Unix(PathBuf),
    Tcp(SocketAddr),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid listen address {value:?}: expected unix://<path> or <host>:<port>")]
pub struct InvalidListenAddr {
    value: String,
}

impl FromStr for ListenAddr {
    type Err = InvalidListenAddr;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if let Some(path) = value.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(InvalidListenAddr {
                    value: value.to_owned(),
                });
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        value
            .strip_prefix("tcp://")
            .unwrap_or(value)
            .parse()
            .map(Self::Tcp)
            .map_err(|_| InvalidListenAddr {
                value: value.to_owned(),
            })
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginConfig {
    pub listen: ListenAddr,
    pub log_root: PathBuf,
    pub log_level: String,
    pub follow_poll_interval: Duration,
    pub driver: DriverConfig,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            listen: ListenAddr::Unix(PathBuf::from(
                DEFAULT_LISTEN.trim_start_matches("unix://"),
            )),
            log_root: PathBuf::from(DEFAULT_LOG_ROOT),
            log_level: DEFAULT_LOG_LEVEL.to_owned(),
            follow_poll_interval: DEFAULT_FOLLOW_POLL_INTERVAL,
            driver: DriverConfig::default(),
        }
    }
}

impl PluginConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen: env_string_opt(ENV_LISTEN)
                .and_then(|value| match value.parse() {
                    Ok(listen) => Some(listen),
                    Err(error) => {
                        warn!(%error, "falling back to default listen address");
                        None
                    }
                })
                .unwrap_or(defaults.listen),
            log_root: env_string_opt(ENV_LOG_ROOT)
                .map(PathBuf::from)
                .unwrap_or(defaults.log_root),
            log_level: env_string_opt(ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
            follow_poll_interval: env_parse::<u64>(ENV_FOLLOW_POLL_MS)
                .filter(|millis| *millis > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.follow_poll_interval),
            driver: DriverConfig::from_env(),
        }
    }
}
