use serde_derive::Deserialize;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::ipam::allocator::DEFAULT_MAX_ATTEMPTS;

const DEFAULT_PORT: u16 = 8000;

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub allocation: AllocationConfig,
    pub discovery: DiscoveryConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_address: SocketAddrV4,
}

impl Default for ServerConfig {
    fn default() -> Self {
        return ServerConfig {
            bind_address: SocketAddrV4::new(Ipv4Addr::new(0, 0, 0, 0), DEFAULT_PORT),
        };
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    // One of critical, error, warn, info, debug, trace
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        return LogConfig {
            level: "info".to_string(),
        };
    }
}

impl LogConfig {
    pub fn level(&self) -> Result<slog::Level, LoadError> {
        if self.level.eq_ignore_ascii_case("off") {
            return Err(LoadError::Level(self.level.clone()));
        }
        return slog::Level::from_str(&self.level)
            .map_err(|_| LoadError::Level(self.level.clone()));
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AllocationConfig {
    // Find-then-create rounds before giving up with AllocationContention
    pub max_attempts: u32,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        return AllocationConfig {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        };
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// DISCOVERED rows not seen for this many days are purged periodically.
    /// Unset disables the background purge.
    pub retention_days: Option<u32>,
    #[serde(with = "serde_millis")]
    pub purge_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        return DiscoveryConfig {
            retention_days: None,
            purge_interval: Duration::from_secs(60 * 60),
        };
    }
}

impl Config {
    /// Load a `Config` from a TOML file. Missing sections and fields take
    /// their defaults.
    pub fn from_file(path: &Path) -> Result<Config, LoadError> {
        let contents = std::fs::read_to_string(path).map_err(|err| LoadError::Io {
            path: path.into(),
            err: err,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|err| LoadError::Parse {
            path: path.into(),
            err: err,
        })?;
        config.log.level()?;
        if config.discovery.purge_interval.is_zero() {
            return Err(LoadError::PurgeInterval);
        }
        return Ok(config);
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("error reading {path:?}: {err}")]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("error parsing {path:?}: {err}")]
    Parse {
        path: PathBuf,
        #[source]
        err: toml::de::Error,
    },
    #[error("unknown log level {0:?}")]
    Level(String),
    #[error("discovery.purge_interval must be greater than zero")]
    PurgeInterval,
}
