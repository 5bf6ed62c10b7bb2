use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::StickyOptions;
use crate::{Error, Result};

pub const DEFAULT_LISTENER: &str = "0.0.0.0:8090";

/// Configuration settings for the gateway.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP front door listens on.
    pub listener: SocketAddr,

    /// Endpoints of the session dispatch service, tried in order.
    pub dispatch_urls: Vec<String>,
    /// Directory holding the repository JSON documents.
    pub data_dir: PathBuf,

    /// Plan under which application tokens are built.
    pub aat_plan: AatPlan,
    /// Timeout applied to every outgoing dispatch and relay request.
    pub request_timeout_secs: u64,

    pub session: SessionCacheConfig,
    pub sticky: StickySettings,
    pub chain_check: ChainCheckConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listener: SocketAddr::from(([0, 0, 0, 0], 8090)),
            dispatch_urls: vec![],
            data_dir: PathBuf::from("/tmp"),
            aat_plan: AatPlan::default(),
            request_timeout_secs: 20,
            session: SessionCacheConfig::default(),
            sticky: StickySettings::default(),
            chain_check: ChainCheckConfig::default(),
        }
    }
}

impl Config {
    /// Reads configuration from a toml file. Missing fields take their
    /// default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        debug!("loaded config from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.ttl_secs == 0 {
            return Err(Error::InvalidConfig("session ttl must be non-zero".to_owned()));
        }
        if self.chain_check.max_in_flight == 0 {
            return Err(Error::InvalidConfig(
                "chain check max_in_flight must be non-zero".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AatPlan {
    #[default]
    Freemium,
    Premium,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionCacheConfig {
    /// Time a dispatched session is served from cache.
    pub ttl_secs: u64,
    /// Upper bound on the number of cached sessions.
    pub max_entries: usize,
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            max_entries: 10_000,
        }
    }
}

impl SessionCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Gateway-wide sticky affinity policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StickySettings {
    /// Length of the rolling window of both the relay and the error counter.
    pub duration_secs: u64,
    /// Relays allowed within a window before the preference is dropped.
    pub relay_limit: u32,
    /// Errors allowed within a window before the preference is dropped.
    pub max_errors: u32,
    /// Options applied when a load balancer carries no options of its own.
    pub default_options: StickyOptions,
}

impl Default for StickySettings {
    fn default() -> Self {
        Self {
            duration_secs: 60,
            relay_limit: 100,
            max_errors: 5,
            default_options: StickyOptions::default(),
        }
    }
}

impl StickySettings {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainCheckConfig {
    /// Maximum number of identity probes in flight for a single check.
    pub max_in_flight: usize,
}

impl Default for ChainCheckConfig {
    fn default() -> Self {
        Self { max_in_flight: 32 }
    }
}
