// ABOUTME: Configuration types and parsing for rolling-replacer.yml.
// ABOUTME: Merges the optional file with CLI overrides into resolved settings.

mod env_value;

pub use env_value::EnvValue;

use crate::error::{Error, Result};
use crate::gateway::{Endpoint, Fixture, HttpGateway, MemoryGateway, ResourceGateway};
use crate::pipeline::{Poller, WaitLimit};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "rolling-replacer.yml";
pub const CONFIG_FILENAME_ALT: &str = "rolling-replacer.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".rolling-replacer/config.yml";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Contents of the config file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub gateway: Option<GatewayConfig>,

    #[serde(default, with = "humantime_serde")]
    pub poll_interval: Option<Duration>,

    #[serde(default)]
    pub wait_timeout: Option<WaitLimit>,

    #[serde(default)]
    pub lock: Option<bool>,
}

/// Where the gateway lives. At most one of `endpoint`, `socket`, `fixture`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub socket: Option<PathBuf>,
    #[serde(default)]
    pub fixture: Option<PathBuf>,
    #[serde(default)]
    pub token: Option<EnvValue>,
}

impl FileConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load the first config file found in `dir`, if any.
    pub fn discover(dir: &Path) -> Result<Option<(PathBuf, Self)>> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in candidates {
            if path.exists() {
                let config = Self::load(&path)?;
                return Ok(Some((path, config)));
            }
        }

        Ok(None)
    }
}

/// Values given on the command line; they win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub socket: Option<PathBuf>,
    pub fixture: Option<PathBuf>,
    pub wait_timeout: Option<WaitLimit>,
    pub poll_interval: Option<Duration>,
}

impl Overrides {
    fn gateway(&self) -> Option<GatewayConfig> {
        if self.endpoint.is_none() && self.socket.is_none() && self.fixture.is_none() {
            return None;
        }
        Some(GatewayConfig {
            endpoint: self.endpoint.clone(),
            socket: self.socket.clone(),
            fixture: self.fixture.clone(),
            token: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewaySource {
    Http {
        endpoint: Endpoint,
        token: Option<String>,
    },
    Fixture(PathBuf),
}

impl GatewaySource {
    fn resolve(config: &GatewayConfig, token: Option<&EnvValue>, base_dir: &Path) -> Result<Self> {
        let token = token.map(EnvValue::resolve).transpose()?;

        match (&config.endpoint, &config.socket, &config.fixture) {
            (Some(url), None, None) => Ok(GatewaySource::Http {
                endpoint: Endpoint::http(url)?,
                token,
            }),
            (None, Some(socket), None) => Ok(GatewaySource::Http {
                endpoint: Endpoint::Unix(base_dir.join(socket)),
                token,
            }),
            (None, None, Some(fixture)) => Ok(GatewaySource::Fixture(base_dir.join(fixture))),
            (None, None, None) => Err(Error::NoGateway),
            _ => Err(Error::InvalidConfig(
                "gateway takes only one of endpoint, socket or fixture".to_string(),
            )),
        }
    }

    pub fn open(&self) -> Result<Arc<dyn ResourceGateway>> {
        match self {
            GatewaySource::Http { endpoint, token } => {
                let mut gateway = HttpGateway::new(endpoint.clone());
                if let Some(token) = token {
                    gateway = gateway.with_token(token);
                }
                Ok(Arc::new(gateway))
            }
            GatewaySource::Fixture(path) => {
                let fixture = Fixture::load(path)?;
                Ok(Arc::new(MemoryGateway::from_fixture(fixture)))
            }
        }
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub gateway: GatewaySource,
    pub poll_interval: Duration,
    pub wait_limit: WaitLimit,
    pub lock: bool,
}

impl Settings {
    /// Merge the file (paths in it relative to `base_dir`) with CLI overrides.
    ///
    /// The wait limit has no default and must come from one of the two.
    pub fn resolve(file: FileConfig, overrides: Overrides, base_dir: &Path) -> Result<Self> {
        let file_token = file.gateway.as_ref().and_then(|g| g.token.clone());

        let gateway = match overrides.gateway() {
            Some(cli) => GatewaySource::resolve(&cli, file_token.as_ref(), Path::new(""))?,
            None => {
                let config = file.gateway.ok_or(Error::NoGateway)?;
                GatewaySource::resolve(&config, config.token.as_ref(), base_dir)?
            }
        };

        let poll_interval = overrides
            .poll_interval
            .or(file.poll_interval)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        if poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "poll_interval must be greater than zero".to_string(),
            ));
        }

        let wait_limit = overrides
            .wait_timeout
            .or(file.wait_timeout)
            .ok_or(Error::MissingWaitTimeout)?;

        Ok(Self {
            gateway,
            poll_interval,
            wait_limit,
            lock: file.lock.unwrap_or(true),
        })
    }

    pub fn poller(&self) -> Poller {
        Poller::new(self.poll_interval, self.wait_limit)
    }
}
