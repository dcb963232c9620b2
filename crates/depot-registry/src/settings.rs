use std::path::{Path, PathBuf};
use std::time::Duration;

use depot_fetch::ClientOptions;
use depot_resource::RegistryConfig;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;

use crate::{Result, RetryPolicy};

/// Prefix of environment variables that override file settings,
/// e.g. `DEPOT_NAME` or `DEPOT_HTTP__TIMEOUT_SECS`.
pub const ENV_PREFIX: &str = "DEPOT_";

fn default_connect_timeout() -> u64 {
    10
}

fn default_timeout() -> u64 {
    300
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Everything a registry process reads at startup.
///
/// ```toml
/// name = "updates"
/// mirrors = ["https://a.example.com/", "https://b.example.com/"]
/// storage_root = "/var/lib/depot/store"
/// scratch_dir = "/var/lib/depot/scratch"
/// max_attempts = 8
///
/// [http]
/// timeout_secs = 120
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(flatten)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// Where installed versions are recorded; kept in memory when unset.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    #[serde(default)]
    pub http: HttpSettings,
}

impl Settings {
    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        match self.max_attempts {
            Some(max) => RetryPolicy::new(max),
            None => Ok(RetryPolicy::default_for(self.registry.mirrors())),
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: Duration::from_secs(self.http.connect_timeout_secs),
            timeout: Duration::from_secs(self.http.timeout_secs),
            ..ClientOptions::default()
        }
    }
}

/// Read `path` (when given), then let `DEPOT_*` variables override it.
pub fn load_config(path: Option<&Path>) -> Result<Settings> {
    let mut figment = Figment::new();
    if let Some(path) = path {
        figment = figment.merge(Toml::file_exact(path));
    }
    let settings = figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract()?;
    Ok(settings)
}
