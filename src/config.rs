//! On-disk client configuration.
//!
//! Profiles live in `client.toml` under the menmos config root:
//!
//! ```toml
//! [profiles.default]
//! host = "http://localhost:3030"
//! username = "admin"
//! password = "password"
//! ```

use std::{
    collections::HashMap,
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    providers::{Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const CONFIG_DIR_NAME: &str = "menmos";
const CONFIG_FILE_NAME: &str = "client.toml";
const CONFIG_DIR_ENV: &str = "MENMOS_CONFIG_DIR";

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("operating environment provides no directory for configuration")]
    NoConfigDir,

    #[error("failed to load client configuration from {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: Box<figment::Error>,
    },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },
}

/// Connection details for one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl Profile {
    /// Loads a single profile from the default config location.
    pub fn load(name: &str) -> Result<Profile, ConfigError> {
        Config::load_default()?.profile(name).cloned()
    }
}

/// The on-disk configuration of a menmos client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Config {
    /// Reads the config at `path`. A missing file is an empty config.
    pub fn from_path(path: &Path) -> Result<Config, ConfigError> {
        Figment::new()
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| ConfigError::Load {
                path: path.to_path_buf(),
                source: Box::new(e),
            })
    }

    pub fn load_default() -> Result<Config, ConfigError> {
        Self::from_path(&default_config_path()?)
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.to_string(),
            })
    }
}

/// Returns the menmos config root.
///
/// `$MENMOS_CONFIG_DIR` wins when set, otherwise `<user config dir>/menmos`.
pub fn config_root() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let cfg = dirs_next::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(cfg.join(CONFIG_DIR_NAME))
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_root()?.join(CONFIG_FILE_NAME))
}

/// Everything needed to build a [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    /// Per-request deadline enforced by the transport. `None` waits forever.
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            timeout: None,
            user_agent: default_user_agent(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl From<Profile> for ClientConfig {
    fn from(profile: Profile) -> Self {
        ClientConfig::new(profile.host, profile.username, profile.password)
    }
}

pub(crate) fn default_user_agent() -> String {
    format!("menmos-client/{}", env!("CARGO_PKG_VERSION"))
}
