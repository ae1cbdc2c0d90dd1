use std::{path::Path, time::Duration};

use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File, FileFormat};
use serde_derive::{Deserialize, Serialize};

use crate::error::Result;

const DEFAULT_TIMEOUT_SECS: u64 = 5;

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MongoSettings {
    pub uri: String,
    #[serde(default)]
    pub ping: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Serialize, Deserialize)]
struct Settings {
    mongodb: MongoSettings,
}

impl MongoSettings {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ping: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Loads the `[mongodb]` table of a config file, overridden by
    /// `MONGODB__*` environment variables (`MONGODB__URI`, `MONGODB__PING`).
    pub fn load(config_path: &Path) -> Result<Self> {
        Self::build(
            Config::builder().add_source(File::from(config_path)),
            Self::environment(),
        )
    }

    /// Parses the `[mongodb]` table of a TOML document. The environment is not
    /// consulted.
    pub fn from_toml(content: &str) -> Result<Self> {
        let s = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        Ok(s.try_deserialize::<Settings>()?.mongodb)
    }

    /// Reads the settings from `MONGODB__*` environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::build(Config::builder(), Self::environment())
    }

    fn build(builder: ConfigBuilder<DefaultState>, environment: Environment) -> Result<Self> {
        let s = builder.add_source(environment).build()?;

        Ok(s.try_deserialize::<Settings>()?.mongodb)
    }

    fn environment() -> Environment {
        Environment::with_prefix("mongodb")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .keep_prefix(true)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
