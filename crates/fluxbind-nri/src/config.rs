//! Plugin configuration
//!
//! Sources, lowest precedence first: built-in defaults, an optional config
//! file, `FLUXBIND_NRI_*` environment variables, command-line flags.

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use fluxbind_lib::affinity::DEFAULT_ENV_PREFIX;
use fluxbind_lib::stub::StubConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    /// Name registered with the runtime
    #[serde(default = "default_plugin_name")]
    pub plugin_name: String,

    /// Two-digit index ordering this plugin among others
    #[serde(default = "default_plugin_idx")]
    pub plugin_idx: String,

    /// Runtime NRI socket
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Prefix of the `<PREFIX>_CPUSET` hint variables
    #[serde(default = "default_env_prefix")]
    pub env_prefix: String,

    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: u64,

    /// Health/metrics port, 0 disables the server
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_plugin_name() -> String {
    "fluxbind".to_string()
}

fn default_plugin_idx() -> String {
    "01".to_string()
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/var/run/nri/nri.sock")
}

fn default_env_prefix() -> String {
    DEFAULT_ENV_PREFIX.to_string()
}

fn default_reconnect_interval() -> u64 {
    5
}

fn default_api_port() -> u16 {
    8080
}

/// Flags that take precedence over file and environment.
#[derive(Debug, Clone, Default, Args)]
pub struct Overrides {
    /// Plugin name to register with
    #[arg(long)]
    pub name: Option<String>,

    /// Plugin index to register with (two digits)
    #[arg(long)]
    pub idx: Option<String>,

    /// NRI socket of the container runtime
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Health/metrics port (0 disables)
    #[arg(long)]
    pub api_port: Option<u16>,

    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,
}

impl PluginConfig {
    /// Load from an optional file and the environment, then apply flags.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(config::Environment::with_prefix("FLUXBIND_NRI"));

        let mut config = Self::from_builder(builder)?;
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    fn apply(&mut self, overrides: &Overrides) {
        if let Some(name) = &overrides.name {
            self.plugin_name = name.clone();
        }
        if let Some(idx) = &overrides.idx {
            self.plugin_idx = idx.clone();
        }
        if let Some(socket) = &overrides.socket {
            self.socket_path = socket.clone();
        }
        if let Some(port) = overrides.api_port {
            self.api_port = port;
        }
        if let Some(format) = overrides.log_format {
            self.log_format = format;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.plugin_name.is_empty() {
            bail!("plugin_name must not be empty");
        }
        if self.plugin_idx.len() != 2 || !self.plugin_idx.bytes().all(|b| b.is_ascii_digit()) {
            bail!("plugin_idx must be two digits, got {:?}", self.plugin_idx);
        }
        if self.env_prefix.is_empty() {
            bail!("env_prefix must not be empty");
        }
        if self.reconnect_interval_secs == 0 {
            bail!("reconnect_interval_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    pub fn stub_config(&self) -> StubConfig {
        StubConfig {
            plugin_name: self.plugin_name.clone(),
            plugin_idx: self.plugin_idx.clone(),
            ..StubConfig::default()
        }
    }
}
