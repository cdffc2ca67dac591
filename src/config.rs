//! Configuration loading.
//!
//! The binary reads a YAML file describing one tunnel assignment: where the
//! relay is listening for this client and how to reach the local service.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;

const CONFIG_ENV: &str = "PORTHOLE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "porthole.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Number of pairings kept alive against the relay.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Wait between local connect attempts, and before replacing a pairing
    /// that never reached the relay.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    pub tunnel: PairerConfig,
}

/// Settings for a single pairing of one relay connection with one local
/// connection. Immutable once handed to a pairer.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PairerConfig {
    /// Preferred over `remote_host` when the relay hands out an address.
    #[serde(default)]
    pub remote_ip: Option<String>,
    /// Relay host name.
    pub remote_host: String,
    /// Port the relay assigned to this client.
    pub remote_port: u16,

    /// Host of the local service. When set it is also written into the
    /// first `Host` header of each pairing.
    #[serde(default)]
    pub local_host: Option<String>,
    pub local_port: u16,

    /// Speak TLS to the local service.
    #[serde(default)]
    pub local_https: bool,
    /// PEM client certificate chain. Requires `local_key`.
    #[serde(default)]
    pub local_cert: Option<PathBuf>,
    /// PEM private key for `local_cert`.
    #[serde(default)]
    pub local_key: Option<PathBuf>,
    /// PEM bundle trusted instead of the Web PKI roots.
    #[serde(default)]
    pub local_ca: Option<PathBuf>,
    /// Skip certificate verification of the local service. No client
    /// certificate is sent in this mode.
    #[serde(default)]
    pub allow_invalid_cert: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_connections() -> usize {
    10
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Config {
    /// Loads the file named by `PORTHOLE_CONFIG`, or `porthole.yaml` in the
    /// working directory.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV)
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::from_file(path)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(raw).context("Failed to parse YAML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_connections == 0 {
            bail!("max_connections must be at least 1");
        }
        if self.log_level.parse::<tracing::Level>().is_err() {
            bail!("unknown log_level {:?}", self.log_level);
        }
        self.tunnel.validate()
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Parsed `log_level`, falling back to INFO.
    pub fn level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

impl PairerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.remote_host.is_empty() && self.remote_ip.is_none() {
            bail!("tunnel.remote_host is required");
        }
        if self.remote_port == 0 {
            bail!("tunnel.remote_port must be non-zero");
        }
        if self.local_port == 0 {
            bail!("tunnel.local_port must be non-zero");
        }
        if self.local_cert.is_some() != self.local_key.is_some() {
            bail!("tunnel.local_cert and tunnel.local_key must be set together");
        }
        Ok(())
    }

    /// Address dialed for the relay connection.
    pub fn remote_addr(&self) -> (&str, u16) {
        let host = self.remote_ip.as_deref().unwrap_or(&self.remote_host);
        (host, self.remote_port)
    }

    /// Address dialed for the local connection.
    pub fn local_addr(&self) -> (&str, u16) {
        (self.local_host.as_deref().unwrap_or("localhost"), self.local_port)
    }

    /// Value written into the Host header, if rewriting is enabled.
    pub fn host_override(&self) -> Option<&str> {
        self.local_host.as_deref()
    }

    pub fn local_scheme(&self) -> &'static str {
        if self.local_https { "https" } else { "http" }
    }
}
