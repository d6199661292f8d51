//! Operator settings.
//!
//! One TOML file covers the remote execution host, default and
//! per-vendor credentials, vendor-map overrides, and fleet defaults.
//! Every field has a serde default so a missing or empty file yields a
//! fully usable configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::credentials::CredentialBook;
use crate::domain::{FleetError, Result};

/// Remote execution host configuration.
///
/// When `enabled`, all backend operations run on this host over SSH
/// instead of on the operator's own machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteHostSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub private_key: Option<PathBuf>,
    /// Escalate commands with sudo on the remote host.
    #[serde(default)]
    pub use_sudo: bool,
    /// Sudo password, distinct from the login password.
    #[serde(default)]
    pub sudo_password: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for RemoteHostSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: default_ssh_port(),
            username: String::new(),
            password: None,
            private_key: None,
            use_sudo: false,
            sudo_password: None,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Fleet engine defaults, overridable per invocation from the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FleetSettings {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_node_timeout")]
    pub node_timeout_secs: u64,
    /// Roll the device back automatically when apply or commit fails.
    #[serde(default = "default_auto_rollback")]
    pub auto_rollback: bool,
}

fn default_max_workers() -> usize {
    5
}

fn default_node_timeout() -> u64 {
    30
}

fn default_auto_rollback() -> bool {
    true
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            node_timeout_secs: default_node_timeout(),
            auto_rollback: default_auto_rollback(),
        }
    }
}

/// Top-level settings document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub remote: RemoteHostSettings,
    #[serde(default)]
    pub credentials: CredentialBook,
    /// Extra kind-pattern → vendor entries, merged over the builtin map.
    #[serde(default)]
    pub vendor_map: BTreeMap<String, String>,
    #[serde(default)]
    pub fleet: FleetSettings,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse a TOML settings document.
    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| FleetError::Settings(e.to_string()))
    }

    /// Load from an explicit path, or defaults when none is given.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}
