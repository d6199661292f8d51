//! Credential resolution.
//!
//! A connection profile for a node is assembled by overlay, most
//! specific last-word first: explicit per-call overrides beat the
//! vendor-specific defaults, which beat the global defaults. The
//! resolved [`Credential`] is read-only afterwards and shared freely
//! across workers.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A complete connection profile for one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: Option<String>,
    /// Path to a private key file; used instead of the password when set.
    pub private_key: Option<PathBuf>,
    pub port: u16,
    /// Timeout for establishing a connection (seconds).
    pub connect_timeout_secs: u64,
    /// Default timeout for a single command (seconds).
    pub command_timeout_secs: u64,
}

impl Default for Credential {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: None,
            private_key: None,
            port: 22,
            connect_timeout_secs: 10,
            command_timeout_secs: 30,
        }
    }
}

/// A partial credential: only the fields it wants to override.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialPatch {
    pub username: Option<String>,
    pub password: Option<String>,
    pub private_key: Option<PathBuf>,
    pub port: Option<u16>,
    pub connect_timeout_secs: Option<u64>,
    pub command_timeout_secs: Option<u64>,
}

impl CredentialPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn apply_to(&self, cred: &mut Credential) {
        if let Some(username) = &self.username {
            cred.username = username.clone();
        }
        if let Some(password) = &self.password {
            cred.password = Some(password.clone());
        }
        if let Some(key) = &self.private_key {
            cred.private_key = Some(key.clone());
        }
        if let Some(port) = self.port {
            cred.port = port;
        }
        if let Some(secs) = self.connect_timeout_secs {
            cred.connect_timeout_secs = secs;
        }
        if let Some(secs) = self.command_timeout_secs {
            cred.command_timeout_secs = secs;
        }
    }
}

/// Global defaults plus per-vendor patches, as loaded from settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialBook {
    #[serde(default)]
    pub default: Credential,
    /// Keyed by vendor identifier (`srlinux`, `linux`, ...).
    #[serde(default)]
    pub vendor: BTreeMap<String, CredentialPatch>,
}

impl CredentialBook {
    /// Resolve the connection profile for a node of the given vendor.
    pub fn resolve(&self, vendor: &str, overrides: &CredentialPatch) -> Credential {
        let mut cred = self.default.clone();
        if let Some(patch) = self.vendor.get(vendor) {
            patch.apply_to(&mut cred);
        }
        overrides.apply_to(&mut cred);
        cred
    }
}
