//! Vendor drivers.
//!
//! A driver adapts one device family to the uniform capability set the
//! lifecycle controller relies on: execute, stage, diff, validate,
//! apply, commit, rollback. Families without native staging emulate it
//! (snapshot before, restore on error) rather than omitting it, so the
//! controller never special-cases a vendor.
//!
//! Drivers are selected by mapping a node's `kind` through a glob
//! pattern table. An unmapped kind is a configuration error raised
//! before any connection is attempted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::backend::{CommandOutput, ExecutionBackend};
use crate::credentials::{Credential, CredentialBook, CredentialPatch};
use crate::domain::{FleetError, LoadMethod, Node, Result};

pub mod linux;
pub mod srlinux;

pub use linux::LinuxDriver;
pub use srlinux::SrlinuxDriver;

/// A configuration payload, either carried inline or already on the
/// device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPayload {
    /// Payload text read from an operator-side file.
    pub content: Option<String>,
    /// Path of a file already present on the device.
    pub device_path: Option<String>,
}

impl ConfigPayload {
    pub fn inline(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            device_path: None,
        }
    }

    pub fn on_device(path: impl Into<String>) -> Self {
        Self {
            content: None,
            device_path: Some(path.into()),
        }
    }
}

/// Handle to a staged-but-not-active configuration on one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedConfig {
    pub node: String,
    /// Device-side path of the staged payload.
    pub staged_path: String,
    /// Pre-change snapshot captured at staging time, the rollback anchor.
    pub snapshot: String,
    pub method: LoadMethod,
}

/// Outcome of a non-mutating validation pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub ok: bool,
    pub detail: String,
}

/// Receipt for a finalized configuration change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitReceipt {
    pub committed_at: DateTime<Utc>,
    pub comment: Option<String>,
    pub detail: String,
}

/// Which snapshot a rollback restores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackTarget {
    /// The most recent snapshot.
    Latest,
    /// A named snapshot.
    Snapshot(String),
}

/// Uniform per-device-family capability set.
#[async_trait]
pub trait VendorDriver: Send + Sync {
    /// Vendor identifier this driver implements.
    fn vendor(&self) -> &'static str;

    /// Run a single operational (non-configuration) command.
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput>;

    /// Stage a payload on the device without activating it. Captures the
    /// pre-change snapshot the returned handle anchors rollback to.
    async fn load_config(
        &self,
        payload: &ConfigPayload,
        method: LoadMethod,
        timeout: Duration,
    ) -> Result<StagedConfig>;

    /// Textual diff of the staged payload against the running config.
    async fn diff(&self, staged: &StagedConfig, timeout: Duration) -> Result<String>;

    /// Validate the staged payload without any device state change.
    /// Idempotent: repeated calls see the same staged state.
    async fn dry_run_validate(
        &self,
        staged: &StagedConfig,
        timeout: Duration,
    ) -> Result<ValidationReport>;

    /// Activate the staged change. The snapshot stays valid until commit.
    async fn apply(&self, staged: &StagedConfig, timeout: Duration) -> Result<()>;

    /// Finalize the change atomically.
    async fn commit(
        &self,
        staged: &StagedConfig,
        comment: Option<&str>,
        timeout: Duration,
    ) -> Result<CommitReceipt>;

    /// Restore a prior snapshot.
    async fn rollback(&self, target: &RollbackTarget, timeout: Duration) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Device shell
// ---------------------------------------------------------------------------

/// Runs commands on a device's management plane by invoking `ssh` on the
/// execution backend host with the node's resolved credential.
#[derive(Clone)]
pub struct DeviceShell {
    backend: Arc<dyn ExecutionBackend>,
    credential: Credential,
    node: Node,
}

impl DeviceShell {
    pub fn new(backend: Arc<dyn ExecutionBackend>, credential: Credential, node: Node) -> Self {
        Self {
            backend,
            credential,
            node,
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node.name
    }

    /// Compose the host-side ssh invocation for one device command.
    fn ssh_command(&self, device_cmd: &str) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.credential.private_key.is_none() {
            if let Some(password) = &self.credential.password {
                parts.push(format!("sshpass -p '{}'", password.replace('\'', r"'\''")));
            }
        }
        parts.push("ssh -o StrictHostKeyChecking=no -o UserKnownHostsFile=/dev/null".into());
        parts.push(format!("-o ConnectTimeout={}", self.credential.connect_timeout_secs));
        parts.push(format!("-p {}", self.credential.port));
        if let Some(key) = &self.credential.private_key {
            parts.push(format!("-i '{}'", key.to_string_lossy()));
        }
        parts.push(format!(
            "{}@{}",
            self.credential.username, self.node.mgmt_addr
        ));
        parts.push(format!("'{}'", device_cmd.replace('\'', r"'\''")));
        parts.join(" ")
    }

    /// Run one command on the device, returning the captured output.
    pub async fn run(&self, device_cmd: &str, timeout: Duration) -> Result<CommandOutput> {
        self.backend
            .run_command(&self.ssh_command(device_cmd), timeout)
            .await
    }

    /// Like [`run`](Self::run), but a non-zero exit becomes an error.
    pub async fn run_checked(&self, device_cmd: &str, timeout: Duration) -> Result<CommandOutput> {
        let out = self.run(device_cmd, timeout).await?;
        if out.success() {
            Ok(out)
        } else {
            Err(FleetError::CommandFailed {
                exit_code: out.exit_code,
                stderr: out.stderr,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Vendor mapping
// ---------------------------------------------------------------------------

/// Kind-pattern → vendor identifier table; first match wins.
#[derive(Debug, Clone)]
pub struct VendorMap {
    patterns: Vec<(String, String)>,
}

impl VendorMap {
    /// The builtin table.
    pub fn builtin() -> Self {
        Self {
            patterns: [
                ("srl*", "srlinux"),
                ("nokia_srl*", "srlinux"),
                ("linux", "linux"),
                ("frr*", "linux"),
                ("host", "linux"),
            ]
            .iter()
            .map(|(p, v)| (p.to_string(), v.to_string()))
            .collect(),
        }
    }

    /// Builtin table with operator overrides taking precedence.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut patterns: Vec<(String, String)> = overrides
            .iter()
            .map(|(p, v)| (p.clone(), v.clone()))
            .collect();
        patterns.extend(Self::builtin().patterns);
        Self { patterns }
    }

    /// Vendor for a kind, or `None` when no pattern matches.
    pub fn vendor_for(&self, kind: &str) -> Option<&str> {
        self.patterns
            .iter()
            .find(|(pattern, _)| glob_match(pattern, kind))
            .map(|(_, vendor)| vendor.as_str())
    }
}

/// Match `value` against a glob pattern supporting `*` and `?`.
fn glob_match(pattern: &str, value: &str) -> bool {
    let mut regex = String::with_capacity(pattern.len() + 4);
    regex.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    // Patterns are tiny and operator-authored; compile on the fly.
    Regex::new(&regex).map(|re| re.is_match(value)).unwrap_or(false)
}

/// Build the driver for one node.
///
/// Resolves the vendor from the node's kind (error before any
/// connection when unmapped), overlays credentials, and instantiates the
/// vendor's driver over the shared backend.
pub fn driver_for_node(
    node: &Node,
    backend: Arc<dyn ExecutionBackend>,
    map: &VendorMap,
    credentials: &CredentialBook,
    overrides: &CredentialPatch,
) -> Result<Arc<dyn VendorDriver>> {
    let vendor = map
        .vendor_for(&node.kind)
        .ok_or_else(|| FleetError::VendorMapping {
            kind: node.kind.clone(),
        })?;
    let credential = credentials.resolve(vendor, overrides);
    let shell = DeviceShell::new(backend, credential, node.clone());

    Ok(match vendor {
        "srlinux" => Arc::new(SrlinuxDriver::new(shell)),
        "linux" => Arc::new(LinuxDriver::new(shell)),
        other => {
            return Err(FleetError::VendorMapping {
                kind: format!("{} (mapped to unknown vendor '{other}')", node.kind),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match_star_and_question() {
        assert!(glob_match("srl*", "srlinux"));
        assert!(glob_match("srl*", "srl"));
        assert!(glob_match("ceos?", "ceos1"));
        assert!(!glob_match("ceos?", "ceos"));
        assert!(!glob_match("srl*", "linux"));
    }

    #[test]
    fn test_builtin_map_covers_shipped_kinds() {
        let map = VendorMap::builtin();
        assert_eq!(map.vendor_for("srlinux"), Some("srlinux"));
        assert_eq!(map.vendor_for("nokia_srlinux"), Some("srlinux"));
        assert_eq!(map.vendor_for("linux"), Some("linux"));
        assert_eq!(map.vendor_for("frr"), Some("linux"));
        assert_eq!(map.vendor_for("ceos"), None);
    }

    #[test]
    fn test_overrides_take_precedence() {
        let mut overrides = BTreeMap::new();
        overrides.insert("srl*".to_string(), "linux".to_string());
        overrides.insert("ceos*".to_string(), "linux".to_string());
        let map = VendorMap::with_overrides(&overrides);
        assert_eq!(map.vendor_for("srlinux"), Some("linux"));
        assert_eq!(map.vendor_for("ceos2"), Some("linux"));
    }

    #[test]
    fn test_unmapped_kind_is_a_vendor_mapping_error() {
        let node = Node::new("sw1", "ceos", "10.0.0.9", "lab1");
        let backend: Arc<dyn ExecutionBackend> = Arc::new(crate::backend::LocalBackend::new());
        let err = driver_for_node(
            &node,
            backend,
            &VendorMap::builtin(),
            &CredentialBook::default(),
            &CredentialPatch::default(),
        )
        .err()
        .unwrap();
        match err {
            FleetError::VendorMapping { kind } => assert_eq!(kind, "ceos"),
            other => panic!("expected VendorMapping, got {other:?}"),
        }
    }

    #[test]
    fn test_ssh_command_uses_password_via_sshpass() {
        let node = Node::new("leaf1", "srlinux", "10.0.0.2", "lab1");
        let cred = Credential {
            password: Some("secret".into()),
            ..Default::default()
        };
        let shell = DeviceShell::new(Arc::new(crate::backend::LocalBackend::new()), cred, node);
        let cmd = shell.ssh_command("show version");
        assert!(cmd.starts_with("sshpass -p 'secret' ssh"));
        assert!(cmd.contains("admin@10.0.0.2"));
        assert!(cmd.ends_with("'show version'"));
    }

    #[test]
    fn test_ssh_command_prefers_key_over_password() {
        let node = Node::new("leaf1", "srlinux", "10.0.0.2", "lab1");
        let cred = Credential {
            password: Some("secret".into()),
            private_key: Some("/keys/lab".into()),
            port: 2022,
            ..Default::default()
        };
        let shell = DeviceShell::new(Arc::new(crate::backend::LocalBackend::new()), cred, node);
        let cmd = shell.ssh_command("show version");
        assert!(!cmd.contains("sshpass"));
        assert!(cmd.contains("-i '/keys/lab'"));
        assert!(cmd.contains("-p 2022"));
    }
}
