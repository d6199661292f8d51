//! Execution backends.
//!
//! One capability contract, two implementations: [`LocalBackend`] runs
//! against the operator's own host, [`RemoteBackend`] relays every
//! operation through an SSH session to a configured remote host. Which
//! one is used is decided exactly once per CLI invocation; workers share
//! the chosen backend but never a connection.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::Result;
use crate::settings::Settings;

pub mod local;
pub mod remote;

pub use local::LocalBackend;
pub use remote::RemoteBackend;

/// Captured output of one command run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout, falling back to stderr when stdout is empty.
    pub fn text(&self) -> &str {
        if self.stdout.is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Uniform host-execution contract.
///
/// Every method is one logical operation: implementations may open and
/// tear down transport state per call, but must release it on every
/// exit path, including errors and timeouts.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Run a shell command, bounded by `timeout`.
    ///
    /// Exceeding the timeout is [`crate::FleetError::Timeout`] and the
    /// underlying connection is forcibly closed.
    async fn run_command(&self, cmd: &str, timeout: Duration) -> Result<CommandOutput>;

    /// Copy a single file to `remote`.
    async fn upload_file(&self, local: &Path, remote: &Path) -> Result<()>;

    /// Recursively copy a directory tree under `remote`.
    async fn upload_tree(&self, local_dir: &Path, remote: &Path) -> Result<()>;

    /// Create a directory (and parents) if it does not exist.
    async fn ensure_dir(&self, path: &Path) -> Result<()>;
}

/// Where backend operations execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    Local,
    Remote,
}

/// Pick the backend for this invocation.
///
/// An explicit mode wins; otherwise remote is used iff the settings
/// enable a remote host. Decided once, never per node.
pub fn select_backend(
    explicit: Option<BackendMode>,
    settings: &Settings,
) -> Result<Arc<dyn ExecutionBackend>> {
    let mode = explicit.unwrap_or(if settings.remote.enabled {
        BackendMode::Remote
    } else {
        BackendMode::Local
    });

    Ok(match mode {
        BackendMode::Local => Arc::new(LocalBackend::new()),
        BackendMode::Remote => Arc::new(RemoteBackend::new(settings.remote.clone())?),
    })
}
