//! Local execution backend.
//!
//! Runs commands on the operator's own host via `tokio::process` and
//! copies files with plain filesystem operations.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;
use walkdir::WalkDir;

use super::{CommandOutput, ExecutionBackend};
use crate::domain::{FleetError, Result};

/// Backend executing directly on the local host.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
    async fn run_command(&self, cmd: &str, timeout: Duration) -> Result<CommandOutput> {
        debug!(cmd, "running local command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                // kill_on_drop reaps the process when the future is dropped.
                return Err(FleetError::Timeout {
                    elapsed_ms: timeout.as_millis() as u64,
                });
            }
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn upload_file(&self, local: &Path, remote: &Path) -> Result<()> {
        if let Some(parent) = remote.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(local, remote).await?;
        Ok(())
    }

    async fn upload_tree(&self, local_dir: &Path, remote: &Path) -> Result<()> {
        for entry in WalkDir::new(local_dir) {
            let entry = entry.map_err(|e| {
                FleetError::Io(e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "walk failed")
                }))
            })?;
            let rel = entry
                .path()
                .strip_prefix(local_dir)
                .expect("walkdir yields paths under its root");
            let dest = remote.join(rel);
            if entry.file_type().is_dir() {
                tokio::fs::create_dir_all(&dest).await?;
            } else if entry.file_type().is_file() {
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::copy(entry.path(), &dest).await?;
            }
        }
        Ok(())
    }

    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }
}
