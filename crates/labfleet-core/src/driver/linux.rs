//! Linux driver.
//!
//! Plain Linux nodes have no candidate datastore, so staging is
//! emulated: the payload lands in a staging file, a snapshot of the
//! active config is taken before anything is applied, and rollback
//! restores that snapshot. The lifecycle controller sees the exact same
//! capability surface as a native-staging vendor.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::{
    CommitReceipt, ConfigPayload, DeviceShell, RollbackTarget, StagedConfig, ValidationReport,
    VendorDriver,
};
use crate::backend::CommandOutput;
use crate::domain::{FleetError, LoadMethod, Result};

const ACTIVE: &str = "/etc/labfleet/config.sh";
const COMMITTED: &str = "/etc/labfleet/config.committed.sh";

pub struct LinuxDriver {
    shell: DeviceShell,
}

impl LinuxDriver {
    pub fn new(shell: DeviceShell) -> Self {
        Self { shell }
    }

    fn staged_path(&self) -> String {
        format!("/tmp/labfleet-{}-staged.sh", self.shell.node_name())
    }

    fn snapshot_path(&self) -> String {
        format!("/tmp/labfleet-{}-snap.sh", self.shell.node_name())
    }
}

#[async_trait]
impl VendorDriver for LinuxDriver {
    fn vendor(&self) -> &'static str {
        "linux"
    }

    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        self.shell.run(command, timeout).await
    }

    async fn load_config(
        &self,
        payload: &ConfigPayload,
        method: LoadMethod,
        timeout: Duration,
    ) -> Result<StagedConfig> {
        let staged_path = match (&payload.content, &payload.device_path) {
            (Some(content), _) => {
                let path = self.staged_path();
                self.shell
                    .run_checked(
                        &format!("cat > {path} << 'LABFLEET_EOF'\n{content}\nLABFLEET_EOF"),
                        timeout,
                    )
                    .await?;
                path
            }
            (None, Some(path)) => path.clone(),
            (None, None) => {
                return Err(FleetError::Validation(
                    "configuration payload is empty".into(),
                ))
            }
        };

        let snapshot = self.snapshot_path();
        // Snapshot-before-apply: guarantee the active config exists, then
        // copy it aside as the restore point.
        self.shell
            .run_checked(
                &format!(
                    "mkdir -p /etc/labfleet && touch {ACTIVE} && cp {ACTIVE} {snapshot}"
                ),
                timeout,
            )
            .await?;

        debug!(node = self.shell.node_name(), %staged_path, "staged configuration");
        Ok(StagedConfig {
            node: self.shell.node_name().to_string(),
            staged_path,
            snapshot,
            method,
        })
    }

    async fn diff(&self, staged: &StagedConfig, timeout: Duration) -> Result<String> {
        let out = self
            .shell
            .run(
                &format!("diff -u {ACTIVE} {} || true", staged.staged_path),
                timeout,
            )
            .await?;
        if !out.success() {
            return Err(FleetError::CommandFailed {
                exit_code: out.exit_code,
                stderr: out.stderr,
            });
        }
        Ok(out.stdout)
    }

    async fn dry_run_validate(
        &self,
        staged: &StagedConfig,
        timeout: Duration,
    ) -> Result<ValidationReport> {
        // Syntax check only; touches nothing on the device.
        let out = self
            .shell
            .run(&format!("sh -n {}", staged.staged_path), timeout)
            .await?;
        Ok(ValidationReport {
            ok: out.success(),
            detail: out.text().trim().to_string(),
        })
    }

    async fn apply(&self, staged: &StagedConfig, timeout: Duration) -> Result<()> {
        let cmd = match staged.method {
            LoadMethod::Merge => {
                format!(
                    "cat {staged} >> {ACTIVE} && sh {staged}",
                    staged = staged.staged_path
                )
            }
            LoadMethod::Override | LoadMethod::Replace => {
                format!(
                    "cp {staged} {ACTIVE} && sh {ACTIVE}",
                    staged = staged.staged_path
                )
            }
        };
        self.shell.run_checked(&cmd, timeout).await?;
        Ok(())
    }

    async fn commit(
        &self,
        _staged: &StagedConfig,
        comment: Option<&str>,
        timeout: Duration,
    ) -> Result<CommitReceipt> {
        self.shell
            .run_checked(&format!("cp {ACTIVE} {COMMITTED}"), timeout)
            .await?;
        Ok(CommitReceipt {
            committed_at: Utc::now(),
            comment: comment.map(str::to_string),
            detail: format!("saved {COMMITTED}"),
        })
    }

    async fn rollback(&self, target: &RollbackTarget, timeout: Duration) -> Result<()> {
        let snapshot = match target {
            RollbackTarget::Latest => self.snapshot_path(),
            RollbackTarget::Snapshot(path) => path.clone(),
        };
        self.shell
            .run_checked(
                &format!("cp {snapshot} {ACTIVE} && sh {ACTIVE}"),
                timeout,
            )
            .await?;
        Ok(())
    }
}
