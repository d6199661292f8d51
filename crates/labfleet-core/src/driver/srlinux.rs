//! SR Linux driver.
//!
//! Drives devices with a native candidate datastore through `sr_cli` on
//! the management plane. Staging uses a private candidate, the rollback
//! anchor is a device checkpoint saved before anything is loaded.

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

const CANDIDATE: &str = "labfleet";
const CHECKPOINT: &str = "labfleet-pre";

pub struct SrlinuxDriver {
    shell: DeviceShell,
}

impl SrlinuxDriver {
    pub fn new(shell: DeviceShell) -> Self {
        Self { shell }
    }

    fn load_verb(method: LoadMethod) -> &'static str {
        match method {
            // `source` replays set-commands into the candidate (merge
            // semantics); `load file` swaps the whole candidate in.
            LoadMethod::Merge | LoadMethod::Override => "source",
            LoadMethod::Replace => "load file",
        }
    }

    fn candidate_session(&self, name: &str, staged: &StagedConfig, tail: &str) -> String {
        format!(
            "sr_cli -ec \"enter candidate private name {name} ; {} {} ; {tail} ; discard now\"",
            Self::load_verb(staged.method),
            staged.staged_path,
        )
    }
}

#[async_trait]
impl VendorDriver for SrlinuxDriver {
    fn vendor(&self) -> &'static str {
        "srlinux"
    }

    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        self.shell
            .run(&format!("sr_cli -ec \"{command}\""), timeout)
            .await
    }

    async fn load_config(
        &self,
        payload: &ConfigPayload,
        method: LoadMethod,
        timeout: Duration,
    ) -> Result<StagedConfig> {
        let staged_path = match (&payload.content, &payload.device_path) {
            (Some(content), _) => {
                let path = format!("/tmp/labfleet-{}.cfg", self.shell.node_name());
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

        // Checkpoint first: the rollback anchor must exist before the
        // candidate ever touches the device.
        self.shell
            .run_checked(
                &format!("sr_cli -ec \"save checkpoint name {CHECKPOINT}\""),
                timeout,
            )
            .await?;

        debug!(node = self.shell.node_name(), %staged_path, "staged configuration");
        Ok(StagedConfig {
            node: self.shell.node_name().to_string(),
            staged_path,
            snapshot: CHECKPOINT.to_string(),
            method,
        })
    }

    async fn diff(&self, staged: &StagedConfig, timeout: Duration) -> Result<String> {
        let out = self
            .shell
            .run_checked(&self.candidate_session("labfleet-diff", staged, "diff"), timeout)
            .await?;
        Ok(out.stdout)
    }

    async fn dry_run_validate(
        &self,
        staged: &StagedConfig,
        timeout: Duration,
    ) -> Result<ValidationReport> {
        // The throwaway candidate is discarded inside the session, so
        // repeated validations always see the same staged payload.
        let out = self
            .shell
            .run(
                &self.candidate_session("labfleet-validate", staged, "validate"),
                timeout,
            )
            .await?;
        Ok(ValidationReport {
            ok: out.success(),
            detail: out.text().trim().to_string(),
        })
    }

    async fn apply(&self, staged: &StagedConfig, timeout: Duration) -> Result<()> {
        self.shell
            .run_checked(
                &format!(
                    "sr_cli -ec \"enter candidate private name {CANDIDATE} ; {} {} ; commit stay\"",
                    Self::load_verb(staged.method),
                    staged.staged_path,
                ),
                timeout,
            )
            .await?;
        Ok(())
    }

    async fn commit(
        &self,
        _staged: &StagedConfig,
        comment: Option<&str>,
        timeout: Duration,
    ) -> Result<CommitReceipt> {
        let out = self
            .shell
            .run_checked("sr_cli -ec \"save startup\"", timeout)
            .await?;
        Ok(CommitReceipt {
            committed_at: Utc::now(),
            comment: comment.map(str::to_string),
            detail: out.stdout.trim().to_string(),
        })
    }

    async fn rollback(&self, target: &RollbackTarget, timeout: Duration) -> Result<()> {
        let name = match target {
            RollbackTarget::Latest => CHECKPOINT,
            RollbackTarget::Snapshot(name) => name.as_str(),
        };
        self.shell
            .run_checked(
                &format!("sr_cli -ec \"load checkpoint name {name} ; commit now\""),
                timeout,
            )
            .await?;
        Ok(())
    }
}
