//! Configuration change lifecycle.
//!
//! Wraps a single node's configuration change in a state machine:
//! `Staged → Validated → Applied → Committed`, with non-mutating diff
//! and dry-run excursions, `Failed` reachable from anywhere, and
//! `RolledBack` from `Applied`. Transitions fail closed: committing a
//! session that was never validated is an [`InvalidLifecycleTransition`]
//! and performs no device mutation at all.
//!
//! A session is an owned value scoped to one CLI invocation; it is
//! committed or torn down before the call returns, never leaked
//! mid-lifecycle.
//!
//! [`InvalidLifecycleTransition`]: crate::FleetError::InvalidLifecycleTransition

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::{FleetError, LoadMethod, Node, Result};
use crate::driver::{
    CommitReceipt, ConfigPayload, RollbackTarget, StagedConfig, ValidationReport, VendorDriver,
};

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Staged,
    Validated,
    Applied,
    Committed,
    RolledBack,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Staged => "staged",
            LifecycleState::Validated => "validated",
            LifecycleState::Applied => "applied",
            LifecycleState::Committed => "committed",
            LifecycleState::RolledBack => "rolled-back",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One node's in-flight configuration change.
#[derive(Debug, Clone)]
pub struct ConfigChangeSession {
    pub node: Node,
    pub comment: Option<String>,
    staged: StagedConfig,
    state: LifecycleState,
}

impl ConfigChangeSession {
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// The pre-change snapshot this session can roll back to.
    pub fn snapshot(&self) -> &str {
        &self.staged.snapshot
    }
}

/// Drives sessions through the lifecycle against one vendor driver.
pub struct LifecycleController {
    driver: Arc<dyn VendorDriver>,
    auto_rollback: bool,
    timeout: Duration,
}

impl LifecycleController {
    pub fn new(driver: Arc<dyn VendorDriver>, auto_rollback: bool, timeout: Duration) -> Self {
        Self {
            driver,
            auto_rollback,
            timeout,
        }
    }

    fn transition_error(state: LifecycleState, action: &str) -> FleetError {
        FleetError::InvalidLifecycleTransition {
            from: state.to_string(),
            action: action.to_string(),
        }
    }

    /// Stage a payload, capturing the rollback snapshot. The returned
    /// session starts in `Staged`.
    pub async fn stage(
        &self,
        node: &Node,
        payload: &ConfigPayload,
        method: LoadMethod,
        comment: Option<String>,
    ) -> Result<ConfigChangeSession> {
        let staged = self.driver.load_config(payload, method, self.timeout).await?;
        info!(node = %node.name, "configuration staged");
        Ok(ConfigChangeSession {
            node: node.clone(),
            comment,
            staged,
            state: LifecycleState::Staged,
        })
    }

    /// Validate the staged payload. A rejected payload moves the session
    /// to `Failed` and surfaces the device's detail.
    pub async fn validate(&self, session: &mut ConfigChangeSession) -> Result<ValidationReport> {
        if !matches!(
            session.state,
            LifecycleState::Staged | LifecycleState::Validated
        ) {
            return Err(Self::transition_error(session.state, "validate"));
        }

        let report = self
            .driver
            .dry_run_validate(&session.staged, self.timeout)
            .await?;
        if report.ok {
            session.state = LifecycleState::Validated;
            Ok(report)
        } else {
            session.state = LifecycleState::Failed;
            Err(FleetError::Validation(report.detail.clone()))
        }
    }

    /// Non-mutating dry run; never changes session state, so repeated
    /// calls on the same staged payload give identical results.
    pub async fn dry_run(&self, session: &ConfigChangeSession) -> Result<ValidationReport> {
        if matches!(session.state, LifecycleState::Failed) {
            return Err(Self::transition_error(session.state, "dry-run"));
        }
        self.driver
            .dry_run_validate(&session.staged, self.timeout)
            .await
    }

    /// Textual diff of the staged change; non-mutating.
    pub async fn diff(&self, session: &ConfigChangeSession) -> Result<String> {
        if matches!(session.state, LifecycleState::Failed) {
            return Err(Self::transition_error(session.state, "diff"));
        }
        self.driver.diff(&session.staged, self.timeout).await
    }

    /// Activate the staged change. Requires `Validated`. On failure,
    /// auto-rollback (when configured) restores the staging snapshot
    /// before the original error surfaces.
    pub async fn apply(&self, session: &mut ConfigChangeSession) -> Result<()> {
        if session.state != LifecycleState::Validated {
            return Err(Self::transition_error(session.state, "apply"));
        }

        match self.driver.apply(&session.staged, self.timeout).await {
            Ok(()) => {
                session.state = LifecycleState::Applied;
                info!(node = %session.node.name, "configuration applied");
                Ok(())
            }
            Err(err) => Err(self.recover(session, err).await),
        }
    }

    /// Finalize the change. Only valid from `Applied` (which implies a
    /// prior successful validation); anything else fails closed without
    /// touching the device.
    pub async fn commit(&self, session: &mut ConfigChangeSession) -> Result<CommitReceipt> {
        if session.state != LifecycleState::Applied {
            return Err(Self::transition_error(session.state, "commit"));
        }

        match self
            .driver
            .commit(&session.staged, session.comment.as_deref(), self.timeout)
            .await
        {
            Ok(receipt) => {
                session.state = LifecycleState::Committed;
                info!(node = %session.node.name, "configuration committed");
                Ok(receipt)
            }
            Err(err) => Err(self.recover(session, err).await),
        }
    }

    /// Explicit rollback to the staging snapshot, valid from `Applied`.
    pub async fn rollback(&self, session: &mut ConfigChangeSession) -> Result<()> {
        if session.state != LifecycleState::Applied {
            return Err(Self::transition_error(session.state, "rollback"));
        }
        self.restore(session).await?;
        session.state = LifecycleState::RolledBack;
        Ok(())
    }

    /// Handle an apply/commit failure: one rollback attempt when
    /// configured, then surface the original error. A rollback that
    /// itself fails escalates instead, because the device state is now
    /// unknown.
    async fn recover(
        &self,
        session: &mut ConfigChangeSession,
        original: FleetError,
    ) -> FleetError {
        if !self.auto_rollback {
            session.state = LifecycleState::Failed;
            return original;
        }

        warn!(node = %session.node.name, error = %original, "change failed, rolling back");
        match self.restore(session).await {
            Ok(()) => {
                session.state = LifecycleState::RolledBack;
                original
            }
            Err(rollback_err) => {
                session.state = LifecycleState::Failed;
                rollback_err
            }
        }
    }

    async fn restore(&self, session: &ConfigChangeSession) -> Result<()> {
        self.driver
            .rollback(
                &RollbackTarget::Snapshot(session.staged.snapshot.clone()),
                self.timeout,
            )
            .await
            .map_err(|err| FleetError::RollbackFailure {
                node: session.node.name.clone(),
                reason: err.to_string(),
            })
    }

    /// Run the standard pipeline for one node: stage, validate,
    /// optionally diff, then either stop (dry run) or apply and commit.
    /// Returns the rendered per-node output.
    pub async fn run_change(
        &self,
        node: &Node,
        payload: &ConfigPayload,
        method: LoadMethod,
        want_diff: bool,
        dry_run: bool,
        comment: Option<String>,
    ) -> Result<String> {
        let mut session = self.stage(node, payload, method, comment).await?;
        let validation = self.validate(&mut session).await?;

        let mut output = String::new();
        if want_diff {
            let diff = self.diff(&session).await?;
            if !diff.is_empty() {
                output.push_str(&diff);
                if !diff.ends_with('\n') {
                    output.push('\n');
                }
            }
        }

        if dry_run {
            output.push_str(&format!("dry-run ok: {}", validation.detail));
            return Ok(output);
        }

        self.apply(&mut session).await?;
        let receipt = self.commit(&mut session).await?;
        output.push_str(&format!(
            "committed at {}{}",
            receipt.committed_at.to_rfc3339(),
            receipt
                .comment
                .as_deref()
                .map(|c| format!(" ({c})"))
                .unwrap_or_default()
        ));
        Ok(output)
    }
}
