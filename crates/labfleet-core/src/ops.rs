//! Fleet operation orchestration.
//!
//! Glue between the CLI and the moving parts: resolve the target set,
//! prepare the payload once, then fan the per-node operation out
//! through the fleet engine. Driver construction happens inside each
//! node's operation, after selection and settings validation but before
//! any connection for that node is attempted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::backend::ExecutionBackend;
use crate::credentials::{CredentialBook, CredentialPatch};
use crate::directory::NodeDirectory;
use crate::domain::{
    ConfigSource, ExecutionRequest, FleetError, FleetPayload, LoadMethod, Node, Result,
    UploadSource,
};
use crate::driver::{driver_for_node, ConfigPayload, RollbackTarget, VendorMap};
use crate::fleet::{run_fleet, FleetOptions, FleetReport};
use crate::lifecycle::LifecycleController;
use crate::settings::Settings;
use crate::target::{resolve_targets, TargetSelection};

/// Payload with all operator-host file reads already done, safe to
/// clone into every worker.
#[derive(Clone)]
enum PreparedPayload {
    Command(String),
    Config {
        payload: ConfigPayload,
        method: LoadMethod,
        want_diff: bool,
        dry_run: bool,
        comment: Option<String>,
    },
    ConfigRollback,
    Upload {
        source: UploadSource,
        dest: PathBuf,
    },
}

/// Everything one node operation needs, shared read-only across workers.
#[derive(Clone)]
struct NodeOp {
    backend: Arc<dyn ExecutionBackend>,
    vendor_map: Arc<VendorMap>,
    credentials: Arc<CredentialBook>,
    overrides: Arc<CredentialPatch>,
    payload: PreparedPayload,
    timeout: Duration,
    auto_rollback: bool,
}

impl NodeOp {
    async fn run(self, node: Node) -> Result<String> {
        match &self.payload {
            PreparedPayload::Upload { source, dest } => self.upload(&node, source, dest).await,
            _ => self.device_op(node).await,
        }
    }

    async fn device_op(self, node: Node) -> Result<String> {
        let driver = driver_for_node(
            &node,
            Arc::clone(&self.backend),
            &self.vendor_map,
            &self.credentials,
            &self.overrides,
        )?;

        match self.payload {
            PreparedPayload::Command(cmd) => {
                let out = driver.execute(&cmd, self.timeout).await?;
                if out.success() {
                    Ok(out.text().to_string())
                } else {
                    Err(FleetError::CommandFailed {
                        exit_code: out.exit_code,
                        stderr: out.stderr,
                    })
                }
            }
            PreparedPayload::Config {
                payload,
                method,
                want_diff,
                dry_run,
                comment,
            } => {
                let controller =
                    LifecycleController::new(driver, self.auto_rollback, self.timeout);
                controller
                    .run_change(&node, &payload, method, want_diff, dry_run, comment)
                    .await
            }
            PreparedPayload::ConfigRollback => {
                driver.rollback(&RollbackTarget::Latest, self.timeout).await?;
                Ok("rolled back to latest snapshot".to_string())
            }
            PreparedPayload::Upload { .. } => unreachable!("handled in run"),
        }
    }

    /// Uploads land under a per-node directory so a fleet-wide upload
    /// never has nodes clobbering each other.
    async fn upload(&self, node: &Node, source: &UploadSource, dest: &PathBuf) -> Result<String> {
        let node_dest = dest.join(&node.name);
        self.backend.ensure_dir(&node_dest).await?;
        match source {
            UploadSource::File(local) => {
                let file_name = local
                    .file_name()
                    .ok_or_else(|| FleetError::Validation("source has no file name".into()))?;
                let target = node_dest.join(file_name);
                self.backend.upload_file(local, &target).await?;
                Ok(format!("uploaded {} -> {}", local.display(), target.display()))
            }
            UploadSource::Tree(local_dir) => {
                self.backend.upload_tree(local_dir, &node_dest).await?;
                Ok(format!(
                    "uploaded tree {} -> {}",
                    local_dir.display(),
                    node_dest.display()
                ))
            }
        }
    }
}

fn prepare(request: &ExecutionRequest) -> Result<PreparedPayload> {
    Ok(match &request.payload {
        FleetPayload::Command(cmd) => PreparedPayload::Command(cmd.clone()),
        FleetPayload::Config(plan) => match &plan.source {
            ConfigSource::Rollback => PreparedPayload::ConfigRollback,
            ConfigSource::File(path) => PreparedPayload::Config {
                payload: ConfigPayload::inline(std::fs::read_to_string(path)?),
                method: plan.method,
                want_diff: plan.diff,
                dry_run: plan.dry_run,
                comment: plan.comment.clone(),
            },
            ConfigSource::DeviceFile(path) => PreparedPayload::Config {
                payload: ConfigPayload::on_device(path.to_string_lossy().into_owned()),
                method: plan.method,
                want_diff: plan.diff,
                dry_run: plan.dry_run,
                comment: plan.comment.clone(),
            },
        },
        FleetPayload::Upload(plan) => PreparedPayload::Upload {
            source: plan.source.clone(),
            dest: plan.dest.clone(),
        },
    })
}

/// Resolve the selection and run the request across the resulting
/// target set. Selection and payload-preparation errors abort before
/// any backend operation; per-node errors only mark their own slot.
pub async fn execute_fleet(
    directory: &dyn NodeDirectory,
    settings: &Settings,
    backend: Arc<dyn ExecutionBackend>,
    lab: &str,
    selection: &TargetSelection,
    credential_overrides: CredentialPatch,
    request: &ExecutionRequest,
    options: &FleetOptions,
) -> Result<FleetReport> {
    let targets = resolve_targets(directory, lab, selection).await?;
    let payload = prepare(request)?;

    info!(
        lab,
        targets = targets.len(),
        parallel = options.parallel,
        max_workers = options.max_workers,
        "starting fleet operation"
    );

    let op = NodeOp {
        backend,
        vendor_map: Arc::new(VendorMap::with_overrides(&settings.vendor_map)),
        credentials: Arc::new(settings.credentials.clone()),
        overrides: Arc::new(credential_overrides),
        payload,
        timeout: request.timeout,
        auto_rollback: settings.fleet.auto_rollback,
    };

    Ok(run_fleet(targets, options, move |node| {
        let op = op.clone();
        async move { op.run(node).await }
    })
    .await)
}
