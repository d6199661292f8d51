//! labfleet — fleet command-and-configuration CLI for emulated labs.
//!
//! ## Commands
//!
//! - `node exec`: run an operational command across a target set
//! - `node config`: drive a configuration change through the
//!   stage/validate/apply/commit lifecycle, with diff and dry-run
//! - `node upload`: copy files or directory trees to the targets
//!
//! The process exits non-zero when any node operation fails, even if
//! the others succeeded; structured output always carries per-node
//! detail so partial failure is distinguishable from total failure.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::Level;

use labfleet_core::{
    execute_fleet, exit_code, init_tracing, render, select_backend, BackendMode, ConfigPlan,
    ConfigSource, CredentialPatch, ExecutionRequest, FleetOptions, FleetPayload,
    InMemoryDirectory, LoadMethod, OutputFormat, Settings, TargetSelection, UploadPlan,
    UploadSource,
};

#[derive(Parser)]
#[command(name = "labfleet")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fleet command and configuration execution for emulated network labs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Summary-only output (rollback failures are still shown)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Lab identifier
    #[arg(long, global = true, default_value = "default")]
    lab: String,

    /// Exported lab inventory (JSON array of node records)
    #[arg(long, global = true)]
    lab_file: Option<PathBuf>,

    /// Settings file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Force the remote execution backend
    #[arg(long, global = true, conflicts_with = "local")]
    remote: bool,

    /// Force the local execution backend
    #[arg(long, global = true)]
    local: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Operate on lab nodes
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
}

/// Mutually-exclusive target selectors.
#[derive(Args)]
struct SelectorArgs {
    /// A single node by name
    #[arg(long)]
    node: Option<String>,

    /// Every node of one kind
    #[arg(long)]
    kind: Option<String>,

    /// Comma-separated list of node names
    #[arg(long, value_delimiter = ',')]
    nodes: Option<Vec<String>>,

    /// Every addressable node in the lab
    #[arg(long)]
    all: bool,
}

impl SelectorArgs {
    fn into_selection(self) -> Result<TargetSelection> {
        Ok(TargetSelection::from_flags(
            self.node, self.kind, self.nodes, self.all,
        )?)
    }
}

/// Per-call credential overrides, applied over vendor and global
/// defaults.
#[derive(Args)]
struct CredentialArgs {
    /// Override the login username
    #[arg(long)]
    username: Option<String>,

    /// Override the login password
    #[arg(long)]
    password: Option<String>,

    /// Override the private key path
    #[arg(long)]
    private_key: Option<PathBuf>,

    /// Override the management port
    #[arg(long)]
    ssh_port: Option<u16>,
}

impl CredentialArgs {
    fn into_patch(self) -> CredentialPatch {
        CredentialPatch {
            username: self.username,
            password: self.password,
            private_key: self.private_key,
            port: self.ssh_port,
            ..Default::default()
        }
    }
}

#[derive(Args)]
struct FleetArgs {
    /// Run node operations concurrently
    #[arg(long)]
    parallel: bool,

    /// Worker bound when --parallel is set
    #[arg(long)]
    max_workers: Option<usize>,

    /// Per-node timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum NodeAction {
    /// Run an operational command on the target set
    Exec {
        #[command(flatten)]
        selectors: SelectorArgs,

        #[command(flatten)]
        credentials: CredentialArgs,

        #[command(flatten)]
        fleet: FleetArgs,

        /// Command to run on each node
        #[arg(short, long)]
        command: String,

        /// Output rendering
        #[arg(long, value_enum, default_value = "text")]
        output_format: OutputFormat,
    },

    /// Push a configuration change through the validated lifecycle
    Config {
        #[command(flatten)]
        selectors: SelectorArgs,

        #[command(flatten)]
        credentials: CredentialArgs,

        #[command(flatten)]
        fleet: FleetArgs,

        /// Configuration file on the operator host
        #[arg(long, conflicts_with_all = ["device_file", "rollback"])]
        file: Option<PathBuf>,

        /// Configuration file already on the device
        #[arg(long, conflicts_with = "rollback")]
        device_file: Option<PathBuf>,

        /// Restore the most recent snapshot instead of pushing config
        #[arg(long)]
        rollback: bool,

        /// How the payload combines with the running config
        #[arg(long, value_enum, default_value = "merge")]
        method: LoadMethod,

        /// Validate only, never apply
        #[arg(long)]
        dry_run: bool,

        /// Show the staged diff
        #[arg(long)]
        diff: bool,

        /// Commit comment
        #[arg(long)]
        comment: Option<String>,

        /// Output rendering
        #[arg(long, value_enum, default_value = "text")]
        output_format: OutputFormat,
    },

    /// Upload a file or directory tree to the targets
    Upload {
        #[command(flatten)]
        selectors: SelectorArgs,

        #[command(flatten)]
        credentials: CredentialArgs,

        #[command(flatten)]
        fleet: FleetArgs,

        /// Source file
        #[arg(long, conflicts_with = "source_dir")]
        source: Option<PathBuf>,

        /// Source directory tree
        #[arg(long)]
        source_dir: Option<PathBuf>,

        /// Destination directory on the execution host
        #[arg(long)]
        dest: PathBuf,

        /// Output rendering
        #[arg(long, value_enum, default_value = "text")]
        output_format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, cli.quiet, level);

    let settings = Settings::load_or_default(cli.config.as_deref())
        .context("failed to load settings")?;

    let backend_mode = if cli.remote {
        Some(BackendMode::Remote)
    } else if cli.local {
        Some(BackendMode::Local)
    } else {
        None
    };

    let lab_file = cli
        .lab_file
        .as_deref()
        .context("no lab inventory supplied (use --lab-file)")?;
    let raw = std::fs::read_to_string(lab_file)
        .with_context(|| format!("failed to read lab inventory {}", lab_file.display()))?;
    let directory = InMemoryDirectory::from_json(&raw)
        .context("failed to parse lab inventory")?;

    let Commands::Node { action } = cli.command;
    let (selectors, credentials, fleet, payload, format) = match action {
        NodeAction::Exec {
            selectors,
            credentials,
            fleet,
            command,
            output_format,
        } => (
            selectors,
            credentials,
            fleet,
            FleetPayload::Command(command),
            output_format,
        ),
        NodeAction::Config {
            selectors,
            credentials,
            fleet,
            file,
            device_file,
            rollback,
            method,
            dry_run,
            diff,
            comment,
            output_format,
        } => {
            let source = match (file, device_file, rollback) {
                (Some(path), _, _) => ConfigSource::File(path),
                (None, Some(path), _) => ConfigSource::DeviceFile(path),
                (None, None, true) => ConfigSource::Rollback,
                (None, None, false) => {
                    anyhow::bail!("one of --file, --device-file or --rollback is required")
                }
            };
            (
                selectors,
                credentials,
                fleet,
                FleetPayload::Config(ConfigPlan {
                    source,
                    method,
                    dry_run,
                    diff,
                    comment,
                }),
                output_format,
            )
        }
        NodeAction::Upload {
            selectors,
            credentials,
            fleet,
            source,
            source_dir,
            dest,
            output_format,
        } => {
            let source = match (source, source_dir) {
                (Some(path), _) => UploadSource::File(path),
                (None, Some(path)) => UploadSource::Tree(path),
                (None, None) => anyhow::bail!("one of --source or --source-dir is required"),
            };
            (
                selectors,
                credentials,
                fleet,
                FleetPayload::Upload(UploadPlan { source, dest }),
                output_format,
            )
        }
    };

    let selection = selectors.into_selection()?;
    let timeout = Duration::from_secs(
        fleet
            .timeout
            .unwrap_or(settings.fleet.node_timeout_secs),
    );
    let options = FleetOptions {
        parallel: fleet.parallel,
        max_workers: fleet.max_workers.unwrap_or(settings.fleet.max_workers),
        global_budget: None,
    };
    let request = ExecutionRequest {
        payload,
        timeout,
        format,
    };

    // Backend selection is one decision per invocation; constructing it
    // here also fails fast on incomplete remote settings.
    let backend = select_backend(backend_mode, &settings)?;

    let report = execute_fleet(
        &directory,
        &settings,
        Arc::clone(&backend),
        &cli.lab,
        &selection,
        credentials.into_patch(),
        &request,
        &options,
    )
    .await?;

    print!("{}", render(&report, request.format, cli.quiet));

    let code = exit_code(&report);
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
