//! labfleet core library
//!
//! Fleet command-and-configuration execution for emulated network labs:
//! target resolution, credential overlay, local/remote execution
//! backends, vendor drivers, bounded-concurrency fan-out, and the
//! configuration change lifecycle.

pub mod backend;
pub mod credentials;
pub mod directory;
pub mod domain;
pub mod driver;
pub mod fleet;
pub mod lifecycle;
pub mod ops;
pub mod report;
pub mod settings;
pub mod target;
pub mod telemetry;

pub use backend::{
    select_backend, BackendMode, CommandOutput, ExecutionBackend, LocalBackend, RemoteBackend,
};
pub use credentials::{Credential, CredentialBook, CredentialPatch};
pub use directory::{InMemoryDirectory, NodeDirectory};
pub use domain::{
    ConfigPlan, ConfigSource, ExecutionRequest, FleetError, FleetPayload, LoadMethod, Node,
    OutputFormat, Result, UploadPlan, UploadSource,
};
pub use driver::{
    driver_for_node, CommitReceipt, ConfigPayload, DeviceShell, LinuxDriver, RollbackTarget,
    SrlinuxDriver, StagedConfig, ValidationReport, VendorDriver, VendorMap,
};
pub use fleet::{run_fleet, FleetOptions, FleetReport, FleetSummary, NodeReport, Outcome};
pub use lifecycle::{ConfigChangeSession, LifecycleController, LifecycleState};
pub use ops::execute_fleet;
pub use report::{exit_code, render};
pub use settings::{FleetSettings, RemoteHostSettings, Settings};
pub use target::{resolve_targets, TargetSelection};
pub use telemetry::init_tracing;

/// labfleet version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
