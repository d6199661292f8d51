//! Selection semantics end to end: selector validation, infrastructure
//! filtering, and the guarantee that usage errors never reach a backend.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use labfleet_core::{
    execute_fleet, CommandOutput, CredentialPatch, ExecutionBackend, ExecutionRequest,
    FleetError, FleetOptions, FleetPayload, InMemoryDirectory, Node, Outcome, OutputFormat,
    Result, Settings, TargetSelection,
};

/// Backend that records whether it was ever touched.
#[derive(Default)]
struct SpyBackend {
    calls: AtomicU32,
}

impl SpyBackend {
    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionBackend for SpyBackend {
    async fn run_command(&self, _cmd: &str, _timeout: Duration) -> Result<CommandOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CommandOutput {
            exit_code: 0,
            stdout: "ok".into(),
            stderr: String::new(),
        })
    }

    async fn upload_file(&self, _local: &Path, _remote: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upload_tree(&self, _local_dir: &Path, _remote: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ensure_dir(&self, _path: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn lab() -> InMemoryDirectory {
    InMemoryDirectory::new(vec![
        Node::new("leaf1", "srlinux", "10.0.0.2", "lab1"),
        Node::new("leaf2", "srlinux", "10.0.0.3", "lab1"),
        Node::new("host1", "linux", "10.0.0.10", "lab1"),
        Node::new("br0", "bridge", "", "lab1"),
    ])
}

fn exec_request(cmd: &str) -> ExecutionRequest {
    ExecutionRequest {
        payload: FleetPayload::Command(cmd.to_string()),
        timeout: Duration::from_secs(5),
        format: OutputFormat::Text,
    }
}

async fn run(
    selection: TargetSelection,
    backend: Arc<SpyBackend>,
) -> Result<labfleet_core::FleetReport> {
    execute_fleet(
        &lab(),
        &Settings::default(),
        backend,
        "lab1",
        &selection,
        CredentialPatch::default(),
        &exec_request("show version"),
        &FleetOptions::default(),
    )
    .await
}

#[tokio::test]
async fn test_selector_flag_validation_fails_closed() {
    assert!(matches!(
        TargetSelection::from_flags(None, None, None, false),
        Err(FleetError::MissingSelection)
    ));
    assert!(matches!(
        TargetSelection::from_flags(Some("leaf1".into()), Some("srlinux".into()), None, false),
        Err(FleetError::AmbiguousSelection)
    ));
    assert!(matches!(
        TargetSelection::from_flags(None, None, Some(vec!["leaf1".into()]), true),
        Err(FleetError::AmbiguousSelection)
    ));
}

#[tokio::test]
async fn test_empty_selection_never_reaches_the_backend() {
    let backend = Arc::new(SpyBackend::default());
    let err = run(TargetSelection::ByKind("ceos".into()), Arc::clone(&backend))
        .await
        .unwrap_err();

    assert!(matches!(err, FleetError::NoMatchingNodes { .. }));
    assert!(err.is_usage_error());
    assert_eq!(backend.call_count(), 0, "backend was invoked for a usage error");
}

#[tokio::test]
async fn test_all_resolves_only_addressable_nodes() {
    // 3 addressable nodes and 1 bridge: exactly 3 results.
    let backend = Arc::new(SpyBackend::default());
    let report = run(TargetSelection::All, Arc::clone(&backend)).await.unwrap();

    let names: Vec<_> = report.reports.iter().map(|r| r.node.as_str()).collect();
    assert_eq!(names, vec!["leaf1", "leaf2", "host1"]);
    assert_eq!(report.summary.succeeded, 3);
}

#[tokio::test]
async fn test_unmapped_kind_fails_only_its_own_node() {
    let directory = InMemoryDirectory::new(vec![
        Node::new("leaf1", "srlinux", "10.0.0.2", "lab1"),
        Node::new("sw1", "ceos", "10.0.0.9", "lab1"),
    ]);
    let backend = Arc::new(SpyBackend::default());

    let report = execute_fleet(
        &directory,
        &Settings::default(),
        Arc::clone(&backend) as Arc<dyn ExecutionBackend>,
        "lab1",
        &TargetSelection::All,
        CredentialPatch::default(),
        &exec_request("show version"),
        &FleetOptions::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.reports[0].outcome, Outcome::Success);
    match &report.reports[1].outcome {
        Outcome::Failure(reason) => assert!(reason.contains("no vendor driver")),
        other => panic!("expected vendor mapping failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_exec_command_is_wrapped_for_the_vendor_cli() {
    // The srlinux driver hands the operational command to sr_cli over ssh.
    let backend = Arc::new(SpyBackend::default());
    let report = run(
        TargetSelection::Single("leaf1".into()),
        Arc::clone(&backend),
    )
    .await
    .unwrap();

    assert_eq!(report.reports.len(), 1);
    assert_eq!(report.reports[0].outcome, Outcome::Success);
    assert_eq!(report.reports[0].output, "ok");
    assert_eq!(backend.call_count(), 1);
}
