//! Fleet execution engine.
//!
//! Runs one operation per target node with bounded concurrency, one
//! spawned task per node, each owning its own backend connections. Node
//! failures, timeouts and panics never touch sibling work. Results are
//! slotted by target index, so the report always has the same
//! cardinality and order as the resolved target list no matter when
//! each node finished.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::domain::{FleetError, Node, Result};

/// Terminal outcome of one node's operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(String),
    TimedOut,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure(_) => "failure",
            Outcome::TimedOut => "timed-out",
        }
    }
}

/// What happened on one node. Produced once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub node: String,
    pub outcome: Outcome,
    /// Raw command output, rendered diff, or failure detail.
    pub output: String,
    pub elapsed: Duration,
    /// The failure was a rollback that itself failed, leaving the device
    /// in an indeterminate state. Renderers must never suppress these.
    pub rollback_failure: bool,
}

/// Aggregate counts, produced even when every node fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FleetSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl FleetSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.timed_out
    }
}

/// Full result of one fleet invocation, reports in target order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetReport {
    pub reports: Vec<NodeReport>,
    pub summary: FleetSummary,
}

impl FleetReport {
    pub fn has_failures(&self) -> bool {
        self.summary.failed > 0 || self.summary.timed_out > 0
    }

    fn from_reports(reports: Vec<NodeReport>) -> Self {
        let mut summary = FleetSummary::default();
        for report in &reports {
            match report.outcome {
                Outcome::Success => summary.succeeded += 1,
                Outcome::Failure(_) => summary.failed += 1,
                Outcome::TimedOut => summary.timed_out += 1,
            }
        }
        Self { reports, summary }
    }
}

/// Scheduling knobs for one fleet invocation.
#[derive(Debug, Clone)]
pub struct FleetOptions {
    /// Run nodes concurrently; when off, strictly sequential in target
    /// order.
    pub parallel: bool,
    /// Worker bound when parallel.
    pub max_workers: usize,
    /// Optional wall-clock budget for the whole invocation. Unset means
    /// wait for every scheduled node.
    pub global_budget: Option<Duration>,
}

impl Default for FleetOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            max_workers: 5,
            global_budget: None,
        }
    }
}

fn report_for(node: &str, started: Instant, result: Result<String>) -> NodeReport {
    let elapsed = started.elapsed();
    match result {
        Ok(output) => NodeReport {
            node: node.to_string(),
            outcome: Outcome::Success,
            output,
            elapsed,
            rollback_failure: false,
        },
        Err(FleetError::Timeout { .. }) => NodeReport {
            node: node.to_string(),
            outcome: Outcome::TimedOut,
            output: String::new(),
            elapsed,
            rollback_failure: false,
        },
        Err(err) => {
            let rollback_failure = matches!(err, FleetError::RollbackFailure { .. });
            NodeReport {
                node: node.to_string(),
                outcome: Outcome::Failure(err.to_string()),
                output: String::new(),
                elapsed,
                rollback_failure,
            }
        }
    }
}

/// Run `op` once per node and collect a [`FleetReport`].
///
/// `op` receives an owned [`Node`] and returns the rendered output for
/// that node; a [`FleetError::Timeout`] becomes `TimedOut`, any other
/// error becomes `Failure`. Panics inside an operation are contained to
/// that node's slot.
pub async fn run_fleet<F, Fut>(nodes: Vec<Node>, options: &FleetOptions, op: F) -> FleetReport
where
    F: Fn(Node) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    let total = nodes.len();
    let report = if options.parallel && total > 1 {
        run_parallel(nodes, options, op).await
    } else {
        run_sequential(nodes, options, op).await
    };

    info!(
        total,
        succeeded = report.summary.succeeded,
        failed = report.summary.failed,
        timed_out = report.summary.timed_out,
        "fleet invocation finished"
    );
    report
}

async fn run_sequential<F, Fut>(nodes: Vec<Node>, options: &FleetOptions, op: F) -> FleetReport
where
    F: Fn(Node) -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let deadline = options.global_budget.map(|budget| Instant::now() + budget);
    let mut reports = Vec::with_capacity(nodes.len());

    for node in nodes {
        let name = node.name.clone();
        let started = Instant::now();

        let remaining = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    reports.push(NodeReport {
                        node: name,
                        outcome: Outcome::TimedOut,
                        output: String::new(),
                        elapsed: Duration::ZERO,
                        rollback_failure: false,
                    });
                    continue;
                }
                Some(remaining)
            }
            None => None,
        };

        let result = match remaining {
            Some(remaining) => match tokio::time::timeout(remaining, op(node)).await {
                Ok(result) => result,
                Err(_) => Err(FleetError::Timeout {
                    elapsed_ms: remaining.as_millis() as u64,
                }),
            },
            None => op(node).await,
        };

        reports.push(report_for(&name, started, result));
    }

    FleetReport::from_reports(reports)
}

async fn run_parallel<F, Fut>(nodes: Vec<Node>, options: &FleetOptions, op: F) -> FleetReport
where
    F: Fn(Node) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(options.max_workers.max(1)));
    let mut slots: Vec<Option<NodeReport>> = nodes.iter().map(|_| None).collect();
    let mut tasks: JoinSet<(usize, NodeReport)> = JoinSet::new();

    for (index, node) in nodes.iter().cloned().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let op = op.clone();
        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("fleet semaphore is never closed");
            let name = node.name.clone();
            let started = Instant::now();
            // The operation runs in its own task so a panic inside it is
            // contained and reported against this slot, instead of
            // tearing down the worker and losing the index.
            let report = match tokio::spawn(op(node)).await {
                Ok(result) => report_for(&name, started, result),
                Err(join_err) => {
                    warn!(node = %name, error = %join_err, "fleet operation panicked");
                    NodeReport {
                        node: name.clone(),
                        outcome: Outcome::Failure("operation panicked".to_string()),
                        output: String::new(),
                        elapsed: started.elapsed(),
                        rollback_failure: false,
                    }
                }
            };
            (index, report)
        });
    }

    let collect = async {
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(err) => {
                    // Only reachable via abort_all when the global budget
                    // fires; the slot is backfilled as timed out below.
                    warn!(error = %err, "fleet worker aborted");
                }
            }
        }
    };

    match options.global_budget {
        Some(budget) => {
            if tokio::time::timeout(budget, collect).await.is_err() {
                tasks.abort_all();
            }
        }
        None => collect.await,
    }

    let reports = nodes
        .iter()
        .zip(slots)
        .map(|(node, slot)| {
            slot.unwrap_or_else(|| NodeReport {
                node: node.name.clone(),
                outcome: Outcome::TimedOut,
                output: String::new(),
                elapsed: Duration::ZERO,
                rollback_failure: false,
            })
        })
        .collect();

    FleetReport::from_reports(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(count: usize) -> Vec<Node> {
        (1..=count)
            .map(|i| Node::new(format!("n{i}"), "linux", format!("10.0.0.{i}"), "lab1"))
            .collect()
    }

    #[tokio::test]
    async fn test_report_order_matches_target_order_despite_latency() {
        // Later nodes finish first; the report must not care.
        let report = run_fleet(nodes(4), &FleetOptions::default(), |node| async move {
            let delay = match node.name.as_str() {
                "n1" => 80,
                "n2" => 40,
                "n3" => 20,
                _ => 1,
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(node.name)
        })
        .await;

        let order: Vec<_> = report.reports.iter().map(|r| r.node.as_str()).collect();
        assert_eq!(order, vec!["n1", "n2", "n3", "n4"]);
        assert_eq!(report.summary.succeeded, 4);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_siblings() {
        let report = run_fleet(nodes(3), &FleetOptions::default(), |node| async move {
            if node.name == "n2" {
                Err(FleetError::Connection("refused".into()))
            } else {
                Ok("ok".to_string())
            }
        })
        .await;

        assert_eq!(report.summary.succeeded, 2);
        assert_eq!(report.summary.failed, 1);
        assert!(matches!(report.reports[1].outcome, Outcome::Failure(_)));
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn test_timeout_error_maps_to_timed_out() {
        let report = run_fleet(nodes(2), &FleetOptions::default(), |node| async move {
            if node.name == "n1" {
                Err(FleetError::Timeout { elapsed_ms: 100 })
            } else {
                Ok("ok".to_string())
            }
        })
        .await;

        assert_eq!(report.reports[0].outcome, Outcome::TimedOut);
        assert_eq!(report.summary.timed_out, 1);
        assert_eq!(report.summary.succeeded, 1);
    }

    #[tokio::test]
    async fn test_sequential_mode_runs_in_target_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        let options = FleetOptions {
            parallel: false,
            ..Default::default()
        };
        run_fleet(nodes(3), &options, move |node| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push(node.name.clone());
                Ok(String::new())
            }
        })
        .await;

        assert_eq!(*order.lock().unwrap(), vec!["n1", "n2", "n3"]);
    }

    #[tokio::test]
    async fn test_panicking_operation_is_a_failure_in_its_own_slot() {
        let report = run_fleet(nodes(3), &FleetOptions::default(), |node| async move {
            if node.name == "n2" {
                panic!("driver bug");
            }
            Ok("ok".to_string())
        })
        .await;

        assert_eq!(report.reports.len(), 3);
        assert_eq!(report.summary.succeeded, 2);
        // A panic is a failure, never a timeout.
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.timed_out, 0);
        assert_eq!(report.reports[1].node, "n2");
        match &report.reports[1].outcome {
            Outcome::Failure(reason) => assert!(reason.contains("panicked")),
            other => panic!("expected Failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_summary_produced_when_every_node_fails() {
        let report = run_fleet(nodes(2), &FleetOptions::default(), |_| async {
            Err(FleetError::Connection("down".into()))
        })
        .await;

        assert_eq!(report.summary.failed, 2);
        assert_eq!(report.summary.total(), 2);
        assert!(report.has_failures());
    }

    #[tokio::test]
    async fn test_global_budget_marks_unfinished_nodes_timed_out() {
        let options = FleetOptions {
            global_budget: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let report = run_fleet(nodes(2), &options, |node| async move {
            if node.name == "n2" {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            Ok("ok".to_string())
        })
        .await;

        assert_eq!(report.reports[0].outcome, Outcome::Success);
        assert_eq!(report.reports[1].outcome, Outcome::TimedOut);
    }
}
