//! Fleet engine scheduling and ordering guarantees.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use labfleet_core::{
    exit_code, run_fleet, FleetError, FleetOptions, FleetReport, Node, Outcome,
};

fn nodes(count: usize) -> Vec<Node> {
    (1..=count)
        .map(|i| Node::new(format!("n{i}"), "linux", format!("10.0.0.{i}"), "lab1"))
        .collect()
}

#[tokio::test]
async fn test_result_cardinality_and_order_survive_random_latency() {
    let targets = nodes(6);
    let report = run_fleet(targets.clone(), &FleetOptions::default(), |node| async move {
        // Reverse the finishing order relative to the target order.
        let index: u64 = node.name[1..].parse().unwrap();
        tokio::time::sleep(Duration::from_millis((7 - index) * 15)).await;
        Ok(node.name)
    })
    .await;

    assert_eq!(report.reports.len(), targets.len());
    for (target, result) in targets.iter().zip(&report.reports) {
        assert_eq!(target.name, result.node);
        assert_eq!(result.outcome, Outcome::Success);
    }
}

#[tokio::test]
async fn test_one_slow_node_does_not_delay_fast_siblings() {
    let slow_ms = 300;
    let started = Instant::now();

    let report = run_fleet(nodes(6), &FleetOptions::default(), move |node| async move {
        if node.name == "n3" {
            // Simulates a backend-enforced timeout on the slow node.
            tokio::time::sleep(Duration::from_millis(slow_ms)).await;
            Err(FleetError::Timeout { elapsed_ms: slow_ms })
        } else {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok("ok".to_string())
        }
    })
    .await;

    let elapsed = started.elapsed();
    // Wall time tracks the slowest node, not the sum of all nodes.
    assert!(
        elapsed < Duration::from_millis(slow_ms * 2),
        "fleet took {elapsed:?}, siblings were delayed"
    );
    assert_eq!(report.summary.succeeded, 5);
    assert_eq!(report.summary.timed_out, 1);
    assert_eq!(report.reports[2].outcome, Outcome::TimedOut);
}

#[tokio::test]
async fn test_bounded_workers_with_mixed_outcomes_in_original_order() {
    let options = FleetOptions {
        parallel: true,
        max_workers: 2,
        global_budget: None,
    };

    let report: FleetReport = run_fleet(nodes(4), &options, |node| async move {
        match node.name.as_str() {
            "n2" => Err(FleetError::Connection("refused".into())),
            "n3" => Err(FleetError::Timeout { elapsed_ms: 50 }),
            _ => Ok("ok".to_string()),
        }
    })
    .await;

    let statuses: Vec<&str> = report.reports.iter().map(|r| r.outcome.label()).collect();
    assert_eq!(statuses, vec!["success", "failure", "timed-out", "success"]);
    assert_eq!(report.summary.succeeded, 2);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.timed_out, 1);
    assert_ne!(exit_code(&report), 0);
}

#[tokio::test]
async fn test_worker_bound_is_respected() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let options = FleetOptions {
        parallel: true,
        max_workers: 2,
        global_budget: None,
    };

    let in_flight_op = Arc::clone(&in_flight);
    let peak_op = Arc::clone(&peak);
    run_fleet(nodes(8), &options, move |_| {
        let in_flight = Arc::clone(&in_flight_op);
        let peak = Arc::clone(&peak_op);
        async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(String::new())
        }
    })
    .await;

    assert!(peak.load(Ordering::SeqCst) <= 2, "worker bound exceeded");
}

#[tokio::test]
async fn test_panicking_node_reports_failure_not_timeout() {
    let report = run_fleet(nodes(3), &FleetOptions::default(), |node| async move {
        if node.name == "n2" {
            panic!("driver bug");
        }
        Ok("ok".to_string())
    })
    .await;

    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.timed_out, 0);
    match &report.reports[1].outcome {
        Outcome::Failure(reason) => assert!(reason.contains("panicked")),
        other => panic!("expected Failure for the panicked node, got {other:?}"),
    }
}

#[tokio::test]
async fn test_sequential_fallback_preserves_order_and_isolation() {
    let options = FleetOptions {
        parallel: false,
        max_workers: 1,
        global_budget: None,
    };

    let report = run_fleet(nodes(3), &options, |node| async move {
        if node.name == "n1" {
            Err(FleetError::Connection("down".into()))
        } else {
            Ok(node.name)
        }
    })
    .await;

    assert_eq!(report.reports.len(), 3);
    assert!(matches!(report.reports[0].outcome, Outcome::Failure(_)));
    assert_eq!(report.reports[1].outcome, Outcome::Success);
    assert_eq!(report.reports[2].outcome, Outcome::Success);
}
