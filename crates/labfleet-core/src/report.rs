//! Fleet report rendering.
//!
//! One renderer per output format. Structured formats (`table`, `json`)
//! always carry per-node detail so partial failure is distinguishable
//! from total failure; quiet text mode keeps the summary and anything
//! marked as a rollback failure, which is never suppressed.

use serde_json::json;

use crate::domain::OutputFormat;
use crate::fleet::{FleetReport, NodeReport, Outcome};

/// Process exit code for a finished invocation: non-zero when any node
/// failed or timed out, even if others succeeded.
pub fn exit_code(report: &FleetReport) -> i32 {
    if report.has_failures() {
        1
    } else {
        0
    }
}

fn detail(report: &NodeReport) -> &str {
    match &report.outcome {
        Outcome::Failure(reason) => reason,
        _ => report.output.trim_end(),
    }
}

fn summary_line(report: &FleetReport) -> String {
    format!(
        "{} succeeded, {} failed, {} timed out ({} total)",
        report.summary.succeeded,
        report.summary.failed,
        report.summary.timed_out,
        report.summary.total(),
    )
}

/// Render a fleet report in the requested format.
pub fn render(report: &FleetReport, format: OutputFormat, quiet: bool) -> String {
    match format {
        OutputFormat::Text => render_text(report, quiet),
        OutputFormat::Table => render_table(report),
        OutputFormat::Json => render_json(report),
    }
}

fn render_text(report: &FleetReport, quiet: bool) -> String {
    let mut out = String::new();
    for node in &report.reports {
        // Rollback failures mean an indeterminate device; they are
        // printed even in quiet mode.
        if quiet && !node.rollback_failure {
            continue;
        }
        out.push_str(&format!(
            "=== {} [{}] ({:.1}s)\n",
            node.node,
            node.outcome.label(),
            node.elapsed.as_secs_f64(),
        ));
        let body = detail(node);
        if !body.is_empty() {
            out.push_str(body);
            out.push('\n');
        }
    }
    out.push_str(&summary_line(report));
    out.push('\n');
    out
}

fn render_table(report: &FleetReport) -> String {
    let name_width = report
        .reports
        .iter()
        .map(|r| r.node.len())
        .chain(std::iter::once("NODE".len()))
        .max()
        .unwrap_or(4);

    let mut out = format!(
        "{:<name_width$}  {:<9}  {:>8}  DETAIL\n",
        "NODE", "STATUS", "TIME",
    );
    for node in &report.reports {
        let first_line = detail(node).lines().next().unwrap_or("").to_string();
        out.push_str(&format!(
            "{:<name_width$}  {:<9}  {:>7.1}s  {}\n",
            node.node,
            node.outcome.label(),
            node.elapsed.as_secs_f64(),
            first_line,
        ));
    }
    out.push_str(&summary_line(report));
    out.push('\n');
    out
}

fn render_json(report: &FleetReport) -> String {
    let nodes: Vec<_> = report
        .reports
        .iter()
        .map(|node| {
            json!({
                "node": node.node,
                "status": node.outcome.label(),
                "reason": match &node.outcome {
                    Outcome::Failure(reason) => Some(reason.clone()),
                    _ => None,
                },
                "output": node.output,
                "rollback_failure": node.rollback_failure,
                "elapsed_ms": node.elapsed.as_millis() as u64,
            })
        })
        .collect();

    let doc = json!({
        "summary": {
            "succeeded": report.summary.succeeded,
            "failed": report.summary.failed,
            "timed_out": report.summary.timed_out,
            "total": report.summary.total(),
        },
        "nodes": nodes,
    });
    // Pretty output is part of the CLI contract for scripted consumers.
    serde_json::to_string_pretty(&doc).unwrap_or_else(|_| doc.to_string())
}
