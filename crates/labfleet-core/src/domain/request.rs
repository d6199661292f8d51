//! Request payloads for fleet operations.
//!
//! One [`ExecutionRequest`] describes what to do to every node in a
//! resolved target set: run an operational command, drive a
//! configuration change, or upload files. The request is built once by
//! the CLI and shared read-only across workers.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Output rendering for fleet reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Table,
    Json,
}

/// How a configuration payload is combined with the running config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMethod {
    /// Merge the payload into the existing configuration.
    Merge,
    /// Override matching subtrees, keep the rest.
    Override,
    /// Replace the full configuration.
    Replace,
}

impl LoadMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadMethod::Merge => "merge",
            LoadMethod::Override => "override",
            LoadMethod::Replace => "replace",
        }
    }
}

/// Where the configuration payload comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// A file on the operator host, pushed to every target.
    File(PathBuf),
    /// A file already present on the device.
    DeviceFile(PathBuf),
    /// No payload: restore the most recent configuration snapshot.
    Rollback,
}

/// A configuration change to drive through the lifecycle controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPlan {
    pub source: ConfigSource,
    pub method: LoadMethod,
    /// Validate only; never apply.
    pub dry_run: bool,
    /// Print the staged diff before applying.
    pub diff: bool,
    pub comment: Option<String>,
}

/// What to copy onto the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    File(PathBuf),
    Tree(PathBuf),
}

/// A file or directory upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    pub source: UploadSource,
    pub dest: PathBuf,
}

/// The operation applied to each node of the target set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetPayload {
    /// A single operational (non-configuration) command.
    Command(String),
    /// A configuration change.
    Config(ConfigPlan),
    /// A file or directory upload.
    Upload(UploadPlan),
}

/// One fleet invocation's worth of work, node-independent.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub payload: FleetPayload,
    /// Per-node timeout, enforced on every backend call.
    pub timeout: Duration,
    pub format: OutputFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_method_names_match_cli_values() {
        assert_eq!(LoadMethod::Merge.as_str(), "merge");
        assert_eq!(LoadMethod::Override.as_str(), "override");
        assert_eq!(LoadMethod::Replace.as_str(), "replace");
    }

    #[test]
    fn test_output_format_serde_is_lowercase() {
        let json = serde_json::to_string(&OutputFormat::Table).unwrap();
        assert_eq!(json, "\"table\"");
    }
}
