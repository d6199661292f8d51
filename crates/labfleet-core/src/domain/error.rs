//! Error taxonomy for fleet operations.
//!
//! Selection and settings errors are fatal and reported before any
//! connection is opened. Connection, vendor-mapping, validation,
//! lifecycle and timeout errors are isolated to the node they occurred
//! on; the fleet engine converts them into per-node outcomes instead of
//! aborting sibling work. A failed rollback is the one error that is
//! always surfaced, whatever the output mode, because it means a device
//! was left in an indeterminate state.

/// Errors produced by target selection, execution backends, vendor
/// drivers and the configuration lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("no target selection supplied (use --node, --kind, --nodes or --all)")]
    MissingSelection,

    #[error("more than one target selection supplied; --node, --kind, --nodes and --all are mutually exclusive")]
    AmbiguousSelection,

    #[error("selection {selection} matched no nodes in lab {lab}")]
    NoMatchingNodes { selection: String, lab: String },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("no vendor driver mapped for kind '{kind}'")]
    VendorMapping { kind: String },

    #[error("configuration rejected: {0}")]
    Validation(String),

    #[error("invalid lifecycle transition: cannot {action} from state {from}")]
    InvalidLifecycleTransition { from: String, action: String },

    #[error("operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("ROLLBACK FAILED on {node}: {reason} (device may be in an indeterminate state)")]
    RollbackFailure { node: String, reason: String },

    #[error("command exited with status {exit_code}: {stderr}")]
    CommandFailed { exit_code: i32, stderr: String },

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FleetError {
    /// Whether this error must abort the whole invocation before any
    /// network I/O, as opposed to failing a single node.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            FleetError::MissingSelection
                | FleetError::AmbiguousSelection
                | FleetError::NoMatchingNodes { .. }
                | FleetError::Settings(_)
        )
    }
}

/// Result type for fleet operations.
pub type Result<T> = std::result::Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_errors_are_usage_errors() {
        assert!(FleetError::MissingSelection.is_usage_error());
        assert!(FleetError::AmbiguousSelection.is_usage_error());
        assert!(FleetError::NoMatchingNodes {
            selection: "--kind ceos".into(),
            lab: "lab1".into()
        }
        .is_usage_error());
    }

    #[test]
    fn test_node_scoped_errors_are_not_usage_errors() {
        assert!(!FleetError::Connection("refused".into()).is_usage_error());
        assert!(!FleetError::VendorMapping { kind: "ceos".into() }.is_usage_error());
        assert!(!FleetError::Timeout { elapsed_ms: 30_000 }.is_usage_error());
    }

    #[test]
    fn test_rollback_failure_display_flags_indeterminate_state() {
        let err = FleetError::RollbackFailure {
            node: "leaf1".into(),
            reason: "restore exited 1".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ROLLBACK FAILED"));
        assert!(msg.contains("leaf1"));
        assert!(msg.contains("indeterminate"));
    }
}
