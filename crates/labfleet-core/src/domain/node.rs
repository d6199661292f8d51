//! Node records as imported into a lab.
//!
//! Nodes are created by the topology import pipeline and are read-only to
//! this crate; everything here either looks at them or addresses them.

use serde::{Deserialize, Serialize};

/// Kinds that exist only to wire other nodes together and are never
/// addressable targets for fleet operations.
pub const INFRASTRUCTURE_KINDS: &[&str] = &["bridge", "ovs-bridge"];

/// A single emulated device inside a lab.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    /// Node name, unique within its lab.
    pub name: String,

    /// Device-type string, e.g. `srlinux` or `linux`. Drives vendor
    /// driver selection.
    pub kind: String,

    /// Management address the device is reachable on.
    pub mgmt_addr: String,

    /// Owning lab identifier.
    pub lab: String,
}

impl Node {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        mgmt_addr: impl Into<String>,
        lab: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            mgmt_addr: mgmt_addr.into(),
            lab: lab.into(),
        }
    }

    /// Whether this node is pure wiring (a bridge) rather than a device
    /// that can receive commands or configuration.
    pub fn is_infrastructure(&self) -> bool {
        INFRASTRUCTURE_KINDS.contains(&self.kind.as_str())
    }
}
