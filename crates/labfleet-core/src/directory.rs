//! Node directory seam.
//!
//! The lab record store lives outside this crate; fleet code only ever
//! talks to it through [`NodeDirectory`]. [`InMemoryDirectory`] is the
//! implementation the CLI builds from an exported lab inventory file,
//! and the one tests use directly.

use async_trait::async_trait;

use crate::domain::{Node, Result};

/// Read-only lookup into the node records of a lab.
///
/// Lab identity is always passed explicitly; there is no ambient
/// "current lab" state anywhere in this crate.
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    /// All nodes belonging to `lab`, in directory order.
    async fn nodes_by_lab(&self, lab: &str) -> Result<Vec<Node>>;

    /// A single node by name, if present.
    async fn node_by_name(&self, lab: &str, name: &str) -> Result<Option<Node>>;

    /// All nodes of the given kind, in directory order.
    async fn nodes_by_kind(&self, lab: &str, kind: &str) -> Result<Vec<Node>>;
}

/// Directory backed by an in-memory node list, preserving insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    nodes: Vec<Node>,
}

impl InMemoryDirectory {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    /// Parse an exported lab inventory (a JSON array of node records).
    pub fn from_json(raw: &str) -> Result<Self> {
        let nodes: Vec<Node> = serde_json::from_str(raw)?;
        Ok(Self { nodes })
    }
}

#[async_trait]
impl NodeDirectory for InMemoryDirectory {
    async fn nodes_by_lab(&self, lab: &str) -> Result<Vec<Node>> {
        Ok(self.nodes.iter().filter(|n| n.lab == lab).cloned().collect())
    }

    async fn node_by_name(&self, lab: &str, name: &str) -> Result<Option<Node>> {
        Ok(self
            .nodes
            .iter()
            .find(|n| n.lab == lab && n.name == name)
            .cloned())
    }

    async fn nodes_by_kind(&self, lab: &str, kind: &str) -> Result<Vec<Node>> {
        Ok(self
            .nodes
            .iter()
            .filter(|n| n.lab == lab && n.kind == kind)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InMemoryDirectory {
        InMemoryDirectory::new(vec![
            Node::new("leaf1", "srlinux", "10.0.0.2", "lab1"),
            Node::new("leaf2", "srlinux", "10.0.0.3", "lab1"),
            Node::new("host1", "linux", "10.0.0.10", "lab1"),
            Node::new("leaf1", "srlinux", "10.1.0.2", "lab2"),
        ])
    }

    #[tokio::test]
    async fn test_lookup_is_lab_scoped() {
        let dir = sample();
        assert_eq!(dir.nodes_by_lab("lab1").await.unwrap().len(), 3);
        assert_eq!(dir.nodes_by_lab("lab2").await.unwrap().len(), 1);

        let node = dir.node_by_name("lab2", "leaf1").await.unwrap().unwrap();
        assert_eq!(node.mgmt_addr, "10.1.0.2");
    }

    #[tokio::test]
    async fn test_kind_lookup_preserves_directory_order() {
        let dir = sample();
        let leaves = dir.nodes_by_kind("lab1", "srlinux").await.unwrap();
        let names: Vec<_> = leaves.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["leaf1", "leaf2"]);
    }

    #[test]
    fn test_from_json_parses_inventory_export() {
        let raw = r#"[
            {"name": "leaf1", "kind": "srlinux", "mgmt_addr": "10.0.0.2", "lab": "lab1"}
        ]"#;
        let dir = InMemoryDirectory::from_json(raw).unwrap();
        assert_eq!(dir.nodes.len(), 1);
    }
}
