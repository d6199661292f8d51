//! Target selection and resolution.
//!
//! A [`TargetSelection`] is built from the mutually-exclusive selector
//! flags and resolved against the node directory into an ordered,
//! deduplicated node list before anything touches the network.

use std::collections::HashSet;

use tracing::debug;

use crate::directory::NodeDirectory;
use crate::domain::{FleetError, Node, Result};

/// The chosen set of nodes for a fleet operation. Exactly one variant
/// per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelection {
    /// A single node by name.
    Single(String),
    /// Every node of one kind.
    ByKind(String),
    /// An explicit list of names, in the order given.
    List(Vec<String>),
    /// Every addressable node in the lab (infrastructure kinds excluded).
    All,
}

impl TargetSelection {
    /// Build a selection from the CLI selector flags.
    ///
    /// Fails closed: zero selectors is [`FleetError::MissingSelection`],
    /// more than one is [`FleetError::AmbiguousSelection`].
    pub fn from_flags(
        node: Option<String>,
        kind: Option<String>,
        nodes: Option<Vec<String>>,
        all: bool,
    ) -> Result<Self> {
        let supplied =
            node.is_some() as u8 + kind.is_some() as u8 + nodes.is_some() as u8 + all as u8;
        match supplied {
            0 => Err(FleetError::MissingSelection),
            1 => Ok(if let Some(name) = node {
                TargetSelection::Single(name)
            } else if let Some(kind) = kind {
                TargetSelection::ByKind(kind)
            } else if let Some(names) = nodes {
                TargetSelection::List(names)
            } else {
                TargetSelection::All
            }),
            _ => Err(FleetError::AmbiguousSelection),
        }
    }

    /// Short human-readable form, used in error messages.
    pub fn describe(&self) -> String {
        match self {
            TargetSelection::Single(name) => format!("--node {name}"),
            TargetSelection::ByKind(kind) => format!("--kind {kind}"),
            TargetSelection::List(names) => format!("--nodes {}", names.join(",")),
            TargetSelection::All => "--all".to_string(),
        }
    }
}

/// Resolve a selection into the ordered node list it addresses.
///
/// Order is the selection order for `List` and directory order for the
/// other variants. Duplicates are dropped, first occurrence wins. An
/// empty result is an error, not an empty success.
pub async fn resolve_targets<D: NodeDirectory + ?Sized>(
    directory: &D,
    lab: &str,
    selection: &TargetSelection,
) -> Result<Vec<Node>> {
    let nodes = match selection {
        TargetSelection::Single(name) => match directory.node_by_name(lab, name).await? {
            Some(node) => vec![node],
            None => Vec::new(),
        },
        TargetSelection::ByKind(kind) => directory.nodes_by_kind(lab, kind).await?,
        TargetSelection::List(names) => {
            let mut out = Vec::with_capacity(names.len());
            for name in names {
                if let Some(node) = directory.node_by_name(lab, name).await? {
                    out.push(node);
                }
            }
            out
        }
        TargetSelection::All => directory
            .nodes_by_lab(lab)
            .await?
            .into_iter()
            .filter(|n| !n.is_infrastructure())
            .collect(),
    };

    let mut seen = HashSet::new();
    let nodes: Vec<Node> = nodes
        .into_iter()
        .filter(|n| seen.insert(n.name.clone()))
        .collect();

    if nodes.is_empty() {
        return Err(FleetError::NoMatchingNodes {
            selection: selection.describe(),
            lab: lab.to_string(),
        });
    }

    debug!(lab, count = nodes.len(), "resolved target set");
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;

    fn lab() -> InMemoryDirectory {
        InMemoryDirectory::new(vec![
            Node::new("leaf1", "srlinux", "10.0.0.2", "lab1"),
            Node::new("leaf2", "srlinux", "10.0.0.3", "lab1"),
            Node::new("host1", "linux", "10.0.0.10", "lab1"),
            Node::new("br0", "bridge", "", "lab1"),
        ])
    }

    #[test]
    fn test_zero_selectors_is_missing_selection() {
        let err = TargetSelection::from_flags(None, None, None, false).unwrap_err();
        assert!(matches!(err, FleetError::MissingSelection));
    }

    #[test]
    fn test_two_selectors_is_ambiguous() {
        let err =
            TargetSelection::from_flags(Some("leaf1".into()), None, None, true).unwrap_err();
        assert!(matches!(err, FleetError::AmbiguousSelection));
    }

    #[test]
    fn test_single_selector_picks_the_right_variant() {
        let sel = TargetSelection::from_flags(None, Some("srlinux".into()), None, false).unwrap();
        assert_eq!(sel, TargetSelection::ByKind("srlinux".into()));
    }

    #[tokio::test]
    async fn test_all_excludes_infrastructure_nodes() {
        let targets = resolve_targets(&lab(), "lab1", &TargetSelection::All)
            .await
            .unwrap();
        let names: Vec<_> = targets.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["leaf1", "leaf2", "host1"]);
    }

    #[tokio::test]
    async fn test_list_preserves_selection_order_and_dedups() {
        let sel = TargetSelection::List(vec![
            "host1".into(),
            "leaf1".into(),
            "host1".into(),
            "missing".into(),
        ]);
        let targets = resolve_targets(&lab(), "lab1", &sel).await.unwrap();
        let names: Vec<_> = targets.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["host1", "leaf1"]);
    }

    #[tokio::test]
    async fn test_empty_resolution_is_an_error() {
        let sel = TargetSelection::ByKind("ceos".into());
        let err = resolve_targets(&lab(), "lab1", &sel).await.unwrap_err();
        match err {
            FleetError::NoMatchingNodes { selection, lab } => {
                assert_eq!(selection, "--kind ceos");
                assert_eq!(lab, "lab1");
            }
            other => panic!("expected NoMatchingNodes, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_single_missing_node_is_an_error() {
        let sel = TargetSelection::Single("ghost".into());
        let err = resolve_targets(&lab(), "lab1", &sel).await.unwrap_err();
        assert!(matches!(err, FleetError::NoMatchingNodes { .. }));
    }
}
