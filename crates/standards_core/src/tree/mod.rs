//! Storage-independent tree helpers: sibling keys, materialized paths,
//! pre-order assembly and integrity reports.

pub mod path;
pub mod sort_key;

use crate::ids::{DocumentId, NodeId};
use crate::model::node::StandardNode;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Orders a flat subtree scan into pre-order starting at `start`.
///
/// `nodes` must contain `start` and may contain any of its descendants.
/// Siblings are visited by ascending `sort_order`, ties broken by id. Rows
/// whose parent is not reachable from `start` are dropped.
pub fn preorder(nodes: Vec<StandardNode>, start: &NodeId) -> Vec<StandardNode> {
    let mut by_parent: HashMap<NodeId, Vec<StandardNode>> = HashMap::new();
    let mut head = None;
    for node in nodes {
        if &node.id == start {
            head = Some(node);
            continue;
        }
        if let Some(parent_id) = node.parent_id.clone() {
            by_parent.entry(parent_id).or_default().push(node);
        }
    }
    let Some(head) = head else {
        return Vec::new();
    };
    for siblings in by_parent.values_mut() {
        siblings.sort_by(|left, right| {
            left.sort_order
                .total_cmp(&right.sort_order)
                .then_with(|| left.id.cmp(&right.id))
        });
        // Popped from the back below.
        siblings.reverse();
    }

    let mut ordered = Vec::new();
    let mut stack = vec![head];
    while let Some(node) = stack.pop() {
        if let Some(children) = by_parent.remove(&node.id) {
            stack.extend(children);
        }
        ordered.push(node);
    }
    ordered
}

/// One broken invariant found by an audit.
#[derive(Debug, Clone, PartialEq)]
pub enum IntegrityIssue {
    MultipleRoots(Vec<NodeId>),
    ParentMissing {
        node_id: NodeId,
        parent_id: NodeId,
    },
    ParentInOtherDocument {
        node_id: NodeId,
        parent_id: NodeId,
    },
    DuplicateSortOrder {
        parent_id: NodeId,
        sort_order: f64,
    },
    NonPositiveSortOrder {
        node_id: NodeId,
        sort_order: f64,
    },
    StalePath {
        node_id: NodeId,
        stored: String,
        expected: String,
    },
    StaleLineage {
        node_id: NodeId,
        stored: String,
        expected: String,
    },
    /// Label would split `path` into extra segments.
    SeparatorInLabel {
        node_id: NodeId,
        label: String,
    },
    /// Parent walk revisited a node.
    Cycle(NodeId),
}

impl Display for IntegrityIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MultipleRoots(ids) => write!(f, "{} root nodes", ids.len()),
            Self::ParentMissing { node_id, parent_id } => {
                write!(f, "node {node_id} points at missing parent {parent_id}")
            }
            Self::ParentInOtherDocument { node_id, parent_id } => {
                write!(f, "node {node_id} has parent {parent_id} in another document")
            }
            Self::DuplicateSortOrder {
                parent_id,
                sort_order,
            } => write!(f, "children of {parent_id} share sort order {sort_order}"),
            Self::NonPositiveSortOrder {
                node_id,
                sort_order,
            } => write!(f, "node {node_id} has non-positive sort order {sort_order}"),
            Self::StalePath {
                node_id,
                stored,
                expected,
            } => write!(f, "node {node_id} path `{stored}` should be `{expected}`"),
            Self::StaleLineage {
                node_id,
                stored,
                expected,
            } => write!(f, "node {node_id} lineage `{stored}` should be `{expected}`"),
            Self::SeparatorInLabel { node_id, label } => {
                write!(f, "node {node_id} label `{label}` contains the path separator")
            }
            Self::Cycle(node_id) => write!(f, "parent chain of {node_id} loops"),
        }
    }
}

/// Result of re-deriving every structural invariant of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrityReport {
    pub document_id: DocumentId,
    pub node_count: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::preorder;
    use crate::ids::{DocumentId, NodeId};
    use crate::model::node::{NodeAttributes, StandardNode};

    fn node(id: &NodeId, parent: Option<&NodeId>, sort_order: f64, document: &DocumentId) -> StandardNode {
        StandardNode {
            id: id.clone(),
            document_id: document.clone(),
            parent_id: parent.cloned(),
            sort_order,
            path: String::new(),
            lineage: String::new(),
            attributes: NodeAttributes::default(),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn preorder_visits_parents_before_children_in_key_order() {
        let document = DocumentId::generate();
        let [r, a, b, c] = [(); 4].map(|_| NodeId::generate());
        let rows = vec![
            node(&b, Some(&r), 2.0, &document),
            node(&c, Some(&a), 1.0, &document),
            node(&r, None, 1.0, &document),
            node(&a, Some(&r), 1.0, &document),
        ];
        let ids: Vec<_> = preorder(rows, &r).into_iter().map(|node| node.id).collect();
        assert_eq!(ids, vec![r, a, c, b]);
    }

    #[test]
    fn preorder_without_start_row_is_empty() {
        let document = DocumentId::generate();
        let start = NodeId::generate();
        let other = NodeId::generate();
        assert!(preorder(vec![node(&other, None, 1.0, &document)], &start).is_empty());
    }
}
