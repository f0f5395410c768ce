//! Materialized path helpers.
//!
//! Two denormalized strings are kept per node:
//! - `path`: human-readable labels (notation, or id when notation is blank)
//!   joined by the configured separator, root first.
//! - `lineage`: `/<root id>/…/<own id>/`. Ids never contain `/`, so every
//!   subtree is exactly the set of lineages in
//!   `[lineage, lineage_upper_bound(lineage))`.

use crate::error::{StoreError, StoreResult};
use crate::ids::NodeId;

pub const LINEAGE_DELIMITER: char = '/';

/// Label a node contributes to `path`.
pub fn label<'a>(notation: &'a str, node_id: &'a NodeId) -> &'a str {
    let trimmed = notation.trim();
    if trimmed.is_empty() {
        node_id.as_str()
    } else {
        trimmed
    }
}

/// Rejects a label that would split into several `path` segments.
pub fn check_label(label: &str, separator: &str) -> StoreResult<()> {
    if label.contains(separator) {
        return Err(StoreError::validation(format!(
            "notation must not contain the path separator `{separator}`"
        )));
    }
    Ok(())
}

pub fn child_path(parent_path: &str, separator: &str, label: &str) -> String {
    format!("{parent_path}{separator}{label}")
}

/// Labels of `path`, root first. One per node from the root down.
pub fn segments<'a>(path: &'a str, separator: &str) -> Vec<&'a str> {
    path.split(separator).collect()
}

pub fn root_lineage(node_id: &NodeId) -> String {
    format!("{LINEAGE_DELIMITER}{node_id}{LINEAGE_DELIMITER}")
}

pub fn child_lineage(parent_lineage: &str, node_id: &NodeId) -> String {
    format!("{parent_lineage}{node_id}{LINEAGE_DELIMITER}")
}

/// Exclusive upper bound of the lineage range covering a subtree.
///
/// `'0'` is the byte right after `'/'`.
pub fn lineage_upper_bound(lineage: &str) -> String {
    let mut bound = lineage.trim_end_matches(LINEAGE_DELIMITER).to_string();
    bound.push('0');
    bound
}

/// Ids along the lineage, root first, node itself last.
pub fn lineage_ids(lineage: &str) -> StoreResult<Vec<NodeId>> {
    let inner = lineage
        .strip_prefix(LINEAGE_DELIMITER)
        .and_then(|rest| rest.strip_suffix(LINEAGE_DELIMITER))
        .ok_or_else(|| StoreError::InvalidData(format!("malformed lineage `{lineage}`")))?;
    inner
        .split(LINEAGE_DELIMITER)
        .map(|segment| {
            NodeId::parse(segment).map_err(|_| {
                StoreError::InvalidData(format!("invalid node id `{segment}` in lineage"))
            })
        })
        .collect()
}

/// Root has depth 0.
pub fn depth(lineage: &str) -> usize {
    lineage.matches(LINEAGE_DELIMITER).count().saturating_sub(2)
}
