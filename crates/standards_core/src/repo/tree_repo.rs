//! Standard node tree repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Store each document's node tree in one flat table with parent pointers,
//!   fractional sibling keys and materialized `path` / `lineage` strings.
//! - Keep every structural invariant inside the repository transaction that
//!   mutates the tree.
//!
//! # Invariants
//! - At most one root per document (checked here, backed by a partial unique
//!   index).
//! - Parent and child share a document (checked here, backed by triggers).
//! - Sibling keys are distinct and positive; child listing is
//!   `sort_order ASC, id ASC`.
//! - After every committed mutation, `path` and `lineage` of every node match
//!   its parent chain.
//! - Subtree scans are lineage range predicates, never recursive queries.
//! - No label contains `path_separator`, so `path` splits into exactly one
//!   segment per node from the root down.
//!
//! # Cost
//! - Create, insert-before and delete-relations checks are O(siblings).
//! - `move_node` and notation edits rewrite the whole subtree: O(subtree).

use crate::config::TreeConfig;
use crate::error::{Conflict, Missing, StoreError, StoreResult};
use crate::ids::{DocumentId, NodeId};
use crate::model::node::{NewNode, NodeAttributes, StandardNode};
use crate::model::refs::{
    decode_extra_fields, decode_terms, encode_extra_fields, encode_terms, TermRef,
};
use crate::repo::{ensure_connection_ready, read_tx, write_tx};
use crate::tree::path::{
    check_label, child_lineage, child_path, label, lineage_ids, lineage_upper_bound, root_lineage,
};
use crate::tree::sort_key::{self, FIRST_KEY};
use crate::tree::{preorder, IntegrityIssue, IntegrityReport};
use log::info;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};

const NODE_SELECT_SQL: &str = "SELECT
    id,
    document_id,
    parent_id,
    kind,
    sort_order,
    notation,
    list_id,
    title,
    description,
    language,
    subjects,
    education_levels,
    concept_terms,
    concept_keywords,
    path,
    lineage,
    canonical_uri,
    source_uri,
    source_id,
    notes,
    extra_fields,
    created_at,
    updated_at
FROM standard_nodes";

const REQUIRED_NODE_COLUMNS: &[&str] = &[
    "id",
    "document_id",
    "parent_id",
    "sort_order",
    "path",
    "lineage",
    "extra_fields",
];

/// What to do with relations that reference a subtree being deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationPolicy {
    /// Refuse the delete while any relation references the subtree.
    #[default]
    Restrict,
    /// Delete referencing relations in the same transaction.
    Cascade,
}

/// Where a new child goes among its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement<'a> {
    Last,
    Before(&'a NodeId),
}

/// Repository interface for standard node trees.
///
/// Whole-document removal is not part of this trait. Deleting a document
/// must drop its tree in the same transaction as the document row, so
/// [`DocumentRepository::delete_document`] runs `purge_document_tree` on
/// its own transaction. An engine backed by another store has to provide
/// its document repository alongside it.
///
/// [`DocumentRepository::delete_document`]: crate::repo::document_repo::DocumentRepository::delete_document
pub trait TreeRepository {
    /// Creates the single root of `document_id`.
    fn create_root(&self, document_id: &DocumentId, node: &NewNode) -> StoreResult<StandardNode>;
    /// Appends a child after the current last sibling.
    fn create_child(&self, parent_id: &NodeId, node: &NewNode) -> StoreResult<StandardNode>;
    /// Inserts a child directly before `before_sibling_id`.
    fn insert_child_before(
        &self,
        parent_id: &NodeId,
        before_sibling_id: &NodeId,
        node: &NewNode,
    ) -> StoreResult<StandardNode>;
    /// Reparents and/or reorders one node with its whole subtree.
    fn move_node(
        &self,
        node_id: &NodeId,
        new_parent_id: &NodeId,
        before_sibling_id: Option<&NodeId>,
    ) -> StoreResult<StandardNode>;
    /// Replaces node attributes; a notation change rewrites subtree paths.
    fn update_node(&self, node_id: &NodeId, attributes: &NodeAttributes)
        -> StoreResult<StandardNode>;
    /// Deletes the node and its subtree, returning the number of nodes removed.
    fn delete_node(&self, node_id: &NodeId, policy: RelationPolicy) -> StoreResult<usize>;
    fn get_node(&self, node_id: &NodeId) -> StoreResult<Option<StandardNode>>;
    /// Direct children, ascending sort order.
    fn children(&self, node_id: &NodeId) -> StoreResult<Vec<StandardNode>>;
    /// Root first, parent last, read from the lineage.
    fn ancestors(&self, node_id: &NodeId) -> StoreResult<Vec<StandardNode>>;
    /// Same as [`TreeRepository::ancestors`], derived by walking parent ids.
    fn ancestors_by_parent_walk(&self, node_id: &NodeId) -> StoreResult<Vec<StandardNode>>;
    /// Pre-order, node itself excluded.
    fn descendants(&self, node_id: &NodeId) -> StoreResult<Vec<StandardNode>>;
    /// Node count of the subtree, node itself included.
    fn subtree_size(&self, node_id: &NodeId) -> StoreResult<usize>;
    fn root(&self, document_id: &DocumentId) -> StoreResult<StandardNode>;
    /// Whole tree in pre-order; empty when the document has no root yet.
    fn document_nodes(&self, document_id: &DocumentId) -> StoreResult<Vec<StandardNode>>;
    /// Re-derives every structural invariant and reports violations.
    fn audit_document(&self, document_id: &DocumentId) -> StoreResult<IntegrityReport>;
}

/// SQLite-backed tree repository.
pub struct SqliteTreeRepository<'conn> {
    conn: &'conn Connection,
    config: TreeConfig,
}

impl<'conn> SqliteTreeRepository<'conn> {
    /// Creates repository from migrated connection with default tunables.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        Self::with_config(conn, TreeConfig::default())
    }

    pub fn with_config(conn: &'conn Connection, config: TreeConfig) -> StoreResult<Self> {
        config.validate()?;
        ensure_tree_connection_ready(conn)?;
        Ok(Self { conn, config })
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    fn insert_child(
        &self,
        parent_id: &NodeId,
        placement: Placement<'_>,
        node: &NewNode,
    ) -> StoreResult<StandardNode> {
        let node_id = NodeId::generate();
        let own_label = label(&node.attributes.notation, &node_id);
        check_label(own_label, &self.config.path_separator)?;

        let tx = write_tx(self.conn)?;
        let parent = load_required_node(&tx, parent_id)?;
        let siblings = sibling_keys(&tx, parent_id, None)?;

        let sort_order = match (node.sort_order, placement) {
            (Some(_), Placement::Before(_)) => {
                return Err(StoreError::validation(
                    "explicit sort_order cannot be combined with before-sibling placement",
                ));
            }
            (Some(requested), Placement::Last) => {
                if siblings.iter().any(|(_, key)| *key == requested) {
                    return Err(Conflict::DuplicateSortOrder {
                        parent_id: parent_id.clone(),
                        sort_order: requested,
                    }
                    .into());
                }
                requested
            }
            (None, Placement::Last) => {
                place(&tx, parent_id, &siblings, siblings.len(), None, &self.config)?
            }
            (None, Placement::Before(sibling_id)) => {
                let index = sibling_index(&tx, parent_id, &siblings, sibling_id)?;
                place(&tx, parent_id, &siblings, index, None, &self.config)?
            }
        };

        let path = child_path(&parent.path, &self.config.path_separator, own_label);
        let lineage = child_lineage(&parent.lineage, &node_id);
        insert_node_row(
            &tx,
            &node_id,
            &parent.document_id,
            Some(parent_id),
            sort_order,
            &path,
            &lineage,
            &node.attributes,
        )?;
        bump_tree_version(&tx, &parent.document_id)?;
        let created = load_required_node(&tx, &node_id)?;
        tx.commit()?;
        Ok(created)
    }
}

impl TreeRepository for SqliteTreeRepository<'_> {
    fn create_root(&self, document_id: &DocumentId, node: &NewNode) -> StoreResult<StandardNode> {
        let node_id = NodeId::generate();
        let path = label(&node.attributes.notation, &node_id).to_string();
        check_label(&path, &self.config.path_separator)?;

        let tx = write_tx(self.conn)?;
        if !document_exists(&tx, document_id)? {
            return Err(Missing::Document(document_id.clone()).into());
        }
        if let Some(root_id) = find_root_id(&tx, document_id)? {
            return Err(Conflict::RootExists {
                document_id: document_id.clone(),
                root_id,
            }
            .into());
        }

        let lineage = root_lineage(&node_id);
        insert_node_row(
            &tx,
            &node_id,
            document_id,
            None,
            node.sort_order.unwrap_or(FIRST_KEY),
            &path,
            &lineage,
            &node.attributes,
        )?;
        bump_tree_version(&tx, document_id)?;
        let created = load_required_node(&tx, &node_id)?;
        tx.commit()?;
        Ok(created)
    }

    fn create_child(&self, parent_id: &NodeId, node: &NewNode) -> StoreResult<StandardNode> {
        self.insert_child(parent_id, Placement::Last, node)
    }

    fn insert_child_before(
        &self,
        parent_id: &NodeId,
        before_sibling_id: &NodeId,
        node: &NewNode,
    ) -> StoreResult<StandardNode> {
        self.insert_child(parent_id, Placement::Before(before_sibling_id), node)
    }

    fn move_node(
        &self,
        node_id: &NodeId,
        new_parent_id: &NodeId,
        before_sibling_id: Option<&NodeId>,
    ) -> StoreResult<StandardNode> {
        let tx = write_tx(self.conn)?;
        let node = load_required_node(&tx, node_id)?;
        let parent = load_required_node(&tx, new_parent_id)?;

        if parent.document_id != node.document_id {
            return Err(Conflict::CrossDocument {
                node_id: node_id.clone(),
                parent_id: new_parent_id.clone(),
            }
            .into());
        }
        if parent.lineage.starts_with(&node.lineage) {
            return Err(Conflict::Cycle {
                node_id: node_id.clone(),
                parent_id: new_parent_id.clone(),
            }
            .into());
        }
        if before_sibling_id == Some(node_id) {
            return Err(StoreError::validation(format!(
                "node {node_id} cannot be positioned relative to itself"
            )));
        }

        let size = count_subtree(&tx, &node.lineage)?;
        if size > self.config.max_move_subtree {
            return Err(Conflict::SubtreeTooLarge {
                node_id: node_id.clone(),
                size,
                limit: self.config.max_move_subtree,
            }
            .into());
        }

        let siblings = sibling_keys(&tx, new_parent_id, Some(node_id))?;
        let index = match before_sibling_id {
            None => siblings.len(),
            Some(sibling_id) => sibling_index(&tx, new_parent_id, &siblings, sibling_id)?,
        };
        let sort_order = place(&tx, new_parent_id, &siblings, index, Some(node_id), &self.config)?;

        tx.execute(
            "UPDATE standard_nodes
             SET parent_id = ?2,
                 sort_order = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![node_id, new_parent_id, sort_order],
        )?;

        let new_lineage = child_lineage(&parent.lineage, node_id);
        let new_path = child_path(&parent.path, &self.config.path_separator, node.label());
        if new_lineage != node.lineage || new_path != node.path {
            rewrite_subtree(&tx, &node.lineage, &new_lineage, &node.path, &new_path)?;
        }

        bump_tree_version(&tx, &node.document_id)?;
        let moved = load_required_node(&tx, node_id)?;
        tx.commit()?;
        Ok(moved)
    }

    fn update_node(
        &self,
        node_id: &NodeId,
        attributes: &NodeAttributes,
    ) -> StoreResult<StandardNode> {
        let new_label = label(&attributes.notation, node_id);
        check_label(new_label, &self.config.path_separator)?;

        let tx = write_tx(self.conn)?;
        let node = load_required_node(&tx, node_id)?;

        tx.execute(
            "UPDATE standard_nodes
             SET kind = ?2,
                 notation = ?3,
                 list_id = ?4,
                 title = ?5,
                 description = ?6,
                 language = ?7,
                 subjects = ?8,
                 education_levels = ?9,
                 concept_terms = ?10,
                 concept_keywords = ?11,
                 canonical_uri = ?12,
                 source_uri = ?13,
                 source_id = ?14,
                 notes = ?15,
                 extra_fields = ?16,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                node_id,
                attributes.kind.as_ref().map(|kind| kind.as_str()),
                attributes.notation.as_str(),
                attributes.list_id.as_str(),
                attributes.title.as_str(),
                attributes.description.as_str(),
                attributes.language.as_deref(),
                encode_terms(&attributes.subjects)?,
                encode_terms(&attributes.education_levels)?,
                encode_terms(&attributes.concept_terms)?,
                attributes.concept_keywords.as_deref(),
                attributes.canonical_uri.as_deref(),
                attributes.source_uri.as_deref(),
                attributes.source_id.as_str(),
                attributes.notes.as_deref(),
                encode_extra_fields(&attributes.extra_fields)?,
            ],
        )?;

        if new_label != node.label() {
            let new_path = match &node.parent_id {
                None => new_label.to_string(),
                Some(parent_id) => {
                    let parent = load_required_node(&tx, parent_id)?;
                    child_path(&parent.path, &self.config.path_separator, new_label)
                }
            };
            rewrite_subtree(&tx, &node.lineage, &node.lineage, &node.path, &new_path)?;
            bump_tree_version(&tx, &node.document_id)?;
        }

        let updated = load_required_node(&tx, node_id)?;
        tx.commit()?;
        Ok(updated)
    }

    fn delete_node(&self, node_id: &NodeId, policy: RelationPolicy) -> StoreResult<usize> {
        let tx = write_tx(self.conn)?;
        let node = load_required_node(&tx, node_id)?;
        let upper = lineage_upper_bound(&node.lineage);

        let relation_count: i64 = tx.query_row(
            "SELECT COUNT(*)
             FROM node_relations
             WHERE source_id IN (
                     SELECT id FROM standard_nodes WHERE lineage >= ?1 AND lineage < ?2
                 )
                OR target_id IN (
                     SELECT id FROM standard_nodes WHERE lineage >= ?1 AND lineage < ?2
                 );",
            params![node.lineage, upper],
            |row| row.get(0),
        )?;
        if relation_count > 0 {
            match policy {
                RelationPolicy::Restrict => {
                    return Err(Conflict::NodeReferenced {
                        node_id: node_id.clone(),
                        relation_count: relation_count as usize,
                    }
                    .into());
                }
                RelationPolicy::Cascade => {
                    tx.execute(
                        "DELETE FROM node_relations
                         WHERE source_id IN (
                                 SELECT id FROM standard_nodes WHERE lineage >= ?1 AND lineage < ?2
                             )
                            OR target_id IN (
                                 SELECT id FROM standard_nodes WHERE lineage >= ?1 AND lineage < ?2
                             );",
                        params![node.lineage, upper],
                    )?;
                }
            }
        }

        let removed = tx.execute(
            "DELETE FROM standard_nodes
             WHERE lineage >= ?1
               AND lineage < ?2;",
            params![node.lineage, upper],
        )?;
        bump_tree_version(&tx, &node.document_id)?;
        tx.commit()?;
        Ok(removed)
    }

    fn get_node(&self, node_id: &NodeId) -> StoreResult<Option<StandardNode>> {
        load_node(self.conn, node_id)
    }

    fn children(&self, node_id: &NodeId) -> StoreResult<Vec<StandardNode>> {
        let tx = read_tx(self.conn)?;
        load_required_node(&tx, node_id)?;
        let children = query_nodes(
            &tx,
            &format!("{NODE_SELECT_SQL} WHERE parent_id = ?1 ORDER BY sort_order ASC, id ASC;"),
            params![node_id],
        )?;
        tx.commit()?;
        Ok(children)
    }

    fn ancestors(&self, node_id: &NodeId) -> StoreResult<Vec<StandardNode>> {
        let tx = read_tx(self.conn)?;
        let node = load_required_node(&tx, node_id)?;
        let mut chain = lineage_ids(&node.lineage)?;
        chain.pop();
        if chain.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; chain.len()].join(", ");
        let ancestors = query_nodes(
            &tx,
            &format!(
                "{NODE_SELECT_SQL} WHERE id IN ({placeholders}) ORDER BY length(lineage) ASC;"
            ),
            params_from_iter(chain.iter()),
        )?;
        tx.commit()?;

        if ancestors.len() != chain.len() {
            return Err(StoreError::InvalidData(format!(
                "lineage of node {node_id} lists {} ancestors, {} exist",
                chain.len(),
                ancestors.len()
            )));
        }
        Ok(ancestors)
    }

    fn ancestors_by_parent_walk(&self, node_id: &NodeId) -> StoreResult<Vec<StandardNode>> {
        let tx = read_tx(self.conn)?;
        let node = load_required_node(&tx, node_id)?;
        let mut visited = HashSet::from([node.id.clone()]);
        let mut chain = Vec::new();
        let mut cursor = node.parent_id;
        while let Some(current) = cursor {
            if !visited.insert(current.clone()) {
                return Err(StoreError::InvalidData(format!(
                    "parent chain of node {node_id} loops at {current}"
                )));
            }
            let ancestor = load_node(&tx, &current)?.ok_or_else(|| {
                StoreError::InvalidData(format!("node {node_id} has missing ancestor {current}"))
            })?;
            cursor = ancestor.parent_id.clone();
            chain.push(ancestor);
        }
        tx.commit()?;
        chain.reverse();
        Ok(chain)
    }

    fn descendants(&self, node_id: &NodeId) -> StoreResult<Vec<StandardNode>> {
        let tx = read_tx(self.conn)?;
        let node = load_required_node(&tx, node_id)?;
        let rows = load_subtree(&tx, &node.lineage)?;
        tx.commit()?;
        Ok(preorder(rows, node_id).into_iter().skip(1).collect())
    }

    fn subtree_size(&self, node_id: &NodeId) -> StoreResult<usize> {
        let tx = read_tx(self.conn)?;
        let node = load_required_node(&tx, node_id)?;
        let size = count_subtree(&tx, &node.lineage)?;
        tx.commit()?;
        Ok(size)
    }

    fn root(&self, document_id: &DocumentId) -> StoreResult<StandardNode> {
        let tx = read_tx(self.conn)?;
        let root = load_root(&tx, document_id)?;
        tx.commit()?;
        Ok(root)
    }

    fn document_nodes(&self, document_id: &DocumentId) -> StoreResult<Vec<StandardNode>> {
        let tx = read_tx(self.conn)?;
        let root = match load_root(&tx, document_id) {
            Ok(root) => root,
            Err(StoreError::NotFound(Missing::Root(_))) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        let rows = query_nodes(
            &tx,
            &format!("{NODE_SELECT_SQL} WHERE document_id = ?1;"),
            params![document_id],
        )?;
        tx.commit()?;
        Ok(preorder(rows, &root.id))
    }

    fn audit_document(&self, document_id: &DocumentId) -> StoreResult<IntegrityReport> {
        let tx = read_tx(self.conn)?;
        if !document_exists(&tx, document_id)? {
            return Err(Missing::Document(document_id.clone()).into());
        }
        let rows = query_nodes(
            &tx,
            &format!("{NODE_SELECT_SQL} WHERE document_id = ?1 ORDER BY lineage ASC;"),
            params![document_id],
        )?;

        let mut issues = Vec::new();
        let by_id: HashMap<&NodeId, &StandardNode> = rows.iter().map(|node| (&node.id, node)).collect();

        let roots: Vec<NodeId> = rows
            .iter()
            .filter(|node| node.is_root())
            .map(|node| node.id.clone())
            .collect();
        if roots.len() > 1 {
            issues.push(IntegrityIssue::MultipleRoots(roots));
        }

        let mut keys_by_parent: HashMap<&NodeId, Vec<f64>> = HashMap::new();
        for node in &rows {
            if node.sort_order <= 0.0 {
                issues.push(IntegrityIssue::NonPositiveSortOrder {
                    node_id: node.id.clone(),
                    sort_order: node.sort_order,
                });
            }
            let Some(parent_id) = &node.parent_id else {
                continue;
            };
            keys_by_parent.entry(parent_id).or_default().push(node.sort_order);
            if !by_id.contains_key(parent_id) {
                let issue = if load_node(&tx, parent_id)?.is_some() {
                    IntegrityIssue::ParentInOtherDocument {
                        node_id: node.id.clone(),
                        parent_id: parent_id.clone(),
                    }
                } else {
                    IntegrityIssue::ParentMissing {
                        node_id: node.id.clone(),
                        parent_id: parent_id.clone(),
                    }
                };
                issues.push(issue);
            }
        }
        tx.commit()?;

        for (parent_id, keys) in keys_by_parent.iter_mut() {
            keys.sort_by(f64::total_cmp);
            for pair in keys.windows(2) {
                if pair[0] == pair[1] {
                    issues.push(IntegrityIssue::DuplicateSortOrder {
                        parent_id: (*parent_id).clone(),
                        sort_order: pair[0],
                    });
                }
            }
        }

        for node in &rows {
            if node.label().contains(self.config.path_separator.as_str()) {
                issues.push(IntegrityIssue::SeparatorInLabel {
                    node_id: node.id.clone(),
                    label: node.label().to_string(),
                });
            }
            let Some(chain) = parent_chain(node, &by_id, &mut issues) else {
                continue;
            };
            let mut expected_lineage = String::new();
            let mut expected_path = String::new();
            for (position, link) in chain.iter().enumerate() {
                if position == 0 {
                    expected_lineage = root_lineage(&link.id);
                    expected_path = link.label().to_string();
                } else {
                    expected_lineage = child_lineage(&expected_lineage, &link.id);
                    expected_path =
                        child_path(&expected_path, &self.config.path_separator, link.label());
                }
            }
            if node.lineage != expected_lineage {
                issues.push(IntegrityIssue::StaleLineage {
                    node_id: node.id.clone(),
                    stored: node.lineage.clone(),
                    expected: expected_lineage,
                });
            }
            if node.path != expected_path {
                issues.push(IntegrityIssue::StalePath {
                    node_id: node.id.clone(),
                    stored: node.path.clone(),
                    expected: expected_path,
                });
            }
        }

        Ok(IntegrityReport {
            document_id: document_id.clone(),
            node_count: rows.len(),
            issues,
        })
    }
}

/// Deletes every node of `document_id` and every relation touching them.
///
/// Runs inside the caller's transaction; returns the number of nodes removed.
pub(crate) fn purge_document_tree(conn: &Connection, document_id: &DocumentId) -> StoreResult<usize> {
    conn.execute(
        "DELETE FROM node_relations
         WHERE source_id IN (SELECT id FROM standard_nodes WHERE document_id = ?1)
            OR target_id IN (SELECT id FROM standard_nodes WHERE document_id = ?1);",
        params![document_id],
    )?;
    let removed = conn.execute(
        "DELETE FROM standard_nodes WHERE document_id = ?1;",
        params![document_id],
    )?;
    Ok(removed)
}

pub(crate) fn node_exists(conn: &Connection, node_id: &NodeId) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM standard_nodes WHERE id = ?1);",
        params![node_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn document_exists(conn: &Connection, document_id: &DocumentId) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1);",
        params![document_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Walks parent links root-first; `None` (with an issue recorded) when the
/// chain is broken or loops.
fn parent_chain<'a>(
    node: &'a StandardNode,
    by_id: &HashMap<&NodeId, &'a StandardNode>,
    issues: &mut Vec<IntegrityIssue>,
) -> Option<Vec<&'a StandardNode>> {
    let mut chain = vec![node];
    let mut seen = HashSet::from([&node.id]);
    let mut cursor = node.parent_id.as_ref();
    while let Some(parent_id) = cursor {
        // Missing parents were already reported.
        let parent = *by_id.get(parent_id)?;
        if !seen.insert(&parent.id) {
            issues.push(IntegrityIssue::Cycle(node.id.clone()));
            return None;
        }
        chain.push(parent);
        cursor = parent.parent_id.as_ref();
    }
    chain.reverse();
    Some(chain)
}

/// Picks a key for slot `index` among `siblings`, rebalancing the sibling
/// list when the gap is exhausted.
fn place(
    conn: &Connection,
    parent_id: &NodeId,
    siblings: &[(NodeId, f64)],
    index: usize,
    moving: Option<&NodeId>,
    config: &TreeConfig,
) -> StoreResult<f64> {
    let keys: Vec<f64> = siblings.iter().map(|(_, key)| *key).collect();
    if let Some(key) = sort_key::key_for_index(&keys, index, config.sort_precision_digits) {
        return Ok(key);
    }

    let fresh = sort_key::rebalanced(siblings.len() + 1);
    info!(
        "event=sort_rebalance module=tree status=ok parent_id={} siblings={}",
        parent_id,
        siblings.len()
    );

    // Park every affected row on a unique negative key first so the
    // (parent_id, sort_order) index never sees a transient duplicate.
    let affected = siblings.iter().map(|(id, _)| id).chain(moving);
    for (offset, node_id) in affected.enumerate() {
        conn.execute(
            "UPDATE standard_nodes SET sort_order = ?2 WHERE id = ?1;",
            params![node_id, -1.0 - offset as f64],
        )?;
    }

    let mut slots = fresh.iter().copied();
    let mut placed = None;
    for position in 0..=siblings.len() {
        let key = slots.next().ok_or_else(|| {
            StoreError::InvalidData("rebalance produced too few keys".to_string())
        })?;
        if position == index {
            placed = Some(key);
            continue;
        }
        let sibling_position = if position < index { position } else { position - 1 };
        let (sibling_id, _) = &siblings[sibling_position];
        conn.execute(
            "UPDATE standard_nodes
             SET sort_order = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![sibling_id, key],
        )?;
    }
    placed.ok_or_else(|| StoreError::InvalidData(format!("slot {index} out of range")))
}

/// Position of `sibling_id` within `siblings`, or the reason it is unusable.
fn sibling_index(
    conn: &Connection,
    parent_id: &NodeId,
    siblings: &[(NodeId, f64)],
    sibling_id: &NodeId,
) -> StoreResult<usize> {
    if let Some(index) = siblings.iter().position(|(id, _)| id == sibling_id) {
        return Ok(index);
    }
    if node_exists(conn, sibling_id)? {
        Err(Conflict::SiblingNotUnderParent {
            sibling_id: sibling_id.clone(),
            parent_id: parent_id.clone(),
        }
        .into())
    } else {
        Err(Missing::Node(sibling_id.clone()).into())
    }
}

fn sibling_keys(
    conn: &Connection,
    parent_id: &NodeId,
    exclude: Option<&NodeId>,
) -> StoreResult<Vec<(NodeId, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT id, sort_order
         FROM standard_nodes
         WHERE parent_id = ?1
         ORDER BY sort_order ASC, id ASC;",
    )?;
    let mut rows = stmt.query(params![parent_id])?;
    let mut keys = Vec::new();
    while let Some(row) = rows.next()? {
        let id: NodeId = row.get(0)?;
        if Some(&id) == exclude {
            continue;
        }
        keys.push((id, row.get(1)?));
    }
    Ok(keys)
}

/// Rewrites lineage and path prefixes of every node in the subtree rooted at
/// the node whose current values are `old_lineage` / `old_path`.
fn rewrite_subtree(
    conn: &Connection,
    old_lineage: &str,
    new_lineage: &str,
    old_path: &str,
    new_path: &str,
) -> StoreResult<usize> {
    let upper = lineage_upper_bound(old_lineage);
    let changed = conn.execute(
        "UPDATE standard_nodes
         SET lineage = ?3 || substr(lineage, length(?1) + 1),
             path = ?5 || substr(path, length(?4) + 1),
             updated_at = (strftime('%s', 'now') * 1000)
         WHERE lineage >= ?1
           AND lineage < ?2;",
        params![old_lineage, upper, new_lineage, old_path, new_path],
    )?;
    Ok(changed)
}

fn count_subtree(conn: &Connection, lineage: &str) -> StoreResult<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*)
         FROM standard_nodes
         WHERE lineage >= ?1
           AND lineage < ?2;",
        params![lineage, lineage_upper_bound(lineage)],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn load_subtree(conn: &Connection, lineage: &str) -> StoreResult<Vec<StandardNode>> {
    query_nodes(
        conn,
        &format!("{NODE_SELECT_SQL} WHERE lineage >= ?1 AND lineage < ?2;"),
        params![lineage, lineage_upper_bound(lineage)],
    )
}

fn bump_tree_version(conn: &Connection, document_id: &DocumentId) -> StoreResult<()> {
    conn.execute(
        "UPDATE documents SET tree_version = tree_version + 1 WHERE id = ?1;",
        params![document_id],
    )?;
    Ok(())
}

fn find_root_id(conn: &Connection, document_id: &DocumentId) -> StoreResult<Option<NodeId>> {
    Ok(conn
        .query_row(
            "SELECT id
             FROM standard_nodes
             WHERE document_id = ?1
               AND parent_id IS NULL;",
            params![document_id],
            |row| row.get(0),
        )
        .optional()?)
}

fn load_root(conn: &Connection, document_id: &DocumentId) -> StoreResult<StandardNode> {
    let Some(root_id) = find_root_id(conn, document_id)? else {
        let missing = if document_exists(conn, document_id)? {
            Missing::Root(document_id.clone())
        } else {
            Missing::Document(document_id.clone())
        };
        return Err(missing.into());
    };
    load_required_node(conn, &root_id)
}

#[allow(clippy::too_many_arguments)]
fn insert_node_row(
    conn: &Connection,
    node_id: &NodeId,
    document_id: &DocumentId,
    parent_id: Option<&NodeId>,
    sort_order: f64,
    path: &str,
    lineage: &str,
    attributes: &NodeAttributes,
) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO standard_nodes (
            id,
            document_id,
            parent_id,
            kind,
            sort_order,
            notation,
            list_id,
            title,
            description,
            language,
            subjects,
            education_levels,
            concept_terms,
            concept_keywords,
            path,
            lineage,
            canonical_uri,
            source_uri,
            source_id,
            notes,
            extra_fields
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21);",
        params![
            node_id,
            document_id,
            parent_id,
            attributes.kind.as_ref().map(|kind| kind.as_str()),
            sort_order,
            attributes.notation.as_str(),
            attributes.list_id.as_str(),
            attributes.title.as_str(),
            attributes.description.as_str(),
            attributes.language.as_deref(),
            encode_terms(&attributes.subjects)?,
            encode_terms(&attributes.education_levels)?,
            encode_terms(&attributes.concept_terms)?,
            attributes.concept_keywords.as_deref(),
            path,
            lineage,
            attributes.canonical_uri.as_deref(),
            attributes.source_uri.as_deref(),
            attributes.source_id.as_str(),
            attributes.notes.as_deref(),
            encode_extra_fields(&attributes.extra_fields)?,
        ],
    )?;
    Ok(())
}

fn load_node(conn: &Connection, node_id: &NodeId) -> StoreResult<Option<StandardNode>> {
    let mut stmt = conn.prepare(&format!("{NODE_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query(params![node_id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_node_row(row)?));
    }
    Ok(None)
}

fn load_required_node(conn: &Connection, node_id: &NodeId) -> StoreResult<StandardNode> {
    load_node(conn, node_id)?.ok_or_else(|| Missing::Node(node_id.clone()).into())
}

fn query_nodes(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StoreResult<Vec<StandardNode>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut nodes = Vec::new();
    while let Some(row) = rows.next()? {
        nodes.push(parse_node_row(row)?);
    }
    Ok(nodes)
}

fn parse_node_row(row: &Row<'_>) -> StoreResult<StandardNode> {
    let kind: Option<String> = row.get("kind")?;
    let subjects: String = row.get("subjects")?;
    let education_levels: String = row.get("education_levels")?;
    let concept_terms: String = row.get("concept_terms")?;
    let extra_fields: String = row.get("extra_fields")?;

    Ok(StandardNode {
        id: row.get("id")?,
        document_id: row.get("document_id")?,
        parent_id: row.get("parent_id")?,
        sort_order: row.get("sort_order")?,
        path: row.get("path")?,
        lineage: row.get("lineage")?,
        attributes: NodeAttributes {
            kind: kind.map(TermRef::new).transpose()?,
            notation: row.get("notation")?,
            list_id: row.get("list_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            language: row.get("language")?,
            subjects: decode_terms(&subjects, "standard_nodes.subjects")?,
            education_levels: decode_terms(&education_levels, "standard_nodes.education_levels")?,
            concept_terms: decode_terms(&concept_terms, "standard_nodes.concept_terms")?,
            concept_keywords: row.get("concept_keywords")?,
            canonical_uri: row.get("canonical_uri")?,
            source_uri: row.get("source_uri")?,
            source_id: row.get("source_id")?,
            notes: row.get("notes")?,
            extra_fields: decode_extra_fields(&extra_fields, "standard_nodes.extra_fields")?,
        },
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn ensure_tree_connection_ready(conn: &Connection) -> StoreResult<()> {
    ensure_connection_ready(
        conn,
        &[
            ("documents", &["id", "tree_version"]),
            ("standard_nodes", REQUIRED_NODE_COLUMNS),
            ("node_relations", &["source_id", "target_id"]),
        ],
    )
}
