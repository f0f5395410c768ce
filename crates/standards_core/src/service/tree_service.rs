//! Standards tree use-case service.
//!
//! # Responsibility
//! - Validate caller input before it reaches the tree repository.
//! - Check vocabulary references when a term directory is configured.
//! - Emit structured events for every structural mutation.
//!
//! # Invariants
//! - Structural invariants (single root, acyclic, same document, distinct
//!   sibling keys) are enforced by the repository transaction, not here.

use crate::error::StoreResult;
use crate::external::{require_terms, TermDirectory, VocabularyKind};
use crate::ids::{DocumentId, NodeId};
use crate::model::node::{NewNode, NodeAttributes, StandardNode};
use crate::repo::tree_repo::{RelationPolicy, TreeRepository};
use crate::tree::IntegrityReport;
use log::{debug, info, warn};
use std::sync::Arc;

/// Tree engine facade.
pub struct TreeService<R: TreeRepository> {
    repo: R,
    terms: Option<Arc<dyn TermDirectory>>,
}

impl<R: TreeRepository> TreeService<R> {
    /// Creates service from repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo, terms: None }
    }

    /// Checks node term references against `terms` on every write.
    pub fn with_terms(mut self, terms: Arc<dyn TermDirectory>) -> Self {
        self.terms = Some(terms);
        self
    }

    pub fn create_root(
        &self,
        document_id: &DocumentId,
        node: &NewNode,
    ) -> StoreResult<StandardNode> {
        self.validate_new(node)?;
        let created = logged("create_root", self.repo.create_root(document_id, node))?;
        info!(
            "event=node_create module=tree status=ok document_id={} node_id={} root=true",
            document_id, created.id
        );
        Ok(created)
    }

    /// Appends a child after its last sibling.
    pub fn create_child(&self, parent_id: &NodeId, node: &NewNode) -> StoreResult<StandardNode> {
        self.validate_new(node)?;
        let created = logged("create_child", self.repo.create_child(parent_id, node))?;
        info!(
            "event=node_create module=tree status=ok parent_id={} node_id={} sort_order={}",
            parent_id, created.id, created.sort_order
        );
        Ok(created)
    }

    pub fn insert_child_before(
        &self,
        parent_id: &NodeId,
        before_sibling_id: &NodeId,
        node: &NewNode,
    ) -> StoreResult<StandardNode> {
        self.validate_new(node)?;
        let created = logged(
            "insert_child_before",
            self.repo
                .insert_child_before(parent_id, before_sibling_id, node),
        )?;
        info!(
            "event=node_create module=tree status=ok parent_id={} node_id={} before={} sort_order={}",
            parent_id, created.id, before_sibling_id, created.sort_order
        );
        Ok(created)
    }

    /// Moves a node with its subtree under `new_parent_id`.
    ///
    /// Appends when `before_sibling_id` is `None`. Cost is proportional to
    /// the subtree size.
    pub fn move_node(
        &self,
        node_id: &NodeId,
        new_parent_id: &NodeId,
        before_sibling_id: Option<&NodeId>,
    ) -> StoreResult<StandardNode> {
        let moved = logged(
            "move_node",
            self.repo.move_node(node_id, new_parent_id, before_sibling_id),
        )?;
        info!(
            "event=node_move module=tree status=ok node_id={} parent_id={} sort_order={}",
            node_id, new_parent_id, moved.sort_order
        );
        Ok(moved)
    }

    pub fn update_node(
        &self,
        node_id: &NodeId,
        attributes: &NodeAttributes,
    ) -> StoreResult<StandardNode> {
        attributes.validate()?;
        self.check_terms(attributes)?;
        let updated = logged("update_node", self.repo.update_node(node_id, attributes))?;
        debug!("event=node_update module=tree status=ok node_id={}", node_id);
        Ok(updated)
    }

    /// Deletes a node and its subtree; returns the number of nodes removed.
    pub fn delete_node(&self, node_id: &NodeId, policy: RelationPolicy) -> StoreResult<usize> {
        let removed = logged("delete_node", self.repo.delete_node(node_id, policy))?;
        info!(
            "event=node_delete module=tree status=ok node_id={} removed={} policy={:?}",
            node_id, removed, policy
        );
        Ok(removed)
    }

    pub fn get_node(&self, node_id: &NodeId) -> StoreResult<Option<StandardNode>> {
        self.repo.get_node(node_id)
    }

    pub fn children(&self, node_id: &NodeId) -> StoreResult<Vec<StandardNode>> {
        self.repo.children(node_id)
    }

    pub fn ancestors(&self, node_id: &NodeId) -> StoreResult<Vec<StandardNode>> {
        self.repo.ancestors(node_id)
    }

    pub fn ancestors_by_parent_walk(&self, node_id: &NodeId) -> StoreResult<Vec<StandardNode>> {
        self.repo.ancestors_by_parent_walk(node_id)
    }

    pub fn descendants(&self, node_id: &NodeId) -> StoreResult<Vec<StandardNode>> {
        self.repo.descendants(node_id)
    }

    pub fn subtree_size(&self, node_id: &NodeId) -> StoreResult<usize> {
        self.repo.subtree_size(node_id)
    }

    pub fn root(&self, document_id: &DocumentId) -> StoreResult<StandardNode> {
        self.repo.root(document_id)
    }

    pub fn document_nodes(&self, document_id: &DocumentId) -> StoreResult<Vec<StandardNode>> {
        self.repo.document_nodes(document_id)
    }

    pub fn audit_document(&self, document_id: &DocumentId) -> StoreResult<IntegrityReport> {
        let report = self.repo.audit_document(document_id)?;
        if report.is_clean() {
            debug!(
                "event=tree_audit module=tree status=ok document_id={} nodes={}",
                document_id, report.node_count
            );
        } else {
            warn!(
                "event=tree_audit module=tree status=error document_id={} nodes={} issues={}",
                document_id,
                report.node_count,
                report.issues.len()
            );
        }
        Ok(report)
    }

    fn validate_new(&self, node: &NewNode) -> StoreResult<()> {
        node.validate()?;
        self.check_terms(&node.attributes)
    }

    fn check_terms(&self, attributes: &NodeAttributes) -> StoreResult<()> {
        let terms = self.terms.as_deref();
        require_terms(terms, VocabularyKind::CurriculumElements, attributes.kind.iter())?;
        require_terms(terms, VocabularyKind::Subjects, &attributes.subjects)?;
        require_terms(terms, VocabularyKind::EducationLevels, &attributes.education_levels)?;
        require_terms(terms, VocabularyKind::ConceptTerms, &attributes.concept_terms)
    }
}

/// Logs a failed mutation with its error class before handing it back.
fn logged<T>(operation: &str, result: StoreResult<T>) -> StoreResult<T> {
    if let Err(err) = &result {
        warn!(
            "event={} module=tree status=error error_kind={:?}",
            operation,
            err.kind()
        );
    }
    result
}
