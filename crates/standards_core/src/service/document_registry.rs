//! Document registry use-case service.
//!
//! # Responsibility
//! - Create, read, update and delete standards documents.
//! - Resolve jurisdiction and vocabulary references through the optional
//!   external directories.
//! - Hand out each document's root and full node set.

use crate::error::{Missing, StoreResult};
use crate::external::{
    require_jurisdiction, require_terms, JurisdictionDirectory, TermDirectory, VocabularyKind,
};
use crate::ids::DocumentId;
use crate::model::document::{Document, DocumentMetadata};
use crate::model::node::StandardNode;
use crate::model::refs::JurisdictionRef;
use crate::repo::document_repo::DocumentRepository;
use crate::repo::tree_repo::TreeRepository;
use log::{info, warn};
use std::sync::Arc;

/// Document registry facade.
pub struct DocumentRegistry<D: DocumentRepository, T: TreeRepository> {
    documents: D,
    tree: T,
    jurisdictions: Option<Arc<dyn JurisdictionDirectory>>,
    terms: Option<Arc<dyn TermDirectory>>,
}

impl<D: DocumentRepository, T: TreeRepository> DocumentRegistry<D, T> {
    pub fn new(documents: D, tree: T) -> Self {
        Self {
            documents,
            tree,
            jurisdictions: None,
            terms: None,
        }
    }

    pub fn with_jurisdictions(mut self, jurisdictions: Arc<dyn JurisdictionDirectory>) -> Self {
        self.jurisdictions = Some(jurisdictions);
        self
    }

    pub fn with_terms(mut self, terms: Arc<dyn TermDirectory>) -> Self {
        self.terms = Some(terms);
        self
    }

    /// Registers a new document without any node.
    pub fn create(&self, metadata: &DocumentMetadata) -> StoreResult<Document> {
        self.check(metadata)?;
        match self.documents.create_document(metadata) {
            Ok(document) => {
                info!(
                    "event=document_create module=registry status=ok document_id={}",
                    document.id
                );
                Ok(document)
            }
            Err(err) => {
                warn!(
                    "event=document_create module=registry status=error error_kind={:?}",
                    err.kind()
                );
                Err(err)
            }
        }
    }

    pub fn get(&self, id: &DocumentId) -> StoreResult<Document> {
        self.documents
            .get_document(id)?
            .ok_or_else(|| Missing::Document(id.clone()).into())
    }

    pub fn list(&self, jurisdiction: Option<&JurisdictionRef>) -> StoreResult<Vec<Document>> {
        self.documents.list_documents(jurisdiction)
    }

    /// Replaces the metadata of `id`; the tree is not touched.
    pub fn update_metadata(
        &self,
        id: &DocumentId,
        metadata: &DocumentMetadata,
    ) -> StoreResult<Document> {
        self.check(metadata)?;
        let updated = self.documents.update_metadata(id, metadata)?;
        info!(
            "event=document_update module=registry status=ok document_id={}",
            id
        );
        Ok(updated)
    }

    /// Deletes the document with its tree and every relation touching it.
    /// Returns the number of nodes removed.
    ///
    /// The cascade runs inside the document repository's transaction, so
    /// `T` is not consulted here.
    pub fn delete(&self, id: &DocumentId) -> StoreResult<usize> {
        let removed = self.documents.delete_document(id)?;
        info!(
            "event=document_delete module=registry status=ok document_id={} nodes_removed={}",
            id, removed
        );
        Ok(removed)
    }

    pub fn root(&self, id: &DocumentId) -> StoreResult<StandardNode> {
        self.tree.root(id)
    }

    /// Full node set in pre-order; `NotFound` for an unknown document.
    pub fn nodes(&self, id: &DocumentId) -> StoreResult<Vec<StandardNode>> {
        self.get(id)?;
        self.tree.document_nodes(id)
    }

    fn check(&self, metadata: &DocumentMetadata) -> StoreResult<()> {
        metadata.validate()?;
        require_jurisdiction(self.jurisdictions.as_deref(), &metadata.jurisdiction)?;
        let terms = self.terms.as_deref();
        require_terms(terms, VocabularyKind::LicenseKinds, metadata.license.iter())?;
        require_terms(terms, VocabularyKind::Subjects, &metadata.subjects)?;
        require_terms(terms, VocabularyKind::EducationLevels, &metadata.education_levels)
    }
}
