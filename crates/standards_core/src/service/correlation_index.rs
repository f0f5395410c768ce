//! Correlation index use-case service.
//!
//! # Responsibility
//! - Manage crosswalk / correlation collections and their node relations.
//! - Resolve jurisdiction and vocabulary references when directories are
//!   configured.

use crate::error::{Missing, StoreResult};
use crate::external::{
    require_jurisdiction, require_terms, JurisdictionDirectory, TermDirectory, VocabularyKind,
};
use crate::ids::{CollectionId, NodeId, RelationId};
use crate::model::correlation::{
    Collection, CollectionKind, CollectionMetadata, Relation, RelationRole,
};
use crate::model::refs::{check_optional_max_chars, JurisdictionRef};
use crate::repo::correlation_repo::{CorrelationRepository, NewRelation};
use log::info;
use std::sync::Arc;

/// Correlation index facade.
pub struct CorrelationIndex<R: CorrelationRepository> {
    repo: R,
    jurisdictions: Option<Arc<dyn JurisdictionDirectory>>,
    terms: Option<Arc<dyn TermDirectory>>,
}

impl<R: CorrelationRepository> CorrelationIndex<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
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

    pub fn create_collection(
        &self,
        jurisdiction: &JurisdictionRef,
        metadata: &CollectionMetadata,
    ) -> StoreResult<Collection> {
        metadata.validate()?;
        require_jurisdiction(self.jurisdictions.as_deref(), jurisdiction)?;
        let terms = self.terms.as_deref();
        require_terms(terms, VocabularyKind::LicenseKinds, metadata.license.iter())?;
        require_terms(terms, VocabularyKind::Subjects, &metadata.subjects)?;
        require_terms(terms, VocabularyKind::EducationLevels, &metadata.education_levels)?;

        let collection = self.repo.create_collection(jurisdiction, metadata)?;
        info!(
            "event=collection_create module=correlation status=ok collection_id={} kind={}",
            collection.id,
            collection.metadata.kind.as_str()
        );
        Ok(collection)
    }

    pub fn get_collection(&self, id: &CollectionId) -> StoreResult<Collection> {
        self.repo
            .get_collection(id)?
            .ok_or_else(|| Missing::Collection(id.clone()).into())
    }

    pub fn list_collections(
        &self,
        jurisdiction: Option<&JurisdictionRef>,
        kind: Option<CollectionKind>,
    ) -> StoreResult<Vec<Collection>> {
        self.repo.list_collections(jurisdiction, kind)
    }

    /// Deletes the collection; its relations go with it.
    pub fn delete_collection(&self, id: &CollectionId) -> StoreResult<usize> {
        let removed = self.repo.delete_collection(id)?;
        info!(
            "event=collection_delete module=correlation status=ok collection_id={} relations_removed={}",
            id, removed
        );
        Ok(removed)
    }

    /// Records a directed relation. Duplicates and cross-document pairs are
    /// accepted.
    pub fn add_relation(
        &self,
        collection_id: &CollectionId,
        relation: &NewRelation,
    ) -> StoreResult<Relation> {
        check_optional_max_chars("notes", relation.notes.as_deref(), 2000)?;
        require_terms(
            self.terms.as_deref(),
            VocabularyKind::RelationKinds,
            relation.kind.iter(),
        )?;
        let created = self.repo.add_relation(collection_id, relation)?;
        info!(
            "event=relation_add module=correlation status=ok collection_id={} relation_id={} source_id={} target_id={}",
            collection_id, created.id, created.source_id, created.target_id
        );
        Ok(created)
    }

    pub fn get_relation(&self, id: &RelationId) -> StoreResult<Relation> {
        self.repo
            .get_relation(id)?
            .ok_or_else(|| Missing::Relation(id.clone()).into())
    }

    pub fn relations_for(&self, node_id: &NodeId, role: RelationRole) -> StoreResult<Vec<Relation>> {
        self.repo.relations_for(node_id, role)
    }

    pub fn relations_in_collection(&self, collection_id: &CollectionId) -> StoreResult<Vec<Relation>> {
        self.repo.relations_in_collection(collection_id)
    }

    pub fn delete_relation(&self, id: &RelationId) -> StoreResult<()> {
        self.repo.delete_relation(id)?;
        info!(
            "event=relation_delete module=correlation status=ok relation_id={}",
            id
        );
        Ok(())
    }
}
