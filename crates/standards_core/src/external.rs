//! Read-only collaborator interfaces for jurisdictions and vocabulary terms.
//!
//! # Responsibility
//! - Let services confirm that stored references resolve, without owning the
//!   jurisdiction or vocabulary data.
//! - Provide in-memory directories for embedding and tests.
//!
//! # Invariants
//! - The core never writes through these interfaces.
//! - Whether a term belongs to the expected vocabulary is decided by the
//!   directory, not by the core.

use crate::error::{Missing, StoreError, StoreResult};
use crate::model::refs::{JurisdictionRef, TermRef};
use std::collections::{BTreeMap, BTreeSet};

/// Vocabulary a term reference is expected to come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VocabularyKind {
    LicenseKinds,
    Subjects,
    EducationLevels,
    CurriculumElements,
    ConceptTerms,
    /// Kinds of crosswalk / correlation relations.
    RelationKinds,
}

impl VocabularyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LicenseKinds => "license_kinds",
            Self::Subjects => "subjects",
            Self::EducationLevels => "education_levels",
            Self::CurriculumElements => "curriculum_elements",
            Self::ConceptTerms => "concept_terms",
            Self::RelationKinds => "relation_kinds",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Jurisdiction {
    pub id: JurisdictionRef,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermLabel {
    pub vocabulary: VocabularyKind,
    pub term: TermRef,
    pub label: String,
}

pub trait JurisdictionDirectory: Send + Sync {
    fn resolve(&self, jurisdiction: &JurisdictionRef) -> Option<Jurisdiction>;
}

pub trait TermDirectory: Send + Sync {
    fn resolve(&self, vocabulary: VocabularyKind, term: &TermRef) -> Option<TermLabel>;
}

/// Fails with `NotFound` when a directory is configured and cannot resolve
/// `jurisdiction`.
pub(crate) fn require_jurisdiction(
    directory: Option<&dyn JurisdictionDirectory>,
    jurisdiction: &JurisdictionRef,
) -> StoreResult<()> {
    match directory {
        Some(directory) if directory.resolve(jurisdiction).is_none() => Err(StoreError::NotFound(
            Missing::Jurisdiction(jurisdiction.to_string()),
        )),
        _ => Ok(()),
    }
}

/// Fails with `Validation` when a directory is configured and any of `terms`
/// does not resolve within `vocabulary`.
pub(crate) fn require_terms<'a>(
    directory: Option<&dyn TermDirectory>,
    vocabulary: VocabularyKind,
    terms: impl IntoIterator<Item = &'a TermRef>,
) -> StoreResult<()> {
    let Some(directory) = directory else {
        return Ok(());
    };
    for term in terms {
        if directory.resolve(vocabulary, term).is_none() {
            return Err(StoreError::validation(format!(
                "term `{term}` is not in vocabulary {}",
                vocabulary.as_str()
            )));
        }
    }
    Ok(())
}

/// Fixed jurisdiction list.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJurisdictions {
    entries: BTreeMap<JurisdictionRef, String>,
}

impl InMemoryJurisdictions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: JurisdictionRef, name: impl Into<String>) -> Self {
        self.entries.insert(id, name.into());
        self
    }
}

impl JurisdictionDirectory for InMemoryJurisdictions {
    fn resolve(&self, jurisdiction: &JurisdictionRef) -> Option<Jurisdiction> {
        self.entries.get(jurisdiction).map(|name| Jurisdiction {
            id: jurisdiction.clone(),
            name: name.clone(),
        })
    }
}

/// Fixed set of vocabularies; labels default to the term reference itself.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTerms {
    entries: BTreeSet<(VocabularyKind, TermRef)>,
}

impl InMemoryTerms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, vocabulary: VocabularyKind, term: TermRef) -> Self {
        self.entries.insert((vocabulary, term));
        self
    }
}

impl TermDirectory for InMemoryTerms {
    fn resolve(&self, vocabulary: VocabularyKind, term: &TermRef) -> Option<TermLabel> {
        self.entries
            .contains(&(vocabulary, term.clone()))
            .then(|| TermLabel {
                vocabulary,
                term: term.clone(),
                label: term.to_string(),
            })
    }
}
