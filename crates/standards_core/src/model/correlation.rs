//! Crosswalk / correlation collections and node relations.
//!
//! # Invariants
//! - A relation belongs to exactly one collection and dies with it.
//! - Relations reference nodes weakly and may span documents.
//! - Duplicate `(source, target, kind)` relations are allowed.

use crate::error::StoreResult;
use crate::ids::{CollectionId, NodeId, RelationId};
use crate::model::refs::{
    check_max_chars, check_not_blank, ExtraFields, JurisdictionRef, TermRef,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    /// Standard-to-standard alignments.
    Crosswalk,
    /// Content-to-standard alignments.
    Correlation,
}

impl CollectionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Crosswalk => "crosswalk",
            Self::Correlation => "correlation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "crosswalk" => Some(Self::Crosswalk),
            "correlation" => Some(Self::Correlation),
            _ => None,
        }
    }
}

/// Caller-owned collection fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub kind: CollectionKind,
    /// Unique within the owning jurisdiction.
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub license: Option<TermRef>,
    pub subjects: Vec<TermRef>,
    pub education_levels: Vec<TermRef>,
    pub notes: Option<String>,
    pub extra_fields: ExtraFields,
}

impl CollectionMetadata {
    pub fn new(kind: CollectionKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            title: String::new(),
            description: None,
            license: None,
            subjects: Vec::new(),
            education_levels: Vec::new(),
            notes: None,
            extra_fields: ExtraFields::new(),
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        check_not_blank("name", &self.name)?;
        check_max_chars("name", &self.name, 200)?;
        check_max_chars("title", &self.title, 200)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub jurisdiction: JurisdictionRef,
    pub metadata: CollectionMetadata,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Directed, typed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    pub collection_id: CollectionId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub kind: Option<TermRef>,
    pub notes: Option<String>,
    pub extra_fields: ExtraFields,
    pub created_at: i64,
}

/// Which endpoint of a relation a node must occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationRole {
    Source,
    Target,
    Either,
}

#[cfg(test)]
mod tests {
    use super::{CollectionKind, CollectionMetadata};

    #[test]
    fn kind_names_round_trip() {
        for kind in [CollectionKind::Crosswalk, CollectionKind::Correlation] {
            assert_eq!(CollectionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(CollectionKind::parse("mapping"), None);
    }

    #[test]
    fn blank_collection_name_is_rejected() {
        assert!(CollectionMetadata::new(CollectionKind::Crosswalk, " ")
            .validate()
            .is_err());
    }
}
