//! Standard node model.
//!
//! # Responsibility
//! - Define the node read model returned by the tree engine.
//! - Define caller-supplied node attributes and their validation.
//!
//! # Invariants
//! - `document_id` never changes after creation.
//! - `parent_id` is `None` only for the document root.
//! - `path` and `lineage` are maintained by the engine, never by callers.

use crate::error::{StoreError, StoreResult};
use crate::ids::{DocumentId, NodeId};
use crate::model::refs::{
    check_language, check_max_chars, check_optional_max_chars, ExtraFields, TermRef,
};
use crate::tree::{path, sort_key};
use serde::{Deserialize, Serialize};

/// Caller-owned node fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAttributes {
    /// Curriculum element kind (strand, cluster, standard, …).
    pub kind: Option<TermRef>,
    /// Human-referenceable code, e.g. `K.CC.A.1`.
    pub notation: String,
    /// Symbol denoting the position within a list (`a`, `ii`, …).
    pub list_id: String,
    pub title: String,
    pub description: String,
    pub language: Option<String>,
    pub subjects: Vec<TermRef>,
    pub education_levels: Vec<TermRef>,
    pub concept_terms: Vec<TermRef>,
    /// Free form, comma-separated.
    pub concept_keywords: Option<String>,
    pub canonical_uri: Option<String>,
    pub source_uri: Option<String>,
    pub source_id: String,
    pub notes: Option<String>,
    pub extra_fields: ExtraFields,
}

impl NodeAttributes {
    pub fn new(notation: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            notation: notation.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_kind(mut self, kind: TermRef) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        check_max_chars("notation", &self.notation, 200)?;
        check_max_chars("list_id", &self.list_id, 50)?;
        check_max_chars("title", &self.title, 200)?;
        check_language(self.language.as_deref())?;
        check_optional_max_chars("concept_keywords", self.concept_keywords.as_deref(), 500)?;
        check_optional_max_chars("canonical_uri", self.canonical_uri.as_deref(), 512)?;
        check_optional_max_chars("source_uri", self.source_uri.as_deref(), 512)?;
        check_max_chars("source_id", &self.source_id, 100)?;
        Ok(())
    }
}

/// Input for node creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewNode {
    pub attributes: NodeAttributes,
    /// Explicit sibling key. Must be finite, positive and unused among
    /// siblings. `None` lets the engine choose.
    pub sort_order: Option<f64>,
}

impl NewNode {
    pub fn new(attributes: NodeAttributes) -> Self {
        Self {
            attributes,
            sort_order: None,
        }
    }

    pub fn with_sort_order(mut self, sort_order: f64) -> Self {
        self.sort_order = Some(sort_order);
        self
    }

    pub fn validate(&self) -> StoreResult<()> {
        self.attributes.validate()?;
        if let Some(value) = self.sort_order {
            sort_key::validate_override(value).map_err(StoreError::Validation)?;
        }
        Ok(())
    }
}

impl From<NodeAttributes> for NewNode {
    fn from(value: NodeAttributes) -> Self {
        Self::new(value)
    }
}

/// Node read model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardNode {
    pub id: NodeId,
    pub document_id: DocumentId,
    pub parent_id: Option<NodeId>,
    /// Sibling order key, ascending.
    pub sort_order: f64,
    /// Ancestor labels joined by the configured separator, ending in this
    /// node's label.
    pub path: String,
    /// `/<root id>/…/<own id>/`.
    pub lineage: String,
    pub attributes: NodeAttributes,
    /// Epoch ms.
    pub created_at: i64,
    /// Epoch ms.
    pub updated_at: i64,
}

impl StandardNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Root has depth 0.
    pub fn depth(&self) -> usize {
        path::depth(&self.lineage)
    }

    /// Segment this node contributes to `path`.
    pub fn label(&self) -> &str {
        path::label(&self.attributes.notation, &self.id)
    }
}
