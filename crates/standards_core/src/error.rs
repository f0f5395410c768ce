//! Domain error taxonomy shared by repositories and services.
//!
//! # Responsibility
//! - Surface every invariant violation as a typed error.
//! - Classify errors into [`ErrorKind`] so an outer API layer can map them to
//!   not-found / conflict / bad-request responses.
//!
//! # Invariants
//! - Structural requests are never coerced; violations become `Conflict`.
//! - Storage failures stay wrapped in `Db` with their source attached.

use crate::db::DbError;
use crate::ids::{CollectionId, DocumentId, IdError, NodeId, RelationId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse error classes exposed to the collaborator boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    Internal,
}

/// Referenced entity that could not be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Document(DocumentId),
    Node(NodeId),
    /// Document exists but has no root node yet.
    Root(DocumentId),
    Collection(CollectionId),
    Relation(RelationId),
    /// Rejected by the configured jurisdiction directory.
    Jurisdiction(String),
}

impl Display for Missing {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Document(id) => write!(f, "document not found: {id}"),
            Self::Node(id) => write!(f, "node not found: {id}"),
            Self::Root(id) => write!(f, "document has no root node: {id}"),
            Self::Collection(id) => write!(f, "collection not found: {id}"),
            Self::Relation(id) => write!(f, "relation not found: {id}"),
            Self::Jurisdiction(id) => write!(f, "jurisdiction not found: {id}"),
        }
    }
}

/// Invariant that a request would have broken.
#[derive(Debug, Clone, PartialEq)]
pub enum Conflict {
    RootExists {
        document_id: DocumentId,
        root_id: NodeId,
    },
    CrossDocument {
        node_id: NodeId,
        parent_id: NodeId,
    },
    Cycle {
        node_id: NodeId,
        parent_id: NodeId,
    },
    SiblingNotUnderParent {
        sibling_id: NodeId,
        parent_id: NodeId,
    },
    DuplicateSortOrder {
        parent_id: NodeId,
        sort_order: f64,
    },
    NodeReferenced {
        node_id: NodeId,
        relation_count: usize,
    },
    SubtreeTooLarge {
        node_id: NodeId,
        size: usize,
        limit: usize,
    },
    DuplicateDocumentName(String),
    DuplicateCollectionName {
        jurisdiction: String,
        name: String,
    },
}

impl Display for Conflict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RootExists {
                document_id,
                root_id,
            } => write!(f, "document {document_id} already has root node {root_id}"),
            Self::CrossDocument { node_id, parent_id } => write!(
                f,
                "node {node_id} cannot be attached to {parent_id} from another document"
            ),
            Self::Cycle { node_id, parent_id } => write!(
                f,
                "move would create cycle: node {node_id} under parent {parent_id}"
            ),
            Self::SiblingNotUnderParent {
                sibling_id,
                parent_id,
            } => write!(f, "node {sibling_id} is not a child of {parent_id}"),
            Self::DuplicateSortOrder {
                parent_id,
                sort_order,
            } => write!(
                f,
                "sort order {sort_order} is already used by a child of {parent_id}"
            ),
            Self::NodeReferenced {
                node_id,
                relation_count,
            } => write!(
                f,
                "subtree of node {node_id} is referenced by {relation_count} relation(s)"
            ),
            Self::SubtreeTooLarge {
                node_id,
                size,
                limit,
            } => write!(
                f,
                "subtree of node {node_id} has {size} nodes, move limit is {limit}"
            ),
            Self::DuplicateDocumentName(name) => write!(f, "document name already used: {name}"),
            Self::DuplicateCollectionName { jurisdiction, name } => write!(
                f,
                "collection name `{name}` already used in jurisdiction {jurisdiction}"
            ),
        }
    }
}

#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    NotFound(Missing),
    Conflict(Conflict),
    /// Malformed caller input.
    Validation(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Db(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::MissingRequiredColumn { .. }
            | Self::InvalidData(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(missing) => write!(f, "{missing}"),
            Self::Conflict(conflict) => write!(f, "{conflict}"),
            Self::Validation(message) => write!(f, "invalid input: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "standards store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "standards store requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "standards store requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<IdError> for StoreError {
    fn from(value: IdError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<Missing> for StoreError {
    fn from(value: Missing) -> Self {
        Self::NotFound(value)
    }
}

impl From<Conflict> for StoreError {
    fn from(value: Conflict) -> Self {
        Self::Conflict(value)
    }
}
