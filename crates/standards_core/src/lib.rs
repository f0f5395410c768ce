//! Core storage engine for hierarchical curriculum standards.
//!
//! Documents own one ordered node tree each; collections own typed relations
//! between nodes of any documents. This crate is the single source of truth
//! for the structural invariants of both.

pub mod config;
pub mod db;
pub mod error;
pub mod external;
pub mod ids;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod tree;

pub use config::{CoreConfig, TreeConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_config, DbError};
pub use error::{Conflict, ErrorKind, Missing, StoreError, StoreResult};
pub use external::{
    InMemoryJurisdictions, InMemoryTerms, Jurisdiction, JurisdictionDirectory, TermDirectory,
    TermLabel, VocabularyKind,
};
pub use ids::{CollectionId, DocumentId, IdError, NodeId, RelationId};
pub use logging::{default_log_level, init_logging, logging_status, LoggingStatus};
pub use model::correlation::{
    Collection, CollectionKind, CollectionMetadata, Relation, RelationRole,
};
pub use model::document::{DigitizationMethod, Document, DocumentMetadata, PublicationStatus};
pub use model::node::{NewNode, NodeAttributes, StandardNode};
pub use model::refs::{ExtraFields, JurisdictionRef, TermRef};
pub use repo::correlation_repo::{CorrelationRepository, NewRelation, SqliteCorrelationRepository};
pub use repo::document_repo::{DocumentRepository, SqliteDocumentRepository};
pub use repo::tree_repo::{RelationPolicy, SqliteTreeRepository, TreeRepository};
pub use service::correlation_index::CorrelationIndex;
pub use service::document_registry::DocumentRegistry;
pub use service::tree_service::TreeService;
pub use tree::{IntegrityIssue, IntegrityReport};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
