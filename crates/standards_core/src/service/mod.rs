//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Validate caller input and resolve external references before storage.

pub mod correlation_index;
pub mod document_registry;
pub mod tree_service;
