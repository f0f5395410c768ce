//! Domain model for standards documents, their node trees and relations.
//!
//! # Responsibility
//! - Define canonical records shared by repositories and services.
//! - Validate caller-supplied fields before they reach storage.
//!
//! # Invariants
//! - Every entity is identified by a prefixed id from `crate::ids`.
//! - Engine-maintained fields (`path`, `lineage`, `sort_order`,
//!   `tree_version`, timestamps) are never taken from callers.

pub mod correlation;
pub mod document;
pub mod node;
pub mod refs;
