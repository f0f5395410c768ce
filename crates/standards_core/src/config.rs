//! Runtime configuration for the standards store.
//!
//! # Responsibility
//! - Hold tunables for connection bootstrap and tree maintenance.
//! - Load them from JSON with defaults for every omitted field.
//!
//! # Invariants
//! - A config is only used after [`CoreConfig::validate`] succeeds.
//! - `path_separator` never changes for an existing database; stored paths
//!   are not rewritten when it does.

use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_MOVE_SUBTREE: usize = 10_000;
const DEFAULT_SORT_PRECISION_DIGITS: u32 = 12;
const DEFAULT_PATH_SEPARATOR: &str = "/";
const MAX_SORT_PRECISION_DIGITS: u32 = 15;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// How long a connection waits for the writer lock.
    pub busy_timeout_ms: u64,
    pub tree: TreeConfig,
}

/// Tree engine tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TreeConfig {
    /// Largest subtree (node count, root of the subtree included) a single
    /// move may rewrite.
    pub max_move_subtree: usize,
    /// Relative sibling-key gap, in decimal digits, below which inserting
    /// between two keys triggers a rebalance.
    pub sort_precision_digits: u32,
    /// Joins labels in `path`.
    pub path_separator: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            tree: TreeConfig::default(),
        }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_move_subtree: DEFAULT_MAX_MOVE_SUBTREE,
            sort_precision_digits: DEFAULT_SORT_PRECISION_DIGITS,
            path_separator: DEFAULT_PATH_SEPARATOR.to_string(),
        }
    }
}

impl CoreConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(raw: &str) -> StoreResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| StoreError::validation(format!("invalid config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            StoreError::validation(format!(
                "failed to read config `{}`: {err}",
                path.display()
            ))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.busy_timeout_ms == 0 {
            return Err(StoreError::validation("busy_timeout_ms must be positive"));
        }
        self.tree.validate()
    }
}

impl TreeConfig {
    pub fn validate(&self) -> StoreResult<()> {
        if self.max_move_subtree == 0 {
            return Err(StoreError::validation("max_move_subtree must be positive"));
        }
        if self.sort_precision_digits == 0 || self.sort_precision_digits > MAX_SORT_PRECISION_DIGITS
        {
            return Err(StoreError::validation(format!(
                "sort_precision_digits must be within 1..={MAX_SORT_PRECISION_DIGITS}"
            )));
        }
        if self.path_separator.is_empty() {
            return Err(StoreError::validation("path_separator must not be empty"));
        }
        // Blank notations fall back to the alphanumeric node id.
        if self.path_separator.chars().any(char::is_alphanumeric) {
            return Err(StoreError::validation(
                "path_separator must not contain letters or digits",
            ));
        }
        Ok(())
    }
}
