//! References into externally owned vocabularies and shared field checks.
//!
//! # Responsibility
//! - Opaque `TermRef` / `JurisdictionRef` newtypes: the core stores the
//!   reference, resolution belongs to the directories in `crate::external`.
//! - Field-level validators used by document, node and collection models.
//!
//! # Invariants
//! - References are trimmed and never blank.
//! - Attribute bags are JSON objects; no schema is applied to their values.

use crate::error::{StoreError, StoreResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Open key-value map for forward-compatible fields.
pub type ExtraFields = serde_json::Map<String, serde_json::Value>;

const MAX_REF_CHARS: usize = 200;

static LANGUAGE_CODE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z0-9]{2,8})*$"));
static ISO_DATE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^\d{4}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])$"));

macro_rules! reference {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> StoreResult<Self> {
                let value = value.into();
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(StoreError::validation(concat!($label, " must not be blank")));
                }
                check_max_chars($label, trimmed, MAX_REF_CHARS)?;
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = StoreError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

reference!(
    /// Reference to a controlled-vocabulary term.
    TermRef,
    "term reference"
);
reference!(
    /// Reference to a jurisdiction record.
    JurisdictionRef,
    "jurisdiction reference"
);

pub(crate) fn check_max_chars(field: &str, value: &str, max_chars: usize) -> StoreResult<()> {
    let count = value.chars().count();
    if count > max_chars {
        return Err(StoreError::validation(format!(
            "{field} exceeds {max_chars} characters ({count})"
        )));
    }
    Ok(())
}

pub(crate) fn check_optional_max_chars(
    field: &str,
    value: Option<&str>,
    max_chars: usize,
) -> StoreResult<()> {
    match value {
        Some(value) => check_max_chars(field, value, max_chars),
        None => Ok(()),
    }
}

pub(crate) fn check_not_blank(field: &str, value: &str) -> StoreResult<()> {
    if value.trim().is_empty() {
        return Err(StoreError::validation(format!("{field} must not be blank")));
    }
    Ok(())
}

/// BCP47-shaped code such as `en`, `es`, `fr-CA`.
pub(crate) fn check_language(value: Option<&str>) -> StoreResult<()> {
    let Some(value) = value else {
        return Ok(());
    };
    check_max_chars("language", value, 20)?;
    if matches_pattern(&LANGUAGE_CODE, value)? {
        Ok(())
    } else {
        Err(StoreError::validation(format!(
            "language `{value}` is not a BCP47 code"
        )))
    }
}

/// `YYYY-MM-DD`.
pub(crate) fn check_iso_date(field: &str, value: Option<&str>) -> StoreResult<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if matches_pattern(&ISO_DATE, value)? {
        Ok(())
    } else {
        Err(StoreError::validation(format!(
            "{field} `{value}` is not a YYYY-MM-DD date"
        )))
    }
}

fn matches_pattern(
    pattern: &Lazy<Result<Regex, regex::Error>>,
    value: &str,
) -> StoreResult<bool> {
    match pattern.as_ref() {
        Ok(regex) => Ok(regex.is_match(value)),
        Err(err) => Err(StoreError::InvalidData(format!(
            "validation pattern failed to compile: {err}"
        ))),
    }
}

pub(crate) fn encode_terms(terms: &[TermRef]) -> StoreResult<String> {
    serde_json::to_string(terms)
        .map_err(|err| StoreError::InvalidData(format!("failed to encode term list: {err}")))
}

pub(crate) fn decode_terms(raw: &str, column: &str) -> StoreResult<Vec<TermRef>> {
    serde_json::from_str(raw)
        .map_err(|err| StoreError::InvalidData(format!("invalid term list in {column}: {err}")))
}

pub(crate) fn encode_extra_fields(fields: &ExtraFields) -> StoreResult<String> {
    serde_json::to_string(fields)
        .map_err(|err| StoreError::InvalidData(format!("failed to encode extra_fields: {err}")))
}

pub(crate) fn decode_extra_fields(raw: &str, column: &str) -> StoreResult<ExtraFields> {
    serde_json::from_str(raw)
        .map_err(|err| StoreError::InvalidData(format!("invalid JSON object in {column}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::{
        check_iso_date, check_language, decode_extra_fields, decode_terms, encode_terms,
        JurisdictionRef, TermRef,
    };

    #[test]
    fn references_are_trimmed_and_non_blank() {
        assert_eq!(TermRef::new("  math ").unwrap().as_str(), "math");
        assert!(JurisdictionRef::new("   ").is_err());
        assert!(serde_json::from_str::<TermRef>("\"\"").is_err());
    }

    #[test]
    fn language_codes_follow_bcp47_shape() {
        check_language(Some("en")).unwrap();
        check_language(Some("fr-CA")).unwrap();
        check_language(None).unwrap();
        assert!(check_language(Some("english please")).is_err());
    }

    #[test]
    fn dates_must_be_iso() {
        check_iso_date("date_valid", Some("2010-06-02")).unwrap();
        assert!(check_iso_date("date_valid", Some("06/02/2010")).is_err());
        assert!(check_iso_date("date_valid", Some("2010-13-02")).is_err());
    }

    #[test]
    fn stored_term_lists_and_bags_decode() {
        let terms = vec![TermRef::new("math").unwrap(), TermRef::new("science").unwrap()];
        let raw = encode_terms(&terms).unwrap();
        assert_eq!(decode_terms(&raw, "subjects").unwrap(), terms);
        assert!(decode_extra_fields("[1, 2]", "extra_fields").is_err());
        assert!(decode_extra_fields("{\"grade\": 3}", "extra_fields").is_ok());
    }
}
