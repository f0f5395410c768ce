//! Prefixed short identifiers for every persisted entity.
//!
//! # Responsibility
//! - Generate collision-resistant ids (random 128-bit UUIDs) rendered as a
//!   one-letter type prefix plus a fixed-width base57 body.
//! - Reject ids whose prefix belongs to another entity type.
//!
//! # Invariants
//! - Body is exactly [`ID_BODY_LEN`] characters from [`ALPHABET`].
//! - The alphabet contains no `/`, `%` or `_`, so ids are safe inside lineage
//!   strings and SQL range predicates.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Base57 alphabet without visually ambiguous characters (`0 O 1 I l`).
pub const ALPHABET: &[u8; 57] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Number of base57 digits needed to hold a `u128`.
pub const ID_BODY_LEN: usize = 22;

/// Error returned when a string is not a valid id of the requested type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdError {
    /// Entity label of the expected id type.
    pub entity: &'static str,
    /// Offending input.
    pub value: String,
}

impl Display for IdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {} id `{}`", self.entity, self.value)
    }
}

impl Error for IdError {}

fn encode_body(mut value: u128) -> String {
    let base = ALPHABET.len() as u128;
    let mut digits = [ALPHABET[0]; ID_BODY_LEN];
    for slot in digits.iter_mut().rev() {
        *slot = ALPHABET[(value % base) as usize];
        value /= base;
    }
    digits.iter().map(|byte| char::from(*byte)).collect()
}

fn is_valid_body(body: &str) -> bool {
    body.len() == ID_BODY_LEN && body.bytes().all(|byte| ALPHABET.contains(&byte))
}

macro_rules! prefixed_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal, $entity:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Type prefix carried by every id of this kind.
            pub const PREFIX: char = $prefix;

            /// Allocates a fresh random id.
            pub fn generate() -> Self {
                Self(format!("{}{}", Self::PREFIX, encode_body(Uuid::new_v4().as_u128())))
            }

            /// Parses an id, checking prefix and body shape.
            pub fn parse(value: &str) -> Result<Self, IdError> {
                let trimmed = value.trim();
                match trimmed.strip_prefix(Self::PREFIX) {
                    Some(body) if is_valid_body(body) => Ok(Self(trimmed.to_string())),
                    _ => Err(IdError {
                        entity: $entity,
                        value: value.to_string(),
                    }),
                }
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

        impl std::str::FromStr for $name {
            type Err = IdError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Self::parse(value)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                Self::parse(text).map_err(|err| FromSqlError::Other(Box::new(err)))
            }
        }
    };
}

prefixed_id!(
    /// Standards document id (`D…`).
    DocumentId,
    'D',
    "document"
);
prefixed_id!(
    /// Standard node id (`S…`).
    NodeId,
    'S',
    "node"
);
prefixed_id!(
    /// Crosswalk / correlation collection id (`C…`).
    CollectionId,
    'C',
    "collection"
);
prefixed_id!(
    /// Node relation id (`R…`).
    RelationId,
    'R',
    "relation"
);

#[cfg(test)]
mod tests {
    use super::{encode_body, CollectionId, DocumentId, NodeId, RelationId, ALPHABET, ID_BODY_LEN};
    use std::collections::HashSet;

    #[test]
    fn generated_ids_carry_prefix_and_fixed_width_body() {
        let id = NodeId::generate();
        assert!(id.as_str().starts_with('S'));
        assert_eq!(id.as_str().len(), ID_BODY_LEN + 1);
        assert_eq!(NodeId::parse(id.as_str()).unwrap(), id);
    }

    #[test]
    fn parse_rejects_foreign_prefix() {
        let document_id = DocumentId::generate();
        let err = NodeId::parse(document_id.as_str()).unwrap_err();
        assert_eq!(err.entity, "node");
        assert!(CollectionId::parse(document_id.as_str()).is_err());
        assert!(RelationId::parse("R").is_err());
    }

    #[test]
    fn parse_rejects_characters_outside_alphabet() {
        let mut raw = NodeId::generate().as_str().to_string();
        raw.replace_range(5..6, "0");
        assert!(NodeId::parse(&raw).is_err());
    }

    #[test]
    fn encode_body_pads_small_values() {
        let zero = encode_body(0);
        assert_eq!(zero.len(), ID_BODY_LEN);
        assert!(zero.bytes().all(|byte| byte == ALPHABET[0]));
        assert_eq!(encode_body(u128::MAX).len(), ID_BODY_LEN);
    }

    #[test]
    fn generation_does_not_repeat() {
        let ids: HashSet<_> = (0..2_000).map(|_| NodeId::generate()).collect();
        assert_eq!(ids.len(), 2_000);
    }

    #[test]
    fn serde_round_trips_through_plain_string() {
        let id = DocumentId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: DocumentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<DocumentId>("\"S123\"").is_err());
    }
}
