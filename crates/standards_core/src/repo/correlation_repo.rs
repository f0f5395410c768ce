//! Correlation index repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist crosswalk / correlation collections and their node relations.
//! - Answer "which relations involve this node" without touching the tree.
//!
//! # Invariants
//! - Collection names are unique per jurisdiction.
//! - Relations die with their collection.
//! - Relation endpoints must exist at insert time; they may live in
//!   different documents.

use crate::error::{Conflict, Missing, StoreError, StoreResult};
use crate::ids::{CollectionId, NodeId, RelationId};
use crate::model::correlation::{
    Collection, CollectionKind, CollectionMetadata, Relation, RelationRole,
};
use crate::model::refs::{
    decode_extra_fields, decode_terms, encode_extra_fields, encode_terms, ExtraFields,
    JurisdictionRef, TermRef,
};
use crate::repo::tree_repo::node_exists;
use crate::repo::{ensure_connection_ready, map_unique_violation, write_tx};
use rusqlite::{params, Connection, OptionalExtension, Row};

const COLLECTION_SELECT_SQL: &str = "SELECT
    id,
    kind,
    jurisdiction,
    name,
    title,
    description,
    license,
    subjects,
    education_levels,
    notes,
    extra_fields,
    created_at,
    updated_at
FROM collections";

const RELATION_SELECT_SQL: &str = "SELECT
    id,
    collection_id,
    source_id,
    target_id,
    kind,
    notes,
    extra_fields,
    created_at
FROM node_relations";

/// Input for relation creation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRelation {
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub kind: Option<TermRef>,
    pub notes: Option<String>,
    pub extra_fields: ExtraFields,
}

impl NewRelation {
    pub fn new(source_id: NodeId, target_id: NodeId) -> Self {
        Self {
            source_id,
            target_id,
            kind: None,
            notes: None,
            extra_fields: ExtraFields::new(),
        }
    }

    pub fn with_kind(mut self, kind: TermRef) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Repository interface for collections and node relations.
pub trait CorrelationRepository {
    fn create_collection(
        &self,
        jurisdiction: &JurisdictionRef,
        metadata: &CollectionMetadata,
    ) -> StoreResult<Collection>;
    fn get_collection(&self, id: &CollectionId) -> StoreResult<Option<Collection>>;
    /// Ordered by jurisdiction then name.
    fn list_collections(
        &self,
        jurisdiction: Option<&JurisdictionRef>,
        kind: Option<CollectionKind>,
    ) -> StoreResult<Vec<Collection>>;
    /// Deletes the collection and all of its relations; returns the number of
    /// relations removed.
    fn delete_collection(&self, id: &CollectionId) -> StoreResult<usize>;
    fn add_relation(&self, collection_id: &CollectionId, relation: &NewRelation)
        -> StoreResult<Relation>;
    fn get_relation(&self, id: &RelationId) -> StoreResult<Option<Relation>>;
    /// Relations where `node_id` occupies `role`, oldest first (insertion
    /// order breaks timestamp ties).
    fn relations_for(&self, node_id: &NodeId, role: RelationRole) -> StoreResult<Vec<Relation>>;
    /// All relations of one collection, oldest first.
    fn relations_in_collection(&self, collection_id: &CollectionId) -> StoreResult<Vec<Relation>>;
    fn delete_relation(&self, id: &RelationId) -> StoreResult<()>;
}

/// SQLite-backed correlation repository.
pub struct SqliteCorrelationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCorrelationRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_connection_ready(
            conn,
            &[
                ("collections", &["id", "kind", "jurisdiction", "name"]),
                (
                    "node_relations",
                    &["id", "collection_id", "source_id", "target_id", "kind"],
                ),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl CorrelationRepository for SqliteCorrelationRepository<'_> {
    fn create_collection(
        &self,
        jurisdiction: &JurisdictionRef,
        metadata: &CollectionMetadata,
    ) -> StoreResult<Collection> {
        let id = CollectionId::generate();
        let tx = write_tx(self.conn)?;
        tx.execute(
            "INSERT INTO collections (
                id,
                kind,
                jurisdiction,
                name,
                title,
                description,
                license,
                subjects,
                education_levels,
                notes,
                extra_fields
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                id,
                metadata.kind.as_str(),
                jurisdiction.as_str(),
                metadata.name.as_str(),
                metadata.title.as_str(),
                metadata.description.as_deref(),
                metadata.license.as_ref().map(TermRef::as_str),
                encode_terms(&metadata.subjects)?,
                encode_terms(&metadata.education_levels)?,
                metadata.notes.as_deref(),
                encode_extra_fields(&metadata.extra_fields)?,
            ],
        )
        .map_err(|err| {
            map_unique_violation(err, || {
                Conflict::DuplicateCollectionName {
                    jurisdiction: jurisdiction.to_string(),
                    name: metadata.name.clone(),
                }
                .into()
            })
        })?;
        let created = load_collection(&tx, &id)?
            .ok_or_else(|| StoreError::from(Missing::Collection(id.clone())))?;
        tx.commit()?;
        Ok(created)
    }

    fn get_collection(&self, id: &CollectionId) -> StoreResult<Option<Collection>> {
        load_collection(self.conn, id)
    }

    fn list_collections(
        &self,
        jurisdiction: Option<&JurisdictionRef>,
        kind: Option<CollectionKind>,
    ) -> StoreResult<Vec<Collection>> {
        let mut stmt = self.conn.prepare(&format!(
            "{COLLECTION_SELECT_SQL}
             WHERE (?1 IS NULL OR jurisdiction = ?1)
               AND (?2 IS NULL OR kind = ?2)
             ORDER BY jurisdiction ASC, name ASC;"
        ))?;
        let mut rows = stmt.query(params![
            jurisdiction.map(JurisdictionRef::as_str),
            kind.map(CollectionKind::as_str),
        ])?;
        let mut collections = Vec::new();
        while let Some(row) = rows.next()? {
            collections.push(parse_collection_row(row)?);
        }
        Ok(collections)
    }

    fn delete_collection(&self, id: &CollectionId) -> StoreResult<usize> {
        let tx = write_tx(self.conn)?;
        let relations = tx.execute(
            "DELETE FROM node_relations WHERE collection_id = ?1;",
            params![id],
        )?;
        let removed = tx.execute("DELETE FROM collections WHERE id = ?1;", params![id])?;
        if removed == 0 {
            return Err(Missing::Collection(id.clone()).into());
        }
        tx.commit()?;
        Ok(relations)
    }

    fn add_relation(
        &self,
        collection_id: &CollectionId,
        relation: &NewRelation,
    ) -> StoreResult<Relation> {
        let tx = write_tx(self.conn)?;
        if !collection_exists(&tx, collection_id)? {
            return Err(Missing::Collection(collection_id.clone()).into());
        }
        for endpoint in [&relation.source_id, &relation.target_id] {
            if !node_exists(&tx, endpoint)? {
                return Err(Missing::Node(endpoint.clone()).into());
            }
        }

        let id = RelationId::generate();
        tx.execute(
            "INSERT INTO node_relations (
                id,
                collection_id,
                source_id,
                target_id,
                kind,
                notes,
                extra_fields
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                id,
                collection_id,
                relation.source_id,
                relation.target_id,
                relation.kind.as_ref().map(TermRef::as_str),
                relation.notes.as_deref(),
                encode_extra_fields(&relation.extra_fields)?,
            ],
        )?;
        let created = load_relation(&tx, &id)?
            .ok_or_else(|| StoreError::from(Missing::Relation(id.clone())))?;
        tx.commit()?;
        Ok(created)
    }

    fn get_relation(&self, id: &RelationId) -> StoreResult<Option<Relation>> {
        load_relation(self.conn, id)
    }

    fn relations_for(&self, node_id: &NodeId, role: RelationRole) -> StoreResult<Vec<Relation>> {
        if !node_exists(self.conn, node_id)? {
            return Err(Missing::Node(node_id.clone()).into());
        }
        let predicate = match role {
            RelationRole::Source => "source_id = ?1",
            RelationRole::Target => "target_id = ?1",
            RelationRole::Either => "(source_id = ?1 OR target_id = ?1)",
        };
        query_relations(
            self.conn,
            &format!("{RELATION_SELECT_SQL} WHERE {predicate} ORDER BY created_at ASC, rowid ASC;"),
            node_id,
        )
    }

    fn relations_in_collection(&self, collection_id: &CollectionId) -> StoreResult<Vec<Relation>> {
        if !collection_exists(self.conn, collection_id)? {
            return Err(Missing::Collection(collection_id.clone()).into());
        }
        query_relations(
            self.conn,
            &format!(
                "{RELATION_SELECT_SQL} WHERE collection_id = ?1 ORDER BY created_at ASC, rowid ASC;"
            ),
            collection_id,
        )
    }

    fn delete_relation(&self, id: &RelationId) -> StoreResult<()> {
        let removed = self
            .conn
            .execute("DELETE FROM node_relations WHERE id = ?1;", params![id])?;
        if removed == 0 {
            return Err(Missing::Relation(id.clone()).into());
        }
        Ok(())
    }
}

fn collection_exists(conn: &Connection, id: &CollectionId) -> StoreResult<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM collections WHERE id = ?1;",
            params![id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

fn load_collection(conn: &Connection, id: &CollectionId) -> StoreResult<Option<Collection>> {
    let mut stmt = conn.prepare(&format!("{COLLECTION_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query(params![id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_collection_row(row)?));
    }
    Ok(None)
}

fn load_relation(conn: &Connection, id: &RelationId) -> StoreResult<Option<Relation>> {
    Ok(query_relations(conn, &format!("{RELATION_SELECT_SQL} WHERE id = ?1;"), id)?
        .into_iter()
        .next())
}

fn query_relations(
    conn: &Connection,
    sql: &str,
    key: &dyn rusqlite::ToSql,
) -> StoreResult<Vec<Relation>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(&[key])?;
    let mut relations = Vec::new();
    while let Some(row) = rows.next()? {
        relations.push(parse_relation_row(row)?);
    }
    Ok(relations)
}

fn parse_collection_row(row: &Row<'_>) -> StoreResult<Collection> {
    let kind: String = row.get("kind")?;
    let jurisdiction: String = row.get("jurisdiction")?;
    let license: Option<String> = row.get("license")?;
    let subjects: String = row.get("subjects")?;
    let education_levels: String = row.get("education_levels")?;
    let extra_fields: String = row.get("extra_fields")?;

    Ok(Collection {
        id: row.get("id")?,
        jurisdiction: JurisdictionRef::new(jurisdiction)?,
        metadata: CollectionMetadata {
            kind: CollectionKind::parse(&kind).ok_or_else(|| {
                StoreError::InvalidData(format!("unknown collection kind `{kind}`"))
            })?,
            name: row.get("name")?,
            title: row.get("title")?,
            description: row.get("description")?,
            license: license.map(TermRef::new).transpose()?,
            subjects: decode_terms(&subjects, "collections.subjects")?,
            education_levels: decode_terms(&education_levels, "collections.education_levels")?,
            notes: row.get("notes")?,
            extra_fields: decode_extra_fields(&extra_fields, "collections.extra_fields")?,
        },
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn parse_relation_row(row: &Row<'_>) -> StoreResult<Relation> {
    let kind: Option<String> = row.get("kind")?;
    let extra_fields: String = row.get("extra_fields")?;
    Ok(Relation {
        id: row.get("id")?,
        collection_id: row.get("collection_id")?,
        source_id: row.get("source_id")?,
        target_id: row.get("target_id")?,
        kind: kind.map(TermRef::new).transpose()?,
        notes: row.get("notes")?,
        extra_fields: decode_extra_fields(&extra_fields, "node_relations.extra_fields")?,
        created_at: row.get("created_at")?,
    })
}
