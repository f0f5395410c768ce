//! Document registry repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist document metadata and the per-document `tree_version`.
//! - Delete a document together with its tree and every relation touching it
//!   in one transaction.
//!
//! # Invariants
//! - Document names are unique store-wide.
//! - Metadata updates never touch `tree_version`.

use crate::error::{Conflict, Missing, StoreError, StoreResult};
use crate::ids::DocumentId;
use crate::model::document::{DigitizationMethod, Document, DocumentMetadata, PublicationStatus};
use crate::model::refs::{
    decode_extra_fields, decode_terms, encode_extra_fields, encode_terms, JurisdictionRef,
    TermRef,
};
use crate::repo::tree_repo::purge_document_tree;
use crate::repo::{ensure_connection_ready, map_unique_violation, write_tx};
use rusqlite::{params, Connection, Row};

const DOCUMENT_SELECT_SQL: &str = "SELECT
    id,
    name,
    jurisdiction,
    title,
    description,
    language,
    publisher,
    version,
    license,
    license_description,
    copyright_holder,
    subjects,
    education_levels,
    date_valid,
    date_retired,
    digitization_method,
    publication_status,
    source_doc,
    canonical_uri,
    source_uri,
    source_id,
    notes,
    extra_fields,
    tree_version,
    created_at,
    updated_at
FROM documents";

/// Repository interface for standards documents.
pub trait DocumentRepository {
    fn create_document(&self, metadata: &DocumentMetadata) -> StoreResult<Document>;
    fn get_document(&self, id: &DocumentId) -> StoreResult<Option<Document>>;
    /// Ordered by `name`; `jurisdiction` narrows the listing when set.
    fn list_documents(&self, jurisdiction: Option<&JurisdictionRef>) -> StoreResult<Vec<Document>>;
    /// Replaces all metadata fields.
    fn update_metadata(&self, id: &DocumentId, metadata: &DocumentMetadata)
        -> StoreResult<Document>;
    /// Deletes the document, its nodes and every relation touching those
    /// nodes in one transaction. Returns the number of nodes removed.
    ///
    /// The tree is purged here, not through `TreeRepository`; both must share
    /// one store.
    fn delete_document(&self, id: &DocumentId) -> StoreResult<usize>;
}

/// SQLite-backed document repository.
pub struct SqliteDocumentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteDocumentRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_connection_ready(
            conn,
            &[
                ("documents", &["id", "name", "jurisdiction", "tree_version"]),
                ("standard_nodes", &["id", "document_id"]),
                ("node_relations", &["source_id", "target_id"]),
            ],
        )?;
        Ok(Self { conn })
    }
}

impl DocumentRepository for SqliteDocumentRepository<'_> {
    fn create_document(&self, metadata: &DocumentMetadata) -> StoreResult<Document> {
        let id = DocumentId::generate();
        let tx = write_tx(self.conn)?;
        tx.execute(
            "INSERT INTO documents (
                id,
                name,
                jurisdiction,
                title,
                description,
                language,
                publisher,
                version,
                license,
                license_description,
                copyright_holder,
                subjects,
                education_levels,
                date_valid,
                date_retired,
                digitization_method,
                publication_status,
                source_doc,
                canonical_uri,
                source_uri,
                source_id,
                notes,
                extra_fields
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23);",
            params![
                id,
                metadata.name.as_str(),
                metadata.jurisdiction.as_str(),
                metadata.title.as_str(),
                metadata.description.as_deref(),
                metadata.language.as_deref(),
                metadata.publisher.as_deref(),
                metadata.version.as_deref(),
                metadata.license.as_ref().map(TermRef::as_str),
                metadata.license_description.as_deref(),
                metadata.copyright_holder.as_deref(),
                encode_terms(&metadata.subjects)?,
                encode_terms(&metadata.education_levels)?,
                metadata.date_valid.as_deref(),
                metadata.date_retired.as_deref(),
                metadata.digitization_method.as_str(),
                metadata.publication_status.as_str(),
                metadata.source_doc.as_deref(),
                metadata.canonical_uri.as_deref(),
                metadata.source_uri.as_deref(),
                metadata.source_id.as_deref(),
                metadata.notes.as_deref(),
                encode_extra_fields(&metadata.extra_fields)?,
            ],
        )
        .map_err(|err| {
            map_unique_violation(err, || {
                Conflict::DuplicateDocumentName(metadata.name.clone()).into()
            })
        })?;
        let created = load_required_document(&tx, &id)?;
        tx.commit()?;
        Ok(created)
    }

    fn get_document(&self, id: &DocumentId) -> StoreResult<Option<Document>> {
        load_document(self.conn, id)
    }

    fn list_documents(&self, jurisdiction: Option<&JurisdictionRef>) -> StoreResult<Vec<Document>> {
        let mut stmt = self.conn.prepare(&format!(
            "{DOCUMENT_SELECT_SQL}
             WHERE (?1 IS NULL OR jurisdiction = ?1)
             ORDER BY name ASC, id ASC;"
        ))?;
        let mut rows = stmt.query(params![jurisdiction.map(JurisdictionRef::as_str)])?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            documents.push(parse_document_row(row)?);
        }
        Ok(documents)
    }

    fn update_metadata(
        &self,
        id: &DocumentId,
        metadata: &DocumentMetadata,
    ) -> StoreResult<Document> {
        let tx = write_tx(self.conn)?;
        let changed = tx
            .execute(
                "UPDATE documents
                 SET name = ?2,
                     jurisdiction = ?3,
                     title = ?4,
                     description = ?5,
                     language = ?6,
                     publisher = ?7,
                     version = ?8,
                     license = ?9,
                     license_description = ?10,
                     copyright_holder = ?11,
                     subjects = ?12,
                     education_levels = ?13,
                     date_valid = ?14,
                     date_retired = ?15,
                     digitization_method = ?16,
                     publication_status = ?17,
                     source_doc = ?18,
                     canonical_uri = ?19,
                     source_uri = ?20,
                     source_id = ?21,
                     notes = ?22,
                     extra_fields = ?23,
                     updated_at = (strftime('%s', 'now') * 1000)
                 WHERE id = ?1;",
                params![
                    id,
                    metadata.name.as_str(),
                    metadata.jurisdiction.as_str(),
                    metadata.title.as_str(),
                    metadata.description.as_deref(),
                    metadata.language.as_deref(),
                    metadata.publisher.as_deref(),
                    metadata.version.as_deref(),
                    metadata.license.as_ref().map(TermRef::as_str),
                    metadata.license_description.as_deref(),
                    metadata.copyright_holder.as_deref(),
                    encode_terms(&metadata.subjects)?,
                    encode_terms(&metadata.education_levels)?,
                    metadata.date_valid.as_deref(),
                    metadata.date_retired.as_deref(),
                    metadata.digitization_method.as_str(),
                    metadata.publication_status.as_str(),
                    metadata.source_doc.as_deref(),
                    metadata.canonical_uri.as_deref(),
                    metadata.source_uri.as_deref(),
                    metadata.source_id.as_deref(),
                    metadata.notes.as_deref(),
                    encode_extra_fields(&metadata.extra_fields)?,
                ],
            )
            .map_err(|err| {
                map_unique_violation(err, || {
                    Conflict::DuplicateDocumentName(metadata.name.clone()).into()
                })
            })?;
        if changed == 0 {
            return Err(Missing::Document(id.clone()).into());
        }
        let updated = load_required_document(&tx, id)?;
        tx.commit()?;
        Ok(updated)
    }

    fn delete_document(&self, id: &DocumentId) -> StoreResult<usize> {
        let tx = write_tx(self.conn)?;
        let removed_nodes = purge_document_tree(&tx, id)?;
        let removed = tx.execute("DELETE FROM documents WHERE id = ?1;", params![id])?;
        if removed == 0 {
            return Err(Missing::Document(id.clone()).into());
        }
        tx.commit()?;
        Ok(removed_nodes)
    }
}

fn load_document(conn: &Connection, id: &DocumentId) -> StoreResult<Option<Document>> {
    let mut stmt = conn.prepare(&format!("{DOCUMENT_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query(params![id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_document_row(row)?));
    }
    Ok(None)
}

fn load_required_document(conn: &Connection, id: &DocumentId) -> StoreResult<Document> {
    load_document(conn, id)?.ok_or_else(|| Missing::Document(id.clone()).into())
}

fn parse_document_row(row: &Row<'_>) -> StoreResult<Document> {
    let jurisdiction: String = row.get("jurisdiction")?;
    let license: Option<String> = row.get("license")?;
    let method: String = row.get("digitization_method")?;
    let status: String = row.get("publication_status")?;
    let subjects: String = row.get("subjects")?;
    let education_levels: String = row.get("education_levels")?;
    let extra_fields: String = row.get("extra_fields")?;

    let digitization_method = DigitizationMethod::parse(&method).ok_or_else(|| {
        StoreError::InvalidData(format!("unknown digitization_method `{method}`"))
    })?;
    let publication_status = PublicationStatus::parse(&status).ok_or_else(|| {
        StoreError::InvalidData(format!("unknown publication_status `{status}`"))
    })?;

    Ok(Document {
        id: row.get("id")?,
        metadata: DocumentMetadata {
            name: row.get("name")?,
            jurisdiction: JurisdictionRef::new(jurisdiction)?,
            title: row.get("title")?,
            description: row.get("description")?,
            language: row.get("language")?,
            publisher: row.get("publisher")?,
            version: row.get("version")?,
            license: license.map(TermRef::new).transpose()?,
            license_description: row.get("license_description")?,
            copyright_holder: row.get("copyright_holder")?,
            subjects: decode_terms(&subjects, "documents.subjects")?,
            education_levels: decode_terms(&education_levels, "documents.education_levels")?,
            date_valid: row.get("date_valid")?,
            date_retired: row.get("date_retired")?,
            digitization_method,
            publication_status,
            source_doc: row.get("source_doc")?,
            canonical_uri: row.get("canonical_uri")?,
            source_uri: row.get("source_uri")?,
            source_id: row.get("source_id")?,
            notes: row.get("notes")?,
            extra_fields: decode_extra_fields(&extra_fields, "documents.extra_fields")?,
        },
        tree_version: row.get("tree_version")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
