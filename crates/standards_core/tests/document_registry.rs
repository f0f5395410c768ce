use rusqlite::Connection;
use standards_core::db::open_db_in_memory;
use standards_core::{
    CollectionKind, CollectionMetadata, Conflict, CorrelationIndex, DigitizationMethod,
    DocumentMetadata, DocumentRegistry, ErrorKind, InMemoryJurisdictions, InMemoryTerms,
    JurisdictionRef, Missing, NewNode, NewRelation, NodeAttributes, PublicationStatus,
    RelationRole, SqliteCorrelationRepository, SqliteDocumentRepository, SqliteTreeRepository,
    StoreError, TermRef, TreeService, VocabularyKind,
};
use std::sync::Arc;

type Registry<'conn> = DocumentRegistry<SqliteDocumentRepository<'conn>, SqliteTreeRepository<'conn>>;

fn registry(conn: &Connection) -> Registry<'_> {
    DocumentRegistry::new(
        SqliteDocumentRepository::try_new(conn).unwrap(),
        SqliteTreeRepository::try_new(conn).unwrap(),
    )
}

fn metadata(name: &str, jurisdiction: &str) -> DocumentMetadata {
    DocumentMetadata::new(
        name,
        JurisdictionRef::new(jurisdiction).unwrap(),
        format!("{name} title"),
        DigitizationMethod::AsnImport,
    )
}

#[test]
fn create_get_and_list_documents() {
    let conn = open_db_in_memory().unwrap();
    let registry = registry(&conn);

    let mut ccssm = metadata("CCSSM", "US");
    ccssm.subjects = vec![TermRef::new("math").unwrap()];
    ccssm.date_valid = Some("2010-06-02".to_string());
    let created = registry.create(&ccssm).unwrap();
    registry.create(&metadata("AB-MATH", "CA-AB")).unwrap();
    registry.create(&metadata("NGSS", "US")).unwrap();

    let fetched = registry.get(&created.id).unwrap();
    assert_eq!(fetched.metadata, ccssm);
    assert_eq!(fetched.tree_version, 0);

    let names: Vec<_> = registry
        .list(None)
        .unwrap()
        .into_iter()
        .map(|document| document.metadata.name)
        .collect();
    assert_eq!(names, vec!["AB-MATH", "CCSSM", "NGSS"]);

    let us = JurisdictionRef::new("US").unwrap();
    assert_eq!(registry.list(Some(&us)).unwrap().len(), 2);
}

#[test]
fn duplicate_name_is_conflict_and_bad_metadata_is_validation() {
    let conn = open_db_in_memory().unwrap();
    let registry = registry(&conn);

    registry.create(&metadata("CCSSM", "US")).unwrap();
    let err = registry.create(&metadata("CCSSM", "CA")).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Conflict(Conflict::DuplicateDocumentName(ref name)) if name == "CCSSM"
    ));

    let mut bad = metadata("BAD", "US");
    bad.language = Some("not a language".to_string());
    assert_eq!(registry.create(&bad).unwrap_err().kind(), ErrorKind::Validation);

    let err = registry.get(&standards_core::DocumentId::generate()).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(Missing::Document(_))));
}

#[test]
fn update_metadata_replaces_fields_without_touching_tree_version() {
    let conn = open_db_in_memory().unwrap();
    let registry = registry(&conn);
    let tree = TreeService::new(SqliteTreeRepository::try_new(&conn).unwrap());

    let document = registry.create(&metadata("CCSSM", "US")).unwrap();
    tree.create_root(&document.id, &NewNode::new(NodeAttributes::new("M", "Math")))
        .unwrap();

    let mut changed = document.metadata.clone();
    changed.publication_status = PublicationStatus::Published;
    changed.publisher = Some("NGA Center".to_string());
    changed
        .extra_fields
        .insert("edition".to_string(), serde_json::json!(2));
    let updated = registry.update_metadata(&document.id, &changed).unwrap();

    assert_eq!(updated.metadata, changed);
    assert_eq!(updated.tree_version, 1);

    let err = registry
        .update_metadata(&standards_core::DocumentId::generate(), &changed)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn root_and_nodes_come_from_the_tree_engine() {
    let conn = open_db_in_memory().unwrap();
    let registry = registry(&conn);
    let tree = TreeService::new(SqliteTreeRepository::try_new(&conn).unwrap());

    let document = registry.create(&metadata("CCSSM", "US")).unwrap();
    assert!(registry.nodes(&document.id).unwrap().is_empty());
    assert_eq!(registry.root(&document.id).unwrap_err().kind(), ErrorKind::NotFound);

    let root = tree
        .create_root(&document.id, &NewNode::new(NodeAttributes::new("K", "Kindergarten")))
        .unwrap();
    let child = tree
        .create_child(&root.id, &NewNode::new(NodeAttributes::new("CC", "Counting")))
        .unwrap();

    assert_eq!(registry.root(&document.id).unwrap().id, root.id);
    let nodes: Vec<_> = registry
        .nodes(&document.id)
        .unwrap()
        .into_iter()
        .map(|node| node.id)
        .collect();
    assert_eq!(nodes, vec![root.id, child.id]);
}

#[test]
fn delete_cascades_to_nodes_and_relations() {
    let conn = open_db_in_memory().unwrap();
    let registry = registry(&conn);
    let tree = TreeService::new(SqliteTreeRepository::try_new(&conn).unwrap());
    let index = CorrelationIndex::new(SqliteCorrelationRepository::try_new(&conn).unwrap());

    let doomed = registry.create(&metadata("DOOMED", "US")).unwrap();
    let kept = registry.create(&metadata("KEPT", "US")).unwrap();
    let doomed_root = tree
        .create_root(&doomed.id, &NewNode::new(NodeAttributes::new("D", "doomed")))
        .unwrap();
    let doomed_child = tree
        .create_child(&doomed_root.id, &NewNode::new(NodeAttributes::new("D.1", "child")))
        .unwrap();
    let kept_root = tree
        .create_root(&kept.id, &NewNode::new(NodeAttributes::new("K", "kept")))
        .unwrap();

    let collection = index
        .create_collection(
            &JurisdictionRef::new("US").unwrap(),
            &CollectionMetadata::new(CollectionKind::Crosswalk, "doomed-to-kept"),
        )
        .unwrap();
    index
        .add_relation(
            &collection.id,
            &NewRelation::new(doomed_child.id.clone(), kept_root.id.clone()),
        )
        .unwrap();

    assert_eq!(registry.delete(&doomed.id).unwrap(), 2);
    assert_eq!(registry.get(&doomed.id).unwrap_err().kind(), ErrorKind::NotFound);
    assert!(tree.get_node(&doomed_child.id).unwrap().is_none());
    assert!(tree.get_node(&doomed_root.id).unwrap().is_none());
    assert_eq!(
        tree.audit_document(&doomed.id).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert!(index
        .relations_for(&kept_root.id, RelationRole::Either)
        .unwrap()
        .is_empty());
    assert_eq!(index.get_collection(&collection.id).unwrap().id, collection.id);
    assert_eq!(registry.nodes(&kept.id).unwrap().len(), 1);

    let err = registry.delete(&doomed.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn configured_directories_reject_unknown_references() {
    let conn = open_db_in_memory().unwrap();
    let jurisdictions = InMemoryJurisdictions::new().with(JurisdictionRef::new("US").unwrap(), "United States");
    let terms = InMemoryTerms::new().with(VocabularyKind::Subjects, TermRef::new("math").unwrap());
    let registry = registry(&conn)
        .with_jurisdictions(Arc::new(jurisdictions))
        .with_terms(Arc::new(terms));

    let mut known = metadata("CCSSM", "US");
    known.subjects = vec![TermRef::new("math").unwrap()];
    registry.create(&known).unwrap();

    let err = registry.create(&metadata("ATLANTIS", "Atlantis")).unwrap_err();
    assert!(matches!(err, StoreError::NotFound(Missing::Jurisdiction(_))));

    let mut wrong_term = metadata("NGSS", "US");
    wrong_term.subjects = vec![TermRef::new("alchemy").unwrap()];
    assert_eq!(
        registry.create(&wrong_term).unwrap_err().kind(),
        ErrorKind::Validation
    );
    assert_eq!(registry.list(None).unwrap().len(), 1);
}
