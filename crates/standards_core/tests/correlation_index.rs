use rusqlite::Connection;
use standards_core::db::open_db_in_memory;
use standards_core::{
    CollectionKind, CollectionMetadata, Conflict, CorrelationIndex, DigitizationMethod,
    DocumentMetadata, DocumentRepository, ErrorKind, InMemoryTerms, JurisdictionRef, Missing,
    NewNode, NewRelation, NodeAttributes, NodeId, RelationPolicy, RelationRole,
    SqliteCorrelationRepository, SqliteDocumentRepository, SqliteTreeRepository, StandardNode,
    StoreError, TermRef, TreeService, VocabularyKind,
};
use std::sync::Arc;

fn index(conn: &Connection) -> CorrelationIndex<SqliteCorrelationRepository<'_>> {
    CorrelationIndex::new(SqliteCorrelationRepository::try_new(conn).unwrap())
}

fn tree(conn: &Connection) -> TreeService<SqliteTreeRepository<'_>> {
    TreeService::new(SqliteTreeRepository::try_new(conn).unwrap())
}

fn us() -> JurisdictionRef {
    JurisdictionRef::new("US").unwrap()
}

/// Root plus two children in a fresh document.
fn document_nodes(conn: &Connection, name: &str) -> (StandardNode, StandardNode, StandardNode) {
    let document = SqliteDocumentRepository::try_new(conn)
        .unwrap()
        .create_document(&DocumentMetadata::new(
            name,
            us(),
            name,
            DigitizationMethod::ManualEntry,
        ))
        .unwrap();
    let tree = tree(conn);
    let root = tree
        .create_root(&document.id, &NewNode::new(NodeAttributes::new(name, "root")))
        .unwrap();
    let first = tree
        .create_child(&root.id, &NewNode::new(NodeAttributes::new("1", "first")))
        .unwrap();
    let second = tree
        .create_child(&root.id, &NewNode::new(NodeAttributes::new("2", "second")))
        .unwrap();
    (root, first, second)
}

#[test]
fn collection_names_are_unique_per_jurisdiction() {
    let conn = open_db_in_memory().unwrap();
    let index = index(&conn);

    let mut metadata = CollectionMetadata::new(CollectionKind::Crosswalk, "ccssm-to-ngss");
    metadata.title = "CCSSM to NGSS".to_string();
    let created = index.create_collection(&us(), &metadata).unwrap();
    assert_eq!(index.get_collection(&created.id).unwrap().metadata, metadata);

    let err = index.create_collection(&us(), &metadata).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Conflict(Conflict::DuplicateCollectionName { .. })
    ));
    index
        .create_collection(&JurisdictionRef::new("CA").unwrap(), &metadata)
        .unwrap();
    index
        .create_collection(
            &us(),
            &CollectionMetadata::new(CollectionKind::Correlation, "textbook-alignment"),
        )
        .unwrap();

    assert_eq!(index.list_collections(None, None).unwrap().len(), 3);
    assert_eq!(index.list_collections(Some(&us()), None).unwrap().len(), 2);
    let correlations = index
        .list_collections(None, Some(CollectionKind::Correlation))
        .unwrap();
    assert_eq!(correlations.len(), 1);
    assert_eq!(correlations[0].metadata.name, "textbook-alignment");
}

#[test]
fn relations_span_documents_and_keep_creation_order() {
    let conn = open_db_in_memory().unwrap();
    let index = index(&conn);
    let (_, a1, a2) = document_nodes(&conn, "A");
    let (_, b1, _) = document_nodes(&conn, "B");
    let collection = index
        .create_collection(&us(), &CollectionMetadata::new(CollectionKind::Crosswalk, "a-to-b"))
        .unwrap();

    let exact = TermRef::new("exact").unwrap();
    let first = index
        .add_relation(
            &collection.id,
            &NewRelation::new(a1.id.clone(), b1.id.clone()).with_kind(exact.clone()),
        )
        .unwrap();
    let duplicate = index
        .add_relation(
            &collection.id,
            &NewRelation::new(a1.id.clone(), b1.id.clone()).with_kind(exact.clone()),
        )
        .unwrap();
    let reverse = index
        .add_relation(&collection.id, &NewRelation::new(b1.id.clone(), a2.id.clone()))
        .unwrap();
    assert_ne!(first.id, duplicate.id);
    assert_eq!(first.kind, Some(exact));

    let ids = |relations: Vec<standards_core::Relation>| -> Vec<_> {
        relations.into_iter().map(|relation| relation.id).collect()
    };
    assert_eq!(
        ids(index.relations_for(&b1.id, RelationRole::Target).unwrap()),
        vec![first.id.clone(), duplicate.id.clone()]
    );
    assert_eq!(
        ids(index.relations_for(&b1.id, RelationRole::Source).unwrap()),
        vec![reverse.id.clone()]
    );
    assert_eq!(
        index.relations_for(&b1.id, RelationRole::Either).unwrap().len(),
        3
    );
    assert!(index
        .relations_for(&a2.id, RelationRole::Source)
        .unwrap()
        .is_empty());
    assert_eq!(
        index.relations_in_collection(&collection.id).unwrap().len(),
        3
    );
    assert_eq!(index.get_relation(&reverse.id).unwrap().target_id, a2.id);
}

#[test]
fn missing_endpoints_and_collections_are_not_found() {
    let conn = open_db_in_memory().unwrap();
    let index = index(&conn);
    let (_, a1, _) = document_nodes(&conn, "A");
    let collection = index
        .create_collection(&us(), &CollectionMetadata::new(CollectionKind::Correlation, "c"))
        .unwrap();

    let err = index
        .add_relation(&collection.id, &NewRelation::new(a1.id.clone(), NodeId::generate()))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(Missing::Node(_))));

    let err = index
        .add_relation(
            &standards_core::CollectionId::generate(),
            &NewRelation::new(a1.id.clone(), a1.id.clone()),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(Missing::Collection(_))));

    let err = index
        .relations_for(&NodeId::generate(), RelationRole::Either)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(index.relations_in_collection(&collection.id).unwrap().is_empty());
}

#[test]
fn deleting_a_collection_removes_its_relations() {
    let conn = open_db_in_memory().unwrap();
    let index = index(&conn);
    let (_, a1, a2) = document_nodes(&conn, "A");
    let keep = index
        .create_collection(&us(), &CollectionMetadata::new(CollectionKind::Crosswalk, "keep"))
        .unwrap();
    let drop = index
        .create_collection(&us(), &CollectionMetadata::new(CollectionKind::Crosswalk, "drop"))
        .unwrap();
    index
        .add_relation(&keep.id, &NewRelation::new(a1.id.clone(), a2.id.clone()))
        .unwrap();
    index
        .add_relation(&drop.id, &NewRelation::new(a1.id.clone(), a2.id.clone()))
        .unwrap();
    index
        .add_relation(&drop.id, &NewRelation::new(a2.id.clone(), a1.id.clone()))
        .unwrap();

    assert_eq!(index.delete_collection(&drop.id).unwrap(), 2);
    assert_eq!(index.get_collection(&drop.id).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(index.relations_for(&a1.id, RelationRole::Either).unwrap().len(), 1);
    assert_eq!(index.delete_collection(&drop.id).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn delete_relation_removes_one_edge() {
    let conn = open_db_in_memory().unwrap();
    let index = index(&conn);
    let (_, a1, a2) = document_nodes(&conn, "A");
    let collection = index
        .create_collection(&us(), &CollectionMetadata::new(CollectionKind::Crosswalk, "c"))
        .unwrap();
    let relation = index
        .add_relation(&collection.id, &NewRelation::new(a1.id.clone(), a2.id.clone()))
        .unwrap();

    index.delete_relation(&relation.id).unwrap();
    assert_eq!(index.get_relation(&relation.id).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(index.delete_relation(&relation.id).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn referenced_subtree_delete_is_restricted_unless_cascading() {
    let conn = open_db_in_memory().unwrap();
    let index = index(&conn);
    let tree = tree(&conn);
    let (root, a1, a2) = document_nodes(&conn, "A");
    let (_, b1, _) = document_nodes(&conn, "B");
    let deep = tree
        .create_child(&a1.id, &NewNode::new(NodeAttributes::new("1.a", "deep")))
        .unwrap();
    let collection = index
        .create_collection(&us(), &CollectionMetadata::new(CollectionKind::Crosswalk, "c"))
        .unwrap();
    index
        .add_relation(&collection.id, &NewRelation::new(b1.id.clone(), deep.id.clone()))
        .unwrap();
    index
        .add_relation(&collection.id, &NewRelation::new(a2.id.clone(), b1.id.clone()))
        .unwrap();

    let err = tree.delete_node(&a1.id, RelationPolicy::Restrict).unwrap_err();
    match err {
        StoreError::Conflict(Conflict::NodeReferenced { relation_count, .. }) => {
            assert_eq!(relation_count, 1)
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(tree.subtree_size(&root.id).unwrap(), 4);

    assert_eq!(tree.delete_node(&a1.id, RelationPolicy::Cascade).unwrap(), 2);
    let remaining = index.relations_for(&b1.id, RelationRole::Either).unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].source_id, a2.id);
}

#[test]
fn relation_kinds_are_checked_against_the_term_directory() {
    let conn = open_db_in_memory().unwrap();
    let terms = InMemoryTerms::new().with(VocabularyKind::RelationKinds, TermRef::new("exact").unwrap());
    let index = index(&conn).with_terms(Arc::new(terms));
    let (_, a1, a2) = document_nodes(&conn, "A");
    let collection = index
        .create_collection(&us(), &CollectionMetadata::new(CollectionKind::Crosswalk, "c"))
        .unwrap();

    index
        .add_relation(
            &collection.id,
            &NewRelation::new(a1.id.clone(), a2.id.clone()).with_kind(TermRef::new("exact").unwrap()),
        )
        .unwrap();
    let err = index
        .add_relation(
            &collection.id,
            &NewRelation::new(a1.id.clone(), a2.id.clone()).with_kind(TermRef::new("vague").unwrap()),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
