use standards_core::db::open_db;
use standards_core::{
    Conflict, DigitizationMethod, DocumentId, DocumentMetadata, DocumentRepository,
    JurisdictionRef, Missing, NewNode, NodeAttributes, NodeId, RelationPolicy,
    SqliteDocumentRepository, SqliteTreeRepository, StandardNode, StoreError, StoreResult,
    TreeService,
};
use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;

const WRITERS: usize = 4;
const CHILDREN_PER_WRITER: usize = 10;

fn create_document(path: &Path) -> DocumentId {
    let conn = open_db(path).unwrap();
    let repo = SqliteDocumentRepository::try_new(&conn).unwrap();
    repo.create_document(&DocumentMetadata::new(
        "CONCURRENT",
        JurisdictionRef::new("US").unwrap(),
        "Concurrent writers",
        DigitizationMethod::ManualEntry,
    ))
    .unwrap()
    .id
}

fn child(tree: &TreeService<SqliteTreeRepository<'_>>, parent: &NodeId, notation: &str) -> NodeId {
    tree.create_child(parent, &NewNode::new(NodeAttributes::new(notation, notation)))
        .unwrap()
        .id
}

/// Runs `op` on its own connection once every racer is ready.
fn racer<F, R>(path: &Path, barrier: &Arc<Barrier>, op: F) -> thread::JoinHandle<R>
where
    F: FnOnce(&TreeService<SqliteTreeRepository<'_>>) -> R + Send + 'static,
    R: Send + 'static,
{
    let path = path.to_path_buf();
    let barrier = Arc::clone(barrier);
    thread::spawn(move || {
        let conn = open_db(&path).unwrap();
        let tree = TreeService::new(SqliteTreeRepository::try_new(&conn).unwrap());
        barrier.wait();
        op(&tree)
    })
}

#[test]
fn racing_root_creation_yields_exactly_one_root() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("roots.db");
    let document_id = create_document(&path);
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let path = path.clone();
            let document_id = document_id.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let tree = TreeService::new(SqliteTreeRepository::try_new(&conn).unwrap());
                barrier.wait();
                tree.create_root(
                    &document_id,
                    &NewNode::new(NodeAttributes::new(format!("R{writer}"), "root")),
                )
                .map(|node| node.id)
            })
        })
        .collect();

    let mut created = Vec::new();
    for handle in handles {
        match handle.join().unwrap() {
            Ok(id) => created.push(id),
            Err(StoreError::Conflict(Conflict::RootExists { .. })) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created.len(), 1);

    let conn = open_db(&path).unwrap();
    let tree = TreeService::new(SqliteTreeRepository::try_new(&conn).unwrap());
    assert_eq!(tree.root(&document_id).unwrap().id, created[0]);
}

#[test]
fn concurrent_appends_keep_sibling_keys_distinct() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("appends.db");
    let document_id = create_document(&path);
    let root_id = {
        let conn = open_db(&path).unwrap();
        let tree = TreeService::new(SqliteTreeRepository::try_new(&conn).unwrap());
        tree.create_root(&document_id, &NewNode::new(NodeAttributes::new("R", "root")))
            .unwrap()
            .id
    };
    let barrier = Arc::new(Barrier::new(WRITERS));

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let path = path.clone();
            let root_id: NodeId = root_id.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let conn = open_db(&path).unwrap();
                let tree = TreeService::new(SqliteTreeRepository::try_new(&conn).unwrap());
                barrier.wait();
                for index in 0..CHILDREN_PER_WRITER {
                    let first = tree.children(&root_id).unwrap().first().map(|c| c.id.clone());
                    let node = NewNode::new(NodeAttributes::new(
                        format!("W{writer}.{index}"),
                        "child",
                    ));
                    // Odd steps insert in front of whatever is first right now.
                    match (index % 2, first) {
                        (1, Some(first)) => {
                            tree.insert_child_before(&root_id, &first, &node).unwrap();
                        }
                        _ => {
                            tree.create_child(&root_id, &node).unwrap();
                        }
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let conn = open_db(&path).unwrap();
    let tree = TreeService::new(SqliteTreeRepository::try_new(&conn).unwrap());
    let children = tree.children(&root_id).unwrap();
    assert_eq!(children.len(), WRITERS * CHILDREN_PER_WRITER);
    assert!(children
        .windows(2)
        .all(|pair| pair[0].sort_order < pair[1].sort_order));
    assert!(tree.audit_document(&document_id).unwrap().is_clean());

    let documents = SqliteDocumentRepository::try_new(&conn).unwrap();
    let document = documents.get_document(&document_id).unwrap().unwrap();
    assert_eq!(
        document.tree_version,
        (1 + WRITERS * CHILDREN_PER_WRITER) as i64
    );
}

#[test]
fn crossing_moves_leave_an_acyclic_tree() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crossing.db");
    let document_id = create_document(&path);
    let (root_id, a, b) = {
        let conn = open_db(&path).unwrap();
        let tree = TreeService::new(SqliteTreeRepository::try_new(&conn).unwrap());
        let root_id = tree
            .create_root(&document_id, &NewNode::new(NodeAttributes::new("R", "root")))
            .unwrap()
            .id;
        let a = child(&tree, &root_id, "A");
        let b = child(&tree, &root_id, "B");
        (root_id, a, b)
    };
    let barrier = Arc::new(Barrier::new(2));

    let a_under_b = {
        let (a, b) = (a.clone(), b.clone());
        racer(&path, &barrier, move |tree| tree.move_node(&a, &b, None))
    };
    let b_under_a = {
        let (a, b) = (a.clone(), b.clone());
        racer(&path, &barrier, move |tree| tree.move_node(&b, &a, None))
    };
    let results: Vec<StoreResult<StandardNode>> =
        vec![a_under_b.join().unwrap(), b_under_a.join().unwrap()];

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|result| matches!(result, Err(StoreError::Conflict(Conflict::Cycle { .. })))));

    let conn = open_db(&path).unwrap();
    let tree = TreeService::new(SqliteTreeRepository::try_new(&conn).unwrap());
    assert!(tree.audit_document(&document_id).unwrap().is_clean());
    assert_eq!(tree.subtree_size(&root_id).unwrap(), 3);
    assert_eq!(tree.children(&root_id).unwrap().len(), 1);
    let (upper, lower) = if results[0].is_ok() { (&b, &a) } else { (&a, &b) };
    assert_eq!(tree.subtree_size(upper).unwrap(), 2);
    assert_eq!(tree.subtree_size(lower).unwrap(), 1);
}

#[test]
fn move_racing_delete_of_new_parent_stays_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("move_delete.db");
    let document_id = create_document(&path);
    let (root_id, target, moved) = {
        let conn = open_db(&path).unwrap();
        let tree = TreeService::new(SqliteTreeRepository::try_new(&conn).unwrap());
        let root_id = tree
            .create_root(&document_id, &NewNode::new(NodeAttributes::new("R", "root")))
            .unwrap()
            .id;
        let target = child(&tree, &root_id, "P");
        let moved = child(&tree, &root_id, "X");
        child(&tree, &moved, "X.1");
        (root_id, target, moved)
    };
    let barrier = Arc::new(Barrier::new(2));

    let mover = {
        let (moved, target) = (moved.clone(), target.clone());
        racer(&path, &barrier, move |tree| tree.move_node(&moved, &target, None))
    };
    let deleter = {
        let target = target.clone();
        racer(&path, &barrier, move |tree| {
            tree.delete_node(&target, RelationPolicy::Restrict)
        })
    };
    let moved_result = mover.join().unwrap();
    let deleted = deleter.join().unwrap().unwrap();

    let conn = open_db(&path).unwrap();
    let tree = TreeService::new(SqliteTreeRepository::try_new(&conn).unwrap());
    match moved_result {
        // Move landed first: the delete took the moved subtree with it.
        Ok(_) => {
            assert_eq!(deleted, 3);
            assert!(tree.get_node(&moved).unwrap().is_none());
            assert_eq!(tree.subtree_size(&root_id).unwrap(), 1);
        }
        Err(StoreError::NotFound(Missing::Node(missing))) => {
            assert_eq!(missing, target);
            assert_eq!(deleted, 1);
            assert_eq!(tree.subtree_size(&moved).unwrap(), 2);
            assert_eq!(tree.subtree_size(&root_id).unwrap(), 3);
        }
        Err(other) => panic!("unexpected error: {other}"),
    }
    assert!(tree.audit_document(&document_id).unwrap().is_clean());
    assert_eq!(tree.root(&document_id).unwrap().id, root_id);
}
