use super::*;
use common::Config;
use storage::DiskPageIo;
use tempfile::tempdir;

fn open_sink(dir: &std::path::Path, page_size: usize) -> DiskPageIo {
    let cfg = Config::builder()
        .path(dir.join("t.db"))
        .page_size(page_size)
        .db_size(page_size * 512)
        .build();
    DiskPageIo::open(&cfg).unwrap()
}

#[test]
fn insert_then_get_roundtrips() {
    let dir = tempdir().unwrap();
    let mut sink = open_sink(dir.path(), 256);
    let tree = BTree::new(256);
    let root = tree.create_root(&mut sink).unwrap();

    let root = tree.insert(&mut sink, root, b"alpha", b"1").unwrap();
    let root = tree.insert(&mut sink, root, b"beta", b"2").unwrap();

    assert_eq!(tree.get(&mut sink, root, b"alpha").unwrap(), Some(b"1".to_vec()));
    assert_eq!(tree.get(&mut sink, root, b"beta").unwrap(), Some(b"2".to_vec()));
    assert_eq!(tree.get(&mut sink, root, b"missing").unwrap(), None);
}

#[test]
fn inserting_existing_key_overwrites_value() {
    let dir = tempdir().unwrap();
    let mut sink = open_sink(dir.path(), 256);
    let tree = BTree::new(256);
    let root = tree.create_root(&mut sink).unwrap();

    let root = tree.insert(&mut sink, root, b"k", b"first").unwrap();
    let root = tree.insert(&mut sink, root, b"k", b"second").unwrap();

    assert_eq!(tree.get(&mut sink, root, b"k").unwrap(), Some(b"second".to_vec()));
}

#[test]
fn many_inserts_force_splits_and_stay_searchable() {
    let dir = tempdir().unwrap();
    let mut sink = open_sink(dir.path(), 256);
    let tree = BTree::new(256);
    let mut root = tree.create_root(&mut sink).unwrap();

    for i in 0..200u32 {
        let key = format!("key-{i:04}");
        let value = format!("value-{i:04}");
        root = tree.insert(&mut sink, root, key.as_bytes(), value.as_bytes()).unwrap();
    }

    for i in 0..200u32 {
        let key = format!("key-{i:04}");
        let value = format!("value-{i:04}");
        assert_eq!(tree.get(&mut sink, root, key.as_bytes()).unwrap(), Some(value.into_bytes()));
    }
}

#[test]
fn delete_removes_key_and_leaves_others_intact() {
    let dir = tempdir().unwrap();
    let mut sink = open_sink(dir.path(), 256);
    let tree = BTree::new(256);
    let mut root = tree.create_root(&mut sink).unwrap();

    for i in 0..50u32 {
        let key = format!("k{i:03}");
        root = tree.insert(&mut sink, root, key.as_bytes(), b"v").unwrap();
    }

    assert!(tree.delete(&mut sink, root, b"k025").unwrap());
    assert_eq!(tree.get(&mut sink, root, b"k025").unwrap(), None);
    assert_eq!(tree.get(&mut sink, root, b"k024").unwrap(), Some(b"v".to_vec()));
    assert_eq!(tree.get(&mut sink, root, b"k026").unwrap(), Some(b"v".to_vec()));
}

#[test]
fn deleting_missing_key_returns_false() {
    let dir = tempdir().unwrap();
    let mut sink = open_sink(dir.path(), 256);
    let tree = BTree::new(256);
    let root = tree.create_root(&mut sink).unwrap();

    assert!(!tree.delete(&mut sink, root, b"nope").unwrap());
}

#[test]
fn inserts_and_deletes_survive_splits_and_merges() {
    let dir = tempdir().unwrap();
    let mut sink = open_sink(dir.path(), 256);
    let tree = BTree::new(256);
    let mut root = tree.create_root(&mut sink).unwrap();

    for i in 0..150u32 {
        let key = format!("m{i:04}");
        root = tree.insert(&mut sink, root, key.as_bytes(), b"v").unwrap();
    }
    for i in (0..150u32).step_by(2) {
        let key = format!("m{i:04}");
        assert!(tree.delete(&mut sink, root, key.as_bytes()).unwrap());
    }
    for i in 0..150u32 {
        let key = format!("m{i:04}");
        let expect_present = i % 2 == 1;
        let got = tree.get(&mut sink, root, key.as_bytes()).unwrap();
        assert_eq!(got.is_some(), expect_present, "key {key} present={expect_present}");
    }
}

#[test]
fn ordering_is_length_primary_not_lexicographic() {
    // "b" (len 1) sorts before "aa" (len 2) under the comparator this
    // tree orders keys by, even though it would sort after under plain
    // lexicographic order.
    let dir = tempdir().unwrap();
    let mut sink = open_sink(dir.path(), 256);
    let tree = BTree::new(256);
    let mut root = tree.create_root(&mut sink).unwrap();

    root = tree.insert(&mut sink, root, b"aa", b"long").unwrap();
    root = tree.insert(&mut sink, root, b"b", b"short").unwrap();

    let node = BTreeNode::read_from(&mut sink, root, 256).unwrap();
    assert_eq!(node.keys[0], b"b");
    assert_eq!(node.keys[1], b"aa");
}

#[test]
fn effective_page_size_is_three_quarters_of_page() {
    let tree = BTree::new(4096);
    assert_eq!(tree.effective_page_size(), 3072);
}
