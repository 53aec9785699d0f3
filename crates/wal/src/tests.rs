use super::*;
use tempfile::tempdir;

const PAGE_SIZE: u64 = 64;

fn page_bytes(fill: u8) -> Vec<u8> {
    vec![fill; PAGE_SIZE as usize]
}

#[test]
fn fresh_journal_has_no_pending_operation_and_no_replay() {
    let dir = tempdir().unwrap();
    let (_journal, recovery) = Journal::open(&dir.path().join("j"), PAGE_SIZE).unwrap();
    assert!(recovery.replay.is_empty());
    assert!(recovery.pending.is_none());
}

#[test]
fn committed_changes_replay_on_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("j");
    {
        let (mut journal, _) = Journal::open(&path, PAGE_SIZE).unwrap();
        journal.append_change(3, &page_bytes(7)).unwrap();
        journal.append_change(4, &page_bytes(9)).unwrap();
        journal.append_checkpoint().unwrap();
    }
    let (_journal, recovery) = Journal::open(&path, PAGE_SIZE).unwrap();
    assert_eq!(recovery.replay.len(), 2);
    assert_eq!(recovery.replay[0].page_number, 3);
    assert_eq!(recovery.replay[0].bytes, page_bytes(7));
    assert_eq!(recovery.replay[1].page_number, 4);
}

#[test]
fn committed_insert_does_not_surface_as_pending() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("j");
    {
        let (mut journal, _) = Journal::open(&path, PAGE_SIZE).unwrap();
        journal.append_insert(b"k", b"v").unwrap();
        journal.append_change(1, &page_bytes(1)).unwrap();
        journal.append_commit().unwrap();
    }
    let (_journal, recovery) = Journal::open(&path, PAGE_SIZE).unwrap();
    assert!(recovery.pending.is_none());
}

#[test]
fn uncommitted_insert_surfaces_as_pending_and_is_truncated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("j");
    {
        let (mut journal, _) = Journal::open(&path, PAGE_SIZE).unwrap();
        journal.append_checkpoint().unwrap();
        journal.append_insert(b"key1", b"value1").unwrap();
        // crash: no commit written
    }
    let (_journal, recovery) = Journal::open(&path, PAGE_SIZE).unwrap();
    assert_eq!(
        recovery.pending,
        Some(PendingOp::Insert {
            key: b"key1".to_vec(),
            value: b"value1".to_vec(),
        })
    );
}

#[test]
fn uncommitted_delete_surfaces_as_pending() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("j");
    {
        let (mut journal, _) = Journal::open(&path, PAGE_SIZE).unwrap();
        journal.append_delete(b"gone").unwrap();
    }
    let (_journal, recovery) = Journal::open(&path, PAGE_SIZE).unwrap();
    assert_eq!(recovery.pending, Some(PendingOp::Delete { key: b"gone".to_vec() }));
}

#[test]
fn recovery_picks_the_latest_checkpoint() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("j");
    {
        let (mut journal, _) = Journal::open(&path, PAGE_SIZE).unwrap();
        journal.append_change(1, &page_bytes(1)).unwrap();
        journal.append_checkpoint().unwrap();
        journal.append_change(2, &page_bytes(2)).unwrap();
        journal.append_checkpoint().unwrap();
    }
    let (_journal, recovery) = Journal::open(&path, PAGE_SIZE).unwrap();
    assert!(recovery.replay.is_empty());
}

#[test]
fn multiple_open_close_cycles_preserve_journal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("j");
    {
        let (mut journal, _) = Journal::open(&path, PAGE_SIZE).unwrap();
        journal.append_db_close().unwrap();
    }
    {
        let (mut journal, recovery) = Journal::open(&path, PAGE_SIZE).unwrap();
        assert!(recovery.pending.is_none());
        journal.append_db_close().unwrap();
    }
    let (_journal, recovery) = Journal::open(&path, PAGE_SIZE).unwrap();
    assert!(recovery.pending.is_none());
}
