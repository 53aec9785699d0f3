use super::*;
use common::Config;
use storage::DiskPageIo;
use tempfile::tempdir;

fn open_cached(dir: &std::path::Path, cache_cells: usize) -> (CachedPageIo, usize) {
    let cfg = Config::builder()
        .path(dir.join("test.db"))
        .page_size(512)
        .db_size(512 * 64)
        .cache_size(512 * cache_cells)
        .journal_path(dir.join("test.db.journal"))
        .build();
    let disk = DiskPageIo::open(&cfg).unwrap();
    let cached = CachedPageIo::new(Box::new(disk), &cfg.resolved_journal_path(), cfg.page_size, cache_cells).unwrap();
    (cached, cfg.page_size)
}

#[test]
fn new_cached_page_io_rejects_zero_capacity() {
    let dir = tempdir().unwrap();
    let cfg = Config::builder().path(dir.path().join("z.db")).page_size(512).db_size(512 * 8).build();
    let disk = DiskPageIo::open(&cfg).unwrap();
    let result = CachedPageIo::new(Box::new(disk), &cfg.resolved_journal_path(), cfg.page_size, 0);
    assert!(result.is_err());
}

#[test]
fn write_then_read_hits_cache_without_touching_source() {
    let dir = tempdir().unwrap();
    let (mut cached, page_size) = open_cached(dir.path(), 4);

    let mut page = Page::new(2, page_size);
    page.write(b"hello").unwrap();
    cached.write(&page).unwrap();

    let mut read_back = Page::new(2, page_size);
    cached.read(&mut read_back).unwrap();
    assert_eq!(&read_back.raw_data()[..5], b"hello");
}

#[test]
fn eviction_flushes_dirty_pages_to_source() {
    let dir = tempdir().unwrap();
    let (mut cached, page_size) = open_cached(dir.path(), 2);

    for n in 1..=3u64 {
        let mut page = Page::new(n, page_size);
        page.write(&[n as u8; 4]).unwrap();
        cached.write(&page).unwrap();
    }
    // page 1 should have been evicted and flushed through to source by now.
    let mut read_back = Page::new(1, page_size);
    cached.read(&mut read_back).unwrap();
    assert_eq!(&read_back.raw_data()[..4], &[1u8; 4]);
}

#[test]
fn pins_release_on_commit_and_normal_eviction_resumes() {
    let dir = tempdir().unwrap();
    let (mut cached, page_size) = open_cached(dir.path(), 2);

    cached.start_operation(OpType::Insert, b"k", b"v").unwrap();
    let mut page = Page::new(1, page_size);
    page.write(b"pin").unwrap();
    cached.write(&page).unwrap();

    // A second write inside the same operation fills the only remaining
    // cell; with both cells pinned, nothing is left to evict.
    let mut second = Page::new(2, page_size);
    second.write(b"abc").unwrap();
    cached.write(&second).unwrap();
    let mut third = Page::new(3, page_size);
    third.write(b"xyz").unwrap();
    assert!(cached.write(&third).is_err());

    cached.end_operation().unwrap();

    // Pins are released now, so the same write succeeds and evicts the
    // least-recently-used page (1), which must have been flushed first.
    cached.write(&third).unwrap();
    let mut read_back = Page::new(1, page_size);
    cached.read(&mut read_back).unwrap();
    assert_eq!(&read_back.raw_data()[..3], b"pin");
}

#[test]
fn flush_clears_dirty_bits() {
    let dir = tempdir().unwrap();
    let (mut cached, page_size) = open_cached(dir.path(), 4);
    let mut page = Page::new(1, page_size);
    page.write(b"abc").unwrap();
    cached.write(&page).unwrap();
    cached.flush().unwrap();
    let cell = *cached.pos_in_cache.get(&1).unwrap();
    assert!(!cached.cells[cell].as_ref().unwrap().dirty);
}

#[test]
fn recovery_surfaces_uncommitted_operation_as_pending() {
    let dir = tempdir().unwrap();
    let cfg = Config::builder()
        .path(dir.path().join("r.db"))
        .page_size(512)
        .db_size(512 * 64)
        .journal_path(dir.path().join("r.db.journal"))
        .build();
    {
        let disk = DiskPageIo::open(&cfg).unwrap();
        let mut cached =
            CachedPageIo::new(Box::new(disk), &cfg.resolved_journal_path(), cfg.page_size, 4).unwrap();
        cached.start_operation(OpType::Insert, b"pending-key", b"pending-value").unwrap();
        // crash: no end_operation, so no COMMIT record lands.
    }
    let disk = DiskPageIo::open(&cfg).unwrap();
    let mut cached = CachedPageIo::new(Box::new(disk), &cfg.resolved_journal_path(), cfg.page_size, 4).unwrap();
    let pending = cached.take_pending_operation();
    assert_eq!(
        pending,
        Some(wal::PendingOp::Insert {
            key: b"pending-key".to_vec(),
            value: b"pending-value".to_vec(),
        })
    );
}
