//! Top-level embeddable handle: composes the disk layer, the cache and
//! journal, and the B-tree into a single `open`/`get`/`put`/`delete`/
//! `flush`/`sync`/`close` API.


use btree::{BTree, BTreeNode};
use buffer::{CachedPageIo, OpType};
use common::{Config, DbResult};
use storage::{DiskPageIo, PageIo};
use wal::PendingOp;

/// An open database file: a B-tree over a cached, journaled page store.
pub struct Database {
    io: CachedPageIo,
    btree: BTree,
}

impl Database {
    /// Opens `config.path`, creating a fresh database if it does not
    /// exist yet. Any operation left unfinished by a prior crash is
    /// redone against the B-tree before this returns.
    pub fn open(config: &Config) -> DbResult<Self> {
        let existed_before = config.path.exists();
        let disk = DiskPageIo::open(config)?;
        let fresh_root_page = disk.root_page();

        let journal_path = config.resolved_journal_path();
        let mut io = CachedPageIo::new(Box::new(disk), &journal_path, config.page_size, config.cache_pages())?;

        if !existed_before {
            // The root page number is already reserved in the bitmap by
            // `DiskPageIo::create`; its content still needs to be an
            // actual empty leaf rather than a zeroed-out page.
            let leaf = BTreeNode::new_leaf(fresh_root_page);
            leaf.write_to(&mut io, config.page_size)?;
        }

        let btree = BTree::new(config.page_size);
        let mut db = Self { io, btree };

        if let Some(pending) = db.io.take_pending_operation() {
            db.redo_pending(pending)?;
        }

        Ok(db)
    }

    fn redo_pending(&mut self, op: PendingOp) -> DbResult<()> {
        match op {
            PendingOp::Insert { key, value } => self.put(&key, &value),
            PendingOp::Delete { key } => self.delete(&key).map(|_| ()),
        }
    }

    pub fn get(&mut self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        let root = self.io.root_page();
        self.btree.get(&mut self.io, root, key)
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> DbResult<()> {
        self.io.start_operation(OpType::Insert, key, value)?;
        let root = self.io.root_page();
        let new_root = self.btree.insert(&mut self.io, root, key, value)?;
        if new_root != root {
            self.io.set_root_page(new_root)?;
        }
        self.io.end_operation()
    }

    pub fn delete(&mut self, key: &[u8]) -> DbResult<bool> {
        self.io.start_operation(OpType::Delete, key, &[])?;
        let root = self.io.root_page();
        let deleted = self.btree.delete(&mut self.io, root, key)?;
        self.io.end_operation()?;
        Ok(deleted)
    }

    /// Drains the cache and emits a checkpoint. Does not fsync.
    pub fn flush(&mut self) -> DbResult<()> {
        self.io.flush()
    }

    /// `flush`, then fsyncs both the data file and the journal file.
    pub fn sync(&mut self) -> DbResult<()> {
        self.io.sync()
    }

    pub fn close(&mut self) -> DbResult<()> {
        self.io.close()
    }
}
