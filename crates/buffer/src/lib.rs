//! Caching layer over a [`storage::PageIo`]: an LRU page cache with
//! per-operation pinning, backed by a [`wal::Journal`] redo log. This is
//! the layer that gives the B-tree crash-safe, pinned-atomic single-key
//! operations.

#[cfg(test)]
mod tests;

use std::path::Path;

use hashbrown::{HashMap, HashSet};

use common::{DbError, DbResult};
use storage::{Page, PageIo};
use wal::{Journal, PendingOp, Recovery};

const CHECKPOINT_THRESHOLD: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpType {
    Insert,
    Delete,
}

struct CacheCell {
    page: Page,
    dirty: bool,
}

/// LRU cache plus redo journal sitting in front of any [`PageIo`].
pub struct CachedPageIo {
    source: Box<dyn PageIo>,
    page_size: usize,
    cells: Vec<Option<CacheCell>>,
    pos_in_cache: HashMap<u64, usize>,
    lru: Vec<usize>,
    pinned: HashSet<usize>,
    journal: Journal,
    writes_counter: u64,
    in_operation: bool,
    pending: Option<PendingOp>,
}

impl CachedPageIo {
    /// Wraps `source`, opening (and recovering) the journal at
    /// `journal_path`. Any replayed page writes found during recovery are
    /// applied to `source` before this returns; any unfinished insert or
    /// delete is kept in [`CachedPageIo::take_pending_operation`] for the
    /// caller to redo.
    pub fn new(
        mut source: Box<dyn PageIo>,
        journal_path: &Path,
        page_size: usize,
        cache_cells: usize,
    ) -> DbResult<Self> {
        if cache_cells == 0 {
            return Err(DbError::Config("cache must hold at least one page".into()));
        }
        let (journal, recovery) = Journal::open(journal_path, page_size as u64)?;
        Self::apply_replay(&mut source, recovery.replay, page_size)?;

        Ok(Self {
            source,
            page_size,
            cells: (0..cache_cells).map(|_| None).collect(),
            pos_in_cache: HashMap::new(),
            lru: (0..cache_cells).collect(),
            pinned: HashSet::new(),
            journal,
            writes_counter: 0,
            in_operation: false,
            pending: recovery.pending,
        })
    }

    fn apply_replay(source: &mut Box<dyn PageIo>, replay: Vec<wal::ChangeRecord>, page_size: usize) -> DbResult<()> {
        for record in replay {
            if record.bytes.len() != page_size {
                return Err(DbError::Corruption("replayed page has wrong size".into()));
            }
            let page = Page::from_bytes(record.page_number, record.bytes);
            source.write(&page)?;
        }
        Ok(())
    }

    /// Takes (and clears) the unfinished operation surfaced by recovery,
    /// if any. Meant to be called exactly once, right after `new`.
    pub fn take_pending_operation(&mut self) -> Option<PendingOp> {
        self.pending.take()
    }

    /// Marks the start of a logical insert/delete: logs the operation's
    /// key (and value, for insert) before any page writes happen, so a
    /// crash mid-operation can be redone from the journal.
    pub fn start_operation(&mut self, op: OpType, key: &[u8], value: &[u8]) -> DbResult<()> {
        match op {
            OpType::Insert => self.journal.append_insert(key, value)?,
            OpType::Delete => self.journal.append_delete(key)?,
        }
        self.in_operation = true;
        Ok(())
    }

    /// Marks the operation as complete: writes a commit record and
    /// releases every page pinned during the operation.
    pub fn end_operation(&mut self) -> DbResult<()> {
        self.journal.append_commit()?;
        self.in_operation = false;
        self.pinned.clear();
        Ok(())
    }

    fn touch_lru(&mut self, cell: usize) {
        self.lru.retain(|&c| c != cell);
        self.lru.insert(0, cell);
    }

    fn flush_cell(&mut self, cell: usize) -> DbResult<()> {
        if let Some(c) = &mut self.cells[cell] {
            if c.dirty {
                self.source.write(&c.page)?;
                c.dirty = false;
            }
        }
        Ok(())
    }

    /// Finds a cache slot to use for a newly-read or newly-written page,
    /// evicting the least-recently-used unpinned slot if the cache is
    /// full.
    fn free_cache_position(&mut self) -> DbResult<usize> {
        for i in (0..self.lru.len()).rev() {
            let cell = self.lru[i];
            if self.pinned.contains(&cell) {
                continue;
            }
            if let Some(existing) = &self.cells[cell] {
                let number = existing.page.number();
                self.flush_cell(cell)?;
                self.pos_in_cache.remove(&number);
                self.cells[cell] = None;
            }
            return Ok(cell);
        }
        Err(DbError::Invariant("every cache slot is pinned".into()))
    }
}

impl PageIo for CachedPageIo {
    fn allocate_page_number(&mut self) -> DbResult<u64> {
        self.source.allocate_page_number()
    }

    fn deallocate_page_number(&mut self, number: u64) -> DbResult<()> {
        if let Some(cell) = self.pos_in_cache.remove(&number) {
            self.cells[cell] = None;
            self.touch_lru(cell);
        }
        self.source.deallocate_page_number(number)
    }

    fn read(&mut self, page: &mut Page) -> DbResult<()> {
        let number = page.number();
        let cell = match self.pos_in_cache.get(&number) {
            Some(&c) => c,
            None => {
                let cell = self.free_cache_position()?;
                let mut fresh = Page::new(number, self.page_size);
                self.source.read(&mut fresh)?;
                self.cells[cell] = Some(CacheCell { page: fresh, dirty: false });
                self.pos_in_cache.insert(number, cell);
                cell
            }
        };
        page.raw_data_mut().copy_from_slice(self.cells[cell].as_ref().unwrap().page.raw_data());
        self.touch_lru(cell);
        Ok(())
    }

    fn write(&mut self, page: &Page) -> DbResult<()> {
        if self.writes_counter >= CHECKPOINT_THRESHOLD {
            self.writes_counter = 0;
            self.flush()?;
        } else {
            self.writes_counter += 1;
        }

        self.journal.append_change(page.number(), page.raw_data())?;

        let number = page.number();
        let cell = match self.pos_in_cache.get(&number) {
            Some(&c) => c,
            None => {
                let cell = self.free_cache_position()?;
                self.pos_in_cache.insert(number, cell);
                cell
            }
        };
        self.cells[cell] = Some(CacheCell { page: page.clone(), dirty: true });
        if self.in_operation {
            self.pinned.insert(cell);
        }
        self.touch_lru(cell);
        Ok(())
    }

    fn flush(&mut self) -> DbResult<()> {
        let cells: Vec<usize> = self.pos_in_cache.values().copied().collect();
        for cell in cells {
            self.flush_cell(cell)?;
        }
        self.source.flush()?;
        self.journal.append_checkpoint()
    }

    fn close(&mut self) -> DbResult<()> {
        self.flush()?;
        self.source.close()?;
        self.journal.append_db_close()
    }

    fn root_page(&self) -> u64 {
        self.source.root_page()
    }

    fn set_root_page(&mut self, root_page: u64) -> DbResult<()> {
        self.source.set_root_page(root_page)
    }

    fn sync(&mut self) -> DbResult<()> {
        self.flush()?;
        self.source.sync()?;
        self.journal.sync()
    }
}
