use crate::Page;
use common::DbResult;

/// Shared contract for anything that can hand out page numbers and move
/// pages to and from durable storage. Implemented by [`crate::DiskPageIo`]
/// directly on a file, and by `buffer::CachedPageIo` as a caching layer
/// on top of any other `PageIo`.
pub trait PageIo {
    /// Returns a free page number and marks it allocated.
    fn allocate_page_number(&mut self) -> DbResult<u64>;
    /// Marks a page number free again.
    fn deallocate_page_number(&mut self, number: u64) -> DbResult<()>;
    /// Reads the page identified by `page.number()` into `page`.
    fn read(&mut self, page: &mut Page) -> DbResult<()>;
    /// Writes `page` to storage at its own page number.
    fn write(&mut self, page: &Page) -> DbResult<()>;
    /// Drains any buffered state to storage without necessarily fsyncing.
    fn flush(&mut self) -> DbResult<()>;
    /// Flushes and releases underlying resources. Safe to call once.
    fn close(&mut self) -> DbResult<()>;
    /// The B-tree's current root page number, as recorded in the header.
    fn root_page(&self) -> u64;
    /// Records a new root page number. Durable once `flush` next runs.
    fn set_root_page(&mut self, root_page: u64) -> DbResult<()>;
    /// Flushes and fsyncs every backing file. Stronger, slower than
    /// `flush`, which only guarantees the in-process buffers are drained.
    fn sync(&mut self) -> DbResult<()> {
        self.flush()
    }
}
