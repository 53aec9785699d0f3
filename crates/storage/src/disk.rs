use std::fs::{File, OpenOptions};
use std::io::{Read as IoRead, Seek, SeekFrom, Write as IoWrite};
use std::path::Path;

use common::{Config, DbError, DbResult};

use crate::bitmap::{Bitmap, BitmapLayout};
use crate::header::Header;
use crate::page::Page;
use crate::page_io::PageIo;

/// The page number the root B-tree node is pre-allocated at when a fresh
/// database is created. Placed right after the bitmap's carrier pages.
fn fresh_root_page(layout: BitmapLayout) -> u64 {
    1 + layout.carrier_pages
}

/// File-backed [`PageIo`]: owns the single backing file, the page-0
/// header, and the allocation bitmap. Reads and writes go straight to
/// disk with no caching; [`buffer::CachedPageIo`] wraps this to add an
/// LRU cache and a redo journal.
pub struct DiskPageIo {
    file: File,
    header: Header,
    bitmap: Bitmap,
    layout: BitmapLayout,
}

impl DiskPageIo {
    /// Opens an existing database file, or creates one if `config.path`
    /// does not exist, mirroring the original engine's `access(file,
    /// F_OK)` branch.
    pub fn open(config: &Config) -> DbResult<Self> {
        if config.path.exists() {
            Self::open_existing(&config.path)
        } else {
            Self::create(config)
        }
    }

    fn create(config: &Config) -> DbResult<Self> {
        let journal_path = config.resolved_journal_path();
        let header = Header::new(
            config.page_count(),
            config.page_size as u64,
            0,
            config.cache_size as u64,
            journal_path.to_string_lossy().into_owned(),
        );
        let layout = BitmapLayout::compute(header.page_count, header.serialized_len() as u64, header.page_size);
        let root_page = fresh_root_page(layout);
        let mut header = header;
        header.set_root_page(root_page);

        let mut bitmap = Bitmap::new(header.page_count);
        bitmap.mark_all(std::iter::once(0).chain(1..=layout.carrier_pages).chain(std::iter::once(root_page)))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&config.path)?;
        file.set_len(header.page_count * header.page_size)?;

        let mut io = Self {
            file,
            header,
            bitmap,
            layout,
        };
        io.write_header_and_bitmap()?;
        Ok(io)
    }

    fn open_existing(path: &Path) -> DbResult<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        // The fixed-size fields are read directly off the fd, independent
        // of page size, so the real page size is known before page 0 is
        // re-read in full at its true size.
        file.seek(SeekFrom::Start(0))?;
        let probed_header = Header::read_from_reader(&mut file)?;

        let mut page0 = Self::read_page_raw(&mut file, 0, probed_header.page_size as usize)?;
        let header = Header::read_from(&mut page0)?;
        let layout = BitmapLayout::compute(header.page_count, header.serialized_len() as u64, header.page_size);

        let mut mask = page0.read(layout.bytes_in_page0 as usize)?.to_vec();
        let total_bitmap_bytes = ((header.page_count + 7) / 8) as usize;
        for i in 0..layout.carrier_pages {
            let page_number = 1 + i;
            let mut carrier = Self::read_page_raw(&mut file, page_number, header.page_size as usize)?;
            let take = (total_bitmap_bytes - mask.len()).min(header.page_size as usize);
            mask.extend_from_slice(carrier.read(take)?);
        }
        let bitmap = Bitmap::from_bytes(header.page_count, mask);

        Ok(Self {
            file,
            header,
            bitmap,
            layout,
        })
    }

    fn read_page_raw(file: &mut File, number: u64, page_size: usize) -> DbResult<Page> {
        let mut buf = vec![0u8; page_size];
        file.seek(SeekFrom::Start(number * page_size as u64))?;
        file.read_exact(&mut buf)?;
        Ok(Page::from_bytes(number, buf))
    }

    fn write_page_raw(file: &mut File, page: &Page) -> DbResult<()> {
        file.seek(SeekFrom::Start(page.number() * page.page_size() as u64))?;
        file.write_all(page.raw_data())?;
        Ok(())
    }

    fn write_header_and_bitmap(&mut self) -> DbResult<()> {
        let mut page0 = Page::new(0, self.header.page_size as usize);
        self.header.write_to(&mut page0)?;
        let bytes = self.bitmap.as_bytes();
        page0.write(&bytes[..self.layout.bytes_in_page0 as usize])?;
        Self::write_page_raw(&mut self.file, &page0)?;

        let mut offset = self.layout.bytes_in_page0 as usize;
        for i in 0..self.layout.carrier_pages {
            let page_number = 1 + i;
            let mut carrier = Page::new(page_number, self.header.page_size as usize);
            let remaining = bytes.len() - offset;
            let take = remaining.min(self.header.page_size as usize);
            carrier.write(&bytes[offset..offset + take])?;
            offset += take;
            Self::write_page_raw(&mut self.file, &carrier)?;
        }
        Ok(())
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Persists just the header + bitmap page to disk, without touching
    /// data pages. Used to make a root-page change durable ahead of the
    /// journal's next checkpoint.
    pub fn flush_header(&mut self) -> DbResult<()> {
        self.write_header_and_bitmap()
    }

}

impl PageIo for DiskPageIo {
    fn allocate_page_number(&mut self) -> DbResult<u64> {
        let number = self.bitmap.first_free_page()?;
        self.bitmap.set(number, true)?;
        Ok(number)
    }

    fn deallocate_page_number(&mut self, number: u64) -> DbResult<()> {
        self.bitmap.set(number, false)
    }

    fn read(&mut self, page: &mut Page) -> DbResult<()> {
        if page.number() >= self.header.page_count {
            return Err(DbError::Invariant("invalid page number read".into()));
        }
        self.file.seek(SeekFrom::Start(page.number() * self.header.page_size))?;
        self.file.read_exact(page.raw_data_mut())?;
        Ok(())
    }

    fn write(&mut self, page: &Page) -> DbResult<()> {
        if page.number() >= self.header.page_count {
            return Err(DbError::Invariant("invalid page number write".into()));
        }
        Self::write_page_raw(&mut self.file, page)
    }

    fn flush(&mut self) -> DbResult<()> {
        self.write_header_and_bitmap()
    }

    fn close(&mut self) -> DbResult<()> {
        self.flush()
    }

    fn root_page(&self) -> u64 {
        self.header.root_page
    }

    fn set_root_page(&mut self, root_page: u64) -> DbResult<()> {
        self.header.set_root_page(root_page);
        Ok(())
    }

    fn sync(&mut self) -> DbResult<()> {
        self.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Config;
    use tempfile::tempdir;

    fn config(dir: &Path) -> Config {
        Config::builder()
            .path(dir.join("test.db"))
            .page_size(512)
            .db_size(512 * 64)
            .cache_size(512 * 4)
            .build()
    }

    #[test]
    fn create_preallocates_header_carriers_and_root() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let io = DiskPageIo::open(&cfg).unwrap();
        assert!(io.bitmap.get(0).unwrap());
        assert!(io.bitmap.get(io.header.root_page).unwrap());
        assert_ne!(io.header.root_page, 0);
    }

    #[test]
    fn reopen_recovers_identical_header() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let root_page = {
            let io = DiskPageIo::open(&cfg).unwrap();
            io.header.root_page
        };
        let reopened = DiskPageIo::open(&cfg).unwrap();
        assert_eq!(reopened.header.root_page, root_page);
        assert_eq!(reopened.header.page_count, cfg.page_count());
    }

    #[test]
    fn allocate_then_deallocate_page_number() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let mut io = DiskPageIo::open(&cfg).unwrap();
        let allocated = io.allocate_page_number().unwrap();
        assert!(io.bitmap.get(allocated).unwrap());
        io.deallocate_page_number(allocated).unwrap();
        assert!(!io.bitmap.get(allocated).unwrap());
    }

    #[test]
    fn write_then_read_page_roundtrips() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let mut io = DiskPageIo::open(&cfg).unwrap();
        let number = io.allocate_page_number().unwrap();
        let mut page = Page::new(number, cfg.page_size);
        page.write(b"hello world").unwrap();
        io.write(&page).unwrap();

        let mut read_back = Page::new(number, cfg.page_size);
        io.read(&mut read_back).unwrap();
        assert_eq!(&read_back.raw_data()[..11], b"hello world");
    }

    #[test]
    fn bitmap_survives_reopen_after_allocation() {
        let dir = tempdir().unwrap();
        let cfg = config(dir.path());
        let allocated = {
            let mut io = DiskPageIo::open(&cfg).unwrap();
            let n = io.allocate_page_number().unwrap();
            io.close().unwrap();
            n
        };
        let reopened = DiskPageIo::open(&cfg).unwrap();
        assert!(reopened.bitmap.get(allocated).unwrap());
    }
}
