use crate::Page;
use common::{DbError, DbResult};

pub const MAGIC: &[u8; 5] = b"MYDB\0";

/// Page-0 header: the first bytes of the database file. Written by
/// [`Header::write_to`] and parsed back by [`Header::read_from`].
///
/// Layout: `MAGIC` (5 bytes), `page_count`, `page_size`, `root_page`,
/// `cache_size` (each an 8-byte little-endian integer), then an 8-byte
/// length-prefixed, NUL-terminated `journal_path` string (the length
/// counts the trailing NUL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub page_count: u64,
    pub page_size: u64,
    pub root_page: u64,
    pub cache_size: u64,
    pub journal_path: String,
}

impl Header {
    pub fn new(page_count: u64, page_size: u64, root_page: u64, cache_size: u64, journal_path: impl Into<String>) -> Self {
        Self {
            page_count,
            page_size,
            root_page,
            cache_size,
            journal_path: journal_path.into(),
        }
    }

    /// Total bytes this header occupies once serialized, including the
    /// magic, the four fixed integers, and the length-prefixed path (the
    /// length counts the NUL terminator written after the path bytes).
    pub fn serialized_len(&self) -> usize {
        MAGIC.len() + 8 * 4 + 8 + self.journal_path.as_bytes().len() + 1
    }

    pub fn set_root_page(&mut self, root_page: u64) {
        self.root_page = root_page;
    }

    pub fn write_to(&self, page: &mut Page) -> DbResult<()> {
        page.seek(0);
        page.write(MAGIC)?;
        page.write_u64(self.page_count)?;
        page.write_u64(self.page_size)?;
        page.write_u64(self.root_page)?;
        page.write_u64(self.cache_size)?;
        let path_bytes = self.journal_path.as_bytes();
        page.write_u64(path_bytes.len() as u64 + 1)?;
        page.write(path_bytes)?;
        page.write(&[0u8])?;
        Ok(())
    }

    fn path_from_nul_terminated(mut bytes: Vec<u8>) -> DbResult<String> {
        if bytes.pop() != Some(0) {
            return Err(DbError::Corruption("journal path is not NUL-terminated".into()));
        }
        String::from_utf8(bytes).map_err(|_| DbError::Corruption("journal path is not valid utf-8".into()))
    }

    /// Reads just the fixed-size header fields directly off a reader, with
    /// no dependency on page size — used to learn `page_size` itself
    /// before a full page-0 read is possible.
    pub fn read_from_reader<R: std::io::Read>(reader: &mut R) -> DbResult<Self> {
        let mut magic = [0u8; MAGIC.len()];
        reader.read_exact(&mut magic)?;
        if magic != *MAGIC {
            return Err(DbError::Corruption("invalid magic in database file".into()));
        }
        let mut read_u64 = |reader: &mut R| -> DbResult<u64> {
            let mut buf = [0u8; 8];
            reader.read_exact(&mut buf)?;
            Ok(u64::from_le_bytes(buf))
        };
        let page_count = read_u64(reader)?;
        let page_size = read_u64(reader)?;
        let root_page = read_u64(reader)?;
        let cache_size = read_u64(reader)?;
        let path_len = read_u64(reader)? as usize;
        let mut path_bytes = vec![0u8; path_len];
        reader.read_exact(&mut path_bytes)?;
        let journal_path = Self::path_from_nul_terminated(path_bytes)?;
        Ok(Self {
            page_count,
            page_size,
            root_page,
            cache_size,
            journal_path,
        })
    }

    pub fn read_from(page: &mut Page) -> DbResult<Self> {
        page.seek(0);
        let magic = page.read(MAGIC.len())?;
        if magic != MAGIC {
            return Err(DbError::Corruption("invalid magic in database file".into()));
        }
        let page_count = page.read_u64()?;
        let page_size = page.read_u64()?;
        let root_page = page.read_u64()?;
        let cache_size = page.read_u64()?;
        let path_len = page.read_u64()? as usize;
        let path_bytes = page.read(path_len)?.to_vec();
        let journal_path = Self::path_from_nul_terminated(path_bytes)?;
        Ok(Self {
            page_count,
            page_size,
            root_page,
            cache_size,
            journal_path,
        })
    }
}
