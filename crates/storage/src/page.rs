use common::{DbError, DbResult};

/// A fixed-size, zero-initialized buffer for one page's worth of bytes,
/// with a cursor for sequential read/write the way on-disk records are
/// assembled and parsed.
#[derive(Debug, Clone)]
pub struct Page {
    number: u64,
    data: Vec<u8>,
    cursor: usize,
}

impl Page {
    /// Creates a new zeroed page of `page_size` bytes.
    pub fn new(number: u64, page_size: usize) -> Self {
        Self {
            number,
            data: vec![0u8; page_size],
            cursor: 0,
        }
    }

    /// Wraps existing bytes (e.g. just read from disk) as a page.
    pub fn from_bytes(number: u64, data: Vec<u8>) -> Self {
        Self {
            number,
            data,
            cursor: 0,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    pub fn seek(&mut self, pos: usize) {
        self.cursor = pos;
    }

    pub fn seek_forward(&mut self, amount: usize) {
        self.cursor += amount;
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn free_space(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }

    pub fn raw_data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn read(&mut self, size: usize) -> DbResult<&[u8]> {
        if size == 0 || self.cursor + size > self.data.len() {
            return Err(DbError::Invariant("invalid read from page".into()));
        }
        let slice = &self.data[self.cursor..self.cursor + size];
        self.cursor += size;
        Ok(slice)
    }

    pub fn write(&mut self, bytes: &[u8]) -> DbResult<()> {
        if bytes.is_empty() || self.cursor + bytes.len() > self.data.len() {
            return Err(DbError::Invariant("invalid write to page".into()));
        }
        self.data[self.cursor..self.cursor + bytes.len()].copy_from_slice(bytes);
        self.cursor += bytes.len();
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> DbResult<()> {
        self.write(&value.to_le_bytes())
    }

    pub fn read_u64(&mut self) -> DbResult<u64> {
        let bytes = self.read(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }
}
