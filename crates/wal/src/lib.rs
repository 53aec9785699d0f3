//! Write-ahead redo journal for crash recovery.
//!
//! Every page write and every key-level insert/delete is appended as a
//! fixed-width record before it takes effect. On open, [`Journal::open`]
//! scans the tail of the file backward to find the last checkpoint and any
//! unfinished trailing insert/delete, then replays forward from the
//! checkpoint to rebuild storage state and surfaces the unfinished
//! operation (if any) to the caller for idempotent redo.

#[cfg(test)]
mod tests;

use std::fs::{File, OpenOptions};
use std::io::{Read as IoRead, Seek, SeekFrom, Write as IoWrite};
use std::path::Path;

use common::{DbError, DbResult};

const TAG_SIZE: usize = 8;

const TAG_CHANGE: &[u8; TAG_SIZE] = b"CHANGE_\0";
const TAG_DB_OPEN: &[u8; TAG_SIZE] = b"DB_OPEN\0";
const TAG_DB_CLOSE: &[u8; TAG_SIZE] = b"DBCLOSE\0";
const TAG_CHECKPOINT: &[u8; TAG_SIZE] = b"CHCKPNT\0";
const TAG_INSERT: &[u8; TAG_SIZE] = b"INSERT_\0";
const TAG_DELETE: &[u8; TAG_SIZE] = b"DELETE_\0";
const TAG_COMMIT: &[u8; TAG_SIZE] = b"COMMIT_\0";

const DELIM: u8 = b'|';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Change,
    DbOpen,
    DbClose,
    Checkpoint,
    Insert,
    Delete,
    Commit,
}

impl Tag {
    fn bytes(self) -> &'static [u8; TAG_SIZE] {
        match self {
            Tag::Change => TAG_CHANGE,
            Tag::DbOpen => TAG_DB_OPEN,
            Tag::DbClose => TAG_DB_CLOSE,
            Tag::Checkpoint => TAG_CHECKPOINT,
            Tag::Insert => TAG_INSERT,
            Tag::Delete => TAG_DELETE,
            Tag::Commit => TAG_COMMIT,
        }
    }

    fn from_bytes(raw: &[u8; TAG_SIZE]) -> Option<Tag> {
        match raw {
            TAG_CHANGE => Some(Tag::Change),
            TAG_DB_OPEN => Some(Tag::DbOpen),
            TAG_DB_CLOSE => Some(Tag::DbClose),
            TAG_CHECKPOINT => Some(Tag::Checkpoint),
            TAG_INSERT => Some(Tag::Insert),
            TAG_DELETE => Some(Tag::Delete),
            TAG_COMMIT => Some(Tag::Commit),
            _ => None,
        }
    }
}

/// A replayed page write, to be applied directly to the underlying storage.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub page_number: u64,
    pub bytes: Vec<u8>,
}

/// An insert or delete that was logged but never saw a matching commit
/// record before the process went down. The caller (the B-tree layer)
/// must redo this operation idempotently against its now-recovered state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOp {
    Insert { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// The result of scanning an existing journal on open: page writes to
/// replay in order, plus at most one unfinished operation to redo.
#[derive(Debug, Clone, Default)]
pub struct Recovery {
    pub replay: Vec<ChangeRecord>,
    pub pending: Option<PendingOp>,
}

/// Fixed-width record journal. Every record occupies exactly
/// `TAG_SIZE + 8 + page_size` bytes on disk, tag first, then a
/// record-specific body, zero-padded and terminated with a `|` delimiter
/// so the file can be scanned backward one record at a time.
pub struct Journal {
    file: File,
    page_size: u64,
}

impl Journal {
    fn record_size(page_size: u64) -> u64 {
        TAG_SIZE as u64 + 8 + page_size
    }

    /// Opens (creating if needed) the journal at `path`, performs crash
    /// recovery if the journal already had content, and appends a
    /// `DB_OPEN` marker before returning.
    pub fn open(path: &Path, page_size: u64) -> DbResult<(Self, Recovery)> {
        let existed_before = path.exists();
        let mut file = OpenOptions::new().read(true).write(true).create(true).open(path)?;

        let recovery = if existed_before && file.metadata()?.len() > 0 {
            Self::recover(&mut file, page_size)?
        } else {
            Self::write_tag_padded(&mut file, Tag::Checkpoint, &[], page_size)?;
            Recovery::default()
        };

        let mut journal = Self { file, page_size };
        journal.append_db_open()?;
        Ok((journal, recovery))
    }

    fn write_tag_padded(file: &mut File, tag: Tag, body: &[u8], page_size: u64) -> DbResult<()> {
        file.seek(SeekFrom::End(0))?;
        file.write_all(tag.bytes())?;
        file.write_all(body)?;
        let record_size = Self::record_size(page_size);
        let written = TAG_SIZE as u64 + body.len() as u64;
        let zeros = record_size - written - 1;
        if zeros > 0 {
            file.write_all(&vec![0u8; zeros as usize])?;
        }
        file.write_all(&[DELIM])?;
        Ok(())
    }

    fn read_exact_at(file: &mut File, buf: &mut [u8]) -> DbResult<()> {
        file.read_exact(buf)?;
        Ok(())
    }

    /// Backward scan to find the last checkpoint (and any unfinished
    /// trailing insert/delete), then forward replay from there.
    fn recover(file: &mut File, page_size: u64) -> DbResult<Recovery> {
        let record_size = Self::record_size(page_size);

        file.seek(SeekFrom::End(0))?;

        let mut has_seen_commit = false;
        let mut pending: Option<PendingOp> = None;
        let mut last_operation_offset: Option<u64> = None;
        let checkpoint_offset;

        loop {
            let cur_offset = file.seek(SeekFrom::Current(-(record_size as i64)))?;
            let mut tag_buf = [0u8; TAG_SIZE];
            Self::read_exact_at(file, &mut tag_buf)?;
            let tag = Tag::from_bytes(&tag_buf)
                .ok_or_else(|| DbError::Corruption("unrecognized journal tag".into()))?;

            match tag {
                Tag::Commit => has_seen_commit = true,
                Tag::Insert if !has_seen_commit => {
                    last_operation_offset = Some(cur_offset);
                    let key = Self::read_length_prefixed(file)?;
                    let value = Self::read_length_prefixed(file)?;
                    pending = Some(PendingOp::Insert { key, value });
                }
                Tag::Delete if !has_seen_commit => {
                    last_operation_offset = Some(cur_offset);
                    let key = Self::read_length_prefixed(file)?;
                    pending = Some(PendingOp::Delete { key });
                }
                _ => {}
            }

            file.seek(SeekFrom::Start(cur_offset))?;
            if tag == Tag::Checkpoint {
                checkpoint_offset = cur_offset;
                break;
            }
        }

        // Forward replay from the checkpoint.
        file.seek(SeekFrom::Start(checkpoint_offset + record_size))?;
        let mut replay = Vec::new();
        loop {
            let record_start = file.stream_position()?;
            let mut tag_buf = [0u8; TAG_SIZE];
            let read = file.read(&mut tag_buf)?;
            if read == 0 {
                break;
            }
            if read != TAG_SIZE {
                return Err(DbError::Corruption("truncated journal record tag".into()));
            }
            let tag = Tag::from_bytes(&tag_buf)
                .ok_or_else(|| DbError::Corruption("unrecognized journal tag".into()))?;

            match tag {
                Tag::Change => {
                    let mut num_buf = [0u8; 8];
                    Self::read_exact_at(file, &mut num_buf)?;
                    let page_number = u64::from_le_bytes(num_buf);
                    let mut bytes = vec![0u8; page_size as usize];
                    Self::read_exact_at(file, &mut bytes)?;
                    replay.push(ChangeRecord { page_number, bytes });
                    file.seek(SeekFrom::Start(record_start + record_size))?;
                }
                Tag::Insert | Tag::Delete
                    if Some(record_start) == last_operation_offset =>
                {
                    file.set_len(record_start)?;
                    file.seek(SeekFrom::Start(record_start))?;
                    break;
                }
                _ => {
                    file.seek(SeekFrom::Start(record_start + record_size))?;
                }
            }
        }

        Ok(Recovery { replay, pending })
    }

    fn read_length_prefixed(file: &mut File) -> DbResult<Vec<u8>> {
        let mut len_buf = [0u8; 8];
        Self::read_exact_at(file, &mut len_buf)?;
        let len = u64::from_le_bytes(len_buf) as usize;
        let mut bytes = vec![0u8; len];
        Self::read_exact_at(file, &mut bytes)?;
        Ok(bytes)
    }

    pub fn append_change(&mut self, page_number: u64, bytes: &[u8]) -> DbResult<()> {
        if bytes.len() as u64 != self.page_size {
            return Err(DbError::Invariant("change record must carry one full page".into()));
        }
        let mut body = Vec::with_capacity(8 + bytes.len());
        body.extend_from_slice(&page_number.to_le_bytes());
        body.extend_from_slice(bytes);
        Self::write_tag_padded(&mut self.file, Tag::Change, &body, self.page_size)
    }

    pub fn append_insert(&mut self, key: &[u8], value: &[u8]) -> DbResult<()> {
        let mut body = Vec::with_capacity(16 + key.len() + value.len());
        body.extend_from_slice(&(key.len() as u64).to_le_bytes());
        body.extend_from_slice(key);
        body.extend_from_slice(&(value.len() as u64).to_le_bytes());
        body.extend_from_slice(value);
        Self::write_tag_padded(&mut self.file, Tag::Insert, &body, self.page_size)
    }

    pub fn append_delete(&mut self, key: &[u8]) -> DbResult<()> {
        let mut body = Vec::with_capacity(8 + key.len());
        body.extend_from_slice(&(key.len() as u64).to_le_bytes());
        body.extend_from_slice(key);
        Self::write_tag_padded(&mut self.file, Tag::Delete, &body, self.page_size)
    }

    pub fn append_commit(&mut self) -> DbResult<()> {
        Self::write_tag_padded(&mut self.file, Tag::Commit, &[], self.page_size)
    }

    pub fn append_checkpoint(&mut self) -> DbResult<()> {
        Self::write_tag_padded(&mut self.file, Tag::Checkpoint, &[], self.page_size)
    }

    pub fn append_db_open(&mut self) -> DbResult<()> {
        Self::write_tag_padded(&mut self.file, Tag::DbOpen, &[], self.page_size)
    }

    pub fn append_db_close(&mut self) -> DbResult<()> {
        Self::write_tag_padded(&mut self.file, Tag::DbClose, &[], self.page_size)
    }

    pub fn sync(&mut self) -> DbResult<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
