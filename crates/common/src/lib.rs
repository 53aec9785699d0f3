
use std::io;
use thiserror::Error;

/// Canonical error type shared across storage, wal, buffer, btree and database.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("config: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("corruption: {0}")]
    Corruption(String),
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error("logic error: {0}")]
    Logic(String),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Compares two byte strings the way stored keys and values are ordered:
/// shorter byte strings sort first regardless of content, and only byte
/// strings of equal length fall back to lexicographic comparison.
pub fn compare_bytes(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Runtime configuration for opening or creating a database file.
///
/// # Example
/// ```
/// use common::Config;
///
/// let config = Config::builder()
///     .path("./my.db")
///     .page_size(4096)
///     .build();
/// ```
#[derive(Clone, Debug, bon::Builder)]
pub struct Config {
    /// Path to the single backing file.
    #[builder(into)]
    pub path: std::path::PathBuf,
    /// Fixed page size in bytes. Must match an existing file's header on open.
    #[builder(default = 4096)]
    pub page_size: usize,
    /// Total database size in bytes; determines the initial page count on create.
    #[builder(default = 512 * 1024 * 1024)]
    pub db_size: usize,
    /// Size in bytes of the in-memory LRU page cache. Must be a multiple of `page_size`.
    #[builder(default = 16 * 1024 * 1024)]
    pub cache_size: usize,
    /// Path to the write-ahead journal file. Defaults to `<path>.journal`.
    pub journal_path: Option<std::path::PathBuf>,
}

impl Config {
    /// Resolves the journal path, defaulting to `<path>.journal`.
    pub fn resolved_journal_path(&self) -> std::path::PathBuf {
        self.journal_path.clone().unwrap_or_else(|| {
            let mut p = self.path.clone().into_os_string();
            p.push(".journal");
            p.into()
        })
    }

    /// Number of pages implied by `db_size` / `page_size`.
    pub fn page_count(&self) -> u64 {
        (self.db_size / self.page_size) as u64
    }

    /// Number of pages the cache can hold.
    pub fn cache_pages(&self) -> usize {
        self.cache_size / self.page_size
    }
}
