//! On-disk node layout for the byte-occupancy B-tree.
//!
//! A node is not split on a fixed branching factor; it is split on how
//! many bytes its encoded keys, values and child links occupy against
//! the effective per-page budget the tree is configured with. This
//! mirrors the disk-budget accounting of the node type this crate's
//! tree is built from, down to the exact field order serialized by
//! `write_to`/`read_from`.

use common::{compare_bytes, DbError, DbResult};
use storage::{Page, PageIo};

/// A single B-tree node: leaf or internal, depending on `is_leaf`.
/// Internal nodes carry one more child link than they have keys.
#[derive(Debug, Clone)]
pub struct BTreeNode {
    page_number: u64,
    pub is_leaf: bool,
    pub keys: Vec<Vec<u8>>,
    pub values: Vec<Vec<u8>>,
    pub children: Vec<u64>,
}

impl BTreeNode {
    /// A fresh, empty leaf occupying a newly allocated page.
    pub fn new_leaf(page_number: u64) -> Self {
        Self {
            page_number,
            is_leaf: true,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
        }
    }

    /// A fresh, empty internal node occupying a newly allocated page.
    pub fn new_internal(page_number: u64) -> Self {
        Self {
            page_number,
            is_leaf: false,
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn page_number(&self) -> u64 {
        self.page_number
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Reads a node back from its page.
    pub fn read_from(source: &mut dyn PageIo, page_number: u64, page_size: usize) -> DbResult<Self> {
        let mut page = Page::new(page_number, page_size);
        source.read(&mut page)?;

        let is_leaf = page.read(1)?[0] != 0;
        let key_count = page.read_u64()? as usize;

        let mut keys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            let len = page.read_u64()? as usize;
            let bytes = if len > 0 { page.read(len)?.to_vec() } else { Vec::new() };
            keys.push(bytes);
        }

        let mut values = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            let len = page.read_u64()? as usize;
            let bytes = if len > 0 { page.read(len)?.to_vec() } else { Vec::new() };
            values.push(bytes);
        }

        let mut children = Vec::new();
        if !is_leaf {
            for _ in 0..=key_count {
                children.push(page.read_u64()?);
            }
        }

        Ok(Self { page_number, is_leaf, keys, values, children })
    }

    /// Serializes this node to its page and writes it through `sink`.
    pub fn write_to(&self, sink: &mut dyn PageIo, page_size: usize) -> DbResult<()> {
        let mut page = Page::new(self.page_number, page_size);
        page.write(&[self.is_leaf as u8])?;
        page.write_u64(self.keys.len() as u64)?;
        for key in &self.keys {
            page.write_u64(key.len() as u64)?;
            if !key.is_empty() {
                page.write(key)?;
            }
        }
        for value in &self.values {
            page.write_u64(value.len() as u64)?;
            if !value.is_empty() {
                page.write(value)?;
            }
        }
        if !self.is_leaf {
            for child in &self.children {
                page.write_u64(*child)?;
            }
        }
        sink.write(&page)
    }

    /// Deallocates this node's own page. Called once its contents have
    /// been folded into a sibling during a merge.
    pub fn free_page(&self, sink: &mut dyn PageIo) -> DbResult<()> {
        sink.deallocate_page_number(self.page_number)
    }

    /// Bytes this node would occupy on disk if serialized right now.
    pub fn space_on_disk(&self) -> usize {
        let mut total = 1 + 8;
        for key in &self.keys {
            total += 8 + key.len();
        }
        for value in &self.values {
            total += 8 + value.len();
        }
        if !self.is_leaf {
            total += (self.children.len()) * 8;
        }
        total
    }

    /// Additional bytes `space_on_disk` would grow by if `key`/`value`
    /// were inserted as one more key-value pair (plus, for an internal
    /// node, one more child link).
    pub fn additional_space_for(&self, key: &[u8], value: &[u8]) -> usize {
        let mut additional = 8 + key.len() + 8 + value.len();
        if !self.is_leaf {
            additional += 8;
        }
        additional
    }

    /// The smallest prefix length `i` (1-indexed count of entries) whose
    /// cumulative on-disk size exceeds `limit`. Used to find a
    /// size-balanced split point: entries `[0, i)` stay with the
    /// original node, `[i, len)` move to the new sibling.
    pub fn find_first_exceeding(&self, limit: usize) -> usize {
        let mut cur_space = 1 + 8;
        if !self.is_leaf {
            // A node with one key already needs two child links, so the
            // first key's child-link cost is one more than subsequent keys.
            cur_space += 8;
        }
        for i in 0..self.keys.len() {
            cur_space += 8 + self.keys[i].len() + 8 + self.values[i].len();
            if !self.is_leaf {
                cur_space += 8;
            }
            if cur_space > limit {
                return i;
            }
        }
        self.keys.len()
    }

    /// Index of the first key `>= key` (lower bound), under the
    /// length-primary comparator this tree orders keys by.
    pub fn lower_bound(&self, key: &[u8]) -> usize {
        self.keys.partition_point(|k| compare_bytes(k, key) == std::cmp::Ordering::Less)
    }

    /// Index of the last key `<= key`, or `usize::MAX` if every key in
    /// this node is greater than `key`. Mirrors an upper-bound-minus-one
    /// scan over an ordered key set.
    pub fn last_le(&self, key: &[u8]) -> Option<usize> {
        let upper = self.keys.partition_point(|k| compare_bytes(k, key) != std::cmp::Ordering::Greater);
        if upper == 0 {
            None
        } else {
            Some(upper - 1)
        }
    }

    pub fn key_at(&self, i: usize) -> DbResult<&[u8]> {
        self.keys.get(i).map(Vec::as_slice).ok_or_else(|| DbError::Invariant("key index out of range".into()))
    }
}
