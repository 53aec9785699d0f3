//! A byte-occupancy B-tree index: nodes split and merge based on how
//! many bytes their encoded contents occupy on disk, not on a fixed
//! branching factor. Every node access goes through a [`storage::PageIo`]
//! (typically a caching, journaled implementation), so every mutation is
//! durable the moment this crate's methods return.

mod node;

#[cfg(test)]
mod tests;

pub use node::BTreeNode;

use std::cmp::Ordering;

use common::{compare_bytes, DbError, DbResult};
use storage::PageIo;

/// Byte-occupancy B-tree operating over pages of a fixed size.
///
/// Each node may hold up to [`BTree::effective_page_size`] bytes of
/// encoded keys, values and child links; a node that would exceed this
/// budget after an insert is split. This leaves roughly a quarter of
/// each page unused so an already-full node can still absorb one more
/// key-value pair before it must split.
#[derive(Debug, Clone, Copy)]
pub struct BTree {
    page_size: usize,
    eps: usize,
}

impl BTree {
    pub fn new(page_size: usize) -> Self {
        Self { page_size, eps: page_size * 3 / 4 }
    }

    pub fn effective_page_size(&self) -> usize {
        self.eps
    }

    /// Allocates a page for a fresh, empty root leaf and writes it.
    pub fn create_root(&self, sink: &mut dyn PageIo) -> DbResult<u64> {
        let page_number = sink.allocate_page_number()?;
        let root = BTreeNode::new_leaf(page_number);
        root.write_to(sink, self.page_size)?;
        Ok(page_number)
    }

    pub fn get(&self, sink: &mut dyn PageIo, root_page: u64, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        self.select_from_node(sink, root_page, key)
    }

    fn select_from_node(&self, sink: &mut dyn PageIo, page_number: u64, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        let node = BTreeNode::read_from(sink, page_number, self.page_size)?;
        let i = node.lower_bound(key);
        if i < node.key_count() && compare_bytes(node.key_at(i)?, key) == Ordering::Equal {
            return Ok(Some(node.values[i].clone()));
        }
        if node.is_leaf {
            Ok(None)
        } else {
            self.select_from_node(sink, node.children[i], key)
        }
    }

    /// Inserts or overwrites `key` with `value`. Returns the root page
    /// number, which changes when the root splits.
    pub fn insert(&self, sink: &mut dyn PageIo, root_page: u64, key: &[u8], value: &[u8]) -> DbResult<u64> {
        let mut root = BTreeNode::read_from(sink, root_page, self.page_size)?;

        if root.space_on_disk() + root.additional_space_for(key, value) > self.eps {
            let new_root_page = sink.allocate_page_number()?;
            let mut new_root = BTreeNode::new_internal(new_root_page);
            new_root.children.push(root.page_number());

            self.split_child(sink, &mut new_root, 0, &mut root)?;
            root.write_to(sink, self.page_size)?;

            self.insert_non_full(sink, &mut new_root, key, value)?;
            Ok(new_root_page)
        } else {
            self.insert_non_full(sink, &mut root, key, value)?;
            Ok(root.page_number())
        }
    }

    fn insert_non_full(&self, sink: &mut dyn PageIo, x: &mut BTreeNode, key: &[u8], value: &[u8]) -> DbResult<()> {
        let last_le = x.last_le(key);
        if let Some(i) = last_le {
            if compare_bytes(x.key_at(i)?, key) == Ordering::Equal {
                x.values[i] = value.to_vec();
                return x.write_to(sink, self.page_size);
            }
        }
        let mut i = last_le.map(|i| i + 1).unwrap_or(0);

        if x.is_leaf {
            x.keys.insert(i, key.to_vec());
            x.values.insert(i, value.to_vec());
            return x.write_to(sink, self.page_size);
        }

        let mut child = BTreeNode::read_from(sink, x.children[i], self.page_size)?;
        if child.space_on_disk() + child.additional_space_for(key, value) > self.eps {
            self.split_child(sink, x, i, &mut child)?;
            child.write_to(sink, self.page_size)?;
            if compare_bytes(key, x.key_at(i)?) == Ordering::Greater {
                i += 1;
            }
        }

        if i < x.key_count() && compare_bytes(x.key_at(i)?, key) == Ordering::Equal {
            x.values[i] = value.to_vec();
            return x.write_to(sink, self.page_size);
        }

        let mut next_child = BTreeNode::read_from(sink, x.children[i], self.page_size)?;
        self.insert_non_full(sink, &mut next_child, key, value)?;
        x.write_to(sink, self.page_size)
    }

    /// Splits `y`, the `i`-th child of `x`, in two at a size-balanced
    /// midpoint, lifting the separator key up into `x`. Writes the new
    /// right sibling; the caller is responsible for writing `x` and the
    /// now-truncated `y`.
    fn split_child(&self, sink: &mut dyn PageIo, x: &mut BTreeNode, i: usize, y: &mut BTreeNode) -> DbResult<()> {
        let new_page = sink.allocate_page_number()?;
        let mut z = if y.is_leaf { BTreeNode::new_leaf(new_page) } else { BTreeNode::new_internal(new_page) };

        let t = y.find_first_exceeding(self.eps / 2) + 1;

        z.keys = y.keys.split_off(t);
        z.values = y.values.split_off(t);
        if !y.is_leaf {
            z.children = y.children.split_off(t);
        }

        let median_key = y.keys[t - 1].clone();
        let median_value = y.values[t - 1].clone();

        x.keys.insert(i, median_key);
        x.values.insert(i, median_value);
        x.children[i] = z.page_number();
        x.children.insert(i, y.page_number());

        y.keys.pop();
        y.values.pop();

        z.write_to(sink, self.page_size)
    }

    /// Removes `key`. Returns whether it was present.
    pub fn delete(&self, sink: &mut dyn PageIo, root_page: u64, key: &[u8]) -> DbResult<bool> {
        if self.get(sink, root_page, key)?.is_none() {
            return Ok(false);
        }
        let mut root = BTreeNode::read_from(sink, root_page, self.page_size)?;
        self.remove_from_node(sink, &mut root, key)?;
        Ok(true)
    }

    fn remove_from_node(&self, sink: &mut dyn PageIo, x: &mut BTreeNode, key: &[u8]) -> DbResult<()> {
        let i = x.lower_bound(key);

        if x.is_leaf {
            // Case 1: delete directly from a leaf.
            if i < x.key_count() && compare_bytes(x.key_at(i)?, key) == Ordering::Equal {
                x.keys.remove(i);
                x.values.remove(i);
                x.write_to(sink, self.page_size)
            } else {
                Err(DbError::Invariant("no such key to remove".into()))
            }
        } else if i < x.key_count() && compare_bytes(x.key_at(i)?, key) == Ordering::Equal {
            self.remove_internal_key(sink, x, i, key)
        } else {
            self.remove_from_subtree(sink, x, i, key)
        }
    }

    /// Case 2: the key to delete lives in this internal node itself.
    /// Replaces it with its predecessor or successor (pulled from
    /// whichever child has room to lose a key), or merges the two
    /// children around it when neither does.
    fn remove_internal_key(&self, sink: &mut dyn PageIo, x: &mut BTreeNode, i: usize, key: &[u8]) -> DbResult<()> {
        let mut y = BTreeNode::read_from(sink, x.children[i], self.page_size)?;
        let mut z = BTreeNode::read_from(sink, x.children[i + 1], self.page_size)?;

        if y.space_on_disk() >= self.eps / 2 {
            let (rep_key, rep_value) = self.rightmost(sink, &y)?;
            self.remove_from_node(sink, &mut y, &rep_key)?;
            x.keys[i] = rep_key;
            x.values[i] = rep_value;
        } else if z.space_on_disk() >= self.eps / 2 {
            let (rep_key, rep_value) = self.leftmost(sink, &z)?;
            self.remove_from_node(sink, &mut z, &rep_key)?;
            x.keys[i] = rep_key;
            x.values[i] = rep_value;
        } else {
            // `key` is exactly the separator merge() pulls down into `y`,
            // so the merged node still needs it removed.
            self.merge(sink, &mut y, x, i, &mut z)?;
            self.remove_from_node(sink, &mut y, key)?;
        }

        x.write_to(sink, self.page_size)
    }

    /// Case 3: the key belongs in a child subtree. Ensures that child
    /// has enough slack to lose a key before descending, borrowing from
    /// a sibling or merging with one if it doesn't.
    fn remove_from_subtree(&self, sink: &mut dyn PageIo, x: &mut BTreeNode, i: usize, key: &[u8]) -> DbResult<()> {
        let mut y = BTreeNode::read_from(sink, x.children[i], self.page_size)?;
        if y.space_on_disk() >= self.eps / 2 {
            return self.remove_from_node(sink, &mut y, key);
        }

        let mut y_left =
            if i >= 1 { Some(BTreeNode::read_from(sink, x.children[i - 1], self.page_size)?) } else { None };
        let mut y_right = if i + 1 <= x.key_count() {
            Some(BTreeNode::read_from(sink, x.children[i + 1], self.page_size)?)
        } else {
            None
        };

        if y_left.as_ref().is_some_and(|l| l.space_on_disk() >= self.eps / 2) {
            let left = y_left.as_mut().unwrap();
            y.keys.insert(0, x.keys[i - 1].clone());
            y.values.insert(0, x.values[i - 1].clone());

            x.keys[i - 1] = left.keys.pop().unwrap();
            x.values[i - 1] = left.values.pop().unwrap();
            if !left.is_leaf {
                let moved = left.children.pop().unwrap();
                y.children.insert(0, moved);
            }

            self.remove_from_node(sink, &mut y, key)?;
            left.write_to(sink, self.page_size)?;
        } else if y_right.as_ref().is_some_and(|r| r.space_on_disk() >= self.eps / 2) {
            let right = y_right.as_mut().unwrap();
            y.keys.push(x.keys[i].clone());
            y.values.push(x.values[i].clone());

            x.keys[i] = right.keys.remove(0);
            x.values[i] = right.values.remove(0);
            if !right.is_leaf {
                let moved = right.children.remove(0);
                y.children.push(moved);
            }

            self.remove_from_node(sink, &mut y, key)?;
            right.write_to(sink, self.page_size)?;
        } else if let Some(mut left) = y_left {
            self.merge(sink, &mut left, x, i - 1, &mut y)?;
            self.remove_from_node(sink, &mut left, key)?;
        } else if let Some(mut right) = y_right {
            self.merge(sink, &mut y, x, i, &mut right)?;
            self.remove_from_node(sink, &mut y, key)?;
        } else {
            return Err(DbError::Invariant("underflowing node has no sibling to borrow from or merge with".into()));
        }

        x.write_to(sink, self.page_size)
    }

    fn rightmost(&self, sink: &mut dyn PageIo, node: &BTreeNode) -> DbResult<(Vec<u8>, Vec<u8>)> {
        if node.is_leaf {
            let last = node.key_count() - 1;
            Ok((node.keys[last].clone(), node.values[last].clone()))
        } else {
            let child_page = *node.children.last().ok_or_else(|| DbError::Invariant("internal node has no children".into()))?;
            let child = BTreeNode::read_from(sink, child_page, self.page_size)?;
            self.rightmost(sink, &child)
        }
    }

    fn leftmost(&self, sink: &mut dyn PageIo, node: &BTreeNode) -> DbResult<(Vec<u8>, Vec<u8>)> {
        if node.is_leaf {
            Ok((node.keys[0].clone(), node.values[0].clone()))
        } else {
            let child = BTreeNode::read_from(sink, node.children[0], self.page_size)?;
            self.leftmost(sink, &child)
        }
    }

    /// Folds `z`, the child at `i + 1` in `x`, into `y`, the child at
    /// `i`, pulling the separator key at `x.keys[i]` down between them.
    /// Frees `z`'s page. Leaves `x` and `y` for the caller to write.
    fn merge(&self, sink: &mut dyn PageIo, y: &mut BTreeNode, x: &mut BTreeNode, i: usize, z: &mut BTreeNode) -> DbResult<()> {
        y.keys.push(x.keys[i].clone());
        y.values.push(x.values[i].clone());
        x.keys.remove(i);
        x.values.remove(i);

        y.keys.extend(z.keys.drain(..));
        y.values.extend(z.values.drain(..));
        if !y.is_leaf {
            y.children.extend(z.children.drain(..));
        }

        x.children[i + 1] = y.page_number();
        x.children.remove(i);

        z.free_page(sink)
    }
}
