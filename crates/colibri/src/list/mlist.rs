//! Mutable Lists
//!
//! A mutable list is a root word whose subtree is replaced in place by
//! write operations. Internal nodes are either *mutable* (exclusively owned
//! by this list, safe to modify in place) or shared with immutable lists.
//! Element writes descend the tree, modifying mutable nodes and mutable
//! vector leaves directly, and copying shared nodes down to the mutation
//! point; structural edits (insert, remove, resize) reuse the immutable
//! list algebra and let later writes re-own the touched path lazily.
//!
//! [`Runtime::copy_mlist`] produces an immutable snapshot by freezing the
//! current subtree in place: mutable vectors become vectors (same cell),
//! mutable concat nodes become ordinary ones. The mutable list stays
//! usable; its next write copies instead of mutating.

use crate::error::ErrorCode;
use crate::heap::{max_vector_length, Cell};
use crate::runtime::{Runtime, RuntimeInner};
use crate::word::{Word, WordKind, WORD_EMPTY_LIST};

impl RuntimeInner {
    fn is_mlist_impl(&self, w: Word) -> bool {
        self.word_kind_impl(w).contains(WordKind::MLIST)
    }

    fn mlist_root(&self, w: Word) -> Option<Word> {
        let s = self.strip(w);
        match s.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::MList { root }) => Some(*root),
            _ => None,
        }
    }

    fn mlist_set_root(&mut self, w: Word, root: Word) {
        let s = self.strip(w);
        let Some(r) = s.cell_ref() else { return };
        if let Cell::MList { root: slot } = self.heap.get_mut(r) {
            *slot = root;
        }
        self.barrier(s, root);
    }

    /// Freeze a list subtree in place, turning every mutable node into its
    /// immutable counterpart.
    pub(crate) fn freeze_list_tree(&mut self, w: Word) {
        let w = self.strip(w);
        let Some(r) = w.cell_ref() else { return };
        match self.heap.get(r) {
            Cell::MVector { .. } => {
                let cell = self.heap.replace(r, Cell::Vector(Box::new([])));
                if let Cell::MVector { length, elems } = cell {
                    let mut v = elems.into_vec();
                    v.truncate(length);
                    self.heap.replace(r, Cell::Vector(v.into_boxed_slice()));
                }
            }
            Cell::ConcatList {
                left,
                right,
                mutable,
                ..
            } => {
                let (left, right, mutable) = (*left, *right, *mutable);
                if mutable {
                    if let Cell::ConcatList { mutable, .. } = self.heap.get_mut(r) {
                        *mutable = false;
                    }
                }
                self.freeze_list_tree(left);
                self.freeze_list_tree(right);
            }
            Cell::CircularList { core } => {
                let core = *core;
                self.freeze_list_tree(core);
            }
            _ => {}
        }
    }

    /// Store `value` at `index` of a subtree, returning the resulting
    /// subtree word (the same word when the write happened in place).
    fn mlist_store(&mut self, node: Word, index: usize, value: Word) -> Word {
        let node = self.strip(node);
        if node.is_void_list() {
            // Split the void run around a one-element mutable leaf.
            let len = node.void_list_len();
            let mid = self.alloc(Cell::MVector {
                length: 1,
                elems: vec![value].into_boxed_slice(),
            });
            let mut result = mid;
            if index + 1 < len {
                let right = Word::void_list(len - index - 1);
                result = self.make_concat_list_node(result, right, true);
            }
            if index > 0 {
                let left = Word::void_list(index);
                result = self.make_concat_list_node(left, result, true);
            }
            return result;
        }
        let Some(r) = node.cell_ref() else {
            return node;
        };
        match self.heap.get(r) {
            Cell::MVector { .. } => {
                if let Cell::MVector { elems, .. } = self.heap.get_mut(r) {
                    elems[index] = value;
                }
                self.barrier(node, value);
                node
            }
            Cell::Vector(elems) => {
                // Shared leaf: re-own as a mutable vector.
                let mut v = elems.to_vec();
                v[index] = value;
                let length = v.len();
                self.alloc(Cell::MVector {
                    length,
                    elems: v.into_boxed_slice(),
                })
            }
            Cell::Sublist {
                source,
                first,
                last,
                ..
            } => {
                let (source, first, last) = (*source, *first, *last);
                let count = last - first + 1;
                if count <= max_vector_length() {
                    let mut elems = Vec::with_capacity(count);
                    self.push_list_elems(node, 0, count, &mut elems);
                    elems[index] = value;
                    let length = elems.len();
                    self.alloc(Cell::MVector {
                        length,
                        elems: elems.into_boxed_slice(),
                    })
                } else {
                    let mid = first + count / 2;
                    let left = self.sublist_impl(source, first, mid - 1);
                    let right = self.sublist_impl(source, mid, last);
                    let split = self.make_concat_list_node(left, right, true);
                    self.mlist_store(split, index, value)
                }
            }
            Cell::ConcatList {
                left_len,
                left,
                right,
                mutable,
                ..
            } => {
                let (left_len, left, right, mutable) = (*left_len, *left, *right, *mutable);
                if !mutable {
                    // Copy the node, then descend into the copy.
                    let copy = self.make_concat_list_node(left, right, true);
                    return self.mlist_store(copy, index, value);
                }
                if index < left_len {
                    let new_left = self.mlist_store(left, index, value);
                    if new_left != left {
                        if let Cell::ConcatList { left: slot, .. } = self.heap.get_mut(r) {
                            *slot = new_left;
                        }
                        self.barrier(node, new_left);
                    }
                } else {
                    let new_right = self.mlist_store(right, index - left_len, value);
                    if new_right != right {
                        if let Cell::ConcatList { right: slot, .. } = self.heap.get_mut(r) {
                            *slot = new_right;
                        }
                        self.barrier(node, new_right);
                    }
                }
                node
            }
            Cell::CircularList { core } => {
                // Circular nodes may be shared with snapshots: rebuild.
                let core = *core;
                let core_len = self.list_length_impl(core);
                let new_core = self.mlist_store(core, index % core_len, value);
                self.circular_list_impl(new_core)
            }
            _ => node,
        }
    }
}

impl Runtime {
    /// Create an empty mutable list.
    pub fn new_mlist(&self) -> Word {
        self.shared.inner.lock().alloc(Cell::MList {
            root: WORD_EMPTY_LIST,
        })
    }

    /// Snapshot a mutable list as an immutable list.
    ///
    /// The current subtree is frozen in place; the mutable list remains
    /// valid and its future writes copy on demand, leaving the snapshot
    /// untouched.
    pub fn copy_mlist(&self, mlist: Word) -> Word {
        let mut inner = self.shared.inner.lock();
        let Some(root) = inner.mlist_root(mlist) else {
            inner.type_error(ErrorCode::MList, mlist);
            return WORD_EMPTY_LIST;
        };
        inner.freeze_list_tree(root);
        root
    }

    /// Resize a mutable list. Extension appends a void run; truncation
    /// drops the tail. Cyclic lists are unrolled to the requested length.
    pub fn mlist_set_length(&self, mlist: Word, length: usize) {
        let mut inner = self.shared.inner.lock();
        let Some(root) = inner.mlist_root(mlist) else {
            inner.type_error(ErrorCode::MList, mlist);
            return;
        };
        if length == 0 {
            inner.mlist_set_root(mlist, WORD_EMPTY_LIST);
            return;
        }
        let loop_len = inner.list_loop_length_impl(root);
        let new_root = if loop_len != 0 {
            let total = inner.list_length_impl(root);
            let head_len = total - loop_len;
            match inner.decompose_cyclic(root) {
                Some((head, core)) => inner.cyclic_range(head, core, head_len, 0, length),
                None => root,
            }
        } else {
            let current = inner.list_length_impl(root);
            if length < current {
                inner.sublist_impl(root, 0, length - 1)
            } else if length > current {
                let pad = Word::void_list(length - current);
                inner.concat_lists_impl(root, pad)
            } else {
                root
            }
        };
        inner.mlist_set_root(mlist, new_root);
    }

    /// Make the tail of a mutable list circular. Idempotent on already
    /// cyclic lists.
    pub fn mlist_loop(&self, mlist: Word) {
        let mut inner = self.shared.inner.lock();
        let Some(root) = inner.mlist_root(mlist) else {
            inner.type_error(ErrorCode::MList, mlist);
            return;
        };
        let looped = inner.circular_list_impl(root);
        inner.mlist_set_root(mlist, looped);
    }

    /// Set the element at `index`. Out-of-range indices on proper lists
    /// raise a `ListIndex` value error; indices into a circular tail are
    /// normalized.
    pub fn mlist_set_at(&self, mlist: Word, index: usize, value: Word) {
        let mut inner = self.shared.inner.lock();
        let Some(root) = inner.mlist_root(mlist) else {
            inner.type_error(ErrorCode::MList, mlist);
            return;
        };
        let length = inner.list_length_impl(root);
        let loop_len = inner.list_loop_length_impl(root);
        if index >= length && loop_len == 0 {
            inner.value_error(
                ErrorCode::ListIndex,
                &format!("index {index} beyond list length {length}"),
            );
            return;
        }
        let index = inner.normalize_index(root, index);
        let new_root = inner.mlist_store(root, index, value);
        inner.mlist_set_root(mlist, new_root);
    }

    /// Insert the elements of `list` at `index`.
    pub fn mlist_insert(&self, mlist: Word, index: usize, list: Word) {
        let mut inner = self.shared.inner.lock();
        let Some(root) = inner.mlist_root(mlist) else {
            inner.type_error(ErrorCode::MList, mlist);
            return;
        };
        if !inner.is_list_impl(list) {
            inner.type_error(ErrorCode::List, list);
            return;
        }
        // A mutable source is snapshot first.
        let list = if inner.is_mlist_impl(list) {
            match inner.mlist_root(list) {
                Some(src_root) => {
                    inner.freeze_list_tree(src_root);
                    src_root
                }
                None => list,
            }
        } else {
            list
        };
        let new_root = inner.list_insert_impl(root, index, list);
        inner.mlist_set_root(mlist, new_root);
    }

    /// Remove the range `[first, last]`.
    pub fn mlist_remove(&self, mlist: Word, first: usize, last: usize) {
        let mut inner = self.shared.inner.lock();
        let Some(root) = inner.mlist_root(mlist) else {
            inner.type_error(ErrorCode::MList, mlist);
            return;
        };
        let new_root = inner.list_remove_impl(root, first, last);
        inner.mlist_set_root(mlist, new_root);
    }

    /// Replace the range `[first, last]` with the elements of `with`.
    pub fn mlist_replace(&self, mlist: Word, first: usize, last: usize, with: Word) {
        self.mlist_remove(mlist, first, last);
        self.mlist_insert(mlist, first, with);
    }
}
