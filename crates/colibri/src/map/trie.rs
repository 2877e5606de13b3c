//! Trie Map Engine
//!
//! Crit-bit trees over the bit strings of keys. Branch nodes store the
//! coordinates of the first bit at which their two subtrees differ; leaves
//! store one entry. Lookups descend by testing the key's critical bit,
//! insertion splices a new branch at the depth of the first differing bit,
//! and deletion collapses the branch left behind.
//!
//! String keys compare codepoint by codepoint over an augmented 22-bit
//! value carrying a presence bit above the codepoint, so a proper prefix
//! sorts before its extensions. Integer keys compare on their two's
//! complement representation with the sign bit flipped, so ordered
//! iteration is numeric. Iteration is bidirectional and visits keys in
//! sorted order.
//!
//! [`Runtime::copy_trie_map`] freezes the tree in place and shares it;
//! writes then copy the path from the root down to the touched node.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::ErrorCode;
use crate::heap::cell::MapKeys;
use crate::heap::Cell;
use crate::map::hash::MapKey;
use crate::runtime::{Runtime, RuntimeInner};
use crate::word::custom::{CustomTrieKeys, KeyContext};
use crate::word::{Word, WordKind, WORD_NIL};

/// Presence bit above the 21 codepoint bits of an augmented string
/// position.
const PRESENT: u64 = 1 << 21;

/// Sign flip turning two's complement order into unsigned order.
const SIGN: u64 = 1 << 63;

impl RuntimeInner {
    pub(crate) fn trie_map_fields(
        &self,
        map: Word,
    ) -> Option<(MapKeys, Word, usize, Option<Arc<dyn CustomTrieKeys>>)> {
        let s = self.strip(map);
        match s.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::TrieMap {
                keys,
                root,
                size,
                custom,
            }) => Some((*keys, *root, *size, custom.clone())),
            _ => None,
        }
    }

    /// Augmented value of the string key position `index`: the codepoint
    /// with a presence bit, or 0 past the end.
    fn augmented(&self, key: Word, index: usize) -> u64 {
        match self.rope_at_impl(key, index) {
            Some(c) => PRESENT | c as u64,
            None => 0,
        }
    }

    /// Test the bit of `key` designated by `(index, mask)`.
    fn trie_bit_test(&self, map: Word, key: &MapKey, index: usize, mask: u64) -> bool {
        let custom = self
            .trie_map_fields(map)
            .and_then(|(_, _, _, custom)| custom);
        match key {
            MapKey::Int(k) => ((*k as u64) ^ SIGN) & mask != 0,
            MapKey::Str(k) => {
                if let Some(custom) = custom {
                    let ctx = KeyContext { inner: self };
                    return custom.bit_test(&ctx, *k, index, mask);
                }
                self.augmented(*k, index) & mask != 0
            }
        }
    }

    /// First difference between `key` and the key of `leaf`: the critical
    /// bit coordinates and the ordering of `key` at that bit.
    fn trie_key_diff(
        &self,
        map: Word,
        key: &MapKey,
        leaf_key: Word,
    ) -> Option<(usize, u64, Ordering)> {
        let custom = self
            .trie_map_fields(map)
            .and_then(|(_, _, _, custom)| custom);
        match key {
            MapKey::Int(k) => {
                let a = (*k as u64) ^ SIGN;
                let b = (self.int_word_value_impl(leaf_key).unwrap_or(0) as u64) ^ SIGN;
                let x = a ^ b;
                if x == 0 {
                    return None;
                }
                let mask = 1u64 << (63 - x.leading_zeros());
                let ord = if a & mask != 0 {
                    Ordering::Greater
                } else {
                    Ordering::Less
                };
                Some((0, mask, ord))
            }
            MapKey::Str(k) => {
                if let Some(custom) = custom {
                    let ctx = KeyContext { inner: self };
                    return custom.key_diff(&ctx, *k, leaf_key);
                }
                let la = self.rope_length_impl(*k);
                let lb = self.rope_length_impl(leaf_key);
                for index in 0..=la.max(lb) {
                    let a = self.augmented(*k, index);
                    let b = self.augmented(leaf_key, index);
                    let x = a ^ b;
                    if x != 0 {
                        let mask = 1u64 << (63 - x.leading_zeros());
                        let ord = if a & mask != 0 {
                            Ordering::Greater
                        } else {
                            Ordering::Less
                        };
                        return Some((index, mask, ord));
                    }
                    if index >= la && index >= lb {
                        break;
                    }
                }
                None
            }
        }
    }

    fn trie_node_fields(&self, node: Word) -> Option<(usize, u64, Word, Word, bool)> {
        match node.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::TrieNode {
                index,
                mask,
                left,
                right,
                mutable,
            }) => Some((*index, *mask, *left, *right, *mutable)),
            _ => None,
        }
    }

    pub(crate) fn trie_leaf_fields(&self, leaf: Word) -> Option<(Word, Word, bool)> {
        match leaf.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::TrieLeaf {
                key,
                value,
                mutable,
            }) => Some((*key, *value, *mutable)),
            _ => None,
        }
    }

    /// Descend to the leaf closest to `key`.
    fn trie_closest(&self, map: Word, root: Word, key: &MapKey) -> Word {
        let mut node = root;
        while let Some((index, mask, left, right, _)) = self.trie_node_fields(node) {
            node = if self.trie_bit_test(map, key, index, mask) {
                right
            } else {
                left
            };
        }
        node
    }

    /// Leaf holding `key`, if present.
    pub(crate) fn trie_map_find_leaf(&self, map: Word, key: &MapKey) -> Option<Word> {
        let (_, root, _, _) = self.trie_map_fields(map)?;
        if root.is_nil() {
            return None;
        }
        let leaf = self.trie_closest(map, root, key);
        let (leaf_key, _, _) = self.trie_leaf_fields(leaf)?;
        if self.trie_key_diff(map, key, leaf_key).is_none() {
            Some(leaf)
        } else {
            None
        }
    }

    pub(crate) fn trie_map_get_impl(&self, map: Word, key: &MapKey) -> Option<Word> {
        let leaf = self.trie_map_find_leaf(map, key)?;
        self.trie_leaf_fields(leaf).map(|(_, v, _)| v)
    }

    fn set_trie_root(&mut self, map: Word, root: Word) {
        let s = self.strip(map);
        if let Some(r) = s.cell_ref() {
            if let Cell::TrieMap { root: slot, .. } = self.heap.get_mut(r) {
                *slot = root;
            }
        }
        self.barrier(s, root);
    }

    fn bump_trie_size(&mut self, map: Word, delta: i64) {
        let s = self.strip(map);
        if let Some(r) = s.cell_ref() {
            if let Cell::TrieMap { size, .. } = self.heap.get_mut(r) {
                *size = (*size as i64 + delta) as usize;
            }
        }
    }

    fn make_key_word(&mut self, key: &MapKey) -> Word {
        match key {
            MapKey::Str(k) => *k,
            MapKey::Int(k) => self.make_int_word(*k),
        }
    }

    /// Replace the value of an existing key along a copy-on-write path.
    fn trie_update(&mut self, map: Word, node: Word, key: &MapKey, value: Word) -> Word {
        if let Some((leaf_key, _, mutable)) = self.trie_leaf_fields(node) {
            if mutable {
                if let Some(r) = node.cell_ref() {
                    if let Cell::TrieLeaf { value: slot, .. } = self.heap.get_mut(r) {
                        *slot = value;
                    }
                }
                self.barrier(node, value);
                return node;
            }
            return self.alloc(Cell::TrieLeaf {
                key: leaf_key,
                value,
                mutable: true,
            });
        }
        let Some((index, mask, left, right, mutable)) = self.trie_node_fields(node) else {
            return node;
        };
        let go_right = self.trie_bit_test(map, key, index, mask);
        let child = if go_right { right } else { left };
        let new_child = self.trie_update(map, child, key, value);
        if new_child == child {
            return node;
        }
        if mutable {
            if let Some(r) = node.cell_ref() {
                match self.heap.get_mut(r) {
                    Cell::TrieNode { left, right, .. } => {
                        if go_right {
                            *right = new_child;
                        } else {
                            *left = new_child;
                        }
                    }
                    _ => {}
                }
            }
            self.barrier(node, new_child);
            node
        } else {
            let (new_left, new_right) = if go_right {
                (left, new_child)
            } else {
                (new_child, right)
            };
            self.alloc(Cell::TrieNode {
                index,
                mask,
                left: new_left,
                right: new_right,
                mutable: true,
            })
        }
    }

    /// Splice a new leaf for `key` at the depth of the critical bit.
    fn trie_splice(
        &mut self,
        map: Word,
        node: Word,
        key: &MapKey,
        value: Word,
        crit: (usize, u64, Ordering),
    ) -> Word {
        let (crit_index, crit_mask, ord) = crit;
        let insert_here = match self.trie_node_fields(node) {
            None => true,
            Some((index, mask, _, _, _)) => {
                index > crit_index || (index == crit_index && mask < crit_mask)
            }
        };
        if insert_here {
            let key_word = self.make_key_word(key);
            let leaf = self.alloc(Cell::TrieLeaf {
                key: key_word,
                value,
                mutable: true,
            });
            let (left, right) = if ord == Ordering::Greater {
                (node, leaf)
            } else {
                (leaf, node)
            };
            return self.alloc(Cell::TrieNode {
                index: crit_index,
                mask: crit_mask,
                left,
                right,
                mutable: true,
            });
        }
        let (index, mask, left, right, mutable) = self.trie_node_fields(node).unwrap();
        let go_right = self.trie_bit_test(map, key, index, mask);
        let child = if go_right { right } else { left };
        let new_child = self.trie_splice(map, child, key, value, crit);
        if mutable {
            if let Some(r) = node.cell_ref() {
                if let Cell::TrieNode { left, right, .. } = self.heap.get_mut(r) {
                    if go_right {
                        *right = new_child;
                    } else {
                        *left = new_child;
                    }
                }
            }
            self.barrier(node, new_child);
            node
        } else {
            let (new_left, new_right) = if go_right {
                (left, new_child)
            } else {
                (new_child, right)
            };
            self.alloc(Cell::TrieNode {
                index,
                mask,
                left: new_left,
                right: new_right,
                mutable: true,
            })
        }
    }

    /// Map `key` to `value`. Returns `true` when an entry was created.
    pub(crate) fn trie_map_set_impl(&mut self, map: Word, key: &MapKey, value: Word) -> bool {
        let Some((_, root, _, _)) = self.trie_map_fields(map) else {
            return false;
        };
        if root.is_nil() {
            let key_word = self.make_key_word(key);
            let leaf = self.alloc(Cell::TrieLeaf {
                key: key_word,
                value,
                mutable: true,
            });
            self.set_trie_root(map, leaf);
            self.bump_trie_size(map, 1);
            return true;
        }
        let closest = self.trie_closest(map, root, key);
        let Some((leaf_key, _, _)) = self.trie_leaf_fields(closest) else {
            return false;
        };
        match self.trie_key_diff(map, key, leaf_key) {
            None => {
                let new_root = self.trie_update(map, root, key, value);
                if new_root != root {
                    self.set_trie_root(map, new_root);
                }
                false
            }
            Some(crit) => {
                let new_root = self.trie_splice(map, root, key, value, crit);
                if new_root != root {
                    self.set_trie_root(map, new_root);
                }
                self.bump_trie_size(map, 1);
                true
            }
        }
    }

    /// Remove `key`, collapsing the branch left behind. Returns the new
    /// subtree (`None` when the key is absent).
    fn trie_erase(&mut self, map: Word, node: Word, key: &MapKey) -> Option<Word> {
        if let Some((leaf_key, _, _)) = self.trie_leaf_fields(node) {
            return match self.trie_key_diff(map, key, leaf_key) {
                None => Some(WORD_NIL),
                Some(_) => None,
            };
        }
        let (index, mask, left, right, mutable) = self.trie_node_fields(node)?;
        let go_right = self.trie_bit_test(map, key, index, mask);
        let child = if go_right { right } else { left };
        let other = if go_right { left } else { right };
        let replacement = self.trie_erase(map, child, key)?;
        if replacement.is_nil() {
            return Some(other);
        }
        if mutable {
            if let Some(r) = node.cell_ref() {
                if let Cell::TrieNode { left, right, .. } = self.heap.get_mut(r) {
                    if go_right {
                        *right = replacement;
                    } else {
                        *left = replacement;
                    }
                }
            }
            self.barrier(node, replacement);
            Some(node)
        } else {
            let (new_left, new_right) = if go_right {
                (left, replacement)
            } else {
                (replacement, right)
            };
            Some(self.alloc(Cell::TrieNode {
                index,
                mask,
                left: new_left,
                right: new_right,
                mutable: true,
            }))
        }
    }

    pub(crate) fn trie_map_unset_impl(&mut self, map: Word, key: &MapKey) -> bool {
        let Some((_, root, _, _)) = self.trie_map_fields(map) else {
            return false;
        };
        if root.is_nil() {
            return false;
        }
        match self.trie_erase(map, root, key) {
            Some(new_root) => {
                if new_root != root {
                    self.set_trie_root(map, new_root);
                }
                self.bump_trie_size(map, -1);
                true
            }
            None => false,
        }
    }

    /// Freeze a trie subtree in place.
    fn freeze_trie(&mut self, node: Word) {
        let Some(r) = node.cell_ref() else { return };
        match self.heap.get_mut(r) {
            Cell::TrieLeaf { mutable, .. } => *mutable = false,
            Cell::TrieNode {
                left,
                right,
                mutable,
                ..
            } => {
                *mutable = false;
                let (left, right) = (*left, *right);
                self.freeze_trie(left);
                self.freeze_trie(right);
            }
            _ => {}
        }
    }

    pub(crate) fn copy_trie_map_impl(&mut self, map: Word) -> Word {
        let Some((keys, root, size, custom)) = self.trie_map_fields(map) else {
            return WORD_NIL;
        };
        self.freeze_trie(root);
        self.alloc(Cell::TrieMap {
            keys,
            root,
            size,
            custom,
        })
    }

    /// Leftmost (`false`) or rightmost (`true`) leaf of a subtree.
    pub(crate) fn trie_extreme(&self, node: Word, rightmost: bool) -> Word {
        let mut node = node;
        while let Some((_, _, left, right, _)) = self.trie_node_fields(node) {
            node = if rightmost { right } else { left };
        }
        node
    }

    /// Leaf following (or preceding) the leaf holding `key`, in sorted
    /// order.
    pub(crate) fn trie_neighbor(&self, map: Word, key: &MapKey, forward: bool) -> Option<Word> {
        let (_, root, _, _) = self.trie_map_fields(map)?;
        if root.is_nil() {
            return None;
        }
        let mut node = root;
        let mut anchor = WORD_NIL;
        while let Some((index, mask, left, right, _)) = self.trie_node_fields(node) {
            if self.trie_bit_test(map, key, index, mask) {
                if !forward {
                    anchor = left;
                }
                node = right;
            } else {
                if forward {
                    anchor = right;
                }
                node = left;
            }
        }
        if anchor.is_nil() {
            None
        } else {
            Some(self.trie_extreme(anchor, !forward))
        }
    }
}

impl Runtime {
    /// Create a string-keyed trie map.
    pub fn new_string_trie_map(&self) -> Word {
        self.shared.inner.lock().alloc(Cell::TrieMap {
            keys: MapKeys::String,
            root: WORD_NIL,
            size: 0,
            custom: None,
        })
    }

    /// Create an integer-keyed trie map.
    pub fn new_int_trie_map(&self) -> Word {
        self.shared.inner.lock().alloc(Cell::TrieMap {
            keys: MapKeys::Int,
            root: WORD_NIL,
            size: 0,
            custom: None,
        })
    }

    /// Create a word-keyed trie map with custom bit access and key
    /// comparison.
    pub fn new_custom_trie_map(&self, keys: Arc<dyn CustomTrieKeys>) -> Word {
        self.shared.inner.lock().alloc(Cell::TrieMap {
            keys: MapKeys::String,
            root: WORD_NIL,
            size: 0,
            custom: Some(keys),
        })
    }

    /// Share a trie map's structure with a new word; both maps diverge
    /// copy-on-write from here on.
    pub fn copy_trie_map(&self, map: Word) -> Word {
        let mut inner = self.shared.inner.lock();
        if !inner.word_kind_impl(map).contains(WordKind::TRIEMAP) {
            inner.type_error(ErrorCode::TrieMap, map);
            return WORD_NIL;
        }
        inner.copy_trie_map_impl(map)
    }

    /// Value for a string key, if present.
    pub fn trie_map_get(&self, map: Word, key: Word) -> Option<Word> {
        let inner = self.shared.inner.lock();
        if !inner.check_trie_map(map, MapKeys::String) {
            return None;
        }
        inner.trie_map_get_impl(map, &MapKey::Str(key))
    }

    /// Value for an integer key, if present.
    pub fn int_trie_map_get(&self, map: Word, key: i64) -> Option<Word> {
        let inner = self.shared.inner.lock();
        if !inner.check_trie_map(map, MapKeys::Int) {
            return None;
        }
        inner.trie_map_get_impl(map, &MapKey::Int(key))
    }

    /// Map a string key to `value`; returns whether an entry was created.
    pub fn trie_map_set(&self, map: Word, key: Word, value: Word) -> bool {
        let mut inner = self.shared.inner.lock();
        if !inner.check_trie_map(map, MapKeys::String) {
            return false;
        }
        inner.trie_map_set_impl(map, &MapKey::Str(key), value)
    }

    /// Map an integer key to `value`; returns whether an entry was
    /// created.
    pub fn int_trie_map_set(&self, map: Word, key: i64, value: Word) -> bool {
        let mut inner = self.shared.inner.lock();
        if !inner.check_trie_map(map, MapKeys::Int) {
            return false;
        }
        inner.trie_map_set_impl(map, &MapKey::Int(key), value)
    }

    /// Remove a string key; returns whether an entry was removed.
    pub fn trie_map_unset(&self, map: Word, key: Word) -> bool {
        let mut inner = self.shared.inner.lock();
        if !inner.check_trie_map(map, MapKeys::String) {
            return false;
        }
        inner.trie_map_unset_impl(map, &MapKey::Str(key))
    }

    /// Remove an integer key; returns whether an entry was removed.
    pub fn int_trie_map_unset(&self, map: Word, key: i64) -> bool {
        let mut inner = self.shared.inner.lock();
        if !inner.check_trie_map(map, MapKeys::Int) {
            return false;
        }
        inner.trie_map_unset_impl(map, &MapKey::Int(key))
    }
}

impl RuntimeInner {
    pub(crate) fn check_trie_map(&self, map: Word, keys: MapKeys) -> bool {
        match self.trie_map_fields(map) {
            Some((k, _, _, _)) if k == keys => true,
            Some(_) => self.type_error(
                match keys {
                    MapKeys::String => ErrorCode::WordTrieMap,
                    MapKeys::Int => ErrorCode::IntTrieMap,
                },
                map,
            ),
            None => self.type_error(ErrorCode::TrieMap, map),
        }
    }
}
