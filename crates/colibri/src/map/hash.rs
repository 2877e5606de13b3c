//! Hash Map Engine
//!
//! Hash maps use a power-of-two bucket array of entry chains. The bucket
//! array is a vector word: mutable while exclusively owned, frozen in place
//! by [`Runtime::copy_hash_map`] so that both the original and the copy
//! treat the shared structure as read-only. Entries carry the same
//! mutable/immutable state; a write into a shared chain rebuilds that chain
//! with fresh mutable entries, leaving the snapshot untouched.
//!
//! String keys hash by a rolling multiply over their codepoints with the
//! cached value stored per entry; integer keys mix by a multiplicative
//! constant. Once the entry count exceeds the bucket count the array grows
//! fourfold and every chain is relinked.

use std::sync::Arc;

use crate::error::ErrorCode;
use crate::heap::cell::MapKeys;
use crate::heap::{max_vector_length, Cell};
use crate::runtime::{Runtime, RuntimeInner};
use crate::word::custom::{CustomHashKeys, KeyContext};
use crate::word::{Word, WordKind, WORD_NIL};

/// Initial bucket count.
const MIN_BUCKETS: usize = 16;

/// Bucket growth factor on rehash.
const GROW_FACTOR: usize = 4;

/// Integer key mixing constant.
const INT_MIX: u64 = 1610612741;

/// A hash or trie key, before boxing into an entry.
#[derive(Clone, Copy)]
pub(crate) enum MapKey {
    Str(Word),
    Int(i64),
}

impl RuntimeInner {
    pub(crate) fn hash_map_fields(
        &self,
        map: Word,
    ) -> Option<(MapKeys, Word, usize, Option<Arc<dyn CustomHashKeys>>)> {
        let s = self.strip(map);
        match s.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::HashMap {
                keys,
                buckets,
                size,
                custom,
            }) => Some((*keys, *buckets, *size, custom.clone())),
            _ => None,
        }
    }

    /// Hash of a key in the context of `map`.
    pub(crate) fn hash_key(&self, map: Word, key: &MapKey) -> u64 {
        let custom = self
            .hash_map_fields(map)
            .and_then(|(_, _, _, custom)| custom);
        match key {
            MapKey::Int(k) => (*k as u64).wrapping_mul(INT_MIX),
            MapKey::Str(k) => {
                if let Some(custom) = custom {
                    let ctx = KeyContext { inner: self };
                    return custom.hash(&ctx, *k);
                }
                let len = self.rope_length_impl(*k);
                let mut chars = Vec::with_capacity(len);
                self.push_rope_chars(*k, 0, len, &mut chars);
                chars
                    .iter()
                    .fold(0u64, |h, &c| h.wrapping_mul(9).wrapping_add(c as u64))
            }
        }
    }

    /// Whether `key` equals the key stored in an entry.
    fn hash_keys_equal(&self, map: Word, key: &MapKey, hash: u64, entry: Word) -> bool {
        let Some(r) = entry.cell_ref() else {
            return false;
        };
        let Cell::HashEntry {
            key: ekey,
            hash: ehash,
            ..
        } = self.heap.get(r)
        else {
            return false;
        };
        match key {
            MapKey::Int(k) => self.int_word_value_impl(*ekey) == Some(*k),
            MapKey::Str(k) => {
                if *ehash != hash {
                    return false;
                }
                let custom = self
                    .hash_map_fields(map)
                    .and_then(|(_, _, _, custom)| custom);
                if let Some(custom) = custom {
                    let ctx = KeyContext { inner: self };
                    custom.equal(&ctx, *k, *ekey)
                } else {
                    self.compare_ropes_impl(*k, *ekey, 0, usize::MAX).0 == std::cmp::Ordering::Equal
                }
            }
        }
    }

    fn entry_fields(&self, entry: Word) -> Option<(Word, Word, Word, u64, bool)> {
        match entry.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::HashEntry {
                key,
                value,
                next,
                hash,
                mutable,
            }) => Some((*key, *value, *next, *hash, *mutable)),
            _ => None,
        }
    }

    /// Locate the entry for `key`: `(bucket index, entry word or nil)`.
    pub(crate) fn hash_map_find(&self, map: Word, key: &MapKey) -> Option<(usize, Word)> {
        let (_, buckets, _, _) = self.hash_map_fields(map)?;
        let n = self.vector_length_impl(buckets)?;
        let hash = self.hash_key(map, key);
        let idx = (hash as usize) & (n - 1);
        let mut entry = self.vector_at_impl(buckets, idx).unwrap_or(WORD_NIL);
        while !entry.is_nil() {
            if self.hash_keys_equal(map, key, hash, entry) {
                return Some((idx, entry));
            }
            entry = self.entry_fields(entry).map_or(WORD_NIL, |(_, _, n, _, _)| n);
        }
        Some((idx, WORD_NIL))
    }

    pub(crate) fn hash_map_get_impl(&self, map: Word, key: &MapKey) -> Option<Word> {
        let (_, entry) = self.hash_map_find(map, key)?;
        if entry.is_nil() {
            None
        } else {
            self.entry_fields(entry).map(|(_, v, _, _, _)| v)
        }
    }

    /// Make the bucket array of `map` writable, cloning it when frozen.
    fn hash_map_own_buckets(&mut self, map: Word) -> Word {
        let s = self.strip(map);
        let Some((_, buckets, _, _)) = self.hash_map_fields(map) else {
            return WORD_NIL;
        };
        let frozen = matches!(
            buckets.cell_ref().map(|r| self.heap.get(r)),
            Some(Cell::Vector(_))
        );
        if !frozen {
            return buckets;
        }
        let elems = self.vector_elements_impl(buckets).unwrap_or_default();
        let length = elems.len();
        let owned = self.alloc(Cell::MVector {
            length,
            elems: elems.into_boxed_slice(),
        });
        if let Some(r) = s.cell_ref() {
            if let Cell::HashMap { buckets: slot, .. } = self.heap.get_mut(r) {
                *slot = owned;
            }
        }
        self.barrier(s, owned);
        owned
    }

    fn set_bucket(&mut self, buckets: Word, idx: usize, head: Word) {
        if let Some(r) = buckets.cell_ref() {
            if let Cell::MVector { elems, .. } = self.heap.get_mut(r) {
                elems[idx] = head;
            }
        }
        self.barrier(buckets, head);
    }

    /// Rebuild a chain with fresh mutable entries, preserving order.
    fn rebuild_chain(&mut self, buckets: Word, idx: usize) {
        let mut entries = Vec::new();
        let mut entry = self.vector_at_impl(buckets, idx).unwrap_or(WORD_NIL);
        while let Some((key, value, next, hash, _)) = self.entry_fields(entry) {
            entries.push((key, value, hash));
            entry = next;
        }
        let mut head = WORD_NIL;
        for &(key, value, hash) in entries.iter().rev() {
            head = self.alloc(Cell::HashEntry {
                key,
                value,
                next: head,
                hash,
                mutable: true,
            });
        }
        self.set_bucket(buckets, idx, head);
    }

    /// Map `key` to `value`. Returns `true` when an entry was created.
    pub(crate) fn hash_map_set_impl(&mut self, map: Word, key: &MapKey, value: Word) -> bool {
        let s = self.strip(map);
        let buckets = self.hash_map_own_buckets(map);
        let n = self.vector_length_impl(buckets).unwrap_or(0);
        if n == 0 {
            return false;
        }
        let hash = self.hash_key(map, key);
        let idx = (hash as usize) & (n - 1);

        // Overwrite an existing entry, re-owning its chain when shared.
        let mut entry = self.vector_at_impl(buckets, idx).unwrap_or(WORD_NIL);
        while !entry.is_nil() {
            if self.hash_keys_equal(map, key, hash, entry) {
                let (_, _, _, _, mutable) = self.entry_fields(entry).unwrap();
                if !mutable {
                    self.rebuild_chain(buckets, idx);
                    return self.hash_map_set_impl(map, key, value);
                }
                if let Some(r) = entry.cell_ref() {
                    if let Cell::HashEntry { value: slot, .. } = self.heap.get_mut(r) {
                        *slot = value;
                    }
                }
                self.barrier(entry, value);
                return false;
            }
            entry = self.entry_fields(entry).map_or(WORD_NIL, |(_, _, n, _, _)| n);
        }

        // Insert at the chain head.
        let key_word = match key {
            MapKey::Str(k) => *k,
            MapKey::Int(k) => self.make_int_word(*k),
        };
        let head = self.vector_at_impl(buckets, idx).unwrap_or(WORD_NIL);
        let new_entry = self.alloc(Cell::HashEntry {
            key: key_word,
            value,
            next: head,
            hash,
            mutable: true,
        });
        self.set_bucket(buckets, idx, new_entry);
        let size = {
            let Some(r) = s.cell_ref() else { return true };
            match self.heap.get_mut(r) {
                Cell::HashMap { size, .. } => {
                    *size += 1;
                    *size
                }
                _ => return true,
            }
        };
        if size > n && n < max_vector_length() / GROW_FACTOR {
            self.hash_map_rehash(s, n * GROW_FACTOR);
        }
        true
    }

    pub(crate) fn make_int_word(&mut self, value: i64) -> Word {
        match Word::small_int(value) {
            Some(w) => w,
            None => self.alloc(Cell::Int(value)),
        }
    }

    /// Grow the bucket array and relink every entry.
    fn hash_map_rehash(&mut self, map: Word, new_n: usize) {
        let Some((_, buckets, _, _)) = self.hash_map_fields(map) else {
            return;
        };
        let old_n = self.vector_length_impl(buckets).unwrap_or(0);
        // Gather all entries; shared ones are re-created mutable.
        let mut all = Vec::new();
        for idx in 0..old_n {
            let mut entry = self.vector_at_impl(buckets, idx).unwrap_or(WORD_NIL);
            while let Some((key, value, next, hash, _)) = self.entry_fields(entry) {
                all.push((key, value, hash));
                entry = next;
            }
        }
        let new_buckets = self.alloc(Cell::MVector {
            length: new_n,
            elems: vec![WORD_NIL; new_n].into_boxed_slice(),
        });
        for &(key, value, hash) in all.iter().rev() {
            let idx = (hash as usize) & (new_n - 1);
            let head = self.vector_at_impl(new_buckets, idx).unwrap_or(WORD_NIL);
            let entry = self.alloc(Cell::HashEntry {
                key,
                value,
                next: head,
                hash,
                mutable: true,
            });
            self.set_bucket(new_buckets, idx, entry);
        }
        if let Some(r) = map.cell_ref() {
            if let Cell::HashMap { buckets: slot, .. } = self.heap.get_mut(r) {
                *slot = new_buckets;
            }
        }
        self.barrier(map, new_buckets);
        log::trace!("hash map rehashed to {new_n} buckets");
    }

    /// Remove the entry for `key`. Returns whether one was removed.
    pub(crate) fn hash_map_unset_impl(&mut self, map: Word, key: &MapKey) -> bool {
        let s = self.strip(map);
        let buckets = self.hash_map_own_buckets(map);
        let n = self.vector_length_impl(buckets).unwrap_or(0);
        if n == 0 {
            return false;
        }
        let hash = self.hash_key(map, key);
        let idx = (hash as usize) & (n - 1);
        // Locate, re-owning the chain first if any link is shared.
        let mut entry = self.vector_at_impl(buckets, idx).unwrap_or(WORD_NIL);
        let mut shared = false;
        let mut found = false;
        while let Some((_, _, next, _, mutable)) = self.entry_fields(entry) {
            shared |= !mutable;
            if self.hash_keys_equal(map, key, hash, entry) {
                found = true;
                break;
            }
            entry = next;
        }
        if !found {
            return false;
        }
        if shared {
            self.rebuild_chain(buckets, idx);
        }
        // Unlink in place.
        let mut prev = WORD_NIL;
        let mut entry = self.vector_at_impl(buckets, idx).unwrap_or(WORD_NIL);
        while let Some((_, _, next, _, _)) = self.entry_fields(entry) {
            if self.hash_keys_equal(map, key, hash, entry) {
                if prev.is_nil() {
                    self.set_bucket(buckets, idx, next);
                } else if let Some(r) = prev.cell_ref() {
                    if let Cell::HashEntry { next: slot, .. } = self.heap.get_mut(r) {
                        *slot = next;
                    }
                    self.barrier(prev, next);
                }
                if let Some(r) = s.cell_ref() {
                    if let Cell::HashMap { size, .. } = self.heap.get_mut(r) {
                        *size -= 1;
                    }
                }
                return true;
            }
            prev = entry;
            entry = next;
        }
        false
    }

    /// Freeze the bucket array and every entry, then share the structure
    /// with a new map word.
    pub(crate) fn copy_hash_map_impl(&mut self, map: Word) -> Word {
        let s = self.strip(map);
        let Some((keys, buckets, size, custom)) = self.hash_map_fields(s) else {
            return WORD_NIL;
        };
        // Freeze the bucket array in place.
        if let Some(r) = buckets.cell_ref() {
            if matches!(self.heap.get(r), Cell::MVector { .. }) {
                let cell = self.heap.replace(r, Cell::Vector(Box::new([])));
                if let Cell::MVector { length, elems } = cell {
                    let mut v = elems.into_vec();
                    v.truncate(length);
                    self.heap.replace(r, Cell::Vector(v.into_boxed_slice()));
                }
            }
        }
        // Freeze the chains.
        let n = self.vector_length_impl(buckets).unwrap_or(0);
        for idx in 0..n {
            let mut entry = self.vector_at_impl(buckets, idx).unwrap_or(WORD_NIL);
            while let Some(r) = entry.cell_ref() {
                let next = match self.heap.get_mut(r) {
                    Cell::HashEntry { next, mutable, .. } => {
                        *mutable = false;
                        *next
                    }
                    _ => WORD_NIL,
                };
                entry = next;
            }
        }
        self.alloc(Cell::HashMap {
            keys,
            buckets,
            size,
            custom,
        })
    }

    /// First entry of the map in bucket order: `(bucket, entry)`.
    pub(crate) fn hash_map_first(&self, map: Word, from_bucket: usize) -> Option<(usize, Word)> {
        let (_, buckets, _, _) = self.hash_map_fields(map)?;
        let n = self.vector_length_impl(buckets)?;
        for idx in from_bucket..n {
            let head = self.vector_at_impl(buckets, idx).unwrap_or(WORD_NIL);
            if !head.is_nil() {
                return Some((idx, head));
            }
        }
        None
    }

    /// Entry following `entry` within its chain, else the head of the next
    /// non-empty bucket.
    pub(crate) fn hash_map_next(
        &self,
        map: Word,
        bucket: usize,
        entry: Word,
    ) -> Option<(usize, Word)> {
        if let Some((_, _, next, _, _)) = self.entry_fields(entry) {
            if !next.is_nil() {
                return Some((bucket, next));
            }
        }
        self.hash_map_first(map, bucket + 1)
    }

    fn new_hash_map_cell(
        &mut self,
        keys: MapKeys,
        capacity: usize,
        custom: Option<Arc<dyn CustomHashKeys>>,
    ) -> Word {
        let n = capacity
            .max(MIN_BUCKETS)
            .next_power_of_two()
            .min(max_vector_length().next_power_of_two() / 2);
        let buckets = self.alloc(Cell::MVector {
            length: n,
            elems: vec![WORD_NIL; n].into_boxed_slice(),
        });
        self.alloc(Cell::HashMap {
            keys,
            buckets,
            size: 0,
            custom,
        })
    }
}

impl Runtime {
    /// Create a string-keyed hash map with room for `capacity` entries.
    pub fn new_string_hash_map(&self, capacity: usize) -> Word {
        self.shared
            .inner
            .lock()
            .new_hash_map_cell(MapKeys::String, capacity, None)
    }

    /// Create an integer-keyed hash map with room for `capacity` entries.
    pub fn new_int_hash_map(&self, capacity: usize) -> Word {
        self.shared
            .inner
            .lock()
            .new_hash_map_cell(MapKeys::Int, capacity, None)
    }

    /// Create a word-keyed hash map with custom hashing and equality.
    pub fn new_custom_hash_map(
        &self,
        capacity: usize,
        keys: Arc<dyn CustomHashKeys>,
    ) -> Word {
        self.shared
            .inner
            .lock()
            .new_hash_map_cell(MapKeys::String, capacity, Some(keys))
    }

    /// Share a hash map's structure with a new word; both maps diverge
    /// copy-on-write from here on.
    pub fn copy_hash_map(&self, map: Word) -> Word {
        let mut inner = self.shared.inner.lock();
        if !inner.word_kind_impl(map).contains(WordKind::HASHMAP) {
            inner.type_error(ErrorCode::HashMap, map);
            return WORD_NIL;
        }
        inner.copy_hash_map_impl(map)
    }

    /// Value for a string key, if present.
    pub fn hash_map_get(&self, map: Word, key: Word) -> Option<Word> {
        let inner = self.shared.inner.lock();
        if !inner.check_hash_map(map, MapKeys::String) {
            return None;
        }
        inner.hash_map_get_impl(map, &MapKey::Str(key))
    }

    /// Value for an integer key, if present.
    pub fn int_hash_map_get(&self, map: Word, key: i64) -> Option<Word> {
        let inner = self.shared.inner.lock();
        if !inner.check_hash_map(map, MapKeys::Int) {
            return None;
        }
        inner.hash_map_get_impl(map, &MapKey::Int(key))
    }

    /// Map a string key to `value`; returns whether an entry was created.
    pub fn hash_map_set(&self, map: Word, key: Word, value: Word) -> bool {
        let mut inner = self.shared.inner.lock();
        if !inner.check_hash_map(map, MapKeys::String) {
            return false;
        }
        inner.hash_map_set_impl(map, &MapKey::Str(key), value)
    }

    /// Map an integer key to `value`; returns whether an entry was
    /// created.
    pub fn int_hash_map_set(&self, map: Word, key: i64, value: Word) -> bool {
        let mut inner = self.shared.inner.lock();
        if !inner.check_hash_map(map, MapKeys::Int) {
            return false;
        }
        inner.hash_map_set_impl(map, &MapKey::Int(key), value)
    }

    /// Remove a string key; returns whether an entry was removed.
    pub fn hash_map_unset(&self, map: Word, key: Word) -> bool {
        let mut inner = self.shared.inner.lock();
        if !inner.check_hash_map(map, MapKeys::String) {
            return false;
        }
        inner.hash_map_unset_impl(map, &MapKey::Str(key))
    }

    /// Remove an integer key; returns whether an entry was removed.
    pub fn int_hash_map_unset(&self, map: Word, key: i64) -> bool {
        let mut inner = self.shared.inner.lock();
        if !inner.check_hash_map(map, MapKeys::Int) {
            return false;
        }
        inner.hash_map_unset_impl(map, &MapKey::Int(key))
    }
}

impl RuntimeInner {
    pub(crate) fn check_hash_map(&self, map: Word, keys: MapKeys) -> bool {
        match self.hash_map_fields(map) {
            Some((k, _, _, _)) if k == keys => true,
            Some(_) => self.type_error(
                match keys {
                    MapKeys::String => ErrorCode::WordHashMap,
                    MapKeys::Int => ErrorCode::IntHashMap,
                },
                map,
            ),
            None => self.type_error(ErrorCode::HashMap, map),
        }
    }
}
