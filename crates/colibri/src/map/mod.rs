//! Generic Map Layer
//!
//! Generic map operations dispatch on the backing of the map word: hash
//! map, trie map, or custom map storage. The iterator contract is uniform
//! across backings; its traversal state is a three-way union of the hash
//! bucket index, the trie position, and the two opaque slots of custom
//! iterators. Trie map iterators are additionally bidirectional and visit
//! keys in sorted order.

pub(crate) mod hash;
pub(crate) mod trie;

use crate::error::ErrorCode;
use crate::heap::cell::MapKeys;
use crate::heap::Cell;
use crate::map::hash::MapKey;
use crate::runtime::{Runtime, RuntimeInner};
use crate::word::custom::{CustomMapIterState, CustomPayload};
use crate::word::{Word, WORD_NIL};

/// Backing storage of a map word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Backing {
    Hash,
    Trie,
    Custom,
    CustomInt,
}

/// Iterator traversal state, specialized per backing.
enum IterState {
    None,
    Hash { bucket: usize },
    Trie,
    Custom(CustomMapIterState),
}

/// An iterator over the entries of a map.
pub struct MapIter {
    map: Word,
    entry: Word,
    state: IterState,
}

impl Default for MapIter {
    fn default() -> Self {
        MapIter {
            map: WORD_NIL,
            entry: WORD_NIL,
            state: IterState::None,
        }
    }
}

impl MapIter {
    /// Whether this iterator was never initialized.
    pub fn is_null(&self) -> bool {
        self.map.is_nil()
    }

    /// Whether the iterator is past the last entry.
    pub fn at_end(&self) -> bool {
        self.entry.is_nil() && !matches!(self.state, IterState::Custom(_))
    }

    /// The iterated map.
    pub fn map(&self) -> Word {
        self.map
    }
}

impl RuntimeInner {
    pub(crate) fn map_backing(&self, map: Word) -> Option<(Backing, MapKeys)> {
        let s = self.strip(map);
        match s.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::HashMap { keys, .. }) => Some((Backing::Hash, *keys)),
            Some(Cell::TrieMap { keys, .. }) => Some((Backing::Trie, *keys)),
            Some(Cell::Custom(CustomPayload::Map(_))) => Some((Backing::Custom, MapKeys::String)),
            Some(Cell::Custom(CustomPayload::IntMap(_))) => {
                Some((Backing::CustomInt, MapKeys::Int))
            }
            _ => None,
        }
    }

    fn check_map(&self, map: Word, keys: MapKeys) -> Option<Backing> {
        match self.map_backing(map) {
            Some((backing, k)) if k == keys => Some(backing),
            Some(_) => {
                self.type_error(
                    match keys {
                        MapKeys::String => ErrorCode::WordMap,
                        MapKeys::Int => ErrorCode::IntMap,
                    },
                    map,
                );
                None
            }
            None => {
                self.type_error(ErrorCode::Map, map);
                None
            }
        }
    }

    fn with_custom_map<R>(
        &self,
        map: Word,
        f: impl FnOnce(&dyn crate::word::custom::CustomMap) -> R,
    ) -> Option<R> {
        let s = self.strip(map);
        match s.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::Custom(CustomPayload::Map(p))) => Some(f(p.as_ref())),
            _ => None,
        }
    }

    fn with_custom_map_mut<R>(
        &mut self,
        map: Word,
        f: impl FnOnce(&mut dyn crate::word::custom::CustomMap) -> R,
    ) -> Option<R> {
        let s = self.strip(map);
        let r = s.cell_ref()?;
        match self.heap.get_mut(r) {
            Cell::Custom(CustomPayload::Map(p)) => Some(f(p.as_mut())),
            _ => None,
        }
    }

    fn with_custom_int_map<R>(
        &self,
        map: Word,
        f: impl FnOnce(&dyn crate::word::custom::CustomIntMap) -> R,
    ) -> Option<R> {
        let s = self.strip(map);
        match s.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::Custom(CustomPayload::IntMap(p))) => Some(f(p.as_ref())),
            _ => None,
        }
    }

    fn with_custom_int_map_mut<R>(
        &mut self,
        map: Word,
        f: impl FnOnce(&mut dyn crate::word::custom::CustomIntMap) -> R,
    ) -> Option<R> {
        let s = self.strip(map);
        let r = s.cell_ref()?;
        match self.heap.get_mut(r) {
            Cell::Custom(CustomPayload::IntMap(p)) => Some(f(p.as_mut())),
            _ => None,
        }
    }

    pub(crate) fn map_size_impl(&self, map: Word) -> Option<usize> {
        let s = self.strip(map);
        match s.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::HashMap { size, .. }) | Some(Cell::TrieMap { size, .. }) => Some(*size),
            Some(Cell::Custom(CustomPayload::Map(p))) => Some(p.size()),
            Some(Cell::Custom(CustomPayload::IntMap(p))) => Some(p.size()),
            _ => None,
        }
    }
}

impl Runtime {
    /// Number of entries in a map; `0` with a typecheck error for
    /// non-maps.
    pub fn map_size(&self, map: Word) -> usize {
        let inner = self.shared.inner.lock();
        match inner.map_size_impl(map) {
            Some(size) => size,
            None => {
                inner.type_error(ErrorCode::Map, map);
                0
            }
        }
    }

    /// Value for a string/word key, if present. Dispatches on the map's
    /// backing.
    pub fn map_get(&self, map: Word, key: Word) -> Option<Word> {
        let inner = self.shared.inner.lock();
        match inner.check_map(map, MapKeys::String)? {
            Backing::Hash => inner.hash_map_get_impl(map, &MapKey::Str(key)),
            Backing::Trie => inner.trie_map_get_impl(map, &MapKey::Str(key)),
            Backing::Custom => inner.with_custom_map(map, |p| p.get(key))?,
            Backing::CustomInt => None,
        }
    }

    /// Value for an integer key, if present.
    pub fn int_map_get(&self, map: Word, key: i64) -> Option<Word> {
        let inner = self.shared.inner.lock();
        match inner.check_map(map, MapKeys::Int)? {
            Backing::Hash => inner.hash_map_get_impl(map, &MapKey::Int(key)),
            Backing::Trie => inner.trie_map_get_impl(map, &MapKey::Int(key)),
            Backing::CustomInt => inner.with_custom_int_map(map, |p| p.get(key))?,
            Backing::Custom => None,
        }
    }

    /// Map a string/word key to `value`; returns whether an entry was
    /// created.
    pub fn map_set(&self, map: Word, key: Word, value: Word) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(backing) = inner.check_map(map, MapKeys::String) else {
            return false;
        };
        match backing {
            Backing::Hash => inner.hash_map_set_impl(map, &MapKey::Str(key), value),
            Backing::Trie => inner.trie_map_set_impl(map, &MapKey::Str(key), value),
            Backing::Custom => inner
                .with_custom_map_mut(map, |p| p.set(key, value))
                .unwrap_or(false),
            Backing::CustomInt => false,
        }
    }

    /// Map an integer key to `value`; returns whether an entry was
    /// created.
    pub fn int_map_set(&self, map: Word, key: i64, value: Word) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(backing) = inner.check_map(map, MapKeys::Int) else {
            return false;
        };
        match backing {
            Backing::Hash => inner.hash_map_set_impl(map, &MapKey::Int(key), value),
            Backing::Trie => inner.trie_map_set_impl(map, &MapKey::Int(key), value),
            Backing::CustomInt => inner
                .with_custom_int_map_mut(map, |p| p.set(key, value))
                .unwrap_or(false),
            Backing::Custom => false,
        }
    }

    /// Remove a string/word key; returns whether an entry was removed.
    pub fn map_unset(&self, map: Word, key: Word) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(backing) = inner.check_map(map, MapKeys::String) else {
            return false;
        };
        match backing {
            Backing::Hash => inner.hash_map_unset_impl(map, &MapKey::Str(key)),
            Backing::Trie => inner.trie_map_unset_impl(map, &MapKey::Str(key)),
            Backing::Custom => inner
                .with_custom_map_mut(map, |p| p.unset(key))
                .unwrap_or(false),
            Backing::CustomInt => false,
        }
    }

    /// Remove an integer key; returns whether an entry was removed.
    pub fn int_map_unset(&self, map: Word, key: i64) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(backing) = inner.check_map(map, MapKeys::Int) else {
            return false;
        };
        match backing {
            Backing::Hash => inner.hash_map_unset_impl(map, &MapKey::Int(key)),
            Backing::Trie => inner.trie_map_unset_impl(map, &MapKey::Int(key)),
            Backing::CustomInt => inner
                .with_custom_int_map_mut(map, |p| p.unset(key))
                .unwrap_or(false),
            Backing::Custom => false,
        }
    }

    // === Iterators ===

    /// Iterator over the first entry of a map (end when empty). Hash maps
    /// iterate in bucket order, trie maps in sorted key order.
    pub fn map_iter_begin(&self, map: Word) -> MapIter {
        let inner = self.shared.inner.lock();
        let Some((backing, _)) = inner.map_backing(map) else {
            inner.type_error(ErrorCode::Map, map);
            return MapIter::default();
        };
        match backing {
            Backing::Hash => match inner.hash_map_first(map, 0) {
                Some((bucket, entry)) => MapIter {
                    map,
                    entry,
                    state: IterState::Hash { bucket },
                },
                None => MapIter {
                    map,
                    entry: WORD_NIL,
                    state: IterState::Hash { bucket: 0 },
                },
            },
            Backing::Trie => {
                let root = inner.trie_map_fields(map).map_or(WORD_NIL, |(_, r, _, _)| r);
                let entry = if root.is_nil() {
                    WORD_NIL
                } else {
                    inner.trie_extreme(root, false)
                };
                MapIter {
                    map,
                    entry,
                    state: IterState::Trie,
                }
            }
            Backing::Custom => match inner.with_custom_map(map, |p| p.iter_begin()).flatten() {
                Some(state) => MapIter {
                    map,
                    entry: WORD_NIL,
                    state: IterState::Custom(state),
                },
                None => MapIter {
                    map,
                    entry: WORD_NIL,
                    state: IterState::None,
                },
            },
            Backing::CustomInt => {
                match inner.with_custom_int_map(map, |p| p.iter_begin()).flatten() {
                    Some(state) => MapIter {
                        map,
                        entry: WORD_NIL,
                        state: IterState::Custom(state),
                    },
                    None => MapIter {
                        map,
                        entry: WORD_NIL,
                        state: IterState::None,
                    },
                }
            }
        }
    }

    /// Iterator over the first entry of a hash map, in bucket order.
    pub fn hash_map_iter_begin(&self, map: Word) -> MapIter {
        {
            let inner = self.shared.inner.lock();
            if inner.hash_map_fields(map).is_none() {
                inner.type_error(ErrorCode::HashMap, map);
                return MapIter::default();
            }
        }
        self.map_iter_begin(map)
    }

    /// Iterator positioned on a string key of a hash map, optionally
    /// creating the entry.
    pub fn hash_map_iter_find(&self, map: Word, key: Word, create: Option<&mut bool>) -> MapIter {
        {
            let inner = self.shared.inner.lock();
            if !inner.check_hash_map(map, MapKeys::String) {
                return MapIter::default();
            }
        }
        self.map_iter_find(map, key, create)
    }

    /// Iterator positioned on an integer key of a hash map, optionally
    /// creating the entry.
    pub fn int_hash_map_iter_find(
        &self,
        map: Word,
        key: i64,
        create: Option<&mut bool>,
    ) -> MapIter {
        {
            let inner = self.shared.inner.lock();
            if !inner.check_hash_map(map, MapKeys::Int) {
                return MapIter::default();
            }
        }
        self.int_map_iter_find(map, key, create)
    }

    /// Iterator over the first entry of a trie map, in sorted key order.
    pub fn trie_map_iter_first(&self, map: Word) -> MapIter {
        {
            let inner = self.shared.inner.lock();
            if inner.trie_map_fields(map).is_none() {
                inner.type_error(ErrorCode::TrieMap, map);
                return MapIter::default();
            }
        }
        self.map_iter_begin(map)
    }

    /// Iterator positioned on a string key of a trie map, optionally
    /// creating the entry.
    pub fn trie_map_iter_find(&self, map: Word, key: Word, create: Option<&mut bool>) -> MapIter {
        {
            let inner = self.shared.inner.lock();
            if !inner.check_trie_map(map, MapKeys::String) {
                return MapIter::default();
            }
        }
        self.map_iter_find(map, key, create)
    }

    /// Iterator positioned on an integer key of a trie map, optionally
    /// creating the entry.
    pub fn int_trie_map_iter_find(
        &self,
        map: Word,
        key: i64,
        create: Option<&mut bool>,
    ) -> MapIter {
        {
            let inner = self.shared.inner.lock();
            if !inner.check_trie_map(map, MapKeys::Int) {
                return MapIter::default();
            }
        }
        self.int_map_iter_find(map, key, create)
    }

    /// Iterator over the last entry of a trie map, in sorted key order.
    pub fn trie_map_iter_last(&self, map: Word) -> MapIter {
        let inner = self.shared.inner.lock();
        if inner.trie_map_fields(map).is_none() {
            inner.type_error(ErrorCode::TrieMap, map);
            return MapIter::default();
        }
        let root = inner.trie_map_fields(map).map_or(WORD_NIL, |(_, r, _, _)| r);
        let entry = if root.is_nil() {
            WORD_NIL
        } else {
            inner.trie_extreme(root, true)
        };
        MapIter {
            map,
            entry,
            state: IterState::Trie,
        }
    }

    /// Iterator positioned on the entry for a string/word key. With
    /// `create`, an absent entry is inserted with a nil value and the flag
    /// reports whether creation happened.
    pub fn map_iter_find(&self, map: Word, key: Word, create: Option<&mut bool>) -> MapIter {
        self.iter_find_impl(map, MapKey::Str(key), MapKeys::String, create)
    }

    /// Iterator positioned on the entry for an integer key.
    pub fn int_map_iter_find(&self, map: Word, key: i64, create: Option<&mut bool>) -> MapIter {
        self.iter_find_impl(map, MapKey::Int(key), MapKeys::Int, create)
    }

    fn iter_find_impl(
        &self,
        map: Word,
        key: MapKey,
        kind: MapKeys,
        create: Option<&mut bool>,
    ) -> MapIter {
        let mut inner = self.shared.inner.lock();
        let Some(backing) = inner.check_map(map, kind) else {
            return MapIter::default();
        };
        let mut created = false;
        let entry = match backing {
            Backing::Hash => {
                let found = inner.hash_map_find(map, &key).map(|(_, e)| e);
                match found {
                    Some(e) if !e.is_nil() => e,
                    _ => {
                        if create.is_some() {
                            inner.hash_map_set_impl(map, &key, WORD_NIL);
                            created = true;
                            inner
                                .hash_map_find(map, &key)
                                .map(|(_, e)| e)
                                .unwrap_or(WORD_NIL)
                        } else {
                            WORD_NIL
                        }
                    }
                }
            }
            Backing::Trie => match inner.trie_map_find_leaf(map, &key) {
                Some(leaf) => leaf,
                None => {
                    if create.is_some() {
                        inner.trie_map_set_impl(map, &key, WORD_NIL);
                        created = true;
                        inner.trie_map_find_leaf(map, &key).unwrap_or(WORD_NIL)
                    } else {
                        WORD_NIL
                    }
                }
            },
            Backing::Custom | Backing::CustomInt => {
                let state = match (&key, backing) {
                    (MapKey::Str(k), Backing::Custom) => {
                        let k = *k;
                        let found = inner.with_custom_map(map, |p| p.iter_find(k)).flatten();
                        match found {
                            Some(state) => Some(state),
                            None if create.is_some() => {
                                inner.with_custom_map_mut(map, |p| p.set(k, WORD_NIL));
                                created = true;
                                inner.with_custom_map(map, |p| p.iter_find(k)).flatten()
                            }
                            None => None,
                        }
                    }
                    (MapKey::Int(k), Backing::CustomInt) => {
                        let k = *k;
                        let found = inner.with_custom_int_map(map, |p| p.iter_find(k)).flatten();
                        match found {
                            Some(state) => Some(state),
                            None if create.is_some() => {
                                inner.with_custom_int_map_mut(map, |p| p.set(k, WORD_NIL));
                                created = true;
                                inner.with_custom_int_map(map, |p| p.iter_find(k)).flatten()
                            }
                            None => None,
                        }
                    }
                    _ => None,
                };
                if let Some(flag) = create {
                    *flag = created;
                }
                return match state {
                    Some(state) => MapIter {
                        map,
                        entry: WORD_NIL,
                        state: IterState::Custom(state),
                    },
                    None => MapIter {
                        map,
                        entry: WORD_NIL,
                        state: IterState::None,
                    },
                };
            }
        };
        if let Some(flag) = create {
            *flag = created;
        }
        let state = match backing {
            Backing::Hash => {
                let bucket = inner
                    .hash_map_find(map, &key)
                    .map(|(b, _)| b)
                    .unwrap_or(0);
                IterState::Hash { bucket }
            }
            _ => IterState::Trie,
        };
        MapIter { map, entry, state }
    }
}

impl MapIter {
    fn check(&self, rt: &Runtime, want_end_error: bool) -> bool {
        let inner = rt.shared.inner.lock();
        if self.is_null() {
            inner.value_error(ErrorCode::MapIter, "iterator not initialized");
            return false;
        }
        if want_end_error && self.at_end() {
            inner.value_error(ErrorCode::MapIterEnd, "iterator at end");
            return false;
        }
        true
    }

    /// Key and value of the current entry of a string/word-keyed map.
    pub fn get(&self, rt: &Runtime) -> Option<(Word, Word)> {
        if !self.check(rt, true) {
            return None;
        }
        let inner = rt.shared.inner.lock();
        match &self.state {
            IterState::Custom(state) => inner
                .with_custom_map(self.map, |p| (p.iter_key(*state), p.iter_value(*state))),
            _ => inner.map_entry_fields(self.entry),
        }
    }

    /// Key and value of the current entry of an integer-keyed map.
    pub fn int_get(&self, rt: &Runtime) -> Option<(i64, Word)> {
        if !self.check(rt, true) {
            return None;
        }
        let inner = rt.shared.inner.lock();
        if let Some((backing, keys)) = inner.map_backing(self.map) {
            if keys != MapKeys::Int {
                inner.type_error(ErrorCode::IntMap, self.map);
                return None;
            }
            if backing == Backing::CustomInt {
                if let IterState::Custom(state) = &self.state {
                    return inner
                        .with_custom_int_map(self.map, |p| (p.iter_key(*state), p.iter_value(*state)));
                }
            }
        }
        let (key, value) = inner.map_entry_fields(self.entry)?;
        let key = inner.int_word_value_impl(key)?;
        Some((key, value))
    }

    /// Key of the current entry (string/word-keyed maps).
    pub fn key(&self, rt: &Runtime) -> Word {
        let inner = rt.shared.inner.lock();
        if let Some((_, keys)) = inner.map_backing(self.map) {
            if keys != MapKeys::String {
                inner.type_error(ErrorCode::WordMap, self.map);
                return WORD_NIL;
            }
        }
        drop(inner);
        self.get(rt).map(|(k, _)| k).unwrap_or(WORD_NIL)
    }

    /// Key of the current entry (integer-keyed maps).
    pub fn int_key(&self, rt: &Runtime) -> i64 {
        self.int_get(rt).map(|(k, _)| k).unwrap_or(0)
    }

    /// Value of the current entry.
    pub fn value(&self, rt: &Runtime) -> Word {
        if !self.check(rt, true) {
            return WORD_NIL;
        }
        let inner = rt.shared.inner.lock();
        match &self.state {
            IterState::Custom(state) => {
                let s = *state;
                inner
                    .with_custom_map(self.map, |p| p.iter_value(s))
                    .or_else(|| inner.with_custom_int_map(self.map, |p| p.iter_value(s)))
                    .unwrap_or(WORD_NIL)
            }
            _ => inner
                .map_entry_fields(self.entry)
                .map(|(_, v)| v)
                .unwrap_or(WORD_NIL),
        }
    }

    /// Replace the value of the current entry.
    pub fn set_value(&mut self, rt: &Runtime, value: Word) {
        if !self.check(rt, true) {
            return;
        }
        let mut inner = rt.shared.inner.lock();
        match &self.state {
            IterState::Custom(state) => {
                let s = *state;
                if inner
                    .with_custom_map_mut(self.map, |p| p.iter_set_value(s, value))
                    .is_none()
                {
                    inner.with_custom_int_map_mut(self.map, |p| p.iter_set_value(s, value));
                }
            }
            _ => {
                // Route through the map so shared structures copy on
                // write, then re-anchor the iterator.
                let Some((key, _)) = inner.map_entry_fields(self.entry) else {
                    return;
                };
                let Some((backing, keys)) = inner.map_backing(self.map) else {
                    return;
                };
                let key = match keys {
                    MapKeys::String => MapKey::Str(key),
                    MapKeys::Int => match inner.int_word_value_impl(key) {
                        Some(k) => MapKey::Int(k),
                        None => return,
                    },
                };
                match backing {
                    Backing::Hash => {
                        inner.hash_map_set_impl(self.map, &key, value);
                        if let Some((bucket, entry)) = inner.hash_map_find(self.map, &key) {
                            self.entry = entry;
                            self.state = IterState::Hash { bucket };
                        }
                    }
                    Backing::Trie => {
                        inner.trie_map_set_impl(self.map, &key, value);
                        if let Some(leaf) = inner.trie_map_find_leaf(self.map, &key) {
                            self.entry = leaf;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    /// Advance to the next entry (sorted order for trie maps).
    pub fn next(&mut self, rt: &Runtime) {
        if !self.check(rt, true) {
            return;
        }
        let inner = rt.shared.inner.lock();
        match &mut self.state {
            IterState::None => {}
            IterState::Hash { bucket } => {
                match inner.hash_map_next(self.map, *bucket, self.entry) {
                    Some((b, entry)) => {
                        *bucket = b;
                        self.entry = entry;
                    }
                    None => self.entry = WORD_NIL,
                }
            }
            IterState::Trie => {
                let key = match inner.map_entry_fields(self.entry) {
                    Some((k, _)) => k,
                    None => return,
                };
                let keys = inner.map_backing(self.map).map(|(_, k)| k);
                let key = match keys {
                    Some(MapKeys::String) => MapKey::Str(key),
                    Some(MapKeys::Int) => match inner.int_word_value_impl(key) {
                        Some(k) => MapKey::Int(k),
                        None => return,
                    },
                    None => return,
                };
                self.entry = inner
                    .trie_neighbor(self.map, &key, true)
                    .unwrap_or(WORD_NIL);
            }
            IterState::Custom(state) => {
                let s = *state;
                let next = inner
                    .with_custom_map(self.map, |p| p.iter_next(s))
                    .or_else(|| inner.with_custom_int_map(self.map, |p| p.iter_next(s)))
                    .flatten();
                match next {
                    Some(ns) => *state = ns,
                    None => {
                        self.state = IterState::None;
                        self.entry = WORD_NIL;
                    }
                }
            }
        }
    }

    /// Step back to the previous entry of a trie map (sorted order).
    pub fn previous(&mut self, rt: &Runtime) {
        let inner = rt.shared.inner.lock();
        if self.is_null() {
            inner.value_error(ErrorCode::MapIter, "iterator not initialized");
            return;
        }
        if !matches!(self.state, IterState::Trie) {
            inner.type_error(ErrorCode::TrieMap, self.map);
            return;
        }
        if self.entry.is_nil() {
            return;
        }
        let key = match inner.map_entry_fields(self.entry) {
            Some((k, _)) => k,
            None => return,
        };
        let keys = inner.map_backing(self.map).map(|(_, k)| k);
        let key = match keys {
            Some(MapKeys::String) => MapKey::Str(key),
            Some(MapKeys::Int) => match inner.int_word_value_impl(key) {
                Some(k) => MapKey::Int(k),
                None => return,
            },
            None => return,
        };
        self.entry = inner
            .trie_neighbor(self.map, &key, false)
            .unwrap_or(WORD_NIL);
    }
}

impl RuntimeInner {
    /// Key and value of a hash entry or trie leaf word.
    pub(crate) fn map_entry_fields(&self, entry: Word) -> Option<(Word, Word)> {
        match entry.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::HashEntry { key, value, .. }) => Some((*key, *value)),
            Some(Cell::TrieLeaf { key, value, .. }) => Some((*key, *value)),
            _ => None,
        }
    }
}
