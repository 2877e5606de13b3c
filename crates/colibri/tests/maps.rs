//! Generic map layer tests: uniform operations and iterators across hash
//! and trie backings, kind mismatches, and custom map storage.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use colibri::{
    CustomHashKeys, CustomIntMap, CustomTrieKeys, CustomWord, ErrorCode, ErrorLevel, KeyContext,
    Runtime, ThreadingModel, Word, WORD_NIL, WORD_TRUE,
};

fn runtime() -> Runtime {
    Runtime::init(ThreadingModel::Single)
}

fn record_errors(rt: &Runtime) -> Arc<Mutex<Vec<(ErrorLevel, ErrorCode)>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    rt.set_error_proc(Box::new(move |level, code, msg| {
        if level <= ErrorLevel::Error {
            panic!("unexpected {level} error: {msg}");
        }
        sink.lock().unwrap().push((level, code));
        true
    }));
    log
}

#[test]
fn generic_ops_dispatch_to_both_backings() {
    let rt = runtime();
    let _g = rt.pause();
    for map in [rt.new_string_hash_map(0), rt.new_string_trie_map()] {
        let key = rt.new_rope_from_string("shared key");
        let value = rt.new_int_word(9);
        assert!(rt.map_set(map, key, value));
        assert_eq!(rt.map_size(map), 1);
        assert_eq!(rt.map_get(map, key), Some(value));
        assert!(rt.map_unset(map, key));
        assert_eq!(rt.map_get(map, key), None);
    }
    for map in [rt.new_int_hash_map(0), rt.new_int_trie_map()] {
        assert!(rt.int_map_set(map, -7, WORD_TRUE));
        assert_eq!(rt.int_map_get(map, -7), Some(WORD_TRUE));
        assert!(rt.int_map_unset(map, -7));
        assert_eq!(rt.int_map_get(map, -7), None);
    }
}

#[test]
fn map_get_after_set_and_unset() {
    let rt = runtime();
    let _g = rt.pause();
    for map in [rt.new_int_hash_map(0), rt.new_int_trie_map()] {
        let v = rt.new_int_word(123);
        rt.int_map_set(map, 42, v);
        assert_eq!(rt.int_map_get(map, 42), Some(v));
        rt.int_map_unset(map, 42);
        assert_eq!(rt.int_map_get(map, 42), None);
    }
}

#[test]
fn iteration_yields_size_entries() {
    let rt = runtime();
    let _g = rt.pause();
    for map in [rt.new_int_hash_map(0), rt.new_int_trie_map()] {
        for k in 0i64..32 {
            rt.int_map_set(map, k, rt.new_int_word(k));
        }
        let mut it = rt.map_iter_begin(map);
        let mut count = 0;
        while !it.at_end() {
            count += 1;
            it.next(&rt);
        }
        assert_eq!(count, rt.map_size(map));
    }
}

#[test]
fn kind_mismatch_is_a_typecheck() {
    let rt = runtime();
    let log = record_errors(&rt);
    let _g = rt.pause();
    let int_map = rt.new_int_hash_map(0);
    let key = rt.new_rope_from_string("key");
    assert_eq!(rt.map_get(int_map, key), None);
    assert!(!rt.map_set(int_map, key, WORD_TRUE));

    let string_map = rt.new_string_trie_map();
    assert_eq!(rt.int_map_get(string_map, 5), None);

    let recorded = log.lock().unwrap();
    assert_eq!(
        recorded.as_slice(),
        &[
            (ErrorLevel::TypeCheck, ErrorCode::WordMap),
            (ErrorLevel::TypeCheck, ErrorCode::WordMap),
            (ErrorLevel::TypeCheck, ErrorCode::IntMap),
        ]
    );
}

#[test]
fn non_map_word_is_a_typecheck() {
    let rt = runtime();
    let log = record_errors(&rt);
    let w = rt.new_int_word(3);
    assert_eq!(rt.map_size(w), 0);
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(ErrorLevel::TypeCheck, ErrorCode::Map)]
    );
}

/// Custom integer-keyed map over a sorted standard map.
struct TreeMap {
    entries: BTreeMap<i64, Word>,
}

impl CustomWord for TreeMap {
    fn name(&self) -> &str {
        "treemap"
    }

    fn children(&mut self, visit: &mut dyn FnMut(&mut Word)) {
        for value in self.entries.values_mut() {
            visit(value);
        }
    }
}

impl CustomIntMap for TreeMap {
    fn size(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, key: i64) -> Option<Word> {
        self.entries.get(&key).copied()
    }

    fn set(&mut self, key: i64, value: Word) -> bool {
        self.entries.insert(key, value).is_none()
    }

    fn unset(&mut self, key: i64) -> bool {
        self.entries.remove(&key).is_some()
    }

    fn iter_begin(&self) -> Option<(u64, u64)> {
        self.entries.keys().next().map(|&k| (k as u64, 0))
    }

    fn iter_find(&self, key: i64) -> Option<(u64, u64)> {
        self.entries.contains_key(&key).then_some((key as u64, 0))
    }

    fn iter_next(&self, state: (u64, u64)) -> Option<(u64, u64)> {
        let current = state.0 as i64;
        self.entries
            .range((current + 1)..)
            .next()
            .map(|(&k, _)| (k as u64, 0))
    }

    fn iter_key(&self, state: (u64, u64)) -> i64 {
        state.0 as i64
    }

    fn iter_value(&self, state: (u64, u64)) -> Word {
        self.entries
            .get(&(state.0 as i64))
            .copied()
            .unwrap_or(WORD_NIL)
    }

    fn iter_set_value(&mut self, state: (u64, u64), value: Word) {
        self.entries.insert(state.0 as i64, value);
    }
}

#[test]
fn custom_int_map_full_contract() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_custom_int_map(Box::new(TreeMap {
        entries: BTreeMap::new(),
    }));

    for k in [5i64, 1, 3] {
        assert!(rt.int_map_set(m, k, rt.new_int_word(k * 2)));
    }
    assert_eq!(rt.map_size(m), 3);
    assert_eq!(rt.int_word_value(rt.int_map_get(m, 3).unwrap()), 6);

    let mut it = rt.map_iter_begin(m);
    let mut keys = Vec::new();
    while !it.at_end() {
        let (k, v) = it.int_get(&rt).unwrap();
        assert_eq!(rt.int_word_value(v), k * 2);
        keys.push(k);
        it.next(&rt);
    }
    assert_eq!(keys, vec![1, 3, 5]);

    assert!(rt.int_map_unset(m, 3));
    assert_eq!(rt.map_size(m), 2);
    assert_eq!(rt.int_map_get(m, 3), None);
}

fn fold(c: u32) -> u32 {
    if ('A' as u32..='Z' as u32).contains(&c) {
        c + 32
    } else {
        c
    }
}

/// Case-insensitive hashing and equality over rope keys, exercising the
/// key hooks of the built-in bucket storage.
struct CaseInsensitiveKeys;

impl CustomHashKeys for CaseInsensitiveKeys {
    fn hash(&self, ctx: &KeyContext<'_>, key: Word) -> u64 {
        let len = ctx.rope_length(key);
        (0..len).fold(0u64, |h, i| {
            let c = ctx.rope_at(key, i).unwrap_or(0);
            h.wrapping_mul(9).wrapping_add(fold(c) as u64)
        })
    }

    fn equal(&self, ctx: &KeyContext<'_>, key1: Word, key2: Word) -> bool {
        let len1 = ctx.rope_length(key1);
        if len1 != ctx.rope_length(key2) {
            return false;
        }
        (0..len1).all(|i| {
            fold(ctx.rope_at(key1, i).unwrap_or(0)) == fold(ctx.rope_at(key2, i).unwrap_or(0))
        })
    }
}

#[test]
fn custom_hash_keys_drive_bucket_storage() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_custom_hash_map(0, Arc::new(CaseInsensitiveKeys));

    let mixed = rt.new_rope_from_string("Alpha");
    let one = rt.new_int_word(1);
    assert!(rt.hash_map_set(m, mixed, one));
    assert_eq!(rt.map_size(m), 1);

    // Lookups and overwrites go through the custom hash and equality.
    let upper = rt.new_rope_from_string("ALPHA");
    assert_eq!(rt.hash_map_get(m, upper), Some(one));
    let two = rt.new_int_word(2);
    let lower = rt.new_rope_from_string("alpha");
    assert!(!rt.hash_map_set(m, lower, two));
    assert_eq!(rt.map_size(m), 1);
    assert_eq!(rt.hash_map_get(m, mixed), Some(two));

    // Keys differing beyond case are distinct entries.
    let beta = rt.new_rope_from_string("Beta");
    assert!(rt.hash_map_set(m, beta, one));
    assert_eq!(rt.map_size(m), 2);

    assert!(rt.hash_map_unset(m, upper));
    assert_eq!(rt.map_size(m), 1);
    assert_eq!(rt.hash_map_get(m, mixed), None);
}

/// Case-folded crit-bit coordinates over rope keys, mirroring the
/// augmented-value scheme of the built-in string tries.
struct CaseFoldedTrieKeys;

const PRESENT: u64 = 1 << 21;

fn folded_at(ctx: &KeyContext<'_>, key: Word, index: usize) -> u64 {
    match ctx.rope_at(key, index) {
        Some(c) => PRESENT | fold(c) as u64,
        None => 0,
    }
}

impl CustomTrieKeys for CaseFoldedTrieKeys {
    fn bit_test(&self, ctx: &KeyContext<'_>, key: Word, index: usize, mask: u64) -> bool {
        folded_at(ctx, key, index) & mask != 0
    }

    fn key_diff(
        &self,
        ctx: &KeyContext<'_>,
        key1: Word,
        key2: Word,
    ) -> Option<(usize, u64, Ordering)> {
        let len1 = ctx.rope_length(key1);
        let len2 = ctx.rope_length(key2);
        for index in 0..=len1.max(len2) {
            let a = folded_at(ctx, key1, index);
            let b = folded_at(ctx, key2, index);
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
            if index >= len1 && index >= len2 {
                break;
            }
        }
        None
    }
}

#[test]
fn custom_trie_keys_drive_crit_bit_storage() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_custom_trie_map(Arc::new(CaseFoldedTrieKeys));

    let banana = rt.new_rope_from_string("Banana");
    let apple = rt.new_rope_from_string("apple");
    let cherry = rt.new_rope_from_string("Cherry");
    let one = rt.new_int_word(1);
    assert!(rt.trie_map_set(m, banana, one));
    assert!(rt.trie_map_set(m, apple, one));
    assert!(rt.trie_map_set(m, cherry, one));
    assert_eq!(rt.map_size(m), 3);

    // Lookups and overwrites compare through the custom key hooks.
    let shouting = rt.new_rope_from_string("APPLE");
    assert_eq!(rt.trie_map_get(m, shouting), Some(one));
    let two = rt.new_int_word(2);
    assert!(!rt.trie_map_set(m, shouting, two));
    assert_eq!(rt.map_size(m), 3);
    assert_eq!(rt.trie_map_get(m, apple), Some(two));

    // Iteration follows the case-folded sorted order.
    let mut it = rt.map_iter_begin(m);
    let mut keys = Vec::new();
    while !it.at_end() {
        let (k, _) = it.get(&rt).unwrap();
        let len = rt.rope_length(k);
        let s: String = (0..len)
            .map(|i| char::from_u32(rt.rope_at(k, i)).unwrap())
            .collect();
        keys.push(s);
        it.next(&rt);
    }
    assert_eq!(keys, vec!["apple", "Banana", "Cherry"]);

    let lower = rt.new_rope_from_string("cherry");
    assert!(rt.trie_map_unset(m, lower));
    assert_eq!(rt.map_size(m), 2);
    assert_eq!(rt.trie_map_get(m, cherry), None);
}

#[test]
fn snapshot_agreement_across_backings() {
    let rt = runtime();
    let _g = rt.pause();
    let hash = rt.new_int_hash_map(0);
    let trie = rt.new_int_trie_map();
    for k in 0i64..32 {
        rt.int_map_set(hash, k, rt.new_int_word(k));
        rt.int_map_set(trie, k, rt.new_int_word(k));
    }
    let hash_copy = rt.copy_hash_map(hash);
    let trie_copy = rt.copy_trie_map(trie);
    for k in 0i64..32 {
        assert_eq!(
            rt.int_map_get(hash_copy, k).map(|w| rt.int_word_value(w)),
            rt.int_map_get(hash, k).map(|w| rt.int_word_value(w)),
        );
        assert_eq!(
            rt.int_map_get(trie_copy, k).map(|w| rt.int_word_value(w)),
            rt.int_map_get(trie, k).map(|w| rt.int_word_value(w)),
        );
    }
}
