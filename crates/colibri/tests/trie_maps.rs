//! Trie map tests: crit-bit structure, sorted bidirectional iteration and
//! copy-on-write snapshots.

use colibri::{Runtime, ThreadingModel, WordKind, WORD_NIL, WORD_TRUE};

fn runtime() -> Runtime {
    Runtime::init(ThreadingModel::Single)
}

#[test]
fn string_trie_set_get_unset() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_string_trie_map();
    assert!(rt.word_type(m).contains(WordKind::MAP | WordKind::TRIEMAP));

    let key = rt.new_rope_from_string("carrot");
    let value = rt.new_int_word(5);
    assert!(rt.trie_map_set(m, key, value));
    assert_eq!(rt.map_size(m), 1);

    let same = rt.new_rope_from_string("carrot");
    assert_eq!(rt.trie_map_get(m, same), Some(value));

    let value2 = rt.new_int_word(6);
    assert!(!rt.trie_map_set(m, same, value2));
    assert_eq!(rt.map_size(m), 1);
    assert_eq!(rt.trie_map_get(m, key), Some(value2));

    assert!(rt.trie_map_unset(m, key));
    assert_eq!(rt.map_size(m), 0);
    assert_eq!(rt.trie_map_get(m, key), None);
}

#[test]
fn int_trie_ordered_iteration() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_int_trie_map();
    for k in [3i64, 1, 4, 1, 5, 9, 2, 6] {
        rt.int_trie_map_set(m, k, rt.new_int_word(k * 100));
    }
    assert_eq!(rt.map_size(m), 7);

    let mut it = rt.map_iter_begin(m);
    let mut keys = Vec::new();
    while !it.at_end() {
        let (k, v) = it.int_get(&rt).unwrap();
        assert_eq!(rt.int_word_value(v), k * 100);
        keys.push(k);
        it.next(&rt);
    }
    assert_eq!(keys, vec![1, 2, 3, 4, 5, 6, 9]);

    // Backward from the last entry.
    let mut it = rt.trie_map_iter_last(m);
    let mut back = Vec::new();
    while !it.at_end() {
        back.push(it.int_get(&rt).unwrap().0);
        it.previous(&rt);
    }
    assert_eq!(back, vec![9, 6, 5, 4, 3, 2, 1]);
}

#[test]
fn negative_ints_sort_numerically() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_int_trie_map();
    for k in [5i64, -3, 0, -40, 17, i64::MIN, i64::MAX] {
        rt.int_trie_map_set(m, k, WORD_TRUE);
    }
    let mut it = rt.map_iter_begin(m);
    let mut keys = Vec::new();
    while !it.at_end() {
        keys.push(it.int_get(&rt).unwrap().0);
        it.next(&rt);
    }
    assert_eq!(keys, vec![i64::MIN, -40, -3, 0, 5, 17, i64::MAX]);
}

#[test]
fn string_keys_sort_lexicographically() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_string_trie_map();
    let words = ["banana", "apple", "applet", "app", "cherry", "apricot"];
    for w in words {
        let key = rt.new_rope_from_string(w);
        rt.trie_map_set(m, key, WORD_TRUE);
    }
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
    // A proper prefix sorts before its extensions.
    assert_eq!(
        keys,
        vec!["app", "apple", "applet", "apricot", "banana", "cherry"]
    );
}

#[test]
fn unset_collapses_branches() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_int_trie_map();
    for k in 0i64..32 {
        rt.int_trie_map_set(m, k, rt.new_int_word(k));
    }
    for k in (0i64..32).step_by(2) {
        assert!(rt.int_trie_map_unset(m, k));
    }
    assert_eq!(rt.map_size(m), 16);
    for k in 0i64..32 {
        let got = rt.int_trie_map_get(m, k);
        if k % 2 == 0 {
            assert_eq!(got, None);
        } else {
            assert_eq!(rt.int_word_value(got.unwrap()), k);
        }
    }
    // Order is preserved after deletions.
    let mut it = rt.map_iter_begin(m);
    let mut keys = Vec::new();
    while !it.at_end() {
        keys.push(it.int_get(&rt).unwrap().0);
        it.next(&rt);
    }
    assert_eq!(keys, (0i64..32).filter(|k| k % 2 == 1).collect::<Vec<_>>());
}

#[test]
fn copy_is_isolated_from_writes() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_int_trie_map();
    for k in 0i64..16 {
        rt.int_trie_map_set(m, k, rt.new_int_word(k));
    }
    let c = rt.copy_trie_map(m);
    assert_eq!(rt.map_size(c), 16);

    let fresh = rt.new_int_word(-5);
    rt.int_trie_map_set(m, 3, fresh);
    assert_eq!(rt.int_word_value(rt.int_trie_map_get(c, 3).unwrap()), 3);
    assert_eq!(rt.int_trie_map_get(m, 3), Some(fresh));

    rt.int_trie_map_set(c, 100, fresh);
    assert_eq!(rt.int_trie_map_get(m, 100), None);
    assert_eq!(rt.int_trie_map_get(c, 100), Some(fresh));

    assert!(rt.int_trie_map_unset(c, 0));
    assert_eq!(rt.int_word_value(rt.int_trie_map_get(m, 0).unwrap()), 0);
}

#[test]
fn iter_find_creates_in_order() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_int_trie_map();
    rt.int_trie_map_set(m, 10, WORD_TRUE);
    rt.int_trie_map_set(m, 30, WORD_TRUE);

    let mut created = false;
    let it = rt.int_map_iter_find(m, 20, Some(&mut created));
    assert!(created);
    assert_eq!(it.value(&rt), WORD_NIL);
    assert_eq!(rt.map_size(m), 3);

    let mut it = rt.map_iter_begin(m);
    let mut keys = Vec::new();
    while !it.at_end() {
        keys.push(it.int_get(&rt).unwrap().0);
        it.next(&rt);
    }
    assert_eq!(keys, vec![10, 20, 30]);
}

#[test]
fn single_entry_iteration() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_string_trie_map();
    let key = rt.new_rope_from_string("only");
    rt.trie_map_set(m, key, WORD_TRUE);

    let mut it = rt.map_iter_begin(m);
    assert!(!it.at_end());
    it.next(&rt);
    assert!(it.at_end());

    let mut it = rt.trie_map_iter_last(m);
    assert!(!it.at_end());
    it.previous(&rt);
    assert!(it.at_end());
}
