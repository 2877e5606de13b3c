//! Mutable list tests: in-place writes, copy-on-write snapshots, resizing,
//! looping and structural edits.

use std::sync::{Arc, Mutex};

use colibri::{ErrorCode, ErrorLevel, Runtime, ThreadingModel, Word, WordKind, WORD_NIL};

fn runtime() -> Runtime {
    Runtime::init(ThreadingModel::Single)
}

fn ints(rt: &Runtime, range: std::ops::Range<i64>) -> Vec<Word> {
    range.map(|i| rt.new_int_word(i)).collect()
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
fn new_mlist_is_empty() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_mlist();
    assert!(rt.word_type(m).contains(WordKind::MLIST | WordKind::LIST));
    assert_eq!(rt.list_length(m), 0);
}

#[test]
fn set_length_extends_with_nil() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_mlist();
    rt.mlist_set_length(m, 100);
    assert_eq!(rt.list_length(m), 100);
    assert_eq!(rt.list_at(m, 99), WORD_NIL);
}

#[test]
fn set_at_splits_void_runs() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_mlist();
    rt.mlist_set_length(m, 1000);
    let w = rt.new_int_word(7);
    rt.mlist_set_at(m, 500, w);
    assert_eq!(rt.list_length(m), 1000);
    assert_eq!(rt.list_at(m, 499), WORD_NIL);
    assert_eq!(rt.list_at(m, 500), w);
    assert_eq!(rt.list_at(m, 501), WORD_NIL);
}

#[test]
fn set_at_out_of_range_is_checked() {
    let rt = runtime();
    let log = record_errors(&rt);
    let _g = rt.pause();
    let m = rt.new_mlist();
    rt.mlist_set_length(m, 4);
    rt.mlist_set_at(m, 4, rt.new_int_word(1));
    assert_eq!(rt.list_length(m), 4);
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(ErrorLevel::ValueCheck, ErrorCode::ListIndex)]
    );
}

#[test]
fn insert_and_remove() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_mlist();
    let l = rt.new_list(&ints(&rt, 0..8));
    rt.mlist_insert(m, 0, l);
    assert_eq!(rt.list_length(m), 8);

    let mid = rt.new_list(&ints(&rt, 100..102));
    rt.mlist_insert(m, 4, mid);
    assert_eq!(rt.list_length(m), 10);
    assert_eq!(rt.int_word_value(rt.list_at(m, 4)), 100);
    assert_eq!(rt.int_word_value(rt.list_at(m, 6)), 4);

    rt.mlist_remove(m, 4, 5);
    assert_eq!(rt.list_length(m), 8);
    assert_eq!(rt.int_word_value(rt.list_at(m, 4)), 4);

    rt.mlist_replace(m, 0, 3, mid);
    assert_eq!(rt.list_length(m), 6);
    assert_eq!(rt.int_word_value(rt.list_at(m, 0)), 100);
    assert_eq!(rt.int_word_value(rt.list_at(m, 2)), 4);
}

#[test]
fn insert_merges_adjacent_small_mutable_leaves() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_mlist();
    rt.mlist_set_length(m, 1);
    let w = rt.new_int_word(7);
    // The root is now a bare one-element mutable leaf.
    rt.mlist_set_at(m, 0, w);

    let a = rt.new_int_word(8);
    let b = rt.new_int_word(9);
    let tail = rt.new_list(&[a, b]);
    rt.mlist_insert(m, 1, tail);

    // Appending a short leaf merges into one leaf, not a concat node.
    assert_eq!(rt.list_length(m), 3);
    assert_eq!(rt.list_depth(m), 0);
    assert_eq!(rt.list_at(m, 0), w);
    assert_eq!(rt.list_at(m, 1), a);
    assert_eq!(rt.list_at(m, 2), b);

    // The merged leaf stays mutable: writes keep landing in place.
    let c = rt.new_int_word(10);
    rt.mlist_set_at(m, 1, c);
    assert_eq!(rt.list_depth(m), 0);
    assert_eq!(rt.list_at(m, 1), c);
}

#[test]
fn copy_empty_mlist_is_empty_singleton() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_mlist();
    assert_eq!(rt.copy_mlist(m), rt.empty_list());
}

#[test]
fn copy_snapshot_is_isolated_from_writes() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_mlist();
    let l = rt.new_list(&ints(&rt, 0..32));
    rt.mlist_insert(m, 0, l);
    let w = rt.new_int_word(1000);
    rt.mlist_set_at(m, 10, w);

    let snapshot = rt.copy_mlist(m);
    assert_eq!(rt.list_length(snapshot), 32);
    assert_eq!(rt.int_word_value(rt.list_at(snapshot, 10)), 1000);

    // Writes after the copy do not show in the snapshot.
    let w2 = rt.new_int_word(2000);
    rt.mlist_set_at(m, 10, w2);
    rt.mlist_set_at(m, 0, w2);
    assert_eq!(rt.int_word_value(rt.list_at(m, 10)), 2000);
    assert_eq!(rt.int_word_value(rt.list_at(snapshot, 10)), 1000);
    assert_eq!(rt.int_word_value(rt.list_at(snapshot, 0)), 0);
}

#[test]
fn writes_before_and_after_copy_target_same_index() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_mlist();
    rt.mlist_set_length(m, 16);
    let a = rt.new_int_word(1);
    rt.mlist_set_at(m, 3, a);

    let s1 = rt.copy_mlist(m);
    let b = rt.new_int_word(2);
    rt.mlist_set_at(m, 3, b);
    let s2 = rt.copy_mlist(m);

    assert_eq!(rt.list_at(s1, 3), a);
    assert_eq!(rt.list_at(s2, 3), b);
    assert_eq!(rt.list_at(m, 3), b);
}

#[test]
fn truncate_and_regrow() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_mlist();
    let l = rt.new_list(&ints(&rt, 0..16));
    rt.mlist_insert(m, 0, l);
    rt.mlist_set_length(m, 4);
    assert_eq!(rt.list_length(m), 4);
    assert_eq!(rt.int_word_value(rt.list_at(m, 3)), 3);
    rt.mlist_set_length(m, 8);
    assert_eq!(rt.list_length(m), 8);
    assert_eq!(rt.list_at(m, 7), WORD_NIL);
    assert_eq!(rt.int_word_value(rt.list_at(m, 3)), 3);
}

#[test]
fn loop_makes_tail_circular() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_mlist();
    let l = rt.new_list(&ints(&rt, 0..4));
    rt.mlist_insert(m, 0, l);
    rt.mlist_loop(m);
    assert_eq!(rt.list_loop_length(m), 4);
    assert_eq!(rt.int_word_value(rt.list_at(m, 6)), 2);
    // Idempotent.
    rt.mlist_loop(m);
    assert_eq!(rt.list_loop_length(m), 4);
    assert_eq!(rt.list_length(m), 4);
}

#[test]
fn set_at_in_cyclic_tail_normalizes() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_mlist();
    let l = rt.new_list(&ints(&rt, 0..4));
    rt.mlist_insert(m, 0, l);
    rt.mlist_loop(m);
    let w = rt.new_int_word(77);
    rt.mlist_set_at(m, 6, w);
    assert_eq!(rt.list_at(m, 2), w);
    assert_eq!(rt.list_at(m, 6), w);
}

#[test]
fn set_length_unrolls_cyclic_list() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_mlist();
    let l = rt.new_list(&ints(&rt, 0..4));
    rt.mlist_insert(m, 0, l);
    rt.mlist_loop(m);
    rt.mlist_set_length(m, 10);
    assert_eq!(rt.list_length(m), 10);
    assert_eq!(rt.list_loop_length(m), 0);
    let expect = [0i64, 1, 2, 3, 0, 1, 2, 3, 0, 1];
    for (i, &v) in expect.iter().enumerate() {
        assert_eq!(rt.int_word_value(rt.list_at(m, i)), v);
    }
}

#[test]
fn copy_of_mvector_root_freezes_in_place() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_mlist();
    rt.mlist_set_length(m, 4);
    let w = rt.new_int_word(5);
    rt.mlist_set_at(m, 0, w);
    let snapshot = rt.copy_mlist(m);
    assert_eq!(rt.list_length(snapshot), 4);
    assert_eq!(rt.list_at(snapshot, 0), w);
    // Post-copy writes still work on the mutable list.
    let w2 = rt.new_int_word(6);
    rt.mlist_set_at(m, 0, w2);
    assert_eq!(rt.list_at(m, 0), w2);
    assert_eq!(rt.list_at(snapshot, 0), w);
}
