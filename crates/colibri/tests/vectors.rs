//! Vector tests: immutable vectors and capacity-bounded mutable vectors.

use std::sync::{Arc, Mutex};

use colibri::{ErrorCode, ErrorLevel, Runtime, ThreadingModel, WordKind, WORD_NIL};

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
fn new_vector_round_trip() {
    let rt = runtime();
    let _g = rt.pause();
    let elems: Vec<_> = (0..10).map(|i| rt.new_int_word(i)).collect();
    let v = rt.new_vector(&elems);
    assert!(rt.word_type(v).contains(WordKind::VECTOR | WordKind::LIST));
    assert_eq!(rt.vector_length(v), 10);
    assert_eq!(rt.vector_elements(v), elems);
    assert_eq!(rt.vector_at(v, 3), elems[3]);
}

#[test]
fn vector_max_length_is_bounded() {
    let rt = runtime();
    assert!(rt.max_vector_length() > 0);
    assert_eq!(rt.max_vector_length(), rt.max_mvector_length());

    let log = record_errors(&rt);
    let _g = rt.pause();
    let too_long = vec![WORD_NIL; rt.max_vector_length() + 1];
    let v = rt.new_vector(&too_long);
    assert!(v.is_nil());
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(ErrorLevel::ValueCheck, ErrorCode::VectorLength)]
    );
}

#[test]
fn mvector_length_within_capacity() {
    let rt = runtime();
    let _g = rt.pause();
    let one = rt.new_int_word(1);
    let m = rt.new_mvector(8, 2, &[one, one]);
    assert!(rt
        .word_type(m)
        .contains(WordKind::MVECTOR | WordKind::VECTOR | WordKind::LIST));
    assert_eq!(rt.mvector_capacity(m), 8);
    assert_eq!(rt.vector_length(m), 2);

    rt.mvector_set_length(m, 5);
    assert_eq!(rt.vector_length(m), 5);
    // New elements are nil.
    assert_eq!(rt.vector_at(m, 4), WORD_NIL);
    assert_eq!(rt.vector_at(m, 0), one);
}

#[test]
fn mvector_truncate_clears_tail() {
    let rt = runtime();
    let _g = rt.pause();
    let one = rt.new_int_word(1);
    let m = rt.new_mvector(4, 4, &[one, one, one, one]);
    rt.mvector_set_length(m, 1);
    rt.mvector_set_length(m, 4);
    // The re-exposed suffix was nil-filled on truncation.
    assert_eq!(rt.vector_at(m, 1), WORD_NIL);
    assert_eq!(rt.vector_at(m, 0), one);
}

#[test]
fn mvector_set_length_beyond_capacity_fails() {
    let rt = runtime();
    let log = record_errors(&rt);
    let _g = rt.pause();
    let m = rt.new_mvector(4, 0, &[]);
    rt.mvector_set_length(m, 5);
    assert_eq!(rt.vector_length(m), 0);
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(ErrorLevel::ValueCheck, ErrorCode::VectorLength)]
    );
}

#[test]
fn mvector_set_elements() {
    let rt = runtime();
    let _g = rt.pause();
    let m = rt.new_mvector(4, 4, &[]);
    let w = rt.new_int_word(99);
    rt.mvector_set(m, 2, w);
    assert_eq!(rt.vector_at(m, 2), w);
}

#[test]
fn mvector_freeze_in_place() {
    let rt = runtime();
    let _g = rt.pause();
    let one = rt.new_int_word(1);
    let m = rt.new_mvector(8, 3, &[one, one, one]);
    rt.mvector_freeze(m);
    // Same word, now immutable.
    assert!(rt.word_type(m).contains(WordKind::VECTOR));
    assert!(!rt.word_type(m).contains(WordKind::MVECTOR));
    assert_eq!(rt.vector_length(m), 3);
    assert_eq!(rt.vector_at(m, 1), one);
    // Freezing again is a no-op.
    rt.mvector_freeze(m);
    assert_eq!(rt.vector_length(m), 3);
}

#[test]
fn vector_ops_typecheck() {
    let rt = runtime();
    let log = record_errors(&rt);
    let not_vector = rt.new_int_word(5);
    assert_eq!(rt.vector_length(not_vector), 0);
    assert_eq!(rt.mvector_capacity(not_vector), 0);
    let recorded = log.lock().unwrap();
    assert_eq!(
        recorded.as_slice(),
        &[
            (ErrorLevel::TypeCheck, ErrorCode::Vector),
            (ErrorLevel::TypeCheck, ErrorCode::MVector),
        ]
    );
}
