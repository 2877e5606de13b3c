//! Basic word tests: immediates, accessors, synonyms, custom words and
//! collection behavior of the word substrate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use colibri::{
    CustomWord, ErrorCode, ErrorLevel, Runtime, ThreadingModel, Word, WordKind, WORD_FALSE,
    WORD_NIL, WORD_TRUE,
};

fn runtime() -> Runtime {
    Runtime::init(ThreadingModel::Single)
}

/// Install an error handler that records idempotent checks and panics on
/// anything stronger.
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
fn nil_word() {
    let rt = runtime();
    assert!(WORD_NIL.is_nil());
    assert_eq!(rt.word_type(WORD_NIL), WordKind::empty());
}

#[test]
fn bool_words_are_singletons() {
    let rt = runtime();
    assert_eq!(rt.new_bool_word(false), WORD_FALSE);
    assert_eq!(rt.new_bool_word(true), WORD_TRUE);
    assert!(rt.word_type(WORD_TRUE).contains(WordKind::BOOL));
    assert!(rt.bool_word_value(WORD_TRUE));
    assert!(!rt.bool_word_value(WORD_FALSE));
    // Booleans are not nil and not integers.
    assert!(!WORD_FALSE.is_nil());
    assert!(!rt.word_type(WORD_FALSE).contains(WordKind::INT));
}

#[test]
fn immediate_int_identity() {
    let rt = runtime();
    assert_eq!(rt.new_int_word(0), rt.new_int_word(0));
    assert!(rt.word_type(rt.new_int_word(0)).contains(WordKind::INT));
    assert_eq!(rt.int_word_value(rt.new_int_word(0)), 0);

    let w = rt.new_int_word(-123456);
    assert_eq!(rt.int_word_value(w), -123456);
}

#[test]
fn boxed_int_round_trip() {
    let rt = runtime();
    let _g = rt.pause();
    // INTPTR_MIN does not fit the reduced immediate range: boxed words may
    // differ in identity but agree in value.
    let a = rt.new_int_word(i64::MIN);
    let b = rt.new_int_word(i64::MIN);
    assert_eq!(rt.int_word_value(a), i64::MIN);
    assert_eq!(rt.int_word_value(b), i64::MIN);
    assert!(rt.word_type(a).contains(WordKind::INT));
}

#[test]
fn float_words() {
    let rt = runtime();
    let _g = rt.pause();
    for v in [0.0, 1.0, -0.5, 3.25] {
        let w = rt.new_float_word(v);
        assert_eq!(rt.float_word_value(w), v);
        assert!(rt.word_type(w).contains(WordKind::FLOAT));
    }
    // A value with a dense mantissa boxes and still round-trips.
    let v = 0.1f64;
    let w = rt.new_float_word(v);
    assert_eq!(rt.float_word_value(w), v);
}

#[test]
fn char_words() {
    let rt = runtime();
    let w = rt.new_char_word(0x10FFFF);
    assert_eq!(rt.char_word_value(w), 0x10FFFF);
    assert!(rt
        .word_type(w)
        .contains(WordKind::CHAR | WordKind::STRING | WordKind::ROPE));
}

#[test]
fn typecheck_errors_return_defaults() {
    let rt = runtime();
    let log = record_errors(&rt);
    assert_eq!(rt.int_word_value(WORD_TRUE), 0);
    assert!(!rt.bool_word_value(rt.new_int_word(1)));
    assert_eq!(rt.float_word_value(WORD_TRUE), 0.0);
    let recorded = log.lock().unwrap();
    assert_eq!(
        recorded.as_slice(),
        &[
            (ErrorLevel::TypeCheck, ErrorCode::Int),
            (ErrorLevel::TypeCheck, ErrorCode::Bool),
            (ErrorLevel::TypeCheck, ErrorCode::Float),
        ]
    );
}

#[test]
fn synonym_chain_on_heap_word() {
    let rt = runtime();
    let _g = rt.pause();
    let mut word = rt.new_int_word(i64::MAX);
    let syn = rt.new_rope_from_string("9223372036854775807");
    assert!(rt.word_synonym(word).is_nil());
    rt.word_add_synonym(&mut word, syn);
    assert_eq!(rt.word_synonym(word), syn);
    rt.word_clear_synonym(word);
    assert!(rt.word_synonym(word).is_nil());
}

#[test]
fn synonym_wraps_immediate() {
    let rt = runtime();
    let _g = rt.pause();
    let mut word = rt.new_int_word(42);
    let original = word;
    let syn = rt.new_rope_from_string("forty-two");
    rt.word_add_synonym(&mut word, syn);
    // The slot was rewritten to a wrapper that still answers as the value.
    assert_ne!(word, original);
    assert_eq!(rt.int_word_value(word), 42);
    assert_eq!(rt.word_synonym(word), syn);
}

struct Pair {
    first: Word,
    second: Word,
}

impl CustomWord for Pair {
    fn name(&self) -> &str {
        "pair"
    }

    fn children(&mut self, visit: &mut dyn FnMut(&mut Word)) {
        visit(&mut self.first);
        visit(&mut self.second);
    }
}

#[test]
fn custom_word_info() {
    let rt = runtime();
    let _g = rt.pause();
    let first = rt.new_int_word(1);
    let second = rt.new_int_word(2);
    let w = rt.new_custom_word(Box::new(Pair { first, second }));
    assert!(rt.word_type(w).contains(WordKind::CUSTOM));
    let name = rt.custom_word_info(w, |p| p.name().to_string()).unwrap();
    assert_eq!(name, "pair");
}

#[test]
fn custom_word_children_are_rewritten_on_collection() {
    let rt = runtime();
    let guard = rt.pause();
    let child = rt.new_int_word(i64::MAX);
    let w = rt.new_custom_word(Box::new(Pair {
        first: child,
        second: WORD_NIL,
    }));
    let handle = rt.preserve(w);
    drop(guard);

    rt.collect(0);

    let w = handle.get();
    let child = rt
        .custom_word_info(w, |p| {
            let pair = (p as &dyn std::any::Any).downcast_ref::<Pair>().unwrap();
            pair.first
        })
        .unwrap();
    assert_eq!(rt.int_word_value(child), i64::MAX);
}

struct DropCounter {
    drops: Arc<AtomicUsize>,
}

impl CustomWord for DropCounter {}

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn unreachable_custom_word_is_dropped_once() {
    let rt = runtime();
    let drops = Arc::new(AtomicUsize::new(0));
    let guard = rt.pause();
    let _w = rt.new_custom_word(Box::new(DropCounter {
        drops: Arc::clone(&drops),
    }));
    drop(guard);

    rt.collect(0);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    rt.collect(0);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn preserved_custom_word_survives() {
    let rt = runtime();
    let drops = Arc::new(AtomicUsize::new(0));
    let guard = rt.pause();
    let w = rt.new_custom_word(Box::new(DropCounter {
        drops: Arc::clone(&drops),
    }));
    let handle = rt.preserve(w);
    drop(guard);

    rt.collect(0);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
    assert!(rt.word_type(handle.get()).contains(WordKind::CUSTOM));
}

#[test]
fn write_barrier_tracks_old_to_young_store() {
    let rt = runtime();
    let guard = rt.pause();
    let m = rt.new_mvector(4, 4, &[]);
    let handle = rt.preserve(m);
    drop(guard);
    // Promote the vector a couple of generations.
    rt.collect(0);
    rt.collect(1);

    let guard = rt.pause();
    let m = handle.get();
    let young = rt.new_int_word(i64::MAX);
    rt.mvector_set(m, 2, young);
    drop(guard);

    // A young collection must keep the stored element reachable through
    // the remembered parent, without scanning old pages.
    rt.collect(0);
    let m = handle.get();
    assert_eq!(rt.int_word_value(rt.vector_at(m, 2)), i64::MAX);
}

#[test]
fn preserved_rope_tree_survives_collection() {
    let rt = runtime();
    let guard = rt.pause();
    let a = rt.new_rope_from_string("the left half of the rope ");
    let b = rt.new_rope_from_string("and the right half of it");
    let ab = rt.concat_ropes(a, b);
    let expected_len = rt.rope_length(ab);
    let handle = rt.preserve(ab);
    drop(guard);

    rt.collect(0);

    let ab = handle.get();
    assert_eq!(rt.rope_length(ab), expected_len);
    assert_eq!(rt.rope_at(ab, 0), 't' as u32);
    assert_eq!(rt.rope_at(ab, expected_len - 1), 't' as u32);
}

#[test]
fn synonym_survives_collection() {
    let rt = runtime();
    let guard = rt.pause();
    let mut word = rt.new_int_word(i64::MAX);
    let syn = rt.new_rope_from_string("a stringification synonym");
    rt.word_add_synonym(&mut word, syn);
    let handle = rt.preserve(word);
    drop(guard);

    rt.collect(0);

    let word = handle.get();
    let syn = rt.word_synonym(word);
    assert_eq!(rt.rope_length(syn), 25);
}

#[test]
fn async_model_collects_on_resume() {
    let rt = Runtime::init(ThreadingModel::Async);
    let guard = rt.pause();
    let w = rt.new_int_word(i64::MAX);
    let handle = rt.preserve(w);
    drop(guard);
    rt.collect(1);
    assert_eq!(rt.int_word_value(handle.get()), i64::MAX);
    rt.cleanup();
}

#[test]
fn try_pause_nests() {
    let rt = runtime();
    assert!(rt.try_pause_gc());
    rt.pause_gc();
    let w = rt.new_int_word(i64::MAX);
    assert_eq!(rt.int_word_value(w), i64::MAX);
    rt.resume_gc();
    rt.resume_gc();
}
