//! String buffer tests: appending, reservation, freezing shapes and
//! format restrictions.

use std::sync::{Arc, Mutex};

use colibri::{ErrorCode, ErrorLevel, Runtime, StringFormat, ThreadingModel, WordKind};

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
fn empty_buffer_freezes_to_empty_rope() {
    let rt = runtime();
    let _g = rt.pause();
    let sb = rt.new_string_buffer(0, StringFormat::Ucs1);
    assert!(rt.word_type(sb).contains(WordKind::STRBUF));
    assert_eq!(rt.string_buffer_length(sb), 0);
    assert_eq!(rt.string_buffer_freeze(sb), rt.empty_rope());
}

#[test]
fn append_chars_and_freeze() {
    let rt = runtime();
    let _g = rt.pause();
    let sb = rt.new_string_buffer(0, StringFormat::Ucs1);
    for c in "hello colibri".chars() {
        assert!(rt.string_buffer_append_char(sb, c as u32));
    }
    assert_eq!(rt.string_buffer_length(sb), 13);
    let rope = rt.string_buffer_freeze(sb);
    assert_eq!(rt.rope_length(rope), 13);
    assert_eq!(rt.rope_at(rope, 6), 'c' as u32);
    // Freezing reset the buffer.
    assert_eq!(rt.string_buffer_length(sb), 0);
}

#[test]
fn append_char_outside_format_fails() {
    let rt = runtime();
    let _g = rt.pause();
    let sb = rt.new_string_buffer(0, StringFormat::Ucs1);
    assert!(rt.string_buffer_append_char(sb, 0xFF));
    assert!(!rt.string_buffer_append_char(sb, 0x20AC));
    assert_eq!(rt.string_buffer_length(sb), 1);
}

#[test]
fn small_capacity_flushes_through_accumulator() {
    let rt = runtime();
    let _g = rt.pause();
    let sb = rt.new_string_buffer(4, StringFormat::Ucs1);
    assert_eq!(rt.string_buffer_max_length(sb), 4);
    for c in "abcdefghij".chars() {
        assert!(rt.string_buffer_append_char(sb, c as u32));
    }
    assert_eq!(rt.string_buffer_length(sb), 10);
    let rope = rt.string_buffer_value(sb);
    assert_eq!(rt.rope_length(rope), 10);
    for (i, c) in "abcdefghij".chars().enumerate() {
        assert_eq!(rt.rope_at(rope, i), c as u32);
    }
}

#[test]
fn append_rope_joins_accumulator() {
    let rt = runtime();
    let _g = rt.pause();
    let sb = rt.new_string_buffer(16, StringFormat::Ucs1);
    assert!(rt.string_buffer_append_char(sb, 'x' as u32));
    let long = rt.new_rope_from_string("a somewhat longer rope value");
    assert!(rt.string_buffer_append_rope(sb, long));
    assert_eq!(rt.string_buffer_length(sb), 1 + 28);
    let rope = rt.string_buffer_value(sb);
    assert_eq!(rt.rope_at(rope, 0), 'x' as u32);
    assert_eq!(rt.rope_at(rope, 1), 'a' as u32);
    assert_eq!(rt.rope_length(rope), 29);
}

#[test]
fn append_short_rope_copies_into_leaf() {
    let rt = runtime();
    let _g = rt.pause();
    let sb = rt.new_string_buffer(64, StringFormat::Ucs1);
    let short = rt.new_rope_from_string("abc");
    assert!(rt.string_buffer_append_rope(sb, short));
    assert_eq!(rt.string_buffer_length(sb), 3);
    let rope = rt.string_buffer_value(sb);
    assert_eq!(rt.rope_length(rope), 3);
}

#[test]
fn append_sequence_between_iterators() {
    let rt = runtime();
    let _g = rt.pause();
    let rope = rt.new_rope_from_string("0123456789");
    let begin = rt.rope_iter_begin(rope, 2);
    let end = rt.rope_iter_begin(rope, 7);
    let sb = rt.new_string_buffer(0, StringFormat::Ucs1);
    assert!(rt.string_buffer_append_sequence(sb, &begin, &end));
    let out = rt.string_buffer_value(sb);
    assert_eq!(rt.rope_length(out), 5);
    assert_eq!(rt.rope_at(out, 0), '2' as u32);
    assert_eq!(rt.rope_at(out, 4), '6' as u32);
}

#[test]
fn reserve_and_release() {
    let rt = runtime();
    let _g = rt.pause();
    let sb = rt.new_string_buffer(32, StringFormat::Ucs1);
    assert!(rt.string_buffer_reserve(sb, 3, |data| {
        data.copy_from_slice(b"xyz");
    }));
    assert_eq!(rt.string_buffer_length(sb), 3);
    rt.string_buffer_release(sb, 1);
    assert_eq!(rt.string_buffer_length(sb), 2);
    let rope = rt.string_buffer_value(sb);
    assert_eq!(rt.rope_length(rope), 2);
    assert_eq!(rt.rope_at(rope, 1), 'y' as u32);

    // Reservations beyond the capacity fail.
    assert!(!rt.string_buffer_reserve(sb, 33, |_| {}));
}

#[test]
fn reset_drops_content() {
    let rt = runtime();
    let _g = rt.pause();
    let sb = rt.new_string_buffer(0, StringFormat::Ucs1);
    for c in "some content".chars() {
        rt.string_buffer_append_char(sb, c as u32);
    }
    rt.string_buffer_reset(sb);
    assert_eq!(rt.string_buffer_length(sb), 0);
    assert_eq!(rt.string_buffer_value(sb), rt.empty_rope());
}

#[test]
fn utf_formats_are_rejected_at_creation() {
    let rt = runtime();
    let log = record_errors(&rt);
    let _g = rt.pause();
    let sb = rt.new_string_buffer(0, StringFormat::Utf8);
    // The buffer falls back to a usable fixed-width format.
    assert_eq!(rt.string_buffer_format(sb), Some(StringFormat::Ucs4));
    assert!(rt.string_buffer_append_char(sb, 0x1F600));
    assert_eq!(rt.string_buffer_length(sb), 1);
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[(ErrorLevel::ValueCheck, ErrorCode::StrBufFormat)]
    );
}

#[test]
fn wide_format_buffer_round_trip() {
    let rt = runtime();
    let _g = rt.pause();
    let sb = rt.new_string_buffer(0, StringFormat::Ucs4);
    let chars = [0x41u32, 0x20AC, 0x1F600, 0x10FFFF];
    for &c in &chars {
        assert!(rt.string_buffer_append_char(sb, c));
    }
    let rope = rt.string_buffer_freeze(sb);
    assert_eq!(rt.rope_length(rope), 4);
    for (i, &c) in chars.iter().enumerate() {
        assert_eq!(rt.rope_at(rope, i), c);
    }
}
