//! String format tests: UCS/UTF ingestion, width tables, normalization.

use colibri::unicode::{utf16_width, utf8_width};
use colibri::{Runtime, StringFormat, ThreadingModel};

fn runtime() -> Runtime {
    Runtime::init(ThreadingModel::Single)
}

#[test]
fn width_tables_match_validity() {
    for c in [0u32, 0x41, 0x7F, 0x80, 0x7FF, 0x800, 0xD7FF, 0xE000, 0xFFFF, 0x10000, 0x10FFFF] {
        assert!(utf8_width(c) > 0, "codepoint {c:#x}");
        assert!(utf16_width(c) > 0, "codepoint {c:#x}");
    }
    for c in [0xD800u32, 0xDC00, 0xDFFF, 0x110000] {
        assert_eq!(utf8_width(c), 0, "codepoint {c:#x}");
        assert_eq!(utf16_width(c), 0, "codepoint {c:#x}");
    }
}

#[test]
fn new_rope_ucs_formats() {
    let rt = runtime();
    let _g = rt.pause();

    let ucs1 = rt.new_rope(StringFormat::Ucs1, b"hello colibri rope engine");
    assert_eq!(rt.rope_length(ucs1), 25);
    assert_eq!(rt.rope_at(ucs1, 6), 'c' as u32);

    let chars: Vec<u16> = "ascii and \u{20AC}".encode_utf16().collect();
    let bytes: Vec<u8> = chars.iter().flat_map(|u| u.to_ne_bytes()).collect();
    let ucs2 = rt.new_rope(StringFormat::Ucs2, &bytes);
    assert_eq!(rt.rope_length(ucs2), 11);
    assert_eq!(rt.rope_at(ucs2, 10), 0x20AC);

    let cps: Vec<u32> = vec![0x41, 0x1F600, 0x10FFFF];
    let bytes: Vec<u8> = cps.iter().flat_map(|c| c.to_ne_bytes()).collect();
    let ucs4 = rt.new_rope(StringFormat::Ucs4, &bytes);
    assert_eq!(rt.rope_length(ucs4), 3);
    assert_eq!(rt.rope_at(ucs4, 1), 0x1F600);
}

#[test]
fn new_rope_utf8() {
    let rt = runtime();
    let _g = rt.pause();
    let text = "na\u{EF}ve \u{1F600} string with some length to it";
    let r = rt.new_rope(StringFormat::Utf8, text.as_bytes());
    assert_eq!(rt.rope_length(r), text.chars().count());
    let chars: Vec<u32> = text.chars().map(|c| c as u32).collect();
    for (i, &c) in chars.iter().enumerate() {
        assert_eq!(rt.rope_at(r, i), c, "index {i}");
    }
    assert_eq!(rt.string_word_format(r), Some(StringFormat::Utf8));
}

#[test]
fn new_rope_utf16() {
    let rt = runtime();
    let _g = rt.pause();
    let text = "surrogate pair: \u{10348} end";
    let units: Vec<u16> = text.encode_utf16().collect();
    let bytes: Vec<u8> = units.iter().flat_map(|u| u.to_ne_bytes()).collect();
    let r = rt.new_rope(StringFormat::Utf16, &bytes);
    assert_eq!(rt.rope_length(r), text.chars().count());
    assert_eq!(rt.rope_at(r, 16), 0x10348);
}

#[test]
fn adaptive_width_from_string() {
    let rt = runtime();
    let _g = rt.pause();
    let latin = rt.new_rope_from_string("only latin-1 text in this rope!!");
    assert_eq!(rt.string_word_format(latin), Some(StringFormat::Ucs1));

    let wide = rt.new_rope_from_string("wide \u{20AC} char in this rope here");
    assert_eq!(rt.string_word_format(wide), Some(StringFormat::Ucs2));

    let wider = rt.new_rope_from_string("astral \u{1F600} char in this rope!");
    assert_eq!(rt.string_word_format(wider), Some(StringFormat::Ucs4));
}

#[test]
fn normalize_narrows_with_replacement() {
    let rt = runtime();
    let _g = rt.pause();
    let mixed = rt.new_rope_from_string("abc\u{20AC}def and a longer tail");
    let narrowed = rt.normalize_rope(mixed, StringFormat::Ucs1, '?' as u32, true);
    assert_eq!(rt.rope_length(narrowed), rt.rope_length(mixed));
    assert_eq!(rt.rope_at(narrowed, 3), '?' as u32);
    assert_eq!(rt.rope_at(narrowed, 4), 'd' as u32);
}

#[test]
fn normalize_drops_without_replacement() {
    let rt = runtime();
    let _g = rt.pause();
    let mixed = rt.new_rope_from_string("ab\u{20AC}cd plus padding characters");
    let narrowed = rt.normalize_rope(mixed, StringFormat::Ucs1, colibri::CHAR_INVALID, true);
    assert_eq!(rt.rope_length(narrowed), rt.rope_length(mixed) - 1);
    assert_eq!(rt.rope_at(narrowed, 2), 'c' as u32);
}

#[test]
fn normalize_width_round_trip() {
    let rt = runtime();
    let _g = rt.pause();
    let source = rt.new_rope_from_string("mixed \u{20AC}\u{1F600} content rope data");
    // Narrowing directly agrees with widening first.
    let direct = rt.normalize_rope(source, StringFormat::Ucs2, '?' as u32, true);
    let widened = rt.normalize_rope(source, StringFormat::Ucs4, '?' as u32, true);
    let via_wide = rt.normalize_rope(widened, StringFormat::Ucs2, '?' as u32, true);
    assert_eq!(
        rt.compare_ropes(direct, via_wide),
        std::cmp::Ordering::Equal
    );
}

#[test]
fn normalize_flatten_collapses_tree() {
    let rt = runtime();
    let _g = rt.pause();
    let a = rt.new_rope_from_string("left part of the rope tree, ");
    let b = rt.new_rope_from_string("right part of the rope tree");
    let ab = rt.concat_ropes(a, b);
    let flat = rt.normalize_rope(ab, StringFormat::Ucs1, '?' as u32, true);
    assert_eq!(rt.rope_depth(flat), 0);
    assert_eq!(rt.compare_ropes(flat, ab), std::cmp::Ordering::Equal);
}

#[test]
fn normalize_to_utf8_and_back() {
    let rt = runtime();
    let _g = rt.pause();
    let source = rt.new_rope_from_string("utf length test \u{10348}\u{20AC} tail");
    let utf8 = rt.normalize_rope(source, StringFormat::Utf8, '?' as u32, true);
    assert_eq!(rt.rope_length(utf8), rt.rope_length(source));
    let back = rt.normalize_rope(utf8, StringFormat::Ucs4, '?' as u32, true);
    assert_eq!(rt.compare_ropes(source, back), std::cmp::Ordering::Equal);
}
