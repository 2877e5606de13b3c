//! Rope Engine - Immutable Character Sequences
//!
//! Ropes are immutable sequences of Unicode codepoints represented as
//! self-balanced binary trees over flat leaves. Leaves are either
//! fixed-width UCS arrays or variable-width UTF-8/UTF-16 runs with a cached
//! codepoint count; very short Latin-1 runs and single characters are
//! immediate words and never touch the heap.
//!
//! Concatenation, slicing and repetition are sharing operations: they build
//! or reuse nodes instead of copying character data, except for short
//! results which are flattened eagerly. The balance invariant is that the
//! two arms of a concat node differ by at most one level of depth;
//! rebalancing applies the standard rotation repertoire and is conservative
//! (balanced branches are never re-rotated).

pub(crate) mod iter;
pub(crate) mod traverse;

pub use iter::RopeIter;
pub use traverse::RopeChunk;

use std::cmp::Ordering;

use crate::error::ErrorCode;
use crate::heap::cell::{Leaf, UtfLeaf};
use crate::heap::{max_leaf_bytes, short_leaf_bytes, Cell};
use crate::runtime::{Runtime, RuntimeInner};
use crate::unicode::{self, Char, StringFormat, CHAR_INVALID};
use crate::word::{small_string_from_chars, Word, WordKind, WORD_EMPTY_STRING, WORD_NIL};

impl RuntimeInner {
    pub(crate) fn is_rope_impl(&self, w: Word) -> bool {
        self.word_kind_impl(w).contains(WordKind::ROPE)
    }

    /// Number of codepoints in a rope word. Zero for non-ropes.
    pub(crate) fn rope_length_impl(&self, w: Word) -> usize {
        let w = self.strip(w);
        if w.is_char() {
            return 1;
        }
        if w.is_small_string() {
            return w.small_string_len();
        }
        let Some(r) = w.cell_ref() else {
            return 0;
        };
        match self.heap.get(r) {
            Cell::Leaf(leaf) => leaf.len(),
            Cell::UtfLeaf(leaf) => leaf.chars,
            Cell::Subrope { first, last, .. } => last - first + 1,
            Cell::ConcatRope { length, .. } => *length,
            Cell::Custom(payload) => match payload {
                crate::word::custom::CustomPayload::Rope(p) => p.length(),
                _ => 0,
            },
            _ => 0,
        }
    }

    /// Depth of a rope word: leaves are 0, concat nodes cache
    /// `1 + max(leftDepth, rightDepth)`.
    pub(crate) fn rope_depth_impl(&self, w: Word) -> u8 {
        let w = self.strip(w);
        let Some(r) = w.cell_ref() else {
            return 0;
        };
        match self.heap.get(r) {
            Cell::Subrope { depth, .. } | Cell::ConcatRope { depth, .. } => *depth,
            _ => 0,
        }
    }

    /// Left and right arms of a concat node.
    fn rope_arms(&self, w: Word) -> Option<(Word, Word)> {
        let w = self.strip(w);
        match w.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::ConcatRope { left, right, .. }) => Some((*left, *right)),
            _ => None,
        }
    }

    /// Codepoint at `index`, if in range.
    pub(crate) fn rope_at_impl(&self, w: Word, index: usize) -> Option<Char> {
        let mut w = self.strip(w);
        let mut index = index;
        loop {
            if w.is_char() {
                return (index == 0).then(|| w.char_value());
            }
            if w.is_small_string() {
                return (index < w.small_string_len())
                    .then(|| w.small_string_byte(index) as Char);
            }
            let r = w.cell_ref()?;
            match self.heap.get(r) {
                Cell::Leaf(leaf) => {
                    return (index < leaf.len()).then(|| leaf.char_at(index));
                }
                Cell::UtfLeaf(leaf) => {
                    return (index < leaf.chars).then(|| leaf.char_at(index));
                }
                Cell::Subrope {
                    source,
                    first,
                    last,
                    ..
                } => {
                    if index > last - first {
                        return None;
                    }
                    index += first;
                    w = self.strip(*source);
                }
                Cell::ConcatRope {
                    left_len,
                    left,
                    right,
                    length,
                    ..
                } => {
                    if index >= *length {
                        return None;
                    }
                    if index < *left_len {
                        w = self.strip(*left);
                    } else {
                        index -= left_len;
                        w = self.strip(*right);
                    }
                }
                Cell::Custom(crate::word::custom::CustomPayload::Rope(p)) => {
                    return (index < p.length()).then(|| p.char_at(index));
                }
                _ => return None,
            }
        }
    }

    /// Append the codepoints of `w[first..first+count]` to `out`.
    pub(crate) fn push_rope_chars(&self, w: Word, first: usize, count: usize, out: &mut Vec<Char>) {
        if count == 0 {
            return;
        }
        let w = self.strip(w);
        if w.is_char() {
            out.push(w.char_value());
            return;
        }
        if w.is_small_string() {
            for i in first..first + count {
                out.push(w.small_string_byte(i) as Char);
            }
            return;
        }
        let Some(r) = w.cell_ref() else { return };
        match self.heap.get(r) {
            Cell::Leaf(leaf) => {
                for i in first..first + count {
                    out.push(leaf.char_at(i));
                }
            }
            Cell::UtfLeaf(leaf) => match leaf.format {
                StringFormat::Utf8 => {
                    let mut p = unicode::utf8_addr(&leaf.bytes, first, leaf.chars);
                    for _ in 0..count {
                        out.push(unicode::utf8_get(&leaf.bytes, p));
                        p = unicode::utf8_next(&leaf.bytes, p);
                    }
                }
                _ => {
                    let units = unicode::units16(&leaf.bytes);
                    let mut p = unicode::utf16_addr(&units, first, leaf.chars);
                    for _ in 0..count {
                        out.push(unicode::utf16_get(&units, p));
                        p = unicode::utf16_next(&units, p);
                    }
                }
            },
            Cell::Subrope {
                source,
                first: sub_first,
                ..
            } => {
                self.push_rope_chars(*source, sub_first + first, count, out);
            }
            Cell::ConcatRope {
                left_len,
                left,
                right,
                ..
            } => {
                let (left, right, left_len) = (*left, *right, *left_len);
                if first < left_len {
                    let in_left = count.min(left_len - first);
                    self.push_rope_chars(left, first, in_left, out);
                    self.push_rope_chars(right, 0, count - in_left, out);
                } else {
                    self.push_rope_chars(right, first - left_len, count, out);
                }
            }
            Cell::Custom(crate::word::custom::CustomPayload::Rope(p)) => {
                for i in first..first + count {
                    out.push(p.char_at(i));
                }
            }
            _ => {}
        }
    }

    /// Build the flattest representation of a codepoint run: the empty
    /// singleton, a character word, a small string, one leaf, or a concat
    /// chain of maximal leaves.
    pub(crate) fn make_flat_rope(&mut self, chars: &[Char]) -> Word {
        match chars.len() {
            0 => return WORD_EMPTY_STRING,
            1 => return Word::char_word(chars[0]),
            _ => {}
        }
        if let Some(w) = small_string_from_chars(chars) {
            return w;
        }
        let width = chars
            .iter()
            .map(|&c| StringFormat::fixed_for(c).unit_width())
            .max()
            .unwrap() as u8;
        let per_leaf = max_leaf_bytes() / width as usize;
        if chars.len() <= per_leaf {
            return self.alloc(Cell::Leaf(Leaf::from_chars(width, chars)));
        }
        let mut result = WORD_EMPTY_STRING;
        for chunk in chars.chunks(per_leaf) {
            let leaf = self.alloc(Cell::Leaf(Leaf::from_chars(width, chunk)));
            result = self.concat_ropes_impl(result, leaf);
        }
        result
    }

    /// Ingest raw encoded data in any format.
    pub(crate) fn new_rope_impl(&mut self, format: StringFormat, data: &[u8]) -> Word {
        match format {
            StringFormat::Ucs1 | StringFormat::Ucs2 | StringFormat::Ucs4 | StringFormat::Ucs => {
                let width = if format == StringFormat::Ucs {
                    0
                } else {
                    format.unit_width()
                };
                let mut chars = Vec::new();
                if width == 0 {
                    // Adaptive: data is UCS-4, the result uses the smallest
                    // width that fits.
                    for p in (0..data.len()).step_by(4) {
                        chars.push(unicode::char_get(StringFormat::Ucs4, data, p));
                    }
                } else {
                    for p in (0..data.len()).step_by(width) {
                        chars.push(unicode::char_get(format, data, p));
                    }
                }
                self.make_flat_rope(&chars)
            }
            StringFormat::Utf8 => {
                let mut chars = 0usize;
                let mut p = 0usize;
                while p < data.len() {
                    p = unicode::utf8_next(data, p);
                    chars += 1;
                }
                match chars {
                    0 => WORD_EMPTY_STRING,
                    1 => Word::char_word(unicode::utf8_get(data, 0)),
                    _ if data.len() <= max_leaf_bytes() => self.alloc(Cell::UtfLeaf(UtfLeaf {
                        format,
                        bytes: data.to_vec().into_boxed_slice(),
                        chars,
                    })),
                    _ => {
                        // Split at character boundaries into maximal leaves.
                        let mut result = WORD_EMPTY_STRING;
                        let mut begin = 0usize;
                        let mut begin_chars = 0usize;
                        let mut p = 0usize;
                        let mut n = 0usize;
                        while p < data.len() {
                            let next = unicode::utf8_next(data, p);
                            if next - begin > max_leaf_bytes() {
                                let leaf = self.alloc(Cell::UtfLeaf(UtfLeaf {
                                    format,
                                    bytes: data[begin..p].to_vec().into_boxed_slice(),
                                    chars: n - begin_chars,
                                }));
                                result = self.concat_ropes_impl(result, leaf);
                                begin = p;
                                begin_chars = n;
                            }
                            p = next;
                            n += 1;
                        }
                        let leaf = self.alloc(Cell::UtfLeaf(UtfLeaf {
                            format,
                            bytes: data[begin..].to_vec().into_boxed_slice(),
                            chars: n - begin_chars,
                        }));
                        self.concat_ropes_impl(result, leaf)
                    }
                }
            }
            StringFormat::Utf16 => {
                let units = unicode::units16(data);
                let mut chars = Vec::new();
                let mut p = 0usize;
                while p < units.len() {
                    chars.push(unicode::utf16_get(&units, p));
                    p = unicode::utf16_next(&units, p);
                }
                match chars.len() {
                    0 => WORD_EMPTY_STRING,
                    1 => Word::char_word(chars[0]),
                    _ if data.len() <= max_leaf_bytes() => self.alloc(Cell::UtfLeaf(UtfLeaf {
                        format,
                        bytes: data.to_vec().into_boxed_slice(),
                        chars: chars.len(),
                    })),
                    _ => self.make_flat_rope(&chars),
                }
            }
        }
    }

    /// Extract the range `[first, last]` of a rope.
    pub(crate) fn subrope_impl(&mut self, w: Word, first: usize, last: usize) -> Word {
        let w = self.strip(w);
        let length = self.rope_length_impl(w);
        // Empty or inverted range.
        if first >= length || first > last {
            return WORD_EMPTY_STRING;
        }
        let last = last.min(length - 1);
        // Whole range: the source itself.
        if first == 0 && last == length - 1 {
            return w;
        }
        // Single character.
        if first == last {
            return Word::char_word(self.rope_at_impl(w, first).unwrap_or(CHAR_INVALID));
        }
        let count = last - first + 1;
        if w.is_small_string() {
            let chars: Vec<Char> = (first..=last)
                .map(|i| w.small_string_byte(i) as Char)
                .collect();
            return small_string_from_chars(&chars).unwrap_or(WORD_EMPTY_STRING);
        }
        let Some(r) = w.cell_ref() else {
            return WORD_EMPTY_STRING;
        };
        match self.heap.get(r) {
            Cell::Leaf(leaf) => {
                let width = leaf.width as usize;
                if count * width <= short_leaf_bytes() {
                    let mut chars = Vec::with_capacity(count);
                    self.push_rope_chars(w, first, count, &mut chars);
                    self.make_flat_rope(&chars)
                } else {
                    self.alloc(Cell::Subrope {
                        depth: 0,
                        source: w,
                        first,
                        last,
                    })
                }
            }
            Cell::UtfLeaf(_) => {
                let mut chars = Vec::with_capacity(count);
                self.push_rope_chars(w, first, count, &mut chars);
                let max_width = chars
                    .iter()
                    .map(|&c| StringFormat::fixed_for(c).unit_width())
                    .max()
                    .unwrap_or(1);
                if count * max_width <= short_leaf_bytes() {
                    self.make_flat_rope(&chars)
                } else {
                    self.alloc(Cell::Subrope {
                        depth: 0,
                        source: w,
                        first,
                        last,
                    })
                }
            }
            Cell::Subrope {
                source,
                first: sub_first,
                ..
            } => {
                // Subrope of subrope: rebase onto the innermost source.
                let (source, sub_first) = (*source, *sub_first);
                self.subrope_impl(source, sub_first + first, sub_first + last)
            }
            Cell::ConcatRope {
                left_len,
                left,
                right,
                ..
            } => {
                let (left, right, left_len) = (*left, *right, *left_len);
                if last < left_len {
                    self.subrope_impl(left, first, last)
                } else if first >= left_len {
                    self.subrope_impl(right, first - left_len, last - left_len)
                } else {
                    let l = self.subrope_impl(left, first, left_len - 1);
                    let r = self.subrope_impl(right, 0, last - left_len);
                    self.concat_ropes_impl(l, r)
                }
            }
            Cell::Custom(_) => self.alloc(Cell::Subrope {
                depth: 0,
                source: w,
                first,
                last,
            }),
            _ => WORD_EMPTY_STRING,
        }
    }

    /// Concatenate two ropes, producing a balanced result.
    pub(crate) fn concat_ropes_impl(&mut self, left: Word, right: Word) -> Word {
        let left = self.strip(left);
        let right = self.strip(right);
        let left_len = self.rope_length_impl(left);
        let right_len = self.rope_length_impl(right);
        // Neutral elements.
        if left_len == 0 {
            return right;
        }
        if right_len == 0 {
            return left;
        }
        if left_len.checked_add(right_len).is_none() {
            self.value_error(
                ErrorCode::RopeLengthConcat,
                &format!("combined length {left_len} + {right_len} overflows"),
            );
            return WORD_NIL;
        }

        // Adjacent subropes of the same source merge back into the source.
        let adjacent = match (
            left.cell_ref().map(|r| self.heap.get(r)),
            right.cell_ref().map(|r| self.heap.get(r)),
        ) {
            (
                Some(Cell::Subrope {
                    source: s1,
                    first: f1,
                    last: l1,
                    ..
                }),
                Some(Cell::Subrope {
                    source: s2,
                    first: f2,
                    last: l2,
                    ..
                }),
            ) if s1 == s2 && l1 + 1 == *f2 => Some((*s1, *f1, *l2)),
            _ => None,
        };
        if let Some((source, first, last)) = adjacent {
            return self.subrope_impl(source, first, last);
        }

        // Short flat operands merge into one leaf.
        if let Some(merged) = self.try_merge_flat(left, right, left_len, right_len) {
            return merged;
        }

        self.concat_rope_node(left, right)
    }

    /// Merge two short flat ropes into a single leaf, when formats permit.
    fn try_merge_flat(
        &mut self,
        left: Word,
        right: Word,
        left_len: usize,
        right_len: usize,
    ) -> Option<Word> {
        fn flat_width(inner: &RuntimeInner, w: Word) -> Option<usize> {
            if w.is_char() {
                return Some(StringFormat::fixed_for(w.char_value()).unit_width());
            }
            if w.is_small_string() {
                return Some(1);
            }
            match w.cell_ref().map(|r| inner.heap.get(r)) {
                Some(Cell::Leaf(leaf)) => Some(leaf.width as usize),
                _ => None,
            }
        }

        // Identical-format UTF leaves merge by byte concatenation.
        let utf_merge = match (
            left.cell_ref().map(|r| self.heap.get(r)),
            right.cell_ref().map(|r| self.heap.get(r)),
        ) {
            (Some(Cell::UtfLeaf(l1)), Some(Cell::UtfLeaf(l2)))
                if l1.format == l2.format
                    && l1.bytes.len() + l2.bytes.len() <= short_leaf_bytes() =>
            {
                let mut bytes = Vec::with_capacity(l1.bytes.len() + l2.bytes.len());
                bytes.extend_from_slice(&l1.bytes);
                bytes.extend_from_slice(&l2.bytes);
                Some((l1.format, l1.chars + l2.chars, bytes))
            }
            _ => None,
        };
        if let Some((format, chars, bytes)) = utf_merge {
            return Some(self.alloc(Cell::UtfLeaf(UtfLeaf {
                format,
                bytes: bytes.into_boxed_slice(),
                chars,
            })));
        }

        let w1 = flat_width(self, left)?;
        let w2 = flat_width(self, right)?;
        let width = w1.max(w2);
        if (left_len + right_len) * width > short_leaf_bytes() {
            return None;
        }
        let mut chars = Vec::with_capacity(left_len + right_len);
        self.push_rope_chars(left, 0, left_len, &mut chars);
        self.push_rope_chars(right, 0, right_len, &mut chars);
        Some(self.make_flat_rope(&chars))
    }

    /// Concat node constructor with conservative rebalancing.
    fn concat_rope_node(&mut self, left: Word, right: Word) -> Word {
        let left_depth = self.rope_depth_impl(left);
        let right_depth = self.rope_depth_impl(right);
        if left_depth > right_depth + 1 {
            if let Some((ll, lr)) = self.rope_arms(left) {
                if self.rope_depth_impl(ll) >= self.rope_depth_impl(lr) {
                    // Left-left is deepest: single rotation right.
                    let new_right = self.concat_ropes_impl(lr, right);
                    return self.make_concat_rope(ll, new_right);
                } else if let Some((lrl, lrr)) = self.rope_arms(lr) {
                    // Left-right is deepest: double rotation.
                    let new_left = self.concat_ropes_impl(ll, lrl);
                    let new_right = self.concat_ropes_impl(lrr, right);
                    return self.make_concat_rope(new_left, new_right);
                }
            }
        } else if right_depth > left_depth + 1 {
            if let Some((rl, rr)) = self.rope_arms(right) {
                if self.rope_depth_impl(rr) >= self.rope_depth_impl(rl) {
                    // Right-right is deepest: single rotation left.
                    let new_left = self.concat_ropes_impl(left, rl);
                    return self.make_concat_rope(new_left, rr);
                } else if let Some((rll, rlr)) = self.rope_arms(rl) {
                    // Right-left is deepest: double rotation.
                    let new_left = self.concat_ropes_impl(left, rll);
                    let new_right = self.concat_ropes_impl(rlr, rr);
                    return self.make_concat_rope(new_left, new_right);
                }
            }
        }
        self.make_concat_rope(left, right)
    }

    fn make_concat_rope(&mut self, left: Word, right: Word) -> Word {
        let left_len = self.rope_length_impl(left);
        let right_len = self.rope_length_impl(right);
        let depth = 1 + self
            .rope_depth_impl(left)
            .max(self.rope_depth_impl(right));
        self.alloc(Cell::ConcatRope {
            depth,
            length: left_len + right_len,
            left_len,
            left,
            right,
        })
    }

    /// Repeat a rope by binary exponentiation over concatenation.
    pub(crate) fn repeat_rope_impl(&mut self, w: Word, count: usize) -> Word {
        let w = self.strip(w);
        let length = self.rope_length_impl(w);
        if length == 0 || count == 0 {
            return WORD_EMPTY_STRING;
        }
        if count == 1 {
            return w;
        }
        if length.checked_mul(count).is_none() {
            self.value_error(
                ErrorCode::RopeLengthRepeat,
                &format!("length {length} times {count} overflows"),
            );
            return WORD_NIL;
        }
        let mut result = WORD_EMPTY_STRING;
        let mut base = w;
        let mut n = count;
        while n > 0 {
            if n & 1 != 0 {
                result = self.concat_ropes_impl(result, base);
            }
            n >>= 1;
            if n > 0 {
                base = self.concat_ropes_impl(base, base);
            }
        }
        result
    }

    /// Lexicographic comparison over `[start, start+max)`, reporting the
    /// first difference when any.
    pub(crate) fn compare_ropes_impl(
        &self,
        a: Word,
        b: Word,
        start: usize,
        max: usize,
    ) -> (Ordering, Option<(usize, Char, Char)>) {
        let la = self.rope_length_impl(a);
        let lb = self.rope_length_impl(b);
        let mut i = start;
        loop {
            if max != usize::MAX && i >= start.saturating_add(max) {
                return (Ordering::Equal, None);
            }
            let ca = (i < la).then(|| self.rope_at_impl(a, i).unwrap_or(CHAR_INVALID));
            let cb = (i < lb).then(|| self.rope_at_impl(b, i).unwrap_or(CHAR_INVALID));
            match (ca, cb) {
                (None, None) => return (Ordering::Equal, None),
                (None, Some(c2)) => return (Ordering::Less, Some((i, CHAR_INVALID, c2))),
                (Some(c1), None) => return (Ordering::Greater, Some((i, c1, CHAR_INVALID))),
                (Some(c1), Some(c2)) => {
                    if c1 != c2 {
                        return (c1.cmp(&c2), Some((i, c1, c2)));
                    }
                }
            }
            i += 1;
        }
    }
}

impl Runtime {
    /// The empty rope singleton.
    pub fn empty_rope(&self) -> Word {
        WORD_EMPTY_STRING
    }

    /// Create a rope from raw encoded character data.
    pub fn new_rope(&self, format: StringFormat, data: &[u8]) -> Word {
        self.shared.inner.lock().new_rope_impl(format, data)
    }

    /// Create a rope from a string slice, using the smallest fixed width
    /// that fits its content.
    pub fn new_rope_from_string(&self, s: &str) -> Word {
        let chars: Vec<Char> = s.chars().map(|c| c as Char).collect();
        self.shared.inner.lock().make_flat_rope(&chars)
    }

    /// Number of codepoints in a rope; `0` with a typecheck error for
    /// non-ropes.
    pub fn rope_length(&self, w: Word) -> usize {
        let inner = self.shared.inner.lock();
        if !inner.is_rope_impl(w) {
            inner.type_error(ErrorCode::Rope, w);
            return 0;
        }
        inner.rope_length_impl(w)
    }

    /// Depth of a rope's tree representation.
    pub fn rope_depth(&self, w: Word) -> u8 {
        let inner = self.shared.inner.lock();
        if !inner.is_rope_impl(w) {
            inner.type_error(ErrorCode::Rope, w);
            return 0;
        }
        inner.rope_depth_impl(w)
    }

    /// Codepoint at `index`; `CHAR_INVALID` with a `RopeIndex` value error
    /// past the end.
    pub fn rope_at(&self, w: Word, index: usize) -> Char {
        let inner = self.shared.inner.lock();
        if !inner.is_rope_impl(w) {
            inner.type_error(ErrorCode::Rope, w);
            return CHAR_INVALID;
        }
        match inner.rope_at_impl(w, index) {
            Some(c) => c,
            None => {
                inner.value_error(
                    ErrorCode::RopeIndex,
                    &format!("index {index} beyond rope length"),
                );
                CHAR_INVALID
            }
        }
    }

    /// Fixed format of a flat string word; `None` with a typecheck error
    /// for other words.
    pub fn string_word_format(&self, w: Word) -> Option<StringFormat> {
        let inner = self.shared.inner.lock();
        let s = inner.strip(w);
        if let Some(format) = s.immediate_string_format() {
            return Some(format);
        }
        match s.cell_ref().map(|r| inner.heap.get(r)) {
            Some(Cell::Leaf(leaf)) => Some(leaf.format()),
            Some(Cell::UtfLeaf(leaf)) => Some(leaf.format),
            _ => {
                inner.type_error(ErrorCode::String, w);
                None
            }
        }
    }

    /// Extract the range `[first, last]` of a rope. Inverted or
    /// out-of-range starts yield the empty rope; `last` is clamped.
    pub fn subrope(&self, w: Word, first: usize, last: usize) -> Word {
        let mut inner = self.shared.inner.lock();
        if !inner.is_rope_impl(w) {
            inner.type_error(ErrorCode::Rope, w);
            return WORD_EMPTY_STRING;
        }
        inner.subrope_impl(w, first, last)
    }

    /// Concatenate two ropes.
    pub fn concat_ropes(&self, left: Word, right: Word) -> Word {
        let mut inner = self.shared.inner.lock();
        if !inner.is_rope_impl(left) {
            inner.type_error(ErrorCode::Rope, left);
            return WORD_EMPTY_STRING;
        }
        if !inner.is_rope_impl(right) {
            inner.type_error(ErrorCode::Rope, right);
            return WORD_EMPTY_STRING;
        }
        inner.concat_ropes_impl(left, right)
    }

    /// Concatenate a slice of ropes, balanced by halving.
    pub fn concat_ropes_slice(&self, ropes: &[Word]) -> Word {
        match ropes.len() {
            0 => WORD_EMPTY_STRING,
            1 => ropes[0],
            _ => {
                let (a, b) = ropes.split_at(ropes.len() / 2);
                let left = self.concat_ropes_slice(a);
                let right = self.concat_ropes_slice(b);
                self.concat_ropes(left, right)
            }
        }
    }

    /// Repeat `w` `count` times.
    pub fn repeat_rope(&self, w: Word, count: usize) -> Word {
        let mut inner = self.shared.inner.lock();
        if !inner.is_rope_impl(w) {
            inner.type_error(ErrorCode::Rope, w);
            return WORD_EMPTY_STRING;
        }
        inner.repeat_rope_impl(w, count)
    }

    /// Insert `rope` into `into` at `index`. Insertion past the end
    /// appends.
    pub fn rope_insert(&self, into: Word, index: usize, rope: Word) -> Word {
        let mut inner = self.shared.inner.lock();
        if !inner.is_rope_impl(into) {
            inner.type_error(ErrorCode::Rope, into);
            return WORD_EMPTY_STRING;
        }
        if !inner.is_rope_impl(rope) {
            inner.type_error(ErrorCode::Rope, rope);
            return into;
        }
        let length = inner.rope_length_impl(into);
        if index == 0 {
            return inner.concat_ropes_impl(rope, into);
        }
        if index >= length {
            return inner.concat_ropes_impl(into, rope);
        }
        let head = inner.subrope_impl(into, 0, index - 1);
        let tail = inner.subrope_impl(into, index, length - 1);
        let head = inner.concat_ropes_impl(head, rope);
        inner.concat_ropes_impl(head, tail)
    }

    /// Remove the range `[first, last]` from `rope`.
    pub fn rope_remove(&self, rope: Word, first: usize, last: usize) -> Word {
        let mut inner = self.shared.inner.lock();
        if !inner.is_rope_impl(rope) {
            inner.type_error(ErrorCode::Rope, rope);
            return WORD_EMPTY_STRING;
        }
        let length = inner.rope_length_impl(rope);
        if length == 0 || first > last || first >= length {
            return rope;
        }
        let last = last.min(length - 1);
        let head = if first > 0 {
            inner.subrope_impl(rope, 0, first - 1)
        } else {
            WORD_EMPTY_STRING
        };
        let tail = if last < length - 1 {
            inner.subrope_impl(rope, last + 1, length - 1)
        } else {
            WORD_EMPTY_STRING
        };
        inner.concat_ropes_impl(head, tail)
    }

    /// Replace the range `[first, last]` of `rope` with `with`.
    pub fn rope_replace(&self, rope: Word, first: usize, last: usize, with: Word) -> Word {
        let removed = self.rope_remove(rope, first, last);
        self.rope_insert(removed, first, with)
    }

    /// Find codepoint `c` in `w`, scanning `max` characters from `start`
    /// (backward when `reverse`). Returns the match index, if any.
    pub fn rope_find(&self, w: Word, c: Char, start: usize, max: usize, reverse: bool) -> Option<usize> {
        let inner = self.shared.inner.lock();
        if !inner.is_rope_impl(w) {
            inner.type_error(ErrorCode::Rope, w);
            return None;
        }
        let length = inner.rope_length_impl(w);
        if length == 0 {
            return None;
        }
        if reverse {
            let mut i = start.min(length - 1);
            let mut budget = max;
            loop {
                if budget == 0 {
                    return None;
                }
                if inner.rope_at_impl(w, i) == Some(c) {
                    return Some(i);
                }
                if i == 0 {
                    return None;
                }
                i -= 1;
                budget = budget.saturating_sub(1);
            }
        } else {
            let end = length.min(start.saturating_add(max));
            (start..end).find(|&i| inner.rope_at_impl(w, i) == Some(c))
        }
    }

    /// Search for `sub` in `w`, scanning match positions from `start`
    /// (backward when `reverse`), at most `max` of them.
    pub fn rope_search(
        &self,
        w: Word,
        sub: Word,
        start: usize,
        max: usize,
        reverse: bool,
    ) -> Option<usize> {
        let inner = self.shared.inner.lock();
        if !inner.is_rope_impl(w) {
            inner.type_error(ErrorCode::Rope, w);
            return None;
        }
        if !inner.is_rope_impl(sub) {
            inner.type_error(ErrorCode::Rope, sub);
            return None;
        }
        let length = inner.rope_length_impl(w);
        let sub_len = inner.rope_length_impl(sub);
        if sub_len == 0 || sub_len > length {
            return None;
        }
        let matches_at = |i: usize| {
            (0..sub_len).all(|k| inner.rope_at_impl(w, i + k) == inner.rope_at_impl(sub, k))
        };
        if reverse {
            let mut i = start.min(length - sub_len);
            let mut budget = max;
            loop {
                if budget == 0 {
                    return None;
                }
                if matches_at(i) {
                    return Some(i);
                }
                if i == 0 {
                    return None;
                }
                i -= 1;
                budget = budget.saturating_sub(1);
            }
        } else {
            let end = (length - sub_len + 1).min(start.saturating_add(max));
            (start..end).find(|&i| matches_at(i))
        }
    }

    /// Three-way lexicographic comparison of two ropes.
    pub fn compare_ropes(&self, a: Word, b: Word) -> Ordering {
        self.compare_ropes_l(a, b, 0, usize::MAX).0
    }

    /// Comparison over `[start, start+max)`, also reporting the first
    /// differing position and the two codepoints there.
    pub fn compare_ropes_l(
        &self,
        a: Word,
        b: Word,
        start: usize,
        max: usize,
    ) -> (Ordering, Option<(usize, Char, Char)>) {
        let inner = self.shared.inner.lock();
        if !inner.is_rope_impl(a) {
            inner.type_error(ErrorCode::Rope, a);
            return (Ordering::Equal, None);
        }
        if !inner.is_rope_impl(b) {
            inner.type_error(ErrorCode::Rope, b);
            return (Ordering::Equal, None);
        }
        inner.compare_ropes_impl(a, b, start, max)
    }

    /// Produce a copy of `w` in the requested format, substituting
    /// `replacement` for codepoints outside the target's range (dropping
    /// them when the replacement itself does not fit). With `flatten`, the
    /// result is collapsed into contiguous leaves.
    pub fn normalize_rope(
        &self,
        w: Word,
        format: StringFormat,
        replacement: Char,
        flatten: bool,
    ) -> Word {
        let mut inner = self.shared.inner.lock();
        if !inner.is_rope_impl(w) {
            inner.type_error(ErrorCode::Rope, w);
            return WORD_EMPTY_STRING;
        }
        if flatten {
            let length = inner.rope_length_impl(w);
            let mut chars = Vec::with_capacity(length);
            inner.push_rope_chars(w, 0, length, &mut chars);
            inner.normalized_flat(format, replacement, &chars)
        } else {
            inner.normalize_node(w, format, replacement)
        }
    }
}

impl RuntimeInner {
    /// Convert a codepoint run into a flat rope of the target format,
    /// substituting or dropping out-of-range codepoints.
    fn normalized_flat(&mut self, format: StringFormat, replacement: Char, chars: &[Char]) -> Word {
        let target_max = format.max_char();
        let mut converted = Vec::with_capacity(chars.len());
        for &c in chars {
            let ok = match format {
                StringFormat::Utf8 | StringFormat::Utf16 => unicode::is_valid_char(c),
                _ => c <= target_max,
            };
            if ok {
                converted.push(c);
            } else if replacement <= target_max && unicode::is_valid_char(replacement) {
                converted.push(replacement);
            }
        }
        match format {
            StringFormat::Utf8 => {
                let mut bytes = Vec::new();
                for &c in &converted {
                    unicode::utf8_set(&mut bytes, c);
                }
                self.new_rope_impl(StringFormat::Utf8, &bytes)
            }
            StringFormat::Utf16 => {
                let mut units = Vec::new();
                for &c in &converted {
                    unicode::utf16_set(&mut units, c);
                }
                let bytes: Vec<u8> = units.iter().flat_map(|u| u.to_ne_bytes()).collect();
                self.new_rope_impl(StringFormat::Utf16, &bytes)
            }
            StringFormat::Ucs => self.make_flat_rope(&converted),
            _ => self.make_fixed_rope(format, &converted),
        }
    }

    /// Structure-preserving normalization: concat nodes are rebuilt over
    /// their normalized arms, everything else converts flat.
    fn normalize_node(&mut self, w: Word, format: StringFormat, replacement: Char) -> Word {
        let w = self.strip(w);
        let arms = match w.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::ConcatRope { left, right, .. }) => Some((*left, *right)),
            _ => None,
        };
        match arms {
            Some((left, right)) => {
                let left = self.normalize_node(left, format, replacement);
                let right = self.normalize_node(right, format, replacement);
                self.concat_ropes_impl(left, right)
            }
            None => {
                let length = self.rope_length_impl(w);
                let mut chars = Vec::with_capacity(length);
                self.push_rope_chars(w, 0, length, &mut chars);
                self.normalized_flat(format, replacement, &chars)
            }
        }
    }

    /// Flat rope in an exact fixed width (no narrowing).
    pub(crate) fn make_fixed_rope(&mut self, format: StringFormat, chars: &[Char]) -> Word {
        match chars.len() {
            0 => return WORD_EMPTY_STRING,
            1 => return Word::char_word(chars[0]),
            _ => {}
        }
        if format == StringFormat::Ucs1 {
            if let Some(w) = small_string_from_chars(chars) {
                return w;
            }
        }
        let width = format.unit_width() as u8;
        let per_leaf = max_leaf_bytes() / width as usize;
        if chars.len() <= per_leaf {
            return self.alloc(Cell::Leaf(Leaf::from_chars(width, chars)));
        }
        let mut result = WORD_EMPTY_STRING;
        for chunk in chars.chunks(per_leaf) {
            let leaf = self.alloc(Cell::Leaf(Leaf::from_chars(width, chunk)));
            result = self.concat_ropes_impl(result, leaf);
        }
        result
    }
}
