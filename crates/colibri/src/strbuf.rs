//! String Buffers
//!
//! A string buffer accumulates characters into a fixed-width open leaf;
//! when the leaf fills up (or a whole rope is appended) the leaf is
//! committed onto an internal accumulator rope and a fresh leaf starts.
//! Freezing emits the accumulated rope, which may be a single leaf, the
//! accumulator verbatim, or a concat of both; an empty buffer yields the
//! empty rope singleton.
//!
//! Only fixed-width formats back a buffer: variable-width targets cannot
//! take random-position writes, so UTF-8 and UTF-16 are rejected at
//! creation with a `StrBufFormat` value error and the buffer falls back to
//! UCS-4.

use crate::error::ErrorCode;
use crate::heap::cell::StrBuf;
use crate::heap::{max_strbuf_length, Cell};
use crate::rope::RopeIter;
use crate::runtime::{Runtime, RuntimeInner};
use crate::unicode::{self, Char, StringFormat};
use crate::word::{Word, WordKind, WORD_EMPTY_STRING};

impl RuntimeInner {
    fn strbuf_ref(&self, w: Word) -> Option<crate::heap::CellRef> {
        let s = self.strip(w);
        let r = s.cell_ref()?;
        matches!(self.heap.get(r), Cell::StrBuf(_)).then_some(r)
    }

    /// Commit the open leaf onto the accumulator rope.
    fn strbuf_flush(&mut self, r: crate::heap::CellRef) {
        let (format, buffer, rope) = match self.heap.get_mut(r) {
            Cell::StrBuf(sb) => {
                if sb.buffer.is_empty() {
                    return;
                }
                (sb.format, std::mem::take(&mut sb.buffer), sb.rope)
            }
            _ => return,
        };
        let mut chars = Vec::with_capacity(buffer.len() / format.unit_width());
        let width = format.unit_width();
        for p in (0..buffer.len()).step_by(width) {
            chars.push(unicode::char_get(
                match format {
                    StringFormat::Ucs => StringFormat::Ucs4,
                    f => f,
                },
                &buffer,
                p,
            ));
        }
        let leaf = self.make_flat_rope(&chars);
        let new_rope = self.concat_ropes_impl(rope, leaf);
        let parent = Word::from_cell_ref(r);
        if let Cell::StrBuf(sb) = self.heap.get_mut(r) {
            sb.rope = new_rope;
            sb.rope_len += chars.len();
        }
        self.barrier(parent, new_rope);
    }
}

impl Runtime {
    /// Largest string buffer capacity for `format`.
    pub fn max_string_buffer_length(&self, format: StringFormat) -> usize {
        max_strbuf_length(format.unit_width())
    }

    /// Create a string buffer of the given capacity (clamped to the format
    /// maximum; `0` picks a default). UTF formats are rejected with a
    /// `StrBufFormat` value error and fall back to UCS-4.
    pub fn new_string_buffer(&self, max_length: usize, format: StringFormat) -> Word {
        let mut inner = self.shared.inner.lock();
        let format = if format.is_variable_width() {
            inner.value_error(
                ErrorCode::StrBufFormat,
                "variable-width formats cannot back a string buffer",
            );
            StringFormat::Ucs4
        } else {
            format
        };
        let cap = max_strbuf_length(format.unit_width());
        let max_length = match max_length {
            0 => cap,
            n => n.min(cap),
        };
        inner.alloc(Cell::StrBuf(StrBuf {
            format,
            max_length,
            rope: WORD_EMPTY_STRING,
            rope_len: 0,
            buffer: Vec::new(),
        }))
    }

    /// Backing format of a string buffer.
    pub fn string_buffer_format(&self, w: Word) -> Option<StringFormat> {
        let inner = self.shared.inner.lock();
        let Some(r) = inner.strbuf_ref(w) else {
            inner.type_error(ErrorCode::StrBuf, w);
            return None;
        };
        match inner.heap.get(r) {
            Cell::StrBuf(sb) => Some(sb.format),
            _ => None,
        }
    }

    /// Open-leaf capacity of a string buffer, in codepoints.
    pub fn string_buffer_max_length(&self, w: Word) -> usize {
        let inner = self.shared.inner.lock();
        let Some(r) = inner.strbuf_ref(w) else {
            inner.type_error(ErrorCode::StrBuf, w);
            return 0;
        };
        match inner.heap.get(r) {
            Cell::StrBuf(sb) => sb.max_length,
            _ => 0,
        }
    }

    /// Accumulated length of a string buffer, in codepoints.
    pub fn string_buffer_length(&self, w: Word) -> usize {
        let inner = self.shared.inner.lock();
        let Some(r) = inner.strbuf_ref(w) else {
            inner.type_error(ErrorCode::StrBuf, w);
            return 0;
        };
        match inner.heap.get(r) {
            Cell::StrBuf(sb) => sb.total_len(),
            _ => 0,
        }
    }

    /// Commit the open leaf and return the accumulated rope. The buffer
    /// stays usable and keeps its content.
    pub fn string_buffer_value(&self, w: Word) -> Word {
        let mut inner = self.shared.inner.lock();
        let Some(r) = inner.strbuf_ref(w) else {
            inner.type_error(ErrorCode::StrBuf, w);
            return WORD_EMPTY_STRING;
        };
        inner.strbuf_flush(r);
        match inner.heap.get(r) {
            Cell::StrBuf(sb) => sb.rope,
            _ => WORD_EMPTY_STRING,
        }
    }

    /// Append one character. Returns whether the character fit the
    /// buffer's format.
    pub fn string_buffer_append_char(&self, w: Word, c: Char) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(r) = inner.strbuf_ref(w) else {
            inner.type_error(ErrorCode::StrBuf, w);
            return false;
        };
        inner.strbuf_append_char(r, c)
    }

    /// Append a rope. Short ropes copy into the open leaf; longer ones
    /// commit the leaf and join the accumulator directly. Returns whether
    /// every character was appended.
    pub fn string_buffer_append_rope(&self, w: Word, rope: Word) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(r) = inner.strbuf_ref(w) else {
            inner.type_error(ErrorCode::StrBuf, w);
            return false;
        };
        if !inner.is_rope_impl(rope) {
            inner.type_error(ErrorCode::Rope, rope);
            return false;
        }
        let length = inner.rope_length_impl(rope);
        if length == 0 {
            return true;
        }
        let max_length = match inner.heap.get(r) {
            Cell::StrBuf(sb) => sb.max_length,
            _ => return false,
        };
        if length <= max_length / 2 {
            let mut chars = Vec::with_capacity(length);
            inner.push_rope_chars(rope, 0, length, &mut chars);
            let mut all = true;
            for c in chars {
                all &= inner.strbuf_append_char(r, c);
            }
            return all;
        }
        inner.strbuf_flush(r);
        let acc = match inner.heap.get(r) {
            Cell::StrBuf(sb) => sb.rope,
            _ => return false,
        };
        let joined = inner.concat_ropes_impl(acc, rope);
        let parent = inner.strip(w);
        if let Cell::StrBuf(sb) = inner.heap.get_mut(r) {
            sb.rope = joined;
            sb.rope_len += length;
        }
        inner.barrier(parent, joined);
        true
    }

    /// Append the characters between two iterators over the same rope.
    pub fn string_buffer_append_sequence(&self, w: Word, begin: &RopeIter, end: &RopeIter) -> bool {
        let rope = begin.rope();
        if rope.is_nil() {
            return true;
        }
        let (first, last) = (begin.index(), end.index());
        if first >= last {
            return true;
        }
        let part = self.subrope(rope, first, last - 1);
        self.string_buffer_append_rope(w, part)
    }

    /// Reserve `length` codepoints of the open leaf and fill them through
    /// `f`, which receives the raw slice in the buffer's width. Returns
    /// `false` when the reservation does not fit.
    pub fn string_buffer_reserve(
        &self,
        w: Word,
        length: usize,
        f: impl FnOnce(&mut [u8]),
    ) -> bool {
        let mut inner = self.shared.inner.lock();
        let Some(r) = inner.strbuf_ref(w) else {
            inner.type_error(ErrorCode::StrBuf, w);
            return false;
        };
        let (max_length, buffered) = match inner.heap.get(r) {
            Cell::StrBuf(sb) => (sb.max_length, sb.buffer_len()),
            _ => return false,
        };
        if length > max_length {
            return false;
        }
        if buffered + length > max_length {
            inner.strbuf_flush(r);
        }
        if let Cell::StrBuf(sb) = inner.heap.get_mut(r) {
            let width = sb.format.unit_width();
            let start = sb.buffer.len();
            sb.buffer.resize(start + length * width, 0);
            f(&mut sb.buffer[start..]);
        }
        true
    }

    /// Unwind the last `length` reserved or appended codepoints of the
    /// open leaf.
    pub fn string_buffer_release(&self, w: Word, length: usize) {
        let mut inner = self.shared.inner.lock();
        let Some(r) = inner.strbuf_ref(w) else {
            inner.type_error(ErrorCode::StrBuf, w);
            return;
        };
        if let Cell::StrBuf(sb) = inner.heap.get_mut(r) {
            let width = sb.format.unit_width();
            let drop = length.min(sb.buffer_len()) * width;
            let new_len = sb.buffer.len() - drop;
            sb.buffer.truncate(new_len);
        }
    }

    /// Drop the content and return to the initial state.
    pub fn string_buffer_reset(&self, w: Word) {
        let mut inner = self.shared.inner.lock();
        let Some(r) = inner.strbuf_ref(w) else {
            inner.type_error(ErrorCode::StrBuf, w);
            return;
        };
        if let Cell::StrBuf(sb) = inner.heap.get_mut(r) {
            sb.buffer.clear();
            sb.rope = WORD_EMPTY_STRING;
            sb.rope_len = 0;
        }
    }

    /// Finalize the buffer into a rope. Equivalent to
    /// [`Runtime::string_buffer_value`] followed by a reset; an empty
    /// buffer yields the empty rope singleton.
    pub fn string_buffer_freeze(&self, w: Word) -> Word {
        let value = self.string_buffer_value(w);
        self.string_buffer_reset(w);
        value
    }

    /// Whether `w` is a string buffer.
    pub fn is_string_buffer(&self, w: Word) -> bool {
        self.word_type(w).contains(WordKind::STRBUF)
    }
}

impl RuntimeInner {
    fn strbuf_append_char(&mut self, r: crate::heap::CellRef, c: Char) -> bool {
        let (format, max_length, buffered) = match self.heap.get(r) {
            Cell::StrBuf(sb) => (sb.format, sb.max_length, sb.buffer_len()),
            _ => return false,
        };
        let effective = match format {
            StringFormat::Ucs => StringFormat::Ucs4,
            f => f,
        };
        if c > effective.max_char() || !unicode::is_valid_char(c) {
            return false;
        }
        if buffered >= max_length {
            self.strbuf_flush(r);
        }
        if let Cell::StrBuf(sb) = self.heap.get_mut(r) {
            let mut bytes = std::mem::take(&mut sb.buffer);
            unicode::fixed_set(effective, &mut bytes, c);
            sb.buffer = bytes;
        }
        true
    }
}
