//! Rope Chunk Traversal
//!
//! Traversal visits every maximal leaf chunk overlapping a character range,
//! in forward or reverse order, without materializing the whole rope. The
//! N-ary variant walks several ropes in lockstep, stepping by the shortest
//! intersecting leaf boundary; shorter ropes report missing chunks once
//! exhausted.

use std::borrow::Cow;

use crate::heap::Cell;
use crate::runtime::{Runtime, RuntimeInner};
use crate::unicode::{self, StringFormat};
use crate::word::custom::CustomPayload;
use crate::word::Word;
use crate::error::ErrorCode;

/// One leaf chunk of character data.
pub struct RopeChunk<'a> {
    /// Encoding of `data`.
    pub format: StringFormat,
    /// Raw character data; owned for immediate and custom sources.
    pub data: Cow<'a, [u8]>,
    /// Number of codepoints in the chunk.
    pub length: usize,
}

/// Location of a character within its backing leaf run.
pub(crate) struct Locate {
    /// Leaf word: immediate, flat leaf, UTF leaf or custom rope.
    pub leaf: Word,
    /// Offset of the located character within the leaf.
    pub leaf_off: usize,
    /// Global index of the first visible character of the run.
    pub run_start: usize,
    /// Visible run length.
    pub run_len: usize,
}

impl RuntimeInner {
    /// Descend to the leaf run containing `index`.
    pub(crate) fn rope_locate(&self, w: Word, index: usize) -> Option<Locate> {
        let mut w = self.strip(w);
        let mut i = index;
        let mut base = 0usize;
        loop {
            if w.is_char() || w.is_small_string() {
                let len = self.rope_length_impl(w);
                if i >= len {
                    return None;
                }
                return Some(Locate {
                    leaf: w,
                    leaf_off: i,
                    run_start: base,
                    run_len: len,
                });
            }
            let r = w.cell_ref()?;
            match self.heap.get(r) {
                Cell::Leaf(leaf) => {
                    if i >= leaf.len() {
                        return None;
                    }
                    return Some(Locate {
                        leaf: w,
                        leaf_off: i,
                        run_start: base,
                        run_len: leaf.len(),
                    });
                }
                Cell::UtfLeaf(leaf) => {
                    if i >= leaf.chars {
                        return None;
                    }
                    return Some(Locate {
                        leaf: w,
                        leaf_off: i,
                        run_start: base,
                        run_len: leaf.chars,
                    });
                }
                Cell::Custom(CustomPayload::Rope(p)) => {
                    let len = p.length();
                    if i >= len {
                        return None;
                    }
                    return Some(Locate {
                        leaf: w,
                        leaf_off: i,
                        run_start: base,
                        run_len: len,
                    });
                }
                Cell::Subrope {
                    source,
                    first,
                    last,
                    ..
                } => {
                    // The visible run is the subrope window over one leaf.
                    let (source, first, last) = (*source, *first, *last);
                    if i > last - first {
                        return None;
                    }
                    return Some(Locate {
                        leaf: self.strip(source),
                        leaf_off: first + i,
                        run_start: base,
                        run_len: last - first + 1,
                    });
                }
                Cell::ConcatRope {
                    left_len,
                    left,
                    right,
                    length,
                    ..
                } => {
                    if i >= *length {
                        return None;
                    }
                    if i < *left_len {
                        w = self.strip(*left);
                    } else {
                        base += left_len;
                        i -= left_len;
                        w = self.strip(*right);
                    }
                }
                _ => return None,
            }
        }
    }

    /// Chunk of `count` codepoints starting at `char_off` within `leaf`.
    pub(crate) fn rope_chunk(&self, leaf: Word, char_off: usize, count: usize) -> RopeChunk<'_> {
        if leaf.is_char() {
            let c = leaf.char_value();
            let format = StringFormat::fixed_for(c);
            let mut data = Vec::new();
            unicode::fixed_set(format, &mut data, c);
            return RopeChunk {
                format,
                data: Cow::Owned(data),
                length: 1,
            };
        }
        if leaf.is_small_string() {
            let bytes = leaf.small_string_bytes();
            return RopeChunk {
                format: StringFormat::Ucs1,
                data: Cow::Owned(bytes[char_off..char_off + count].to_vec()),
                length: count,
            };
        }
        match leaf.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::Leaf(l)) => {
                let w = l.width as usize;
                RopeChunk {
                    format: l.format(),
                    data: Cow::Borrowed(&l.bytes[char_off * w..(char_off + count) * w]),
                    length: count,
                }
            }
            Some(Cell::UtfLeaf(l)) => match l.format {
                StringFormat::Utf8 => {
                    let lo = unicode::utf8_addr(&l.bytes, char_off, l.chars);
                    let hi = unicode::utf8_addr(&l.bytes, char_off + count, l.chars);
                    RopeChunk {
                        format: l.format,
                        data: Cow::Borrowed(&l.bytes[lo..hi]),
                        length: count,
                    }
                }
                _ => {
                    let units = unicode::units16(&l.bytes);
                    let lo = unicode::utf16_addr(&units, char_off, l.chars);
                    let hi = unicode::utf16_addr(&units, char_off + count, l.chars);
                    RopeChunk {
                        format: l.format,
                        data: Cow::Borrowed(&l.bytes[lo * 2..hi * 2]),
                        length: count,
                    }
                }
            },
            Some(Cell::Custom(CustomPayload::Rope(p))) => {
                let mut data = Vec::with_capacity(count * 4);
                for i in char_off..char_off + count {
                    unicode::fixed_set(StringFormat::Ucs4, &mut data, p.char_at(i));
                }
                RopeChunk {
                    format: StringFormat::Ucs4,
                    data: Cow::Owned(data),
                    length: count,
                }
            }
            _ => RopeChunk {
                format: StringFormat::Ucs1,
                data: Cow::Owned(Vec::new()),
                length: 0,
            },
        }
    }
}

impl Runtime {
    /// Visit each maximal leaf chunk overlapping `[start, start+max)` (or
    /// ending at `start` going backward when `reverse`), calling
    /// `proc(index, chunk)` with the chunk's first character index.
    ///
    /// A nonzero return from `proc` stops the traversal and becomes the
    /// first component of the result; otherwise the result is `0` and the
    /// second component is the total character count traversed.
    pub fn traverse_rope_chunks<F>(
        &self,
        rope: Word,
        start: usize,
        max: usize,
        reverse: bool,
        mut proc: F,
    ) -> (i32, usize)
    where
        F: FnMut(usize, &RopeChunk<'_>) -> i32,
    {
        let inner = self.shared.inner.lock();
        if !inner.is_rope_impl(rope) {
            inner.type_error(ErrorCode::Rope, rope);
            return (-1, 0);
        }
        let length = inner.rope_length_impl(rope);
        let mut traversed = 0usize;
        if length == 0 || max == 0 {
            return (0, 0);
        }
        if reverse {
            let mut i = start.min(length - 1);
            let mut budget = max;
            loop {
                let Some(loc) = inner.rope_locate(rope, i) else {
                    break;
                };
                let lowest = loc.run_start.max(i.saturating_sub(budget - 1));
                let count = i - lowest + 1;
                let off = loc.leaf_off - (i - lowest);
                let chunk = inner.rope_chunk(loc.leaf, off, count);
                let ret = proc(lowest, &chunk);
                traversed += count;
                if ret != 0 {
                    return (ret, traversed);
                }
                budget -= count;
                if budget == 0 || lowest == 0 {
                    break;
                }
                i = lowest - 1;
            }
        } else {
            if start >= length {
                return (0, 0);
            }
            let end = length.min(start.saturating_add(max));
            let mut i = start;
            while i < end {
                let Some(loc) = inner.rope_locate(rope, i) else {
                    break;
                };
                let avail = loc.run_len - (i - loc.run_start);
                let count = avail.min(end - i);
                let chunk = inner.rope_chunk(loc.leaf, loc.leaf_off, count);
                let ret = proc(i, &chunk);
                traversed += count;
                if ret != 0 {
                    return (ret, traversed);
                }
                i += count;
            }
        }
        (0, traversed)
    }

    /// Walk several ropes in lockstep over `[start, start+max)`, stepping
    /// by the shortest intersecting leaf boundary. Exhausted ropes report
    /// `None` chunks; the traversal ends when every rope is exhausted.
    pub fn traverse_rope_chunks_n<F>(
        &self,
        ropes: &[Word],
        start: usize,
        max: usize,
        mut proc: F,
    ) -> (i32, usize)
    where
        F: FnMut(usize, &[Option<RopeChunk<'_>>]) -> i32,
    {
        let inner = self.shared.inner.lock();
        for &rope in ropes {
            if !inner.is_rope_impl(rope) {
                inner.type_error(ErrorCode::Rope, rope);
                return (-1, 0);
            }
        }
        let longest = ropes
            .iter()
            .map(|&r| inner.rope_length_impl(r))
            .max()
            .unwrap_or(0);
        let end = longest.min(start.saturating_add(max));
        let mut i = start;
        let mut traversed = 0usize;
        while i < end {
            let mut step = end - i;
            let mut locs: Vec<Option<Locate>> = Vec::with_capacity(ropes.len());
            for &rope in ropes {
                let loc = inner.rope_locate(rope, i);
                if let Some(loc) = &loc {
                    step = step.min(loc.run_len - (i - loc.run_start));
                }
                locs.push(loc);
            }
            let chunks: Vec<Option<RopeChunk<'_>>> = locs
                .iter()
                .map(|loc| {
                    loc.as_ref()
                        .map(|l| inner.rope_chunk(l.leaf, l.leaf_off, step))
                })
                .collect();
            let ret = proc(i, &chunks);
            traversed += step;
            if ret != 0 {
                return (ret, traversed);
            }
            i += step;
        }
        (0, traversed)
    }
}
