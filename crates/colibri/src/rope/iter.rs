//! Rope Iterators
//!
//! Iterators cache the leaf run backing the current position: access within
//! the cached run is direct, and crossing a leaf boundary re-seeks in
//! O(log depth). Besides next/previous they support absolute repositioning
//! (`move_to`) and bulk movement (`forward`, `backward`), all preserving the
//! cached-run fast path when the target stays inside the run.
//!
//! A *null* iterator (the `Default` value) rejects every access with a
//! `RopeIter` value error; an iterator whose index reached the rope length
//! is *at end* and rejects accesses with `RopeIterEnd`.

use crate::error::ErrorCode;
use crate::heap::Cell;
use crate::runtime::{Runtime, RuntimeInner};
use crate::unicode::{self, Char, StringFormat, CHAR_INVALID};
use crate::word::custom::CustomPayload;
use crate::word::{Word, WORD_NIL};

enum IterSource {
    Null,
    Rope(Word),
    Str { format: StringFormat, data: Vec<u8> },
}

/// Cached leaf run of the current position.
struct Run {
    /// Rope index of the first character of the run.
    start: usize,
    /// Run length in characters.
    len: usize,
    /// Leaf word backing the run.
    leaf: Word,
    /// Offset of the run start within the leaf.
    leaf_off: usize,
}

/// An iterator over the codepoints of a rope or of a raw string chunk.
pub struct RopeIter {
    source: IterSource,
    length: usize,
    index: usize,
    run: Option<Run>,
}

impl Default for RopeIter {
    fn default() -> Self {
        RopeIter {
            source: IterSource::Null,
            length: 0,
            index: 0,
            run: None,
        }
    }
}

impl RopeIter {
    /// Whether this iterator was never initialized.
    pub fn is_null(&self) -> bool {
        matches!(self.source, IterSource::Null)
    }

    /// Whether the iterator moved past the last character.
    pub fn at_end(&self) -> bool {
        self.index >= self.length
    }

    /// Current character index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Length of the iterated sequence.
    pub fn length(&self) -> usize {
        self.length
    }

    /// The iterated rope; nil for string iterators.
    pub fn rope(&self) -> Word {
        match self.source {
            IterSource::Rope(w) => w,
            _ => WORD_NIL,
        }
    }

    /// Order two iterators over the same sequence by position.
    pub fn compare(&self, other: &RopeIter) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }

    fn invalidate_run(&mut self) {
        if let Some(run) = &self.run {
            if self.index < run.start || self.index >= run.start + run.len {
                self.run = None;
            }
        }
    }
}

impl Runtime {
    /// Iterator over `rope` starting at `index` (at end when past the
    /// length).
    pub fn rope_iter_begin(&self, rope: Word, index: usize) -> RopeIter {
        let inner = self.shared.inner.lock();
        if !inner.is_rope_impl(rope) {
            inner.type_error(ErrorCode::Rope, rope);
            return RopeIter::default();
        }
        let length = inner.rope_length_impl(rope);
        RopeIter {
            source: IterSource::Rope(rope),
            length,
            index: index.min(length),
            run: None,
        }
    }

    /// Iterator positioned at the first character.
    pub fn rope_iter_first(&self, rope: Word) -> RopeIter {
        self.rope_iter_begin(rope, 0)
    }

    /// Iterator positioned at the last character (at end for an empty
    /// rope).
    pub fn rope_iter_last(&self, rope: Word) -> RopeIter {
        let it = self.rope_iter_begin(rope, 0);
        let length = it.length;
        if length == 0 {
            it
        } else {
            self.rope_iter_begin(it.rope(), length - 1)
        }
    }

    /// Iterator over a raw character chunk, without a rope word.
    pub fn rope_iter_string(&self, format: StringFormat, data: &[u8]) -> RopeIter {
        let length = match format {
            StringFormat::Ucs1 => data.len(),
            StringFormat::Ucs2 => data.len() / 2,
            StringFormat::Ucs4 | StringFormat::Ucs => data.len() / 4,
            StringFormat::Utf8 => {
                let mut n = 0;
                let mut p = 0;
                while p < data.len() {
                    p = unicode::utf8_next(data, p);
                    n += 1;
                }
                n
            }
            StringFormat::Utf16 => {
                let units = unicode::units16(data);
                let mut n = 0;
                let mut p = 0;
                while p < units.len() {
                    p = unicode::utf16_next(&units, p);
                    n += 1;
                }
                n
            }
        };
        RopeIter {
            source: IterSource::Str {
                format,
                data: data.to_vec(),
            },
            length,
            index: 0,
            run: None,
        }
    }
}

impl RopeIter {
    /// Character at the current position.
    pub fn at(&mut self, rt: &Runtime) -> Char {
        let inner = rt.shared.inner.lock();
        if self.is_null() {
            inner.value_error(ErrorCode::RopeIter, "iterator not initialized");
            return CHAR_INVALID;
        }
        if self.at_end() {
            inner.value_error(ErrorCode::RopeIterEnd, "iterator at end");
            return CHAR_INVALID;
        }
        let rope = match &self.source {
            IterSource::Str { format, data } => {
                return string_char_at(*format, data, self.index);
            }
            IterSource::Rope(rope) => *rope,
            IterSource::Null => return CHAR_INVALID,
        };
        self.invalidate_run();
        if self.run.is_none() {
            self.run = inner.rope_locate(rope, self.index).map(|l| Run {
                start: l.run_start,
                len: l.run_len,
                leaf: l.leaf,
                leaf_off: l.leaf_off - (self.index - l.run_start),
            });
        }
        match &self.run {
            Some(run) => inner.leaf_char(run.leaf, run.leaf_off + (self.index - run.start)),
            None => CHAR_INVALID,
        }
    }

    /// Move to the next character. At the last character this reaches the
    /// end state; at end it reports `RopeIterEnd`.
    pub fn next(&mut self, rt: &Runtime) {
        if self.check_valid(rt, true) {
            self.index += 1;
        }
    }

    /// Move to the previous character. At index 0 this is a no-op with a
    /// `RopeIterEnd` report.
    pub fn previous(&mut self, rt: &Runtime) {
        if !self.check_valid(rt, false) {
            return;
        }
        if self.index == 0 {
            let inner = rt.shared.inner.lock();
            inner.value_error(ErrorCode::RopeIterEnd, "iterator at start");
            return;
        }
        self.index -= 1;
    }

    /// Move `n` characters forward, saturating at the end state.
    pub fn forward(&mut self, rt: &Runtime, n: usize) {
        if self.check_valid(rt, false) {
            self.index = self.index.saturating_add(n).min(self.length);
        }
    }

    /// Move `n` characters backward. Moving before index 0 reports
    /// `RopeIterEnd` and clamps to 0.
    pub fn backward(&mut self, rt: &Runtime, n: usize) {
        if !self.check_valid(rt, false) {
            return;
        }
        if n > self.index {
            let inner = rt.shared.inner.lock();
            inner.value_error(ErrorCode::RopeIterEnd, "backward before start");
            self.index = 0;
        } else {
            self.index -= n;
        }
    }

    /// Move to an absolute position (at end when past the length).
    pub fn move_to(&mut self, rt: &Runtime, index: usize) {
        if self.check_valid(rt, false) {
            self.index = index.min(self.length);
        }
    }

    fn check_valid(&self, rt: &Runtime, reject_end: bool) -> bool {
        if self.is_null() {
            let inner = rt.shared.inner.lock();
            inner.value_error(ErrorCode::RopeIter, "iterator not initialized");
            return false;
        }
        if reject_end && self.at_end() {
            let inner = rt.shared.inner.lock();
            inner.value_error(ErrorCode::RopeIterEnd, "iterator at end");
            return false;
        }
        true
    }
}

/// Decode the character at `index` of a raw chunk.
fn string_char_at(format: StringFormat, data: &[u8], index: usize) -> Char {
    match format {
        StringFormat::Ucs1 => data[index] as Char,
        StringFormat::Ucs2 => unicode::char_get(StringFormat::Ucs2, data, index * 2),
        StringFormat::Ucs4 | StringFormat::Ucs => {
            unicode::char_get(StringFormat::Ucs4, data, index * 4)
        }
        StringFormat::Utf8 => {
            let p = unicode::utf8_addr(data, index, usize::MAX);
            unicode::utf8_get(data, p)
        }
        StringFormat::Utf16 => {
            let units = unicode::units16(data);
            let p = unicode::utf16_addr(&units, index, usize::MAX);
            unicode::utf16_get(&units, p)
        }
    }
}

impl RuntimeInner {
    /// Character at `off` within a leaf word.
    pub(crate) fn leaf_char(&self, leaf: Word, off: usize) -> Char {
        if leaf.is_char() {
            return leaf.char_value();
        }
        if leaf.is_small_string() {
            return leaf.small_string_byte(off) as Char;
        }
        match leaf.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::Leaf(l)) => l.char_at(off),
            Some(Cell::UtfLeaf(l)) => l.char_at(off),
            Some(Cell::Custom(CustomPayload::Rope(p))) => p.char_at(off),
            _ => CHAR_INVALID,
        }
    }
}
