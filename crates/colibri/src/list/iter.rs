//! List Iterators
//!
//! Same contract as rope iterators, over word elements. Iterators over
//! cyclic lists never reach the end state: movement past the head
//! normalizes the index into the loop range, so `next` wraps around
//! indefinitely.

use crate::error::ErrorCode;
use crate::runtime::{Runtime, RuntimeInner};
use crate::word::{Word, WORD_NIL};

/// Cached leaf run of the current position.
struct Run {
    start: usize,
    len: usize,
    leaf: Word,
    leaf_off: usize,
}

enum IterSource {
    Null,
    List(Word),
    Array(Vec<Word>),
}

/// An iterator over the elements of a list or of a raw word array.
pub struct ListIter {
    source: IterSource,
    length: usize,
    loop_len: usize,
    index: usize,
    run: Option<Run>,
}

impl Default for ListIter {
    fn default() -> Self {
        ListIter {
            source: IterSource::Null,
            length: 0,
            loop_len: 0,
            index: 0,
            run: None,
        }
    }
}

impl ListIter {
    /// Whether this iterator was never initialized.
    pub fn is_null(&self) -> bool {
        matches!(self.source, IterSource::Null)
    }

    /// Whether the iterator moved past the last element. Never true for
    /// cyclic lists.
    pub fn at_end(&self) -> bool {
        self.loop_len == 0 && self.index >= self.length
    }

    /// Current element index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Length of the iterated sequence.
    pub fn length(&self) -> usize {
        self.length
    }

    /// The iterated list; nil for array iterators.
    pub fn list(&self) -> Word {
        match self.source {
            IterSource::List(w) => w,
            _ => WORD_NIL,
        }
    }

    /// Order two iterators over the same sequence by position.
    pub fn compare(&self, other: &ListIter) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }

    fn normalize(&mut self) {
        if self.loop_len != 0 && self.index >= self.length {
            let head = self.length - self.loop_len;
            self.index = head + (self.index - head) % self.loop_len;
        }
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
    /// Iterator over `list` starting at `index`.
    pub fn list_iter_begin(&self, list: Word, index: usize) -> ListIter {
        let inner = self.shared.inner.lock();
        if !inner.is_list_impl(list) {
            inner.type_error(ErrorCode::List, list);
            return ListIter::default();
        }
        let length = inner.list_length_impl(list);
        let loop_len = inner.list_loop_length_impl(list);
        let mut it = ListIter {
            source: IterSource::List(list),
            length,
            loop_len,
            index: if loop_len == 0 {
                index.min(length)
            } else {
                index
            },
            run: None,
        };
        it.normalize();
        it
    }

    /// Iterator positioned at the first element.
    pub fn list_iter_first(&self, list: Word) -> ListIter {
        self.list_iter_begin(list, 0)
    }

    /// Iterator positioned at the last element (at end for an empty proper
    /// list).
    pub fn list_iter_last(&self, list: Word) -> ListIter {
        let it = self.list_iter_begin(list, 0);
        if it.length == 0 {
            it
        } else {
            self.list_iter_begin(it.list(), it.length - 1)
        }
    }

    /// Iterator over a raw word array, without a list word.
    pub fn list_iter_array(&self, elements: &[Word]) -> ListIter {
        ListIter {
            source: IterSource::Array(elements.to_vec()),
            length: elements.len(),
            loop_len: 0,
            index: 0,
            run: None,
        }
    }
}

impl ListIter {
    /// Element at the current position.
    pub fn at(&mut self, rt: &Runtime) -> Word {
        let inner = rt.shared.inner.lock();
        if self.is_null() {
            inner.value_error(ErrorCode::ListIter, "iterator not initialized");
            return WORD_NIL;
        }
        if self.at_end() {
            inner.value_error(ErrorCode::ListIterEnd, "iterator at end");
            return WORD_NIL;
        }
        let list = match &self.source {
            IterSource::Array(elems) => {
                return elems.get(self.index).copied().unwrap_or(WORD_NIL);
            }
            IterSource::List(list) => *list,
            IterSource::Null => return WORD_NIL,
        };
        self.invalidate_run();
        if self.run.is_none() {
            self.run = inner.list_locate(list, self.index).map(|l| Run {
                start: l.run_start,
                len: l.run_len,
                leaf: l.leaf,
                leaf_off: l.leaf_off - (self.index - l.run_start),
            });
        }
        match &self.run {
            Some(run) => inner
                .list_leaf_at(run.leaf, run.leaf_off + (self.index - run.start))
                .unwrap_or(WORD_NIL),
            None => WORD_NIL,
        }
    }

    /// Move to the next element, wrapping over cyclic tails.
    pub fn next(&mut self, rt: &Runtime) {
        if !self.check_valid(rt, true) {
            return;
        }
        self.index += 1;
        self.normalize();
    }

    /// Move to the previous element.
    pub fn previous(&mut self, rt: &Runtime) {
        if !self.check_valid(rt, false) {
            return;
        }
        if self.index == 0 {
            let inner = rt.shared.inner.lock();
            inner.value_error(ErrorCode::ListIterEnd, "iterator at start");
            return;
        }
        self.index -= 1;
    }

    /// Move `n` elements forward.
    pub fn forward(&mut self, rt: &Runtime, n: usize) {
        if !self.check_valid(rt, false) {
            return;
        }
        self.index = self.index.saturating_add(n);
        if self.loop_len == 0 {
            self.index = self.index.min(self.length);
        }
        self.normalize();
    }

    /// Move `n` elements backward, clamping at 0.
    pub fn backward(&mut self, rt: &Runtime, n: usize) {
        if !self.check_valid(rt, false) {
            return;
        }
        if n > self.index {
            let inner = rt.shared.inner.lock();
            inner.value_error(ErrorCode::ListIterEnd, "backward before start");
            self.index = 0;
        } else {
            self.index -= n;
        }
    }

    /// Move to an absolute position.
    pub fn move_to(&mut self, rt: &Runtime, index: usize) {
        if !self.check_valid(rt, false) {
            return;
        }
        self.index = index;
        if self.loop_len == 0 {
            self.index = self.index.min(self.length);
        }
        self.normalize();
    }

    fn check_valid(&self, rt: &Runtime, reject_end: bool) -> bool {
        if self.is_null() {
            let inner = rt.shared.inner.lock();
            inner.value_error(ErrorCode::ListIter, "iterator not initialized");
            return false;
        }
        if reject_end && self.at_end() {
            let inner = rt.shared.inner.lock();
            inner.value_error(ErrorCode::ListIterEnd, "iterator at end");
            return false;
        }
        true
    }
}

impl RuntimeInner {
    /// Element at `off` within a list leaf word.
    pub(crate) fn list_leaf_at(&self, leaf: Word, off: usize) -> Option<Word> {
        if leaf.is_void_list() {
            return (off < leaf.void_list_len()).then_some(WORD_NIL);
        }
        use crate::heap::Cell;
        use crate::word::custom::CustomPayload;
        match leaf.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::Vector(elems)) => elems.get(off).copied(),
            Some(Cell::MVector { length, elems }) => (off < *length).then(|| elems[off]),
            Some(Cell::Custom(CustomPayload::List(p))) => {
                (off < p.length()).then(|| p.element_at(off))
            }
            _ => None,
        }
    }
}
