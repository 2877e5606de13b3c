//! List Chunk Traversal
//!
//! Mirrors rope chunk traversal over word elements. Void runs are reported
//! as chunks without element data, so sparse lists traverse without
//! materializing their nil elements.

use std::borrow::Cow;

use crate::error::ErrorCode;
use crate::heap::Cell;
use crate::runtime::{Runtime, RuntimeInner};
use crate::word::custom::CustomPayload;
use crate::word::Word;

/// One leaf chunk of list elements.
pub struct ListChunk<'a> {
    /// Element data; `None` for a void run of nil elements.
    pub data: Option<Cow<'a, [Word]>>,
    /// Number of elements in the chunk.
    pub length: usize,
}

/// Location of an element within its backing leaf run.
pub(crate) struct ListLocate {
    pub leaf: Word,
    pub leaf_off: usize,
    pub run_start: usize,
    pub run_len: usize,
}

impl RuntimeInner {
    /// Descend to the leaf run containing `index` (normalized for cyclic
    /// lists).
    pub(crate) fn list_locate(&self, w: Word, index: usize) -> Option<ListLocate> {
        let mut w = self.strip(w);
        let mut i = self.normalize_index(w, index);
        let mut base = 0usize;
        loop {
            if w.is_void_list() {
                let len = w.void_list_len();
                if i >= len {
                    return None;
                }
                return Some(ListLocate {
                    leaf: w,
                    leaf_off: i,
                    run_start: base,
                    run_len: len,
                });
            }
            let r = w.cell_ref()?;
            match self.heap.get(r) {
                Cell::Vector(elems) => {
                    if i >= elems.len() {
                        return None;
                    }
                    return Some(ListLocate {
                        leaf: w,
                        leaf_off: i,
                        run_start: base,
                        run_len: elems.len(),
                    });
                }
                Cell::MVector { length, .. } => {
                    if i >= *length {
                        return None;
                    }
                    return Some(ListLocate {
                        leaf: w,
                        leaf_off: i,
                        run_start: base,
                        run_len: *length,
                    });
                }
                Cell::Custom(CustomPayload::List(p)) => {
                    let len = p.length();
                    if i >= len {
                        return None;
                    }
                    return Some(ListLocate {
                        leaf: w,
                        leaf_off: i,
                        run_start: base,
                        run_len: len,
                    });
                }
                Cell::Sublist {
                    source,
                    first,
                    last,
                    ..
                } => {
                    let (source, first, last) = (*source, *first, *last);
                    if i > last - first {
                        return None;
                    }
                    return Some(ListLocate {
                        leaf: self.strip(source),
                        leaf_off: first + i,
                        run_start: base,
                        run_len: last - first + 1,
                    });
                }
                Cell::ConcatList {
                    left_len,
                    left,
                    right,
                    ..
                } => {
                    if i < *left_len {
                        w = self.strip(*left);
                    } else {
                        base += left_len;
                        i -= left_len;
                        w = self.strip(*right);
                    }
                }
                Cell::CircularList { core } => {
                    let core_len = self.list_length_impl(*core);
                    if core_len == 0 {
                        return None;
                    }
                    i %= core_len;
                    w = self.strip(*core);
                }
                Cell::MList { root } => w = self.strip(*root),
                _ => return None,
            }
        }
    }

    /// Chunk of `count` elements starting at `off` within `leaf`.
    pub(crate) fn list_chunk(&self, leaf: Word, off: usize, count: usize) -> ListChunk<'_> {
        if leaf.is_void_list() {
            return ListChunk {
                data: None,
                length: count,
            };
        }
        match leaf.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::Vector(elems)) => ListChunk {
                data: Some(Cow::Borrowed(&elems[off..off + count])),
                length: count,
            },
            Some(Cell::MVector { elems, .. }) => ListChunk {
                data: Some(Cow::Borrowed(&elems[off..off + count])),
                length: count,
            },
            Some(Cell::Custom(CustomPayload::List(p))) => {
                let elems: Vec<Word> = (off..off + count).map(|i| p.element_at(i)).collect();
                ListChunk {
                    data: Some(Cow::Owned(elems)),
                    length: count,
                }
            }
            _ => ListChunk {
                data: None,
                length: 0,
            },
        }
    }
}

impl Runtime {
    /// Visit each maximal leaf chunk overlapping `[start, start+max)` of a
    /// list (backward from `start` when `reverse`). Cyclic lists traverse
    /// up to `max` elements, wrapping over the loop.
    pub fn traverse_list_chunks<F>(
        &self,
        list: Word,
        start: usize,
        max: usize,
        reverse: bool,
        mut proc: F,
    ) -> (i32, usize)
    where
        F: FnMut(usize, &ListChunk<'_>) -> i32,
    {
        let inner = self.shared.inner.lock();
        if !inner.is_list_impl(list) {
            inner.type_error(ErrorCode::List, list);
            return (-1, 0);
        }
        let length = inner.list_length_impl(list);
        let loop_len = inner.list_loop_length_impl(list);
        if length == 0 || max == 0 {
            return (0, 0);
        }
        let mut traversed = 0usize;
        if reverse {
            let mut i = if loop_len == 0 {
                start.min(length - 1)
            } else {
                inner.normalize_index(list, start)
            };
            let mut budget = max;
            loop {
                let Some(loc) = inner.list_locate(list, i) else {
                    break;
                };
                let ni = inner.normalize_index(list, i);
                let lowest = loc.run_start.max(ni.saturating_sub(budget - 1));
                let count = ni - lowest + 1;
                let off = loc.leaf_off - (ni - lowest);
                let chunk = inner.list_chunk(loc.leaf, off, count);
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
            let mut remaining = if loop_len == 0 {
                if start >= length {
                    return (0, 0);
                }
                max.min(length - start)
            } else {
                max
            };
            let mut i = start;
            while remaining > 0 {
                let Some(loc) = inner.list_locate(list, i) else {
                    break;
                };
                let ni = inner.normalize_index(list, i);
                let avail = loc.run_len - (ni - loc.run_start);
                let count = avail.min(remaining);
                let chunk = inner.list_chunk(loc.leaf, loc.leaf_off, count);
                let ret = proc(i, &chunk);
                traversed += count;
                if ret != 0 {
                    return (ret, traversed);
                }
                i += count;
                remaining -= count;
            }
        }
        (0, traversed)
    }

    /// Walk several lists in lockstep, stepping by the shortest
    /// intersecting leaf boundary. Exhausted lists report `None` chunks.
    pub fn traverse_list_chunks_n<F>(
        &self,
        lists: &[Word],
        start: usize,
        max: usize,
        mut proc: F,
    ) -> (i32, usize)
    where
        F: FnMut(usize, &[Option<ListChunk<'_>>]) -> i32,
    {
        let inner = self.shared.inner.lock();
        for &list in lists {
            if !inner.is_list_impl(list) {
                inner.type_error(ErrorCode::List, list);
                return (-1, 0);
            }
        }
        let longest = lists
            .iter()
            .map(|&l| inner.list_length_impl(l))
            .max()
            .unwrap_or(0);
        let end = longest.min(start.saturating_add(max));
        let mut i = start;
        let mut traversed = 0usize;
        while i < end {
            let mut step = end - i;
            let locs: Vec<Option<ListLocate>> = lists
                .iter()
                .map(|&l| inner.list_locate(l, i))
                .collect();
            for (idx, loc) in locs.iter().enumerate() {
                if let Some(loc) = loc {
                    let ni = inner.normalize_index(lists[idx], i);
                    step = step.min(loc.run_len - (ni - loc.run_start));
                }
            }
            let chunks: Vec<Option<ListChunk<'_>>> = locs
                .iter()
                .map(|loc| {
                    loc.as_ref()
                        .map(|l| inner.list_chunk(l.leaf, l.leaf_off, step))
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
