//! Vector Engine - Flat Word Arrays
//!
//! Vectors are flat arrays of words, immutable once created. Their length
//! is bounded so that one vector always fits a single page allocation.
//! Mutable vectors additionally carry a capacity fixed at creation; their
//! length can vary within it, and they can be frozen in place into an
//! immutable vector sharing the same cell.

use crate::error::ErrorCode;
use crate::heap::{max_vector_length, Cell};
use crate::runtime::{Runtime, RuntimeInner};
use crate::word::{Word, WordKind, WORD_NIL};

impl RuntimeInner {
    pub(crate) fn vector_length_impl(&self, w: Word) -> Option<usize> {
        let s = self.strip(w);
        match s.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::Vector(elems)) => Some(elems.len()),
            Some(Cell::MVector { length, .. }) => Some(*length),
            _ => None,
        }
    }

    pub(crate) fn vector_at_impl(&self, w: Word, index: usize) -> Option<Word> {
        let s = self.strip(w);
        match s.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::Vector(elems)) => elems.get(index).copied(),
            Some(Cell::MVector { length, elems }) if index < *length => Some(elems[index]),
            _ => None,
        }
    }

    /// Clone out the live elements of a vector word.
    pub(crate) fn vector_elements_impl(&self, w: Word) -> Option<Vec<Word>> {
        let s = self.strip(w);
        match s.cell_ref().map(|r| self.heap.get(r)) {
            Some(Cell::Vector(elems)) => Some(elems.to_vec()),
            Some(Cell::MVector { length, elems }) => Some(elems[..*length].to_vec()),
            _ => None,
        }
    }

    /// Allocate an immutable vector from `elements`, assumed within bounds.
    pub(crate) fn new_vector_impl(&mut self, elements: &[Word]) -> Word {
        self.alloc(Cell::Vector(elements.to_vec().into_boxed_slice()))
    }
}

impl Runtime {
    /// Maximum length of an immutable vector.
    pub fn max_vector_length(&self) -> usize {
        max_vector_length()
    }

    /// Maximum capacity of a mutable vector.
    pub fn max_mvector_length(&self) -> usize {
        max_vector_length()
    }

    /// Create an immutable vector with the given elements.
    ///
    /// Lengths beyond [`Runtime::max_vector_length`] raise a `VectorLength`
    /// value error and return nil.
    pub fn new_vector(&self, elements: &[Word]) -> Word {
        let mut inner = self.shared.inner.lock();
        if elements.len() > max_vector_length() {
            inner.value_error(
                ErrorCode::VectorLength,
                &format!(
                    "length {} exceeds maximum {}",
                    elements.len(),
                    max_vector_length()
                ),
            );
            return WORD_NIL;
        }
        inner.new_vector_impl(elements)
    }

    /// Create a mutable vector of the given capacity, with its first
    /// `length` elements taken from `elements` (nil-filled past them).
    pub fn new_mvector(&self, capacity: usize, length: usize, elements: &[Word]) -> Word {
        let mut inner = self.shared.inner.lock();
        if capacity > max_vector_length() || length > capacity {
            inner.value_error(
                ErrorCode::VectorLength,
                &format!("capacity {capacity} exceeds maximum {}", max_vector_length()),
            );
            return WORD_NIL;
        }
        let mut elems = vec![WORD_NIL; capacity];
        for (slot, &w) in elems.iter_mut().zip(elements.iter().take(length)) {
            *slot = w;
        }
        inner.alloc(Cell::MVector {
            length,
            elems: elems.into_boxed_slice(),
        })
    }

    /// Length of a vector word; `0` with a typecheck error otherwise.
    pub fn vector_length(&self, w: Word) -> usize {
        let inner = self.shared.inner.lock();
        match inner.vector_length_impl(w) {
            Some(len) => len,
            None => {
                inner.type_error(ErrorCode::Vector, w);
                0
            }
        }
    }

    /// Elements of a vector word; empty with a typecheck error otherwise.
    pub fn vector_elements(&self, w: Word) -> Vec<Word> {
        let inner = self.shared.inner.lock();
        match inner.vector_elements_impl(w) {
            Some(elems) => elems,
            None => {
                inner.type_error(ErrorCode::Vector, w);
                Vec::new()
            }
        }
    }

    /// Element of a vector word at `index`.
    pub fn vector_at(&self, w: Word, index: usize) -> Word {
        let inner = self.shared.inner.lock();
        if inner.vector_length_impl(w).is_none() {
            inner.type_error(ErrorCode::Vector, w);
            return WORD_NIL;
        }
        inner.vector_at_impl(w, index).unwrap_or(WORD_NIL)
    }

    /// Capacity of a mutable vector; `0` with a typecheck error otherwise.
    pub fn mvector_capacity(&self, w: Word) -> usize {
        let inner = self.shared.inner.lock();
        let s = inner.strip(w);
        match s.cell_ref().map(|r| inner.heap.get(r)) {
            Some(Cell::MVector { elems, .. }) => elems.len(),
            _ => {
                inner.type_error(ErrorCode::MVector, w);
                0
            }
        }
    }

    /// Resize a mutable vector within its capacity; new elements are nil.
    ///
    /// Lengths beyond the capacity raise a `VectorLength` value error and
    /// leave the vector unchanged.
    pub fn mvector_set_length(&self, w: Word, length: usize) {
        let mut inner = self.shared.inner.lock();
        let s = inner.strip(w);
        let Some(r) = s.cell_ref() else {
            inner.type_error(ErrorCode::MVector, w);
            return;
        };
        let (capacity, current) = match inner.heap.get(r) {
            Cell::MVector { length, elems } => (elems.len(), *length),
            _ => {
                inner.type_error(ErrorCode::MVector, w);
                return;
            }
        };
        if length > capacity {
            inner.value_error(
                ErrorCode::VectorLength,
                &format!("length {length} exceeds capacity {capacity}"),
            );
            return;
        }
        if let Cell::MVector { length: cur, elems } = inner.heap.get_mut(r) {
            // Nil-fill the slots dropped from or re-exposed to view.
            for slot in elems[length.min(current)..current.max(length)].iter_mut() {
                *slot = WORD_NIL;
            }
            *cur = length;
        }
    }

    /// Set the element of a mutable vector at `index`.
    pub fn mvector_set(&self, w: Word, index: usize, value: Word) {
        let mut inner = self.shared.inner.lock();
        let s = inner.strip(w);
        let Some(r) = s.cell_ref() else {
            inner.type_error(ErrorCode::MVector, w);
            return;
        };
        let length = match inner.heap.get(r) {
            Cell::MVector { length, .. } => *length,
            _ => {
                inner.type_error(ErrorCode::MVector, w);
                return;
            }
        };
        if index >= length {
            inner.value_error(
                ErrorCode::VectorLength,
                &format!("index {index} beyond length {length}"),
            );
            return;
        }
        if let Cell::MVector { elems, .. } = inner.heap.get_mut(r) {
            elems[index] = value;
        }
        inner.barrier(s, value);
    }

    /// Turn a mutable vector into an immutable one in place, keeping the
    /// same word. Freezing an immutable vector is a no-op.
    pub fn mvector_freeze(&self, w: Word) {
        let mut inner = self.shared.inner.lock();
        let s = inner.strip(w);
        let Some(r) = s.cell_ref() else {
            inner.type_error(ErrorCode::Vector, w);
            return;
        };
        match inner.heap.get(r) {
            Cell::MVector { .. } => {
                let cell = inner.heap.replace(r, Cell::Vector(Box::new([])));
                if let Cell::MVector { length, elems } = cell {
                    let mut v = elems.into_vec();
                    v.truncate(length);
                    inner.heap.replace(r, Cell::Vector(v.into_boxed_slice()));
                }
            }
            Cell::Vector(_) => {}
            _ => {
                inner.type_error(ErrorCode::Vector, w);
            }
        }
    }

    /// Whether `w` is a (possibly mutable) vector.
    pub fn is_vector(&self, w: Word) -> bool {
        self.word_type(w).contains(WordKind::VECTOR)
    }
}
