//! Garbage Collector - Mark, Promote, Sweep
//!
//! Collections are exact and moving. A collection at level `g` considers
//! every cell of generations `0..=g`:
//!
//! 1. **Mark**: reachable cells are discovered from the preserved-word
//!    table and from the remembered parents of the collected generations.
//! 2. **Promote**: each reachable cell is copied one generation up (capped
//!    at the oldest); the vacated slot is overwritten with a forwarding
//!    marker used to rewrite every subsequent reference, including the
//!    children enumerated by custom word descriptors.
//! 3. **Sweep**: the pages detached from the collected generations are
//!    dropped wholesale. Cells that were not moved are garbage; dropping a
//!    custom cell runs its payload cleanup exactly once.
//!
//! Old-to-young references are tracked by the write barrier: any store of a
//! younger word into an older cell records the parent in the remembered set
//! of the child's generation, so partial collections never scan old pages.

use std::collections::HashSet;

use crate::heap::{Cell, CellRef};
use crate::runtime::RuntimeInner;
use crate::word::Word;

/// Work accumulated while forwarding cells.
struct CollectState {
    /// Newly promoted cells whose children still need rewriting.
    scan: Vec<CellRef>,
    /// Synonym table entries to re-key: `(new cell index, synonym)`.
    syn_moves: Vec<(u32, Word)>,
}

impl RuntimeInner {
    /// Whether the youngest generation is past its threshold.
    pub(crate) fn collection_needed(&self) -> bool {
        self.heap.page_count(0) >= self.config.threshold(0)
    }

    /// Collect the youngest run of full generations, if any.
    pub(crate) fn maybe_collect(&mut self) {
        let max_gen = self.heap.max_generation();
        let mut level = None;
        for gen in 0..=max_gen {
            if self.heap.page_count(gen) >= self.config.threshold(gen) {
                level = Some(gen);
            } else {
                break;
            }
        }
        if let Some(level) = level {
            self.collect(level);
        }
    }

    /// Perform a collection at `level`, clamped to the oldest generation.
    pub(crate) fn collect(&mut self, level: usize) {
        let level = level.min(self.heap.max_generation());
        self.cycles += 1;
        let cycle = self.cycles;
        log::debug!("cycle {cycle}: collecting generations 0..={level}");

        // Detach the pages of the collected generations: promotion below
        // allocates onto fresh pages only, and whatever remains on the
        // detached pages after the scan is garbage.
        let detached = self.heap.detach_generations(level);

        let mut state = CollectState {
            scan: Vec::new(),
            syn_moves: Vec::new(),
        };

        // Preserved words are the root set.
        for slot in self.roots.live_slots() {
            let word = self.roots.word(slot);
            let moved = self.forward_word(word, level, &mut state);
            self.roots.set_word(slot, moved);
        }

        // Parents recorded by the write barrier reference collected cells
        // from uncollected generations; rewrite them in place.
        let mut parents: Vec<CellRef> = Vec::new();
        for gen in 0..=level {
            parents.extend(self.remembered[gen].drain());
        }
        for parent in parents {
            if self.heap.gen_of(parent) > level {
                self.rewrite_children(parent, level, &mut state);
            }
        }

        // Transitive scan of everything promoted so far.
        while !state.scan.is_empty() || !state.syn_moves.is_empty() {
            while let Some(r) = state.scan.pop() {
                self.rewrite_children(r, level, &mut state);
            }
            while let Some((idx, syn)) = state.syn_moves.pop() {
                let moved = self.forward_word(syn, level, &mut state);
                self.synonyms.insert(idx, moved);
                if !state.scan.is_empty() {
                    break;
                }
            }
        }

        // Sweep: drop dead synonym links, then the detached pages. Custom
        // cells that were not promoted drop their payload here.
        let cells_per_page = crate::heap::available_cells();
        let dead_pages: HashSet<usize> = detached.iter().copied().collect();
        self.synonyms
            .retain(|&idx, _| !dead_pages.contains(&(idx as usize / cells_per_page)));
        let reclaimed = detached.len();
        self.heap.recycle(detached);
        log::debug!("cycle {cycle}: done, {reclaimed} pages reclaimed");
    }

    /// Forward `w` out of the collected generations.
    ///
    /// Heap words of generations `0..=level` are promoted on first sight
    /// and resolved through their forwarding marker afterwards; everything
    /// else passes through unchanged.
    fn forward_word(&mut self, w: Word, level: usize, state: &mut CollectState) -> Word {
        let Some(r) = w.cell_ref() else {
            return w;
        };
        let gen = self.heap.gen_of(r);
        if gen > level {
            return w;
        }
        if let Cell::Forward(to) = self.heap.get(r) {
            return Word::from_cell_ref(*to);
        }
        let target = (gen + 1).min(self.heap.max_generation());
        let cell = self.heap.replace(r, Cell::Forward(CellRef(u32::MAX)));
        let new_ref = match self.heap.alloc(target, cell) {
            Ok(nr) => nr,
            Err(e) => {
                self.raise(
                    crate::error::ErrorLevel::Fatal,
                    crate::error::ErrorCode::Memory,
                    &e.to_string(),
                );
                return w;
            }
        };
        self.heap.replace(r, Cell::Forward(new_ref));
        if let Some(syn) = self.synonyms.remove(&r.0) {
            state.syn_moves.push((new_ref.0, syn));
        }
        state.scan.push(new_ref);
        Word::from_cell_ref(new_ref)
    }

    /// Rewrite every child word of the cell at `r` through forwarding, and
    /// re-register the cell with the write barrier for the children that
    /// remain younger.
    fn rewrite_children(&mut self, r: CellRef, level: usize, state: &mut CollectState) {
        let my_gen = self.heap.gen_of(r);
        let mut cell = self.heap.replace(r, Cell::Forward(CellRef(u32::MAX)));
        let mut young = Vec::new();
        cell.visit_children(&mut |child| {
            let moved = self.forward_word(*child, level, state);
            *child = moved;
            if let Some(c) = moved.cell_ref() {
                let cg = self.heap.gen_of(c);
                if cg < my_gen {
                    young.push(cg);
                }
            }
        });
        self.heap.replace(r, cell);
        // The synonym link lives in a side table keyed by this cell.
        if let Some(syn) = self.synonyms.get(&r.0).copied() {
            let moved = self.forward_word(syn, level, state);
            self.synonyms.insert(r.0, moved);
            if let Some(c) = moved.cell_ref() {
                let cg = self.heap.gen_of(c);
                if cg < my_gen {
                    young.push(cg);
                }
            }
        }
        for cg in young {
            self.remembered[cg].insert(r);
        }
    }
}
