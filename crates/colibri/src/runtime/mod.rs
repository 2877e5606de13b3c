//! Runtime - The Process-Wide Substrate Handle
//!
//! A [`Runtime`] owns the cell heap, the preserved-word table, the
//! remembered sets and the error handler. Clients obtain one from
//! [`Runtime::init`] and perform every word operation through it; the
//! threading model chosen at initialization decides whether collections run
//! synchronously on the client thread or on a dedicated collector thread.
//!
//! Allocation-bearing operations must run inside a GC-protected section
//! bracketed by [`Runtime::pause_gc`] / [`Runtime::resume_gc`] (or the RAII
//! [`PauseGuard`]). Collections are scheduled at the outermost resume once a
//! generation exceeds its page threshold.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};

use crate::config::{RuntimeConfig, ThreadingModel};
use crate::error::{default_error_proc, ErrorCode, ErrorLevel, ErrorProc};
use crate::heap::cell::MapKeys;
use crate::heap::{Cell, CellRef, Heap};
use crate::unicode::{Char, CHAR_INVALID};
use crate::word::custom::{
    CustomIntMap, CustomList, CustomMap, CustomPayload, CustomRope, CustomWord,
};
use crate::word::{Word, WordKind, WORD_NIL};

/// Refcounted table of preserved (rooted) words.
pub(crate) struct RootTable {
    entries: Vec<Option<RootEntry>>,
    free: Vec<usize>,
    index: HashMap<u64, usize>,
}

struct RootEntry {
    word: Word,
    count: usize,
}

impl RootTable {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Insert `w` (or bump its refcount) and return its slot.
    pub(crate) fn preserve(&mut self, w: Word) -> usize {
        if let Some(&slot) = self.index.get(&w.0) {
            self.entries[slot].as_mut().unwrap().count += 1;
            return slot;
        }
        let slot = self.free.pop().unwrap_or_else(|| {
            self.entries.push(None);
            self.entries.len() - 1
        });
        self.entries[slot] = Some(RootEntry { word: w, count: 1 });
        self.index.insert(w.0, slot);
        slot
    }

    /// Decrement the refcount of the entry at `slot`.
    pub(crate) fn release_slot(&mut self, slot: usize) {
        if let Some(entry) = self.entries.get_mut(slot).and_then(Option::as_mut) {
            entry.count -= 1;
            if entry.count == 0 {
                let word = entry.word;
                self.index.remove(&word.0);
                self.entries[slot] = None;
                self.free.push(slot);
            }
        }
    }

    /// Decrement the refcount of `w`. Returns whether an entry existed.
    pub(crate) fn release(&mut self, w: Word) -> bool {
        match self.index.get(&w.0) {
            Some(&slot) => {
                self.release_slot(slot);
                true
            }
            None => false,
        }
    }

    pub(crate) fn word(&self, slot: usize) -> Word {
        self.entries[slot].as_ref().map_or(WORD_NIL, |e| e.word)
    }

    pub(crate) fn live_slots(&self) -> Vec<usize> {
        (0..self.entries.len())
            .filter(|&i| self.entries[i].is_some())
            .collect()
    }

    /// Rewrite the word of `slot` after a move.
    pub(crate) fn set_word(&mut self, slot: usize, w: Word) {
        if let Some(entry) = self.entries[slot].as_mut() {
            if entry.word != w {
                self.index.remove(&entry.word.0);
                entry.word = w;
                self.index.insert(w.0, slot);
            }
        }
    }
}

/// Interior state of a runtime, guarded by one lock.
pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) heap: Heap,
    pub(crate) roots: RootTable,
    /// Remembered sets, indexed by child generation: parent cells of older
    /// generations holding references into that generation.
    pub(crate) remembered: Vec<HashSet<CellRef>>,
    /// Synonym chain links of heap words, keyed by cell index.
    pub(crate) synonyms: HashMap<u32, Word>,
    pub(crate) error_proc: ErrorProc,
    /// Mirror of the pause counter, for the GC-protection check.
    pauders: Arc<AtomicUsize>,
    /// Collections performed, for logging.
    pub(crate) cycles: u64,
}

impl RuntimeInner {
    fn new(config: RuntimeConfig, pauders: Arc<AtomicUsize>) -> Self {
        let max_gen = config.max_generation;
        Self {
            config,
            heap: Heap::new(max_gen),
            roots: RootTable::new(),
            remembered: (0..=max_gen).map(|_| HashSet::new()).collect(),
            synonyms: HashMap::new(),
            error_proc: Box::new(default_error_proc),
            pauders,
            cycles: 0,
        }
    }

    // === Error reporting ===

    pub(crate) fn raise(&self, level: ErrorLevel, code: ErrorCode, msg: &str) {
        let _ = (self.error_proc)(level, code, msg);
    }

    /// Report a typecheck error for `w` and return `false`.
    pub(crate) fn type_error(&self, code: ErrorCode, w: Word) -> bool {
        self.raise(
            ErrorLevel::TypeCheck,
            code,
            &format!("word {:#x}", w.0),
        );
        false
    }

    /// Report a valuecheck error and return `false`.
    pub(crate) fn value_error(&self, code: ErrorCode, msg: &str) -> bool {
        self.raise(ErrorLevel::ValueCheck, code, msg);
        false
    }

    // === Allocation ===

    /// Allocate a cell in the youngest generation and return its word.
    ///
    /// Emits a `GcProtect` error when called outside a GC-protected
    /// section, and a fatal `Memory` error when the heap is exhausted.
    pub(crate) fn alloc(&mut self, cell: Cell) -> Word {
        if self.pauders.load(Ordering::Relaxed) == 0 {
            self.raise(
                ErrorLevel::Error,
                ErrorCode::GcProtect,
                "allocation outside of a GC-protected section",
            );
        }
        match self.heap.alloc(0, cell) {
            Ok(r) => Word::from_cell_ref(r),
            Err(e) => {
                self.raise(ErrorLevel::Fatal, ErrorCode::Memory, &e.to_string());
                WORD_NIL
            }
        }
    }

    /// Record a cross-generational reference from the cell of `parent` to
    /// `child`, if any.
    pub(crate) fn barrier(&mut self, parent: Word, child: Word) {
        let (Some(p), Some(c)) = (parent.cell_ref(), child.cell_ref()) else {
            return;
        };
        let pg = self.heap.gen_of(p);
        let cg = self.heap.gen_of(c);
        if pg > cg {
            self.remembered[cg].insert(p);
        }
    }

    // === Word model ===

    /// Follow wrap cells down to the wrapped value.
    pub(crate) fn strip(&self, w: Word) -> Word {
        let mut w = w;
        while let Some(r) = w.cell_ref() {
            match self.heap.get(r) {
                Cell::Wrap { value, .. } => w = *value,
                _ => break,
            }
        }
        w
    }

    pub(crate) fn word_kind_impl(&self, w: Word) -> WordKind {
        if let Some(kind) = w.immediate_kind() {
            return kind;
        }
        match self.heap.get(w.cell_ref().unwrap()) {
            Cell::Int(_) => WordKind::INT,
            Cell::Float(_) => WordKind::FLOAT,
            Cell::Wrap { value, .. } => self.word_kind_impl(*value),
            Cell::Leaf(_) | Cell::UtfLeaf(_) => WordKind::STRING | WordKind::ROPE,
            Cell::Subrope { .. } | Cell::ConcatRope { .. } => WordKind::ROPE,
            Cell::Vector(_) => WordKind::VECTOR | WordKind::LIST,
            Cell::MVector { .. } => WordKind::MVECTOR | WordKind::VECTOR | WordKind::LIST,
            Cell::Sublist { .. } | Cell::ConcatList { .. } | Cell::CircularList { .. } => {
                WordKind::LIST
            }
            Cell::MList { .. } => WordKind::MLIST | WordKind::LIST,
            Cell::HashMap {
                keys: MapKeys::String,
                ..
            } => WordKind::MAP | WordKind::HASHMAP,
            Cell::HashMap {
                keys: MapKeys::Int, ..
            } => WordKind::INTMAP | WordKind::HASHMAP,
            Cell::TrieMap {
                keys: MapKeys::String,
                ..
            } => WordKind::MAP | WordKind::TRIEMAP,
            Cell::TrieMap {
                keys: MapKeys::Int, ..
            } => WordKind::INTMAP | WordKind::TRIEMAP,
            Cell::StrBuf(_) => WordKind::STRBUF,
            Cell::Custom(payload) => payload.kind(),
            Cell::Forward(_) | Cell::HashEntry { .. } | Cell::TrieNode { .. }
            | Cell::TrieLeaf { .. } => WordKind::empty(),
        }
    }

    pub(crate) fn int_word_value_impl(&self, w: Word) -> Option<i64> {
        let w = self.strip(w);
        if w.is_small_int() {
            return Some(w.small_int_value());
        }
        if let Some(r) = w.cell_ref() {
            if let Cell::Int(v) = self.heap.get(r) {
                return Some(*v);
            }
        }
        None
    }

    pub(crate) fn float_word_value_impl(&self, w: Word) -> Option<f64> {
        let w = self.strip(w);
        if w.is_small_float() {
            return Some(w.small_float_value());
        }
        if let Some(r) = w.cell_ref() {
            if let Cell::Float(v) = self.heap.get(r) {
                return Some(*v);
            }
        }
        None
    }

    /// Synonym of `w`: the next word in its chain, nil when none.
    pub(crate) fn word_synonym_impl(&self, w: Word) -> Word {
        let Some(r) = w.cell_ref() else {
            return WORD_NIL;
        };
        match self.heap.get(r) {
            Cell::Wrap { synonym, .. } => *synonym,
            _ => self.synonyms.get(&r.0).copied().unwrap_or(WORD_NIL),
        }
    }

    fn set_synonym(&mut self, w: Word, syn: Word) {
        let Some(r) = w.cell_ref() else { return };
        if let Cell::Wrap { .. } = self.heap.get(r) {
            if let Cell::Wrap { synonym, .. } = self.heap.get_mut(r) {
                *synonym = syn;
            }
        } else if syn.is_nil() {
            self.synonyms.remove(&r.0);
        } else {
            self.synonyms.insert(r.0, syn);
        }
        self.barrier(w, syn);
    }
}

enum CollectorMsg {
    Collect,
    Stop,
}

struct GcSync {
    pauders: usize,
    collecting: bool,
}

/// Shared state behind a runtime and its handles.
pub(crate) struct Shared {
    pub(crate) inner: Mutex<RuntimeInner>,
    sync: Mutex<GcSync>,
    cond: Condvar,
    model: ThreadingModel,
    pauders: Arc<AtomicUsize>,
    tx: Option<Sender<CollectorMsg>>,
    collector: Mutex<Option<JoinHandle<()>>>,
}

/// The Colibri runtime handle.
///
/// Exactly one runtime exists per appartment (or per group in the shared
/// model); it is cheap to clone and safe to share between the threads of a
/// group.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) shared: Arc<Shared>,
}

impl Runtime {
    /// Initialize a runtime with the default configuration.
    pub fn init(model: ThreadingModel) -> Self {
        Self::init_with_config(RuntimeConfig {
            model,
            ..Default::default()
        })
    }

    /// Initialize a runtime with a custom configuration.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    pub fn init_with_config(config: RuntimeConfig) -> Self {
        config.validate().expect("invalid runtime configuration");
        let model = config.model;
        let pauders = Arc::new(AtomicUsize::new(0));
        let inner = RuntimeInner::new(config, Arc::clone(&pauders));
        let (tx, rx) = match model {
            ThreadingModel::Single => (None, None),
            ThreadingModel::Async | ThreadingModel::Shared => {
                let (tx, rx) = unbounded();
                (Some(tx), Some(rx))
            }
        };
        let shared = Arc::new(Shared {
            inner: Mutex::new(inner),
            sync: Mutex::new(GcSync {
                pauders: 0,
                collecting: false,
            }),
            cond: Condvar::new(),
            model,
            pauders,
            tx,
            collector: Mutex::new(None),
        });
        if let Some(rx) = rx {
            // The thread holds a weak reference so dropping the last
            // runtime handle shuts it down.
            let weak = Arc::downgrade(&shared);
            let handle = std::thread::Builder::new()
                .name("colibri-gc".into())
                .spawn(move || {
                    while let Ok(msg) = rx.recv() {
                        match msg {
                            CollectorMsg::Collect => match weak.upgrade() {
                                Some(shared) => shared.run_collection(),
                                None => break,
                            },
                            CollectorMsg::Stop => break,
                        }
                    }
                })
                .expect("failed to spawn collector thread");
            *shared.collector.lock() = Some(handle);
        }
        log::debug!("runtime initialized (model {:?})", model);
        Runtime { shared }
    }

    /// Stop the collector thread and release the runtime's resources.
    ///
    /// Called automatically when the last handle drops.
    pub fn cleanup(&self) {
        self.shared.shutdown();
    }

    // === GC control ===

    /// Enter a GC-protected section. Pairs with [`Runtime::resume_gc`];
    /// pauses nest.
    pub fn pause_gc(&self) {
        let mut sync = self.shared.sync.lock();
        while sync.collecting {
            self.shared.cond.wait(&mut sync);
        }
        sync.pauders += 1;
        self.shared.pauders.store(sync.pauders, Ordering::Relaxed);
    }

    /// Try to enter a GC-protected section without blocking. Returns whether
    /// the pause was granted.
    pub fn try_pause_gc(&self) -> bool {
        let mut sync = self.shared.sync.lock();
        if sync.collecting {
            return false;
        }
        sync.pauders += 1;
        self.shared.pauders.store(sync.pauders, Ordering::Relaxed);
        true
    }

    /// Leave a GC-protected section. At the outermost resume, a collection
    /// runs (or is scheduled on the collector thread) if a generation
    /// exceeded its threshold.
    pub fn resume_gc(&self) {
        let outermost = {
            let mut sync = self.shared.sync.lock();
            debug_assert!(sync.pauders > 0, "resume without matching pause");
            sync.pauders = sync.pauders.saturating_sub(1);
            self.shared.pauders.store(sync.pauders, Ordering::Relaxed);
            if sync.pauders == 0 {
                self.shared.cond.notify_all();
                true
            } else {
                false
            }
        };
        if !outermost {
            return;
        }
        match self.shared.model {
            ThreadingModel::Single => {
                let mut inner = self.shared.inner.lock();
                inner.maybe_collect();
            }
            ThreadingModel::Async | ThreadingModel::Shared => {
                let needed = self.shared.inner.lock().collection_needed();
                if needed {
                    if let Some(tx) = &self.shared.tx {
                        let _ = tx.send(CollectorMsg::Collect);
                    }
                }
            }
        }
    }

    /// RAII GC-protected section: resumes on drop.
    pub fn pause(&self) -> PauseGuard {
        self.pause_gc();
        PauseGuard {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Force a collection at `level` (clamped to the oldest generation).
    ///
    /// All raw words not reachable from preserved roots are invalidated;
    /// re-read preserved words through their [`Preserved`] handles.
    pub fn collect(&self, level: usize) {
        let mut sync = self.shared.sync.lock();
        while sync.collecting {
            self.shared.cond.wait(&mut sync);
        }
        sync.collecting = true;
        drop(sync);
        self.shared.inner.lock().collect(level);
        let mut sync = self.shared.sync.lock();
        sync.collecting = false;
        self.shared.cond.notify_all();
    }

    // === Word lifetime ===

    /// Root `w` against collection. Calls nest; pair with
    /// [`Runtime::release_word`].
    pub fn preserve_word(&self, w: Word) {
        if w.is_immediate() {
            return;
        }
        self.shared.inner.lock().roots.preserve(w);
    }

    /// Drop one preservation of `w`. On the last release the word becomes
    /// reclaimable at the next collection.
    pub fn release_word(&self, w: Word) {
        if w.is_immediate() {
            return;
        }
        self.shared.inner.lock().roots.release(w);
    }

    /// Preserve `w` behind a handle that survives promotions: the handle
    /// re-reads the word's current location after each collection.
    pub fn preserve(&self, w: Word) -> Preserved {
        let slot = if w.is_immediate() {
            usize::MAX
        } else {
            self.shared.inner.lock().roots.preserve(w)
        };
        Preserved {
            shared: Arc::clone(&self.shared),
            slot,
            immediate: w,
        }
    }

    // === Error handling ===

    /// Install a custom error handler, returning control of the previous
    /// one to the default.
    pub fn set_error_proc(&self, proc: ErrorProc) {
        self.shared.inner.lock().error_proc = proc;
    }

    // === Word construction & inspection ===

    /// Boolean word for `value`.
    pub fn new_bool_word(&self, value: bool) -> Word {
        Word::bool_word(value)
    }

    /// Integer word for `value`: immediate when it fits half the pointer
    /// range, boxed otherwise.
    pub fn new_int_word(&self, value: i64) -> Word {
        match Word::small_int(value) {
            Some(w) => w,
            None => self.shared.inner.lock().alloc(Cell::Int(value)),
        }
    }

    /// Floating point word for `value`: immediate when the payload
    /// round-trips through the tag bits, boxed otherwise.
    pub fn new_float_word(&self, value: f64) -> Word {
        match Word::small_float(value) {
            Some(w) => w,
            None => self.shared.inner.lock().alloc(Cell::Float(value)),
        }
    }

    /// Single-character rope.
    pub fn new_char_word(&self, c: Char) -> Word {
        if c > crate::unicode::CHAR_MAX {
            let inner = self.shared.inner.lock();
            inner.value_error(ErrorCode::Char, &format!("invalid codepoint {c:#x}"));
            return WORD_NIL;
        }
        Word::char_word(c)
    }

    /// Type flags of `w`.
    pub fn word_type(&self, w: Word) -> WordKind {
        self.shared.inner.lock().word_kind_impl(w)
    }

    /// Value of a boolean word; `false` (with a typecheck error) otherwise.
    pub fn bool_word_value(&self, w: Word) -> bool {
        let inner = self.shared.inner.lock();
        let s = inner.strip(w);
        if s.is_bool() {
            s.bool_value()
        } else {
            inner.type_error(ErrorCode::Bool, w);
            false
        }
    }

    /// Value of an integer word; `0` (with a typecheck error) otherwise.
    pub fn int_word_value(&self, w: Word) -> i64 {
        let inner = self.shared.inner.lock();
        match inner.int_word_value_impl(w) {
            Some(v) => v,
            None => {
                inner.type_error(ErrorCode::Int, w);
                0
            }
        }
    }

    /// Value of a floating point word; `0.0` (with a typecheck error)
    /// otherwise.
    pub fn float_word_value(&self, w: Word) -> f64 {
        let inner = self.shared.inner.lock();
        match inner.float_word_value_impl(w) {
            Some(v) => v,
            None => {
                inner.type_error(ErrorCode::Float, w);
                0.0
            }
        }
    }

    /// Codepoint of a character word; `CHAR_INVALID` (with a typecheck
    /// error) otherwise.
    pub fn char_word_value(&self, w: Word) -> Char {
        let inner = self.shared.inner.lock();
        let s = inner.strip(w);
        if s.is_char() {
            s.char_value()
        } else {
            inner.type_error(ErrorCode::Char, w);
            CHAR_INVALID
        }
    }

    // === Synonyms ===

    /// Next word in the synonym chain of `w`, nil when none.
    pub fn word_synonym(&self, w: Word) -> Word {
        self.shared.inner.lock().word_synonym_impl(w)
    }

    /// Splice `synonym` into the chain of `*word`. When `*word` is
    /// immediate it is wrapped first and the slot is rewritten to the
    /// wrapper.
    pub fn word_add_synonym(&self, word: &mut Word, synonym: Word) {
        let mut inner = self.shared.inner.lock();
        if word.is_nil() {
            return;
        }
        if word.is_immediate() {
            let wrapped = inner.alloc(Cell::Wrap {
                value: *word,
                synonym: WORD_NIL,
            });
            *word = wrapped;
        }
        let old = inner.word_synonym_impl(*word);
        inner.set_synonym(*word, synonym);
        if !old.is_nil() && !synonym.is_nil() {
            // Append the previous chain behind the new synonym's own chain,
            // guarding against cycles.
            let mut tail = synonym;
            let mut steps = 0usize;
            loop {
                let next = inner.word_synonym_impl(tail);
                if next.is_nil() || next == synonym || steps > 1024 {
                    break;
                }
                tail = next;
                steps += 1;
            }
            inner.set_synonym(tail, old);
        }
    }

    /// Clear the synonym chain of `w`.
    pub fn word_clear_synonym(&self, w: Word) {
        let mut inner = self.shared.inner.lock();
        inner.set_synonym(w, WORD_NIL);
    }

    // === Custom words ===

    /// Create a custom word from a base descriptor.
    pub fn new_custom_word(&self, payload: Box<dyn CustomWord>) -> Word {
        self.shared
            .inner
            .lock()
            .alloc(Cell::Custom(CustomPayload::Word(payload)))
    }

    /// Create a custom rope word.
    pub fn new_custom_rope(&self, payload: Box<dyn CustomRope>) -> Word {
        self.shared
            .inner
            .lock()
            .alloc(Cell::Custom(CustomPayload::Rope(payload)))
    }

    /// Create a custom list word.
    pub fn new_custom_list(&self, payload: Box<dyn CustomList>) -> Word {
        self.shared
            .inner
            .lock()
            .alloc(Cell::Custom(CustomPayload::List(payload)))
    }

    /// Create a custom map word with word keys.
    pub fn new_custom_map(&self, payload: Box<dyn CustomMap>) -> Word {
        self.shared
            .inner
            .lock()
            .alloc(Cell::Custom(CustomPayload::Map(payload)))
    }

    /// Create a custom map word with integer keys.
    pub fn new_custom_int_map(&self, payload: Box<dyn CustomIntMap>) -> Word {
        self.shared
            .inner
            .lock()
            .alloc(Cell::Custom(CustomPayload::IntMap(payload)))
    }

    /// Inspect the descriptor and payload of a custom word. Returns `None`
    /// (with a typecheck error) when `w` is not custom.
    pub fn custom_word_info<R>(&self, w: Word, f: impl FnOnce(&dyn CustomWord) -> R) -> Option<R> {
        let inner = self.shared.inner.lock();
        let s = inner.strip(w);
        match s.cell_ref().map(|r| inner.heap.get(r)) {
            Some(Cell::Custom(payload)) => Some(f(payload.base())),
            _ => {
                inner.type_error(ErrorCode::CustomWord, w);
                None
            }
        }
    }

    /// Mutate the payload of a custom word. Returns `None` (with a
    /// typecheck error) when `w` is not custom.
    pub fn custom_word_info_mut<R>(
        &self,
        w: Word,
        f: impl FnOnce(&mut dyn CustomWord) -> R,
    ) -> Option<R> {
        let mut inner = self.shared.inner.lock();
        let s = inner.strip(w);
        let Some(r) = s.cell_ref() else {
            inner.type_error(ErrorCode::CustomWord, w);
            return None;
        };
        match inner.heap.get_mut(r) {
            Cell::Custom(payload) => Some(f(payload.base_mut())),
            _ => {
                inner.type_error(ErrorCode::CustomWord, w);
                None
            }
        }
    }
}

impl Shared {
    fn run_collection(self: &Arc<Self>) {
        let mut sync = self.sync.lock();
        while sync.pauders > 0 {
            self.cond.wait(&mut sync);
        }
        sync.collecting = true;
        drop(sync);

        self.inner.lock().maybe_collect();

        let mut sync = self.sync.lock();
        sync.collecting = false;
        self.cond.notify_all();
    }

    fn shutdown(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(CollectorMsg::Stop);
        }
        if let Some(handle) = self.collector.lock().take() {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(CollectorMsg::Stop);
        }
        if let Some(handle) = self.collector.get_mut().take() {
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// RAII handle of a GC-protected section.
pub struct PauseGuard {
    shared: Arc<Shared>,
}

impl Drop for PauseGuard {
    fn drop(&mut self) {
        let rt = Runtime {
            shared: Arc::clone(&self.shared),
        };
        rt.resume_gc();
    }
}

/// A preserved word handle: roots the word and re-reads its current
/// location after promotions.
pub struct Preserved {
    shared: Arc<Shared>,
    slot: usize,
    immediate: Word,
}

impl Preserved {
    /// Current word value.
    pub fn get(&self) -> Word {
        if self.slot == usize::MAX {
            self.immediate
        } else {
            self.shared.inner.lock().roots.word(self.slot)
        }
    }
}

impl Drop for Preserved {
    fn drop(&mut self) {
        if self.slot != usize::MAX {
            self.shared.inner.lock().roots.release_slot(self.slot);
        }
    }
}
