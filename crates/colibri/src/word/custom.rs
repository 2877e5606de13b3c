//! Custom Words - Application-Defined Word Types
//!
//! Custom words are words whose payload and behavior are defined by
//! applicative code. They can extend existing word types like ropes, lists or
//! maps, or define application-specific data types.
//!
//! A custom word is created from a boxed descriptor trait object. The base
//! [`CustomWord`] trait supplies the garbage collector hooks: child
//! enumeration during the mark phase (children are movable, so the visitor
//! may rewrite each child slot) and cleanup on sweep (the payload's `Drop`
//! implementation, run exactly once when the word is collected).

use std::any::Any;

use crate::unicode::Char;
use crate::word::Word;

/// Base descriptor for custom word types.
///
/// Payloads must be `Any + Send`; applications recover their concrete type
/// through [`Runtime::custom_word_info`](crate::Runtime::custom_word_info)
/// and `dyn Any` downcasting.
pub trait CustomWord: Any + Send {
    /// Name of the type, e.g. `"regex"`.
    fn name(&self) -> &str {
        "custom"
    }

    /// Called during the mark phase of the garbage collection to iterate
    /// over the words owned by this payload, in no special order. The
    /// visitor may rewrite each child slot to the child's new location.
    fn children(&mut self, _visit: &mut dyn FnMut(&mut Word)) {}
}

/// Custom rope descriptor: an opaque immutable character sequence.
///
/// Generic subrope and concat handling wraps custom ropes in ordinary
/// subrope and concat nodes; only element access is delegated.
pub trait CustomRope: CustomWord {
    /// Number of codepoints in the rope.
    fn length(&self) -> usize;

    /// Codepoint at `index`. Only called with `index < length()`.
    fn char_at(&self, index: usize) -> Char;
}

/// Custom list descriptor: an opaque immutable word sequence.
pub trait CustomList: CustomWord {
    /// Number of elements in the list.
    fn length(&self) -> usize;

    /// Element at `index`. Only called with `index < length()`.
    fn element_at(&self, index: usize) -> Word;
}

/// Iterator state of custom map implementations: two opaque client slots.
pub type CustomMapIterState = (u64, u64);

/// Custom map descriptor with word keys: storage and iteration are both
/// supplied by the application.
pub trait CustomMap: CustomWord {
    /// Number of entries in the map.
    fn size(&self) -> usize;

    /// Value mapped to `key`, if present.
    fn get(&self, key: Word) -> Option<Word>;

    /// Map `key` to `value`, replacing any existing entry. Returns `true`
    /// if an entry was created, `false` if an existing one was updated.
    fn set(&mut self, key: Word, value: Word) -> bool;

    /// Remove the entry for `key`. Returns whether an entry was removed.
    fn unset(&mut self, key: Word) -> bool;

    /// State for the first entry in iteration order, `None` when empty.
    fn iter_begin(&self) -> Option<CustomMapIterState>;

    /// State for the entry mapping `key`, if present.
    fn iter_find(&self, key: Word) -> Option<CustomMapIterState>;

    /// State for the entry following `state`, `None` at the end.
    fn iter_next(&self, state: CustomMapIterState) -> Option<CustomMapIterState>;

    /// Key of the entry designated by `state`.
    fn iter_key(&self, state: CustomMapIterState) -> Word;

    /// Value of the entry designated by `state`.
    fn iter_value(&self, state: CustomMapIterState) -> Word;

    /// Replace the value of the entry designated by `state`.
    fn iter_set_value(&mut self, state: CustomMapIterState, value: Word);
}

/// Custom map descriptor with integer keys.
pub trait CustomIntMap: CustomWord {
    /// Number of entries in the map.
    fn size(&self) -> usize;

    /// Value mapped to `key`, if present.
    fn get(&self, key: i64) -> Option<Word>;

    /// Map `key` to `value`. Returns `true` if an entry was created.
    fn set(&mut self, key: i64, value: Word) -> bool;

    /// Remove the entry for `key`. Returns whether an entry was removed.
    fn unset(&mut self, key: i64) -> bool;

    /// State for the first entry in iteration order, `None` when empty.
    fn iter_begin(&self) -> Option<CustomMapIterState>;

    /// State for the entry mapping `key`, if present.
    fn iter_find(&self, key: i64) -> Option<CustomMapIterState>;

    /// State for the entry following `state`, `None` at the end.
    fn iter_next(&self, state: CustomMapIterState) -> Option<CustomMapIterState>;

    /// Key of the entry designated by `state`.
    fn iter_key(&self, state: CustomMapIterState) -> i64;

    /// Value of the entry designated by `state`.
    fn iter_value(&self, state: CustomMapIterState) -> Word;

    /// Replace the value of the entry designated by `state`.
    fn iter_set_value(&mut self, state: CustomMapIterState, value: Word);
}

/// Key hooks of custom hash maps: the bucket storage is the built-in one,
/// only hashing and key equality are delegated.
pub trait CustomHashKeys: Send + Sync {
    /// Hash of `key`.
    fn hash(&self, ctx: &KeyContext<'_>, key: Word) -> u64;

    /// Whether `key1` and `key2` are equal.
    fn equal(&self, ctx: &KeyContext<'_>, key1: Word, key2: Word) -> bool;
}

/// Key hooks of custom trie maps: the crit-bit storage is the built-in one,
/// only bit access and key comparison are delegated.
pub trait CustomTrieKeys: Send + Sync {
    /// Test the bit of `key` designated by `(index, mask)`.
    fn bit_test(&self, ctx: &KeyContext<'_>, key: Word, index: usize, mask: u64) -> bool;

    /// First difference between two keys: `None` if equal, else the
    /// `(index, mask)` coordinates of the critical bit and the ordering of
    /// `key1` relative to `key2` at that bit.
    fn key_diff(
        &self,
        ctx: &KeyContext<'_>,
        key1: Word,
        key2: Word,
    ) -> Option<(usize, u64, std::cmp::Ordering)>;
}

/// Read-only view of the runtime passed to custom key hooks, so they can
/// inspect rope or integer keys without re-entering the public API.
pub struct KeyContext<'a> {
    pub(crate) inner: &'a crate::runtime::RuntimeInner,
}

impl KeyContext<'_> {
    /// Number of codepoints in a rope key.
    pub fn rope_length(&self, rope: Word) -> usize {
        self.inner.rope_length_impl(rope)
    }

    /// Codepoint of a rope key at `index`.
    pub fn rope_at(&self, rope: Word, index: usize) -> Option<Char> {
        self.inner.rope_at_impl(rope, index)
    }

    /// Lexicographic comparison of two rope keys.
    pub fn compare_ropes(&self, rope1: Word, rope2: Word) -> std::cmp::Ordering {
        self.inner.compare_ropes_impl(rope1, rope2, 0, usize::MAX).0
    }

    /// Value of an integer key word.
    pub fn int_value(&self, word: Word) -> i64 {
        self.inner.int_word_value_impl(word).unwrap_or(0)
    }
}

/// Payload of a custom word cell: the base descriptor or one of its
/// type-extending specializations.
pub(crate) enum CustomPayload {
    Word(Box<dyn CustomWord>),
    Rope(Box<dyn CustomRope>),
    List(Box<dyn CustomList>),
    Map(Box<dyn CustomMap>),
    IntMap(Box<dyn CustomIntMap>),
}

impl CustomPayload {
    pub(crate) fn base(&self) -> &dyn CustomWord {
        match self {
            CustomPayload::Word(p) => p.as_ref(),
            CustomPayload::Rope(p) => p.as_ref(),
            CustomPayload::List(p) => p.as_ref(),
            CustomPayload::Map(p) => p.as_ref(),
            CustomPayload::IntMap(p) => p.as_ref(),
        }
    }

    pub(crate) fn base_mut(&mut self) -> &mut dyn CustomWord {
        match self {
            CustomPayload::Word(p) => p.as_mut(),
            CustomPayload::Rope(p) => p.as_mut(),
            CustomPayload::List(p) => p.as_mut(),
            CustomPayload::Map(p) => p.as_mut(),
            CustomPayload::IntMap(p) => p.as_mut(),
        }
    }

    /// Extra type flags contributed by the specialization.
    pub(crate) fn kind(&self) -> crate::word::WordKind {
        use crate::word::WordKind;
        match self {
            CustomPayload::Word(_) => WordKind::CUSTOM,
            CustomPayload::Rope(_) => WordKind::CUSTOM | WordKind::ROPE,
            CustomPayload::List(_) => WordKind::CUSTOM | WordKind::LIST,
            CustomPayload::Map(_) => WordKind::CUSTOM | WordKind::MAP,
            CustomPayload::IntMap(_) => WordKind::CUSTOM | WordKind::INTMAP,
        }
    }
}
