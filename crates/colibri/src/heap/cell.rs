//! Cell Representations - Heap Word Payloads
//!
//! Every heap word is backed by one cell slot holding a [`Cell`] value. The
//! variants cover all built-in representations plus the forwarding marker
//! left behind when the collector moves a cell to an older generation.

use crate::heap::CELL_BYTES;
use crate::unicode::{self, Char, StringFormat};
use crate::word::custom::CustomPayload;
use crate::word::Word;

use super::CellRef;

/// Flat fixed-width string leaf.
pub(crate) struct Leaf {
    /// Character width in bytes: 1, 2 or 4.
    pub width: u8,
    /// Raw character data, `width` bytes per codepoint, native endianness.
    pub bytes: Box<[u8]>,
}

impl Leaf {
    pub(crate) fn len(&self) -> usize {
        self.bytes.len() / self.width as usize
    }

    pub(crate) fn format(&self) -> StringFormat {
        match self.width {
            1 => StringFormat::Ucs1,
            2 => StringFormat::Ucs2,
            _ => StringFormat::Ucs4,
        }
    }

    pub(crate) fn char_at(&self, index: usize) -> Char {
        let w = self.width as usize;
        unicode::char_get(self.format(), &self.bytes, index * w)
    }

    /// Build a leaf of the given width from codepoints.
    pub(crate) fn from_chars(width: u8, chars: &[Char]) -> Leaf {
        let mut bytes = Vec::with_capacity(chars.len() * width as usize);
        let format = match width {
            1 => StringFormat::Ucs1,
            2 => StringFormat::Ucs2,
            _ => StringFormat::Ucs4,
        };
        for &c in chars {
            unicode::fixed_set(format, &mut bytes, c);
        }
        Leaf {
            width,
            bytes: bytes.into_boxed_slice(),
        }
    }
}

/// Variable-width string leaf with a cached codepoint count.
pub(crate) struct UtfLeaf {
    /// `Utf8` or `Utf16`.
    pub format: StringFormat,
    /// Encoded data, native endianness for UTF-16.
    pub bytes: Box<[u8]>,
    /// Number of codepoints encoded in `bytes`.
    pub chars: usize,
}

impl UtfLeaf {
    /// Codepoint at `index`, scanning from the cheaper end.
    pub(crate) fn char_at(&self, index: usize) -> Char {
        match self.format {
            StringFormat::Utf8 => {
                let p = unicode::utf8_addr(&self.bytes, index, self.chars);
                unicode::utf8_get(&self.bytes, p)
            }
            _ => {
                let units = unicode::units16(&self.bytes);
                let p = unicode::utf16_addr(&units, index, self.chars);
                unicode::utf16_get(&units, p)
            }
        }
    }
}

/// String buffer state: an accumulator rope plus the currently open
/// fixed-width leaf.
pub(crate) struct StrBuf {
    /// Target format of the buffer; always fixed-width.
    pub format: StringFormat,
    /// Capacity of the open leaf, in codepoints.
    pub max_length: usize,
    /// Rope accumulated so far.
    pub rope: Word,
    /// Codepoint count of `rope`.
    pub rope_len: usize,
    /// Open leaf data in `format` width.
    pub buffer: Vec<u8>,
}

impl StrBuf {
    pub(crate) fn buffer_len(&self) -> usize {
        self.buffer.len() / self.format.unit_width()
    }

    pub(crate) fn total_len(&self) -> usize {
        self.rope_len + self.buffer_len()
    }
}

/// Key kind of a map word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MapKeys {
    /// String (rope) or generic word keys.
    String,
    /// Integer keys.
    Int,
}

/// One heap cell.
pub(crate) enum Cell {
    /// Forwarding marker left in a vacated slot during promotion.
    Forward(CellRef),

    /// Boxed integer outside the immediate range.
    Int(i64),
    /// Boxed floating point value.
    Float(f64),
    /// Wrapper giving an immediate value a synonym slot.
    Wrap { value: Word, synonym: Word },

    /// Flat fixed-width string leaf.
    Leaf(Leaf),
    /// Variable-width string leaf.
    UtfLeaf(UtfLeaf),
    /// View over a range of a source rope.
    Subrope {
        depth: u8,
        source: Word,
        first: usize,
        last: usize,
    },
    /// Balanced concatenation of two ropes.
    ConcatRope {
        depth: u8,
        length: usize,
        left_len: usize,
        left: Word,
        right: Word,
    },

    /// Flat immutable word vector.
    Vector(Box<[Word]>),
    /// Mutable word vector with capacity distinct from length.
    MVector { length: usize, elems: Box<[Word]> },
    /// View over a range of a source list.
    Sublist {
        depth: u8,
        source: Word,
        first: usize,
        last: usize,
    },
    /// Concatenation of two lists. Mutable nodes are exclusively owned by
    /// an enclosing mutable list and may be modified in place.
    ConcatList {
        depth: u8,
        length: usize,
        left_len: usize,
        left: Word,
        right: Word,
        mutable: bool,
    },
    /// Core list whose tail loops back onto itself.
    CircularList { core: Word },
    /// Mutable list root; the root subtree is replaced in place on writes.
    MList { root: Word },

    /// Hash map header. `buckets` is a vector word (mutable when owned,
    /// frozen after a copy) of entry chain heads.
    HashMap {
        keys: MapKeys,
        buckets: Word,
        size: usize,
        custom: Option<std::sync::Arc<dyn crate::word::custom::CustomHashKeys>>,
    },
    /// Hash map entry: a chain link in one bucket.
    HashEntry {
        key: Word,
        value: Word,
        next: Word,
        hash: u64,
        mutable: bool,
    },

    /// Trie map header.
    TrieMap {
        keys: MapKeys,
        root: Word,
        size: usize,
        custom: Option<std::sync::Arc<dyn crate::word::custom::CustomTrieKeys>>,
    },
    /// Crit-bit trie branch: children differ first at bit `(index, mask)`.
    TrieNode {
        index: usize,
        mask: u64,
        left: Word,
        right: Word,
        mutable: bool,
    },
    /// Trie leaf holding one entry.
    TrieLeaf {
        key: Word,
        value: Word,
        mutable: bool,
    },

    /// String buffer.
    StrBuf(StrBuf),

    /// Custom word with an application-supplied descriptor.
    Custom(CustomPayload),
}

impl Cell {
    /// Enumerate the word fields of this cell. The collector rewrites each
    /// slot through the visitor when the referenced cell moves.
    pub(crate) fn visit_children(&mut self, visit: &mut dyn FnMut(&mut Word)) {
        match self {
            Cell::Forward(_) | Cell::Int(_) | Cell::Float(_) => {}
            Cell::Leaf(_) | Cell::UtfLeaf(_) => {}
            Cell::Wrap { value, synonym } => {
                visit(value);
                visit(synonym);
            }
            Cell::Subrope { source, .. } | Cell::Sublist { source, .. } => visit(source),
            Cell::ConcatRope { left, right, .. } => {
                visit(left);
                visit(right);
            }
            Cell::Vector(elems) => {
                for w in elems.iter_mut() {
                    visit(w);
                }
            }
            Cell::MVector { elems, .. } => {
                for w in elems.iter_mut() {
                    visit(w);
                }
            }
            Cell::ConcatList { left, right, .. } => {
                visit(left);
                visit(right);
            }
            Cell::CircularList { core } => visit(core),
            Cell::MList { root } => visit(root),
            Cell::HashMap { buckets, .. } => visit(buckets),
            Cell::HashEntry {
                key, value, next, ..
            } => {
                visit(key);
                visit(value);
                visit(next);
            }
            Cell::TrieMap { root, .. } => visit(root),
            Cell::TrieNode { left, right, .. } => {
                visit(left);
                visit(right);
            }
            Cell::TrieLeaf { key, value, .. } => {
                visit(key);
                visit(value);
            }
            Cell::StrBuf(sb) => visit(&mut sb.rope),
            Cell::Custom(payload) => payload.base_mut().children(visit),
        }
    }

    /// Number of logical cells this value spans, for generation sizing.
    pub(crate) fn span(&self) -> usize {
        let payload = match self {
            Cell::Leaf(l) => l.bytes.len(),
            Cell::UtfLeaf(l) => l.bytes.len(),
            Cell::Vector(elems) => elems.len() * 8,
            Cell::MVector { elems, .. } => elems.len() * 8,
            Cell::StrBuf(sb) => sb.max_length * sb.format.unit_width(),
            _ => 0,
        };
        1 + payload.div_ceil(CELL_BYTES)
    }
}
