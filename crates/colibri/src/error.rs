//! Error Module - Colibri Error Types
//!
//! Two layers of error reporting coexist:
//!
//! - [`RuntimeError`] is the internal fallible-operation type used by the
//!   allocator and collector plumbing.
//! - The *error proc* is the public reporting channel. Every contract
//!   violation (wrong word type, out-of-range index, oversized result) is
//!   routed through a settable handler together with an [`ErrorLevel`] and an
//!   [`ErrorCode`]. Type and value checks are idempotent: the offending call
//!   returns a harmless default and the library state is unchanged. Fatal and
//!   error levels are not recoverable; the default handler panics on them.

use thiserror::Error;

/// Error severity levels.
///
/// `TypeCheck` and `ValueCheck` are idempotent and safe to ignore; the other
/// levels leave the library in an unusable or inconsistent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorLevel {
    /// Unrecoverable error within Colibri, forces termination.
    Fatal,
    /// Error with potential side effects, typically caused by the
    /// application (e.g. allocating outside a GC-protected section).
    Error,
    /// Idempotent type-related error: a word of the wrong type was passed.
    TypeCheck,
    /// Idempotent value-related error: a length, index or iterator was used
    /// outside of its validity range.
    ValueCheck,
}

impl std::fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorLevel::Fatal => write!(f, "FATAL"),
            ErrorLevel::Error => write!(f, "ERROR"),
            ErrorLevel::TypeCheck => write!(f, "TYPECHECK"),
            ErrorLevel::ValueCheck => write!(f, "VALUECHECK"),
        }
    }
}

/// Error codes of the Colibri error domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    /// Generic error.
    Generic,
    /// Assertion failed.
    Assertion,
    /// Memory error.
    Memory,
    /// Outside of a GC-protected section.
    GcProtect,
    /// Not a boolean word.
    Bool,
    /// Not an integer word.
    Int,
    /// Not a floating point word.
    Float,
    /// Not a custom word.
    CustomWord,
    /// Not a character word.
    Char,
    /// Not a string word.
    String,
    /// Not a rope.
    Rope,
    /// Rope index out of bounds.
    RopeIndex,
    /// Concat rope too large.
    RopeLengthConcat,
    /// Repeat rope too large.
    RopeLengthRepeat,
    /// Invalid rope iterator.
    RopeIter,
    /// Rope iterator at end.
    RopeIterEnd,
    /// Not a vector.
    Vector,
    /// Not a mutable vector.
    MVector,
    /// Vector too large.
    VectorLength,
    /// Not a list.
    List,
    /// Not a mutable list.
    MList,
    /// List index out of bounds.
    ListIndex,
    /// Concat list too large.
    ListLengthConcat,
    /// Repeat list too large.
    ListLengthRepeat,
    /// Invalid list iterator.
    ListIter,
    /// List iterator at end.
    ListIterEnd,
    /// Not a map.
    Map,
    /// Not a string or word-keyed map.
    WordMap,
    /// Not an integer-keyed map.
    IntMap,
    /// Not a hash map.
    HashMap,
    /// Not a string or word-keyed hash map.
    WordHashMap,
    /// Not an integer-keyed hash map.
    IntHashMap,
    /// Not a trie map.
    TrieMap,
    /// Not a string or word-keyed trie map.
    WordTrieMap,
    /// Not an integer-keyed trie map.
    IntTrieMap,
    /// Invalid map iterator.
    MapIter,
    /// Map iterator at end.
    MapIterEnd,
    /// Not a string buffer.
    StrBuf,
    /// String format not supported by string buffers.
    StrBufFormat,
}

impl ErrorCode {
    /// Message of this code in the Colibri error domain.
    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Generic => "generic error",
            ErrorCode::Assertion => "assertion failed",
            ErrorCode::Memory => "memory error",
            ErrorCode::GcProtect => "outside of a GC-protected section",
            ErrorCode::Bool => "not a boolean word",
            ErrorCode::Int => "not an integer word",
            ErrorCode::Float => "not a floating point word",
            ErrorCode::CustomWord => "not a custom word",
            ErrorCode::Char => "not a character word",
            ErrorCode::String => "not a string word",
            ErrorCode::Rope => "not a rope",
            ErrorCode::RopeIndex => "rope index out of bounds",
            ErrorCode::RopeLengthConcat => "concat rope too large",
            ErrorCode::RopeLengthRepeat => "repeat rope too large",
            ErrorCode::RopeIter => "invalid rope iterator",
            ErrorCode::RopeIterEnd => "rope iterator at end",
            ErrorCode::Vector => "not a vector",
            ErrorCode::MVector => "not a mutable vector",
            ErrorCode::VectorLength => "vector too large",
            ErrorCode::List => "not a list",
            ErrorCode::MList => "not a mutable list",
            ErrorCode::ListIndex => "list index out of bounds",
            ErrorCode::ListLengthConcat => "concat list too large",
            ErrorCode::ListLengthRepeat => "repeat list too large",
            ErrorCode::ListIter => "invalid list iterator",
            ErrorCode::ListIterEnd => "list iterator at end",
            ErrorCode::Map => "not a map",
            ErrorCode::WordMap => "not a string or word-keyed map",
            ErrorCode::IntMap => "not an integer-keyed map",
            ErrorCode::HashMap => "not a hash map",
            ErrorCode::WordHashMap => "not a string or word-keyed hash map",
            ErrorCode::IntHashMap => "not an integer-keyed hash map",
            ErrorCode::TrieMap => "not a trie map",
            ErrorCode::WordTrieMap => "not a string or word-keyed trie map",
            ErrorCode::IntTrieMap => "not an integer-keyed trie map",
            ErrorCode::MapIter => "invalid map iterator",
            ErrorCode::MapIterEnd => "map iterator at end",
            ErrorCode::StrBuf => "not a string buffer",
            ErrorCode::StrBufFormat => "string format not supported",
        }
    }
}

/// Handler invoked on every reported error.
///
/// Returns `true` to continue processing (the offending call then returns its
/// harmless default), `false` to stop further error processing.
pub type ErrorProc = Box<dyn Fn(ErrorLevel, ErrorCode, &str) -> bool + Send>;

/// Default error handler: log, and panic on non-idempotent levels.
pub(crate) fn default_error_proc(level: ErrorLevel, code: ErrorCode, msg: &str) -> bool {
    match level {
        ErrorLevel::Fatal | ErrorLevel::Error => {
            log::error!("[{}] {}: {}", level, code.message(), msg);
            panic!("colibri: [{}] {}: {}", level, code.message(), msg);
        }
        ErrorLevel::TypeCheck | ErrorLevel::ValueCheck => {
            log::debug!("[{}] {}: {}", level, code.message(), msg);
            true
        }
    }
}

/// Internal error type for fallible runtime operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("out of memory: requested {requested} cells")]
    OutOfMemory { requested: usize },

    #[error("heap initialization failed: {0}")]
    HeapInitialization(String),

    #[error("invalid cell reference: {index:#x}")]
    InvalidCell { index: u64 },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("collector thread error: {0}")]
    Collector(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for internal Colibri operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(ErrorLevel::Fatal < ErrorLevel::Error);
        assert!(ErrorLevel::Error < ErrorLevel::TypeCheck);
        assert!(ErrorLevel::TypeCheck < ErrorLevel::ValueCheck);
    }

    #[test]
    fn test_messages_not_empty() {
        assert!(!ErrorCode::GcProtect.message().is_empty());
        assert!(!ErrorCode::StrBufFormat.message().is_empty());
    }

    #[test]
    fn test_default_proc_continues_on_checks() {
        assert!(default_error_proc(
            ErrorLevel::TypeCheck,
            ErrorCode::Rope,
            "word 0x0"
        ));
        assert!(default_error_proc(
            ErrorLevel::ValueCheck,
            ErrorCode::RopeIndex,
            "index 4 beyond length 2"
        ));
    }
}
