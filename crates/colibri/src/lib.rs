//! # Colibri - A Uniform Value Substrate with a Generational Collector
//!
//! Colibri provides a uniform abstract value type (the *word*) backed by an
//! exact, generational, moving garbage collector over a cell-based
//! allocator, and a family of persistent collections built on top of it:
//!
//! - **Ropes**: immutable Unicode character sequences as balanced trees
//!   over UCS/UTF leaves
//! - **Vectors**: flat word arrays, immutable or capacity-bounded mutable
//! - **Lists**: rope-shaped trees over words, with void runs for sparse
//!   data, cheap circular tails and a lazily copied mutable variant
//! - **Maps**: string- and integer-keyed associative containers backed by
//!   chained hash maps or crit-bit trie maps, both sharing structure with
//!   immutable snapshots
//! - **String buffers**: growing accumulators that emit ropes on freeze
//!
//! Concatenation, slicing and repetition are O(log n) sharing operations
//! rather than O(n) copies.
//!
//! ## Quick Start
//!
//! ```rust
//! use colibri::{Runtime, ThreadingModel};
//!
//! let rt = Runtime::init(ThreadingModel::Single);
//!
//! // Allocation-bearing operations run inside a GC-protected section.
//! let guard = rt.pause();
//! let hello = rt.new_rope_from_string("hello, ");
//! let world = rt.new_rope_from_string("world");
//! let both = rt.concat_ropes(hello, world);
//! assert_eq!(rt.rope_length(both), 12);
//! drop(guard);
//! ```
//!
//! ## Words
//!
//! A [`Word`] is one machine word. Nil, booleans, small integers, small
//! floats, single characters and short Latin-1 strings are *immediate*:
//! the value lives in the tag bits and equal immediates are bit-identical.
//! Everything else references a cell of the managed heap and is reclaimed
//! by the collector once unreachable.
//!
//! ## Garbage collection
//!
//! Client code brackets allocation-bearing sections with
//! [`Runtime::pause_gc`] / [`Runtime::resume_gc`] (or the RAII
//! [`PauseGuard`]). Collections promote surviving cells one generation up
//! and rewrite every reference; words that must survive across collections
//! are rooted with [`Runtime::preserve`], and the returned handle re-reads
//! the current location.
//!
//! ## Threading models
//!
//! [`ThreadingModel::Single`] runs collections synchronously on the client
//! thread at the outermost resume. [`ThreadingModel::Async`] and
//! [`ThreadingModel::Shared`] dispatch them to a dedicated collector
//! thread; in the shared model several client threads of one group share
//! the runtime and words, each pausing independently.
//!
//! ## Modules
//!
//! - [`config`]: runtime configuration and threading models
//! - [`error`]: error levels, codes and the settable error handler
//! - [`unicode`]: codepoint model and UTF-8/16 width tables
//! - [`word`]: the word type, type flags and custom word descriptors
//! - [`rope`]: rope operations, chunk traversal and iterators
//! - [`list`]: list operations, mutable lists, traversal and iterators
//! - [`map`]: generic map operations, hash maps, trie maps and iterators

pub mod config;
pub mod error;
pub mod unicode;
pub mod word;

// Memory management subsystems
pub(crate) mod gc;
pub(crate) mod heap;
pub(crate) mod runtime;

// Collection engines
pub mod list;
pub mod map;
pub mod rope;
pub(crate) mod strbuf;
pub(crate) mod vector;

// Re-export main types for convenience
pub use config::{RuntimeConfig, ThreadingModel};
pub use error::{ErrorCode, ErrorLevel, ErrorProc, Result, RuntimeError};
pub use heap::max_vector_length;
pub use list::{ListChunk, ListIter};
pub use map::MapIter;
pub use rope::{RopeChunk, RopeIter};
pub use runtime::{PauseGuard, Preserved, Runtime};
pub use unicode::{Char, StringFormat, CHAR_INVALID, CHAR_MAX};
pub use word::custom::{
    CustomHashKeys, CustomIntMap, CustomList, CustomMap, CustomRope, CustomTrieKeys, CustomWord,
    KeyContext,
};
pub use word::{Word, WordKind, WORD_FALSE, WORD_NIL, WORD_TRUE};

/// Colibri version string from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize a runtime with the default (single-appartment) model.
pub fn init() -> Runtime {
    Runtime::init(ThreadingModel::Single)
}

/// Initialize a runtime with a custom configuration.
pub fn init_with_config(config: RuntimeConfig) -> Runtime {
    Runtime::init_with_config(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_default() {
        let rt = init();
        assert_eq!(rt.word_type(WORD_NIL), WordKind::empty());
    }

    #[test]
    fn test_version_not_empty() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_quick_start() {
        let rt = init();
        let guard = rt.pause();
        let hello = rt.new_rope_from_string("hello, ");
        let world = rt.new_rope_from_string("world");
        let both = rt.concat_ropes(hello, world);
        assert_eq!(rt.rope_length(both), 12);
        drop(guard);
    }
}
