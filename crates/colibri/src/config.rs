//! Configuration Module - Runtime Tuning Parameters
//!
//! Manages all configuration parameters for a Colibri runtime: the threading
//! model chosen at initialization and the heap tuning knobs driving automatic
//! collections.

use crate::error::{Result, RuntimeError};

/// Threading models chosen at initialization time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadingModel {
    /// Strict appartment plus stop-the-world model. Collection is performed
    /// synchronously on the client thread when it resumes the GC.
    #[default]
    Single,
    /// Strict appartment model with asynchronous GC. Collection runs on a
    /// dedicated thread; the client thread cannot pause a running collection
    /// and blocks until completion.
    Async,
    /// Shared multithreaded model. Client threads of the same group may
    /// share words; collection runs on a dedicated thread once every group
    /// member is out of its pause.
    Shared,
}

/// Main configuration for a Colibri runtime.
///
/// Most parameters have sensible defaults.
///
/// # Examples
///
/// ```rust
/// use colibri::{RuntimeConfig, ThreadingModel};
///
/// // Default: single-appartment, stop-the-world.
/// let config = RuntimeConfig::default();
///
/// // Asynchronous collector with a larger young generation.
/// let config = RuntimeConfig {
///     model: ThreadingModel::Async,
///     gen0_page_threshold: 64,
///     ..Default::default()
/// };
/// # let _ = config;
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Threading model for this runtime.
    pub model: ThreadingModel,

    /// Number of generations beyond the youngest.
    ///
    /// Cells promote one generation per surviving collection, up to this
    /// index. Default: 5.
    pub max_generation: usize,

    /// Page count of generation 0 above which a collection is scheduled at
    /// the outermost resume.
    ///
    /// Default: 32 pages.
    pub gen0_page_threshold: usize,

    /// Growth factor applied to the page threshold of each successive
    /// generation.
    ///
    /// Generation g is considered full past
    /// `gen0_page_threshold * gen_threshold_factor^g` pages. Default: 2.
    pub gen_threshold_factor: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model: ThreadingModel::Single,
            max_generation: 5,
            gen0_page_threshold: 32,
            gen_threshold_factor: 2,
        }
    }
}

impl RuntimeConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<()> {
        if self.max_generation == 0 {
            return Err(RuntimeError::Configuration(
                "max_generation must be at least 1".into(),
            ));
        }
        if self.gen0_page_threshold == 0 {
            return Err(RuntimeError::Configuration(
                "gen0_page_threshold must be nonzero".into(),
            ));
        }
        if self.gen_threshold_factor == 0 {
            return Err(RuntimeError::Configuration(
                "gen_threshold_factor must be nonzero".into(),
            ));
        }
        Ok(())
    }

    /// Page threshold of generation `gen`.
    pub(crate) fn threshold(&self, gen: usize) -> usize {
        self.gen0_page_threshold
            .saturating_mul(self.gen_threshold_factor.saturating_pow(gen as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_generation_count() {
        let config = RuntimeConfig {
            max_generation: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_growth() {
        let config = RuntimeConfig::default();
        assert_eq!(config.threshold(0), 32);
        assert_eq!(config.threshold(1), 64);
        assert_eq!(config.threshold(3), 256);
    }
}
