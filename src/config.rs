//! Engine configuration.
//!
//! An [`EngineConfig`] is consumed once, when the engine is constructed.
//! Later changes to the library path or allocation limit go through the
//! engine's own operations ([`crate::Engine::set_libpath`],
//! [`crate::Engine::set_alloc_limit`]) and are visible in
//! [`crate::Engine::config`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RosieError};

/// Smallest non-zero allocation limit, in megabytes.
pub const MIN_ALLOC_LIMIT_MB: u32 = 10;

/// Allocation limit of a fresh engine. Zero means unlimited.
pub const INITIAL_ALLOC_LIMIT_MB: u32 = 0;

/// Longest encoder name accepted by `match` and `match_file`.
pub const MAX_ENCODER_NAME_LENGTH: usize = 64;

/// Slots reserved in a fresh handle table.
pub const INITIAL_PATTERN_SLOTS: usize = 32;

/// Who owns the data of a match result once it crosses the C boundary.
///
/// # Examples
///
/// ```rust
/// use rosie_engine::{EngineConfig, ResultOwnership};
///
/// // Every match result is a fresh allocation the caller frees (default).
/// let owned = EngineConfig::default();
/// assert_eq!(owned.result_ownership, ResultOwnership::CallerOwned);
///
/// // Results live in a per-engine slot and dangle after the next match.
/// let cached = EngineConfig::default().with_result_ownership(ResultOwnership::EngineCached);
/// assert_eq!(cached.result_ownership, ResultOwnership::EngineCached);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultOwnership {
    /// The caller releases each result with `rosie_free_string`.
    #[default]
    CallerOwned,
    /// The engine keeps the most recent result in a single slot, freeing
    /// the previous one. Callers must copy data out before the next call
    /// on the same engine and must not free it.
    EngineCached,
}

impl ResultOwnership {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultOwnership::CallerOwned => "caller_owned",
            ResultOwnership::EngineCached => "engine_cached",
        }
    }
}

/// Configuration for a single engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Install directory holding `lib/boot.yaml`.
    ///
    /// When `None`, the process-wide home is used (the `ROSIE_HOME`
    /// environment variable, else the compiled-in location).
    pub home: Option<PathBuf>,

    /// Colon-separated package search path replacing the one from the
    /// boot manifest.
    pub libpath: Option<String>,

    /// Initial allocation limit in megabytes above the post-boot heap.
    ///
    /// **Default**: 0 (unlimited)
    pub alloc_limit_mb: u32,

    /// **Default**: [`ResultOwnership::CallerOwned`]
    pub result_ownership: ResultOwnership,

    /// **Default**: 64
    pub max_encoder_name_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            home: None,
            libpath: None,
            alloc_limit_mb: INITIAL_ALLOC_LIMIT_MB,
            result_ownership: ResultOwnership::default(),
            max_encoder_name_len: MAX_ENCODER_NAME_LENGTH,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn with_libpath(mut self, libpath: impl Into<String>) -> Self {
        self.libpath = Some(libpath.into());
        self
    }

    pub fn with_alloc_limit_mb(mut self, limit_mb: u32) -> Self {
        self.alloc_limit_mb = limit_mb;
        self
    }

    pub fn with_result_ownership(mut self, ownership: ResultOwnership) -> Self {
        self.result_ownership = ownership;
        self
    }

    pub fn with_max_encoder_name_len(mut self, len: usize) -> Self {
        self.max_encoder_name_len = len;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_alloc_limit(self.alloc_limit_mb)?;
        if self.max_encoder_name_len == 0 {
            return Err(RosieError::InvalidArgument(
                "max_encoder_name_len must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Reject limits in `1..MIN_ALLOC_LIMIT_MB`.
pub fn check_alloc_limit(limit_mb: u32) -> Result<()> {
    if limit_mb != 0 && limit_mb < MIN_ALLOC_LIMIT_MB {
        Err(RosieError::AllocLimitTooLow(limit_mb))
    } else {
        Ok(())
    }
}

/// One entry of the JSON array returned by `config`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub name: String,
    pub value: String,
    pub description: String,
}

impl ConfigEntry {
    pub fn new(name: &str, value: impl Into<String>, description: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
            description: description.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.home, None);
        assert_eq!(config.alloc_limit_mb, 0);
        assert_eq!(config.result_ownership, ResultOwnership::CallerOwned);
        assert_eq!(config.max_encoder_name_len, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = EngineConfig::new()
            .with_home("/opt/rosie")
            .with_libpath("/opt/rosie/rpl:/tmp/rpl")
            .with_alloc_limit_mb(20)
            .with_result_ownership(ResultOwnership::EngineCached)
            .with_max_encoder_name_len(16);

        assert_eq!(config.home, Some(PathBuf::from("/opt/rosie")));
        assert_eq!(config.libpath.as_deref(), Some("/opt/rosie/rpl:/tmp/rpl"));
        assert_eq!(config.alloc_limit_mb, 20);
        assert_eq!(config.result_ownership, ResultOwnership::EngineCached);
        assert_eq!(config.max_encoder_name_len, 16);
    }

    #[test]
    fn test_alloc_limit_floor() {
        assert!(check_alloc_limit(0).is_ok());
        assert!(check_alloc_limit(10).is_ok());
        assert_eq!(check_alloc_limit(9), Err(RosieError::AllocLimitTooLow(9)));
        assert_eq!(check_alloc_limit(1), Err(RosieError::AllocLimitTooLow(1)));

        let bad = EngineConfig::default().with_alloc_limit_mb(5);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = "alloc_limit_mb: 32\nresult_ownership: engine_cached\n";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.alloc_limit_mb, 32);
        assert_eq!(config.result_ownership, ResultOwnership::EngineCached);
        assert_eq!(config.max_encoder_name_len, MAX_ENCODER_NAME_LENGTH);
    }
}
