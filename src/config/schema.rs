//! Configuration data structures for the wordchain engine.
//!
//! Defines the YAML config format: database location, search defaults, and
//! the ranking backend. Every field has a default, so an empty file is a
//! valid config.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{PathFlags, WordPreference};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Config format version (currently "1.0").
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub search: SearchConfig,

    /// Ranking backend: `native` or `inline`.
    #[serde(default = "default_ranking")]
    pub ranking: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            database: DatabaseConfig::default(),
            search: SearchConfig::default(),
            ranking: default_ranking(),
        }
    }
}

// ---------------------------------------------------------------------------
// DatabaseConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file. Falls back to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// SearchConfig
// ---------------------------------------------------------------------------

/// Defaults applied to every search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Budget of each language-detection match, in milliseconds.
    #[serde(default = "default_matcher_timeout_ms")]
    pub matcher_timeout_ms: u64,

    /// Strings generated per free-form round.
    #[serde(default = "default_random_word_count")]
    pub random_word_count: usize,

    /// Category combinations, most preferred first.
    #[serde(default)]
    pub preference: WordPreference,

    #[serde(default = "default_true")]
    pub use_end_words: bool,

    #[serde(default = "default_true")]
    pub use_attack_words: bool,

    #[serde(default)]
    pub reuse_words: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            matcher_timeout_ms: default_matcher_timeout_ms(),
            random_word_count: default_random_word_count(),
            preference: WordPreference::default(),
            use_end_words: true,
            use_attack_words: true,
            reuse_words: false,
        }
    }
}

impl SearchConfig {
    pub fn matcher_budget(&self) -> Duration {
        Duration::from_millis(self.matcher_timeout_ms)
    }

    /// The configured switches as [`PathFlags`].
    pub fn path_flags(&self) -> PathFlags {
        let mut flags = PathFlags::NONE;
        if self.use_end_words {
            flags = flags | PathFlags::USE_END_WORD;
        }
        if self.use_attack_words {
            flags = flags | PathFlags::USE_ATTACK_WORD;
        }
        if self.reuse_words {
            flags = flags | PathFlags::REUSE_WORDS;
        }
        flags
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_version() -> String {
    "1.0".to_string()
}

fn default_ranking() -> String {
    "native".to_string()
}

fn default_matcher_timeout_ms() -> u64 {
    200
}

fn default_random_word_count() -> usize {
    10
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
