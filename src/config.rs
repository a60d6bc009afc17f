//! Configuration file support for diagtree
//!
//! Reads from .diagtree/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::convert::IdScheme;
use crate::layout::LayoutConfig;
use crate::matching::{Matcher, DEFAULT_THRESHOLD};
use crate::merge::DedupStrategy;

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Where the tree file lives
    #[serde(default)]
    pub tree: TreeConfig,

    /// Answer matching during traversal
    #[serde(default)]
    pub matching: MatchingConfig,

    /// Rendering positions
    #[serde(default)]
    pub layout: LayoutConfig,

    /// How fragments are spliced into the tree
    #[serde(default)]
    pub merge: MergeConfig,

    /// Turning analyser output into fragments
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Tree file location
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct TreeConfig {
    /// Path to the tree file, relative to the working directory.
    /// The DIAGTREE_TREE_PATH env var and `--tree` both take priority.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MatchingConfig {
    /// Minimum similarity for a free-text answer to pick an option
    /// Default: 0.3
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct MergeConfig {
    /// "by_text" (default) or "by_id"
    #[serde(default)]
    pub dedup: DedupStrategy,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IngestConfig {
    /// "content_hash" (default) or "label"
    #[serde(default = "default_id_scheme")]
    pub id_scheme: IdScheme,

    /// Merge without asking for confirmation
    /// Default: false
    #[serde(default)]
    pub auto_confirm: bool,
}

fn default_id_scheme() -> IdScheme {
    IdScheme::ContentHash
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            id_scheme: default_id_scheme(),
            auto_confirm: false,
        }
    }
}

impl Config {
    /// Load config from .diagtree/config.toml
    /// Returns default config if file doesn't exist
    pub fn load() -> Self {
        if let Some(path) = Self::find_config_path() {
            if let Ok(contents) = std::fs::read_to_string(&path) {
                match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), "ignoring invalid config: {}", e)
                    }
                }
            }
        }
        Self::default()
    }

    /// Find config.toml by walking up directory tree
    fn find_config_path() -> Option<PathBuf> {
        let current_dir = std::env::current_dir().ok()?;
        let mut dir = current_dir.as_path();

        loop {
            let config_path = dir.join(".diagtree").join("config.toml");
            if config_path.exists() {
                return Some(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }
        None
    }

    pub fn matcher(&self) -> Matcher {
        Matcher::new(self.matching.threshold)
    }
}
