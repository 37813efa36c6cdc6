// ⚙️ Editor Configuration - JSON file, every field optional

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::tree::suffix::{SequentialSuffixes, SuffixSource, UuidSuffixes};

const DEFAULT_DATABASE: &str = "templates.db";
const DEFAULT_AUTHOR: &str = "template-editor";
const DEFAULT_LOG_FILTER: &str = "info";

/// How clone suffixes are generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuffixStrategy {
    #[default]
    Uuid,
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub suffix_strategy: SuffixStrategy,

    /// SQLite file used by `save` / `load`
    pub database_path: Option<PathBuf>,

    /// Recorded on every saved version
    pub author: String,

    /// Tracing filter used when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for EditorConfig {
    fn default() -> Self {
        EditorConfig {
            suffix_strategy: SuffixStrategy::default(),
            database_path: Some(PathBuf::from(DEFAULT_DATABASE)),
            author: DEFAULT_AUTHOR.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl EditorConfig {
    /// Load config from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Suffix source for clone operations and template loading
    pub fn suffix_source(&self) -> Box<dyn SuffixSource> {
        match self.suffix_strategy {
            SuffixStrategy::Uuid => Box::new(UuidSuffixes),
            SuffixStrategy::Sequential => Box::new(SequentialSuffixes::new()),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }
}

// ============================================================================
// TESTS
// ============================================================================
