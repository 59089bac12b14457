// crates/memoir-server/src/config.rs
// File-based configuration from ~/.memoir/config.toml

use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Top-level config structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct MemoirConfig {
    #[serde(default)]
    pub memory: MemorySettings,
    #[serde(default)]
    pub chunks: ChunkSettings,
    #[serde(default)]
    pub search: SearchSettings,
}

/// Memory subsystem settings
#[derive(Debug, Deserialize, Clone)]
pub struct MemorySettings {
    /// Maximum memories injected as context on a session's first message
    #[serde(default = "MemorySettings::default_max_inject")]
    pub max_inject: usize,
    /// Default result cap for memory and chunk searches
    #[serde(default = "MemorySettings::default_max_search_results")]
    pub max_search_results: usize,
    /// Master switch for trigger-phrase detection in chat messages
    #[serde(default = "MemorySettings::default_keyword_detection")]
    pub keyword_detection: bool,
    /// Extra trigger phrases, unioned with the built-in set
    #[serde(default)]
    pub custom_keywords: Vec<String>,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            max_inject: 5,
            max_search_results: 10,
            keyword_detection: true,
            custom_keywords: Vec::new(),
        }
    }
}

impl MemorySettings {
    fn default_max_inject() -> usize {
        5
    }
    fn default_max_search_results() -> usize {
        10
    }
    fn default_keyword_detection() -> bool {
        true
    }
}

/// Session-history chunk settings
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkSettings {
    /// Advisory cap on serialized chunk content; content is stored verbatim
    #[serde(default = "ChunkSettings::default_max_content_size")]
    pub max_content_size: usize,
    /// Advisory cap on chunks absorbed per compaction
    #[serde(default = "ChunkSettings::default_max_compaction_context")]
    pub max_compaction_context: usize,
    /// Reserved; the `archived` status has no transition trigger yet
    #[serde(default = "ChunkSettings::default_auto_archive_days")]
    pub auto_archive_days: u32,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            max_content_size: 102_400,
            max_compaction_context: 20,
            auto_archive_days: 30,
        }
    }
}

impl ChunkSettings {
    fn default_max_content_size() -> usize {
        102_400
    }
    fn default_max_compaction_context() -> usize {
        20
    }
    fn default_auto_archive_days() -> u32 {
        30
    }
}

/// Search settings
#[derive(Debug, Deserialize, Clone)]
pub struct SearchSettings {
    /// Search backend; only "fts" is implemented, vector modes are reserved
    #[serde(default = "SearchSettings::default_mode")]
    pub mode: String,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            mode: "fts".to_string(),
        }
    }
}

impl SearchSettings {
    fn default_mode() -> String {
        "fts".to_string()
    }
}

impl MemoirConfig {
    /// Load config from ~/.memoir/config.toml
    pub fn load() -> Self {
        let path = Self::config_path();

        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Get the config file path (public for CLI diagnostics)
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| {
                warn!("HOME directory not set — using current directory for Memoir config");
                PathBuf::from(".")
            })
            .join(".memoir")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MemoirConfig::default();
        assert_eq!(config.memory.max_inject, 5);
        assert_eq!(config.memory.max_search_results, 10);
        assert!(config.memory.keyword_detection);
        assert!(config.memory.custom_keywords.is_empty());
        assert_eq!(config.chunks.max_content_size, 102_400);
        assert_eq!(config.search.mode, "fts");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[memory]
max_search_results = 25
keyword_detection = false
"#;
        let config: MemoirConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.memory.max_search_results, 25);
        assert!(!config.memory.keyword_detection);
        // Untouched sections keep their defaults
        assert_eq!(config.memory.max_inject, 5);
        assert_eq!(config.chunks.max_compaction_context, 20);
    }

    #[test]
    fn test_parse_custom_keywords() {
        let toml = r#"
[memory]
custom_keywords = ["archive this", "pin this"]
"#;
        let config: MemoirConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            config.memory.custom_keywords,
            vec!["archive this".to_string(), "pin this".to_string()]
        );
    }

    #[test]
    fn test_empty_config_parses() {
        let config: MemoirConfig = toml::from_str("").unwrap();
        assert_eq!(config.memory.max_inject, 5);
    }
}
