//! Configuration management for scholarly
//!
//! Loads the TOML configuration, applies environment and profile overrides,
//! and exposes the validated scoring weight objects used by the engine.

use crate::error::{Result, ScholarError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;
mod weights;

pub use validator::ConfigValidator;
pub use weights::{SearchWeights, StrategyWeights, WEIGHT_TOLERANCE};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub search: SearchConfig,
    pub recommendation: RecommendationConfig,
    pub cache: CacheConfig,
    pub predictor: PredictorConfig,
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Relative to `data_dir` unless absolute
    pub database_file: PathBuf,
    pub index_file: PathBuf,
    pub mapping_file: PathBuf,
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "fastembed" or "hashing"
    pub provider: String,
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
}

/// Vector index tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// L2 distance mapped to similarity 0. Not derived from the data.
    pub max_distance: f32,
    /// Candidates fetched per requested result
    pub overfetch_factor: usize,
}

/// Search-path scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub term_frequency_weight: f32,
    pub temporal_weight: f32,
    pub semantic_weight: f32,
    pub personalization_weight: f32,
    pub term_frequency_cap: f32,
    pub temporal_decay_rate: f32,
    pub history_horizon_days: i64,
    pub default_limit: usize,
}

impl SearchConfig {
    /// Validated weight set for the search scorer
    pub fn weights(&self) -> Result<SearchWeights> {
        SearchWeights::new(
            self.term_frequency_weight,
            self.temporal_weight,
            self.semantic_weight,
            self.personalization_weight,
        )
    }
}

/// Recommendation-path scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    pub topic_weight: f32,
    pub citation_weight: f32,
    pub collaborative_weight: f32,
    pub recency_weight: f32,
    pub max_citations: f32,
    pub citation_decay: f32,
    pub recency_decay_rate: f32,
    pub collaboration_limit: usize,
}

impl RecommendationConfig {
    /// Validated strategy weights, recency included
    pub fn weights(&self) -> Result<StrategyWeights> {
        StrategyWeights::new(
            self.topic_weight,
            self.citation_weight,
            self.collaborative_weight,
            self.recency_weight,
        )
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// "sqlite" or "memory"
    pub backend: String,
    pub search_ttl_secs: u64,
    pub predict_ttl_secs: u64,
}

/// Autocomplete predictor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorConfig {
    pub retrain_every: usize,
    pub ngram_min: usize,
    pub ngram_max: usize,
    pub min_prefix_len: usize,
}

/// Bounds for calls made inside request pipelines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub enrichment_ms: u64,
    pub graph_ms: u64,
    pub suggester_ms: u64,
}

impl TimeoutConfig {
    pub fn enrichment(&self) -> Duration {
        Duration::from_millis(self.enrichment_ms)
    }

    pub fn graph(&self) -> Duration {
        Duration::from_millis(self.graph_ms)
    }

    pub fn suggester(&self) -> Duration {
        Duration::from_millis(self.suggester_ms)
    }
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_backend: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ScholarError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ScholarError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ScholarError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| ScholarError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider;
        }
        if let Some(model) = overrides.embedding_model {
            self.embedding.model = model;
        }
        if let Some(backend) = overrides.cache_backend {
            self.cache.backend = backend;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: SCHOLARLY_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("SCHOLARLY_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "STORAGE__DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
            "EMBEDDING__PROVIDER" => self.embedding.provider = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "CACHE__BACKEND" => self.cache.backend = value.to_string(),
            "CACHE__SEARCH_TTL_SECS" => self.cache.search_ttl_secs = parse_env(path, value)?,
            "CACHE__PREDICT_TTL_SECS" => self.cache.predict_ttl_secs = parse_env(path, value)?,
            "INDEX__MAX_DISTANCE" => self.index.max_distance = parse_env(path, value)?,
            "PREDICTOR__RETRAIN_EVERY" => self.predictor.retrain_every = parse_env(path, value)?,
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Absolute path of the SQLite database
    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.storage.database_file)
    }

    /// Absolute path of the vector index file
    pub fn index_path(&self) -> PathBuf {
        self.resolve(&self.storage.index_file)
    }

    /// Absolute path of the id-to-document mapping file
    pub fn mapping_path(&self) -> PathBuf {
        self.resolve(&self.storage.mapping_file)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            expand_home(&self.storage.data_dir).join(path)
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ScholarError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("scholarly").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| ScholarError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".scholarly"))
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| ScholarError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            "offline".to_string(),
            ProfileOverrides {
                embedding_provider: Some("hashing".to_string()),
                ..Default::default()
            },
        );

        Self {
            meta: MetaConfig {
                schema_version: "1.0.0".to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("~/.scholarly"),
                database_file: PathBuf::from("store/db.sqlite"),
                index_file: PathBuf::from("store/index/documents.idx"),
                mapping_file: PathBuf::from("store/index/documents.map"),
            },
            embedding: EmbeddingConfig {
                provider: "fastembed".to_string(),
                model: "all-MiniLM-L6-v2".to_string(),
                dimension: 384,
                batch_size: 32,
            },
            index: IndexConfig {
                max_distance: 100.0,
                overfetch_factor: 2,
            },
            search: SearchConfig {
                term_frequency_weight: 0.3,
                temporal_weight: 0.2,
                semantic_weight: 0.3,
                personalization_weight: 0.2,
                term_frequency_cap: 100.0,
                temporal_decay_rate: 0.1,
                history_horizon_days: 30,
                default_limit: 5,
            },
            recommendation: RecommendationConfig {
                topic_weight: 0.3,
                citation_weight: 0.4,
                collaborative_weight: 0.3,
                recency_weight: 0.1,
                max_citations: 1000.0,
                citation_decay: 0.95,
                recency_decay_rate: 0.1,
                collaboration_limit: 5,
            },
            cache: CacheConfig {
                backend: "sqlite".to_string(),
                search_ttl_secs: 300,
                predict_ttl_secs: 60,
            },
            predictor: PredictorConfig {
                retrain_every: 100,
                ngram_min: 1,
                ngram_max: 3,
                min_prefix_len: 1,
            },
            timeouts: TimeoutConfig {
                enrichment_ms: 250,
                graph_ms: 2000,
                suggester_ms: 5000,
            },
            profiles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_roundtrips_through_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let config = Config::default();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.embedding.model, "all-MiniLM-L6-v2");
        assert_eq!(loaded.cache.search_ttl_secs, 300);
        assert_eq!(loaded.cache.predict_ttl_secs, 60);
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Path::new("/nonexistent/scholarly.toml"));
        assert!(matches!(result, Err(ScholarError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_offline_profile() {
        let mut config = Config::default();
        config.apply_profile("offline").unwrap();
        assert_eq!(config.embedding.provider, "hashing");

        assert!(config.apply_profile("nope").is_err());
    }

    #[test]
    fn test_relative_paths_resolve_under_data_dir() {
        let mut config = Config::default();
        config.storage.data_dir = PathBuf::from("/srv/scholarly");
        assert_eq!(
            config.database_path(),
            PathBuf::from("/srv/scholarly/store/db.sqlite")
        );

        config.storage.index_file = PathBuf::from("/abs/documents.idx");
        assert_eq!(config.index_path(), PathBuf::from("/abs/documents.idx"));
    }
}
