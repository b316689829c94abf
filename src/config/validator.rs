use crate::config::{Config, SearchWeights, StrategyWeights};
use crate::error::{Result, ScholarError, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every violation
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_recommendation(config, &mut errors);
        Self::validate_cache(config, &mut errors);
        Self::validate_predictor(config, &mut errors);
        Self::validate_timeouts(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ScholarError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        let storage = &config.storage;
        for (path, value) in [
            ("storage.data_dir", &storage.data_dir),
            ("storage.database_file", &storage.database_file),
            ("storage.index_file", &storage.index_file),
            ("storage.mapping_file", &storage.mapping_file),
        ] {
            if value.as_os_str().is_empty() {
                errors.push(ValidationError::new(path, "Path cannot be empty"));
            }
        }

        if storage.index_file == storage.mapping_file {
            errors.push(ValidationError::new(
                "storage.mapping_file",
                "Mapping file must differ from the index file",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        if provider != "fastembed" && provider != "hashing" {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!("Provider must be 'fastembed' or 'hashing', got '{}'", provider),
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        if !(config.index.max_distance > 0.0) {
            errors.push(ValidationError::new(
                "index.max_distance",
                format!("Must be positive, got {}", config.index.max_distance),
            ));
        }

        if config.index.overfetch_factor == 0 {
            errors.push(ValidationError::new(
                "index.overfetch_factor",
                "Overfetch factor must be at least 1",
            ));
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let search = &config.search;
        if let Err(e) = SearchWeights::new(
            search.term_frequency_weight,
            search.temporal_weight,
            search.semantic_weight,
            search.personalization_weight,
        ) {
            errors.push(ValidationError::new("search.weights", e.to_string()));
        }

        if !(search.term_frequency_cap > 0.0) {
            errors.push(ValidationError::new(
                "search.term_frequency_cap",
                "Term frequency cap must be positive",
            ));
        }

        if search.temporal_decay_rate < 0.0 {
            errors.push(ValidationError::new(
                "search.temporal_decay_rate",
                "Decay rate cannot be negative",
            ));
        }

        if search.history_horizon_days <= 0 {
            errors.push(ValidationError::new(
                "search.history_horizon_days",
                "History horizon must be at least one day",
            ));
        }
    }

    fn validate_recommendation(config: &Config, errors: &mut Vec<ValidationError>) {
        let rec = &config.recommendation;
        if let Err(e) = StrategyWeights::new(
            rec.topic_weight,
            rec.citation_weight,
            rec.collaborative_weight,
            rec.recency_weight,
        ) {
            errors.push(ValidationError::new("recommendation.weights", e.to_string()));
        }

        if !(rec.max_citations > 0.0) {
            errors.push(ValidationError::new(
                "recommendation.max_citations",
                "Citation cap must be positive",
            ));
        }

        if !(0.0..=1.0).contains(&rec.citation_decay) {
            errors.push(ValidationError::new(
                "recommendation.citation_decay",
                format!("Citation decay must be within [0, 1], got {}", rec.citation_decay),
            ));
        }
    }

    fn validate_cache(config: &Config, errors: &mut Vec<ValidationError>) {
        let backend = &config.cache.backend;
        if backend != "sqlite" && backend != "memory" {
            errors.push(ValidationError::new(
                "cache.backend",
                format!("Backend must be 'sqlite' or 'memory', got '{}'", backend),
            ));
        }

        if config.cache.search_ttl_secs == 0 || config.cache.predict_ttl_secs == 0 {
            errors.push(ValidationError::new(
                "cache.ttl",
                "TTLs must be greater than 0",
            ));
        }
    }

    fn validate_predictor(config: &Config, errors: &mut Vec<ValidationError>) {
        let predictor = &config.predictor;
        if predictor.retrain_every == 0 {
            errors.push(ValidationError::new(
                "predictor.retrain_every",
                "Retrain interval must be greater than 0",
            ));
        }

        if predictor.ngram_min == 0 || predictor.ngram_min > predictor.ngram_max {
            errors.push(ValidationError::new(
                "predictor.ngram_min",
                format!(
                    "Invalid n-gram range {}..={}",
                    predictor.ngram_min, predictor.ngram_max
                ),
            ));
        }
    }

    fn validate_timeouts(config: &Config, errors: &mut Vec<ValidationError>) {
        let t = &config.timeouts;
        if t.enrichment_ms == 0 || t.graph_ms == 0 || t.suggester_ms == 0 {
            errors.push(ValidationError::new(
                "timeouts",
                "Timeouts must be greater than 0",
            ));
        }
    }
}
