use scholarly::cache::{QueryCache, SqliteCacheStore};
use scholarly::cli::{read_jsonl, Cli, Commands, ConfigAction, ImportAction};
use scholarly::config::Config;
use scholarly::embedding::{create_provider, DocumentRecord, IndexBuilder};
use scholarly::error::{Result, ScholarError};
use scholarly::graph::{
    ComplementaryCategories, ComplementarySuggester, ExpertMatch, ExpertProfile,
    FixedSuggestions, NoSuggestions, SqliteTaxonomyStore,
};
use scholarly::history::{QueryEvent, QueryHistoryStore};
use scholarly::recommendation::{RecommendationService, WorkQuery, WorkStore};
use scholarly::scoring::Work;
use scholarly::search::SearchEngine;
use scholarly::storage::{StorageManager, StorageStats};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Config { action } => cmd_config(cli.config, cli.profile, action),
        command => {
            let config = load_config(cli.config, cli.profile)?;
            let storage = StorageManager::from_config(&config)?;
            run(command, &config, &storage).await
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "scholarly=debug" } else { "scholarly=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands, config: &Config, storage: &StorageManager) -> Result<()> {
    match command {
        Commands::BuildIndex {
            documents,
            batch_size,
        } => cmd_build_index(config, storage, documents, batch_size).await,
        Commands::Search {
            query,
            limit,
            user,
            json,
        } => {
            let engine = SearchEngine::open(config, storage)?;
            let limit = limit.unwrap_or(config.search.default_limit);
            let results = engine.search(&query, limit, user.as_deref()).await?;
            engine.drain_background().await;

            if json {
                return print_json(&results);
            }
            if results.is_empty() {
                println!("No results for '{}'", query);
            }
            for (rank, r) in results.iter().enumerate() {
                println!("{:>2}. [{:.3}] {} ({})", rank + 1, r.score, r.title, r.document_id);
                println!(
                    "    tf {:.3}  temporal {:.3}  semantic {:.3}  personal {:.3}  similarity {:.3}",
                    r.breakdown.term_frequency,
                    r.breakdown.temporal,
                    r.breakdown.semantic,
                    r.breakdown.personalization,
                    r.similarity
                );
            }
            Ok(())
        }
        Commands::Predict {
            partial,
            limit,
            user,
            json,
        } => {
            let engine = SearchEngine::open(config, storage)?;
            let predictions = engine.predict(&partial, user.as_deref(), limit).await;
            engine.drain_background().await;

            if json {
                return print_json(&predictions);
            }
            for p in &predictions {
                println!("{}", p);
            }
            Ok(())
        }
        Commands::Feedback { user, document } => {
            let engine = SearchEngine::open(config, storage)?;
            engine.record_feedback(&user, &document).await?;
            println!("✓ Preferences updated for {}", user);
            Ok(())
        }
        Commands::SimilarExperts {
            expert,
            limit,
            json,
        } => {
            let service = RecommendationService::open(config, storage, Arc::new(NoSuggestions))?;
            let matches = service.recommend_similar_experts(&expert, limit).await?;
            if json {
                return print_json(&matches);
            }
            print_experts(&matches);
            Ok(())
        }
        Commands::Collaborators {
            expert,
            domains,
            fields,
            skills,
            limit,
            json,
        } => {
            let categories = ComplementaryCategories {
                domains,
                fields,
                skills,
            };
            let suggester: Arc<dyn ComplementarySuggester> = if categories.is_empty() {
                Arc::new(NoSuggestions)
            } else {
                Arc::new(FixedSuggestions(categories))
            };
            let service = RecommendationService::open(config, storage, suggester)?;
            let recs = service.recommend_collaborators(&expert, limit).await?;
            if json {
                return print_json(&recs);
            }
            println!("Similar experts:");
            print_experts(&recs.similar);
            println!("Complementary collaborators:");
            print_experts(&recs.collaborators);
            Ok(())
        }
        Commands::RecommendWorks {
            work,
            author,
            limit,
            json,
        } => {
            let service = RecommendationService::open(config, storage, Arc::new(NoSuggestions))?;
            let query = WorkQuery {
                work_id: work,
                author_id: author,
            };
            let recs = service.recommend_works(&query, limit).await?;
            if json {
                return print_json(&recs);
            }
            for (rank, r) in recs.iter().enumerate() {
                let e = &r.explanation;
                println!(
                    "{:>2}. [{:.3}] {} ({}, {})",
                    rank + 1,
                    e.final_score,
                    r.work.title,
                    r.work.id,
                    r.work.publication_year
                );
                println!(
                    "    topic {:.3}  citation {:.3}  collaborative {:.3}  recency {:.3}",
                    e.topic_similarity, e.citation_impact, e.collaborative_signal, e.recency_boost
                );
            }
            Ok(())
        }
        Commands::Import { action } => cmd_import(config, storage, action),
        Commands::Stats { json } => {
            let stats = storage.stats()?;
            if json {
                return print_json(&stats);
            }
            println!("Data directory: {}", storage.base_path().display());
            println!("  Queries:        {}", stats.db.query_count);
            println!("  Term rows:      {}", stats.db.term_rows);
            println!("  Cache entries:  {}", stats.db.cache_entries);
            println!("  Experts:        {}", stats.db.expert_count);
            println!("  Taxonomy nodes: {}", stats.db.taxonomy_node_count);
            println!("  Works:          {}", stats.db.work_count);
            println!(
                "  Index:          {}",
                if storage.has_index() {
                    StorageStats::format_size(stats.index_size)
                } else {
                    "not built".to_string()
                }
            );
            println!("  Total:          {}", StorageStats::format_size(stats.total_size));
            Ok(())
        }
        Commands::PurgeCache => {
            let cache = QueryCache::new(Arc::new(SqliteCacheStore::new(storage.database.clone())));
            println!("✓ Removed {} expired cache entries", cache.purge_expired());
            Ok(())
        }
        Commands::Config { .. } => Err(ScholarError::Config(
            "Config commands do not open storage".to_string(),
        )),
    }
}

async fn cmd_build_index(
    config: &Config,
    storage: &StorageManager,
    documents: PathBuf,
    batch_size: Option<usize>,
) -> Result<()> {
    let records: Vec<DocumentRecord> = read_jsonl(&documents)?;
    tracing::info!("Read {} documents from {}", records.len(), documents.display());

    let provider = create_provider(&config.embedding)?;
    let builder = Arc::new(IndexBuilder::new(
        provider,
        batch_size.unwrap_or(config.embedding.batch_size),
    ));
    let (index, report) = builder.build_background(records).await??;
    index.save(storage.index_path(), storage.mapping_path())?;

    println!(
        "✓ Indexed {} documents in {} batches ({}, {}D) in {} ms",
        report.documents, report.batches, report.model, report.dimension, report.duration_ms
    );
    println!("  Build id: {}", index.build_id());
    println!("  Index:    {}", storage.index_path().display());
    println!("  Mapping:  {}", storage.mapping_path().display());
    Ok(())
}

fn cmd_import(config: &Config, storage: &StorageManager, action: ImportAction) -> Result<()> {
    match action {
        ImportAction::Experts { file } => {
            let profiles: Vec<ExpertProfile> = read_jsonl(&file)?;
            let store = SqliteTaxonomyStore::new(storage.database.clone());
            for profile in &profiles {
                store.upsert_profile(profile)?;
            }
            println!("✓ Imported {} experts", profiles.len());
        }
        ImportAction::Works { file } => {
            let works: Vec<Work> = read_jsonl(&file)?;
            let store = WorkStore::new(storage.database.clone());
            for work in &works {
                store.upsert_work(work)?;
            }
            println!("✓ Imported {} works", works.len());
        }
        ImportAction::History { file } => {
            let events: Vec<QueryEvent> = read_jsonl(&file)?;
            let store =
                QueryHistoryStore::new(storage.database.clone(), config.search.history_horizon_days);
            for event in &events {
                store.record_query(event)?;
            }
            println!("✓ Imported {} queries", events.len());
        }
    }
    Ok(())
}

fn print_experts(matches: &[ExpertMatch]) {
    if matches.is_empty() {
        println!("  (none)");
    }
    for m in matches {
        println!(
            "  {:>3}  {} ({})  domains {}  fields {}  skills {}",
            m.score,
            m.name,
            m.expert_id,
            m.shared_domain_count,
            m.shared_field_count,
            m.shared_skill_count
        );
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(|e| ScholarError::Json {
        source: e,
        context: "Failed to serialize output".to_string(),
    })?;
    println!("{}", json);
    Ok(())
}

fn cmd_config(
    config_path: Option<PathBuf>,
    profile: Option<String>,
    action: ConfigAction,
) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, profile)?;
            let value = serde_json::to_value(&config).map_err(|e| ScholarError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            match section {
                Some(section) => {
                    let part = value.get(&section).ok_or_else(|| {
                        ScholarError::Config(format!("Unknown config section: {}", section))
                    })?;
                    print_json(part)?;
                }
                None => print_json(&value)?,
            }
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(path) => path,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            config.recommendation.weights()?;
            config.search.weights()?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ScholarError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'scholarly config init' to create one."
        );
        let mut config = Config::default();
        config.apply_env_overrides();
        if let Some(profile) = profile {
            config.apply_profile(&profile)?;
        }
        return Ok(config);
    }

    match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load(&path),
    }
}
