//! CLI command definitions and parsing
use crate::error::{Result, ScholarError};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use std::io::BufRead;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "scholarly",
    version,
    about = "Semantic search, autocomplete and expert recommendation for research repositories",
    long_about = "Scholarly indexes publications into a vector index, ranks search results with \
                  hybrid semantic and query-history signals, completes queries from past searches, \
                  and recommends experts and works from the taxonomy and co-authorship graphs."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/scholarly/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply (e.g. "offline")
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed documents from a JSONL file and write a new index pair
    BuildIndex {
        /// One document per line: {"id", "title", "abstract", "summary", "tags", "authors"}
        documents: PathBuf,

        /// Documents per embedding batch (defaults to embedding.batch_size)
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Search indexed documents
    Search {
        /// Search query text
        query: String,

        /// Maximum number of results (defaults to search.default_limit)
        #[arg(short, long)]
        limit: Option<usize>,

        /// User id for personalization
        #[arg(short, long)]
        user: Option<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Complete a partial query from search history
    Predict {
        /// Partial query text
        partial: String,

        /// Maximum number of completions
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// User id whose own history is preferred
        #[arg(short, long)]
        user: Option<String>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Record that a user engaged with a document
    Feedback {
        /// User id
        user: String,

        /// Document id
        document: String,
    },

    /// Experts sharing taxonomy nodes with an expert
    SimilarExperts {
        /// Source expert id
        expert: String,

        /// Maximum number of experts
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Similar experts plus collaborators with complementary expertise
    Collaborators {
        /// Source expert id
        expert: String,

        /// Complementary domains to look for (comma separated)
        #[arg(long, value_delimiter = ',')]
        domains: Vec<String>,

        /// Complementary fields to look for (comma separated)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,

        /// Complementary skills to look for (comma separated)
        #[arg(long, value_delimiter = ',')]
        skills: Vec<String>,

        /// Maximum number of similar experts
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Recommend works by topic and co-authorship
    RecommendWorks {
        /// Base work for topic similarity
        #[arg(short, long)]
        work: Option<String>,

        /// Author for collaborative recommendations
        #[arg(short, long)]
        author: Option<String>,

        /// Maximum number of works
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Load records from JSONL files
    Import {
        #[command(subcommand)]
        action: ImportAction,
    },

    /// Show storage statistics
    Stats {
        /// Show statistics in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Remove expired cache entries
    PurgeCache,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ImportAction {
    /// Expert profiles: {"id", "name", "domains", "fields", "skills"}
    Experts { file: PathBuf },

    /// Works: {"id", "title", "publication_year", "citation_count", "topics", "authors"}
    Works { file: PathBuf },

    /// Past queries: {"query", "timestamp", "scope", "result_count", "search_type"}
    History { file: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Parse one JSON value per non-blank line
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = std::fs::File::open(path).map_err(|e| ScholarError::Io {
        source: e,
        context: format!("Failed to open {}", path.display()),
    })?;

    let mut records = Vec::new();
    for (n, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| ScholarError::Io {
            source: e,
            context: format!("Failed to read {}", path.display()),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| ScholarError::Json {
            source: e,
            context: format!("{}:{}", path.display(), n + 1),
        })?;
        records.push(record);
    }
    Ok(records)
}
