//! Scholarly - semantic search and recommendation engine for research repositories
//!
//! Ranks publications by combining vector similarity with query-history
//! signals, completes partial queries from past searches, and recommends
//! experts and works from taxonomy and co-authorship graphs.

pub mod cache;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod history;
pub mod predictor;
pub mod recommendation;
pub mod scoring;
pub mod search;
pub mod storage;
pub mod text;

pub use error::{Result, ScholarError};
