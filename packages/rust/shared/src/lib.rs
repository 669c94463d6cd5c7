//! Shared types, error model, and configuration for FeedScout.
//!
//! This crate is the foundation depended on by all other FeedScout crates.
//! It provides:
//! - [`FeedScoutError`] — the unified error type
//! - Domain types ([`Source`], [`Candidate`], [`ValidationOutcome`], [`ContentRecord`])
//! - Stable identifiers and URL normalization ([`ids`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod ids;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DiscoveryConfig, Edition, FetchConfig, PatternConfig, RunConfig, TrustConfig,
    ValidationConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{FeedScoutError, Result};
pub use ids::{content_id_for, normalize_url, parse_source_url, sha256_hex, source_id_for};
pub use types::{
    CURRENT_SCHEMA_VERSION, Candidate, ContentRecord, Decision, DocumentFormat, ReasonCode,
    RunSummary, Seed, Source, SourceId, SourceStatus, Strategy, ValidationOutcome,
};
