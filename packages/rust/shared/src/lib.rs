//! Shared types, error model, and configuration for the byline directory sync.
//!
//! This crate is the foundation depended on by all other crates.
//! It provides:
//! - [`BylinesError`]: the unified error type
//! - The data model ([`Observation`], [`Article`], [`Reporter`], [`DirectoryRecord`])
//! - Configuration ([`AppConfig`], [`SourceConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FetchConfig, FetchMode, IdentityStrategy, MatchKey, NameAlias, SelectorConfig,
    SourceConfig, StoreConfig, TwitterConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, resolve_store_path, twitter_api_key,
    validate_store_credentials,
};
pub use error::{BylinesError, Result};
pub use types::{
    Article, ArticleDetails, Contacts, DirectoryRecord, Fields, MAX_ARTICLES, Media, Observation,
    ProfileFragment, Reporter, RosterEntry,
};
