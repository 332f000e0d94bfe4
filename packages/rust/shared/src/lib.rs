//! Shared types, error model, and configuration for Devize.
//!
//! This crate is the foundation depended on by all other Devize crates.
//! It provides:
//! - [`DevizeError`], the unified error type
//! - Domain types ([`RecipeItem`], [`AggregateLine`], [`StandardParameters`], [`ProjectId`])
//! - Configuration ([`AppConfig`], [`SourceConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, SourceConfig, SourcesConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, resolve_database_path,
};
pub use error::{DevizeError, Result};
pub use types::{
    AggregateLine, ItemType, LineKind, LineOrigin, ManualLine, MaterialCatalogEntry,
    OperationSelection, ProjectId, QuoteRequest, QuoteSummary, RateKind, RecipeFetchResult,
    RecipeItem, RecipesByOperation, StandardParameters,
};
