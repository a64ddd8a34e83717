//! Shared types, error model, and configuration for NewsRouter.
//!
//! This crate is the foundation depended on by all other NewsRouter crates.
//! It provides:
//! - [`NewsRouterError`]: the unified error type
//! - The data model ([`ItemSet`], [`CategorizedItemSet`], [`StageResult`], [`ErrorLedger`], [`PipelineRequest`])
//! - Configuration ([`AppConfig`], config loading, credential resolution)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BridgeConfig, ClassificationConfig, DefaultsConfig, RedditConfig,
    RedditCredentials, StageConfig, StageShape, config_dir, config_file_path, init_config,
    load_config, load_config_from, resolve_credentials, validate_config,
};
pub use error::{NewsRouterError, Result};
pub use types::{
    CategorizedItemSet, ErrorKind, ErrorLedger, ItemSet, LedgerEntry, PipelineRequest, RunId,
    StageOutput, StageResult,
};
