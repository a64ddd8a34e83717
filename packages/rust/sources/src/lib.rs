//! Multi-source headline retrieval.
//!
//! Each named source is fetched live when credentials are configured, and
//! degrades to a local deterministic sample (or a placeholder item) on any
//! live failure, so every requested source always yields content. The
//! [`Aggregator`] fans out one fetch per source concurrently and merges the
//! results.

mod aggregator;
mod client;
mod fallback;
mod reddit;

use std::sync::Arc;

use tracing::{info, warn};

use newsrouter_shared::{AppConfig, Result, resolve_credentials};

pub use aggregator::{Aggregation, Aggregator, resolve_sources};
pub use client::{
    FetchMode, SourceClient, SourceFetch, SourceIssue, deadline_after, empty_placeholder,
    unknown_placeholder,
};
pub use fallback::FallbackDataset;
pub use reddit::{LiveSource, MAX_LISTING_LIMIT, RedditClient};

/// Build the process-wide source client from config and the environment.
///
/// Missing credentials are a warning, not an error: every source then uses
/// the fallback path.
pub fn source_client_from_config(config: &AppConfig) -> Result<SourceClient> {
    let fallback = Arc::new(FallbackDataset::builtin().with_extra(&config.fallback));

    match resolve_credentials(&config.reddit) {
        Ok(credentials) => {
            let live: Arc<dyn LiveSource> = Arc::new(RedditClient::new(&config.reddit, credentials)?);
            info!("live retrieval enabled");
            Ok(SourceClient::new(Some(live), fallback))
        }
        Err(missing) => {
            warn!(
                missing = ?missing,
                "reddit credentials incomplete; all sources will use fallback data"
            );
            Ok(SourceClient::offline(fallback))
        }
    }
}
