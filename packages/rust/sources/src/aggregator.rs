//! Concurrent multi-source fan-out with per-source failure isolation.

use std::collections::HashSet;

use tokio::time::Instant;
use tracing::{info, instrument, warn};

use newsrouter_shared::{ItemSet, LedgerEntry};

use crate::client::{FetchMode, SourceClient};

/// Result of one aggregation: merged items plus ledger contributions.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// One key per distinct requested source, never empty.
    pub items: ItemSet,
    /// One entry per source that degraded, in request order.
    pub ledger: Vec<LedgerEntry>,
    /// Retrieval mode used per source, in request order.
    pub modes: Vec<(String, FetchMode)>,
}

/// Fans out [`SourceClient`] calls across a set of sources.
pub struct Aggregator {
    client: SourceClient,
    default_sources: Vec<String>,
}

impl Aggregator {
    /// `default_sources` is substituted whenever a request names no source.
    pub fn new(client: SourceClient, default_sources: Vec<String>) -> Self {
        Self {
            client,
            default_sources,
        }
    }

    /// Fetch every source concurrently and merge into one [`ItemSet`].
    ///
    /// If `deadline` passes, live fetches still outstanding resolve through
    /// the fallback path for their source.
    #[instrument(skip_all, fields(requested = sources.len(), limit = limit))]
    pub async fn fetch_all(
        &self,
        sources: &[String],
        limit: usize,
        deadline: Option<Instant>,
    ) -> Aggregation {
        let targets = resolve_sources(sources, &self.default_sources);

        info!(sources = ?targets, live = self.client.is_live(), "fetching sources");

        let mut handles = Vec::with_capacity(targets.len());
        for source in &targets {
            let client = self.client.clone();
            let source_owned = source.clone();
            handles.push(tokio::spawn(async move {
                client.fetch_until(&source_owned, limit, deadline).await
            }));
        }

        let mut aggregation = Aggregation::default();
        for (source, handle) in targets.into_iter().zip(handles) {
            let fetch = match handle.await {
                Ok(fetch) => fetch,
                Err(e) => {
                    warn!(%source, error = %e, "fetch task failed");
                    self.client
                        .resolve_fallback(&source, limit.max(1), &format!("fetch task failed: {e}"))
                }
            };

            if let Some(issue) = fetch.issue {
                aggregation.ledger.push(LedgerEntry {
                    origin: source.clone(),
                    kind: issue.kind,
                    message: issue.message,
                });
            }
            aggregation.modes.push((source.clone(), fetch.mode));
            aggregation.items.insert(source, fetch.items);
        }

        info!(
            keys = aggregation.items.len(),
            items = aggregation.items.item_count(),
            degraded = aggregation.ledger.len(),
            "aggregation complete"
        );

        aggregation
    }
}

/// Trim, drop blanks, collapse duplicates case-insensitively (first spelling
/// wins), and substitute `defaults` when nothing remains.
pub fn resolve_sources(requested: &[String], defaults: &[String]) -> Vec<String> {
    let dedup = |ids: &[String]| {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for id in ids {
            let trimmed = id.trim();
            if trimmed.is_empty() {
                warn!("ignoring blank source identifier");
                continue;
            }
            if seen.insert(trimmed.to_lowercase()) {
                out.push(trimmed.to_string());
            }
        }
        out
    };

    let resolved = dedup(requested);
    if resolved.is_empty() {
        dedup(defaults)
    } else {
        resolved
    }
}
