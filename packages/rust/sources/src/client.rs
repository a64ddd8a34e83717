//! Per-source retrieval with live → fallback → placeholder degradation.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use newsrouter_shared::ErrorKind;

use crate::fallback::FallbackDataset;
use crate::reddit::LiveSource;

/// How the items of a [`SourceFetch`] were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    Live,
    Fallback,
    Placeholder,
}

impl FetchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Fallback => "fallback",
            Self::Placeholder => "placeholder",
        }
    }
}

/// A contained retrieval problem for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceIssue {
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of fetching one source. Always carries at least one item.
#[derive(Debug, Clone)]
pub struct SourceFetch {
    pub items: Vec<String>,
    pub mode: FetchMode,
    pub issue: Option<SourceIssue>,
}

/// Placeholder for an identifier with neither live nor sample data.
pub fn unknown_placeholder(source: &str) -> String {
    format!("No data available for r/{source}.")
}

/// Placeholder for a live listing that returned nothing.
pub fn empty_placeholder(source: &str) -> String {
    format!("No recent hot posts found in r/{source}.")
}

/// Fetches items for one named source.
///
/// Never fails: every path resolves to a non-empty item list plus an optional
/// [`SourceIssue`] describing what was degraded.
#[derive(Clone)]
pub struct SourceClient {
    live: Option<Arc<dyn LiveSource>>,
    fallback: Arc<FallbackDataset>,
}

impl SourceClient {
    /// Client that tries `live` first when present.
    pub fn new(live: Option<Arc<dyn LiveSource>>, fallback: Arc<FallbackDataset>) -> Self {
        Self { live, fallback }
    }

    /// Client that only ever uses the fallback dataset.
    pub fn offline(fallback: Arc<FallbackDataset>) -> Self {
        Self::new(None, fallback)
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// Fetch up to `limit` items for `source` with no deadline.
    pub async fn fetch(&self, source: &str, limit: usize) -> SourceFetch {
        self.fetch_until(source, limit, None).await
    }

    /// Fetch up to `limit` items, abandoning the live attempt at `deadline`.
    pub async fn fetch_until(
        &self,
        source: &str,
        limit: usize,
        deadline: Option<Instant>,
    ) -> SourceFetch {
        let limit = limit.max(1);

        let reason = match &self.live {
            None => "live retrieval not configured".to_string(),
            Some(live) => match self.fetch_live(live.as_ref(), source, limit, deadline).await {
                Ok(titles) if titles.is_empty() => {
                    warn!(source, "live listing returned no items");
                    return SourceFetch {
                        items: vec![empty_placeholder(source)],
                        mode: FetchMode::Placeholder,
                        issue: Some(SourceIssue {
                            kind: ErrorKind::SourceEmpty,
                            message: format!("r/{source} returned no items"),
                        }),
                    };
                }
                Ok(titles) => {
                    debug!(source, count = titles.len(), "live fetch succeeded");
                    return SourceFetch {
                        items: titles.into_iter().take(limit).collect(),
                        mode: FetchMode::Live,
                        issue: None,
                    };
                }
                Err(reason) => {
                    warn!(source, live = live.name(), error = %reason, "live fetch failed");
                    reason
                }
            },
        };

        self.resolve_fallback(source, limit, &reason)
    }

    async fn fetch_live(
        &self,
        live: &dyn LiveSource,
        source: &str,
        limit: usize,
        deadline: Option<Instant>,
    ) -> std::result::Result<Vec<String>, String> {
        let attempt = live.fetch_titles(source, limit);
        let result = match deadline {
            Some(at) => match tokio::time::timeout_at(at, attempt).await {
                Ok(result) => result,
                Err(_) => return Err("deadline elapsed before live fetch completed".into()),
            },
            None => attempt.await,
        };
        result.map_err(|e| e.to_string())
    }

    /// Fallback sample when one exists, placeholder otherwise.
    pub(crate) fn resolve_fallback(&self, source: &str, limit: usize, reason: &str) -> SourceFetch {
        match self.fallback.lookup(source, limit) {
            Some(items) => {
                debug!(source, count = items.len(), "using fallback sample");
                SourceFetch {
                    items,
                    mode: FetchMode::Fallback,
                    issue: Some(SourceIssue {
                        kind: ErrorKind::SourceUnavailable,
                        message: format!("{reason}; served fallback sample"),
                    }),
                }
            }
            None => {
                warn!(source, "no live or fallback data for source");
                SourceFetch {
                    items: vec![unknown_placeholder(source)],
                    mode: FetchMode::Placeholder,
                    issue: Some(SourceIssue {
                        kind: ErrorKind::SourceUnknown,
                        message: format!("{reason}; no fallback sample for '{source}'"),
                    }),
                }
            }
        }
    }
}

/// Convenience: a duration-based deadline measured from now.
pub fn deadline_after(timeout: Duration) -> Instant {
    Instant::now() + timeout
}
