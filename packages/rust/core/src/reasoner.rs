//! The external reasoning capability that performs stage content transforms.
//!
//! The pipeline only guarantees data shape; what a summary says or which
//! category a headline belongs to is decided behind [`Reasoner`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use newsrouter_shared::Result;

/// What the capability is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Replace the items with transformed items (summary, analysis).
    Transform,
    /// Return exactly one category label per input item, in order.
    Classify,
}

/// One call into the capability: a single key's items for a single stage.
#[derive(Debug, Clone, Serialize)]
pub struct TransformRequest<'a> {
    pub task: TaskKind,
    pub stage: &'a str,
    pub instruction: &'a str,
    /// Source identifier (or `category/source`) whose items these are.
    pub key: &'a str,
    pub items: &'a [String],
    /// Allowed labels, for [`TaskKind::Classify`].
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub categories: &'a [String],
}

/// Capability interface injected into the orchestrator.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Perform the transform. An `Err` becomes a per-key stage warning.
    async fn transform(&self, request: &TransformRequest<'_>) -> Result<Vec<String>>;

    /// Human-readable name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// StubReasoner
// ---------------------------------------------------------------------------

/// Deterministic offline capability.
///
/// Transforms return their input unchanged; classification picks the first
/// category whose keyword appears in the headline, else an empty label (which
/// the splitting stage routes to the uncategorized bucket).
#[derive(Debug, Clone, Default)]
pub struct StubReasoner {
    keywords: BTreeMap<String, Vec<String>>,
}

impl StubReasoner {
    pub fn new(keywords: BTreeMap<String, Vec<String>>) -> Self {
        Self { keywords }
    }

    fn label_for(&self, item: &str, categories: &[String]) -> String {
        let lowered = item.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        for category in categories {
            let Some(hints) = self.keywords.get(category) else {
                continue;
            };
            let hit = hints.iter().any(|hint| {
                let hint = hint.to_lowercase();
                if hint.contains(' ') {
                    lowered.contains(&hint)
                } else {
                    words.contains(&hint.as_str())
                }
            });
            if hit {
                return category.clone();
            }
        }
        String::new()
    }
}

#[async_trait]
impl Reasoner for StubReasoner {
    async fn transform(&self, request: &TransformRequest<'_>) -> Result<Vec<String>> {
        Ok(match request.task {
            TaskKind::Transform => request.items.to_vec(),
            TaskKind::Classify => request
                .items
                .iter()
                .map(|item| self.label_for(item, request.categories))
                .collect(),
        })
    }

    fn name(&self) -> &str {
        "stub"
    }
}
