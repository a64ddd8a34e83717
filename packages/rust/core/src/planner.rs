//! Intent resolution: free-form request text → [`PipelineRequest`].
//!
//! Real intent interpretation is delegated to an external capability behind
//! [`Planner`]. [`KeywordPlanner`] is a deterministic stand-in covering the
//! standard request patterns.

use async_trait::async_trait;
use tracing::debug;

use newsrouter_shared::{PipelineRequest, Result, StageShape};

use crate::stage::StageRegistry;

/// Capability that turns user text into a resolved request.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn resolve_intent(&self, text: &str) -> Result<PipelineRequest>;
}

/// Keyword-driven planner.
///
/// - analysis words + a category word → classification then that analysis
/// - "categorize"/"classify"/"by topic" → classification
/// - otherwise → summarization
///
/// `r/<name>` tokens become sources; a bare number up to 100 becomes the limit.
pub struct KeywordPlanner {
    registry: StageRegistry,
    default_limit: usize,
}

impl KeywordPlanner {
    pub fn new(registry: StageRegistry, default_limit: usize) -> Self {
        Self {
            registry,
            default_limit,
        }
    }

    /// Selective stages whose category (or id stem) is mentioned in `words`.
    fn matching_analyses(&self, words: &[&str]) -> Vec<String> {
        let mut matched: Vec<String> = Vec::new();
        let mut covered: Vec<String> = Vec::new();

        for def in self.registry.iter().filter(|d| d.shape == StageShape::Selective) {
            let category = def.category.clone().unwrap_or_default();
            let id_stem = def.id.trim_end_matches("-analysis").to_string();
            // One analysis per category unless the stage's own name is used.
            let named = mentions(words, &id_stem);
            let by_category = mentions(words, &category) && !covered.contains(&category);
            if named || by_category {
                covered.push(category);
                matched.push(def.id.clone());
            }
        }
        matched
    }
}

#[async_trait]
impl Planner for KeywordPlanner {
    async fn resolve_intent(&self, text: &str) -> Result<PipelineRequest> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| c.is_whitespace() || c == ',' || c == '?' || c == '!')
            .filter(|w| !w.is_empty())
            .collect();

        let sources: Vec<String> = words
            .iter()
            .filter_map(|w| w.strip_prefix("r/"))
            .map(|s| s.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_'))
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let limit = words
            .iter()
            .filter_map(|w| w.parse::<usize>().ok())
            .find(|n| (1..=100).contains(n))
            .unwrap_or(self.default_limit);

        let wants_analysis = lowered.contains("analy") || lowered.contains("in-depth") || lowered.contains("insight");
        let wants_classification = lowered.contains("categor") || lowered.contains("classif") || lowered.contains("by topic");

        let stages = if wants_analysis {
            let analyses = self.matching_analyses(&words);
            let mut stages = vec!["classification".to_string()];
            stages.extend(analyses);
            stages
        } else if wants_classification {
            vec!["classification".to_string()]
        } else {
            vec!["summarization".to_string()]
        };

        debug!(?stages, ?sources, limit, "intent resolved");
        PipelineRequest::new(stages, sources, limit)
    }
}

/// Whether any word starts with the first four letters of `term`.
fn mentions(words: &[&str], term: &str) -> bool {
    let stem: String = term.chars().take(4).collect();
    !stem.is_empty() && words.iter().any(|w| w.trim_start_matches(|c: char| !c.is_alphanumeric()).starts_with(&stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner() -> KeywordPlanner {
        KeywordPlanner::new(StageRegistry::builtin(), 3)
    }

    #[tokio::test]
    async fn standard_request_summarizes() {
        let req = planner().resolve_intent("Get me today's news and summarize it").await.unwrap();
        assert_eq!(req.stages, vec!["summarization"]);
        assert!(req.sources.is_empty());
        assert_eq!(req.limit, 3);
    }

    #[tokio::test]
    async fn categorize_request_classifies() {
        let req = planner().resolve_intent("Get news and categorize it by topic").await.unwrap();
        assert_eq!(req.stages, vec!["classification"]);
    }

    #[tokio::test]
    async fn political_analysis_request() {
        let req = planner()
            .resolve_intent("Get political news and provide in-depth analysis")
            .await
            .unwrap();
        assert_eq!(req.stages, vec!["classification", "politics-analysis"]);
    }

    #[tokio::test]
    async fn subreddits_and_limit_are_extracted() {
        let req = planner()
            .resolve_intent("Get 5 posts from r/gamedev, r/unity3d and analyze the tech news")
            .await
            .unwrap();
        assert_eq!(req.sources, vec!["gamedev", "unity3d"]);
        assert_eq!(req.limit, 5);
        assert_eq!(req.stages, vec!["classification", "technology-analysis"]);
    }

    #[tokio::test]
    async fn finance_named_explicitly_is_included() {
        let req = planner()
            .resolve_intent("analyze business and finance headlines")
            .await
            .unwrap();
        assert_eq!(
            req.stages,
            vec!["classification", "business-analysis", "finance-analysis"]
        );
    }
}
