//! End-to-end run: sources → aggregate → stage sequence → result + ledger.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use newsrouter_shared::{
    CategorizedItemSet, ClassificationConfig, ErrorKind, ErrorLedger, NewsRouterError,
    PipelineRequest, Result, RunId, StageOutput, StageResult, StageShape,
};
use newsrouter_sources::{Aggregator, FetchMode, deadline_after};

use crate::reasoner::Reasoner;
use crate::stage::{StageContext, StageDefinition, StageInput, StageRegistry};

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    /// Executing the stage at this index.
    Running(usize),
    /// Finished with a non-empty ledger. Still carries a full result.
    PartiallyFailed,
    Completed,
}

/// Per-run knobs that are not part of the resolved request.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overall deadline for source retrieval.
    pub fetch_deadline: Option<Duration>,
}

/// Final artifact of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub run_id: RunId,
    pub state: RunState,
    /// Output of the last stage (or the aggregated items if no stage ran).
    pub result: StageResult,
    pub ledger: ErrorLedger,
    /// Retrieval mode used for each source key.
    pub source_modes: BTreeMap<String, FetchMode>,
    pub stages_run: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a stage starts.
    fn stage_started(&self, index: usize, total: usize, stage: &str);
    /// Called when the run completes.
    fn done(&self, outcome: &PipelineOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn stage_started(&self, _index: usize, _total: usize, _stage: &str) {}
    fn done(&self, _outcome: &PipelineOutcome) {}
}

/// Drives a [`PipelineRequest`] through retrieval and its stage sequence.
pub struct Orchestrator {
    aggregator: Aggregator,
    registry: StageRegistry,
    reasoner: Arc<dyn Reasoner>,
    classification: ClassificationConfig,
}

impl Orchestrator {
    pub fn new(
        aggregator: Aggregator,
        registry: StageRegistry,
        reasoner: Arc<dyn Reasoner>,
        classification: ClassificationConfig,
    ) -> Self {
        Self {
            aggregator,
            registry,
            reasoner,
            classification,
        }
    }

    /// Resolve and shape-check a stage sequence without fetching anything.
    ///
    /// A selective stage is valid only if some splitting stage precedes it.
    pub fn validate(&self, stages: &[String]) -> Result<Vec<StageDefinition>> {
        let mut resolved = Vec::with_capacity(stages.len());
        let mut categorized_available = false;

        for (position, id) in stages.iter().enumerate() {
            let def = self.registry.get(id)?;
            match def.shape {
                StageShape::Splitting => categorized_available = true,
                StageShape::Selective if !categorized_available => {
                    return Err(NewsRouterError::PipelineConfiguration {
                        stage: def.id.clone(),
                        position,
                        message: format!(
                            "selective stage needs categorized input (category '{}'), \
                             but no classification stage precedes it",
                            def.category.as_deref().unwrap_or_default()
                        ),
                    });
                }
                _ => {}
            }
            resolved.push(def.clone());
        }

        Ok(resolved)
    }

    /// Run the full pipeline.
    ///
    /// 1. Validate the stage sequence (fatal on shape mismatch)
    /// 2. Aggregate all sources concurrently
    /// 3. Apply each stage in order, collecting warnings into the ledger
    #[instrument(skip_all, fields(stages = ?request.stages, limit = request.limit))]
    pub async fn run(
        &self,
        request: &PipelineRequest,
        options: &RunOptions,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineOutcome> {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = RunId::new();

        request.validate()?;
        let stages = self.validate(&request.stages)?;

        let mut state = RunState::Pending;
        info!(%run_id, ?state, reasoner = self.reasoner.name(), "starting pipeline run");

        // --- Phase 1: Retrieval ---
        progress.phase("Fetching sources");
        let deadline = options.fetch_deadline.map(deadline_after);
        let aggregation = self
            .aggregator
            .fetch_all(&request.sources, request.limit, deadline)
            .await;

        let mut ledger = ErrorLedger::new();
        ledger.append(aggregation.ledger);
        let source_modes: BTreeMap<String, FetchMode> = aggregation.modes.into_iter().collect();

        let mut result = StageResult::clean(StageOutput::Items(aggregation.items));
        let mut latest_categorized: Option<CategorizedItemSet> = None;
        let mut stages_run = Vec::with_capacity(stages.len());

        // --- Phase 2: Stages ---
        let ctx = StageContext {
            reasoner: self.reasoner.as_ref(),
            categories: &self.classification.categories,
            uncategorized: &self.classification.uncategorized_label,
        };

        for (index, stage) in stages.iter().enumerate() {
            state = RunState::Running(index);
            debug!(?state, stage = %stage.id, "stage transition");
            progress.stage_started(index, stages.len(), &stage.id);

            let input = StageInput {
                current: &result.output,
                latest_categorized: latest_categorized.as_ref(),
            };
            let next = stage.apply(input, &ctx).await.map_err(|e| match e {
                NewsRouterError::PipelineConfiguration { stage, message, .. } => {
                    NewsRouterError::PipelineConfiguration {
                        stage,
                        position: index,
                        message,
                    }
                }
                other => other,
            })?;

            for (key, message) in &next.warnings {
                ledger.record(&stage.id, ErrorKind::StageWarning, format!("{key}: {message}"));
            }

            info!(
                stage = %stage.id,
                shape = next.output.shape_name(),
                items = next.output.item_count(),
                warnings = next.warnings.len(),
                "stage complete"
            );

            if let StageOutput::Categorized(set) = &next.output {
                latest_categorized = Some(set.clone());
            }
            stages_run.push(stage.id.clone());
            result = next;
        }

        state = if ledger.is_empty() {
            RunState::Completed
        } else {
            RunState::PartiallyFailed
        };

        let outcome = PipelineOutcome {
            run_id,
            state,
            result,
            ledger,
            source_modes,
            stages_run,
            started_at,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        progress.done(&outcome);

        info!(
            run_id = %outcome.run_id,
            state = ?outcome.state,
            ledger_entries = outcome.ledger.len(),
            elapsed_ms = outcome.elapsed_ms,
            "pipeline run complete"
        );

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsrouter_sources::{FallbackDataset, SourceClient};

    use crate::reasoner::StubReasoner;

    fn orchestrator() -> Orchestrator {
        let client = SourceClient::offline(Arc::new(FallbackDataset::builtin()));
        let aggregator = Aggregator::new(client, vec!["news".into()]);
        let classification = ClassificationConfig::default();
        Orchestrator::new(
            aggregator,
            StageRegistry::builtin(),
            Arc::new(StubReasoner::new(classification.keywords.clone())),
            classification,
        )
    }

    fn stages(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn validate_requires_preceding_classification() {
        let orch = orchestrator();
        assert!(orch.validate(&stages(&["classification", "politics-analysis"])).is_ok());
        assert!(
            orch.validate(&stages(&["classification", "politics-analysis", "technology-analysis"]))
                .is_ok()
        );
        assert!(orch.validate(&stages(&["summarization"])).is_ok());
        assert!(orch.validate(&[]).is_ok());

        let err = orch
            .validate(&stages(&["summarization", "politics-analysis", "classification"]))
            .unwrap_err();
        match err {
            NewsRouterError::PipelineConfiguration { stage, position, .. } => {
                assert_eq!(stage, "politics-analysis");
                assert_eq!(position, 1);
            }
            other => panic!("expected PipelineConfiguration, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_unknown_stage() {
        let err = orchestrator().validate(&stages(&["horoscope"])).unwrap_err();
        assert!(matches!(err, NewsRouterError::UnknownStage(_)));
    }

    #[tokio::test]
    async fn no_stages_returns_aggregated_items() {
        let request = PipelineRequest::new(vec![], vec!["sports".into()], 2).unwrap();
        let outcome = orchestrator()
            .run(&request, &RunOptions::default(), &SilentProgress)
            .await
            .unwrap();

        let StageOutput::Items(items) = &outcome.result.output else {
            panic!("expected items");
        };
        assert_eq!(items.get("sports").unwrap().len(), 2);
        assert!(outcome.stages_run.is_empty());
        assert_eq!(outcome.source_modes.get("sports"), Some(&FetchMode::Fallback));
        // Offline retrieval always records a fallback entry.
        assert_eq!(outcome.state, RunState::PartiallyFailed);
    }

    #[tokio::test]
    async fn zero_limit_is_rejected_before_fetching() {
        let request = PipelineRequest {
            stages: vec![],
            sources: vec![],
            limit: 0,
        };
        let err = orchestrator()
            .run(&request, &RunOptions::default(), &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, NewsRouterError::Validation { .. }));
    }

    #[test]
    fn outcome_serializes_losslessly() {
        let mut ledger = ErrorLedger::new();
        ledger.record("news", ErrorKind::SourceUnavailable, "offline");
        let outcome = PipelineOutcome {
            run_id: RunId::new(),
            state: RunState::PartiallyFailed,
            result: StageResult::clean(StageOutput::Items(Default::default())),
            ledger,
            source_modes: BTreeMap::from([("news".to_string(), FetchMode::Fallback)]),
            stages_run: vec!["summarization".into()],
            started_at: Utc::now(),
            elapsed_ms: 12,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains(r#""state":"partially_failed""#));
        let parsed: PipelineOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.ledger, outcome.ledger);
        assert_eq!(parsed.result, outcome.result);
        assert_eq!(parsed.source_modes, outcome.source_modes);
        assert!(json.contains(r#""news":"fallback""#));
    }
}
