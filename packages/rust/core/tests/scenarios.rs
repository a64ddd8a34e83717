//! End-to-end runs against the offline stub reasoner and scripted live sources.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use newsrouter_core::{
    Orchestrator, PipelineOutcome, Reasoner, RunOptions, RunState, SilentProgress, StageRegistry,
    StubReasoner, TaskKind, TransformRequest,
};
use newsrouter_shared::{
    ClassificationConfig, ErrorKind, NewsRouterError, PipelineRequest, Result, StageOutput,
};
use newsrouter_sources::{
    Aggregator, FallbackDataset, FetchMode, LiveSource, SourceClient, unknown_placeholder,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Live source returning canned headlines and counting calls.
struct CannedLive {
    headlines: BTreeMap<String, Vec<String>>,
    calls: AtomicUsize,
}

impl CannedLive {
    fn new(pairs: &[(&str, &[&str])]) -> Self {
        Self {
            headlines: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.iter().map(|s| (*s).to_string()).collect()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LiveSource for CannedLive {
    async fn fetch_titles(&self, source: &str, limit: usize) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.headlines
            .get(source)
            .map(|items| items.iter().take(limit).cloned().collect())
            .ok_or_else(|| NewsRouterError::Network(format!("{source}: HTTP 404")))
    }

    fn name(&self) -> &str {
        "canned"
    }
}

/// Reasoner that fails every transform for one key.
struct FailsOn(&'static str);

#[async_trait]
impl Reasoner for FailsOn {
    async fn transform(&self, request: &TransformRequest<'_>) -> Result<Vec<String>> {
        if request.key == self.0 {
            return Err(NewsRouterError::Reasoning("bridge timeout".into()));
        }
        Ok(match request.task {
            TaskKind::Transform => vec![format!("summary of {}", request.key)],
            TaskKind::Classify => vec![String::new(); request.items.len()],
        })
    }

    fn name(&self) -> &str {
        "fails-on"
    }
}

fn classification() -> ClassificationConfig {
    let mut keywords = BTreeMap::new();
    keywords.insert("politics".to_string(), vec!["election".to_string(), "senate".to_string()]);
    keywords.insert("technology".to_string(), vec!["software".to_string(), "chip".to_string()]);
    ClassificationConfig {
        keywords,
        ..ClassificationConfig::default()
    }
}

fn offline_orchestrator() -> Orchestrator {
    orchestrator_with(None, Arc::new(StubReasoner::new(classification().keywords)))
}

fn orchestrator_with(live: Option<Arc<dyn LiveSource>>, reasoner: Arc<dyn Reasoner>) -> Orchestrator {
    let client = SourceClient::new(live, Arc::new(FallbackDataset::builtin()));
    let aggregator = Aggregator::new(client, vec!["worldnews".into(), "news".into(), "sports".into()]);
    Orchestrator::new(aggregator, StageRegistry::builtin(), reasoner, classification())
}

fn request(stages: &[&str], sources: &[&str], limit: usize) -> PipelineRequest {
    PipelineRequest::new(
        stages.iter().map(|s| (*s).to_string()).collect(),
        sources.iter().map(|s| (*s).to_string()).collect(),
        limit,
    )
    .expect("valid request")
}

async fn run(orch: &Orchestrator, req: &PipelineRequest) -> Result<PipelineOutcome> {
    orch.run(req, &RunOptions::default(), &SilentProgress).await
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn offline_known_source_serves_fallback_sample() {
    let outcome = run(&offline_orchestrator(), &request(&[], &["worldnews"], 3))
        .await
        .unwrap();

    let StageOutput::Items(items) = &outcome.result.output else {
        panic!("expected items");
    };
    assert_eq!(items.len(), 1);
    let headlines = items.get("worldnews").unwrap();
    assert!(!headlines.is_empty() && headlines.len() <= 3);
    assert_eq!(
        headlines,
        FallbackDataset::builtin().lookup("worldnews", 3).unwrap().as_slice()
    );

    assert_eq!(outcome.ledger.len(), 1);
    assert_eq!(outcome.ledger.entries()[0].kind, ErrorKind::SourceUnavailable);
    assert_eq!(outcome.ledger.entries()[0].origin, "worldnews");
    assert_eq!(outcome.source_modes.get("worldnews"), Some(&FetchMode::Fallback));
    assert_eq!(outcome.state, RunState::PartiallyFailed);
}

#[tokio::test]
async fn unknown_source_yields_single_placeholder() {
    let live: Arc<dyn LiveSource> = Arc::new(CannedLive::new(&[("news", &["x"])]));
    let orchestrators = [
        offline_orchestrator(),
        orchestrator_with(Some(live), Arc::new(StubReasoner::default())),
    ];

    for orch in &orchestrators {
        let outcome = run(orch, &request(&[], &["zzzzz-unknown"], 3)).await.unwrap();
        let StageOutput::Items(items) = &outcome.result.output else {
            panic!("expected items");
        };
        assert_eq!(
            items.get("zzzzz-unknown"),
            Some(&[unknown_placeholder("zzzzz-unknown")][..])
        );
        assert_eq!(outcome.ledger.len(), 1);
        assert_eq!(outcome.ledger.count(ErrorKind::SourceUnknown), 1);
        assert_eq!(outcome.source_modes.get("zzzzz-unknown"), Some(&FetchMode::Placeholder));
    }
}

#[tokio::test]
async fn classification_then_politics_analysis_keeps_only_politics() {
    let live: Arc<dyn LiveSource> = Arc::new(CannedLive::new(&[
        ("desk_a", &["Election results certified", "New software release ships"]),
        ("desk_b", &["Chip plant opens", "Senate passes budget"]),
    ]));
    let orch = orchestrator_with(Some(live), Arc::new(StubReasoner::new(classification().keywords)));

    let outcome = run(
        &orch,
        &request(&["classification", "politics-analysis"], &["desk_a", "desk_b"], 5),
    )
    .await
    .unwrap();

    let StageOutput::Items(items) = &outcome.result.output else {
        panic!("expected items");
    };
    assert_eq!(items.get("desk_a").unwrap(), &["Election results certified".to_string()][..]);
    assert_eq!(items.get("desk_b").unwrap(), &["Senate passes budget".to_string()][..]);
    assert_eq!(items.item_count(), 2);
    assert_eq!(outcome.stages_run, vec!["classification", "politics-analysis"]);
    assert!(outcome.source_modes.values().all(|mode| *mode == FetchMode::Live));
    assert!(outcome.ledger.is_empty());
    assert_eq!(outcome.state, RunState::Completed);
}

#[tokio::test]
async fn analysis_without_classification_fails_before_fetching() {
    let live = Arc::new(CannedLive::new(&[("news", &["x"])]));
    let live_dyn: Arc<dyn LiveSource> = live.clone();
    let orch = orchestrator_with(Some(live_dyn), Arc::new(StubReasoner::default()));

    let err = run(&orch, &request(&["politics-analysis"], &["news"], 3))
        .await
        .unwrap_err();

    assert!(err.is_pipeline_configuration());
    assert_eq!(live.calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_key_per_distinct_source_and_none_empty() {
    let cases: [&[&str]; 4] = [
        &[],
        &["news", "NEWS", "news"],
        &["sports", "zzzzz-unknown", "gamedev"],
        &["  ", "unity3d"],
    ];
    let expected_keys = [3, 1, 3, 1];

    let orch = offline_orchestrator();
    for (sources, expected) in cases.iter().zip(expected_keys) {
        let outcome = run(&orch, &request(&[], sources, 2)).await.unwrap();
        let StageOutput::Items(items) = &outcome.result.output else {
            panic!("expected items");
        };
        assert_eq!(items.len(), expected, "sources {sources:?}");
        assert!(items.iter().all(|(_, v)| !v.is_empty()));
    }
}

#[tokio::test]
async fn classification_conserves_item_count() {
    let orch = offline_orchestrator();
    let outcome = run(
        &orch,
        &request(&["classification"], &["worldnews", "news", "gamedev", "nope"], 5),
    )
    .await
    .unwrap();

    let StageOutput::Categorized(buckets) = &outcome.result.output else {
        panic!("expected categorized");
    };
    // 5 + 5 + 5 sample items, plus one placeholder for the unknown source.
    assert_eq!(buckets.item_count(), 16);
    assert!(buckets.category("uncategorized").is_some());
}

#[tokio::test]
async fn absent_category_gives_empty_result() {
    let live: Arc<dyn LiveSource> =
        Arc::new(CannedLive::new(&[("desk", &["Election day", "Software update"])]));
    let orch = orchestrator_with(Some(live), Arc::new(StubReasoner::new(classification().keywords)));

    let outcome = run(&orch, &request(&["classification", "business-analysis"], &["desk"], 5))
        .await
        .unwrap();

    assert_eq!(outcome.result.output, StageOutput::Items(Default::default()));
    assert_eq!(outcome.state, RunState::Completed);
}

#[tokio::test]
async fn several_analyses_after_one_classification() {
    let live: Arc<dyn LiveSource> =
        Arc::new(CannedLive::new(&[("desk", &["Election day", "Software update"])]));
    let orch = orchestrator_with(Some(live), Arc::new(StubReasoner::new(classification().keywords)));

    let outcome = run(
        &orch,
        &request(&["classification", "politics-analysis", "technology-analysis"], &["desk"], 5),
    )
    .await
    .unwrap();

    let StageOutput::Items(items) = &outcome.result.output else {
        panic!("expected items");
    };
    assert_eq!(items.get("desk").unwrap(), &["Software update".to_string()][..]);
}

#[tokio::test]
async fn stage_warnings_are_recorded_and_do_not_halt() {
    let live: Arc<dyn LiveSource> =
        Arc::new(CannedLive::new(&[("a", &["one"]), ("b", &["two", "three"])]));
    let orch = orchestrator_with(Some(live), Arc::new(FailsOn("b")));

    let outcome = run(&orch, &request(&["summarization", "summarization"], &["a", "b"], 5))
        .await
        .unwrap();

    let StageOutput::Items(items) = &outcome.result.output else {
        panic!("expected items");
    };
    assert_eq!(items.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(items.get("a").unwrap(), &["summary of a".to_string()][..]);
    // Original value passed through for the failing key, both times.
    assert_eq!(items.get("b").unwrap(), &["two".to_string(), "three".to_string()][..]);

    assert_eq!(outcome.ledger.count(ErrorKind::StageWarning), 2);
    assert!(outcome.ledger.entries().iter().all(|e| e.origin == "summarization"));
    assert!(outcome.ledger.entries()[0].message.starts_with("b:"));
    assert_eq!(outcome.state, RunState::PartiallyFailed);
}

#[tokio::test]
async fn unknown_stage_is_rejected() {
    let err = run(&offline_orchestrator(), &request(&["horoscope"], &["news"], 3))
        .await
        .unwrap_err();
    assert!(matches!(err, NewsRouterError::UnknownStage(ref id) if id == "horoscope"));
}
