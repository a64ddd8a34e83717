//! Stage shape contracts and the stage registry.
//!
//! A stage is a capability boundary: it hands each key's items to the
//! [`Reasoner`] and enforces the shape of what comes back. Three shapes exist:
//!
//! - **pass-through** (summarization): same keys in, same keys out
//! - **splitting** (classification): items → category buckets, none dropped
//! - **selective** (category analysis): one category bucket → source-keyed items
//!
//! A key the capability fails on keeps its original value and yields a warning.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use newsrouter_shared::{
    AppConfig, CategorizedItemSet, ItemSet, NewsRouterError, Result, StageConfig, StageOutput,
    StageResult, StageShape,
};

use crate::reasoner::{Reasoner, TaskKind, TransformRequest};

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// A registered stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDefinition {
    pub id: String,
    pub shape: StageShape,
    /// Target category for selective stages.
    pub category: Option<String>,
    pub instruction: String,
}

impl StageDefinition {
    pub fn pass_through(id: &str, instruction: &str) -> Self {
        Self {
            id: id.into(),
            shape: StageShape::PassThrough,
            category: None,
            instruction: instruction.into(),
        }
    }

    pub fn splitting(id: &str, instruction: &str) -> Self {
        Self {
            id: id.into(),
            shape: StageShape::Splitting,
            category: None,
            instruction: instruction.into(),
        }
    }

    pub fn selective(id: &str, category: &str, instruction: &str) -> Self {
        Self {
            id: id.into(),
            shape: StageShape::Selective,
            category: Some(category.into()),
            instruction: instruction.into(),
        }
    }
}

impl From<&StageConfig> for StageDefinition {
    fn from(config: &StageConfig) -> Self {
        Self {
            id: config.id.to_lowercase(),
            shape: config.shape,
            category: config.category.clone(),
            instruction: config.instruction.clone(),
        }
    }
}

/// Stage identifiers → definitions. Lookup is case-insensitive.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: BTreeMap<String, StageDefinition>,
}

impl StageRegistry {
    /// Built-in stages: summarization, classification, and four analyses.
    pub fn builtin() -> Self {
        let defs = [
            StageDefinition::pass_through(
                "summarization",
                "For each source, write a 2-3 sentence neutral summary of the main themes in its headlines.",
            ),
            StageDefinition::splitting(
                "classification",
                "Assign each headline exactly one category from the allowed list; choose the most prominent theme.",
            ),
            StageDefinition::selective(
                "politics-analysis",
                "politics",
                "Analyze policy implications, power dynamics and public impact of these political headlines, neutrally.",
            ),
            StageDefinition::selective(
                "technology-analysis",
                "technology",
                "Analyze the technical significance, industry impact and trends behind these technology headlines.",
            ),
            StageDefinition::selective(
                "business-analysis",
                "business",
                "Analyze the market, industry and economic implications of these business headlines.",
            ),
            StageDefinition::selective(
                "finance-analysis",
                "business",
                "Analyze the financial market and economic signals in these headlines.",
            ),
        ];
        Self {
            stages: defs.into_iter().map(|d| (d.id.clone(), d)).collect(),
        }
    }

    /// Built-ins with `[[stages]]` from config added or replacing by id.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut registry = Self::builtin();
        for stage in &config.stages {
            registry.register(StageDefinition::from(stage));
        }
        registry
    }

    pub fn register(&mut self, def: StageDefinition) {
        self.stages.insert(def.id.to_lowercase(), def);
    }

    pub fn get(&self, id: &str) -> Result<&StageDefinition> {
        self.stages
            .get(&id.trim().to_lowercase())
            .ok_or_else(|| NewsRouterError::UnknownStage(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageDefinition> {
        self.stages.values()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Everything a stage needs besides its input.
pub struct StageContext<'a> {
    pub reasoner: &'a dyn Reasoner,
    pub categories: &'a [String],
    pub uncategorized: &'a str,
}

/// What a stage receives: the previous output, plus the most recent
/// categorization produced earlier in the run (for selective stages).
pub struct StageInput<'a> {
    pub current: &'a StageOutput,
    pub latest_categorized: Option<&'a CategorizedItemSet>,
}

impl StageDefinition {
    /// Run this stage over `input`.
    ///
    /// The only error is a shape mismatch (selective stage with no prior
    /// categorization); capability failures become warnings.
    pub async fn apply(&self, input: StageInput<'_>, ctx: &StageContext<'_>) -> Result<StageResult> {
        match self.shape {
            StageShape::PassThrough => Ok(self.apply_pass_through(input.current, ctx).await),
            StageShape::Splitting => Ok(self.apply_splitting(input.current, ctx).await),
            StageShape::Selective => {
                let categorized = match (input.current, input.latest_categorized) {
                    (StageOutput::Categorized(set), _) => set,
                    (_, Some(set)) => set,
                    (StageOutput::Items(_), None) => {
                        return Err(NewsRouterError::PipelineConfiguration {
                            stage: self.id.clone(),
                            position: 0,
                            message: "selective stage received uncategorized items".into(),
                        });
                    }
                };
                Ok(self.apply_selective(categorized, ctx).await)
            }
        }
    }

    async fn apply_pass_through(&self, current: &StageOutput, ctx: &StageContext<'_>) -> StageResult {
        let mut warnings = BTreeMap::new();
        let output = match current {
            StageOutput::Items(set) => {
                StageOutput::Items(self.transform_set(set, None, ctx, &mut warnings).await)
            }
            StageOutput::Categorized(buckets) => {
                let mut out = CategorizedItemSet::new();
                for (category, set) in buckets.iter() {
                    let transformed = self.transform_set(set, Some(category), ctx, &mut warnings).await;
                    out.insert(category, transformed);
                }
                StageOutput::Categorized(out)
            }
        };
        StageResult { output, warnings }
    }

    async fn apply_selective(&self, categorized: &CategorizedItemSet, ctx: &StageContext<'_>) -> StageResult {
        let target = self.category.as_deref().unwrap_or_default();
        let bucket = categorized
            .iter()
            .find(|(label, _)| label.eq_ignore_ascii_case(target))
            .map(|(_, set)| set.clone())
            .unwrap_or_default();

        debug!(stage = %self.id, category = target, keys = bucket.len(), "selected category");

        let mut warnings = BTreeMap::new();
        let output = self.transform_set(&bucket, None, ctx, &mut warnings).await;
        StageResult {
            output: StageOutput::Items(output),
            warnings,
        }
    }

    /// Transform every key of `set`, passing originals through on failure.
    async fn transform_set(
        &self,
        set: &ItemSet,
        category: Option<&str>,
        ctx: &StageContext<'_>,
        warnings: &mut BTreeMap<String, String>,
    ) -> ItemSet {
        let mut out = ItemSet::new();
        for (source, items) in set.iter() {
            let key = match category {
                Some(category) => format!("{category}/{source}"),
                None => source.to_string(),
            };
            let request = TransformRequest {
                task: TaskKind::Transform,
                stage: &self.id,
                instruction: &self.instruction,
                key: &key,
                items,
                categories: &[],
            };

            let value = match ctx.reasoner.transform(&request).await {
                Ok(transformed) if !transformed.is_empty() => transformed,
                Ok(_) => {
                    warn!(stage = %self.id, %key, "transform returned no items, passing original through");
                    warnings.insert(key, "transform returned no items".into());
                    items.to_vec()
                }
                Err(e) => {
                    warn!(stage = %self.id, %key, error = %e, "transform failed, passing original through");
                    warnings.insert(key, e.to_string());
                    items.to_vec()
                }
            };
            out.insert(source, value);
        }
        out
    }

    async fn apply_splitting(&self, current: &StageOutput, ctx: &StageContext<'_>) -> StageResult {
        let flattened;
        let input = match current {
            StageOutput::Items(set) => set,
            StageOutput::Categorized(buckets) => {
                flattened = buckets.flatten();
                &flattened
            }
        };

        let mut warnings = BTreeMap::new();
        let mut out = CategorizedItemSet::new();

        for (source, items) in input.iter() {
            let request = TransformRequest {
                task: TaskKind::Classify,
                stage: &self.id,
                instruction: &self.instruction,
                key: source,
                items,
                categories: ctx.categories,
            };

            let labels = match ctx.reasoner.transform(&request).await {
                Ok(labels) => {
                    if labels.len() != items.len() {
                        warn!(
                            stage = %self.id,
                            source,
                            labels = labels.len(),
                            items = items.len(),
                            "label count mismatch"
                        );
                        warnings.insert(
                            source.to_string(),
                            format!("got {} labels for {} items", labels.len(), items.len()),
                        );
                    }
                    labels
                }
                Err(e) => {
                    warn!(stage = %self.id, source, error = %e, "classification failed, items left uncategorized");
                    warnings.insert(source.to_string(), e.to_string());
                    Vec::new()
                }
            };

            for (i, item) in items.iter().enumerate() {
                let label = labels
                    .get(i)
                    .and_then(|label| canonical_category(label, ctx.categories))
                    .unwrap_or(ctx.uncategorized);
                out.push(label, source, item.clone());
            }
        }

        StageResult {
            output: StageOutput::Categorized(out),
            warnings,
        }
    }
}

/// Match `label` against the configured categories, ignoring case and
/// surrounding whitespace.
fn canonical_category<'a>(label: &str, categories: &'a [String]) -> Option<&'a str> {
    let label = label.trim();
    categories
        .iter()
        .find(|c| c.eq_ignore_ascii_case(label))
        .map(String::as_str)
}
