//! Core data model: item sets, stage results, the error ledger, and requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{NewsRouterError, Result};

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ItemSet
// ---------------------------------------------------------------------------

/// Source identifier → ordered headlines.
///
/// Keys are unique; item order within a key reflects source ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemSet(BTreeMap<String, Vec<String>>);

impl ItemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) the items for a key.
    pub fn insert(&mut self, key: impl Into<String>, items: Vec<String>) {
        self.0.insert(key.into(), items);
    }

    /// Append a single item under a key, creating the key if needed.
    pub fn push(&mut self, key: &str, item: impl Into<String>) {
        self.0.entry(key.to_string()).or_default().push(item.into());
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of items across all keys.
    pub fn item_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

impl FromIterator<(String, Vec<String>)> for ItemSet {
    fn from_iter<I: IntoIterator<Item = (String, Vec<String>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ItemSet {
    type Item = (String, Vec<String>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ---------------------------------------------------------------------------
// CategorizedItemSet
// ---------------------------------------------------------------------------

/// Category label → [`ItemSet`] holding the items classified under it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategorizedItemSet(BTreeMap<String, ItemSet>);

impl CategorizedItemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place one item from `source` into `category`.
    pub fn push(&mut self, category: &str, source: &str, item: impl Into<String>) {
        self.0
            .entry(category.to_string())
            .or_default()
            .push(source, item);
    }

    /// Insert (or replace) a whole category bucket.
    pub fn insert(&mut self, category: impl Into<String>, items: ItemSet) {
        self.0.insert(category.into(), items);
    }

    pub fn category(&self, label: &str) -> Option<&ItemSet> {
        self.0.get(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ItemSet)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of items across every category.
    pub fn item_count(&self) -> usize {
        self.0.values().map(ItemSet::item_count).sum()
    }

    /// Merge every category back into a single source-keyed set.
    pub fn flatten(&self) -> ItemSet {
        let mut merged = ItemSet::new();
        for bucket in self.0.values() {
            for (source, items) in bucket.iter() {
                for item in items {
                    merged.push(source, item.clone());
                }
            }
        }
        merged
    }
}

impl IntoIterator for CategorizedItemSet {
    type Item = (String, ItemSet);
    type IntoIter = std::collections::btree_map::IntoIter<String, ItemSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ---------------------------------------------------------------------------
// StageResult
// ---------------------------------------------------------------------------

/// The data shape flowing between stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "data", rename_all = "snake_case")]
pub enum StageOutput {
    Items(ItemSet),
    Categorized(CategorizedItemSet),
}

impl StageOutput {
    /// Short name of the shape, for logs and error messages.
    pub fn shape_name(&self) -> &'static str {
        match self {
            Self::Items(_) => "items",
            Self::Categorized(_) => "categorized",
        }
    }

    pub fn item_count(&self) -> usize {
        match self {
            Self::Items(set) => set.item_count(),
            Self::Categorized(set) => set.item_count(),
        }
    }
}

/// Output of one stage plus per-key warnings for keys it could not transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub output: StageOutput,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub warnings: BTreeMap<String, String>,
}

impl StageResult {
    /// A result with no warnings.
    pub fn clean(output: StageOutput) -> Self {
        Self {
            output,
            warnings: BTreeMap::new(),
        }
    }

    pub fn warn(&mut self, key: impl Into<String>, message: impl Into<String>) {
        self.warnings.insert(key.into(), message.into());
    }
}

// ---------------------------------------------------------------------------
// ErrorLedger
// ---------------------------------------------------------------------------

/// Kind of a contained (non-fatal) failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Live retrieval failed; fallback sample data was used.
    SourceUnavailable,
    /// No live or fallback data exists; a placeholder was used.
    SourceUnknown,
    /// Live retrieval succeeded with zero items; a placeholder was used.
    SourceEmpty,
    /// A stage could not transform one key; the original value passed through.
    StageWarning,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SourceUnavailable => "SourceUnavailable",
            Self::SourceUnknown => "SourceUnknown",
            Self::SourceEmpty => "SourceEmpty",
            Self::StageWarning => "StageWarning",
        };
        f.write_str(s)
    }
}

/// One contained failure: who, what kind, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Source or stage identifier the entry is about.
    pub origin: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Append-only record of contained failures for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorLedger(Vec<LedgerEntry>);

impl ErrorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, origin: impl Into<String>, kind: ErrorKind, message: impl Into<String>) {
        self.0.push(LedgerEntry {
            origin: origin.into(),
            kind,
            message: message.into(),
        });
    }

    pub fn append(&mut self, entries: impl IntoIterator<Item = LedgerEntry>) {
        self.0.extend(entries);
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of entries of the given kind.
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.0.iter().filter(|e| e.kind == kind).count()
    }
}

// ---------------------------------------------------------------------------
// PipelineRequest
// ---------------------------------------------------------------------------

/// One resolved user query: which stages to run over which sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRequest {
    /// Stage identifiers, in execution order.
    pub stages: Vec<String>,
    /// Source identifiers. Empty means "use the configured defaults".
    #[serde(default)]
    pub sources: Vec<String>,
    /// Maximum items per source.
    pub limit: usize,
}

impl PipelineRequest {
    /// Build a request, rejecting a zero limit.
    pub fn new(stages: Vec<String>, sources: Vec<String>, limit: usize) -> Result<Self> {
        let request = Self {
            stages,
            sources,
            limit,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(NewsRouterError::validation(
                "per-source item limit must be at least 1",
            ));
        }
        Ok(())
    }
}
