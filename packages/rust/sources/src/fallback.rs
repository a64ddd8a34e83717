//! Local deterministic sample headlines used when live retrieval is unavailable.
//!
//! The dataset is built once at startup and shared read-only (`Arc`) by every
//! [`SourceClient`](crate::SourceClient) of the process.

use std::collections::BTreeMap;

/// Built-in sample headlines, in source ranking order.
const BUILTIN: &[(&str, &[&str])] = &[
    (
        "worldnews",
        &[
            "Ukraine-Russia conflict: New peace talks scheduled for next week",
            "Climate Summit results in landmark agreement among G20 nations",
            "Global chip shortage expected to ease by Q3 according to industry leaders",
            "EU announces new trade deal with South American countries",
            "UN report warns of worsening refugee crisis in East Africa",
        ],
    ),
    (
        "news",
        &[
            "Supreme Court rules on landmark privacy case",
            "Major tech companies announce joint AI safety initiative",
            "Infrastructure bill passes with bipartisan support",
            "FDA approves new treatment for rare genetic disorder",
            "Record heatwave affects power grid across multiple states",
        ],
    ),
    (
        "sports",
        &[
            "Underdog team wins championship in stunning upset",
            "Star player signs record-breaking contract extension",
            "Olympic Committee announces changes to 2028 event schedule",
            "Controversy erupts over referee decision in playoff game",
            "Legendary coach announces retirement after 30-year career",
        ],
    ),
    (
        "gamedev",
        &[
            "Show HN: My new procedural level generator using Rust",
            "Unity releases update 2023.3 LTS - Key features discussion",
            "Best practices for optimizing physics in networked multiplayer games",
            "Debate: Is ECS the future for all game engines? Performance comparison.",
            "Looking for constructive feedback on my indie game's pixel art style",
            "How to get started with Godot 4.2 GDScript",
            "Unreal Engine 5.4 Nanite & Lumen deep dive",
        ],
    ),
    (
        "unrealengine",
        &[
            "Unreal Engine 5.4 Performance Guide for large open worlds",
            "How to implement advanced Niagara particle effects for magic spells",
            "MetaHumans Animator tutorial: Lip sync and facial expressions",
            "Showcase: Sci-Fi cinematic created entirely in UE5",
            "Troubleshooting Lumen global illumination artifacts in indoor scenes",
            "Marketplace highlight: Advanced locomotion system",
            "Tips for migrating projects from UE4 to UE5",
        ],
    ),
    (
        "unity3d",
        &[
            "Best practices for mobile game optimization in Unity 2023 LTS",
            "Understanding Unity's Data-Oriented Technology Stack (DOTS) and Burst Compiler",
            "Tutorial: Creating custom PBR shaders with Unity Shader Graph",
            "Top free assets from the Unity Asset Store this month",
            "Migrating project from URP to HDRP - Common pitfalls and solutions",
            "Introduction to Unity Muse for texture generation",
            "Networking in Unity: Netcode for GameObjects vs Photon PUN",
        ],
    ),
];

/// Immutable table of sample headlines keyed by lowercase source identifier.
#[derive(Debug, Clone, Default)]
pub struct FallbackDataset {
    table: BTreeMap<String, Vec<String>>,
}

impl FallbackDataset {
    /// The built-in sample table.
    pub fn builtin() -> Self {
        let table = BUILTIN
            .iter()
            .map(|(source, titles)| {
                (
                    (*source).to_string(),
                    titles.iter().map(|t| (*t).to_string()).collect(),
                )
            })
            .collect();
        Self { table }
    }

    /// Merge extra sources over this table. Extra entries replace built-in ones
    /// with the same (case-insensitive) identifier; empty lists are ignored.
    pub fn with_extra(mut self, extra: &BTreeMap<String, Vec<String>>) -> Self {
        for (source, titles) in extra {
            if titles.is_empty() {
                continue;
            }
            self.table.insert(source.to_lowercase(), titles.clone());
        }
        self
    }

    /// Up to `limit` sample items for `source`, in table order.
    ///
    /// Lookup is case-insensitive. Returns `None` when no sample exists.
    pub fn lookup(&self, source: &str, limit: usize) -> Option<Vec<String>> {
        self.table
            .get(&source.to_lowercase())
            .map(|titles| titles.iter().take(limit.max(1)).cloned().collect())
    }

    pub fn contains(&self, source: &str) -> bool {
        self.table.contains_key(&source.to_lowercase())
    }

    /// Source identifiers with sample data, sorted.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }
}
