//! Core evidence types.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which retrieval strategy produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Mmr,
    Similarity,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Mmr => "mmr",
            StrategyKind::Similarity => "similarity",
        }
    }
}

/// A retrieval strategy with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SearchStrategy {
    /// Maximal marginal relevance over `fetch_k` candidates.
    Mmr {
        k: usize,
        fetch_k: usize,
        lambda_mult: f32,
    },
    /// Plain top-k similarity.
    Similarity { k: usize },
}

impl SearchStrategy {
    pub fn kind(&self) -> StrategyKind {
        match self {
            SearchStrategy::Mmr { .. } => StrategyKind::Mmr,
            SearchStrategy::Similarity { .. } => StrategyKind::Similarity,
        }
    }

    /// Number of results this strategy returns.
    pub fn k(&self) -> usize {
        match self {
            SearchStrategy::Mmr { k, .. } | SearchStrategy::Similarity { k } => *k,
        }
    }
}

/// One passage returned by the similarity index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    pub text: String,
    pub url: Option<String>,
    pub score: Option<f32>,
}

impl IndexHit {
    pub fn new(text: impl Into<String>, url: Option<&str>) -> Self {
        Self {
            text: text.into(),
            url: url.map(str::to_string),
            score: None,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }
}

/// A passage kept for grounding an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub text: String,
    pub source_url: Option<String>,
    pub strategy: StrategyKind,
    /// Position within the producing strategy's list, 0-based
    pub rank: usize,
    pub score: Option<f32>,
}

/// Fused evidence for one turn.
///
/// Holds at most `capacity` items and never two items with the same
/// non-empty source URL. Order is fused rank, most relevant first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvidenceSet {
    items: Vec<EvidenceItem>,
    #[serde(skip)]
    seen_urls: HashSet<String>,
    #[serde(skip)]
    capacity: usize,
}

impl EvidenceSet {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            seen_urls: HashSet::new(),
            capacity,
        }
    }

    /// Add an item unless the set is full or its URL is already present.
    /// Returns whether the item was kept.
    pub fn insert(&mut self, item: EvidenceItem) -> bool {
        if self.is_full() {
            return false;
        }

        if let Some(url) = item.source_url.as_deref().filter(|u| !u.is_empty()) {
            if !self.seen_urls.insert(url.to_string()) {
                return false;
            }
        }

        self.items.push(item);
        true
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn items(&self) -> &[EvidenceItem] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EvidenceItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
