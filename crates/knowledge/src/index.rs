//! Similarity index abstraction.
//!
//! Defines a trait for provider-agnostic passage retrieval, plus an in-memory
//! implementation used by tests and offline demos.

use crate::types::{IndexHit, SearchStrategy, StrategyKind};
use care_core::{AppError, AppResult};
use std::collections::HashMap;
use std::time::Duration;

/// Trait for similarity index backends.
///
/// Implementations return hits ordered by the strategy's ranking, most
/// relevant first, and at most `strategy.k()` of them.
#[async_trait::async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Search the index for passages relevant to `query`.
    async fn search(&self, query: &str, strategy: &SearchStrategy) -> AppResult<Vec<IndexHit>>;
}

/// Index answering every query with fixed per-strategy hit lists.
#[derive(Debug, Default, Clone)]
pub struct StaticIndex {
    hits: HashMap<StrategyKind, Vec<IndexHit>>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl StaticIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hits returned for `kind`, in ranked order.
    pub fn with_hits(mut self, kind: StrategyKind, hits: Vec<IndexHit>) -> Self {
        self.hits.insert(kind, hits);
        self
    }

    /// Make every search fail with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait::async_trait]
impl SimilarityIndex for StaticIndex {
    fn name(&self) -> &str {
        "static"
    }

    async fn search(&self, _query: &str, strategy: &SearchStrategy) -> AppResult<Vec<IndexHit>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = &self.failure {
            return Err(AppError::Retrieval(message.clone()));
        }

        Ok(self
            .hits
            .get(&strategy.kind())
            .map(|hits| hits.iter().take(strategy.k()).cloned().collect())
            .unwrap_or_default())
    }
}
