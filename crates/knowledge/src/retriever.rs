//! Evidence retrieval: query rewriting, multi-strategy search and fusion.

use crate::fusion::fuse;
use crate::index::SimilarityIndex;
use crate::types::{EvidenceSet, SearchStrategy};
use care_core::config::{IndexConfig, RagConfig};
use care_core::{AppError, AppResult};
use care_llm::{LlmClient, LlmRequest};
use care_prompt::PromptSet;
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;

/// Rewrites follow-up questions into standalone search queries.
#[derive(Clone)]
struct QueryRewriter {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptSet>,
    model: String,
}

/// Queries a similarity index with several strategies and fuses the results.
#[derive(Clone)]
pub struct EvidenceRetriever {
    index: Arc<dyn SimilarityIndex>,
    strategies: Vec<SearchStrategy>,
    max_context: usize,
    rewriter: Option<QueryRewriter>,
    timeout: Duration,
}

/// Default strategies in declared order: MMR, then plain similarity.
pub fn default_strategies(config: &IndexConfig) -> Vec<SearchStrategy> {
    vec![
        SearchStrategy::Mmr {
            k: config.k,
            fetch_k: config.fetch_k,
            lambda_mult: config.lambda_mult,
        },
        SearchStrategy::Similarity { k: config.k },
    ]
}

impl EvidenceRetriever {
    pub fn new(
        index: Arc<dyn SimilarityIndex>,
        strategies: Vec<SearchStrategy>,
        max_context: usize,
    ) -> Self {
        Self {
            index,
            strategies,
            max_context,
            rewriter: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Build a retriever from configuration.
    pub fn from_config(
        index: Arc<dyn SimilarityIndex>,
        index_config: &IndexConfig,
        rag: &RagConfig,
    ) -> Self {
        Self::new(index, default_strategies(index_config), rag.max_context)
            .with_timeout(rag.generation_timeout())
    }

    /// Enable history-aware query rewriting.
    pub fn with_rewriter(
        mut self,
        llm: Arc<dyn LlmClient>,
        prompts: Arc<PromptSet>,
        model: impl Into<String>,
    ) -> Self {
        self.rewriter = Some(QueryRewriter {
            llm,
            prompts,
            model: model.into(),
        });
        self
    }

    /// Bound the rewrite call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retrieve fused evidence for `query` given the formatted `history`.
    ///
    /// Any index failure fails the whole retrieval with `AppError::Retrieval`.
    pub async fn retrieve(&self, query: &str, history: &str) -> AppResult<EvidenceSet> {
        let search_query = if history.trim().is_empty() {
            query.to_string()
        } else {
            self.rewrite(query, history).await
        };

        tracing::info!(
            "Searching {} with {} strategies",
            self.index.name(),
            self.strategies.len()
        );
        tracing::debug!("Search query: {}", search_query);

        let searches = self.strategies.iter().map(|strategy| {
            let search_query = search_query.as_str();
            async move {
                let hits = self
                    .index
                    .search(search_query, strategy)
                    .await
                    .map_err(into_retrieval_error)?;
                tracing::debug!("{} returned {} hits", strategy.kind().as_str(), hits.len());
                Ok::<_, AppError>((strategy.kind(), hits))
            }
        });

        let lists = try_join_all(searches).await?;
        let evidence = fuse(lists, self.max_context);

        tracing::info!("Retrieved {} evidence items", evidence.len());
        Ok(evidence)
    }

    /// Condense history plus query into a standalone query, falling back to the raw query.
    async fn rewrite(&self, query: &str, history: &str) -> String {
        let Some(rewriter) = &self.rewriter else {
            return query.to_string();
        };

        match self.try_rewrite(rewriter, query, history).await {
            Ok(rewritten) if !rewritten.trim().is_empty() => rewritten.trim().to_string(),
            Ok(_) => {
                tracing::warn!("Query rewrite returned blank text, using raw query");
                query.to_string()
            }
            Err(e) => {
                tracing::warn!("Query rewrite failed, using raw query: {}", e);
                query.to_string()
            }
        }
    }

    async fn try_rewrite(
        &self,
        rewriter: &QueryRewriter,
        query: &str,
        history: &str,
    ) -> AppResult<String> {
        let prompt = rewriter.prompts.rewrite(history, query)?;
        let mut request = LlmRequest::new(prompt.user, rewriter.model.clone()).with_temperature(0.0);
        if let Some(max_tokens) = prompt.metadata.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response = tokio::time::timeout(self.timeout, rewriter.llm.complete(&request))
            .await
            .map_err(|_| AppError::Llm("Query rewrite timed out".to_string()))??;

        Ok(response.content)
    }
}

fn into_retrieval_error(error: AppError) -> AppError {
    match error {
        AppError::Retrieval(_) => error,
        other => AppError::Retrieval(other.to_string()),
    }
}
