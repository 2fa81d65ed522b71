//! Qdrant-backed similarity index.
//!
//! Talks to the Qdrant REST API (`/collections/<name>/points/search`). MMR is
//! computed client-side over `fetch_k` candidates returned with their vectors.

use crate::embedder::Embedder;
use crate::index::SimilarityIndex;
use crate::mmr::mmr_select;
use crate::types::{IndexHit, SearchStrategy};
use care_core::config::IndexConfig;
use care_core::{AppError, AppResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Similarity index over a Qdrant collection.
#[derive(Debug, Clone)]
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    collection: String,
    text_key: String,
    metadata_key: String,
    embedder: Arc<dyn Embedder>,
    /// Last query and its embedding, shared by the strategies of one retrieval
    last_query: Arc<Mutex<Option<(String, Arc<Vec<f32>>)>>>,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    with_vector: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default)]
    vector: Option<Value>,
}

impl QdrantIndex {
    pub fn new(config: &IndexConfig, embedder: Arc<dyn Embedder>) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                AppError::Retrieval(format!("Failed to create HTTP client for Qdrant: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            collection: config.collection.clone(),
            text_key: config.text_key.clone(),
            metadata_key: config.metadata_key.clone(),
            embedder,
            last_query: Arc::new(Mutex::new(None)),
        })
    }

    async fn embed_query(&self, query: &str) -> AppResult<Arc<Vec<f32>>> {
        let mut last = self.last_query.lock().await;
        if let Some((cached, vector)) = last.as_ref() {
            if cached == query {
                return Ok(vector.clone());
            }
        }

        let vector = Arc::new(self.embedder.embed(query).await?);
        *last = Some((query.to_string(), vector.clone()));
        Ok(vector)
    }

    async fn search_points(
        &self,
        vector: &[f32],
        limit: usize,
        with_vector: bool,
    ) -> AppResult<Vec<ScoredPoint>> {
        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection
        );
        let request = SearchRequest {
            vector,
            limit,
            with_payload: true,
            with_vector,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to reach Qdrant: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Retrieval(format!(
                "Qdrant search failed ({}): {}",
                status, body
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to parse Qdrant response: {}", e)))?;

        Ok(body.result)
    }

    fn to_hit(&self, point: &ScoredPoint) -> Option<IndexHit> {
        let payload = point.payload.as_ref()?;
        let text = payload.get(&self.text_key)?.as_str()?;
        let url = payload
            .get(&self.metadata_key)
            .and_then(|m| m.get("url"))
            .and_then(Value::as_str);
        Some(IndexHit::new(text, url).with_score(point.score))
    }

    fn to_hits<'a>(&self, points: impl IntoIterator<Item = &'a ScoredPoint>) -> Vec<IndexHit> {
        points
            .into_iter()
            .filter_map(|point| {
                let hit = self.to_hit(point);
                if hit.is_none() {
                    tracing::warn!("Skipping Qdrant point without '{}' payload", self.text_key);
                }
                hit
            })
            .collect()
    }
}

/// Extract a dense vector from a point, accepting unnamed or single named vectors.
fn point_vector(value: &Value) -> Option<Vec<f32>> {
    let array = match value {
        Value::Array(_) => value,
        Value::Object(named) => named.values().next()?,
        _ => return None,
    };

    array
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

#[async_trait::async_trait]
impl SimilarityIndex for QdrantIndex {
    fn name(&self) -> &str {
        "qdrant"
    }

    async fn search(&self, query: &str, strategy: &SearchStrategy) -> AppResult<Vec<IndexHit>> {
        let query_vector = self.embed_query(query).await?;

        match strategy {
            SearchStrategy::Similarity { k } => {
                let points = self.search_points(&query_vector, *k, false).await?;
                Ok(self.to_hits(&points))
            }
            SearchStrategy::Mmr {
                k,
                fetch_k,
                lambda_mult,
            } => {
                let points = self
                    .search_points(&query_vector, (*fetch_k).max(*k), true)
                    .await?;

                let (points, vectors): (Vec<&ScoredPoint>, Vec<Vec<f32>>) = points
                    .iter()
                    .filter_map(|p| Some((p, point_vector(p.vector.as_ref()?)?)))
                    .unzip();

                let picked = mmr_select(&query_vector, &vectors, *k, *lambda_mult);
                tracing::debug!(
                    "MMR picked {} of {} candidates from {}",
                    picked.len(),
                    vectors.len(),
                    self.collection
                );

                Ok(self.to_hits(picked.into_iter().map(|i| points[i])))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct NoEmbedder;

    #[async_trait::async_trait]
    impl Embedder for NoEmbedder {
        fn model_name(&self) -> &str {
            "none"
        }

        async fn embed(&self, _text: &str) -> AppResult<Vec<f32>> {
            Err(AppError::Retrieval("embedder offline".to_string()))
        }
    }

    fn index() -> QdrantIndex {
        QdrantIndex::new(&IndexConfig::default(), Arc::new(NoEmbedder)).unwrap()
    }

    #[derive(Debug, Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }

        async fn embed(&self, _text: &str) -> AppResult<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(vec![1.0, 0.0])
        }
    }

    #[tokio::test]
    async fn test_query_embedded_once_per_query() {
        let embedder = Arc::new(CountingEmbedder::default());
        let index = QdrantIndex::new(&IndexConfig::default(), embedder.clone()).unwrap();

        let (a, b) = tokio::join!(
            index.embed_query("wandering"),
            index.embed_query("wandering")
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

        index.embed_query("sundowning").await.unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_embedding_is_not_cached() {
        let index = index();
        assert!(index.embed_query("wandering").await.is_err());
        assert!(index.last_query.lock().await.is_none());
    }

    #[test]
    fn test_point_to_hit() {
        let response: SearchResponse = serde_json::from_value(json!({
            "result": [
                {
                    "id": 1,
                    "score": 0.82,
                    "payload": {
                        "page_content": "Wandering often begins in the middle stage.",
                        "metadata": { "url": "https://www.alz.org/wandering" }
                    }
                },
                { "id": 2, "score": 0.5, "payload": { "other": "x" } }
            ]
        }))
        .unwrap();

        let hits = index().to_hits(&response.result);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url.as_deref(), Some("https://www.alz.org/wandering"));
        assert_eq!(hits[0].score, Some(0.82));
    }

    #[test]
    fn test_point_without_url() {
        let point: ScoredPoint = serde_json::from_value(json!({
            "score": 0.1,
            "payload": { "page_content": "text", "metadata": {} }
        }))
        .unwrap();
        let hit = index().to_hit(&point).unwrap();
        assert!(hit.url.is_none());
    }

    #[test]
    fn test_point_vector_shapes() {
        assert_eq!(point_vector(&json!([1.0, 0.5])), Some(vec![1.0, 0.5]));
        assert_eq!(point_vector(&json!({"dense": [0.25]})), Some(vec![0.25]));
        assert_eq!(point_vector(&json!("nope")), None);
        assert_eq!(point_vector(&json!([1.0, "x"])), None);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_retrieval_error() {
        let result = index()
            .search("q", &SearchStrategy::Similarity { k: 1 })
            .await;
        assert!(matches!(result, Err(AppError::Retrieval(_))));
    }
}
