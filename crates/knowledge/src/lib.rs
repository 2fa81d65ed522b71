//! Evidence retrieval for Care Companion.
//!
//! Queries a pre-populated similarity index with complementary strategies
//! (MMR and plain similarity), fuses the ranked lists into a bounded,
//! de-duplicated evidence set and renders it for prompts and citations.
//!
//! # Example
//! ```no_run
//! use care_knowledge::{EvidenceRetriever, QdrantIndex, OllamaEmbedder, default_strategies};
//! use care_core::config::IndexConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IndexConfig::default();
//! let embedder = Arc::new(OllamaEmbedder::new(&config.embedding_endpoint, &config.embedding_model)?);
//! let index = Arc::new(QdrantIndex::new(&config, embedder)?);
//! let retriever = EvidenceRetriever::new(index, default_strategies(&config), 4);
//! let evidence = retriever.retrieve("What stage of Alzheimer's causes wandering?", "").await?;
//! println!("{} passages", evidence.len());
//! # Ok(())
//! # }
//! ```

pub mod embedder;
pub mod fusion;
pub mod index;
pub mod mmr;
pub mod qdrant;
pub mod retriever;
pub mod sources;
pub mod types;

// Re-export commonly used types
pub use embedder::{Embedder, OllamaEmbedder};
pub use fusion::fuse;
pub use index::{SimilarityIndex, StaticIndex};
pub use qdrant::QdrantIndex;
pub use retriever::{default_strategies, EvidenceRetriever};
pub use sources::{format_evidence, sources_annotation};
pub use types::{EvidenceItem, EvidenceSet, IndexHit, SearchStrategy, StrategyKind};
