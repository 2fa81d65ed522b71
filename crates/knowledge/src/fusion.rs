//! Fusion of ranked hit lists into one evidence set.

use crate::types::{EvidenceItem, EvidenceSet, IndexHit, StrategyKind};

/// Merge per-strategy hit lists into a bounded, de-duplicated evidence set.
///
/// Lists are visited in the given (declared) order and each list keeps its
/// internal rank order. A hit whose URL is already present is dropped.
/// Hits without a URL are always kept. Fusion stops once `max_context`
/// items are held.
pub fn fuse(lists: Vec<(StrategyKind, Vec<IndexHit>)>, max_context: usize) -> EvidenceSet {
    let mut set = EvidenceSet::with_capacity(max_context);

    'lists: for (strategy, hits) in lists {
        for (rank, hit) in hits.into_iter().enumerate() {
            if set.is_full() {
                break 'lists;
            }

            let kept = set.insert(EvidenceItem {
                text: hit.text,
                source_url: hit.url,
                strategy,
                rank,
                score: hit.score,
            });

            if !kept {
                tracing::debug!("Dropped duplicate {} hit at rank {}", strategy.as_str(), rank);
            }
        }
    }

    set
}
