//! Retrieval gateway: the only path from the pipeline to legal text.
//!
//! Holds the corpus index in-process behind a read-write lock so a reload
//! (re-ingest) can hot-swap the index without restarting the server. No
//! mock fallback of any kind — an empty result is reported as empty, never
//! backfilled with placeholder sources.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::agent::Retriever;
use crate::config::clamp_max_sources;
use crate::corpus_index::CorpusIndex;
use crate::types::{LegalSource, RetrievalResult, RetrievalStatus};

/// Number of recent calls tracked for the rolling failure rate.
const FAILURE_WINDOW: usize = 50;

/// `healthy()` fails once the recent empty-result rate reaches this.
const FAILURE_RATE_THRESHOLD: f64 = 0.9;

pub struct CorpusRetriever {
    index: Arc<RwLock<CorpusIndex>>,
    recent_outcomes: parking_lot::Mutex<VecDeque<bool>>,
}

impl CorpusRetriever {
    pub fn new(index: Arc<RwLock<CorpusIndex>>) -> Self {
        Self { index, recent_outcomes: parking_lot::Mutex::new(VecDeque::with_capacity(FAILURE_WINDOW)) }
    }

    fn record_outcome(&self, found_sources: bool) {
        let mut outcomes = self.recent_outcomes.lock();
        if outcomes.len() == FAILURE_WINDOW {
            outcomes.pop_front();
        }
        outcomes.push_back(found_sources);
    }

    /// Fraction of recent calls that returned zero sources.
    pub fn empty_rate(&self) -> f64 {
        let outcomes = self.recent_outcomes.lock();
        if outcomes.is_empty() {
            return 0.0;
        }
        let empties = outcomes.iter().filter(|found| !**found).count();
        empties as f64 / outcomes.len() as f64
    }
}

#[async_trait]
impl Retriever for CorpusRetriever {
    async fn query_sources(&self, processed_query: &str, max_sources: usize) -> RetrievalResult {
        let k = clamp_max_sources(max_sources);
        let filters: HashMap<String, String> = HashMap::new();

        let scored = {
            let index = self.index.read();
            index.search(processed_query, &filters, k, None)
        };

        self.record_outcome(!scored.is_empty());

        let sources: Vec<LegalSource> = scored
            .into_iter()
            .map(|sc| LegalSource {
                law_name: sc.chunk.law_name,
                section: sc.chunk.section,
                text: sc.chunk.text_plain,
                metadata: sc.chunk.metadata,
            })
            .collect();

        if sources.is_empty() {
            RetrievalResult::empty(processed_query)
        } else {
            RetrievalResult {
                sources,
                issued_query: processed_query.to_string(),
                retrieval_timestamp: chrono::Utc::now(),
                status: RetrievalStatus::Success,
            }
        }
    }

    fn healthy(&self) -> bool {
        self.index.read().stats().chunk_count > 0 && self.empty_rate() < FAILURE_RATE_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CorpusChunk;

    fn chunk(id: &str, law: &str, section: &str, text: &str) -> CorpusChunk {
        CorpusChunk {
            chunk_id: id.into(),
            file_id: "penal_code".into(),
            section_id: section.into(),
            heading: format!("Section {section}"),
            text_plain: text.into(),
            tags: vec![],
            clause_types: vec![],
            law_name: law.into(),
            section: section.into(),
            jurisdiction: Some("LK".into()),
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn returns_empty_status_when_nothing_matches() {
        let index = Arc::new(RwLock::new(CorpusIndex::empty("/tmp/unused-index")));
        let retriever = CorpusRetriever::new(index);

        let result = retriever.query_sources("nonexistent legal term", 5).await;
        assert_eq!(result.status, RetrievalStatus::Empty);
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn returns_matching_sources() {
        let mut idx = CorpusIndex::empty("/tmp/unused-index");
        idx.add_chunk(chunk("c1", "Penal Code", "296", "Whoever commits murder shall be punished."), None);
        let index = Arc::new(RwLock::new(idx));
        let retriever = CorpusRetriever::new(index);

        let result = retriever.query_sources("murder", 5).await;
        assert_eq!(result.status, RetrievalStatus::Success);
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].identifier(), "Penal Code - Section 296");
    }

    #[tokio::test]
    async fn empty_rate_tracks_recent_outcomes() {
        let mut idx = CorpusIndex::empty("/tmp/unused-index");
        idx.add_chunk(chunk("c1", "Penal Code", "296", "murder text"), None);
        let index = Arc::new(RwLock::new(idx));
        let retriever = CorpusRetriever::new(index);

        retriever.query_sources("murder", 5).await;
        retriever.query_sources("nothing matches here", 5).await;

        assert_eq!(retriever.empty_rate(), 0.5);
    }

    #[test]
    fn unhealthy_with_no_indexed_chunks() {
        let index = Arc::new(RwLock::new(CorpusIndex::empty("/tmp/unused-index")));
        let retriever = CorpusRetriever::new(index);
        assert!(!retriever.healthy());
    }

    #[tokio::test]
    async fn unhealthy_once_failure_rate_crosses_threshold() {
        let mut idx = CorpusIndex::empty("/tmp/unused-index");
        idx.add_chunk(chunk("c1", "Penal Code", "296", "murder text"), None);
        let index = Arc::new(RwLock::new(idx));
        let retriever = CorpusRetriever::new(index);

        assert!(retriever.healthy());
        for _ in 0..FAILURE_WINDOW {
            retriever.query_sources("nothing matches here", 5).await;
        }
        assert!(!retriever.healthy());
    }
}
