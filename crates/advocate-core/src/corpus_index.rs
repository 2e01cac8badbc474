//! Hybrid keyword + vector + entity-graph index over the legal corpus.
//!
//! Held entirely in memory after load; persisted to disk as three files
//! under the configured index directory (`chunks.json`,
//! `fastmap_metadata.json`, `fastmap_vectors.json`). The inverted and
//! faceted indexes are never persisted — they are cheap to rebuild from
//! `chunks.json` on load.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::types::{CorpusChunk, EntityGraph, GraphEdge, GraphNode, IndexStats, ScoredChunk};

const FACETED_FIELDS: [&str; 4] = ["jurisdiction", "clause_type", "tags", "file_id"];

/// A single document-level record tracked alongside its chunks.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocumentMeta {
    pub file_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub jurisdiction: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct IngestReport {
    pub documents_added: usize,
    pub chunks_added: usize,
    pub graph_nodes_added: usize,
    pub graph_edges_added: usize,
    pub warnings: Vec<String>,
}

/// In-memory state of the corpus index. Construct via [`CorpusIndex::load`]
/// or [`CorpusIndex::empty`]; mutate only through the ingest operations.
#[derive(Default)]
pub struct CorpusIndex {
    index_dir: PathBuf,
    documents: HashMap<String, DocumentMeta>,
    chunks: HashMap<String, CorpusChunk>,
    vectors: HashMap<String, Vec<f32>>,
    graph: EntityGraph,
    inverted: HashMap<String, HashSet<String>>,
    faceted: HashMap<&'static str, HashMap<String, HashSet<String>>>,
}

#[derive(Serialize, Deserialize, Default)]
struct MetadataFile {
    documents: HashMap<String, DocumentMeta>,
    graph: EntityGraph,
}

impl CorpusIndex {
    pub fn empty(index_dir: impl Into<PathBuf>) -> Self {
        Self { index_dir: index_dir.into(), ..Default::default() }
    }

    fn chunks_path(&self) -> PathBuf {
        self.index_dir.join("chunks.json")
    }

    fn metadata_path(&self) -> PathBuf {
        self.index_dir.join("fastmap_metadata.json")
    }

    fn vectors_path(&self) -> PathBuf {
        self.index_dir.join("fastmap_vectors.json")
    }

    /// Loads a persisted index, or returns an empty index if no files exist
    /// yet at `index_dir` (a fresh deployment before the first ingest run).
    pub fn load(index_dir: impl AsRef<Path>) -> Result<Self> {
        let mut index = Self::empty(index_dir.as_ref().to_path_buf());

        if index.metadata_path().exists() {
            let raw = std::fs::read_to_string(index.metadata_path())
                .context("reading fastmap_metadata.json")?;
            let meta: MetadataFile =
                serde_json::from_str(&raw).context("parsing fastmap_metadata.json")?;
            index.documents = meta.documents;
            index.graph = meta.graph;
        }

        if index.chunks_path().exists() {
            let raw = std::fs::read_to_string(index.chunks_path()).context("reading chunks.json")?;
            let chunks: HashMap<String, CorpusChunk> =
                serde_json::from_str(&raw).context("parsing chunks.json")?;
            for (chunk_id, chunk) in &chunks {
                index.update_inverted_index(chunk_id, &chunk.text_plain);
                index.index_facets(chunk_id, chunk);
            }
            index.chunks = chunks;
        }

        if index.vectors_path().exists() {
            let raw =
                std::fs::read_to_string(index.vectors_path()).context("reading fastmap_vectors.json")?;
            index.vectors = serde_json::from_str(&raw).context("parsing fastmap_vectors.json")?;
        }

        Ok(index)
    }

    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(&self.index_dir).context("creating index_dir")?;

        let meta = MetadataFile { documents: self.documents.clone(), graph: self.graph.clone() };
        std::fs::write(self.metadata_path(), serde_json::to_vec_pretty(&meta)?)
            .context("writing fastmap_metadata.json")?;

        std::fs::write(self.chunks_path(), serde_json::to_vec(&self.chunks)?)
            .context("writing chunks.json")?;

        std::fs::write(self.vectors_path(), serde_json::to_vec(&self.vectors)?)
            .context("writing fastmap_vectors.json")?;

        Ok(())
    }

    fn update_inverted_index(&mut self, chunk_id: &str, text: &str) {
        for token in tokenize(text) {
            self.inverted.entry(token).or_default().insert(chunk_id.to_string());
        }
    }

    fn index_facets(&mut self, chunk_id: &str, chunk: &CorpusChunk) {
        for field in FACETED_FIELDS {
            let values: Vec<String> = match field {
                "jurisdiction" => chunk.jurisdiction.clone().into_iter().collect(),
                "clause_type" => chunk.clause_types.clone(),
                "tags" => chunk.tags.clone(),
                "file_id" => vec![chunk.file_id.clone()],
                _ => continue,
            };
            for value in values {
                self.faceted
                    .entry(field)
                    .or_default()
                    .entry(value)
                    .or_default()
                    .insert(chunk_id.to_string());
            }
        }
    }

    // ── Ingest operations ────────────────────────────────────────────────

    pub fn add_document(&mut self, doc: DocumentMeta) {
        self.documents.insert(doc.file_id.clone(), doc);
    }

    pub fn add_chunk(&mut self, chunk: CorpusChunk, vector: Option<Vec<f32>>) {
        self.update_inverted_index(&chunk.chunk_id, &chunk.text_plain);
        self.index_facets(&chunk.chunk_id, &chunk);
        if let Some(v) = vector {
            self.vectors.insert(chunk.chunk_id.clone(), v);
        }
        self.chunks.insert(chunk.chunk_id.clone(), chunk);
    }

    pub fn add_graph_node(&mut self, node: GraphNode) {
        self.graph.nodes.push(node);
    }

    pub fn add_graph_edge(&mut self, edge: GraphEdge) {
        self.graph.edges.push(edge);
    }

    pub fn get_chunk(&self, chunk_id: &str) -> Option<&CorpusChunk> {
        self.chunks.get(chunk_id)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            chunk_count: self.chunks.len(),
            document_count: self.documents.len(),
            graph_node_count: self.graph.nodes.len(),
        }
    }

    /// Hybrid keyword + vector + facet search.
    ///
    /// Candidate set = facet-filtered chunks, further restricted to chunks
    /// matching at least one query token when the query is non-empty.
    /// Score = cosine similarity to `vector` boosted 1.2x on keyword match;
    /// with no `vector`, chunks are ranked by keyword match alone (flat
    /// score of 1.0). Ties broken by `chunk_id` ascending.
    pub fn search(
        &self,
        query: &str,
        filters: &HashMap<String, String>,
        k: usize,
        vector: Option<&[f32]>,
    ) -> Vec<ScoredChunk> {
        let mut candidates: HashSet<String> = self.chunks.keys().cloned().collect();

        for (field, value) in filters {
            if let Some(by_value) = self.faceted.get(field.as_str()) {
                let matching = by_value.get(value).cloned().unwrap_or_default();
                candidates = candidates.intersection(&matching).cloned().collect();
            } else {
                candidates.clear();
            }
        }

        let query_tokens: Vec<String> = tokenize(query);
        let keyword_matches: HashSet<String> = query_tokens
            .iter()
            .filter_map(|t| self.inverted.get(t))
            .flatten()
            .cloned()
            .collect();

        if !query_tokens.is_empty() {
            candidates = candidates.intersection(&keyword_matches).cloned().collect();
        }

        let mut scored: Vec<(String, f64)> = match vector {
            Some(q_vec) => candidates
                .into_iter()
                .filter_map(|cid| {
                    let doc_vec = self.vectors.get(&cid)?;
                    let mut score = cosine_similarity(q_vec, doc_vec);
                    if keyword_matches.contains(&cid) {
                        score *= 1.2;
                    }
                    Some((cid, score))
                })
                .collect(),
            None => candidates
                .into_iter()
                .filter(|cid| keyword_matches.contains(cid))
                .map(|cid| (cid, 1.0))
                .collect(),
        };

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);

        scored
            .into_iter()
            .filter_map(|(cid, score)| {
                self.chunks.get(&cid).map(|chunk| ScoredChunk { chunk: chunk.clone(), score })
            })
            .collect()
    }

    /// Chunks most similar to `chunk_id` by cosine similarity over the
    /// vector store alone (no keyword/facet filtering).
    pub fn similar(&self, chunk_id: &str, k: usize) -> Vec<ScoredChunk> {
        let Some(q_vec) = self.vectors.get(chunk_id) else { return Vec::new() };

        let mut scored: Vec<(String, f64)> = self
            .vectors
            .iter()
            .filter(|(cid, _)| cid.as_str() != chunk_id)
            .map(|(cid, v)| (cid.clone(), cosine_similarity(q_vec, v)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(k);

        scored
            .into_iter()
            .filter_map(|(cid, score)| {
                self.chunks.get(&cid).map(|chunk| ScoredChunk { chunk: chunk.clone(), score })
            })
            .collect()
    }

    /// Breadth-first traversal of the entity graph from `node_id` up to
    /// `depth` hops, returning the reachable node ids (excluding the start).
    pub fn graph_query(&self, node_id: &str, depth: usize) -> Vec<String> {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.graph.edges {
            adjacency.entry(edge.source.as_str()).or_default().push(edge.target.as_str());
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = vec![node_id.to_string()];
        visited.insert(node_id.to_string());

        for _ in 0..depth {
            let mut next = Vec::new();
            for node in &frontier {
                if let Some(neighbors) = adjacency.get(node.as_str()) {
                    for n in neighbors {
                        if visited.insert((*n).to_string()) {
                            next.push((*n).to_string());
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        visited.remove(node_id);
        visited.into_iter().collect()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase().split_whitespace().map(str::to_string).collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Ingests a batch of documents/chunks, returning a status report.
///
/// Offline/bulk operation: the caller constructs [`CorpusChunk`] records
/// ahead of time (including precomputed embeddings); this function only
/// validates and wires them into the index structures.
pub fn ingest(
    index: &mut CorpusIndex,
    documents: Vec<DocumentMeta>,
    chunks: Vec<(CorpusChunk, Option<Vec<f32>>)>,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
) -> IngestReport {
    let mut report = IngestReport::default();

    for doc in documents {
        if doc.file_id.is_empty() {
            report.warnings.push("skipped document with empty file_id".into());
            continue;
        }
        index.add_document(doc);
        report.documents_added += 1;
    }

    for (chunk, vector) in chunks {
        if chunk.chunk_id.is_empty() {
            report.warnings.push("skipped chunk with empty chunk_id".into());
            continue;
        }
        index.add_chunk(chunk, vector);
        report.chunks_added += 1;
    }

    for node in nodes {
        index.add_graph_node(node);
        report.graph_nodes_added += 1;
    }

    for edge in edges {
        index.add_graph_edge(edge);
        report.graph_edges_added += 1;
    }

    report
}
