use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── User-facing input ───────────────────────────────────────────────────

/// The initial question submitted to the pipeline. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuery {
    pub question: String,
    pub case_context: Option<String>,
}

impl UserQuery {
    /// Minimum accepted question length (inclusive).
    pub const MIN_QUESTION_LEN: usize = 10;

    pub fn new(question: impl Into<String>, case_context: Option<String>) -> Self {
        Self { question: question.into(), case_context }
    }
}

// ── Planner ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Retrieve,
    Reason,
    Validate,
    Synthesize,
}

/// The deterministic planner's execution plan. Control flow only, never
/// legal reasoning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
    pub processed_query: String,
    pub confidence: f64,
}

impl Plan {
    pub fn fixed_steps() -> Vec<Step> {
        vec![Step::Retrieve, Step::Reason, Step::Validate, Step::Synthesize]
    }
}

// ── Retrieval ────────────────────────────────────────────────────────────

/// A verbatim passage retrieved from the corpus. Two sources are equal iff
/// `(law_name, section)` match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalSource {
    pub law_name: String,
    pub section: String,
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl LegalSource {
    /// The identifier form used for citation matching: `"{law_name} - Section {section}"`.
    pub fn identifier(&self) -> String {
        format!("{} - Section {}", self.law_name, self.section)
    }
}

impl PartialEq for LegalSource {
    fn eq(&self, other: &Self) -> bool {
        self.law_name == other.law_name && self.section == other.section
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStatus {
    Success,
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub sources: Vec<LegalSource>,
    pub issued_query: String,
    pub retrieval_timestamp: DateTime<Utc>,
    pub status: RetrievalStatus,
}

impl RetrievalResult {
    pub fn empty(issued_query: impl Into<String>) -> Self {
        Self {
            sources: Vec::new(),
            issued_query: issued_query.into(),
            retrieval_timestamp: Utc::now(),
            status: RetrievalStatus::Empty,
        }
    }
}

// ── Reasoning ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reasoning {
    pub analysis: String,
    pub limitations: String,
    pub citations_used: Vec<String>,
    pub confidence: f64,
    /// Internal reasoning summary. Never serialized to the user-facing API.
    #[serde(skip_serializing, default)]
    pub chain: Option<String>,
}

impl Reasoning {
    /// Minimum character length for `analysis` to count as substantive.
    pub const MIN_ANALYSIS_LEN: usize = 50;
    /// Minimum character length for `limitations` to count as adequately stated.
    pub const MIN_LIMITATIONS_LEN: usize = 20;

    pub fn unparseable() -> Self {
        Self {
            analysis: String::new(),
            limitations: "unparseable".into(),
            citations_used: Vec::new(),
            confidence: 0.1,
            chain: None,
        }
    }
}

// ── Validation ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingSources,
    MissingCitation,
    Hallucination,
    InsufficientAnalysis,
    MissingLimitations,
    Inconsistency,
    ValidatorError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub kind: IssueKind,
    pub description: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub status: VerdictStatus,
    pub issues: Vec<ValidationIssue>,
    pub confidence: f64,
    pub all_citations_verified: bool,
    pub no_hallucination_detected: bool,
}

impl ValidationVerdict {
    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }
}

// ── Output ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synthesized {
    pub response: String,
    pub citations: Vec<LegalSource>,
    pub confidence_note: String,
    pub disclaimer: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refusal {
    pub reason: String,
    pub issues: Vec<ValidationIssue>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Output {
    Success(Synthesized),
    Refused(Refusal),
}

// ── Audit ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub agent_name: String,
    pub input_snapshot: serde_json::Value,
    pub output_snapshot: serde_json::Value,
    pub duration_ms: f64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

// ── Case memory ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseMessage {
    pub id: i64,
    pub incident_id: String,
    pub user_id: String,
    pub role: CaseRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

// ── Corpus index ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusChunk {
    pub chunk_id: String,
    pub file_id: String,
    pub section_id: String,
    pub heading: String,
    pub text_plain: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub clause_types: Vec<String>,
    pub law_name: String,
    pub section: String,
    #[serde(default)]
    pub jurisdiction: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphNodeType {
    Annotation,
    Entity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub node_type: GraphNodeType,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EntityGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// A scored chunk returned from a corpus search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: CorpusChunk,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub chunk_count: usize,
    pub document_count: usize,
    pub graph_node_count: usize,
}
