//! Orchestrates the fixed five-step pipeline: Plan → Retrieve → Reason →
//! Validate → Synthesize/Refuse. Every step is audited; a failed step
//! degrades to a typed value rather than aborting the run.

use std::sync::Arc;
use std::time::Instant;

use tokio::time::{timeout, Duration};
use tracing::{info_span, warn, Instrument};

use crate::agent::{Formatter, Planner, Reasoner, Retriever, Validator};
use crate::audit::AuditLogger;
use crate::types::{Output, Plan, Reasoning, RetrievalResult, UserQuery, ValidationVerdict, VerdictStatus};

pub struct Pipeline {
    pub planner: Arc<dyn Planner>,
    pub retriever: Arc<dyn Retriever>,
    pub reasoner: Arc<dyn Reasoner>,
    pub validator: Arc<dyn Validator>,
    pub formatter: Arc<dyn Formatter>,
    pub audit: Arc<AuditLogger>,
    pub retrieval_max_sources: usize,
    pub request_deadline: Duration,
}

impl Pipeline {
    pub fn new(
        planner: Arc<dyn Planner>,
        retriever: Arc<dyn Retriever>,
        reasoner: Arc<dyn Reasoner>,
        validator: Arc<dyn Validator>,
        formatter: Arc<dyn Formatter>,
        audit: Arc<AuditLogger>,
        retrieval_max_sources: usize,
        request_deadline: Duration,
    ) -> Self {
        Self { planner, retriever, reasoner, validator, formatter, audit, retrieval_max_sources, request_deadline }
    }

    pub async fn execute(&self, query: UserQuery) -> Output {
        match timeout(self.request_deadline, self.execute_inner(query)).await {
            Ok(output) => output,
            Err(_) => {
                warn!(session_id = %self.audit.session_id(), "pipeline deadline exceeded");
                Output::Refused(crate::types::Refusal {
                    reason: "deadline_exceeded".into(),
                    issues: vec![],
                    suggestions: vec!["Retry with a narrower question.".into()],
                })
            }
        }
    }

    async fn execute_inner(&self, query: UserQuery) -> Output {
        let plan = self.run_plan(&query);
        let retrieval = self.run_retrieve(&plan).instrument(info_span!("retrieve")).await;
        let reasoning = self.run_reason(&retrieval).instrument(info_span!("reason")).await;
        let verdict = self.run_validate(&retrieval, &reasoning).instrument(info_span!("validate")).await;

        self.run_synthesize_or_refuse(&retrieval, &reasoning, &verdict)
    }

    fn run_plan(&self, query: &UserQuery) -> Plan {
        let start = Instant::now();
        let plan = self.planner.plan(query);
        self.audit.log_step(
            "planner",
            serde_json::json!({"question": query.question, "case_context": query.case_context}),
            serde_json::to_value(&plan).unwrap_or_default(),
            start.elapsed().as_secs_f64() * 1000.0,
            serde_json::Value::Null,
        );
        plan
    }

    async fn run_retrieve(&self, plan: &Plan) -> RetrievalResult {
        let start = Instant::now();
        let retrieval = self.retriever.query_sources(&plan.processed_query, self.retrieval_max_sources).await;
        self.audit.log_step(
            "retriever",
            serde_json::json!({"processed_query": plan.processed_query, "max_sources": self.retrieval_max_sources}),
            serde_json::to_value(&retrieval).unwrap_or_default(),
            start.elapsed().as_secs_f64() * 1000.0,
            serde_json::Value::Null,
        );
        retrieval
    }

    async fn run_reason(&self, retrieval: &RetrievalResult) -> Reasoning {
        let start = Instant::now();
        let reasoning = self.reasoner.reason(retrieval).await;
        self.audit.log_step(
            "reasoner",
            serde_json::to_value(retrieval).unwrap_or_default(),
            serde_json::to_value(&reasoning).unwrap_or_default(),
            start.elapsed().as_secs_f64() * 1000.0,
            serde_json::Value::Null,
        );
        reasoning
    }

    async fn run_validate(&self, retrieval: &RetrievalResult, reasoning: &Reasoning) -> ValidationVerdict {
        let start = Instant::now();
        let verdict = self.validator.validate(retrieval, reasoning).await;
        self.audit.log_step(
            "validator",
            serde_json::json!({"retrieval": retrieval, "reasoning": reasoning}),
            serde_json::to_value(&verdict).unwrap_or_default(),
            start.elapsed().as_secs_f64() * 1000.0,
            serde_json::Value::Null,
        );
        verdict
    }

    fn run_synthesize_or_refuse(
        &self,
        retrieval: &RetrievalResult,
        reasoning: &Reasoning,
        verdict: &ValidationVerdict,
    ) -> Output {
        let start = Instant::now();

        let output = if verdict.status == VerdictStatus::Fail {
            Output::Refused(self.formatter.refuse(verdict))
        } else {
            Output::Success(self.formatter.synthesize(retrieval, reasoning, verdict))
        };

        self.audit.log_step(
            "formatter",
            serde_json::to_value(verdict).unwrap_or_default(),
            serde_json::to_value(&output).unwrap_or_default(),
            start.elapsed().as_secs_f64() * 1000.0,
            serde_json::Value::Null,
        );

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LegalSource, RetrievalStatus, Severity, Step};
    use async_trait::async_trait;

    struct FixedPlanner;
    impl Planner for FixedPlanner {
        fn plan(&self, query: &UserQuery) -> Plan {
            Plan { steps: Plan::fixed_steps(), processed_query: query.question.clone(), confidence: 1.0 }
        }
    }

    struct FixedRetriever {
        sources: Vec<LegalSource>,
    }
    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn query_sources(&self, q: &str, _max_sources: usize) -> RetrievalResult {
            if self.sources.is_empty() {
                RetrievalResult::empty(q)
            } else {
                RetrievalResult {
                    sources: self.sources.clone(),
                    issued_query: q.to_string(),
                    retrieval_timestamp: chrono::Utc::now(),
                    status: RetrievalStatus::Success,
                }
            }
        }

        fn healthy(&self) -> bool {
            !self.sources.is_empty()
        }
    }

    struct FixedReasoner;
    #[async_trait]
    impl Reasoner for FixedReasoner {
        async fn reason(&self, retrieval: &RetrievalResult) -> Reasoning {
            if retrieval.sources.is_empty() {
                return Reasoning::unparseable();
            }
            Reasoning {
                analysis: "x".repeat(60),
                limitations: "y".repeat(30),
                citations_used: vec![retrieval.sources[0].identifier()],
                confidence: 0.9,
                chain: None,
            }
        }
    }

    fn source() -> LegalSource {
        LegalSource { law_name: "Penal Code".into(), section: "296".into(), text: "...".into(), metadata: serde_json::Value::Null }
    }

    fn build_pipeline(sources: Vec<LegalSource>) -> Pipeline {
        use crate::validator::RuleBasedValidator;
        use crate::formatter::DefaultFormatter;

        let dir = tempfile::tempdir().unwrap();
        Pipeline::new(
            Arc::new(FixedPlanner),
            Arc::new(FixedRetriever { sources }),
            Arc::new(FixedReasoner),
            Arc::new(RuleBasedValidator),
            Arc::new(DefaultFormatter),
            Arc::new(AuditLogger::new(dir.path())),
            5,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn end_to_end_success_path() {
        let pipeline = build_pipeline(vec![source()]);
        let output = pipeline.execute(UserQuery::new("What is the penalty for murder?", None)).await;

        match output {
            Output::Success(s) => assert!(!s.citations.is_empty()),
            Output::Refused(_) => panic!("expected success"),
        }
        assert_eq!(pipeline.audit.session_logs().len(), 5);
    }

    #[tokio::test]
    async fn empty_retrieval_leads_to_refusal() {
        let pipeline = build_pipeline(vec![]);
        let output = pipeline.execute(UserQuery::new("What is the penalty for murder?", None)).await;

        match output {
            Output::Refused(r) => assert!(r.issues.iter().any(|i| i.severity == Severity::Critical)),
            Output::Success(_) => panic!("expected refusal"),
        }
    }

    #[test]
    fn fixed_steps_are_in_order() {
        assert_eq!(Plan::fixed_steps(), vec![Step::Retrieve, Step::Reason, Step::Validate, Step::Synthesize]);
    }

    /// Exercises the pipeline against a real, in-memory `CorpusIndex` via
    /// `CorpusRetriever` rather than a fixed-source test double, so the
    /// hybrid search path and the empty-result path are both driven
    /// through their production implementation. Only the LLM-backed
    /// reasoner is stubbed, since no network call can run in a test.
    #[tokio::test]
    async fn end_to_end_against_real_corpus_index() {
        use crate::corpus_index::CorpusIndex;
        use crate::formatter::DefaultFormatter;
        use crate::retriever::CorpusRetriever;
        use crate::types::CorpusChunk;
        use crate::validator::RuleBasedValidator;
        use parking_lot::RwLock as PLRwLock;

        let mut idx = CorpusIndex::empty("/tmp/unused-index");
        idx.add_chunk(
            CorpusChunk {
                chunk_id: "c1".into(),
                file_id: "penal_code".into(),
                section_id: "296".into(),
                heading: "Section 296".into(),
                text_plain: "Whoever commits murder shall be punished with death.".into(),
                tags: vec![],
                clause_types: vec![],
                law_name: "Penal Code".into(),
                section: "296".into(),
                jurisdiction: Some("LK".into()),
                metadata: serde_json::Value::Null,
            },
            None,
        );
        let index = Arc::new(PLRwLock::new(idx));
        let retriever = Arc::new(CorpusRetriever::new(index));

        let dir = tempfile::tempdir().unwrap();
        let matching_pipeline = Pipeline::new(
            Arc::new(FixedPlanner),
            retriever.clone(),
            Arc::new(FixedReasoner),
            Arc::new(RuleBasedValidator),
            Arc::new(DefaultFormatter),
            Arc::new(AuditLogger::new(dir.path())),
            5,
            Duration::from_secs(5),
        );

        match matching_pipeline.execute(UserQuery::new("What is the penalty for murder?", None)).await {
            Output::Success(s) => assert!(s.response.contains("[1]") || !s.citations.is_empty()),
            Output::Refused(r) => panic!("expected a grounded answer, got refusal: {}", r.reason),
        }

        let unrelated_pipeline = Pipeline::new(
            Arc::new(FixedPlanner),
            retriever,
            Arc::new(FixedReasoner),
            Arc::new(RuleBasedValidator),
            Arc::new(DefaultFormatter),
            Arc::new(AuditLogger::new(dir.path())),
            5,
            Duration::from_secs(5),
        );

        match unrelated_pipeline.execute(UserQuery::new("What is the registration fee for a company?", None)).await {
            Output::Refused(r) => assert!(r.issues.iter().any(|i| i.severity == Severity::Critical)),
            Output::Success(_) => panic!("expected a refusal for a question the corpus has no coverage for"),
        }
    }
}
