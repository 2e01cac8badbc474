//! Capability traits for the five pipeline steps.
//!
//! Each step is modeled as a small trait returning its own typed output —
//! never a `Result`, since every failure mode at this layer degrades to a
//! synthetic value (empty retrieval, unparseable reasoning, a validator
//! warning) rather than propagating. Only the orchestrator decides what a
//! degraded step means for the overall run.

use async_trait::async_trait;

use crate::types::{
    Plan, Reasoning, Refusal, RetrievalResult, Synthesized, UserQuery, ValidationVerdict,
};

/// Determines control flow only. Never performs legal reasoning.
pub trait Planner: Send + Sync {
    fn plan(&self, query: &UserQuery) -> Plan;
}

/// The only path from the pipeline to legal text. Never summarizes.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn query_sources(&self, processed_query: &str, max_sources: usize) -> RetrievalResult;

    /// Liveness check: the corpus must hold at least one indexed chunk and
    /// the recent failure rate must stay under threshold.
    fn healthy(&self) -> bool;
}

/// Produces a grounded analysis constrained to the supplied sources.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason(&self, retrieval: &RetrievalResult) -> Reasoning;
}

/// Gatekeeper: detects hallucinations and enforces citation integrity.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, retrieval: &RetrievalResult, reasoning: &Reasoning) -> ValidationVerdict;
}

/// Shapes the terminal, user-visible output. Does no reasoning of its own.
pub trait Formatter: Send + Sync {
    fn synthesize(
        &self,
        retrieval: &RetrievalResult,
        reasoning: &Reasoning,
        verdict: &ValidationVerdict,
    ) -> Synthesized;

    fn refuse(&self, verdict: &ValidationVerdict) -> Refusal;
}
