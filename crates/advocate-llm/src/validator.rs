//! Phase B of validation: an LLM-assisted pass layered on top of the
//! deterministic rule checks, enabled only under `VALIDATION_MODE=rule_plus_llm`.
//! A failed or malformed LLM call degrades to a single warning issue and
//! the rule-based verdict still stands — this phase can only add caution,
//! never remove a rule-based failure.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Semaphore;

use advocate_core::agent::Validator;
use advocate_core::types::{IssueKind, Reasoning, RetrievalResult, Severity, ValidationIssue, ValidationVerdict};
use advocate_core::validator::{rule_based_issues, verdict_from_issues};

use crate::llm_client::LlmClient;

/// Upper bound on concurrent Phase B calls across all in-flight requests.
/// A fresh validator is built per request, so the permit pool itself must
/// be shared from outside rather than held per-instance.
pub const DEFAULT_MAX_CONCURRENT_CALLS: usize = 4;

const SYSTEM_PROMPT: &str = r#"You are a validation engine for legal AI outputs.

Your job is to detect errors, hallucinations, and unsafe outputs.

Output your validation as JSON:
{
    "issues": [
        {
            "severity": "critical" | "warning" | "info",
            "type": "hallucination" | "missing_citation" | "inconsistency" | "other",
            "description": "Clear description of the issue",
            "location": "Where in the analysis this occurs"
        }
    ]
}

CRITICAL: Any "critical" severity issue MUST result in overall failure."#;

pub struct LlmAssistedValidator {
    client: LlmClient,
    model: String,
    temperature: f64,
    call_slots: Arc<Semaphore>,
}

impl LlmAssistedValidator {
    /// `call_slots` bounds the number of Phase B calls in flight at once
    /// across all requests sharing it; pass the same `Arc` to every
    /// validator built for a process to make the bound process-wide.
    pub fn new(client: LlmClient, model: impl Into<String>, temperature: f64, call_slots: Arc<Semaphore>) -> Self {
        Self { client, model: model.into(), temperature, call_slots }
    }
}

#[derive(Deserialize)]
struct RawIssue {
    #[serde(default)]
    severity: String,
    #[serde(default)]
    r#type: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Deserialize)]
struct RawValidation {
    #[serde(default)]
    issues: Vec<RawIssue>,
}

fn severity_from_str(s: &str) -> Severity {
    match s {
        "critical" => Severity::Critical,
        "info" => Severity::Info,
        _ => Severity::Warning,
    }
}

fn kind_from_str(s: &str) -> IssueKind {
    match s {
        "hallucination" => IssueKind::Hallucination,
        "missing_citation" => IssueKind::MissingCitation,
        "inconsistency" => IssueKind::Inconsistency,
        _ => IssueKind::ValidatorError,
    }
}

fn llm_issues_from_response(content: &str) -> Vec<ValidationIssue> {
    let stripped = content.trim().trim_start_matches("```json").trim_start_matches("```").trim_end_matches("```").trim();
    match serde_json::from_str::<RawValidation>(stripped) {
        Ok(raw) => raw
            .issues
            .into_iter()
            .map(|i| ValidationIssue {
                severity: severity_from_str(&i.severity),
                kind: kind_from_str(&i.r#type),
                description: i.description,
                location: i.location,
            })
            .collect(),
        Err(_) => vec![ValidationIssue {
            severity: Severity::Warning,
            kind: IssueKind::ValidatorError,
            description: "LLM validation response could not be parsed.".into(),
            location: Some("validation".into()),
        }],
    }
}

#[async_trait]
impl Validator for LlmAssistedValidator {
    async fn validate(&self, retrieval: &RetrievalResult, reasoning: &Reasoning) -> ValidationVerdict {
        let mut issues = rule_based_issues(retrieval, reasoning);

        let sources_text = if retrieval.sources.is_empty() {
            "No sources".to_string()
        } else {
            retrieval.sources.iter().map(|s| format!("- {}, Section {}", s.law_name, s.section)).collect::<Vec<_>>().join("\n")
        };

        let user_prompt = format!(
            "Legal Sources:\n{}\n\nReasoning Analysis:\n{}\n\nStated Limitations:\n{}\n\nCitations Used:\n{}\n\nValidate this output.",
            sources_text,
            reasoning.analysis,
            reasoning.limitations,
            reasoning.citations_used.join(", ")
        );

        let llm_issues = match self.call_slots.clone().try_acquire_owned() {
            Ok(_permit) => {
                let outcome = self.client.chat(&self.model, SYSTEM_PROMPT, &user_prompt, self.temperature).await;
                if outcome.success {
                    llm_issues_from_response(&outcome.content)
                } else {
                    vec![ValidationIssue {
                        severity: Severity::Warning,
                        kind: IssueKind::ValidatorError,
                        description: format!("LLM validation failed: {}", outcome.content),
                        location: Some("validation".into()),
                    }]
                }
            }
            Err(_) => vec![ValidationIssue {
                severity: Severity::Warning,
                kind: IssueKind::ValidatorError,
                description: "LLM validator at capacity; skipped Phase B for this request.".into(),
                location: Some("validation".into()),
            }],
        };

        issues.extend(llm_issues);
        verdict_from_issues(issues, 0.5, 0.9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_llm_issues() {
        let raw = r#"{"issues": [{"severity": "critical", "type": "hallucination", "description": "x", "location": "analysis"}]}"#;
        let issues = llm_issues_from_response(raw);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Critical);
        assert_eq!(issues[0].kind, IssueKind::Hallucination);
    }

    #[test]
    fn malformed_response_degrades_to_single_warning() {
        let issues = llm_issues_from_response("not json at all");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(issues[0].kind, IssueKind::ValidatorError);
    }

    #[tokio::test]
    async fn exhausted_call_slots_degrade_to_warning_without_calling_llm() {
        use advocate_core::types::{LegalSource, Reasoning, RetrievalResult, RetrievalStatus};

        let slots = Arc::new(Semaphore::new(1));
        let _held = slots.clone().try_acquire_owned().unwrap();

        let validator = LlmAssistedValidator::new(LlmClient::new("http://127.0.0.1:0", ""), "validator-model", 0.0, slots);

        let retrieval = RetrievalResult {
            sources: vec![LegalSource {
                law_name: "Penal Code".into(),
                section: "296".into(),
                text: "...".into(),
                metadata: serde_json::Value::Null,
            }],
            issued_query: "q".into(),
            retrieval_timestamp: chrono::Utc::now(),
            status: RetrievalStatus::Success,
        };
        let reasoning = Reasoning {
            analysis: "x".repeat(60),
            limitations: "y".repeat(30),
            citations_used: vec!["Penal Code - Section 296".into()],
            confidence: 0.9,
            chain: None,
        };

        let verdict = validator.validate(&retrieval, &reasoning).await;
        assert!(verdict.issues.iter().any(|i| i.kind == IssueKind::ValidatorError && i.severity == Severity::Warning));
    }
}
