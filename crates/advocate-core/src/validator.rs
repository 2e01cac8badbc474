//! Rule-based validation: the gatekeeper that blocks hallucinated or
//! uncited output before it reaches a user.
//!
//! This is Phase A of validation and the only phase that runs under
//! `VALIDATION_MODE=rule_only`. Every check here is deterministic and
//! explainable, which is what makes its verdicts defensible in court.
//! `advocate-llm` adds an optional Phase B on top when the mode allows it.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::agent::Validator;
use crate::types::{
    IssueKind, Reasoning, RetrievalResult, Severity, ValidationIssue, ValidationVerdict,
    VerdictStatus,
};

pub struct RuleBasedValidator;

/// Runs the five deterministic checks and folds them into a verdict.
/// Exposed standalone so `advocate-llm`'s Phase B validator can run this
/// first and append its own issues to the same list.
pub fn rule_based_issues(retrieval: &RetrievalResult, reasoning: &Reasoning) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if retrieval.sources.is_empty() {
        issues.push(ValidationIssue {
            severity: Severity::Critical,
            kind: IssueKind::MissingSources,
            description: "No legal sources retrieved. Cannot provide legal analysis without sources.".into(),
            location: Some("research".into()),
        });
    }

    if reasoning.citations_used.is_empty() && !retrieval.sources.is_empty() {
        issues.push(ValidationIssue {
            severity: Severity::Warning,
            kind: IssueKind::MissingCitation,
            description: "No citations provided despite having sources available.".into(),
            location: Some("citations_used".into()),
        });
    }

    let source_identifiers: HashSet<String> =
        retrieval.sources.iter().map(|s| s.identifier().to_lowercase()).collect();

    for citation in &reasoning.citations_used {
        let citation_lower = citation.to_lowercase();
        let matches = source_identifiers
            .iter()
            .any(|source_id| source_id.contains(&citation_lower) || citation_lower.contains(source_id.as_str()));

        if !matches {
            issues.push(ValidationIssue {
                severity: Severity::Critical,
                kind: IssueKind::Hallucination,
                description: format!("Citation '{citation}' not found in provided sources."),
                location: Some("citations_used".into()),
            });
        }
    }

    if reasoning.analysis.len() < Reasoning::MIN_ANALYSIS_LEN {
        issues.push(ValidationIssue {
            severity: Severity::Warning,
            kind: IssueKind::InsufficientAnalysis,
            description: "Analysis appears too brief.".into(),
            location: Some("analysis".into()),
        });
    }

    if reasoning.limitations.len() < Reasoning::MIN_LIMITATIONS_LEN {
        issues.push(ValidationIssue {
            severity: Severity::Info,
            kind: IssueKind::MissingLimitations,
            description: "Limitations section is brief. Consider a more explicit statement of constraints.".into(),
            location: Some("limitations".into()),
        });
    }

    issues
}

/// Folds a list of issues (rule-based, optionally plus LLM-detected) into
/// a final verdict. `rule_confidence`/`warn_confidence`/`pass_confidence`
/// differ between the pure rule-based path (0.0 / 0.6 / 0.95) and the
/// rule-plus-LLM path (0.0 / 0.5 / 0.9) per the original design.
pub fn verdict_from_issues(
    issues: Vec<ValidationIssue>,
    warn_confidence: f64,
    pass_confidence: f64,
) -> ValidationVerdict {
    let has_critical = issues.iter().any(|i| i.severity == Severity::Critical);
    let has_warning = issues.iter().any(|i| i.severity == Severity::Warning);

    let all_citations_verified = !issues
        .iter()
        .any(|i| i.kind == IssueKind::Hallucination && i.severity == Severity::Critical);
    let no_hallucination_detected = all_citations_verified;

    let (status, confidence) = if has_critical {
        (VerdictStatus::Fail, 0.0)
    } else if has_warning {
        (VerdictStatus::Warn, warn_confidence)
    } else {
        (VerdictStatus::Pass, pass_confidence)
    };

    ValidationVerdict { status, issues, confidence, all_citations_verified, no_hallucination_detected }
}

#[async_trait]
impl Validator for RuleBasedValidator {
    async fn validate(&self, retrieval: &RetrievalResult, reasoning: &Reasoning) -> ValidationVerdict {
        let issues = rule_based_issues(retrieval, reasoning);
        verdict_from_issues(issues, 0.6, 0.95)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LegalSource;

    fn source() -> LegalSource {
        LegalSource {
            law_name: "Penal Code".into(),
            section: "296".into(),
            text: "Whoever commits murder shall be punished.".into(),
            metadata: serde_json::Value::Null,
        }
    }

    fn retrieval_with(sources: Vec<LegalSource>) -> RetrievalResult {
        RetrievalResult {
            sources,
            issued_query: "q".into(),
            retrieval_timestamp: chrono::Utc::now(),
            status: crate::types::RetrievalStatus::Success,
        }
    }

    #[tokio::test]
    async fn missing_sources_forces_fail() {
        let validator = RuleBasedValidator;
        let retrieval = RetrievalResult::empty("q");
        let reasoning = Reasoning {
            analysis: "x".repeat(60),
            limitations: "y".repeat(30),
            citations_used: vec![],
            confidence: 0.5,
            chain: None,
        };

        let verdict = validator.validate(&retrieval, &reasoning).await;
        assert_eq!(verdict.status, VerdictStatus::Fail);
        assert_eq!(verdict.confidence, 0.0);
    }

    #[tokio::test]
    async fn uncited_claim_is_flagged_as_hallucination() {
        let validator = RuleBasedValidator;
        let retrieval = retrieval_with(vec![source()]);
        let reasoning = Reasoning {
            analysis: "x".repeat(60),
            limitations: "y".repeat(30),
            citations_used: vec!["Unrelated Act - Section 1".into()],
            confidence: 0.8,
            chain: None,
        };

        let verdict = validator.validate(&retrieval, &reasoning).await;
        assert_eq!(verdict.status, VerdictStatus::Fail);
        assert!(!verdict.all_citations_verified);
    }

    #[tokio::test]
    async fn well_formed_output_passes() {
        let validator = RuleBasedValidator;
        let retrieval = retrieval_with(vec![source()]);
        let reasoning = Reasoning {
            analysis: "x".repeat(60),
            limitations: "y".repeat(30),
            citations_used: vec!["Penal Code - Section 296".into()],
            confidence: 0.9,
            chain: None,
        };

        let verdict = validator.validate(&retrieval, &reasoning).await;
        assert_eq!(verdict.status, VerdictStatus::Pass);
        assert_eq!(verdict.confidence, 0.95);
    }
}
