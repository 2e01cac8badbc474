//! Terminal output shaping. Synthesizes a cited answer on pass/warn,
//! refuses on fail. Does no reasoning of its own — every fact it emits
//! was already produced upstream.

use crate::agent::Formatter;
use crate::types::{LegalSource, Refusal, Reasoning, RetrievalResult, Synthesized, ValidationVerdict, VerdictStatus};

pub struct DefaultFormatter;

const DISCLAIMER: &str = "This output is generated by an automated legal reasoning assistant and \
does not constitute legal advice. Consult a qualified advocate before relying on it.";

/// Marks each cited source inline in `analysis` with a `[n]` marker, in the
/// order the sources are first referenced, and returns only the sources
/// actually referenced, in that same order.
fn interleave_citations(analysis: &str, citations_used: &[String], sources: &[LegalSource]) -> (String, Vec<LegalSource>) {
    let mut response = analysis.to_string();
    let mut referenced = Vec::new();

    for citation in citations_used {
        let citation_lower = citation.to_lowercase();
        let matched = sources.iter().find(|s| {
            let identifier_lower = s.identifier().to_lowercase();
            identifier_lower.contains(&citation_lower) || citation_lower.contains(&identifier_lower)
        });

        let Some(source) = matched else { continue };
        if referenced.iter().any(|s: &LegalSource| s.identifier() == source.identifier()) {
            continue;
        }
        referenced.push(source.clone());
        let marker = format!(" [{}]", referenced.len());

        if let Some(pos) = response.to_lowercase().find(&citation_lower) {
            let insert_at = pos + citation.len();
            response.insert_str(insert_at, &marker);
        } else {
            response.push_str(&marker);
        }
    }

    (response, referenced)
}

impl Formatter for DefaultFormatter {
    fn synthesize(
        &self,
        retrieval: &RetrievalResult,
        reasoning: &Reasoning,
        verdict: &ValidationVerdict,
    ) -> Synthesized {
        let confidence_note = match verdict.status {
            VerdictStatus::Pass => format!("High confidence ({:.2}). No issues detected.", verdict.confidence),
            VerdictStatus::Warn => format!(
                "Moderate confidence ({:.2}). {} issue(s) flagged for review.",
                verdict.confidence,
                verdict.issues.len()
            ),
            VerdictStatus::Fail => unreachable!("formatter.synthesize must not be called on a failed verdict"),
        };

        let (response, citations) = interleave_citations(&reasoning.analysis, &reasoning.citations_used, &retrieval.sources);

        Synthesized {
            response,
            citations,
            confidence_note,
            disclaimer: DISCLAIMER.to_string(),
            metadata: serde_json::json!({
                "limitations": reasoning.limitations,
                "issues": verdict.issues,
            }),
        }
    }

    fn refuse(&self, verdict: &ValidationVerdict) -> Refusal {
        let suggestions = verdict
            .issues
            .iter()
            .filter_map(|issue| match issue.kind {
                crate::types::IssueKind::MissingSources => {
                    Some("Rephrase the question with more specific legal terminology.".to_string())
                }
                crate::types::IssueKind::Hallucination => {
                    Some("Narrow the question to what the retrieved sources actually cover.".to_string())
                }
                _ => None,
            })
            .collect();

        Refusal {
            reason: "The system cannot provide a court-admissible answer to this query.".to_string(),
            issues: verdict.issues.clone(),
            suggestions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LegalSource, RetrievalStatus};

    fn passing_verdict() -> ValidationVerdict {
        ValidationVerdict {
            status: VerdictStatus::Pass,
            issues: vec![],
            confidence: 0.95,
            all_citations_verified: true,
            no_hallucination_detected: true,
        }
    }

    #[test]
    fn synthesize_carries_citations_through() {
        let formatter = DefaultFormatter;
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
            analysis: "Analysis text.".into(),
            limitations: "Limitations text.".into(),
            citations_used: vec!["Penal Code - Section 296".into()],
            confidence: 0.9,
            chain: None,
        };

        let synthesized = formatter.synthesize(&retrieval, &reasoning, &passing_verdict());
        assert_eq!(synthesized.citations.len(), 1);
        assert!(synthesized.confidence_note.contains("High confidence"));
    }

    #[test]
    fn synthesize_inserts_inline_markers_for_referenced_citations() {
        let formatter = DefaultFormatter;
        let retrieval = RetrievalResult {
            sources: vec![
                LegalSource {
                    law_name: "Penal Code".into(),
                    section: "296".into(),
                    text: "...".into(),
                    metadata: serde_json::Value::Null,
                },
                LegalSource {
                    law_name: "Penal Code".into(),
                    section: "300".into(),
                    text: "...".into(),
                    metadata: serde_json::Value::Null,
                },
            ],
            issued_query: "q".into(),
            retrieval_timestamp: chrono::Utc::now(),
            status: RetrievalStatus::Success,
        };
        let reasoning = Reasoning {
            analysis: "Under Penal Code - Section 296 the act is punishable.".into(),
            limitations: "Limitations text.".into(),
            citations_used: vec!["Penal Code - Section 296".into()],
            confidence: 0.9,
            chain: None,
        };

        let synthesized = formatter.synthesize(&retrieval, &reasoning, &passing_verdict());
        assert!(synthesized.response.contains("Penal Code - Section 296 [1]"));
        assert_eq!(synthesized.citations.len(), 1);
        assert_eq!(synthesized.citations[0].section, "296");
    }

    #[test]
    fn refusal_carries_issues_through() {
        let formatter = DefaultFormatter;
        let verdict = ValidationVerdict {
            status: VerdictStatus::Fail,
            issues: vec![crate::types::ValidationIssue {
                severity: crate::types::Severity::Critical,
                kind: crate::types::IssueKind::MissingSources,
                description: "no sources".into(),
                location: None,
            }],
            confidence: 0.0,
            all_citations_verified: true,
            no_hallucination_detected: true,
        };

        let refusal = formatter.refuse(&verdict);
        assert_eq!(refusal.issues.len(), 1);
        assert_eq!(refusal.suggestions.len(), 1);
    }
}
