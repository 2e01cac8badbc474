//! Legal reasoning agent: applies the law to the question using ONLY the
//! sources the retriever handed it. Never sees external legal knowledge.
//!
//! The reasoning chain itself is never exposed to the user (to prevent
//! prompt-injection from surfacing internal deliberation); only the final
//! analysis, limitations, and citation list are kept.

use async_trait::async_trait;

use advocate_core::agent::Reasoner;
use advocate_core::types::{Reasoning, RetrievalResult};

use crate::llm_client::LlmClient;

const SYSTEM_PROMPT: &str = r#"You are a legal reasoning engine for Sri Lankan law.

CRITICAL RULES (violating these will result in validation failure):

1. Use ONLY the legal sources provided below. Do NOT use external legal knowledge.
2. If sources are insufficient, you MUST say so explicitly in limitations.
3. Every legal statement MUST be cited to a provided source.
4. Do NOT invent case law, precedents, or legal interpretations.
5. Do NOT make assumptions about facts not stated in the query.
6. Be explicit about uncertainty and limitations.

Output your reasoning as JSON with this exact structure:
{
    "analysis": "Your legal analysis using ONLY provided sources with citations",
    "limitations": "What cannot be concluded from available sources",
    "citations_used": ["Law Name - Section X", ...]
}"#;

pub struct LlmReasoner {
    client: LlmClient,
    model: String,
    temperature: f64,
}

impl LlmReasoner {
    pub fn new(client: LlmClient, model: impl Into<String>, temperature: f64) -> Self {
        Self { client, model: model.into(), temperature }
    }
}

fn format_sources(retrieval: &RetrievalResult) -> String {
    if retrieval.sources.is_empty() {
        return "No sources available.".to_string();
    }
    retrieval
        .sources
        .iter()
        .enumerate()
        .map(|(idx, s)| format!("{}. {} - Section {}\n   Text: {}\n", idx + 1, s.law_name, s.section, s.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Three-tier parse: strict JSON, then a heading-scan fallback for models
/// that ignore the JSON instruction, then an unparseable minimal result.
/// `has_sources` gates confidence in both parsed forms — a reasoner run
/// against zero retrieved sources must never report high confidence, no
/// matter what the model claims to have cited.
fn parse_reasoning(content: &str, has_sources: bool) -> Reasoning {
    if let Some(parsed) = parse_json(content, has_sources) {
        return parsed;
    }
    if let Some(parsed) = parse_headings(content, has_sources) {
        return parsed;
    }
    Reasoning::unparseable()
}

fn parse_json(content: &str, has_sources: bool) -> Option<Reasoning> {
    let stripped = strip_code_fence(content);

    #[derive(serde::Deserialize)]
    struct RawReasoning {
        analysis: String,
        limitations: String,
        #[serde(default)]
        citations_used: Vec<String>,
    }

    let raw: RawReasoning = serde_json::from_str(stripped).ok()?;
    let confidence = if !has_sources || raw.citations_used.is_empty() { 0.2 } else { 0.8 };
    Some(Reasoning { analysis: raw.analysis, limitations: raw.limitations, citations_used: raw.citations_used, confidence, chain: None })
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.trim_end_matches("```").trim()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.trim_end_matches("```").trim()
    } else {
        trimmed
    }
}

fn parse_headings(content: &str, has_sources: bool) -> Option<Reasoning> {
    if !content.contains("ANALYSIS:") {
        return None;
    }

    let after_analysis = content.split("ANALYSIS:").nth(1)?;
    let mut parts = after_analysis.splitn(2, "LIMITATIONS:");
    let analysis = parts.next()?.trim().to_string();
    let rest = parts.next().unwrap_or_default();

    let mut limit_parts = rest.splitn(2, "CITATIONS USED:");
    let limitations = limit_parts.next().unwrap_or_default().trim().to_string();
    let citations_used = limit_parts
        .next()
        .map(|c| {
            c.lines()
                .map(|l| l.trim().trim_start_matches('-').trim().to_string())
                .filter(|l| !l.is_empty() && !l.starts_with("Example"))
                .collect()
        })
        .unwrap_or_default();

    let confidence = if has_sources { 0.7 } else { 0.2 };
    Some(Reasoning { analysis, limitations, citations_used, confidence, chain: None })
}

#[async_trait]
impl Reasoner for LlmReasoner {
    async fn reason(&self, retrieval: &RetrievalResult) -> Reasoning {
        let user_prompt = format!(
            "Query: {}\n\nProvided Legal Sources:\n{}\n\nApply these sources to answer the query. Remember: use ONLY these sources.",
            retrieval.issued_query,
            format_sources(retrieval)
        );

        let outcome = self.client.chat(&self.model, SYSTEM_PROMPT, &user_prompt, self.temperature).await;
        if !outcome.success {
            return Reasoning { chain: Some(outcome.content), ..Reasoning::unparseable() };
        }

        let mut reasoning = parse_reasoning(&outcome.content, !retrieval.sources.is_empty());
        reasoning.chain = Some(outcome.content);
        reasoning
    }
}
