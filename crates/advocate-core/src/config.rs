use anyhow::Result;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    RuleOnly,
    RulePlusLlm,
}

/// Full application configuration loaded from environment / .env file.
#[derive(Debug, Clone)]
pub struct Config {
    pub corpus_index_dir: String,
    pub audit_log_dir: String,
    pub case_memory_db: String,

    pub llm_provider: LlmProvider,
    pub llm_model_reasoning: String,
    pub llm_model_validator: String,
    pub llm_temperature: f64,
    pub llm_api_base: String,
    pub llm_api_key: String,

    pub retrieval_max_sources: usize,
    pub validation_mode: ValidationMode,
    pub request_deadline_ms: u64,

    pub server_host: String,
    pub server_port: u16,
}

fn parse_dotenv() -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(contents) = std::fs::read_to_string(".env") else {
        return map;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    map
}

fn get(key: &str, dotenv: &HashMap<String, String>) -> Option<String> {
    std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
}

fn get_str(key: &str, dotenv: &HashMap<String, String>, default: &str) -> String {
    get(key, dotenv).unwrap_or_else(|| default.to_string())
}

fn get_f64(key: &str, dotenv: &HashMap<String, String>, default: f64) -> f64 {
    get(key, dotenv).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn get_usize(key: &str, dotenv: &HashMap<String, String>, default: usize) -> usize {
    get(key, dotenv).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn get_u64(key: &str, dotenv: &HashMap<String, String>, default: u64) -> u64 {
    get(key, dotenv).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn get_u16(key: &str, dotenv: &HashMap<String, String>, default: u16) -> u16 {
    get(key, dotenv).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let dotenv = parse_dotenv();

        let llm_provider = match get_str("LLM_PROVIDER", &dotenv, "primary").as_str() {
            "secondary" => LlmProvider::Secondary,
            _ => LlmProvider::Primary,
        };

        let validation_mode = match get_str("VALIDATION_MODE", &dotenv, "rule_only").as_str() {
            "rule_plus_llm" => ValidationMode::RulePlusLlm,
            _ => ValidationMode::RuleOnly,
        };

        Ok(Config {
            corpus_index_dir: get_str("CORPUS_INDEX_DIR", &dotenv, "./data/index"),
            audit_log_dir: get_str("AUDIT_LOG_DIR", &dotenv, "./logs"),
            case_memory_db: get_str("CASE_MEMORY_DB", &dotenv, "./data/case_memory.sqlite3"),
            llm_provider,
            llm_model_reasoning: get_str("LLM_MODEL_REASONING", &dotenv, "gpt-4o-mini"),
            llm_model_validator: get_str("LLM_MODEL_VALIDATOR", &dotenv, "gpt-4o"),
            llm_temperature: get_f64("LLM_TEMPERATURE", &dotenv, 0.0),
            llm_api_base: get_str("LLM_API_BASE", &dotenv, "http://localhost:11434"),
            llm_api_key: get_str("LLM_API_KEY", &dotenv, ""),
            retrieval_max_sources: get_usize("RETRIEVAL_MAX_SOURCES", &dotenv, 5),
            validation_mode,
            request_deadline_ms: get_u64("REQUEST_DEADLINE_MS", &dotenv, 60_000),
            server_host: get_str("SERVER_HOST", &dotenv, "0.0.0.0"),
            server_port: get_u16("SERVER_PORT", &dotenv, 8000),
        })
    }
}

/// Clamp a requested source count to the gateway's accepted range `[1, 20]`.
/// Zero is passed through unclamped: it means "retrieve nothing," which the
/// gateway must honor as an always-empty retrieval rather than flooring it
/// up to a real result.
pub fn clamp_max_sources(requested: usize) -> usize {
    if requested == 0 {
        return 0;
    }
    requested.clamp(1, 20)
}
