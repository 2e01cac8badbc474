use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use advocate_core::agent::Retriever;
use advocate_core::audit;
use advocate_core::error::CoreError;
use advocate_core::types::{Output, UserQuery};

use crate::error::ApiError;
use crate::AppState;

const CASE_MEMORY_TAIL_N: usize = 20;

#[derive(Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub case_context: Option<String>,
    #[serde(default)]
    pub max_sources: Option<usize>,
}

fn validate_question(question: &str) -> Result<(), ApiError> {
    if question.trim().len() <= UserQuery::MIN_QUESTION_LEN {
        return Err(CoreError::ClientInvalid(format!(
            "question must be more than {} characters",
            UserQuery::MIN_QUESTION_LEN
        ))
        .into());
    }
    Ok(())
}

/// Identifies the caller for case-memory scoping. Full authentication is an
/// external collaborator's concern (see spec Non-goals); this server trusts
/// an upstream gateway to set `X-User-Id` on every forwarded request.
fn require_user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| CoreError::ClientInvalid("missing X-User-Id header".into()).into())
}

pub async fn query(State(state): State<Arc<AppState>>, Json(req): Json<QueryRequest>) -> Result<Json<Value>, ApiError> {
    validate_question(&req.question)?;

    let mut pipeline = state.build_pipeline();
    if let Some(requested) = req.max_sources {
        pipeline.retrieval_max_sources = advocate_core::config::clamp_max_sources(requested);
    }
    let session_id = pipeline.audit.session_id().to_string();
    let output = pipeline.execute(UserQuery::new(req.question, req.case_context)).await;

    let (status, data) = match output {
        Output::Success(s) => (
            "success",
            json!({
                "response": s.response,
                "confidence_note": s.confidence_note,
                "disclaimer": s.disclaimer,
                "metadata": s.metadata,
                "citations": s.citations,
            }),
        ),
        Output::Refused(r) => (
            "refused",
            json!({ "reason": r.reason, "issues": r.issues, "suggestions": r.suggestions }),
        ),
    };

    Ok(Json(json!({
        "status": status,
        "data": data,
        "session_id": session_id,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

#[derive(Deserialize)]
pub struct IncidentAgentRequest {
    pub message: String,
    #[serde(default)]
    pub case_context: Option<String>,
}

pub async fn incident_agent(
    State(state): State<Arc<AppState>>,
    Path(incident_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<IncidentAgentRequest>,
) -> Result<Json<Value>, ApiError> {
    validate_question(&req.message)?;
    let user_id = require_user_id(&headers)?;

    let (incident_history, global_history) =
        state.case_memory.load_context(&incident_id, &user_id, CASE_MEMORY_TAIL_N)?;
    let user_context_used = !incident_history.is_empty() || !global_history.is_empty();

    let history_context = incident_history
        .iter()
        .map(|m| format!("[{:?}] {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let case_context = match (req.case_context, history_context.is_empty()) {
        (Some(extra), true) => Some(extra),
        (Some(extra), false) => Some(format!("{history_context}\n\n{extra}")),
        (None, true) => None,
        (None, false) => Some(history_context),
    };

    let pipeline = state.build_pipeline();
    let session_id = pipeline.audit.session_id().to_string();
    let output = pipeline.execute(UserQuery::new(req.message.clone(), case_context)).await;

    let assistant_text = match &output {
        Output::Success(s) => s.response.clone(),
        Output::Refused(r) => r.reason.clone(),
    };
    state
        .case_memory
        .persist_turn(&incident_id, &user_id, &req.message, &assistant_text)
        .map_err(|e| ApiError::with_session(e.into(), Some(session_id.clone())))?;

    Ok(Json(json!({ "response": assistant_text, "user_context_used": user_context_used })))
}

pub async fn get_audit(State(state): State<Arc<AppState>>, Path(session_id): Path<String>) -> Result<Json<Value>, ApiError> {
    let logs = audit::read_session_file(std::path::Path::new(&state.config.audit_log_dir), &session_id)
        .map_err(|e| CoreError::ClientInvalid(format!("unknown session: {e}")))?;
    Ok(Json(json!({ "session_id": session_id, "log_count": logs.len(), "logs": logs })))
}

#[derive(Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

pub async fn export_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(q): Query<ExportQuery>,
) -> Result<Json<Value>, ApiError> {
    let logs = audit::read_session_file(std::path::Path::new(&state.config.audit_log_dir), &session_id)
        .map_err(|e| CoreError::ClientInvalid(format!("unknown session: {e}")))?;

    let format = match q.format.as_deref() {
        Some("md") | Some("markdown") => "markdown",
        _ => "json",
    };

    let file = if format == "markdown" {
        json!(audit::render_markdown(&session_id, &logs))
    } else {
        json!(logs)
    };

    Ok(Json(json!({ "session_id": session_id, "format": format, "file": file })))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let mcp_available = state.retriever.healthy();
    Json(json!({
        "status": if mcp_available { "ok" } else { "degraded" },
        "mcp_available": mcp_available,
        "timestamp": Utc::now().to_rfc3339(),
    }))
}
