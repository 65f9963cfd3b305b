//! Single completion workflows: inline rewrites, content insertion, grammar checks,
//! node edits, comment edits and template filling. None of them use tools.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use regex::Regex;
use scribe::models::message::Message;
use scribe::prompt_template::load_prompt_file;
use serde::Deserialize;
use serde_json::{json, Value};

use super::stream::{stream_text, StreamResponse};
use super::{internal_error, RouteError};
use crate::state::AppState;

pub const MAX_HTML_LENGTH: usize = 100 * 1024;
const PROOFREADER_TASK: &str = "Correct all grammar and spelling mistakes";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineEditRequest {
    pub user_request: String,
    #[serde(default)]
    pub selection: String,
}

#[derive(Debug, Deserialize)]
pub struct InsertContentRequest {
    pub task: String,
    #[serde(default)]
    pub replace: String,
}

#[derive(Debug, Deserialize)]
pub struct ProofreaderRequest {
    pub nodes: Value,
}

#[derive(Debug, Deserialize)]
pub struct TiptapEditRequest {
    pub nodes: Value,
    pub task: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentsWorkflowRequest {
    pub content: Value,
    #[serde(default)]
    pub threads: Value,
    pub task: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateWorkflowRequest {
    pub html_template: String,
    pub task: String,
}

fn bad_request(message: impl Into<String>) -> RouteError {
    (StatusCode::BAD_REQUEST, message.into())
}

/// Parse a JSON object answer, tolerating a surrounding code fence
pub fn parse_json_reply(text: &str) -> anyhow::Result<Value> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    let value: Value = serde_json::from_str(unfenced.trim())?;
    if !value.is_object() {
        anyhow::bail!("expected a JSON object, got {}", value);
    }
    Ok(value)
}

/// Placeholder keys in template order, each listed once
pub fn template_keys(html: &str) -> Vec<String> {
    let re = Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid placeholder pattern");
    let mut keys: Vec<String> = Vec::new();
    for captures in re.captures_iter(html) {
        let key = captures[1].to_string();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

async fn complete_json(state: &AppState, system: &str, user: String) -> Result<Value, RouteError> {
    let provider = state
        .provider()
        .map_err(|e| internal_error("Failed to create provider", e))?;
    let (message, _usage) = provider
        .complete(system, &[Message::user().with_text(user)], &[])
        .await
        .map_err(|e| internal_error("Completion failed", e))?;
    parse_json_reply(&message.text()).map_err(|e| internal_error("Invalid model response", e))
}

/// Complete a reply of the form `{ "operations": [...] }`, defaulting to no operations
async fn complete_operations(state: &AppState, prompt_file: &str, user: Value) -> Result<Value, RouteError> {
    let system = load_prompt_file(prompt_file, &json!({}))
        .map_err(|e| internal_error("Failed to render instructions", e))?;
    let mut reply = complete_json(state, &system, user.to_string()).await?;
    if !reply.get("operations").is_some_and(Value::is_array) {
        tracing::warn!("Reply has no operations list, treating it as empty");
        reply["operations"] = json!([]);
    }
    Ok(reply)
}

async fn inline_edits(
    State(state): State<AppState>,
    Json(request): Json<InlineEditRequest>,
) -> Result<StreamResponse, RouteError> {
    let system = load_prompt_file("inline_edits.md", &json!({}))
        .map_err(|e| internal_error("Failed to render instructions", e))?;
    let user = load_prompt_file(
        "inline_edits_request.md",
        &json!({
            "user_request": request.user_request,
            "selection": request.selection,
        }),
    )
    .map_err(|e| internal_error("Failed to render request", e))?;
    let provider = state
        .fast_provider()
        .map_err(|e| internal_error("Failed to create provider", e))?;

    Ok(stream_text(provider, system, vec![Message::user().with_text(user)]))
}

async fn insert_content_workflow(
    State(state): State<AppState>,
    Json(request): Json<InsertContentRequest>,
) -> Result<StreamResponse, RouteError> {
    let system = load_prompt_file("insert_content_workflow.md", &json!({}))
        .map_err(|e| internal_error("Failed to render instructions", e))?;
    let user = json!({ "task": request.task, "replace": request.replace }).to_string();
    let provider = state
        .fast_provider()
        .map_err(|e| internal_error("Failed to create provider", e))?;

    Ok(stream_text(provider, system, vec![Message::user().with_text(user)]))
}

async fn grammar_check(State(state): State<AppState>, body: Bytes) -> Result<Json<Value>, RouteError> {
    let body: Value =
        serde_json::from_slice(&body).map_err(|_| bad_request("Invalid JSON in request body"))?;

    let html = match body.get("html").and_then(Value::as_str) {
        Some(html) if !html.is_empty() => html,
        _ => {
            return Err(bad_request(
                "Missing or invalid 'html' parameter. Expected a non-empty string.",
            ))
        }
    };
    // Limit counts UTF-16 code units, as the editor measures string length
    if html.encode_utf16().count() > MAX_HTML_LENGTH {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "HTML content too large. Maximum allowed size is {} characters.",
                MAX_HTML_LENGTH
            ),
        ));
    }

    let prompt = load_prompt_file("grammar_check.md", &json!({ "html": html }))
        .map_err(|e| internal_error("Failed to render request", e))?;
    let mut changes = complete_json(&state, "", prompt).await?;
    if changes.get("changes").is_none() {
        changes["changes"] = json!([]);
    }
    Ok(Json(changes))
}

async fn proofreader(
    State(state): State<AppState>,
    Json(request): Json<ProofreaderRequest>,
) -> Result<Json<Value>, RouteError> {
    let user = json!({ "nodes": request.nodes, "task": PROOFREADER_TASK });
    Ok(Json(complete_operations(&state, "proofreader.md", user).await?))
}

async fn tiptap_edit_workflow(
    State(state): State<AppState>,
    Json(request): Json<TiptapEditRequest>,
) -> Result<Json<Value>, RouteError> {
    if request.task.trim().is_empty() {
        return Err(bad_request("Missing 'task'"));
    }
    let user = json!({ "nodes": request.nodes, "task": request.task });
    Ok(Json(complete_operations(&state, "tiptap_edit_workflow.md", user).await?))
}

async fn comments_workflow(
    State(state): State<AppState>,
    Json(request): Json<CommentsWorkflowRequest>,
) -> Result<Json<Value>, RouteError> {
    if request.task.trim().is_empty() {
        return Err(bad_request("Missing 'task'"));
    }
    let threads = if request.threads.is_null() {
        json!([])
    } else {
        request.threads
    };
    let user = json!({ "content": request.content, "threads": threads, "task": request.task });
    Ok(Json(complete_operations(&state, "comments_workflow.md", user).await?))
}

async fn template_workflow(
    State(state): State<AppState>,
    Json(request): Json<TemplateWorkflowRequest>,
) -> Result<Json<Value>, RouteError> {
    let keys = template_keys(&request.html_template);
    let system = load_prompt_file(
        "template_workflow.md",
        &json!({ "html_template": request.html_template, "keys": keys }),
    )
    .map_err(|e| internal_error("Failed to render instructions", e))?;
    let user = json!({ "task": request.task }).to_string();

    let filled = complete_json(&state, &system, user).await?;
    let missing: Vec<&String> = keys.iter().filter(|key| filled.get(key.as_str()).is_none()).collect();
    if !missing.is_empty() {
        tracing::warn!("Template answer is missing keys {:?}", missing);
    }
    Ok(Json(filled))
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/inline-edits", post(inline_edits))
        .route("/api/insert-content-workflow", post(insert_content_workflow))
        .route("/api/grammar-check", post(grammar_check))
        .route("/api/proofreader", post(proofreader))
        .route("/api/tiptap-edit-workflow", post(tiptap_edit_workflow))
        .route("/api/comments-workflow", post(comments_workflow))
        .route("/api/template-workflow", post(template_workflow))
        .with_state(state)
}
