// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ENDPOINT HANDLERS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::types::*;
use super::AppState;
use crate::interaction::WaitOptions;

// ── GET /health ─────────────────────────────────

/// Health check endpoint
pub async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok", "version": crate::VERSION }))
}

// ── GET /v1/models ──────────────────────────────

/// Lista o agente e os modelos rápidos
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(ModelList {
        object: "list".into(),
        data: available_models(&state.agent),
    })
}

// ── POST /v1/research ───────────────────────────

/// Submete uma pesquisa: 202 com o id, ou 200 com o desfecho quando
/// `wait_for_completion` é verdadeiro.
pub async fn start_research(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ResearchRequest>,
) -> Response {
    let options = body.options();

    if !body.wait_for_completion {
        return match state.backend.start_research(&body.query, &options).await {
            Ok(id) => (StatusCode::ACCEPTED, Json(SubmittedResponse::new(id))).into_response(),
            Err(e) => error_response(&e),
        };
    }

    let wait = WaitOptions {
        timeout: body.timeout.map(Duration::from_secs),
        ..Default::default()
    };
    log::info!("[JSON] Pesquisa com espera: {}", body.query);
    match state.backend.research(&body.query, &options, wait).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => error_response(&e),
    }
}

// ── GET /v1/interactions/:id ────────────────────

/// Interação completa
pub async fn get_interaction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.backend.get_interaction(&id).await {
        Ok(interaction) => Json(interaction).into_response(),
        Err(e) => error_response(&e),
    }
}

// ── GET /v1/interactions/:id/result ─────────────

/// Resultado; 409 enquanto não concluída
pub async fn get_result(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.backend.get_result(&id).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(&e),
    }
}

// ── GET /v1/interactions/:id/history ────────────

/// Turnos da sessão
pub async fn get_history(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let local = state.backend.history(&id);
    if !local.is_empty() {
        return Json(local).into_response();
    }
    match state.backend.get_interaction(&id).await {
        Ok(interaction) => Json(interaction.history().to_vec()).into_response(),
        Err(e) => error_response(&e),
    }
}

// ── POST /v1/interactions/:id/followup ──────────

/// Follow-up sobre uma interação concluída
pub async fn followup(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<FollowupRequest>,
) -> Response {
    match state.backend.ask_followup(&id, &body.question).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(&e),
    }
}

// ── POST /v1/search ─────────────────────────────

/// Busca rápida
pub async fn quick_search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QuickRequest>,
) -> Response {
    match state.backend.quick_search(&body.query, &body.options()).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(&e),
    }
}

// ── POST /v1/analyze-urls ───────────────────────

/// Análise de URLs
pub async fn analyze_urls(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QuickRequest>,
) -> Response {
    match state
        .backend
        .analyze_urls(&body.urls, &body.query, &body.options())
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(&e),
    }
}

// ── POST /v1/search-and-analyze ─────────────────

/// Busca + URLs
pub async fn search_and_analyze(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QuickRequest>,
) -> Response {
    match state
        .backend
        .search_and_analyze(&body.query, &body.urls, &body.options())
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => error_response(&e),
    }
}

// ── GET /v1/tools ───────────────────────────────

/// Specs das ferramentas
pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::json!({ "tools": state.toolbox.specs() }))
}

// ── POST /v1/tools/:name ────────────────────────

/// Invoca uma ferramenta; o corpo é o objeto de argumentos
pub async fn call_tool(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(args): Json<Value>,
) -> Response {
    match state.toolbox.try_invoke(&name, args).await {
        Ok(value) => Json(value).into_response(),
        Err(e) => error_response(&e),
    }
}
