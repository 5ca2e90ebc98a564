// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SCHEMAS DA API HTTP
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#![allow(missing_docs)]

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

use crate::config::{ModelVariant, QuickOptions, ResearchOptions, DEFAULT_AGENT};
use crate::error::ResearchError;

// ─────────────────────────────────────────────────
// Model
// ─────────────────────────────────────────────────

/// Modelo disponível na API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    /// Sempre "model"
    pub object: String,
    pub owned_by: String,
    /// "deep_research" ou "quick"
    pub kind: String,
    pub description: String,
}

/// Lista de modelos
#[derive(Debug, Serialize)]
pub struct ModelList {
    /// Sempre "list"
    pub object: String,
    pub data: Vec<Model>,
}

/// Agente de deep research + variantes das operações rápidas
pub fn available_models(agent: &str) -> Vec<Model> {
    let mut models = vec![Model {
        id: agent.to_string(),
        object: "model".into(),
        owned_by: "google".into(),
        kind: "deep_research".into(),
        description: if agent == DEFAULT_AGENT {
            "Gemini Deep Research agent".into()
        } else {
            "Deep research agent".into()
        },
    }];
    models.extend(ModelVariant::ALL.iter().map(|m| Model {
        id: m.as_str().into(),
        object: "model".into(),
        owned_by: "google".into(),
        kind: "quick".into(),
        description: m.description().into(),
    }));
    models
}

// ─────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────

/// POST /v1/research e /v1/research/stream
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResearchRequest {
    pub query: String,
    #[serde(default)]
    pub format_instructions: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// Segura a conexão até o desfecho (padrão: devolve 202 com o id)
    #[serde(default)]
    pub wait_for_completion: bool,
    /// Teto local em segundos
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl ResearchRequest {
    pub fn options(&self) -> ResearchOptions {
        ResearchOptions {
            format_instructions: self.format_instructions.clone(),
            language: self.language.clone(),
        }
    }
}

/// POST /v1/interactions/:id/followup
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FollowupRequest {
    pub question: String,
}

/// POST /v1/search, /v1/analyze-urls, /v1/search-and-analyze
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuickRequest {
    pub query: String,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub model: Option<ModelVariant>,
    #[serde(default)]
    pub language: Option<String>,
}

impl QuickRequest {
    pub fn options(&self) -> QuickOptions {
        QuickOptions {
            model: self.model,
            language: self.language.clone(),
        }
    }
}

// ─────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────

/// 202 de POST /v1/research sem espera
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmittedResponse {
    pub interaction_id: String,
    pub status_url: String,
    pub result_url: String,
}

impl SubmittedResponse {
    pub fn new(interaction_id: String) -> Self {
        let encoded = urlencoding::encode(&interaction_id).into_owned();
        Self {
            status_url: format!("/v1/interactions/{}", encoded),
            result_url: format!("/v1/interactions/{}/result", encoded),
            interaction_id,
        }
    }
}

// ─────────────────────────────────────────────────
// Error Response
// ─────────────────────────────────────────────────

/// Corpo de erro da API
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub message: String,
    /// Tag do erro (`validation`, `not_ready`, ...)
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<String>,
}

/// Status HTTP de cada tipo de erro
pub fn status_for(error: &ResearchError) -> StatusCode {
    match error {
        ResearchError::Validation(_) | ResearchError::Configuration(_) => StatusCode::BAD_REQUEST,
        ResearchError::Auth { .. } => StatusCode::UNAUTHORIZED,
        ResearchError::NotFound { .. } => StatusCode::NOT_FOUND,
        ResearchError::NotReady { .. } | ResearchError::InvalidState { .. } => StatusCode::CONFLICT,
        ResearchError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ResearchError::Submission { .. }
        | ResearchError::StreamInterrupted { .. }
        | ResearchError::Upstream { .. } => StatusCode::BAD_GATEWAY,
    }
}

impl From<&ResearchError> for ApiError {
    fn from(error: &ResearchError) -> Self {
        Self {
            error: ApiErrorDetail {
                message: error.to_string(),
                error_type: error.kind().into(),
                code: error.upstream_code().map(str::to_string),
                interaction_id: error.interaction_id().map(str::to_string),
            },
        }
    }
}

/// Resposta de erro a partir de um `ResearchError`
pub fn error_response(error: &ResearchError) -> Response {
    (status_for(error), Json(ApiError::from(error))).into_response()
}
