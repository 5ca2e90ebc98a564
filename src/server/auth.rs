// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// AUTENTICAÇÃO - Bearer Token Middleware
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

use super::types::{ApiError, ApiErrorDetail};
use super::AppState;

/// Rotas abertas mesmo com `--secret`
fn is_public(method: &Method, path: &str) -> bool {
    path == "/health" || (method == Method::GET && path == "/v1/models")
}

/// Middleware de autenticação Bearer token.
///
/// Ativado apenas quando `--secret=TOKEN` é passado na inicialização.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let secret = match &state.secret {
        Some(s) => s,
        None => return next.run(request).await,
    };

    if is_public(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match token {
        Some(token) if token == secret => next.run(request).await,
        _ => {
            log::warn!("🔒 Requisição sem token válido: {}", request.uri().path());
            unauthorized_response()
        }
    }
}

fn unauthorized_response() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiError {
            error: ApiErrorDetail {
                message: "Unauthorized. Provide the server secret as a Bearer token.".into(),
                error_type: "auth".into(),
                code: Some("unauthorized".into()),
                interaction_id: None,
            },
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_routes() {
        assert!(is_public(&Method::GET, "/health"));
        assert!(is_public(&Method::GET, "/v1/models"));
        assert!(!is_public(&Method::POST, "/v1/models"));
        assert!(!is_public(&Method::GET, "/v1/interactions/int-1"));
    }
}
