// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP SERVER - API de pesquisa com SSE Streaming
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//!
//! Servidor HTTP sobre o núcleo de pesquisa.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /v1/models` - Agente e modelos rápidos
//! - `POST /v1/research` - Submete (202 + id) ou espera (200 + desfecho)
//! - `POST /v1/research/stream` - Pesquisa com SSE
//! - `GET /v1/interactions/:id` - Interação completa
//! - `GET /v1/interactions/:id/result` - Resultado (409 se não concluída)
//! - `GET /v1/interactions/:id/history` - Turnos da sessão
//! - `POST /v1/interactions/:id/followup` - Follow-up
//! - `POST /v1/search`, `/v1/analyze-urls`, `/v1/search-and-analyze`
//! - `GET /v1/tools`, `POST /v1/tools/:name` - Ferramentas de agente
//!
//! ## Uso
//!
//! ```bash
//! cargo run --features server -- serve --port 3000
//! cargo run --features server -- serve --port 3000 --secret minha-chave
//! ```

#[allow(missing_docs)]
pub mod types;
#[allow(missing_docs)]
pub mod handlers;
#[allow(missing_docs)]
pub mod sse;
mod auth;

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::client::ResearchBackend;
use crate::tools::ResearchToolbox;

pub use types::*;

/// Estado compartilhado entre todos os handlers
pub struct AppState {
    /// Núcleo de pesquisa
    pub backend: Arc<dyn ResearchBackend>,
    /// Ferramentas de agente sobre o mesmo núcleo
    pub toolbox: ResearchToolbox,
    /// Nome do agente de deep research
    pub agent: String,
    /// Token de autenticação opcional (Bearer)
    pub secret: Option<String>,
}

impl AppState {
    /// Monta o estado.
    pub fn new(backend: Arc<dyn ResearchBackend>, agent: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            toolbox: ResearchToolbox::new(Arc::clone(&backend)),
            backend,
            agent: agent.into(),
            secret,
        }
    }
}

/// Router completo (rotas + auth + CORS).
pub fn build_router(state: Arc<AppState>) -> Router {
    use axum::{
        middleware,
        routing::{get, post},
    };
    use tower_http::cors::CorsLayer;

    let routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/research", post(handlers::start_research))
        .route("/v1/research/stream", post(sse::research_stream))
        .route("/v1/interactions/:id", get(handlers::get_interaction))
        .route("/v1/interactions/:id/result", get(handlers::get_result))
        .route("/v1/interactions/:id/history", get(handlers::get_history))
        .route("/v1/interactions/:id/followup", post(handlers::followup))
        .route("/v1/search", post(handlers::quick_search))
        .route("/v1/analyze-urls", post(handlers::analyze_urls))
        .route("/v1/search-and-analyze", post(handlers::search_and_analyze))
        .route("/v1/tools", get(handlers::list_tools))
        .route("/v1/tools/:name", post(handlers::call_tool));

    // Auth middleware condicional
    let routes = if state.secret.is_some() {
        routes.layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ))
    } else {
        routes
    };

    routes.layer(CorsLayer::permissive()).with_state(state)
}

/// Inicia o servidor HTTP no endereço especificado.
pub async fn start_server(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("🌐 Servidor de pesquisa em http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ResearchClient;
    use crate::config::ClientConfig;
    use crate::poll::ManualClock;
    use crate::upstream::sse::InteractionEvent;
    use crate::upstream::{ApiFailure, InteractionScript, MockUpstream, StreamFrame};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app(secret: Option<&str>) -> (Router, Arc<MockUpstream>) {
        let mock = Arc::new(MockUpstream::new());
        let client = ResearchClient::with_upstream(
            ClientConfig::new("key").unwrap(),
            mock.clone(),
            Arc::new(ManualClock::new()),
        );
        let state = AppState::new(
            Arc::new(client),
            crate::config::DEFAULT_AGENT,
            secret.map(str::to_string),
        );
        (build_router(Arc::new(state)), mock)
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_models() {
        let (app, _) = app(None);
        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/v1/models")).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["object"], "list");
        assert_eq!(body["data"][0]["id"], crate::config::DEFAULT_AGENT);
    }

    #[tokio::test]
    async fn test_submit_then_result_not_ready() {
        let (app, mock) = app(None);
        mock.queue_interaction(InteractionScript::running_forever());

        let response = app
            .clone()
            .oneshot(post("/v1/research", json!({"query": "quantum computing trends"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["interaction_id"], "int-1");

        let response = app
            .oneshot(get("/v1/interactions/int-1/result"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"]["type"], "not_ready");
        assert_eq!(body["error"]["interaction_id"], "int-1");
    }

    #[tokio::test]
    async fn test_research_waits_for_outcome() {
        let (app, mock) = app(None);
        mock.queue_interaction(InteractionScript::completes_after(2, "report", vec![]));
        let response = app
            .oneshot(post(
                "/v1/research",
                json!({"query": "q", "wait_for_completion": true}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["outcome"], "completed");
        assert_eq!(body["result"]["content"], "report");
    }

    #[tokio::test]
    async fn test_validation_and_upstream_errors() {
        let (app, mock) = app(None);
        let response = app
            .clone()
            .oneshot(post("/v1/research", json!({"query": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        mock.fail_next_create(ApiFailure::Timeout("120s".into()));
        let response = app
            .clone()
            .oneshot(post("/v1/research", json!({"query": "q"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = app.oneshot(get("/v1/interactions/nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_followup_and_history() {
        let (app, mock) = app(None);
        mock.queue_interaction(InteractionScript::completes_after(0, "report", vec![]));
        mock.queue_interaction(InteractionScript::completed_on_create("the risks", vec![]));

        app.clone()
            .oneshot(post("/v1/research", json!({"query": "q", "wait_for_completion": true})))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(post(
                "/v1/interactions/int-1/followup",
                json!({"question": "what are the main risks?"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["content"], "the risks");

        let response = app
            .oneshot(get("/v1/interactions/int-1/history"))
            .await
            .unwrap();
        let history = body_json(response).await;
        assert_eq!(history.as_array().unwrap().len(), 2);
        assert_eq!(history[1]["question"], "what are the main risks?");
    }

    #[tokio::test]
    async fn test_stream_emits_named_events() {
        let (app, mock) = app(None);
        mock.queue_stream(vec![
            Ok(StreamFrame::new(InteractionEvent::Started {
                interaction_id: "int-s".into(),
            })),
            Ok(StreamFrame::new(InteractionEvent::TextDelta { text: "Hi".into() })),
            Err(ApiFailure::Network("reset".into())),
        ]);
        let response = app
            .oneshot(post("/v1/research/stream", json!({"query": "q"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("event: started"));
        assert!(text.contains("event: content_delta"));
        assert!(text.contains("event: interrupted"));
        assert!(text.contains("int-s"));
    }

    #[tokio::test]
    async fn test_bearer_auth() {
        let (app, _) = app(Some("s3cret"));
        let response = app.clone().oneshot(get("/v1/models")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(get("/v1/tools")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .uri("/v1/tools")
            .header("authorization", "Bearer s3cret")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["tools"].as_array().unwrap().len(), 9);
    }

    #[tokio::test]
    async fn test_tool_call_route() {
        let (app, _) = app(None);
        let response = app
            .oneshot(post("/v1/tools/unknown_tool", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
