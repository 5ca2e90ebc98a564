// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE STREAMING - Bridge ResearchStream → Server-Sent Events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::stream::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;

use super::types::{error_response, ResearchRequest};
use super::AppState;
use crate::error::ResearchError;
use crate::tools::error_json;
use crate::types::StreamEvent;

/// Nome do evento SSE para cada `StreamEvent`
pub fn event_name(event: &StreamEvent) -> &'static str {
    match event {
        StreamEvent::Started { .. } => "started",
        StreamEvent::Thought { .. } => "thought",
        StreamEvent::ContentDelta { .. } => "content_delta",
        StreamEvent::Completed { .. } => "completed",
        StreamEvent::Failed { .. } => "failed",
    }
}

fn to_sse(item: Result<StreamEvent, ResearchError>) -> Event {
    match item {
        Ok(event) => {
            let json = serde_json::to_string(&event).unwrap_or_default();
            Event::default().event(event_name(&event)).data(json)
        }
        Err(e) => {
            // `interrupted` carrega o id para o cliente voltar ao polling
            let name = match &e {
                ResearchError::StreamInterrupted { .. } => "interrupted",
                _ => "error",
            };
            Event::default()
                .event(name)
                .data(error_json(&e).to_string())
        }
    }
}

// ── POST /v1/research/stream ────────────────────

/// Pesquisa em streaming. Falhas ao abrir o stream voltam como JSON com o
/// status HTTP correspondente; depois disso tudo segue como eventos.
pub async fn research_stream(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ResearchRequest>,
) -> Response {
    log::info!("[SSE] Pesquisa em streaming: {}", body.query);
    let stream = match state.backend.stream_research(&body.query, &body.options()).await {
        Ok(stream) => stream,
        Err(e) => return error_response(&e),
    };

    let events = stream.map(|item| Ok::<_, Infallible>(to_sse(item)));
    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(
            event_name(&StreamEvent::Thought { text: "x".into() }),
            "thought"
        );
        assert_eq!(
            event_name(&StreamEvent::Failed {
                interaction_id: None,
                code: None,
                message: "x".into()
            }),
            "failed"
        );
    }
}
