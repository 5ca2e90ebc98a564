// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UPSTREAM ROTEIRIZADO PARA TESTES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::sse::StreamFrame;
use super::wire::{
    Annotation, CreateInteractionRequest, GenerateContentRequest, GenerateContentResponse,
    InteractionOutput, InteractionResource,
};
use super::{ApiFailure, RawEventStream, UpstreamApi};
use crate::types::{Citation, InteractionStatus};

/// Roteiro de uma interação: status devolvidos a cada `get`, o último fica.
#[derive(Debug, Clone)]
pub struct InteractionScript {
    on_create: InteractionStatus,
    statuses: VecDeque<InteractionStatus>,
    report: String,
    citations: Vec<Citation>,
    error: Option<String>,
}

impl InteractionScript {
    /// Nunca sai de `running`.
    pub fn running_forever() -> Self {
        Self {
            on_create: InteractionStatus::Pending,
            statuses: VecDeque::from(vec![InteractionStatus::Running]),
            report: String::new(),
            citations: Vec::new(),
            error: None,
        }
    }

    /// `running` por `polls` consultas, depois `completed`.
    pub fn completes_after(polls: usize, report: &str, citations: Vec<Citation>) -> Self {
        let mut statuses: VecDeque<InteractionStatus> =
            std::iter::repeat(InteractionStatus::Running).take(polls).collect();
        statuses.push_back(InteractionStatus::Completed);
        Self {
            on_create: InteractionStatus::Pending,
            statuses,
            report: report.to_string(),
            citations,
            error: None,
        }
    }

    /// Já concluída na resposta do create (follow-ups síncronos).
    pub fn completed_on_create(report: &str, citations: Vec<Citation>) -> Self {
        Self {
            on_create: InteractionStatus::Completed,
            statuses: VecDeque::from(vec![InteractionStatus::Completed]),
            report: report.to_string(),
            citations,
            error: None,
        }
    }

    /// `running` por `polls` consultas, depois `failed`.
    pub fn fails_after(polls: usize, message: &str) -> Self {
        let mut statuses: VecDeque<InteractionStatus> =
            std::iter::repeat(InteractionStatus::Running).take(polls).collect();
        statuses.push_back(InteractionStatus::Failed);
        Self {
            on_create: InteractionStatus::Pending,
            statuses,
            report: String::new(),
            citations: Vec::new(),
            error: Some(message.to_string()),
        }
    }

    fn current(&self) -> InteractionStatus {
        self.statuses.front().copied().unwrap_or(InteractionStatus::Running)
    }

    fn advance(&mut self) -> InteractionStatus {
        if self.statuses.len() > 1 {
            self.statuses.pop_front();
        }
        self.current()
    }
}

/// Contadores de chamadas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCalls {
    /// `create_interaction`
    pub create: usize,
    /// `get_interaction`
    pub get: usize,
    /// `stream_interaction`
    pub stream: usize,
    /// `resume_interaction_stream`
    pub resume: usize,
    /// `generate_content`
    pub generate: usize,
}

impl MockCalls {
    /// Total de chamadas de rede
    pub fn total(&self) -> usize {
        self.create + self.get + self.stream + self.resume + self.generate
    }
}

#[derive(Default)]
struct MockState {
    next_id: usize,
    scripts: VecDeque<InteractionScript>,
    interactions: HashMap<String, (InteractionScript, String)>,
    create_failures: VecDeque<ApiFailure>,
    get_failures: VecDeque<ApiFailure>,
    streams: VecDeque<Result<Vec<Result<StreamFrame, ApiFailure>>, ApiFailure>>,
    generate: VecDeque<Result<GenerateContentResponse, ApiFailure>>,
    created: Vec<CreateInteractionRequest>,
    generated: Vec<(String, GenerateContentRequest)>,
    calls: MockCalls,
}

/// Upstream em memória, roteirizado.
///
/// Interações criadas recebem ids `int-1`, `int-2`, ... e seguem o próximo
/// roteiro enfileirado (ou `running_forever`).
#[derive(Default)]
pub struct MockUpstream {
    state: Mutex<MockState>,
}

impl MockUpstream {
    /// Upstream vazio.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Enfileira o roteiro da próxima interação criada.
    pub fn queue_interaction(&self, script: InteractionScript) {
        self.with_state(|s| s.scripts.push_back(script));
    }

    /// Registra uma interação já existente no upstream.
    pub fn insert_interaction(&self, id: &str, query: &str, script: InteractionScript) {
        self.with_state(|s| {
            s.interactions
                .insert(id.to_string(), (script, query.to_string()));
        });
    }

    /// Força a conclusão de uma interação existente.
    pub fn complete_interaction(&self, id: &str, report: &str, citations: Vec<Citation>) {
        self.with_state(|s| {
            if let Some((script, _)) = s.interactions.get_mut(id) {
                script.statuses = VecDeque::from(vec![InteractionStatus::Completed]);
                script.report = report.to_string();
                script.citations = citations;
            }
        });
    }

    /// A próxima criação falha.
    pub fn fail_next_create(&self, failure: ApiFailure) {
        self.with_state(|s| s.create_failures.push_back(failure));
    }

    /// A próxima leitura falha.
    pub fn fail_next_get(&self, failure: ApiFailure) {
        self.with_state(|s| s.get_failures.push_back(failure));
    }

    /// Enfileira os frames do próximo stream (create ou resume).
    pub fn queue_stream(&self, frames: Vec<Result<StreamFrame, ApiFailure>>) {
        self.with_state(|s| s.streams.push_back(Ok(frames)));
    }

    /// O próximo stream falha ao abrir.
    pub fn fail_next_stream(&self, failure: ApiFailure) {
        self.with_state(|s| s.streams.push_back(Err(failure)));
    }

    /// Enfileira a próxima resposta de generateContent.
    pub fn queue_generate(&self, response: Result<GenerateContentResponse, ApiFailure>) {
        self.with_state(|s| s.generate.push_back(response));
    }

    /// Enfileira uma resposta de generateContent a partir de JSON.
    pub fn queue_generate_json(&self, value: serde_json::Value) {
        let parsed = serde_json::from_value(value).map_err(|e| ApiFailure::Decode(e.to_string()));
        self.queue_generate(parsed);
    }

    /// Contadores de chamadas
    pub fn calls(&self) -> MockCalls {
        self.with_state(|s| s.calls)
    }

    /// Requests de criação recebidos
    pub fn created_requests(&self) -> Vec<CreateInteractionRequest> {
        self.with_state(|s| s.created.clone())
    }

    /// Requests de generateContent recebidos
    pub fn generate_requests(&self) -> Vec<(String, GenerateContentRequest)> {
        self.with_state(|s| s.generated.clone())
    }
}

fn resource(id: &str, query: &str, script: &InteractionScript, status: InteractionStatus) -> InteractionResource {
    let mut resource = InteractionResource {
        id: id.to_string(),
        status: Some(wire_status(status).to_string()),
        input: Some(json!(query)),
        ..Default::default()
    };
    match status {
        InteractionStatus::Completed => {
            resource.outputs.push(InteractionOutput {
                kind: Some("text".into()),
                text: Some(script.report.clone()),
                annotations: script
                    .citations
                    .iter()
                    .map(|c| Annotation {
                        url: Some(c.url.clone()),
                        source: None,
                        title: c.title.clone(),
                    })
                    .collect(),
                grounding_metadata: None,
            });
        }
        InteractionStatus::Failed => {
            resource.error = script.error.clone().map(|m| json!({ "message": m }));
        }
        _ => {}
    }
    resource
}

fn wire_status(status: InteractionStatus) -> &'static str {
    match status {
        InteractionStatus::Running => "in_progress",
        other => other.as_str(),
    }
}

fn not_found(id: &str) -> ApiFailure {
    ApiFailure::Status {
        status: 404,
        code: Some("NOT_FOUND".into()),
        message: format!("Interaction {} not found", id),
    }
}

#[async_trait]
impl UpstreamApi for MockUpstream {
    async fn create_interaction(
        &self,
        request: &CreateInteractionRequest,
    ) -> Result<InteractionResource, ApiFailure> {
        self.with_state(|s| {
            s.calls.create += 1;
            s.created.push(request.clone());
            if let Some(failure) = s.create_failures.pop_front() {
                return Err(failure);
            }
            if let Some(previous) = &request.previous_interaction_id {
                if !s.interactions.contains_key(previous) {
                    return Err(not_found(previous));
                }
            }
            s.next_id += 1;
            let id = format!("int-{}", s.next_id);
            let script = s
                .scripts
                .pop_front()
                .unwrap_or_else(InteractionScript::running_forever);
            let created = resource(&id, &request.input, &script, script.on_create);
            s.interactions.insert(id, (script, request.input.clone()));
            Ok(created)
        })
    }

    async fn get_interaction(&self, interaction_id: &str) -> Result<InteractionResource, ApiFailure> {
        self.with_state(|s| {
            s.calls.get += 1;
            if let Some(failure) = s.get_failures.pop_front() {
                return Err(failure);
            }
            let (script, query) = s
                .interactions
                .get_mut(interaction_id)
                .ok_or_else(|| not_found(interaction_id))?;
            let status = script.current();
            let snapshot = resource(interaction_id, query, script, status);
            script.advance();
            Ok(snapshot)
        })
    }

    async fn stream_interaction(
        &self,
        request: &CreateInteractionRequest,
    ) -> Result<RawEventStream, ApiFailure> {
        let frames = self.with_state(|s| {
            s.calls.stream += 1;
            s.created.push(request.clone());
            s.streams.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        })?;
        Ok(stream::iter(frames).boxed())
    }

    async fn resume_interaction_stream(
        &self,
        interaction_id: &str,
    ) -> Result<RawEventStream, ApiFailure> {
        let frames = self.with_state(|s| {
            s.calls.resume += 1;
            if !s.interactions.contains_key(interaction_id) {
                return Err(not_found(interaction_id));
            }
            s.streams.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        })?;
        Ok(stream::iter(frames).boxed())
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ApiFailure> {
        self.with_state(|s| {
            s.calls.generate += 1;
            s.generated.push((model.to_string(), request.clone()));
            s.generate
                .pop_front()
                .unwrap_or_else(|| Err(ApiFailure::Decode("no scripted response".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_script_progression() {
        let mock = MockUpstream::new();
        mock.queue_interaction(InteractionScript::completes_after(1, "report", vec![]));

        let created = mock
            .create_interaction(&CreateInteractionRequest::research("agent", "q".into()))
            .await
            .unwrap();
        assert_eq!(created.id, "int-1");
        assert_eq!(created.normalized_status(), InteractionStatus::Pending);

        let first = mock.get_interaction("int-1").await.unwrap();
        assert_eq!(first.normalized_status(), InteractionStatus::Running);
        let second = mock.get_interaction("int-1").await.unwrap();
        assert_eq!(second.normalized_status(), InteractionStatus::Completed);
        assert_eq!(second.text().as_deref(), Some("report"));
        assert_eq!(second.input_text().as_deref(), Some("q"));

        assert_eq!(mock.calls().create, 1);
        assert_eq!(mock.calls().get, 2);
    }

    #[tokio::test]
    async fn test_unknown_id_is_404() {
        let mock = MockUpstream::new();
        let failure = mock.get_interaction("nope").await.unwrap_err();
        assert!(matches!(failure, ApiFailure::Status { status: 404, .. }));
    }
}
