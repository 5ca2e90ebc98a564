// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GERENCIADOR DO CICLO DE VIDA DAS INTERAÇÕES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Submissão, polling, streaming e follow-ups de tarefas de deep research.
//
// Regras centrais:
// - submissão e conclusão são desacopladas: todo desfecho devolve o id
// - chamadas que criam tarefa nunca são repetidas automaticamente
// - leituras transitórias são repetidas só dentro do loop de espera
// - o upstream é o dono do estado; aqui só existe um cache best-effort de
//   follow-ups por sessão
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use crate::config::{ClientConfig, PollConfig, ResearchOptions};
use crate::error::ResearchError;
use crate::poll::{CancellationSignal, Clock, PollObservation, PollState};
use crate::types::{
    Interaction, InteractionStatus, ResearchOutcome, ResearchResult, ResearchStatus, StreamEvent,
    Turn,
};
use crate::upstream::{
    CreateInteractionRequest, InteractionEvent, InteractionResource, RawEventStream, UpstreamApi,
};

/// Opções da espera local de `research()` / `wait_for_completion()`.
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    /// Sobrescreve o teto total de espera
    pub timeout: Option<Duration>,
    /// Interrompe a espera local (a tarefa segue no upstream)
    pub cancel: CancellationSignal,
}

impl WaitOptions {
    /// Espera com teto próprio.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Default::default()
        }
    }

    /// Espera cancelável pelo sinal indicado.
    pub fn with_cancel(mut self, cancel: CancellationSignal) -> Self {
        self.cancel = cancel;
        self
    }
}

// ─────────────────────────────────────────────────
// Sessões (cache best-effort de follow-ups)
// ─────────────────────────────────────────────────

struct Session {
    query: Option<String>,
    initial_answer: Option<ResearchResult>,
    followups: Vec<Turn>,
    latest_id: String,
    followup_in_flight: bool,
}

impl Session {
    fn new(root_id: &str, query: Option<String>) -> Self {
        Self {
            query,
            initial_answer: None,
            followups: Vec::new(),
            latest_id: root_id.to_string(),
            followup_in_flight: false,
        }
    }
}

struct SessionStore {
    sessions: HashMap<String, Session>,
    // id de follow-up -> id raiz
    aliases: HashMap<String, String>,
    // raízes em ordem de registro; as mais antigas saem primeiro
    order: VecDeque<String>,
    capacity: usize,
}

impl SessionStore {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            aliases: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn root_of(&self, id: &str) -> String {
        self.aliases.get(id).cloned().unwrap_or_else(|| id.to_string())
    }

    /// Registra a raiz se ainda não existe; devolve `true` quando criou.
    fn register(&mut self, root_id: &str, query: Option<String>) -> bool {
        if self.sessions.contains_key(root_id) {
            return false;
        }
        self.sessions
            .insert(root_id.to_string(), Session::new(root_id, query));
        self.order.push_back(root_id.to_string());
        self.evict_oldest();
        true
    }

    fn evict_oldest(&mut self) {
        while self.sessions.len() > self.capacity {
            // Nunca descarta a recém-registrada nem sessões com follow-up em andamento
            let candidates = self.order.len().saturating_sub(1);
            let Some(pos) = self.order.iter().take(candidates).position(|id| {
                self.sessions
                    .get(id)
                    .map_or(true, |s| !s.followup_in_flight)
            }) else {
                break;
            };
            if let Some(root_id) = self.order.remove(pos) {
                log::debug!("🧹 Sessão {} descartada do cache local", root_id);
                self.drop_session(&root_id);
            }
        }
    }

    fn drop_session(&mut self, root_id: &str) {
        if let Some(session) = self.sessions.remove(root_id) {
            for turn in &session.followups {
                self.aliases.remove(&turn.interaction_id);
            }
        }
        self.order.retain(|id| id != root_id);
    }

    fn turns(&self, root_id: &str) -> Vec<Turn> {
        let Some(session) = self.sessions.get(root_id) else {
            return Vec::new();
        };
        let mut turns = Vec::with_capacity(session.followups.len() + 1);
        if let Some(query) = &session.query {
            turns.push(Turn::new(
                query.clone(),
                root_id,
                session.initial_answer.clone(),
            ));
        }
        turns.extend(session.followups.iter().cloned());
        turns
    }
}

fn lock(store: &Mutex<SessionStore>) -> MutexGuard<'_, SessionStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Marca de follow-up em andamento; liberada no drop (inclusive cancelamento).
struct FollowupGuard {
    sessions: Arc<Mutex<SessionStore>>,
    root_id: String,
    // sessão criada só para este follow-up; some se nada for registrado
    created: bool,
}

impl FollowupGuard {
    fn acquire(sessions: &Arc<Mutex<SessionStore>>, id: &str) -> Result<Self, ResearchError> {
        let mut store = lock(sessions);
        let root_id = store.root_of(id);
        let created = store.register(&root_id, None);
        let session = store
            .sessions
            .get_mut(&root_id)
            .ok_or_else(|| ResearchError::NotFound {
                interaction_id: id.to_string(),
                message: "session vanished".into(),
            })?;
        if session.followup_in_flight {
            return Err(ResearchError::InvalidState {
                interaction_id: id.to_string(),
                status: InteractionStatus::Running,
                message: "a follow-up is already in flight for this interaction".into(),
            });
        }
        session.followup_in_flight = true;
        Ok(Self {
            sessions: Arc::clone(sessions),
            root_id,
            created,
        })
    }
}

impl Drop for FollowupGuard {
    fn drop(&mut self) {
        let mut store = lock(&self.sessions);
        let mut empty = false;
        if let Some(session) = store.sessions.get_mut(&self.root_id) {
            session.followup_in_flight = false;
            empty = session.query.is_none()
                && session.initial_answer.is_none()
                && session.followups.is_empty();
        }
        if self.created && empty {
            store.drop_session(&self.root_id);
        }
    }
}

// ─────────────────────────────────────────────────
// Loop de polling
// ─────────────────────────────────────────────────

enum PollEnd {
    Completed(InteractionResource),
    Failed {
        status: InteractionStatus,
        error: Option<String>,
    },
    TimedOut {
        last_status: InteractionStatus,
        elapsed: Duration,
    },
    Cancelled {
        last_status: InteractionStatus,
    },
}

fn validate_id(interaction_id: &str) -> Result<(), ResearchError> {
    if interaction_id.trim().is_empty() {
        return Err(ResearchError::Validation("interaction id must not be empty".into()));
    }
    Ok(())
}

fn validate_text(field: &str, value: &str) -> Result<(), ResearchError> {
    if value.trim().is_empty() {
        return Err(ResearchError::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn empty_output(interaction_id: &str) -> ResearchError {
    ResearchError::Upstream {
        interaction_id: Some(interaction_id.to_string()),
        status: None,
        code: None,
        message: "completed interaction has no text output".into(),
    }
}

// ─────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────

/// Gerenciador de interações de deep research.
pub struct InteractionManager {
    upstream: Arc<dyn UpstreamApi>,
    clock: Arc<dyn Clock>,
    agent: String,
    poll: PollConfig,
    sessions: Arc<Mutex<SessionStore>>,
}

impl InteractionManager {
    /// Cria o manager sobre um upstream e um relógio.
    pub fn new(config: &ClientConfig, upstream: Arc<dyn UpstreamApi>, clock: Arc<dyn Clock>) -> Self {
        Self {
            upstream,
            clock,
            agent: config.agent.clone(),
            poll: config.poll,
            sessions: Arc::new(Mutex::new(SessionStore::with_capacity(config.max_sessions))),
        }
    }

    /// Política de polling em uso
    pub fn poll_config(&self) -> PollConfig {
        self.poll
    }

    /// Submete uma nova pesquisa e devolve o id imediatamente.
    ///
    /// Falhas viram `Submission` (ou `Auth`) e nunca são repetidas.
    pub async fn start_research(
        &self,
        query: &str,
        options: &ResearchOptions,
    ) -> Result<String, ResearchError> {
        validate_text("query", query)?;
        options.validate()?;

        let request = CreateInteractionRequest::research(&self.agent, options.compose_input(query));
        let created = self
            .upstream
            .create_interaction(&request)
            .await
            .map_err(|f| f.into_submission_error())?;

        if created.id.is_empty() {
            return Err(ResearchError::Submission {
                status: None,
                code: None,
                message: "upstream accepted the request but returned no interaction id".into(),
                outcome_unknown: true,
            });
        }

        log::info!("🚀 Pesquisa submetida: {} (status {})", created.id, created.normalized_status());
        lock(&self.sessions).register(&created.id, Some(query.to_string()));
        Ok(created.id)
    }

    async fn fetch(&self, interaction_id: &str) -> Result<InteractionResource, ResearchError> {
        validate_id(interaction_id)?;
        self.upstream
            .get_interaction(interaction_id)
            .await
            .map_err(|f| f.into_read_error(interaction_id))
    }

    /// Uma consulta de status.
    pub async fn get_status(&self, interaction_id: &str) -> Result<ResearchStatus, ResearchError> {
        let resource = self.fetch(interaction_id).await?;
        let status = resource.normalized_status();
        log::debug!("📊 {} → {}", interaction_id, status);
        Ok(ResearchStatus {
            interaction_id: interaction_id.to_string(),
            status,
            error: resource.error_message(),
        })
    }

    /// Resultado de uma interação concluída; `NotReady` caso contrário.
    pub async fn get_result(&self, interaction_id: &str) -> Result<ResearchResult, ResearchError> {
        let resource = self.fetch(interaction_id).await?;
        self.completed_result(interaction_id, &resource)
    }

    fn completed_result(
        &self,
        interaction_id: &str,
        resource: &InteractionResource,
    ) -> Result<ResearchResult, ResearchError> {
        let status = resource.normalized_status();
        if status != InteractionStatus::Completed {
            return Err(ResearchError::NotReady {
                interaction_id: interaction_id.to_string(),
                status,
            });
        }
        let mut result = resource.to_result().ok_or_else(|| empty_output(interaction_id))?;
        result.interaction_id = Some(interaction_id.to_string());
        self.remember_answer(interaction_id, &result);
        Ok(result)
    }

    fn remember_answer(&self, interaction_id: &str, result: &ResearchResult) {
        let mut store = lock(&self.sessions);
        if let Some(session) = store.sessions.get_mut(interaction_id) {
            if session.initial_answer.is_none() {
                session.initial_answer = Some(result.clone());
            }
        }
    }

    /// Reconstrói a interação a partir do upstream + histórico local.
    pub async fn get_interaction(&self, interaction_id: &str) -> Result<Interaction, ResearchError> {
        let resource = self.fetch(interaction_id).await?;
        let status = resource.normalized_status();
        let result = if status == InteractionStatus::Completed {
            Some(self.completed_result(interaction_id, &resource)?)
        } else {
            None
        };

        let (query, history) = {
            let store = lock(&self.sessions);
            let root = store.root_of(interaction_id);
            let query = store.sessions.get(&root).and_then(|s| s.query.clone());
            let history = if root == interaction_id {
                store.turns(&root)
            } else {
                Vec::new()
            };
            (query, history)
        };
        let query = query.or_else(|| resource.input_text());

        let history = if history.is_empty() {
            query
                .iter()
                .map(|q| Turn::new(q.clone(), interaction_id, result.clone()))
                .collect()
        } else {
            history
        };

        Interaction::new(interaction_id, status, query, history, result)
    }

    /// Turnos registrados localmente para a sessão do id (raiz ou follow-up).
    pub fn history(&self, interaction_id: &str) -> Vec<Turn> {
        let store = lock(&self.sessions);
        let root = store.root_of(interaction_id);
        store.turns(&root)
    }

    /// Submete e espera com backoff até concluir, falhar ou atingir o teto.
    pub async fn research(
        &self,
        query: &str,
        options: &ResearchOptions,
        wait: WaitOptions,
    ) -> Result<ResearchOutcome, ResearchError> {
        let interaction_id = self.start_research(query, options).await?;
        self.wait_for_completion(&interaction_id, wait).await
    }

    /// Retoma a espera sobre uma interação existente.
    pub async fn wait_for_completion(
        &self,
        interaction_id: &str,
        wait: WaitOptions,
    ) -> Result<ResearchOutcome, ResearchError> {
        validate_id(interaction_id)?;
        let ceiling = wait.timeout.unwrap_or(self.poll.timeout);
        let id = interaction_id.to_string();

        let outcome = match self.poll_until_terminal(interaction_id, ceiling, &wait.cancel).await? {
            PollEnd::Completed(resource) => {
                let result = self.completed_result(interaction_id, &resource)?;
                log::info!("✅ Pesquisa concluída: {} ({} citações)", id, result.citations.len());
                ResearchOutcome::Completed {
                    interaction_id: id,
                    result,
                }
            }
            PollEnd::Failed { status, error } => {
                log::warn!("❌ Pesquisa {} terminou como {}: {:?}", id, status, error);
                ResearchOutcome::Failed {
                    interaction_id: id,
                    status,
                    error,
                }
            }
            PollEnd::TimedOut {
                last_status,
                elapsed,
            } => {
                log::warn!(
                    "⏰ Teto local de {:?} atingido para {} (último status {}); a tarefa segue no upstream",
                    ceiling,
                    id,
                    last_status
                );
                ResearchOutcome::TimedOut {
                    interaction_id: id,
                    last_status,
                    elapsed_secs: elapsed.as_secs(),
                }
            }
            PollEnd::Cancelled { last_status } => {
                log::info!("🛑 Espera local cancelada para {}", id);
                ResearchOutcome::Cancelled {
                    interaction_id: id,
                    last_status,
                }
            }
        };
        Ok(outcome)
    }

    async fn poll_until_terminal(
        &self,
        interaction_id: &str,
        ceiling: Duration,
        cancel: &CancellationSignal,
    ) -> Result<PollEnd, ResearchError> {
        let started = self.clock.now();
        let mut state = PollState::Submitted;

        loop {
            if cancel.is_cancelled() {
                return Ok(PollEnd::Cancelled {
                    last_status: state.last_status(),
                });
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(PollEnd::Cancelled { last_status: state.last_status() });
                }
                r = self.upstream.get_interaction(interaction_id) => r,
            };

            let mut completed = None;
            let observation = match fetched {
                Ok(resource) => {
                    let status = resource.normalized_status();
                    let error = resource.error_message();
                    if status == InteractionStatus::Completed {
                        completed = Some(resource);
                    }
                    PollObservation::Status { status, error }
                }
                Err(failure) => {
                    let err = failure.into_read_error(interaction_id);
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    log::warn!("⚠️ Falha transitória ao consultar {}: {}", interaction_id, err);
                    PollObservation::TransientFailure
                }
            };

            let elapsed = self.clock.now().saturating_duration_since(started);
            state = state.next(observation, elapsed, ceiling);
            log::debug!("🔄 {} → {:?} ({:?})", interaction_id, state, elapsed);

            match &state {
                PollState::Completed => {
                    return completed
                        .map(PollEnd::Completed)
                        .ok_or_else(|| empty_output(interaction_id));
                }
                PollState::Failed { status, error } => {
                    return Ok(PollEnd::Failed {
                        status: *status,
                        error: error.clone(),
                    });
                }
                PollState::TimedOutLocally { last_status } => {
                    return Ok(PollEnd::TimedOut {
                        last_status: *last_status,
                        elapsed,
                    });
                }
                _ => {}
            }

            let attempt = state.attempt().saturating_sub(1);
            let delay = self
                .poll
                .backoff
                .delay_for(attempt)
                .min(ceiling.saturating_sub(elapsed));

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(PollEnd::Cancelled { last_status: state.last_status() });
                }
                _ = self.clock.sleep(delay) => {}
            }
        }
    }

    /// Submete uma pesquisa em streaming.
    ///
    /// Abrir o stream cria a tarefa, então falhas aqui são de submissão.
    pub async fn stream_research(
        &self,
        query: &str,
        options: &ResearchOptions,
    ) -> Result<ResearchStream, ResearchError> {
        validate_text("query", query)?;
        options.validate()?;

        let request = CreateInteractionRequest::streaming(&self.agent, options.compose_input(query));
        let raw = self
            .upstream
            .stream_interaction(&request)
            .await
            .map_err(|f| f.into_submission_error())?;

        log::info!("📡 Stream de pesquisa aberto");
        Ok(ResearchStream::new(
            raw,
            Arc::clone(&self.upstream),
            Arc::clone(&self.sessions),
            None,
            Some(query.to_string()),
        ))
    }

    /// Novo stream sobre uma interação existente, a partir da posição atual.
    pub async fn resume_stream(&self, interaction_id: &str) -> Result<ResearchStream, ResearchError> {
        validate_id(interaction_id)?;
        let raw = self
            .upstream
            .resume_interaction_stream(interaction_id)
            .await
            .map_err(|f| f.into_read_error(interaction_id))?;

        log::info!("📡 Stream retomado para {}", interaction_id);
        Ok(ResearchStream::new(
            raw,
            Arc::clone(&self.upstream),
            Arc::clone(&self.sessions),
            Some(interaction_id.to_string()),
            None,
        ))
    }

    /// Pergunta de follow-up sobre uma interação concluída.
    ///
    /// Um segundo follow-up na mesma sessão enquanto este roda é rejeitado
    /// com `InvalidState`. O turno só entra no histórico após a resposta
    /// completa.
    pub async fn ask_followup(
        &self,
        interaction_id: &str,
        question: &str,
    ) -> Result<ResearchResult, ResearchError> {
        validate_id(interaction_id)?;
        validate_text("question", question)?;

        let _guard = FollowupGuard::acquire(&self.sessions, interaction_id)?;

        let target = self.fetch(interaction_id).await?;
        let status = target.normalized_status();
        if status != InteractionStatus::Completed {
            return Err(ResearchError::InvalidState {
                interaction_id: interaction_id.to_string(),
                status,
                message: "follow-up questions require a completed interaction".into(),
            });
        }

        let (root_id, previous_id) = {
            let store = lock(&self.sessions);
            let root = store.root_of(interaction_id);
            let latest = store
                .sessions
                .get(&root)
                .map(|s| s.latest_id.clone())
                .unwrap_or_else(|| interaction_id.to_string());
            (root, latest)
        };

        let request = CreateInteractionRequest::followup(&self.agent, question.to_string(), &previous_id);
        let created = self
            .upstream
            .create_interaction(&request)
            .await
            .map_err(|f| f.into_followup_error(&previous_id))?;

        if created.id.is_empty() {
            return Err(ResearchError::Submission {
                status: None,
                code: None,
                message: "upstream accepted the follow-up but returned no interaction id".into(),
                outcome_unknown: true,
            });
        }
        let followup_id = created.id.clone();
        log::info!("💬 Follow-up {} submetido sobre {}", followup_id, previous_id);

        let answered = if created.normalized_status() == InteractionStatus::Completed
            && created.text().is_some()
        {
            created
        } else {
            self.await_followup(&followup_id).await?
        };

        let mut result = answered.to_result().ok_or_else(|| empty_output(&followup_id))?;
        result.interaction_id = Some(followup_id.clone());

        {
            let mut store = lock(&self.sessions);
            if let Some(session) = store.sessions.get_mut(&root_id) {
                session
                    .followups
                    .push(Turn::new(question, followup_id.clone(), Some(result.clone())));
                session.latest_id = followup_id.clone();
            }
            store.aliases.insert(followup_id, root_id);
        }

        Ok(result)
    }

    async fn await_followup(&self, followup_id: &str) -> Result<InteractionResource, ResearchError> {
        let never = CancellationSignal::new();
        match self.poll_until_terminal(followup_id, self.poll.timeout, &never).await? {
            PollEnd::Completed(resource) => Ok(resource),
            PollEnd::Failed { status, error } => Err(ResearchError::Upstream {
                interaction_id: Some(followup_id.to_string()),
                status: None,
                code: Some(status.as_str().to_string()),
                message: error.unwrap_or_else(|| format!("follow-up ended as {}", status)),
            }),
            PollEnd::TimedOut { last_status, .. } | PollEnd::Cancelled { last_status } => {
                Err(ResearchError::NotReady {
                    interaction_id: followup_id.to_string(),
                    status: last_status,
                })
            }
        }
    }
}

// ─────────────────────────────────────────────────
// ResearchStream
// ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct StreamProgress {
    interaction_id: Option<String>,
    last_event_id: Option<String>,
}

/// Sequência preguiçosa, de consumidor único e só para frente, de
/// [`StreamEvent`]s, terminada por `Completed` ou `Failed`.
///
/// Uma desconexão antes do evento terminal vira `Err(StreamInterrupted)`
/// com o id já atribuído, para o chamador voltar ao polling.
pub struct ResearchStream {
    inner: BoxStream<'static, Result<StreamEvent, ResearchError>>,
    progress: Arc<Mutex<StreamProgress>>,
}

impl std::fmt::Debug for ResearchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchStream")
            .field("interaction_id", &self.interaction_id())
            .field("last_event_id", &self.last_event_id())
            .finish()
    }
}

struct StreamDriver {
    raw: RawEventStream,
    upstream: Arc<dyn UpstreamApi>,
    sessions: Arc<Mutex<SessionStore>>,
    progress: Arc<Mutex<StreamProgress>>,
    query: Option<String>,
    content: String,
    done: bool,
}

impl StreamDriver {
    fn progress(&self) -> (Option<String>, Option<String>) {
        let p = self.progress.lock().unwrap_or_else(|e| e.into_inner());
        (p.interaction_id.clone(), p.last_event_id.clone())
    }

    fn interrupted(&mut self, message: String) -> ResearchError {
        self.done = true;
        let (interaction_id, last_event_id) = self.progress();
        log::warn!("⚠️ Stream interrompido ({:?}): {}", interaction_id, message);
        ResearchError::StreamInterrupted {
            interaction_id,
            last_event_id,
            message,
        }
    }

    async fn finish(&mut self, interaction: Option<InteractionResource>) -> StreamEvent {
        self.done = true;
        let (known_id, _) = self.progress();
        let id = known_id.or_else(|| interaction.as_ref().map(|i| i.id.clone()).filter(|s| !s.is_empty()));

        if let Some(resource) = &interaction {
            let status = resource.normalized_status();
            if matches!(status, InteractionStatus::Failed | InteractionStatus::Cancelled) {
                return StreamEvent::Failed {
                    interaction_id: id,
                    code: Some(status.as_str().to_string()),
                    message: resource
                        .error_message()
                        .unwrap_or_else(|| format!("interaction {}", status)),
                };
            }
        }

        let mut result = interaction.as_ref().and_then(|i| i.to_result());
        if result.is_none() {
            if let Some(id) = &id {
                match self.upstream.get_interaction(id).await {
                    Ok(resource) if resource.normalized_status() == InteractionStatus::Completed => {
                        result = resource.to_result();
                    }
                    Ok(resource) => log::warn!(
                        "⚠️ Evento final sem outputs e {} ainda {}; usando deltas",
                        id,
                        resource.normalized_status()
                    ),
                    Err(e) => log::warn!("⚠️ Falha ao buscar resultado de {}: {}; usando deltas", id, e),
                }
            }
        }
        let mut result = result.unwrap_or_else(|| ResearchResult::new(self.content.clone(), Vec::new()));
        result.interaction_id = id.clone();

        if let Some(id) = &id {
            let mut store = lock(&self.sessions);
            store.register(id, self.query.clone());
            if let Some(session) = store.sessions.get_mut(id) {
                if session.initial_answer.is_none() {
                    session.initial_answer = Some(result.clone());
                }
            }
            log::info!("✅ Stream concluído: {}", id);
        }
        StreamEvent::Completed { result }
    }

    async fn next_event(&mut self) -> Option<Result<StreamEvent, ResearchError>> {
        while !self.done {
            let frame = match self.raw.next().await {
                None => {
                    return Some(Err(
                        self.interrupted("stream ended before a terminal event".into())
                    ))
                }
                Some(Err(failure)) => return Some(Err(self.interrupted(failure.to_string()))),
                Some(Ok(frame)) => frame,
            };

            if let Some(event_id) = frame.event_id {
                let mut p = self.progress.lock().unwrap_or_else(|e| e.into_inner());
                p.last_event_id = Some(event_id);
            }

            match frame.event {
                InteractionEvent::Started { interaction_id } => {
                    {
                        let mut p = self.progress.lock().unwrap_or_else(|e| e.into_inner());
                        if p.interaction_id.is_some() {
                            continue;
                        }
                        p.interaction_id = Some(interaction_id.clone());
                    }
                    lock(&self.sessions).register(&interaction_id, self.query.clone());
                    log::info!("🆔 Interação atribuída: {}", interaction_id);
                    return Some(Ok(StreamEvent::Started { interaction_id }));
                }
                InteractionEvent::TextDelta { text } => {
                    if text.is_empty() {
                        continue;
                    }
                    self.content.push_str(&text);
                    return Some(Ok(StreamEvent::ContentDelta { text }));
                }
                InteractionEvent::ThoughtDelta { text } => {
                    if text.is_empty() {
                        continue;
                    }
                    return Some(Ok(StreamEvent::Thought { text }));
                }
                InteractionEvent::StatusUpdate { status } => {
                    let status = InteractionStatus::from_upstream(&status);
                    log::debug!("📊 status_update: {}", status);
                    if matches!(status, InteractionStatus::Failed | InteractionStatus::Cancelled) {
                        self.done = true;
                        let (interaction_id, _) = self.progress();
                        return Some(Ok(StreamEvent::Failed {
                            interaction_id,
                            code: Some(status.as_str().to_string()),
                            message: format!("interaction {}", status),
                        }));
                    }
                }
                InteractionEvent::Completed { interaction } => {
                    return Some(Ok(self.finish(interaction).await));
                }
                InteractionEvent::Error { code, message } => {
                    self.done = true;
                    let (interaction_id, _) = self.progress();
                    log::warn!("❌ Erro no stream ({:?}): {}", interaction_id, message);
                    return Some(Ok(StreamEvent::Failed {
                        interaction_id,
                        code,
                        message,
                    }));
                }
            }
        }
        None
    }
}

impl ResearchStream {
    fn new(
        raw: RawEventStream,
        upstream: Arc<dyn UpstreamApi>,
        sessions: Arc<Mutex<SessionStore>>,
        interaction_id: Option<String>,
        query: Option<String>,
    ) -> Self {
        let progress = Arc::new(Mutex::new(StreamProgress {
            interaction_id,
            last_event_id: None,
        }));
        let driver = StreamDriver {
            raw,
            upstream,
            sessions,
            progress: Arc::clone(&progress),
            query,
            content: String::new(),
            done: false,
        };
        let inner = stream::unfold(driver, |mut driver| async move {
            let item = driver.next_event().await?;
            Some((item, driver))
        })
        .boxed();

        Self { inner, progress }
    }

    /// Id atribuído pelo upstream (após `Started`, ou o id retomado)
    pub fn interaction_id(&self) -> Option<String> {
        self.progress
            .lock()
            .map(|p| p.interaction_id.clone())
            .unwrap_or_default()
    }

    /// Último `event_id` recebido
    pub fn last_event_id(&self) -> Option<String> {
        self.progress
            .lock()
            .map(|p| p.last_event_id.clone())
            .unwrap_or_default()
    }
}

impl Stream for ResearchStream {
    type Item = Result<StreamEvent, ResearchError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
