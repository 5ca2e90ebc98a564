// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CAPACIDADES DO CLIENTE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Dois grupos de operações, cada front-end depende só do que usa:
// - `LongRunningResearch`: interações com id (submit/poll/stream/follow-up)
// - `QuickResearch`: chamadas de uma ida e volta
//
// `ResearchClient` implementa os dois sobre um único upstream.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{ClientConfig, QuickOptions, ResearchOptions};
use crate::error::ResearchError;
use crate::interaction::{InteractionManager, ResearchStream, WaitOptions};
use crate::poll::{Clock, SystemClock};
use crate::quick::QuickClient;
use crate::types::{Interaction, ResearchOutcome, ResearchResult, ResearchStatus, Turn};
use crate::upstream::{GeminiHttpApi, UpstreamApi};

/// Operações sobre tarefas de pesquisa longas.
#[async_trait]
pub trait LongRunningResearch: Send + Sync {
    /// Submete e devolve o id sem esperar
    async fn start_research(
        &self,
        query: &str,
        options: &ResearchOptions,
    ) -> Result<String, ResearchError>;

    /// Status atual
    async fn get_status(&self, interaction_id: &str) -> Result<ResearchStatus, ResearchError>;

    /// Resultado de uma interação concluída
    async fn get_result(&self, interaction_id: &str) -> Result<ResearchResult, ResearchError>;

    /// Interação completa (status, query, histórico, resultado)
    async fn get_interaction(&self, interaction_id: &str) -> Result<Interaction, ResearchError>;

    /// Submete e espera
    async fn research(
        &self,
        query: &str,
        options: &ResearchOptions,
        wait: WaitOptions,
    ) -> Result<ResearchOutcome, ResearchError>;

    /// Espera uma interação já submetida
    async fn wait_for_completion(
        &self,
        interaction_id: &str,
        wait: WaitOptions,
    ) -> Result<ResearchOutcome, ResearchError>;

    /// Submete em streaming
    async fn stream_research(
        &self,
        query: &str,
        options: &ResearchOptions,
    ) -> Result<ResearchStream, ResearchError>;

    /// Reabre o stream de uma interação existente
    async fn resume_stream(&self, interaction_id: &str) -> Result<ResearchStream, ResearchError>;

    /// Follow-up sobre uma interação concluída
    async fn ask_followup(
        &self,
        interaction_id: &str,
        question: &str,
    ) -> Result<ResearchResult, ResearchError>;

    /// Turnos conhecidos localmente
    fn history(&self, interaction_id: &str) -> Vec<Turn>;
}

/// Operações rápidas, sem id de tarefa.
#[async_trait]
pub trait QuickResearch: Send + Sync {
    /// Busca com grounding
    async fn quick_search(
        &self,
        query: &str,
        options: &QuickOptions,
    ) -> Result<ResearchResult, ResearchError>;

    /// Análise de URLs
    async fn analyze_urls(
        &self,
        urls: &[String],
        query: &str,
        options: &QuickOptions,
    ) -> Result<ResearchResult, ResearchError>;

    /// Busca + análise de URLs
    async fn search_and_analyze(
        &self,
        query: &str,
        urls: &[String],
        options: &QuickOptions,
    ) -> Result<ResearchResult, ResearchError>;
}

/// Os dois grupos juntos, para front-ends que expõem tudo.
pub trait ResearchBackend: LongRunningResearch + QuickResearch {}

impl<T: LongRunningResearch + QuickResearch> ResearchBackend for T {}

/// Cliente completo: manager de interações + operações rápidas.
pub struct ResearchClient {
    config: ClientConfig,
    interactions: InteractionManager,
    quick: QuickClient,
}

impl ResearchClient {
    /// Cliente real sobre HTTP.
    pub fn from_config(config: ClientConfig) -> Result<Self, ResearchError> {
        let api = Arc::new(GeminiHttpApi::new(&config)?);
        log::info!("🌐 Cliente Gemini em {}", config.base_url);
        Ok(Self::with_upstream(config, api, Arc::new(SystemClock)))
    }

    /// Cliente sobre um upstream e relógio arbitrários.
    pub fn with_upstream(
        config: ClientConfig,
        upstream: Arc<dyn UpstreamApi>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let interactions = InteractionManager::new(&config, Arc::clone(&upstream), clock);
        let quick = QuickClient::new(upstream, config.default_model);
        Self {
            config,
            interactions,
            quick,
        }
    }

    /// Configuração em uso
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Manager de interações
    pub fn interactions(&self) -> &InteractionManager {
        &self.interactions
    }

    /// Cliente rápido
    pub fn quick(&self) -> &QuickClient {
        &self.quick
    }
}

#[async_trait]
impl LongRunningResearch for ResearchClient {
    async fn start_research(
        &self,
        query: &str,
        options: &ResearchOptions,
    ) -> Result<String, ResearchError> {
        self.interactions.start_research(query, options).await
    }

    async fn get_status(&self, interaction_id: &str) -> Result<ResearchStatus, ResearchError> {
        self.interactions.get_status(interaction_id).await
    }

    async fn get_result(&self, interaction_id: &str) -> Result<ResearchResult, ResearchError> {
        self.interactions.get_result(interaction_id).await
    }

    async fn get_interaction(&self, interaction_id: &str) -> Result<Interaction, ResearchError> {
        self.interactions.get_interaction(interaction_id).await
    }

    async fn research(
        &self,
        query: &str,
        options: &ResearchOptions,
        wait: WaitOptions,
    ) -> Result<ResearchOutcome, ResearchError> {
        self.interactions.research(query, options, wait).await
    }

    async fn wait_for_completion(
        &self,
        interaction_id: &str,
        wait: WaitOptions,
    ) -> Result<ResearchOutcome, ResearchError> {
        self.interactions.wait_for_completion(interaction_id, wait).await
    }

    async fn stream_research(
        &self,
        query: &str,
        options: &ResearchOptions,
    ) -> Result<ResearchStream, ResearchError> {
        self.interactions.stream_research(query, options).await
    }

    async fn resume_stream(&self, interaction_id: &str) -> Result<ResearchStream, ResearchError> {
        self.interactions.resume_stream(interaction_id).await
    }

    async fn ask_followup(
        &self,
        interaction_id: &str,
        question: &str,
    ) -> Result<ResearchResult, ResearchError> {
        self.interactions.ask_followup(interaction_id, question).await
    }

    fn history(&self, interaction_id: &str) -> Vec<Turn> {
        self.interactions.history(interaction_id)
    }
}

#[async_trait]
impl QuickResearch for ResearchClient {
    async fn quick_search(
        &self,
        query: &str,
        options: &QuickOptions,
    ) -> Result<ResearchResult, ResearchError> {
        self.quick.quick_search(query, options).await
    }

    async fn analyze_urls(
        &self,
        urls: &[String],
        query: &str,
        options: &QuickOptions,
    ) -> Result<ResearchResult, ResearchError> {
        self.quick.analyze_urls(urls, query, options).await
    }

    async fn search_and_analyze(
        &self,
        query: &str,
        urls: &[String],
        options: &QuickOptions,
    ) -> Result<ResearchResult, ResearchError> {
        self.quick.search_and_analyze(query, urls, options).await
    }
}
