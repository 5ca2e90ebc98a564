// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MODELO DE RESULTADOS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Tipos de valor compartilhados pelo núcleo e por todos os front-ends:
// conteúdo + citações, status normalizado, interação e eventos de streaming.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ResearchError;

/// Status de sucesso reportado pelo URL Context para uma URL lida.
pub const URL_RETRIEVAL_SUCCESS: &str = "URL_RETRIEVAL_STATUS_SUCCESS";

/// Fonte citada em um resultado: par `{title, url}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Título da fonte, quando o upstream informa
    pub title: Option<String>,
    /// URL da fonte
    pub url: String,
}

impl Citation {
    /// Cria uma citação.
    pub fn new(url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            title,
            url: url.into(),
        }
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.title {
            Some(title) if !title.is_empty() => write!(f, "{} - {}", title, self.url),
            _ => write!(f, "{}", self.url),
        }
    }
}

/// Trecho da resposta ligado às citações que o sustentam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSupport {
    /// Texto do segmento
    pub text: String,
    /// Offset inicial na resposta
    pub start_index: usize,
    /// Offset final na resposta
    pub end_index: usize,
    /// Índices em `ResearchResult::citations`
    pub citation_indices: Vec<usize>,
}

/// Resultado da leitura de uma URL pelo URL Context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMetadata {
    /// URL efetivamente lida
    pub url: String,
    /// Status de leitura reportado pelo upstream
    pub status: String,
    /// Título, quando disponível
    pub title: Option<String>,
}

impl UrlMetadata {
    /// A URL foi lida com sucesso?
    pub fn is_success(&self) -> bool {
        self.status == URL_RETRIEVAL_SUCCESS
    }
}

// ─────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────

/// Status normalizado de uma interação.
///
/// O vocabulário do upstream varia entre versões; tudo é reduzido a este
/// conjunto fechado por [`InteractionStatus::from_upstream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    /// Aceita, ainda não iniciada
    Pending,
    /// Em execução
    Running,
    /// Concluída com resultado
    Completed,
    /// Falhou no upstream
    Failed,
    /// Cancelada no upstream
    Cancelled,
}

impl InteractionStatus {
    /// Normaliza o status textual do upstream.
    ///
    /// Valores desconhecidos viram `Running`: a tarefa continua viva e nunca
    /// é marcada como terminal por palpite.
    pub fn from_upstream(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" | "queued" | "created" => Self::Pending,
            "in_progress" | "running" | "processing" => Self::Running,
            "completed" | "succeeded" | "done" => Self::Completed,
            "failed" | "error" => Self::Failed,
            "cancelled" | "canceled" => Self::Cancelled,
            other => {
                log::warn!("⚠️ Status desconhecido do upstream '{}', tratando como running", other);
                Self::Running
            }
        }
    }

    /// Nome estável em snake_case
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Estados dos quais o upstream não sai mais
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for InteractionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────
// Resultados
// ─────────────────────────────────────────────────

/// Resultado de pesquisa ou busca: conteúdo + citações ordenadas.
///
/// As citações preservam a ordem do upstream e nunca são deduplicadas
/// implicitamente. Os campos de grounding só são preenchidos pelas
/// operações rápidas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchResult {
    /// Interação de origem (ausente nas operações rápidas)
    pub interaction_id: Option<String>,
    /// Texto do relatório / resposta
    pub content: String,
    /// Citações na ordem do upstream
    pub citations: Vec<Citation>,
    /// Status no momento da construção
    pub status: InteractionStatus,
    /// Queries de busca usadas pelo modelo
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_queries: Vec<String>,
    /// Segmentos ligados a citações
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grounding_supports: Vec<GroundingSupport>,
    /// Metadados de leitura de URL
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub url_metadata: Vec<UrlMetadata>,
    /// Modelo usado (operações rápidas)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ResearchResult {
    /// Cria um resultado concluído.
    pub fn new(content: impl Into<String>, citations: Vec<Citation>) -> Self {
        Self {
            interaction_id: None,
            content: content.into(),
            citations,
            status: InteractionStatus::Completed,
            search_queries: Vec::new(),
            grounding_supports: Vec::new(),
            url_metadata: Vec::new(),
            model: None,
        }
    }

    /// Associa o resultado a uma interação.
    pub fn with_interaction_id(mut self, id: impl Into<String>) -> Self {
        self.interaction_id = Some(id.into());
        self
    }

    /// Registra o modelo que gerou o resultado.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// URLs das citações, na ordem original
    pub fn citation_urls(&self) -> Vec<&str> {
        self.citations.iter().map(|c| c.url.as_str()).collect()
    }
}

/// Status de uma interação com a mensagem de erro do upstream, se houver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchStatus {
    /// Identificador da interação
    pub interaction_id: String,
    /// Status normalizado
    pub status: InteractionStatus,
    /// Mensagem de erro reportada pelo upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ─────────────────────────────────────────────────
// Interação e histórico
// ─────────────────────────────────────────────────

/// Um turno da conversa de pesquisa.
///
/// O primeiro turno é a query original; os seguintes são follow-ups, cada um
/// registrado só depois que a resposta chegou por completo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Pergunta enviada
    pub question: String,
    /// Interação upstream que respondeu este turno
    pub interaction_id: String,
    /// Resposta (ausente no turno inicial enquanto a pesquisa roda)
    pub answer: Option<ResearchResult>,
    /// Momento do registro
    pub recorded_at: DateTime<Utc>,
}

impl Turn {
    /// Cria um turno registrado agora.
    pub fn new(
        question: impl Into<String>,
        interaction_id: impl Into<String>,
        answer: Option<ResearchResult>,
    ) -> Self {
        Self {
            question: question.into(),
            interaction_id: interaction_id.into(),
            answer,
            recorded_at: Utc::now(),
        }
    }
}

/// Representação local de uma tarefa de pesquisa longa.
///
/// Reconstruída a cada consulta a partir do estado do upstream; `result`
/// existe se e somente se `status == Completed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interaction {
    id: String,
    status: InteractionStatus,
    query: Option<String>,
    history: Vec<Turn>,
    result: Option<ResearchResult>,
}

impl Interaction {
    /// Monta uma interação validando o invariante status/resultado.
    pub fn new(
        id: impl Into<String>,
        status: InteractionStatus,
        query: Option<String>,
        history: Vec<Turn>,
        result: Option<ResearchResult>,
    ) -> Result<Self, ResearchError> {
        let id = id.into();
        match (status, result.is_some()) {
            (InteractionStatus::Completed, false) => Err(ResearchError::InvalidState {
                interaction_id: id,
                status,
                message: "completed interaction without a result".into(),
            }),
            (s, true) if s != InteractionStatus::Completed => Err(ResearchError::InvalidState {
                interaction_id: id,
                status,
                message: "result present on an interaction that is not completed".into(),
            }),
            _ => Ok(Self {
                id,
                status,
                query,
                history,
                result,
            }),
        }
    }

    /// Identificador atribuído pelo upstream
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Status normalizado
    pub fn status(&self) -> InteractionStatus {
        self.status
    }

    /// Query original, quando conhecida
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Turnos registrados
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Resultado final (somente quando concluída)
    pub fn result(&self) -> Option<&ResearchResult> {
        self.result.as_ref()
    }
}

// ─────────────────────────────────────────────────
// Streaming e desfechos
// ─────────────────────────────────────────────────

/// Unidade incremental emitida durante uma pesquisa em streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// O upstream atribuiu o id da interação
    Started {
        /// Id atribuído
        interaction_id: String,
    },
    /// Resumo de raciocínio do agente
    Thought {
        /// Texto do resumo
        text: String,
    },
    /// Fragmento de conteúdo do relatório
    ContentDelta {
        /// Texto do fragmento
        text: String,
    },
    /// Evento terminal de sucesso
    Completed {
        /// Resultado final
        result: ResearchResult,
    },
    /// Evento terminal de falha reportada pelo upstream
    Failed {
        /// Id, se já atribuído
        interaction_id: Option<String>,
        /// Código do upstream
        code: Option<String>,
        /// Mensagem do upstream
        message: String,
    },
}

impl StreamEvent {
    /// Eventos após os quais o stream termina
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Desfecho de `research()` / `wait_for_completion()`.
///
/// Todos os casos carregam o id da interação: um timeout local ou um
/// cancelamento nunca "perdem" a tarefa submetida.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResearchOutcome {
    /// Concluída com resultado
    Completed {
        /// Id da interação
        interaction_id: String,
        /// Resultado final
        result: ResearchResult,
    },
    /// Terminou sem resultado (failed ou cancelled no upstream)
    Failed {
        /// Id da interação
        interaction_id: String,
        /// Status terminal observado
        status: InteractionStatus,
        /// Mensagem do upstream
        error: Option<String>,
    },
    /// Teto local atingido; a tarefa segue rodando no upstream
    TimedOut {
        /// Id da interação
        interaction_id: String,
        /// Último status observado
        last_status: InteractionStatus,
        /// Tempo aguardado em segundos
        elapsed_secs: u64,
    },
    /// Espera local cancelada pelo chamador
    Cancelled {
        /// Id da interação
        interaction_id: String,
        /// Último status observado
        last_status: InteractionStatus,
    },
}

impl ResearchOutcome {
    /// Id da interação em qualquer desfecho
    pub fn interaction_id(&self) -> &str {
        match self {
            Self::Completed { interaction_id, .. }
            | Self::Failed { interaction_id, .. }
            | Self::TimedOut { interaction_id, .. }
            | Self::Cancelled { interaction_id, .. } => interaction_id,
        }
    }

    /// Resultado, quando concluída
    pub fn result(&self) -> Option<&ResearchResult> {
        match self {
            Self::Completed { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Consome o desfecho devolvendo o resultado, quando concluída
    pub fn into_result(self) -> Option<ResearchResult> {
        match self {
            Self::Completed { result, .. } => Some(result),
            _ => None,
        }
    }
}
