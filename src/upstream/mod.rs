// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// FRONTEIRA COM O UPSTREAM (GEMINI API)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// `UpstreamApi` é o único ponto de contato com a rede. O núcleo depende só da
// trait; `GeminiHttpApi` é a implementação real e `MockUpstream` a roteirizada.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod http;
pub mod mock;
pub mod sse;
pub mod wire;

use async_trait::async_trait;
use futures::stream::BoxStream;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ResearchError;

pub use http::GeminiHttpApi;
pub use mock::{InteractionScript, MockCalls, MockUpstream};
pub use sse::{InteractionEvent, SseStreamParser, StreamFrame};
pub use wire::{
    CreateInteractionRequest, GenerateContentRequest, GenerateContentResponse, InteractionResource,
};

/// Stream de frames SSE já parseados.
pub type RawEventStream = BoxStream<'static, Result<StreamFrame, ApiFailure>>;

/// Falha de transporte, antes de ser classificada pelo núcleo.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiFailure {
    /// Resposta HTTP de erro
    #[error("HTTP {status}: {message}")]
    Status {
        /// Status HTTP
        status: u16,
        /// Status textual do corpo de erro (`NOT_FOUND`, ...)
        code: Option<String>,
        /// Mensagem
        message: String,
    },

    /// Teto de tempo da chamada atingido
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Falha de conexão
    #[error("network error: {0}")]
    Network(String),

    /// Corpo fora do formato esperado
    #[error("invalid response: {0}")]
    Decode(String),
}

static TRANSIENT_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)rate.?limit|overloaded|service.?unavailable|try again later|upstream.?connect|connection.?(refused|reset)")
        .expect("transient regex must compile")
});

impl ApiFailure {
    /// Falhas seguras para repetir numa chamada de leitura.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, message, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
                    || TRANSIENT_TEXT.is_match(message)
            }
            Self::Timeout(_) | Self::Network(_) => true,
            Self::Decode(_) => false,
        }
    }

    fn is_auth(&self) -> bool {
        match self {
            Self::Status { status: 401 | 403, .. } => true,
            // A Gemini API responde 400 para chave inválida
            Self::Status {
                status: 400,
                message,
                ..
            } => message.contains("API key"),
            _ => false,
        }
    }

    fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn code(&self) -> Option<String> {
        match self {
            Self::Status { code, .. } => code.clone(),
            _ => None,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    fn auth_error(&self, interaction_id: Option<&str>) -> ResearchError {
        ResearchError::Auth {
            interaction_id: interaction_id.map(str::to_string),
            status: self.status(),
            message: self.message(),
        }
    }

    /// Classificação para chamadas de leitura sobre uma interação.
    pub fn into_read_error(self, interaction_id: &str) -> ResearchError {
        if self.is_auth() {
            return self.auth_error(Some(interaction_id));
        }
        if self.status() == Some(404) {
            return ResearchError::NotFound {
                interaction_id: interaction_id.to_string(),
                message: self.message(),
            };
        }
        if self.is_transient() {
            return ResearchError::Transient {
                interaction_id: Some(interaction_id.to_string()),
                message: self.to_string(),
            };
        }
        ResearchError::Upstream {
            interaction_id: Some(interaction_id.to_string()),
            status: self.status(),
            code: self.code(),
            message: self.message(),
        }
    }

    /// Classificação para chamadas que criam tarefa. Nunca transitória: o
    /// chamador decide se ressubmete.
    pub fn into_submission_error(self) -> ResearchError {
        if self.is_auth() {
            return self.auth_error(None);
        }
        let outcome_unknown = match &self {
            Self::Timeout(_) | Self::Network(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode(_) => true,
        };
        ResearchError::Submission {
            status: self.status(),
            code: self.code(),
            message: self.message(),
            outcome_unknown,
        }
    }

    /// Classificação para follow-ups: 404 aponta para a interação anterior.
    pub fn into_followup_error(self, previous_interaction_id: &str) -> ResearchError {
        if self.is_auth() {
            return self.auth_error(Some(previous_interaction_id));
        }
        if self.status() == Some(404) {
            return ResearchError::NotFound {
                interaction_id: previous_interaction_id.to_string(),
                message: self.message(),
            };
        }
        self.into_submission_error()
    }

    /// Classificação para operações rápidas (sem id).
    pub fn into_quick_error(self) -> ResearchError {
        if self.is_auth() {
            return self.auth_error(None);
        }
        if self.is_transient() {
            return ResearchError::Transient {
                interaction_id: None,
                message: self.to_string(),
            };
        }
        ResearchError::Upstream {
            interaction_id: None,
            status: self.status(),
            code: self.code(),
            message: self.message(),
        }
    }
}

/// Operações do upstream usadas pelo núcleo.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// `POST /interactions`
    async fn create_interaction(
        &self,
        request: &CreateInteractionRequest,
    ) -> Result<InteractionResource, ApiFailure>;

    /// `GET /interactions/{id}`
    async fn get_interaction(&self, interaction_id: &str) -> Result<InteractionResource, ApiFailure>;

    /// `POST /interactions?alt=sse`: cria a tarefa e abre o stream
    async fn stream_interaction(
        &self,
        request: &CreateInteractionRequest,
    ) -> Result<RawEventStream, ApiFailure>;

    /// `GET /interactions/{id}?stream=true`: stream a partir da posição atual
    async fn resume_interaction_stream(
        &self,
        interaction_id: &str,
    ) -> Result<RawEventStream, ApiFailure>;

    /// `POST /models/{model}:generateContent`
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ApiFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16, message: &str) -> ApiFailure {
        ApiFailure::Status {
            status: code,
            code: None,
            message: message.into(),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(status(429, "quota").is_transient());
        assert!(status(503, "x").is_transient());
        assert!(status(400, "model is overloaded").is_transient());
        assert!(!status(400, "bad request").is_transient());
        assert!(ApiFailure::Timeout("30s".into()).is_transient());
        assert!(!ApiFailure::Decode("eof".into()).is_transient());
    }

    #[test]
    fn test_read_error_mapping() {
        assert_eq!(status(404, "gone").into_read_error("int-1").kind(), "not_found");
        let denied = status(403, "denied").into_read_error("int-1");
        assert_eq!(denied.kind(), "auth");
        assert_eq!(denied.interaction_id(), Some("int-1"));
        assert_eq!(
            status(400, "API key not valid. Please pass a valid API key.")
                .into_read_error("int-1")
                .kind(),
            "auth"
        );
        let transient = ApiFailure::Network("reset".into()).into_read_error("int-1");
        assert!(transient.is_retryable());
        assert_eq!(transient.interaction_id(), Some("int-1"));
        assert_eq!(status(400, "bad").into_read_error("int-1").kind(), "upstream");
    }

    #[test]
    fn test_submission_error_never_transient() {
        match ApiFailure::Timeout("120s".into()).into_submission_error() {
            ResearchError::Submission {
                outcome_unknown, ..
            } => assert!(outcome_unknown),
            other => panic!("unexpected {:?}", other),
        }
        match status(400, "bad query").into_submission_error() {
            ResearchError::Submission {
                outcome_unknown,
                status,
                ..
            } => {
                assert!(!outcome_unknown);
                assert_eq!(status, Some(400));
            }
            other => panic!("unexpected {:?}", other),
        }
        let unauthenticated = status(401, "no").into_submission_error();
        assert_eq!(unauthenticated.kind(), "auth");
        assert_eq!(unauthenticated.interaction_id(), None);
        assert_eq!(
            status(401, "no").into_followup_error("int-4").interaction_id(),
            Some("int-4")
        );
    }

    #[test]
    fn test_followup_not_found() {
        let err = status(404, "unknown").into_followup_error("int-5");
        assert_eq!(err.kind(), "not_found");
        assert_eq!(err.interaction_id(), Some("int-5"));
    }
}
