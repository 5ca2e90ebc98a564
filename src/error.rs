// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TAXONOMIA DE ERROS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Um único enum para o núcleo e o cliente rápido. Cada variante preserva o
// que o chamador precisa para decidir entre "tentar de novo", "ressubmeter"
// ou "retomar depois com o id".
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::types::InteractionStatus;

/// Erros do cliente de pesquisa
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResearchError {
    /// Pré-condição local violada; nenhuma chamada de rede foi feita
    #[error("validation error: {0}")]
    Validation(String),

    /// Opção desconhecida, modelo inválido ou credencial ausente
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Credencial recusada; nunca é repetida
    #[error("authentication failed{}{}: {message}", describe(.status, &None), describe_id(.interaction_id))]
    Auth {
        /// Id já atribuído, quando a falha veio depois da submissão
        interaction_id: Option<String>,
        /// Status HTTP
        status: Option<u16>,
        /// Mensagem do upstream
        message: String,
    },

    /// Upstream recusou (ou pode não ter recebido) uma nova tarefa
    #[error("submission failed{}: {message}", describe(.status, .code))]
    Submission {
        /// Status HTTP
        status: Option<u16>,
        /// Código do upstream
        code: Option<String>,
        /// Mensagem do upstream
        message: String,
        /// A tarefa pode ter sido criada mesmo assim (timeout, rede, 5xx)
        outcome_unknown: bool,
    },

    /// Id desconhecido pelo upstream
    #[error("interaction {interaction_id} not found: {message}")]
    NotFound {
        /// Id consultado
        interaction_id: String,
        /// Mensagem do upstream
        message: String,
    },

    /// Resultado pedido antes da conclusão
    #[error("interaction {interaction_id} is not ready (status: {status})")]
    NotReady {
        /// Id consultado
        interaction_id: String,
        /// Status atual
        status: InteractionStatus,
    },

    /// Operação inválida para o status atual
    #[error("invalid state for interaction {interaction_id} ({status}): {message}")]
    InvalidState {
        /// Id consultado
        interaction_id: String,
        /// Status atual
        status: InteractionStatus,
        /// Motivo
        message: String,
    },

    /// Rede ou timeout numa chamada de leitura; seguro repetir
    #[error("transient error{}: {message}", describe_id(.interaction_id))]
    Transient {
        /// Id envolvido, se houver
        interaction_id: Option<String>,
        /// Detalhe
        message: String,
    },

    /// Stream caiu no meio; use o id para voltar ao polling
    #[error("stream interrupted{}: {message}", describe_id(.interaction_id))]
    StreamInterrupted {
        /// Id já atribuído, se o evento inicial chegou
        interaction_id: Option<String>,
        /// Último event_id recebido
        last_event_id: Option<String>,
        /// Detalhe
        message: String,
    },

    /// Falha bem-formada reportada pelo upstream
    #[error("upstream error{}{}: {message}", describe(.status, .code), describe_id(.interaction_id))]
    Upstream {
        /// Id envolvido, se houver
        interaction_id: Option<String>,
        /// Status HTTP
        status: Option<u16>,
        /// Código do upstream
        code: Option<String>,
        /// Mensagem do upstream
        message: String,
    },
}

fn describe(status: &Option<u16>, code: &Option<String>) -> String {
    match (status, code) {
        (Some(s), Some(c)) => format!(" (HTTP {}, {})", s, c),
        (Some(s), None) => format!(" (HTTP {})", s),
        (None, Some(c)) => format!(" ({})", c),
        (None, None) => String::new(),
    }
}

fn describe_id(id: &Option<String>) -> String {
    id.as_ref()
        .map(|id| format!(" [interaction {}]", id))
        .unwrap_or_default()
}

impl ResearchError {
    /// Tag estável em snake_case, usada pelos front-ends
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Configuration(_) => "configuration",
            Self::Auth { .. } => "auth",
            Self::Submission { .. } => "submission",
            Self::NotFound { .. } => "not_found",
            Self::NotReady { .. } => "not_ready",
            Self::InvalidState { .. } => "invalid_state",
            Self::Transient { .. } => "transient",
            Self::StreamInterrupted { .. } => "stream_interrupted",
            Self::Upstream { .. } => "upstream",
        }
    }

    /// Só erros transitórios são elegíveis para retry automático
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Id da interação, quando o erro tem um
    pub fn interaction_id(&self) -> Option<&str> {
        match self {
            Self::NotFound { interaction_id, .. }
            | Self::NotReady { interaction_id, .. }
            | Self::InvalidState { interaction_id, .. } => Some(interaction_id),
            Self::Auth { interaction_id, .. }
            | Self::Transient { interaction_id, .. }
            | Self::StreamInterrupted { interaction_id, .. }
            | Self::Upstream { interaction_id, .. } => interaction_id.as_deref(),
            _ => None,
        }
    }

    /// Código do upstream, quando presente
    pub fn upstream_code(&self) -> Option<&str> {
        match self {
            Self::Submission { code, .. } | Self::Upstream { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Anexa o id da interação aos erros que ainda não o carregam.
    pub fn with_interaction_id(self, id: &str) -> Self {
        match self {
            Self::Auth {
                interaction_id: None,
                status,
                message,
            } => Self::Auth {
                interaction_id: Some(id.to_string()),
                status,
                message,
            },
            Self::Transient {
                interaction_id: None,
                message,
            } => Self::Transient {
                interaction_id: Some(id.to_string()),
                message,
            },
            Self::Upstream {
                interaction_id: None,
                status,
                code,
                message,
            } => Self::Upstream {
                interaction_id: Some(id.to_string()),
                status,
                code,
                message,
            },
            Self::StreamInterrupted {
                interaction_id: None,
                last_event_id,
                message,
            } => Self::StreamInterrupted {
                interaction_id: Some(id.to_string()),
                last_event_id,
                message,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        let transient = ResearchError::Transient {
            interaction_id: Some("int-1".into()),
            message: "timeout".into(),
        };
        assert!(transient.is_retryable());

        let submission = ResearchError::Submission {
            status: Some(503),
            code: None,
            message: "unavailable".into(),
            outcome_unknown: true,
        };
        assert!(!submission.is_retryable());
        assert!(!ResearchError::Validation("x".into()).is_retryable());
    }

    #[test]
    fn test_display_keeps_upstream_detail() {
        let err = ResearchError::Upstream {
            interaction_id: Some("int-7".into()),
            status: Some(400),
            code: Some("INVALID_ARGUMENT".into()),
            message: "bad input".into(),
        };
        let text = err.to_string();
        assert!(text.contains("HTTP 400"));
        assert!(text.contains("INVALID_ARGUMENT"));
        assert!(text.contains("int-7"));
        assert!(text.contains("bad input"));
        assert_eq!(err.upstream_code(), Some("INVALID_ARGUMENT"));
    }

    #[test]
    fn test_with_interaction_id_fills_missing_id() {
        let err = ResearchError::StreamInterrupted {
            interaction_id: None,
            last_event_id: Some("ev-3".into()),
            message: "eof".into(),
        }
        .with_interaction_id("int-2");
        assert_eq!(err.interaction_id(), Some("int-2"));
        assert_eq!(err.kind(), "stream_interrupted");
    }

    #[test]
    fn test_auth_error_keeps_assigned_id() {
        let err = ResearchError::Auth {
            interaction_id: None,
            status: Some(403),
            message: "permission denied".into(),
        }
        .with_interaction_id("int-9");
        assert_eq!(err.interaction_id(), Some("int-9"));
        assert!(err.to_string().contains("int-9"));
        assert!(!err.is_retryable());
    }
}
