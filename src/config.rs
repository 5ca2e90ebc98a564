// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CONFIGURAÇÃO DO CLIENTE E OPÇÕES DE PESQUISA
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// O núcleo recebe a credencial explicitamente em `ClientConfig`; somente os
// front-ends leem variáveis de ambiente (via `load_client_config`).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ResearchError;
use crate::poll::BackoffSchedule;

/// Endpoint padrão da Gemini API
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Agente de deep research
pub const DEFAULT_AGENT: &str = "deep-research-pro-preview-12-2025";

/// Sessões de follow-up mantidas em memória antes de descartar as mais antigas
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

// ─────────────────────────────────────────────────
// Modelos
// ─────────────────────────────────────────────────

/// Variantes de modelo aceitas pelas operações rápidas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelVariant {
    /// Rápido e barato (padrão)
    #[default]
    #[serde(rename = "gemini-3-flash-preview")]
    Gemini3Flash,
    /// Mais capaz
    #[serde(rename = "gemini-3-pro-preview")]
    Gemini3Pro,
}

impl ModelVariant {
    /// Todas as variantes, na ordem de exibição
    pub const ALL: [ModelVariant; 2] = [ModelVariant::Gemini3Flash, ModelVariant::Gemini3Pro];

    /// Nome do modelo na API
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini3Flash => "gemini-3-flash-preview",
            Self::Gemini3Pro => "gemini-3-pro-preview",
        }
    }

    /// Descrição curta para listagens
    pub fn description(&self) -> &'static str {
        match self {
            Self::Gemini3Flash => "Fast grounded answers (default)",
            Self::Gemini3Pro => "Higher quality, slower grounded answers",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelVariant {
    type Err = ResearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "gemini-3-flash-preview" | "flash" => Ok(Self::Gemini3Flash),
            "gemini-3-pro-preview" | "pro" => Ok(Self::Gemini3Pro),
            other => Err(ResearchError::Configuration(format!(
                "unsupported model '{}' (expected one of: {})",
                other,
                Self::ALL.map(|m| m.as_str()).join(", ")
            ))),
        }
    }
}

// ─────────────────────────────────────────────────
// Idioma
// ─────────────────────────────────────────────────

static LANGUAGE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z0-9]{2,8})*$").expect("language tag regex must compile")
});

fn validate_language(tag: &str) -> Result<(), ResearchError> {
    if LANGUAGE_TAG.is_match(tag) {
        Ok(())
    } else {
        Err(ResearchError::Validation(format!(
            "invalid language tag '{}' (expected e.g. 'ja', 'en', 'pt-BR')",
            tag
        )))
    }
}

fn language_name(tag: &str) -> Option<&'static str> {
    let primary = tag.split('-').next().unwrap_or(tag).to_ascii_lowercase();
    let name = match primary.as_str() {
        "en" => "English",
        "pt" => "Portuguese",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "zh" => "Chinese",
        "ko" => "Korean",
        _ => return None,
    };
    Some(name)
}

/// Instrução de idioma prefixada ao prompt.
///
/// `with_thoughts` estende a instrução aos resumos de raciocínio (deep research).
pub fn language_instruction(tag: &str, with_thoughts: bool) -> String {
    if tag.eq_ignore_ascii_case("ja") || tag.to_ascii_lowercase().starts_with("ja-") {
        return if with_thoughts {
            "必ず日本語で回答してください。推論過程や思考の要約も日本語で出力してください。".into()
        } else {
            "必ず日本語で回答してください。".into()
        };
    }

    let target = language_name(tag)
        .map(str::to_string)
        .unwrap_or_else(|| format!("the language identified by '{}'", tag));
    if with_thoughts {
        format!(
            "Always answer in {}. Write your reasoning and thought summaries in {} as well.",
            target, target
        )
    } else {
        format!("Always answer in {}.", target)
    }
}

// ─────────────────────────────────────────────────
// Opções por chamada
// ─────────────────────────────────────────────────

/// Opções de deep research. Chaves desconhecidas são rejeitadas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResearchOptions {
    /// Texto livre que orienta o formato do relatório
    pub format_instructions: Option<String>,
    /// Idioma da resposta (tag de locale)
    pub language: Option<String>,
}

impl ResearchOptions {
    /// Define instruções de formato.
    pub fn with_format_instructions(mut self, text: impl Into<String>) -> Self {
        self.format_instructions = Some(text.into());
        self
    }

    /// Define o idioma.
    pub fn with_language(mut self, tag: impl Into<String>) -> Self {
        self.language = Some(tag.into());
        self
    }

    /// Constrói a partir de JSON, rejeitando chaves desconhecidas.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ResearchError> {
        serde_json::from_value(value)
            .map_err(|e| ResearchError::Configuration(format!("invalid research options: {}", e)))
    }

    /// Valida localmente.
    pub fn validate(&self) -> Result<(), ResearchError> {
        if let Some(tag) = &self.language {
            validate_language(tag)?;
        }
        Ok(())
    }

    /// Monta o input: instrução de idioma, query e instruções de formato.
    pub fn compose_input(&self, query: &str) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(tag) = &self.language {
            parts.push(language_instruction(tag, true));
        }
        parts.push(query.to_string());
        if let Some(format) = self.format_instructions.as_deref().filter(|f| !f.trim().is_empty()) {
            parts.push(format.to_string());
        }
        parts.join("\n\n")
    }
}

/// Opções das operações rápidas. Chaves desconhecidas são rejeitadas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuickOptions {
    /// Modelo (padrão: o do `ClientConfig`)
    pub model: Option<ModelVariant>,
    /// Idioma da resposta
    pub language: Option<String>,
}

impl QuickOptions {
    /// Define o modelo.
    pub fn with_model(mut self, model: ModelVariant) -> Self {
        self.model = Some(model);
        self
    }

    /// Define o idioma.
    pub fn with_language(mut self, tag: impl Into<String>) -> Self {
        self.language = Some(tag.into());
        self
    }

    /// Constrói a partir de JSON, rejeitando chaves e modelos desconhecidos.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ResearchError> {
        serde_json::from_value(value)
            .map_err(|e| ResearchError::Configuration(format!("invalid quick options: {}", e)))
    }

    /// Valida localmente.
    pub fn validate(&self) -> Result<(), ResearchError> {
        if let Some(tag) = &self.language {
            validate_language(tag)?;
        }
        Ok(())
    }

    /// Prefixa a instrução de idioma, se houver.
    pub fn compose_prompt(&self, body: &str) -> String {
        match &self.language {
            Some(tag) => format!("{}\n\n{}", language_instruction(tag, false), body),
            None => body.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────
// Configuração do cliente
// ─────────────────────────────────────────────────

/// Política do loop de espera de `research()`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    /// Agenda de backoff entre consultas
    pub backoff: BackoffSchedule,
    /// Teto total de espera
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffSchedule::default(),
            timeout: Duration::from_secs(3600),
        }
    }
}

/// Configuração explícita do cliente.
#[derive(Clone)]
pub struct ClientConfig {
    api_key: String,
    /// URL base da API
    pub base_url: String,
    /// Agente de deep research
    pub agent: String,
    /// Modelo padrão das operações rápidas
    pub default_model: ModelVariant,
    /// Teto de cada chamada de interação
    pub request_timeout: Duration,
    /// Teto de cada operação rápida
    pub quick_timeout: Duration,
    /// Teto de conexão
    pub connect_timeout: Duration,
    /// Teto de inatividade entre eventos de streaming
    pub stream_idle_timeout: Duration,
    /// Política de polling
    pub poll: PollConfig,
    /// Limite do cache local de sessões (histórico de follow-ups)
    pub max_sessions: usize,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("agent", &self.agent)
            .field("default_model", &self.default_model)
            .field("request_timeout", &self.request_timeout)
            .field("quick_timeout", &self.quick_timeout)
            .field("stream_idle_timeout", &self.stream_idle_timeout)
            .field("poll", &self.poll)
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

impl ClientConfig {
    /// Cria a configuração com a credencial explícita.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ResearchError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ResearchError::Configuration("API key must not be empty".into()));
        }
        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.into(),
            agent: DEFAULT_AGENT.into(),
            default_model: ModelVariant::default(),
            request_timeout: Duration::from_secs(120),
            quick_timeout: Duration::from_secs(300),
            connect_timeout: Duration::from_secs(10),
            stream_idle_timeout: Duration::from_secs(300),
            poll: PollConfig::default(),
            max_sessions: DEFAULT_MAX_SESSIONS,
        })
    }

    /// Credencial
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Troca a URL base.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Troca a política de polling.
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}

/// Carrega a configuração a partir do ambiente (uso exclusivo dos front-ends).
///
/// Variáveis suportadas:
/// - `GEMINI_API_KEY` (obrigatória)
/// - `GEMINI_API_BASE_URL`, `GEMINI_RESEARCH_AGENT`, `GEMINI_DEFAULT_MODEL`
/// - `GEMINI_HTTP_TIMEOUT_SECS`, `GEMINI_QUICK_TIMEOUT_SECS`, `GEMINI_STREAM_IDLE_SECS`
/// - `RESEARCH_POLL_INITIAL_SECS`, `RESEARCH_POLL_MAX_SECS`, `RESEARCH_TIMEOUT_SECS`
///
/// Números inválidos são ignorados com aviso.
pub fn load_client_config() -> Result<ClientConfig, ResearchError> {
    load_client_config_from(|key| std::env::var(key).ok())
}

/// Variante de [`load_client_config`] com lookup injetável.
pub fn load_client_config_from<F>(lookup: F) -> Result<ClientConfig, ResearchError>
where
    F: Fn(&str) -> Option<String>,
{
    let api_key = lookup("GEMINI_API_KEY").unwrap_or_default();
    if api_key.trim().is_empty() {
        return Err(ResearchError::Configuration(
            "GEMINI_API_KEY is not set. Export it or pass --api-key".into(),
        ));
    }
    let mut config = ClientConfig::new(api_key)?;

    if let Some(url) = lookup("GEMINI_API_BASE_URL").filter(|v| !v.trim().is_empty()) {
        config = config.with_base_url(url.trim());
        log::info!("📦 GEMINI_API_BASE_URL={}", config.base_url);
    }

    if let Some(agent) = lookup("GEMINI_RESEARCH_AGENT").filter(|v| !v.trim().is_empty()) {
        config.agent = agent.trim().to_string();
        log::info!("📦 GEMINI_RESEARCH_AGENT={}", config.agent);
    }

    if let Some(model) = lookup("GEMINI_DEFAULT_MODEL") {
        match model.parse::<ModelVariant>() {
            Ok(m) => {
                config.default_model = m;
                log::info!("📦 GEMINI_DEFAULT_MODEL={}", m);
            }
            Err(e) => log::warn!("⚠️ GEMINI_DEFAULT_MODEL ignorado: {}", e),
        }
    }

    let secs = |key: &str| -> Option<Duration> {
        let raw = lookup(key)?;
        match raw.trim().parse::<u64>() {
            Ok(v) if v > 0 => {
                log::info!("📦 {}={}", key, v);
                Some(Duration::from_secs(v))
            }
            _ => {
                log::warn!("⚠️ {} inválido ('{}'), usando padrão", key, raw);
                None
            }
        }
    };

    if let Some(d) = secs("GEMINI_HTTP_TIMEOUT_SECS") {
        config.request_timeout = d;
    }
    if let Some(d) = secs("GEMINI_QUICK_TIMEOUT_SECS") {
        config.quick_timeout = d;
    }
    if let Some(d) = secs("GEMINI_STREAM_IDLE_SECS") {
        config.stream_idle_timeout = d;
    }
    if let Some(d) = secs("RESEARCH_POLL_INITIAL_SECS") {
        config.poll.backoff.initial = d;
    }
    if let Some(d) = secs("RESEARCH_POLL_MAX_SECS") {
        config.poll.backoff.max = d;
    }
    if let Some(d) = secs("RESEARCH_TIMEOUT_SECS") {
        config.poll.timeout = d;
    }

    if let Some(raw) = lookup("RESEARCH_MAX_SESSIONS") {
        match raw.trim().parse::<usize>() {
            Ok(v) if v > 0 => {
                config.max_sessions = v;
                log::info!("📦 RESEARCH_MAX_SESSIONS={}", v);
            }
            _ => log::warn!("⚠️ RESEARCH_MAX_SESSIONS inválido ('{}'), usando padrão", raw),
        }
    }

    if config.poll.backoff.max < config.poll.backoff.initial {
        log::warn!("⚠️ RESEARCH_POLL_MAX_SECS menor que o intervalo inicial, igualando");
        config.poll.backoff.max = config.poll.backoff.initial;
    }

    Ok(config)
}

/// Instala panic hook que registra o panic via `log` em vez de stderr.
///
/// Panics em tasks Tokio ficam isolados na task (o runtime devolve
/// `JoinError`); o hook só garante que a mensagem chegue ao logger.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");

        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_else(|| "unknown location".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic payload".to_string()
        };

        log::error!("[PANIC] Thread {} at {}: {}", thread_name, location, message);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_model_variant_parse() {
        assert_eq!("gemini-3-pro-preview".parse::<ModelVariant>().unwrap(), ModelVariant::Gemini3Pro);
        assert_eq!("flash".parse::<ModelVariant>().unwrap(), ModelVariant::Gemini3Flash);
        let err = "gpt-4".parse::<ModelVariant>().unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn test_research_options_reject_unknown_keys() {
        let ok = ResearchOptions::from_json(serde_json::json!({
            "format_instructions": "Include a comparison table",
            "language": "ja"
        }))
        .unwrap();
        assert_eq!(ok.language.as_deref(), Some("ja"));

        let err = ResearchOptions::from_json(serde_json::json!({ "temperature": 0.3 })).unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn test_quick_options_reject_unknown_model() {
        let err = QuickOptions::from_json(serde_json::json!({ "model": "gemini-1.0" })).unwrap_err();
        assert_eq!(err.kind(), "configuration");

        let ok = QuickOptions::from_json(serde_json::json!({ "model": "gemini-3-pro-preview" })).unwrap();
        assert_eq!(ok.model, Some(ModelVariant::Gemini3Pro));
    }

    #[test]
    fn test_compose_input_order() {
        let options = ResearchOptions::default()
            .with_language("ja")
            .with_format_instructions("Include a comparison table");
        let input = options.compose_input("EV batteries");
        let parts: Vec<&str> = input.split("\n\n").collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[0].starts_with("必ず日本語で回答してください。"));
        assert!(parts[0].contains("思考の要約"));
        assert_eq!(parts[1], "EV batteries");
        assert_eq!(parts[2], "Include a comparison table");

        assert_eq!(ResearchOptions::default().compose_input("q"), "q");
    }

    #[test]
    fn test_language_validation() {
        assert!(ResearchOptions::default().with_language("pt-BR").validate().is_ok());
        let err = QuickOptions::default().with_language("日本").validate().unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_quick_prompt_english_instruction() {
        let prompt = QuickOptions::default().with_language("en").compose_prompt("hello");
        assert_eq!(prompt, "Always answer in English.\n\nhello");
    }

    #[test]
    fn test_client_config_requires_key() {
        assert!(ClientConfig::new("  ").is_err());
        let config = ClientConfig::new("k").unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.agent, DEFAULT_AGENT);
        assert_eq!(config.poll.timeout, Duration::from_secs(3600));
        assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
        assert!(!format!("{:?}", config).contains("\"k\""));
    }

    #[test]
    fn test_load_from_env_lookup() {
        let config = load_client_config_from(env(&[
            ("GEMINI_API_KEY", "secret"),
            ("GEMINI_API_BASE_URL", "http://localhost:9999/v1beta/"),
            ("RESEARCH_POLL_INITIAL_SECS", "2"),
            ("RESEARCH_TIMEOUT_SECS", "abc"),
            ("GEMINI_DEFAULT_MODEL", "gemini-3-pro-preview"),
            ("RESEARCH_MAX_SESSIONS", "50"),
        ]))
        .unwrap();
        assert_eq!(config.api_key(), "secret");
        assert_eq!(config.base_url, "http://localhost:9999/v1beta");
        assert_eq!(config.poll.backoff.initial, Duration::from_secs(2));
        assert_eq!(config.poll.timeout, Duration::from_secs(3600));
        assert_eq!(config.default_model, ModelVariant::Gemini3Pro);
        assert_eq!(config.max_sessions, 50);
    }

    #[test]
    fn test_load_without_key_fails() {
        let err = load_client_config_from(env(&[])).unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }
}
