//! # Ferramentas para Agentes
//!
//! Liga as operações de pesquisa a frameworks de agentes: cada ferramenta
//! tem um JSON Schema e é invocada por nome com argumentos JSON.
//!
//! ## Componentes
//!
//! - [`ResearchToolbox`]: despacho por nome, sempre devolvendo JSON
//! - [`ToolSpec`]: nome, descrição e schema de parâmetros
//!
//! Falhas nunca viram erro Rust em [`ResearchToolbox::invoke`]: voltam como
//! `{"error", "error_kind", "interaction_id"?}` para o agente decidir o
//! próximo passo.

mod specs;

use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::client::ResearchBackend;
use crate::config::{ModelVariant, QuickOptions, ResearchOptions};
use crate::error::ResearchError;
use crate::interaction::WaitOptions;
use crate::types::StreamEvent;

pub use specs::{tool_specs, ToolSpec};

// ─────────────────────────────────────────────────
// Argumentos
// ─────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeepResearchArgs {
    query: String,
    #[serde(default)]
    format_instructions: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default = "default_true")]
    wait_for_completion: bool,
    /// Segundos
    #[serde(default)]
    timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResearchArgs {
    query: String,
    #[serde(default)]
    format_instructions: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

impl ResearchArgs {
    fn options(&self) -> ResearchOptions {
        ResearchOptions {
            format_instructions: self.format_instructions.clone(),
            language: self.language.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InteractionArgs {
    interaction_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FollowupArgs {
    previous_interaction_id: String,
    question: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QuickArgs {
    query: String,
    #[serde(default)]
    urls: Vec<String>,
    #[serde(default)]
    model: Option<ModelVariant>,
    #[serde(default)]
    language: Option<String>,
}

impl QuickArgs {
    fn options(&self) -> QuickOptions {
        QuickOptions {
            model: self.model,
            language: self.language.clone(),
        }
    }
}

fn parse<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ResearchError> {
    // `null` equivale a nenhum argumento
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args)
        .map_err(|e| ResearchError::Configuration(format!("invalid arguments for {}: {}", tool, e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}

/// Corpo JSON de erro devolvido ao agente.
pub fn error_json(error: &ResearchError) -> Value {
    let mut body = json!({
        "error": error.to_string(),
        "error_kind": error.kind(),
    });
    if let Some(id) = error.interaction_id() {
        body["interaction_id"] = json!(id);
    }
    if let Some(code) = error.upstream_code() {
        body["upstream_code"] = json!(code);
    }
    body
}

// ─────────────────────────────────────────────────
// Toolbox
// ─────────────────────────────────────────────────

/// Despacho das ferramentas de pesquisa.
pub struct ResearchToolbox {
    backend: Arc<dyn ResearchBackend>,
}

impl ResearchToolbox {
    /// Cria o toolbox sobre um backend.
    pub fn new(backend: Arc<dyn ResearchBackend>) -> Self {
        Self { backend }
    }

    /// Specs de todas as ferramentas.
    pub fn specs(&self) -> Vec<ToolSpec> {
        tool_specs()
    }

    /// Invoca uma ferramenta. Erros voltam como JSON.
    pub async fn invoke(&self, name: &str, args: Value) -> Value {
        log::info!("🔧 Tool: {}", name);
        match self.try_invoke(name, args).await {
            Ok(value) => value,
            Err(e) => {
                log::warn!("⚠️ Tool {} falhou: {}", name, e);
                error_json(&e)
            }
        }
    }

    /// Invoca uma ferramenta propagando o erro.
    pub async fn try_invoke(&self, name: &str, args: Value) -> Result<Value, ResearchError> {
        match name {
            "deep_research" => {
                let a: DeepResearchArgs = parse(name, args)?;
                let options = ResearchOptions {
                    format_instructions: a.format_instructions,
                    language: a.language,
                };
                if !a.wait_for_completion {
                    let id = self.backend.start_research(&a.query, &options).await?;
                    return Ok(json!({ "interaction_id": id, "outcome": "submitted" }));
                }
                let wait = WaitOptions {
                    timeout: a.timeout.map(Duration::from_secs),
                    ..Default::default()
                };
                let outcome = self.backend.research(&a.query, &options, wait).await?;
                Ok(to_json(&outcome))
            }
            "start_deep_research" => {
                let a: ResearchArgs = parse(name, args)?;
                let id = self.backend.start_research(&a.query, &a.options()).await?;
                Ok(json!({ "interaction_id": id }))
            }
            "get_research_status" => {
                let a: InteractionArgs = parse(name, args)?;
                Ok(to_json(&self.backend.get_status(&a.interaction_id).await?))
            }
            "get_research_result" => {
                let a: InteractionArgs = parse(name, args)?;
                Ok(to_json(&self.backend.get_result(&a.interaction_id).await?))
            }
            "ask_followup_question" => {
                let a: FollowupArgs = parse(name, args)?;
                let result = self
                    .backend
                    .ask_followup(&a.previous_interaction_id, &a.question)
                    .await?;
                Ok(to_json(&result))
            }
            "stream_research" => {
                let a: ResearchArgs = parse(name, args)?;
                self.collect_stream(&a.query, &a.options()).await
            }
            "quick_search" => {
                let a: QuickArgs = parse(name, args)?;
                if !a.urls.is_empty() {
                    return Err(ResearchError::Configuration(
                        "quick_search does not take urls; use search_and_analyze".into(),
                    ));
                }
                Ok(to_json(&self.backend.quick_search(&a.query, &a.options()).await?))
            }
            "analyze_urls" => {
                let a: QuickArgs = parse(name, args)?;
                let result = self
                    .backend
                    .analyze_urls(&a.urls, &a.query, &a.options())
                    .await?;
                Ok(to_json(&result))
            }
            "search_and_analyze" => {
                let a: QuickArgs = parse(name, args)?;
                let result = self
                    .backend
                    .search_and_analyze(&a.query, &a.urls, &a.options())
                    .await?;
                Ok(to_json(&result))
            }
            other => Err(ResearchError::Configuration(format!("unknown tool: {}", other))),
        }
    }

    async fn collect_stream(
        &self,
        query: &str,
        options: &ResearchOptions,
    ) -> Result<Value, ResearchError> {
        let mut stream = self.backend.stream_research(query, options).await?;
        let mut thoughts = Vec::new();

        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Started { interaction_id } => {
                    log::debug!("🆔 stream_research: {}", interaction_id);
                }
                StreamEvent::Thought { text } => thoughts.push(text),
                StreamEvent::ContentDelta { .. } => {}
                StreamEvent::Completed { result } => {
                    return Ok(json!({
                        "interaction_id": result.interaction_id,
                        "thoughts": thoughts,
                        "result": result,
                    }));
                }
                StreamEvent::Failed {
                    interaction_id,
                    code,
                    message,
                } => {
                    return Err(ResearchError::Upstream {
                        interaction_id,
                        status: None,
                        code,
                        message,
                    });
                }
            }
        }

        Err(ResearchError::StreamInterrupted {
            interaction_id: stream.interaction_id(),
            last_event_id: stream.last_event_id(),
            message: "stream ended before a terminal event".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ResearchClient;
    use crate::config::ClientConfig;
    use crate::poll::ManualClock;
    use crate::types::Citation;
    use crate::upstream::sse::InteractionEvent;
    use crate::upstream::{InteractionScript, MockUpstream, StreamFrame};

    fn toolbox() -> (ResearchToolbox, Arc<MockUpstream>) {
        let mock = Arc::new(MockUpstream::new());
        let client = ResearchClient::with_upstream(
            ClientConfig::new("key").unwrap(),
            mock.clone(),
            Arc::new(ManualClock::new()),
        );
        (ResearchToolbox::new(Arc::new(client)), mock)
    }

    #[test]
    fn test_specs_cover_all_tools() {
        let (toolbox, _) = toolbox();
        let names: Vec<&str> = toolbox.specs().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "deep_research",
                "start_deep_research",
                "get_research_status",
                "get_research_result",
                "ask_followup_question",
                "stream_research",
                "quick_search",
                "analyze_urls",
                "search_and_analyze",
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_and_keys_are_configuration_errors() {
        let (toolbox, mock) = toolbox();
        let out = toolbox.invoke("summon", json!({})).await;
        assert_eq!(out["error_kind"], "configuration");

        let out = toolbox
            .invoke("start_deep_research", json!({"query": "q", "depth": 3}))
            .await;
        assert_eq!(out["error_kind"], "configuration");
        assert_eq!(mock.calls().total(), 0);
    }

    #[tokio::test]
    async fn test_deep_research_without_wait_returns_id() {
        let (toolbox, _) = toolbox();
        let out = toolbox
            .invoke(
                "deep_research",
                json!({"query": "quantum computing trends", "wait_for_completion": false}),
            )
            .await;
        assert_eq!(out["interaction_id"], "int-1");
        assert_eq!(out["outcome"], "submitted");

        let status = toolbox
            .invoke("get_research_status", json!({"interaction_id": "int-1"}))
            .await;
        assert_eq!(status["status"], "running");
    }

    #[tokio::test]
    async fn test_deep_research_waits_for_result() {
        let (toolbox, mock) = toolbox();
        mock.queue_interaction(InteractionScript::completes_after(
            1,
            "report",
            vec![Citation::new("https://a.example", Some("A".into()))],
        ));
        let out = toolbox.invoke("deep_research", json!({"query": "q"})).await;
        assert_eq!(out["outcome"], "completed");
        assert_eq!(out["result"]["content"], "report");
        assert_eq!(out["result"]["citations"][0]["url"], "https://a.example");
    }

    #[tokio::test]
    async fn test_result_not_ready_carries_id() {
        let (toolbox, mock) = toolbox();
        mock.queue_interaction(InteractionScript::running_forever());
        toolbox.invoke("start_deep_research", json!({"query": "q"})).await;
        let out = toolbox
            .invoke("get_research_result", json!({"interaction_id": "int-1"}))
            .await;
        assert_eq!(out["error_kind"], "not_ready");
        assert_eq!(out["interaction_id"], "int-1");
    }

    #[tokio::test]
    async fn test_analyze_urls_over_cap() {
        let (toolbox, mock) = toolbox();
        let urls: Vec<String> = (0..21).map(|i| format!("https://a.example/{}", i)).collect();
        let out = toolbox
            .invoke("analyze_urls", json!({"urls": urls, "query": "summarize"}))
            .await;
        assert_eq!(out["error_kind"], "validation");
        assert_eq!(mock.calls().generate, 0);
    }

    #[tokio::test]
    async fn test_stream_research_collects_thoughts() {
        let (toolbox, mock) = toolbox();
        mock.queue_stream(vec![
            Ok(StreamFrame::new(InteractionEvent::Started {
                interaction_id: "int-s".into(),
            })),
            Ok(StreamFrame::new(InteractionEvent::ThoughtDelta {
                text: "Planning".into(),
            })),
            Ok(StreamFrame::new(InteractionEvent::TextDelta { text: "Body".into() })),
            Ok(StreamFrame::new(InteractionEvent::Completed { interaction: None })),
        ]);
        let out = toolbox
            .invoke("stream_research", json!({"query": "q"}))
            .await;
        assert_eq!(out["interaction_id"], "int-s");
        assert_eq!(out["thoughts"], json!(["Planning"]));
        assert_eq!(out["result"]["content"], "Body");
    }
}
