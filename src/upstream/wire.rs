// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SCHEMAS DE WIRE DA GEMINI API
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Interactions API (deep research) e generateContent (busca/URL context).
// Desserialização tolerante: campos ausentes viram default, e os nomes
// aceitam camelCase e snake_case.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{
    Citation, GroundingSupport, InteractionStatus, ResearchResult, UrlMetadata,
};

// ─────────────────────────────────────────────────
// Interactions API
// ─────────────────────────────────────────────────

/// Corpo de `POST /interactions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateInteractionRequest {
    /// Prompt completo
    pub input: String,
    /// Agente de deep research
    pub agent: String,
    /// Execução em background (pesquisa longa)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background: Option<bool>,
    /// Resposta em SSE
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Interação anterior da conversa (follow-up)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_interaction_id: Option<String>,
    /// Configuração do agente (resumos de raciocínio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<AgentConfig>,
}

impl CreateInteractionRequest {
    /// Nova pesquisa em background.
    pub fn research(agent: &str, input: String) -> Self {
        Self {
            input,
            agent: agent.to_string(),
            background: Some(true),
            stream: None,
            previous_interaction_id: None,
            agent_config: None,
        }
    }

    /// Nova pesquisa em streaming, com resumos de raciocínio.
    pub fn streaming(agent: &str, input: String) -> Self {
        Self {
            input,
            agent: agent.to_string(),
            background: Some(true),
            stream: Some(true),
            previous_interaction_id: None,
            agent_config: Some(AgentConfig::deep_research()),
        }
    }

    /// Pergunta de follow-up encadeada a uma interação anterior.
    pub fn followup(agent: &str, question: String, previous_interaction_id: &str) -> Self {
        Self {
            input: question,
            agent: agent.to_string(),
            background: None,
            stream: None,
            previous_interaction_id: Some(previous_interaction_id.to_string()),
            agent_config: None,
        }
    }
}

/// Configuração do agente.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentConfig {
    /// Tipo do agente
    #[serde(rename = "type")]
    pub kind: String,
    /// Modo de resumos de raciocínio
    pub thinking_summaries: String,
}

impl AgentConfig {
    /// Deep research com resumos automáticos.
    pub fn deep_research() -> Self {
        Self {
            kind: "deep-research".into(),
            thinking_summaries: "auto".into(),
        }
    }
}

/// Recurso de interação devolvido pelo upstream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct InteractionResource {
    /// Id da interação
    pub id: String,
    /// Status textual
    pub status: Option<String>,
    /// Saídas geradas
    pub outputs: Vec<InteractionOutput>,
    /// Erro reportado (string ou objeto)
    pub error: Option<Value>,
    /// Input original, quando ecoado
    pub input: Option<Value>,
}

/// Uma saída da interação.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct InteractionOutput {
    /// Tipo (`text`, `thought`, ...)
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Texto
    pub text: Option<String>,
    /// Anotações de fonte
    pub annotations: Vec<Annotation>,
    /// Metadados de grounding
    #[serde(alias = "groundingMetadata")]
    pub grounding_metadata: Option<GroundingMetadata>,
}

/// Anotação de fonte numa saída de texto.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Annotation {
    /// URL citada
    pub url: Option<String>,
    /// Forma alternativa da URL
    pub source: Option<String>,
    /// Título
    pub title: Option<String>,
}

impl InteractionResource {
    /// Status normalizado (ausente = running).
    pub fn normalized_status(&self) -> InteractionStatus {
        self.status
            .as_deref()
            .map(InteractionStatus::from_upstream)
            .unwrap_or(InteractionStatus::Running)
    }

    /// Mensagem de erro, aceitando string ou `{message}`.
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => other
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| Some(other.to_string())),
        }
    }

    /// Query original, quando o upstream ecoa o input como texto.
    pub fn input_text(&self) -> Option<String> {
        match self.input.as_ref()? {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn text_outputs(&self) -> impl Iterator<Item = &InteractionOutput> {
        self.outputs
            .iter()
            .filter(|o| matches!(o.kind.as_deref(), None | Some("text")))
    }

    /// Último texto não vazio.
    pub fn text(&self) -> Option<String> {
        self.text_outputs()
            .filter_map(|o| o.text.as_deref())
            .filter(|t| !t.trim().is_empty())
            .last()
            .map(str::to_string)
    }

    /// Citações na ordem do upstream: anotações e depois chunks de grounding.
    pub fn citations(&self) -> Vec<Citation> {
        let mut citations = Vec::new();
        for output in self.text_outputs() {
            for annotation in &output.annotations {
                if let Some(url) = annotation.url.as_ref().or(annotation.source.as_ref()) {
                    citations.push(Citation::new(url.clone(), annotation.title.clone()));
                }
            }
            if let Some(meta) = &output.grounding_metadata {
                citations.extend(meta.citations());
            }
        }
        citations
    }

    /// Converte uma interação concluída em resultado.
    pub fn to_result(&self) -> Option<ResearchResult> {
        let content = self.text()?;
        Some(ResearchResult::new(content, self.citations()).with_interaction_id(self.id.clone()))
    }
}

// ─────────────────────────────────────────────────
// generateContent
// ─────────────────────────────────────────────────

/// Corpo de `POST /models/{model}:generateContent`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateContentRequest {
    /// Conteúdo do usuário
    pub contents: Vec<Content>,
    /// Ferramentas habilitadas
    pub tools: Vec<Tool>,
}

impl GenerateContentRequest {
    /// Prompt único com as ferramentas indicadas.
    pub fn new(prompt: String, google_search: bool, url_context: bool) -> Self {
        let mut tools = Vec::new();
        if google_search {
            tools.push(Tool::google_search());
        }
        if url_context {
            tools.push(Tool::url_context());
        }
        Self {
            contents: vec![Content {
                role: Some("user".into()),
                parts: vec![Part {
                    text: Some(prompt),
                    thought: None,
                }],
            }],
            tools,
        }
    }

    /// Texto do prompt (primeira parte)
    pub fn prompt(&self) -> Option<&str> {
        self.contents
            .first()
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.as_deref())
    }
}

/// Conteúdo multi-parte.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Content {
    /// Papel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Partes
    pub parts: Vec<Part>,
}

/// Parte de texto.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Part {
    /// Texto
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Parte de raciocínio (ignorada no conteúdo)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

/// Objeto vazio `{}` usado na declaração de ferramentas.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmptyObject {}

/// Declaração de ferramenta.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Grounding com Google Search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_search: Option<EmptyObject>,
    /// Leitura de URLs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_context: Option<EmptyObject>,
}

impl Tool {
    /// `{"googleSearch": {}}`
    pub fn google_search() -> Self {
        Self {
            google_search: Some(EmptyObject {}),
            url_context: None,
        }
    }

    /// `{"urlContext": {}}`
    pub fn url_context() -> Self {
        Self {
            google_search: None,
            url_context: Some(EmptyObject {}),
        }
    }
}

/// Resposta de generateContent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GenerateContentResponse {
    /// Candidatos (usamos o primeiro)
    pub candidates: Vec<Candidate>,
    /// Feedback de bloqueio do prompt
    #[serde(alias = "promptFeedback")]
    pub prompt_feedback: Option<Value>,
}

/// Candidato de resposta.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Candidate {
    /// Conteúdo
    pub content: Option<Content>,
    /// Metadados de grounding
    #[serde(alias = "groundingMetadata")]
    pub grounding_metadata: Option<GroundingMetadata>,
    /// Metadados de URL context
    #[serde(alias = "urlContextMetadata")]
    pub url_context_metadata: Option<UrlContextMetadata>,
    /// Motivo de término
    #[serde(alias = "finishReason")]
    pub finish_reason: Option<String>,
}

/// Metadados de grounding.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GroundingMetadata {
    /// Queries usadas
    #[serde(alias = "webSearchQueries")]
    pub web_search_queries: Vec<String>,
    /// Fontes
    #[serde(alias = "groundingChunks")]
    pub grounding_chunks: Vec<GroundingChunk>,
    /// Segmentos sustentados
    #[serde(alias = "groundingSupports")]
    pub grounding_supports: Vec<WireGroundingSupport>,
}

impl GroundingMetadata {
    fn web_source(chunk: &GroundingChunk) -> Option<(&String, &Option<String>)> {
        let web = chunk.web.as_ref()?;
        web.uri.as_ref().map(|uri| (uri, &web.title))
    }

    /// Citações dos chunks web, na ordem
    pub fn citations(&self) -> Vec<Citation> {
        self.grounding_chunks
            .iter()
            .filter_map(Self::web_source)
            .map(|(uri, title)| Citation::new(uri.clone(), title.clone()))
            .collect()
    }

    /// Posição de cada chunk na lista de `citations()`; `None` para chunks
    /// sem fonte web.
    fn citation_positions(&self) -> Vec<Option<usize>> {
        let mut next = 0;
        self.grounding_chunks
            .iter()
            .map(|chunk| {
                Self::web_source(chunk).map(|_| {
                    next += 1;
                    next - 1
                })
            })
            .collect()
    }

    /// Suportes com segmento. Os índices apontam para `citations()`; os que
    /// referenciam chunks sem fonte web são descartados.
    pub fn supports(&self) -> Vec<GroundingSupport> {
        let positions = self.citation_positions();
        self.grounding_supports
            .iter()
            .filter_map(|s| {
                let segment = s.segment.as_ref()?;
                Some(GroundingSupport {
                    text: segment.text.clone().unwrap_or_default(),
                    start_index: segment.start_index.unwrap_or(0),
                    end_index: segment.end_index.unwrap_or(0),
                    citation_indices: s
                        .grounding_chunk_indices
                        .iter()
                        .filter_map(|&i| positions.get(i).copied().flatten())
                        .collect(),
                })
            })
            .collect()
    }
}

/// Chunk de grounding.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GroundingChunk {
    /// Fonte web
    pub web: Option<WebChunk>,
}

/// Fonte web.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WebChunk {
    /// URL
    pub uri: Option<String>,
    /// Título
    pub title: Option<String>,
}

/// Suporte de grounding no formato do upstream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WireGroundingSupport {
    /// Segmento
    pub segment: Option<Segment>,
    /// Índices dos chunks
    #[serde(alias = "groundingChunkIndices")]
    pub grounding_chunk_indices: Vec<usize>,
}

/// Segmento de texto.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Segment {
    /// Texto
    pub text: Option<String>,
    /// Início
    #[serde(alias = "startIndex")]
    pub start_index: Option<usize>,
    /// Fim
    #[serde(alias = "endIndex")]
    pub end_index: Option<usize>,
}

/// Metadados do URL context.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UrlContextMetadata {
    /// Uma entrada por URL
    #[serde(alias = "urlMetadata")]
    pub url_metadata: Vec<WireUrlMetadata>,
}

/// Entrada de metadados de URL.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct WireUrlMetadata {
    /// URL lida
    #[serde(alias = "retrievedUrl")]
    pub retrieved_url: Option<String>,
    /// Status de leitura
    #[serde(alias = "urlRetrievalStatus")]
    pub url_retrieval_status: Option<String>,
}

impl GenerateContentResponse {
    fn first(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    /// Texto do primeiro candidato, sem partes de raciocínio.
    pub fn text(&self) -> String {
        self.first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|p| p.thought != Some(true))
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Metadados de URL no modelo público.
    pub fn url_metadata(&self) -> Vec<UrlMetadata> {
        self.first()
            .and_then(|c| c.url_context_metadata.as_ref())
            .map(|meta| {
                meta.url_metadata
                    .iter()
                    .map(|m| UrlMetadata {
                        url: m.retrieved_url.clone().unwrap_or_default(),
                        status: m
                            .url_retrieval_status
                            .clone()
                            .unwrap_or_else(|| "unknown".into()),
                        title: None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Monta o resultado. Com `url_citations`, URLs lidas com sucesso entram
    /// nas citações depois das fontes de grounding.
    pub fn to_result(&self, model: &str, url_citations: bool) -> ResearchResult {
        let grounding = self.first().and_then(|c| c.grounding_metadata.as_ref());
        let url_metadata = self.url_metadata();

        let mut citations = grounding.map(|g| g.citations()).unwrap_or_default();
        if url_citations {
            citations.extend(
                url_metadata
                    .iter()
                    .filter(|m| m.is_success() && !m.url.is_empty())
                    .map(|m| Citation::new(m.url.clone(), m.title.clone())),
            );
        }

        let mut result = ResearchResult::new(self.text(), citations).with_model(model);
        if let Some(g) = grounding {
            result.search_queries = g.web_search_queries.clone();
            result.grounding_supports = g.supports();
        }
        result.url_metadata = url_metadata;
        result
    }

    /// Motivo de bloqueio do prompt, se houver
    pub fn block_reason(&self) -> Option<String> {
        self.prompt_feedback
            .as_ref()?
            .get("blockReason")
            .or_else(|| self.prompt_feedback.as_ref()?.get("block_reason"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

// ─────────────────────────────────────────────────
// Corpo de erro
// ─────────────────────────────────────────────────

/// Extrai `(status, message)` de `{"error": {"code", "message", "status"}}`.
pub fn parse_error_body(body: &str) -> (Option<String>, String) {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    match error {
        Some(Value::Object(obj)) => {
            let code = obj.get("status").and_then(Value::as_str).map(str::to_string);
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.trim().to_string());
            (code, message)
        }
        Some(Value::String(s)) => (None, s.clone()),
        _ => (None, body.trim().chars().take(500).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interaction_resource_extracts_last_text_and_citations() {
        let resource: InteractionResource = serde_json::from_value(json!({
            "id": "int-1",
            "status": "completed",
            "outputs": [
                {"type": "thought", "text": "thinking"},
                {"type": "text", "text": "draft"},
                {"type": "text", "text": "final report",
                 "annotations": [
                    {"url": "https://b.example", "title": "B"},
                    {"source": "https://a.example"},
                    {"url": "https://b.example", "title": "B"}
                 ]}
            ]
        }))
        .unwrap();

        let result = resource.to_result().unwrap();
        assert_eq!(result.content, "final report");
        assert_eq!(result.interaction_id.as_deref(), Some("int-1"));
        assert_eq!(
            result.citation_urls(),
            vec!["https://b.example", "https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_error_message_forms() {
        let as_string: InteractionResource =
            serde_json::from_value(json!({"id": "x", "status": "failed", "error": "quota"})).unwrap();
        assert_eq!(as_string.error_message().as_deref(), Some("quota"));

        let as_object: InteractionResource = serde_json::from_value(
            json!({"id": "x", "status": "failed", "error": {"message": "boom", "code": 13}}),
        )
        .unwrap();
        assert_eq!(as_object.error_message().as_deref(), Some("boom"));
        assert_eq!(as_object.normalized_status(), InteractionStatus::Failed);
    }

    #[test]
    fn test_generate_content_grounding() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [{"text": "Hello "}, {"text": "hidden", "thought": true}, {"text": "world"}]},
                "groundingMetadata": {
                    "webSearchQueries": ["hello world"],
                    "groundingChunks": [
                        {"web": {"uri": "https://x.example", "title": "X"}},
                        {"web": {"uri": "https://y.example"}}
                    ],
                    "groundingSupports": [
                        {"segment": {"text": "Hello", "startIndex": 0, "endIndex": 5},
                         "groundingChunkIndices": [0, 1]}
                    ]
                },
                "urlContextMetadata": {"urlMetadata": [
                    {"retrievedUrl": "https://a.example/doc", "urlRetrievalStatus": "URL_RETRIEVAL_STATUS_SUCCESS"},
                    {"retrievedUrl": "https://paywall.example", "urlRetrievalStatus": "URL_RETRIEVAL_STATUS_ERROR"}
                ]}
            }]
        }))
        .unwrap();

        let result = response.to_result("gemini-3-flash-preview", true);
        assert_eq!(result.content, "Hello world");
        assert_eq!(result.search_queries, vec!["hello world"]);
        assert_eq!(result.grounding_supports[0].citation_indices, vec![0, 1]);
        assert_eq!(
            result.citation_urls(),
            vec!["https://x.example", "https://y.example", "https://a.example/doc"]
        );
        assert_eq!(result.url_metadata.len(), 2);
        assert_eq!(result.model.as_deref(), Some("gemini-3-flash-preview"));

        let search_only = response.to_result("gemini-3-flash-preview", false);
        assert_eq!(search_only.citations.len(), 2);
    }

    #[test]
    fn test_support_indices_follow_web_citations() {
        let meta: GroundingMetadata = serde_json::from_value(json!({
            "groundingChunks": [
                {"retrievedContext": {"uri": "gs://bucket/doc"}},
                {"web": {"uri": "https://a.example", "title": "A"}},
                {"web": {"title": "no uri"}},
                {"web": {"uri": "https://b.example"}}
            ],
            "groundingSupports": [
                {"segment": {"text": "claim", "startIndex": 0, "endIndex": 5},
                 "groundingChunkIndices": [0, 1, 2, 3, 9]}
            ]
        }))
        .unwrap();

        let citations = meta.citations();
        assert_eq!(citations.len(), 2);
        let supports = meta.supports();
        assert_eq!(supports[0].citation_indices, vec![0, 1]);
        assert_eq!(citations[supports[0].citation_indices[1]].url, "https://b.example");
    }

    #[test]
    fn test_request_serialization() {
        let request = GenerateContentRequest::new("q".into(), true, true);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["tools"][0], json!({"googleSearch": {}}));
        assert_eq!(json["tools"][1], json!({"urlContext": {}}));
        assert_eq!(json["contents"][0]["parts"][0]["text"], "q");

        let create = CreateInteractionRequest::followup("agent", "why?".into(), "int-1");
        let json = serde_json::to_value(&create).unwrap();
        assert_eq!(json["previous_interaction_id"], "int-1");
        assert!(json.get("background").is_none());
    }

    #[test]
    fn test_parse_error_body() {
        let (code, message) = parse_error_body(
            r#"{"error":{"code":404,"message":"Interaction not found","status":"NOT_FOUND"}}"#,
        );
        assert_eq!(code.as_deref(), Some("NOT_FOUND"));
        assert_eq!(message, "Interaction not found");

        let (code, message) = parse_error_body("upstream exploded");
        assert!(code.is_none());
        assert_eq!(message, "upstream exploded");
    }
}
