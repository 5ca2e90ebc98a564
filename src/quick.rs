// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OPERAÇÕES RÁPIDAS (BUSCA + ANÁLISE DE URLS)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Uma chamada, uma ida e volta, sem id de tarefa. Nenhuma falha é repetida
// automaticamente: `Transient` volta para o chamador decidir.
//
// URLs atrás de paywall, plataformas de vídeo ou visualizadores proprietários
// são aceitas aqui mas podem render análise parcial; não dá para detectar
// isso antes da chamada.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use std::sync::Arc;
use url::Url;

use crate::config::{ModelVariant, QuickOptions};
use crate::error::ResearchError;
use crate::types::ResearchResult;
use crate::upstream::{GenerateContentRequest, GenerateContentResponse, UpstreamApi};

/// Máximo de URLs por chamada (limite do serviço)
pub const MAX_URLS: usize = 20;

/// Tamanho máximo de cada URL
pub const MAX_URL_LENGTH: usize = 2048;

/// Conteúdo máximo por URL aceito pelo serviço. Só o upstream conhece o
/// tamanho real; o status de leitura volta em `url_metadata`.
pub const MAX_URL_CONTENT_BYTES: u64 = 34 * 1024 * 1024;

/// Valida a lista de URLs antes de qualquer chamada de rede.
pub fn validate_urls(urls: &[String], require_one: bool) -> Result<(), ResearchError> {
    if require_one && urls.is_empty() {
        return Err(ResearchError::Validation("at least one URL is required".into()));
    }
    if urls.len() > MAX_URLS {
        return Err(ResearchError::Validation(format!(
            "too many URLs: {} (maximum {} per request)",
            urls.len(),
            MAX_URLS
        )));
    }

    for raw in urls {
        if raw.len() > MAX_URL_LENGTH {
            return Err(ResearchError::Validation(format!(
                "URL longer than {} characters: {}...",
                MAX_URL_LENGTH,
                raw.chars().take(64).collect::<String>()
            )));
        }
        let parsed = Url::parse(raw)
            .map_err(|e| ResearchError::Validation(format!("invalid URL '{}': {}", raw, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ResearchError::Validation(format!(
                "URL must be absolute http(s): {}",
                raw
            )));
        }
    }
    Ok(())
}

fn validate_query(query: &str) -> Result<(), ResearchError> {
    if query.trim().is_empty() {
        return Err(ResearchError::Validation("query must not be empty".into()));
    }
    Ok(())
}

/// Cliente das operações rápidas.
pub struct QuickClient {
    upstream: Arc<dyn UpstreamApi>,
    default_model: ModelVariant,
}

impl QuickClient {
    /// Cria o cliente.
    pub fn new(upstream: Arc<dyn UpstreamApi>, default_model: ModelVariant) -> Self {
        Self {
            upstream,
            default_model,
        }
    }

    fn model(&self, options: &QuickOptions) -> ModelVariant {
        options.model.unwrap_or(self.default_model)
    }

    async fn generate(
        &self,
        model: ModelVariant,
        request: GenerateContentRequest,
        url_citations: bool,
    ) -> Result<ResearchResult, ResearchError> {
        let response: GenerateContentResponse = self
            .upstream
            .generate_content(model.as_str(), &request)
            .await
            .map_err(|f| f.into_quick_error())?;

        let result = response.to_result(model.as_str(), url_citations);
        if result.content.trim().is_empty() {
            let message = match response.block_reason() {
                Some(reason) => format!("prompt blocked: {}", reason),
                None => "model returned no text".to_string(),
            };
            return Err(ResearchError::Upstream {
                interaction_id: None,
                status: None,
                code: response.block_reason(),
                message,
            });
        }

        log::info!(
            "✅ {} respondeu ({} chars, {} citações)",
            model,
            result.content.len(),
            result.citations.len()
        );
        Ok(result)
    }

    /// Busca com grounding no Google Search.
    ///
    /// Citações vazias são válidas (o modelo não usou busca).
    pub async fn quick_search(
        &self,
        query: &str,
        options: &QuickOptions,
    ) -> Result<ResearchResult, ResearchError> {
        validate_query(query)?;
        options.validate()?;

        let model = self.model(options);
        log::info!("🔍 Busca rápida com {}", model);
        let request = GenerateContentRequest::new(options.compose_prompt(query), true, false);
        self.generate(model, request, false).await
    }

    /// Análise de URLs via URL Context.
    pub async fn analyze_urls(
        &self,
        urls: &[String],
        query: &str,
        options: &QuickOptions,
    ) -> Result<ResearchResult, ResearchError> {
        validate_query(query)?;
        validate_urls(urls, true)?;
        options.validate()?;

        let model = self.model(options);
        log::info!("🔗 Analisando {} URL(s) com {}", urls.len(), model);
        let body = format!("{}\n\nURLs:\n{}", query, urls.join("\n"));
        let request = GenerateContentRequest::new(options.compose_prompt(&body), false, true);
        self.generate(model, request, true).await
    }

    /// Busca + URL Context na mesma chamada. Sem URLs, vira `quick_search`.
    pub async fn search_and_analyze(
        &self,
        query: &str,
        urls: &[String],
        options: &QuickOptions,
    ) -> Result<ResearchResult, ResearchError> {
        validate_query(query)?;
        validate_urls(urls, false)?;
        options.validate()?;

        if urls.is_empty() {
            return self.quick_search(query, options).await;
        }

        let model = self.model(options);
        log::info!("🔍🔗 Busca + {} URL(s) com {}", urls.len(), model);
        let prompt = format!(
            "{}\n\n参考URL:\n{}",
            options.compose_prompt(query),
            urls.join("\n")
        );
        let request = GenerateContentRequest::new(prompt, true, true);
        self.generate(model, request, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::{ApiFailure, MockUpstream, MockUpstreamApi};
    use serde_json::json;

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://a.example/doc{}", i)).collect()
    }

    fn grounded_response() -> serde_json::Value {
        json!({
            "candidates": [{
                "content": {"parts": [{"text": "Answer"}]},
                "groundingMetadata": {
                    "webSearchQueries": ["ev market"],
                    "groundingChunks": [
                        {"web": {"uri": "https://s1.example", "title": "S1"}},
                        {"web": {"uri": "https://s2.example", "title": "S2"}}
                    ]
                }
            }]
        })
    }

    #[tokio::test]
    async fn test_too_many_urls_never_reach_upstream() {
        let mut mock = MockUpstreamApi::new();
        mock.expect_generate_content().never();
        let client = QuickClient::new(Arc::new(mock), ModelVariant::default());

        let err = client
            .analyze_urls(&urls(21), "summarize", &QuickOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_url_validation() {
        assert!(validate_urls(&urls(20), true).is_ok());
        assert!(validate_urls(&[], true).is_err());
        assert!(validate_urls(&[], false).is_ok());
        assert!(validate_urls(&["ftp://a.example/x".to_string()], true).is_err());
        assert!(validate_urls(&["not a url".to_string()], true).is_err());
        let long = format!("https://a.example/{}", "x".repeat(MAX_URL_LENGTH));
        assert!(validate_urls(&[long], true).is_err());
    }

    #[tokio::test]
    async fn test_quick_search_citations_in_order() {
        let mock = Arc::new(MockUpstream::new());
        mock.queue_generate_json(grounded_response());
        let client = QuickClient::new(mock.clone(), ModelVariant::Gemini3Flash);

        let result = client
            .quick_search("ev market", &QuickOptions::default().with_language("en"))
            .await
            .unwrap();
        assert_eq!(result.content, "Answer");
        assert_eq!(
            result.citation_urls(),
            vec!["https://s1.example", "https://s2.example"]
        );
        assert_eq!(result.search_queries, vec!["ev market".to_string()]);
        assert_eq!(result.model.as_deref(), Some("gemini-3-flash-preview"));

        let (model, request) = &mock.generate_requests()[0];
        assert_eq!(model, "gemini-3-flash-preview");
        assert!(request.prompt().unwrap().starts_with("Always answer in English."));
        assert_eq!(request.tools.len(), 1);
    }

    #[tokio::test]
    async fn test_quick_search_without_grounding() {
        let mock = Arc::new(MockUpstream::new());
        mock.queue_generate_json(json!({
            "candidates": [{"content": {"parts": [{"text": "Plain"}]}}]
        }));
        let client = QuickClient::new(mock, ModelVariant::default());
        let result = client
            .quick_search("hello", &QuickOptions::default())
            .await
            .unwrap();
        assert!(result.citations.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_urls_cites_retrieved_url() {
        let mock = Arc::new(MockUpstream::new());
        mock.queue_generate_json(json!({
            "candidates": [{
                "content": {"parts": [{"text": "The document describes X."}]},
                "urlContextMetadata": {"urlMetadata": [{
                    "retrievedUrl": "https://a.example/doc",
                    "urlRetrievalStatus": "URL_RETRIEVAL_STATUS_SUCCESS"
                }]}
            }]
        }));
        let client = QuickClient::new(mock.clone(), ModelVariant::Gemini3Pro);

        let result = client
            .analyze_urls(
                &["https://a.example/doc".to_string()],
                "summarize",
                &QuickOptions::default(),
            )
            .await
            .unwrap();
        assert!(result.citation_urls().contains(&"https://a.example/doc"));
        assert!(result.url_metadata[0].is_success());

        let (_, request) = &mock.generate_requests()[0];
        assert_eq!(
            request.prompt(),
            Some("summarize\n\nURLs:\nhttps://a.example/doc")
        );
    }

    #[tokio::test]
    async fn test_search_and_analyze_without_urls_is_plain_search() {
        let mock = Arc::new(MockUpstream::new());
        mock.queue_generate_json(grounded_response());
        let client = QuickClient::new(mock.clone(), ModelVariant::default());

        client
            .search_and_analyze("ev market", &[], &QuickOptions::default())
            .await
            .unwrap();
        let (_, request) = &mock.generate_requests()[0];
        assert_eq!(request.prompt(), Some("ev market"));
        assert_eq!(request.tools.len(), 1);
    }

    #[tokio::test]
    async fn test_search_and_analyze_with_urls() {
        let mock = Arc::new(MockUpstream::new());
        mock.queue_generate_json(grounded_response());
        let client = QuickClient::new(mock.clone(), ModelVariant::default());

        client
            .search_and_analyze("compare", &urls(2), &QuickOptions::default())
            .await
            .unwrap();
        let (_, request) = &mock.generate_requests()[0];
        assert!(request.prompt().unwrap().ends_with(
            "参考URL:\nhttps://a.example/doc0\nhttps://a.example/doc1"
        ));
        assert_eq!(request.tools.len(), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_surfaces_once() {
        let mock = Arc::new(MockUpstream::new());
        mock.queue_generate(Err(ApiFailure::Status {
            status: 429,
            code: Some("RESOURCE_EXHAUSTED".into()),
            message: "quota".into(),
        }));
        let client = QuickClient::new(mock.clone(), ModelVariant::default());

        let err = client
            .quick_search("q", &QuickOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(mock.calls().generate, 1);
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_upstream_error() {
        let mock = Arc::new(MockUpstream::new());
        mock.queue_generate_json(json!({
            "candidates": [],
            "promptFeedback": {"blockReason": "SAFETY"}
        }));
        let client = QuickClient::new(mock, ModelVariant::default());
        let err = client
            .quick_search("q", &QuickOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "upstream");
        assert_eq!(err.upstream_code(), Some("SAFETY"));
    }
}
