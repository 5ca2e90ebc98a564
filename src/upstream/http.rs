// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CLIENTE HTTP DA GEMINI API
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Implementação real de `UpstreamApi` sobre reqwest. Toda chamada tem teto
// explícito; streams têm teto de inatividade por chunk.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::time::Duration;

use super::sse::SseStreamParser;
use super::wire::{
    parse_error_body, CreateInteractionRequest, GenerateContentRequest, GenerateContentResponse,
    InteractionResource,
};
use super::{ApiFailure, RawEventStream, StreamFrame, UpstreamApi};
use crate::config::ClientConfig;
use crate::error::ResearchError;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Cliente da Gemini API.
pub struct GeminiHttpApi {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    request_timeout: Duration,
    quick_timeout: Duration,
    stream_idle_timeout: Duration,
}

impl GeminiHttpApi {
    /// Cria o cliente a partir da configuração.
    pub fn new(config: &ClientConfig) -> Result<Self, ResearchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("gemini-research-tools/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ResearchError::Configuration(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key().to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
            quick_timeout: config.quick_timeout,
            stream_idle_timeout: config.stream_idle_timeout,
        })
    }

    fn interaction_url(&self, interaction_id: &str) -> String {
        format!(
            "{}/interactions/{}",
            self.base_url,
            urlencoding::encode(interaction_id)
        )
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<T, ApiFailure> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(timeout)
            .send()
            .await
            .map_err(failure_from_reqwest)?;

        let response = check_status(response).await?;
        let body = response.text().await.map_err(failure_from_reqwest)?;
        serde_json::from_str(&body).map_err(|e| ApiFailure::Decode(e.to_string()))
    }

    async fn open_stream(&self, request: reqwest::RequestBuilder) -> Result<RawEventStream, ApiFailure> {
        // Sem `.timeout()` no request: ele cortaria o corpo inteiro do stream
        let pending = request
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send();

        let response = tokio::time::timeout(self.request_timeout, pending)
            .await
            .map_err(|_| ApiFailure::Timeout(format!("no response after {:?}", self.request_timeout)))?
            .map_err(failure_from_reqwest)?;

        let response = check_status(response).await?;
        Ok(event_stream(response, self.stream_idle_timeout))
    }
}

fn failure_from_reqwest(error: reqwest::Error) -> ApiFailure {
    if error.is_timeout() {
        ApiFailure::Timeout(error.to_string())
    } else if error.is_decode() {
        ApiFailure::Decode(error.to_string())
    } else {
        ApiFailure::Network(error.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiFailure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let (code, message) = parse_error_body(&body);
    log::debug!("🌐 HTTP {} {:?}: {}", status.as_u16(), code, message);
    Err(ApiFailure::Status {
        status: status.as_u16(),
        code,
        message: if message.is_empty() {
            status.canonical_reason().unwrap_or("error").to_string()
        } else {
            message
        },
    })
}

struct StreamState {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    parser: SseStreamParser,
    pending: VecDeque<StreamFrame>,
    finished: bool,
}

fn event_stream(response: reqwest::Response, idle: Duration) -> RawEventStream {
    let bytes = response
        .bytes_stream()
        .map(|chunk| chunk.map(|b| b.to_vec()))
        .boxed();

    let state = StreamState {
        bytes,
        parser: SseStreamParser::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(frame) = state.pending.pop_front() {
                return Some((Ok(frame), state));
            }
            if state.finished {
                return None;
            }
            match tokio::time::timeout(idle, state.bytes.next()).await {
                Err(_) => {
                    state.finished = true;
                    let failure = ApiFailure::Timeout(format!("no stream data for {:?}", idle));
                    return Some((Err(failure), state));
                }
                Ok(None) => {
                    let tail = state.parser.finish();
                    state.pending.extend(tail);
                    state.finished = true;
                }
                Ok(Some(Err(e))) => {
                    state.finished = true;
                    return Some((Err(failure_from_reqwest(e)), state));
                }
                Ok(Some(Ok(chunk))) => {
                    let frames = state.parser.feed(&chunk);
                    state.pending.extend(frames);
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl UpstreamApi for GeminiHttpApi {
    async fn create_interaction(
        &self,
        request: &CreateInteractionRequest,
    ) -> Result<InteractionResource, ApiFailure> {
        log::debug!("🌐 POST /interactions (agent={})", request.agent);
        let builder = self
            .client
            .post(format!("{}/interactions", self.base_url))
            .json(request);
        self.send_json(builder, self.request_timeout).await
    }

    async fn get_interaction(&self, interaction_id: &str) -> Result<InteractionResource, ApiFailure> {
        log::debug!("🌐 GET /interactions/{}", interaction_id);
        let builder = self.client.get(self.interaction_url(interaction_id));
        self.send_json(builder, self.request_timeout).await
    }

    async fn stream_interaction(
        &self,
        request: &CreateInteractionRequest,
    ) -> Result<RawEventStream, ApiFailure> {
        log::debug!("🌐 POST /interactions?alt=sse (agent={})", request.agent);
        let builder = self
            .client
            .post(format!("{}/interactions", self.base_url))
            .query(&[("alt", "sse")])
            .json(request);
        self.open_stream(builder).await
    }

    async fn resume_interaction_stream(
        &self,
        interaction_id: &str,
    ) -> Result<RawEventStream, ApiFailure> {
        log::debug!("🌐 GET /interactions/{}?stream=true", interaction_id);
        let builder = self
            .client
            .get(self.interaction_url(interaction_id))
            .query(&[("stream", "true"), ("alt", "sse")]);
        self.open_stream(builder).await
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ApiFailure> {
        log::debug!("🌐 POST /models/{}:generateContent", model);
        let builder = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url,
                urlencoding::encode(model)
            ))
            .json(request);
        self.send_json(builder, self.quick_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_url_encodes_id() {
        let config = ClientConfig::new("key")
            .unwrap()
            .with_base_url("http://localhost:1234/v1beta/");
        let api = GeminiHttpApi::new(&config).unwrap();
        assert_eq!(
            api.interaction_url("a/b c"),
            "http://localhost:1234/v1beta/interactions/a%2Fb%20c"
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_failure() {
        let mut config = ClientConfig::new("key")
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        config.request_timeout = Duration::from_secs(2);
        config.connect_timeout = Duration::from_millis(500);
        let api = GeminiHttpApi::new(&config).unwrap();

        let failure = api.get_interaction("int-1").await.unwrap_err();
        assert!(failure.is_transient(), "got {:?}", failure);
    }
}
