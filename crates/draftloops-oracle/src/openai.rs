use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::http::{build_client, check_status, ChatMessage};
use crate::{Oracle, OracleError, OracleRequest, OracleResponse, ProviderKind};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI-compatible chat completions oracle
///
/// Works against api.openai.com and any server exposing the same
/// `/v1/chat/completions` shape.
pub struct OpenAiOracle {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiOracle {
    pub fn new(api_key: String, timeout: Option<Duration>) -> Result<Self, OracleError> {
        if api_key.trim().is_empty() {
            return Err(OracleError::Config(
                "OpenAI provider requires an API key".to_string(),
            ));
        }

        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn to_completion_request<'a>(&'a self, request: &'a OracleRequest) -> CompletionRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage::new("system", system));
        }
        messages.push(ChatMessage::new("user", &request.prompt));

        CompletionRequest {
            model: &self.model,
            messages,
            temperature: request.temperature,
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn decode_completion(body: &str) -> Result<(String, Option<String>), OracleError> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| OracleError::InvalidResponse(format!("openai: {}", e)))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();

    Ok((content, response.model))
}

#[async_trait]
impl Oracle for OpenAiOracle {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }

    async fn invoke(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError> {
        let start = Instant::now();
        let url = format!("{}/v1/chat/completions", self.base_url);

        debug!(
            oracle = self.name(),
            model = %self.model,
            prompt_len = request.prompt.len(),
            "Invoking oracle"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.to_completion_request(request))
            .send()
            .await
            .map_err(|e| OracleError::Unreachable(format!("{}: {}", url, e)))?;

        let body = check_status(response).await?;
        let (content, model) = decode_completion(&body)?;

        OracleResponse::new(
            &content,
            model.or_else(|| Some(self.model.clone())),
            start.elapsed(),
        )
    }

    async fn is_available(&self) -> bool {
        // Key presence is checked at construction; avoid a billable probe.
        true
    }
}
