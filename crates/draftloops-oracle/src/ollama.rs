use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::http::{build_client, check_status, ChatMessage};
use crate::{Oracle, OracleError, OracleRequest, OracleResponse, ProviderKind};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2:latest";

/// Ollama chat API oracle (local inference server)
pub struct OllamaOracle {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaOracle {
    pub fn new(timeout: Option<Duration>) -> Result<Self, OracleError> {
        Ok(Self {
            client: build_client(timeout)?,
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

    fn to_chat_request<'a>(&'a self, request: &'a OracleRequest) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ref system) = request.system {
            messages.push(ChatMessage::new("system", system));
        }
        messages.push(ChatMessage::new("user", &request.prompt));

        ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: request.temperature.map(|temperature| ChatOptions { temperature }),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    message: Option<ResponseMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

/// Extract the answer text from an Ollama `/api/chat` body
fn decode_chat_response(body: &str) -> Result<(String, Option<String>), OracleError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| OracleError::InvalidResponse(format!("ollama: {}", e)))?;

    if let Some(error) = response.error {
        return Err(OracleError::InvalidResponse(error));
    }

    let content = response.message.map(|m| m.content).unwrap_or_default();
    Ok((content, response.model))
}

#[async_trait]
impl Oracle for OllamaOracle {
    fn name(&self) -> &str {
        "Ollama"
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn model(&self) -> Option<&str> {
        Some(&self.model)
    }

    async fn invoke(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError> {
        let start = Instant::now();
        let url = format!("{}/api/chat", self.base_url);

        debug!(
            oracle = self.name(),
            model = %self.model,
            prompt_len = request.prompt.len(),
            "Invoking oracle"
        );

        let response = self
            .client
            .post(&url)
            .json(&self.to_chat_request(request))
            .send()
            .await
            .map_err(|e| OracleError::Unreachable(format!("{}: {}", url, e)))?;

        let body = check_status(response).await?;
        let (content, model) = decode_chat_response(&body)?;

        OracleResponse::new(
            &content,
            model.or_else(|| Some(self.model.clone())),
            start.elapsed(),
        )
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_chat_response() {
        let body = r#"{"model":"llama3.2:latest","created_at":"2025-08-25T10:00:00Z","message":{"role":"assistant","content":"Hello there"},"done":true}"#;
        let (content, model) = decode_chat_response(body).unwrap();
        assert_eq!(content, "Hello there");
        assert_eq!(model.as_deref(), Some("llama3.2:latest"));
    }

    #[test]
    fn test_decode_error_body() {
        let body = r#"{"error":"model 'nope' not found"}"#;
        let result = decode_chat_response(body);
        assert!(matches!(result, Err(OracleError::InvalidResponse(msg)) if msg.contains("not found")));
    }

    #[test]
    fn test_chat_request_shape() {
        let oracle = OllamaOracle::new(None)
            .unwrap()
            .with_base_url("http://gpu-box:11434/")
            .with_model("mistral");
        assert_eq!(oracle.base_url, "http://gpu-box:11434");

        let request = OracleRequest::new("Summarize").with_system("Be brief");
        let json = serde_json::to_value(oracle.to_chat_request(&request)).unwrap();
        assert_eq!(json["model"], "mistral");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Summarize");
        assert!(json.get("options").is_none());
    }
}
