use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::OracleResponse;

/// Errors that can occur while invoking an oracle
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    #[error("Rate limited by provider (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Provider returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Provider returned an empty response")]
    EmptyResponse,

    #[error("Oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("Failed to spawn oracle process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Oracle process failed: {0}")]
    ExecutionFailed(String),

    #[error("Oracle configuration error: {0}")]
    Config(String),
}

impl OracleError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Configuration problems, authentication failures and a missing binary
    /// will fail the same way every time.
    pub fn is_transient(&self) -> bool {
        match self {
            OracleError::Unreachable(_)
            | OracleError::RateLimited { .. }
            | OracleError::EmptyResponse
            | OracleError::Timeout(_)
            | OracleError::InvalidResponse(_)
            | OracleError::ExecutionFailed(_) => true,
            OracleError::Api { status, .. } => *status == 408 || *status >= 500,
            OracleError::SpawnFailed(_) | OracleError::Config(_) => false,
        }
    }
}

/// A single prompt sent to an oracle
#[derive(Debug, Clone)]
pub struct OracleRequest {
    /// System / role instruction (providers without a system slot prepend it)
    pub system: Option<String>,
    /// The user prompt
    pub prompt: String,
    /// Sampling temperature, if the provider supports it
    pub temperature: Option<f32>,
}

impl OracleRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// System text and prompt joined for transports with a single input
    pub fn flattened(&self) -> String {
        match self.system {
            Some(ref system) => format!("{}\n\n{}", system, self.prompt),
            None => self.prompt.clone(),
        }
    }
}

/// Supported provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProviderKind {
    /// Local Ollama server over HTTP
    #[default]
    Ollama,
    /// OpenAI-compatible chat completions API
    OpenAi,
    /// Any local CLI that reads a prompt on stdin and prints the answer
    Command,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Ollama => write!(f, "ollama"),
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Command => write!(f, "command"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "openai" | "open-ai" => Ok(ProviderKind::OpenAi),
            "command" | "cli" => Ok(ProviderKind::Command),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Resolved settings for constructing one oracle
#[derive(Debug, Clone, Default)]
pub struct OracleSettings {
    pub provider: ProviderKind,
    /// Model name (ignored by the command provider, which takes it from `args`)
    pub model: Option<String>,
    /// Override for the provider's base URL
    pub base_url: Option<String>,
    /// API key for remote providers
    pub api_key: Option<String>,
    /// Binary for the command provider
    pub command: Option<PathBuf>,
    /// Arguments for the command provider
    pub args: Vec<String>,
    /// Transport-level request timeout
    pub timeout: Option<Duration>,
}

impl OracleSettings {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_command(mut self, command: PathBuf, args: Vec<String>) -> Self {
        self.command = Some(command);
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The transport abstraction every author and critic call goes through
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Human-readable name of the oracle (e.g., "Ollama", "OpenAI")
    fn name(&self) -> &str;

    /// The provider variant
    fn provider(&self) -> ProviderKind;

    /// Model used for calls, if known
    fn model(&self) -> Option<&str>;

    /// Send a prompt and wait for the complete answer
    async fn invoke(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError>;

    /// Check if the provider is reachable / installed
    async fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_round_trip() {
        for kind in [ProviderKind::Ollama, ProviderKind::OpenAi, ProviderKind::Command] {
            let parsed: ProviderKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert_eq!("CLI".parse::<ProviderKind>().unwrap(), ProviderKind::Command);
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_transient_classification() {
        assert!(OracleError::EmptyResponse.is_transient());
        assert!(OracleError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(OracleError::RateLimited { retry_after: None }.is_transient());
        assert!(OracleError::Api {
            status: 503,
            message: "overloaded".into()
        }
        .is_transient());
        assert!(!OracleError::Api {
            status: 401,
            message: "bad key".into()
        }
        .is_transient());
        assert!(!OracleError::Config("missing model".into()).is_transient());
    }

    #[test]
    fn test_flattened_prompt() {
        let request = OracleRequest::new("Write it.").with_system("You are a writer.");
        assert_eq!(request.flattened(), "You are a writer.\n\nWrite it.");
        assert_eq!(OracleRequest::new("Only").flattened(), "Only");
    }
}
