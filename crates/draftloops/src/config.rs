//! Project configuration file support for draftloops.
//!
//! Loads configuration from `draftloops.toml` in the working directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use draftloops_core::{SessionConfig, DEFAULT_MAX_ITERATIONS, DEFAULT_THRESHOLD};
use draftloops_critic::{Criterion, Rubric};
use draftloops_oracle::{OracleSettings, ProviderKind, RetryPolicy};

/// The config file name
pub const CONFIG_FILE_NAME: &str = "draftloops.toml";

const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_OUTPUT_DIR: &str = "articles";

/// Project-level configuration loaded from `draftloops.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Global default provider (applies to both writer and critic)
    pub provider: Option<String>,
    /// Global default model (applies to both writer and critic)
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Environment variable holding the API key for remote providers
    pub api_key_env: Option<String>,
    /// Binary for the command provider
    pub command: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Transport timeout for a single request, in seconds
    pub timeout_secs: Option<u64>,
    pub threshold: Option<f64>,
    pub max_iterations: Option<usize>,
    /// Where article markdown is written
    pub output_dir: Option<PathBuf>,
    /// SQLite file, instead of the default data directory
    pub database: Option<PathBuf>,
    /// Writer-specific configuration
    #[serde(default)]
    pub writer: RoleConfig,
    /// Critic-specific configuration
    #[serde(default)]
    pub critic: RoleConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Custom grading rubric; must sum to 100 points
    #[serde(default)]
    pub rubric: Vec<Criterion>,
}

/// Configuration for a specific role (writer or critic)
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub command: Option<PathBuf>,
    pub args: Option<Vec<String>>,
    pub temperature: Option<f32>,
}

/// `[retry]` table
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Calls per oracle request, including the first
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    /// Upper bound on one writer or critic call, in seconds
    pub call_timeout_secs: Option<u64>,
}

/// Which side of the loop a setting is resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Writer,
    Critic,
}

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        Self::load_from(&config_path).map(Some)
    }

    /// Load a specific config file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn role(&self, role: Role) -> &RoleConfig {
        match role {
            Role::Writer => &self.writer,
            Role::Critic => &self.critic,
        }
    }

    /// Get the effective provider for a role.
    /// Priority: [role].provider > global provider > ollama
    pub fn provider(&self, role: Role) -> Result<ProviderKind> {
        match self.role(role).provider.as_deref().or(self.provider.as_deref()) {
            Some(name) => name.parse().map_err(anyhow::Error::msg),
            None => Ok(ProviderKind::default()),
        }
    }

    /// Get the effective model for a role.
    /// Priority: [role].model > global model > None
    pub fn model(&self, role: Role) -> Option<&str> {
        self.role(role).model.as_deref().or(self.model.as_deref())
    }

    pub fn temperature(&self, role: Role) -> Option<f32> {
        self.role(role).temperature
    }

    /// Resolve oracle settings for a role. `provider` and `model` are CLI
    /// overrides and win over the file.
    pub fn oracle_settings(
        &self,
        role: Role,
        provider: Option<ProviderKind>,
        model: Option<&str>,
    ) -> Result<OracleSettings> {
        let provider = match provider {
            Some(p) => p,
            None => self.provider(role)?,
        };
        let section = self.role(role);
        let mut settings = OracleSettings::new(provider);

        if let Some(model) = model.or(self.model(role)) {
            settings = settings.with_model(model);
        }
        if let Some(base_url) = section.base_url.as_deref().or(self.base_url.as_deref()) {
            settings = settings.with_base_url(base_url);
        }
        if let Some(command) = section.command.as_ref().or(self.command.as_ref()) {
            let args = section.args.clone().unwrap_or_else(|| self.args.clone());
            settings = settings.with_command(command.clone(), args);
        }
        if let Some(secs) = self.timeout_secs {
            settings = settings.with_timeout(Duration::from_secs(secs));
        }
        if provider == ProviderKind::OpenAi {
            let var = self.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
            if let Ok(key) = std::env::var(var) {
                settings = settings.with_api_key(key);
            }
        }

        Ok(settings)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        let mut policy = RetryPolicy::new(
            self.retry.max_attempts.unwrap_or(defaults.max_attempts),
            self.retry
                .base_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
        );
        if let Some(ms) = self.retry.max_delay_ms {
            policy = policy.with_max_delay(Duration::from_millis(ms));
        }
        policy
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    /// Build the session configuration. CLI values win over the file.
    pub fn session_config(
        &self,
        threshold: Option<f64>,
        max_iterations: Option<usize>,
    ) -> Result<SessionConfig> {
        let threshold = threshold.or(self.threshold).unwrap_or(DEFAULT_THRESHOLD);
        let max_iterations = max_iterations
            .or(self.max_iterations)
            .unwrap_or(DEFAULT_MAX_ITERATIONS);

        let mut config = if self.rubric.is_empty() {
            SessionConfig::new(threshold, max_iterations, Rubric::default().into())
        } else {
            SessionConfig::from_criteria(threshold, max_iterations, self.rubric.clone())
                .context("Invalid [[rubric]] in config")?
        };

        config = config.with_retry(self.retry_policy());
        if let Some(secs) = self.retry.call_timeout_secs {
            config = config.with_call_timeout(Duration::from_secs(secs));
        }
        Ok(config)
    }
}
