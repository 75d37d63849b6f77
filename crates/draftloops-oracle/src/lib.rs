//! # draftloops-oracle
//!
//! Transport layer between the draft/grade loop and a language model.
//!
//! The loop only ever sees [`Oracle::invoke`]: a prompt goes in, text comes
//! out. Which provider answers is decided once, from configuration, by
//! [`create_oracle`].

mod command;
mod http;
mod ollama;
mod openai;
mod output;
mod retry;
mod spawner;
mod traits;

pub use command::CommandOracle;
pub use ollama::OllamaOracle;
pub use openai::OpenAiOracle;
pub use output::OracleResponse;
pub use retry::RetryPolicy;
pub use spawner::{ProcessOutput, ProcessSpawner};
pub use traits::{Oracle, OracleError, OracleRequest, OracleSettings, ProviderKind};

/// Create an oracle from resolved settings
pub fn create_oracle(settings: &OracleSettings) -> Result<Box<dyn Oracle>, OracleError> {
    match settings.provider {
        ProviderKind::Ollama => {
            let mut oracle = OllamaOracle::new(settings.timeout)?;
            if let Some(ref base_url) = settings.base_url {
                oracle = oracle.with_base_url(base_url.clone());
            }
            if let Some(ref model) = settings.model {
                oracle = oracle.with_model(model.clone());
            }
            Ok(Box::new(oracle))
        }
        ProviderKind::OpenAi => {
            let api_key = settings.api_key.clone().ok_or_else(|| {
                OracleError::Config("OpenAI provider requires an API key".to_string())
            })?;
            let mut oracle = OpenAiOracle::new(api_key, settings.timeout)?;
            if let Some(ref base_url) = settings.base_url {
                oracle = oracle.with_base_url(base_url.clone());
            }
            if let Some(ref model) = settings.model {
                oracle = oracle.with_model(model.clone());
            }
            Ok(Box::new(oracle))
        }
        ProviderKind::Command => {
            let binary = settings.command.clone().ok_or_else(|| {
                OracleError::Config("Command provider requires a `command`".to_string())
            })?;
            let mut oracle = CommandOracle::new(binary, settings.args.clone());
            if let Some(ref model) = settings.model {
                oracle = oracle.with_model(model.clone());
            }
            Ok(Box::new(oracle))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_create_ollama_with_overrides() {
        let settings = OracleSettings::new(ProviderKind::Ollama)
            .with_model("qwen2.5")
            .with_base_url("http://127.0.0.1:11434");
        let oracle = create_oracle(&settings).unwrap();
        assert_eq!(oracle.provider(), ProviderKind::Ollama);
        assert_eq!(oracle.model(), Some("qwen2.5"));
    }

    #[test]
    fn test_openai_without_key_is_config_error() {
        let result = create_oracle(&OracleSettings::new(ProviderKind::OpenAi));
        assert!(matches!(result, Err(OracleError::Config(_))));
    }

    #[test]
    fn test_command_requires_binary() {
        let result = create_oracle(&OracleSettings::new(ProviderKind::Command));
        assert!(matches!(result, Err(OracleError::Config(_))));

        let settings = OracleSettings::new(ProviderKind::Command).with_command(
            PathBuf::from("ollama"),
            vec!["run".into(), "llama3.2".into()],
        );
        let oracle = create_oracle(&settings).unwrap();
        assert_eq!(oracle.name(), "Command");
    }
}
