use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use crate::{Oracle, OracleError, OracleRequest, OracleResponse, ProcessSpawner, ProviderKind};

/// Local CLI oracle, e.g. `ollama run llama3.2`
///
/// The flattened prompt is written to stdin and stdout is the answer.
pub struct CommandOracle {
    binary_path: PathBuf,
    args: Vec<String>,
    model: Option<String>,
}

impl CommandOracle {
    pub fn new(binary_path: PathBuf, args: Vec<String>) -> Self {
        Self {
            binary_path,
            args,
            model: None,
        }
    }

    /// Record the model name for logs; it is not passed to the binary
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[async_trait]
impl Oracle for CommandOracle {
    fn name(&self) -> &str {
        "Command"
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::Command
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    async fn invoke(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError> {
        debug!(
            oracle = self.name(),
            binary = %self.binary_path.display(),
            prompt_len = request.prompt.len(),
            "Invoking oracle"
        );

        let output = ProcessSpawner::spawn(&self.binary_path, &self.args, &request.flattened()).await?;

        if output.exit_code != 0 {
            return Err(OracleError::ExecutionFailed(format!(
                "{} exited with code {}: {}",
                self.binary_path.display(),
                output.exit_code,
                output.stderr.lines().last().unwrap_or("")
            )));
        }

        OracleResponse::new(&output.stdout, self.model.clone(), output.duration)
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary_path)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}
