use draftloops_critic::RubricError;
use draftloops_oracle::OracleError;
use thiserror::Error;

/// Problems with a session's parameters, raised before any oracle call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid rubric: {0}")]
    Rubric(#[from] RubricError),

    #[error("Threshold must be within 0..=100, got {0}")]
    Threshold(f64),

    #[error("max_iterations must be at least 1")]
    MaxIterations,

    #[error("Topic cannot be empty")]
    EmptyTopic,
}

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Writer failed on draft {iteration}: {source}")]
    GeneratorFailure {
        iteration: usize,
        #[source]
        source: OracleError,
    },

    #[error("Loop was interrupted")]
    Interrupted,

    #[error("Session has already been finalized")]
    AlreadyFinalized,
}

impl LoopError {
    /// Process exit code for a run that ended in this error
    pub fn exit_code(&self) -> i32 {
        match self {
            LoopError::Interrupted => 130,
            _ => 2,
        }
    }
}
