use async_trait::async_trait;
use draftloops_oracle::{Oracle, OracleError, OracleRequest};
use tracing::{debug, info};

use crate::{CriticPrompts, GradeParseError, Rubric, ScoreSheet};

/// Inputs for one grading call
#[derive(Clone, Copy)]
pub struct GradeRequest<'a> {
    pub draft_text: &'a str,
    pub rubric: &'a Rubric,
    /// Parse error from the previous attempt on the same draft
    pub previous_error: Option<&'a str>,
}

impl<'a> GradeRequest<'a> {
    pub fn new(draft_text: &'a str, rubric: &'a Rubric) -> Self {
        Self {
            draft_text,
            rubric,
            previous_error: None,
        }
    }

    pub fn after_error(mut self, error: &'a str) -> Self {
        self.previous_error = Some(error);
        self
    }
}

/// Scores a draft against a rubric. Implementations are not assumed to be
/// deterministic.
#[async_trait]
pub trait Critic: Send + Sync {
    async fn grade(&self, request: GradeRequest<'_>) -> Result<ScoreSheet, CriticError>;

    /// Name shown in logs
    fn label(&self) -> String {
        "critic".to_string()
    }
}

/// Critic backed by a language model oracle
pub struct OracleCritic<'a> {
    oracle: &'a dyn Oracle,
    temperature: Option<f32>,
}

impl<'a> OracleCritic<'a> {
    pub fn new(oracle: &'a dyn Oracle) -> Self {
        Self {
            oracle,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
impl Critic for OracleCritic<'_> {
    async fn grade(&self, request: GradeRequest<'_>) -> Result<ScoreSheet, CriticError> {
        let prompt = match request.previous_error {
            Some(problem) => {
                CriticPrompts::build_reformat_prompt(request.draft_text, request.rubric, problem)
            }
            None => CriticPrompts::build_grading_prompt(request.draft_text, request.rubric),
        };

        debug!(
            oracle = self.oracle.name(),
            prompt_len = prompt.len(),
            reformat = request.previous_error.is_some(),
            "Running critic"
        );

        let mut oracle_request = OracleRequest::new(prompt).with_system(CriticPrompts::system());
        if let Some(temperature) = self.temperature {
            oracle_request = oracle_request.with_temperature(temperature);
        }

        let response = self.oracle.invoke(&oracle_request).await?;

        info!(
            duration_secs = response.duration.as_secs_f64(),
            response_len = response.text.len(),
            "Critic completed"
        );

        Ok(ScoreSheet::parse(&response.text, request.rubric)?)
    }

    fn label(&self) -> String {
        match self.oracle.model() {
            Some(model) => format!("{} ({})", self.oracle.name(), model),
            None => self.oracle.name().to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CriticError {
    #[error("Critic oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Failed to parse critic grade: {0}")]
    Parse(#[from] GradeParseError),
}
