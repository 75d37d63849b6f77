use async_trait::async_trait;
use draftloops_oracle::{Oracle, OracleError, OracleRequest};
use tracing::{debug, info};

use crate::session::HistoryEntry;
use crate::{SourceDigest, WriterPrompts};

/// What the writer needs to revise its previous draft
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    /// Iteration the feedback was given on
    pub iteration: usize,
    pub previous_draft: String,
    /// Per-criterion comments
    pub notes: String,
    pub total_score: f64,
}

impl Feedback {
    pub fn from_entry(entry: &HistoryEntry) -> Self {
        Self {
            iteration: entry.iteration(),
            previous_draft: entry.draft.text.clone(),
            notes: entry.grade.feedback(),
            total_score: entry.grade.total_score,
        }
    }
}

/// Writes an article from a topic and source material, or revises one given
/// feedback on the previous draft.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        topic: &str,
        digest: &SourceDigest,
        feedback: Option<&Feedback>,
    ) -> Result<String, OracleError>;

    /// Name shown in logs
    fn label(&self) -> String {
        "writer".to_string()
    }
}

/// Generator backed by a language model oracle
pub struct OracleGenerator<'a> {
    oracle: &'a dyn Oracle,
    temperature: Option<f32>,
}

impl<'a> OracleGenerator<'a> {
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
impl Generator for OracleGenerator<'_> {
    async fn generate(
        &self,
        topic: &str,
        digest: &SourceDigest,
        feedback: Option<&Feedback>,
    ) -> Result<String, OracleError> {
        let prompt = match feedback {
            Some(feedback) => WriterPrompts::build_revision_prompt(topic, digest, feedback),
            None => WriterPrompts::build_draft_prompt(topic, digest),
        };

        debug!(
            oracle = self.oracle.name(),
            prompt_len = prompt.len(),
            revision = feedback.is_some(),
            "Running writer"
        );

        let mut request = OracleRequest::new(prompt).with_system(WriterPrompts::system());
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }

        let response = self.oracle.invoke(&request).await?;

        info!(
            duration_secs = response.duration.as_secs_f64(),
            words = response.word_count(),
            "Writer completed"
        );

        Ok(response.text)
    }

    fn label(&self) -> String {
        oracle_label(self.oracle)
    }
}

/// `name (model)` for an oracle
pub fn oracle_label(oracle: &dyn Oracle) -> String {
    match oracle.model() {
        Some(model) => format!("{} ({})", oracle.name(), model),
        None => oracle.name().to_string(),
    }
}
