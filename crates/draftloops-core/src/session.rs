use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use draftloops_critic::{Criterion, GradeResult, Rubric};
use draftloops_oracle::RetryPolicy;

use crate::error::{ConfigError, LoopError};
use crate::outcome::SessionOutcome;
use crate::SourceDigest;

pub const DEFAULT_THRESHOLD: f64 = 91.0;
pub const DEFAULT_MAX_ITERATIONS: usize = 3;

/// One article draft. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    /// 1-based position in the session history
    pub iteration: usize,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Draft {
    pub fn new(iteration: usize, text: impl Into<String>) -> Self {
        Self {
            iteration,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// A draft and the grade it received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub draft: Draft,
    pub grade: GradeResult,
}

impl HistoryEntry {
    pub fn iteration(&self) -> usize {
        self.draft.iteration
    }
}

/// Explicit parameters for one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Minimum total score for acceptance, within 0..=100
    pub threshold: f64,
    pub max_iterations: usize,
    pub rubric: Arc<Rubric>,
    pub retry: RetryPolicy,
    /// Upper bound on a single oracle call
    pub call_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            rubric: Arc::new(Rubric::default()),
            retry: RetryPolicy::default(),
            call_timeout: None,
        }
    }
}

impl SessionConfig {
    pub fn new(threshold: f64, max_iterations: usize, rubric: Arc<Rubric>) -> Self {
        Self {
            threshold,
            max_iterations,
            rubric,
            ..Default::default()
        }
    }

    /// Build a config from raw criteria, validating the rubric
    pub fn from_criteria(
        threshold: f64,
        max_iterations: usize,
        criteria: Vec<Criterion>,
    ) -> Result<Self, ConfigError> {
        let rubric = Rubric::new(criteria)?;
        Ok(Self::new(threshold, max_iterations, Arc::new(rubric)))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.threshold) {
            return Err(ConfigError::Threshold(self.threshold));
        }
        if self.max_iterations < 1 {
            return Err(ConfigError::MaxIterations);
        }
        Ok(())
    }
}

/// One request to turn a topic and a digest into an article.
///
/// History is only appended by the loop runner, and the session is finalized
/// at most once.
#[derive(Debug)]
pub struct Session {
    id: String,
    topic: String,
    digest: SourceDigest,
    config: SessionConfig,
    history: Vec<HistoryEntry>,
    outcome: Option<SessionOutcome>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(
        topic: impl Into<String>,
        digest: SourceDigest,
        config: SessionConfig,
    ) -> Result<Self, LoopError> {
        let topic = topic.into().trim().to_string();
        if topic.is_empty() {
            return Err(ConfigError::EmptyTopic.into());
        }
        config.validate()?;

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            topic,
            digest,
            config,
            history: Vec::new(),
            outcome: None,
            started_at: Utc::now(),
            ended_at: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn digest(&self) -> &SourceDigest {
        &self.digest
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    pub fn max_iterations(&self) -> usize {
        self.config.max_iterations
    }

    pub fn rubric(&self) -> &Rubric {
        &self.config.rubric
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_finalized(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Iteration number the next draft will get
    pub fn next_iteration(&self) -> usize {
        self.history.len() + 1
    }

    /// Highest-scoring entry so far; ties go to the earliest iteration
    pub fn best_entry(&self) -> Option<&HistoryEntry> {
        let mut best: Option<&HistoryEntry> = None;
        for entry in &self.history {
            match best {
                Some(current) if entry.grade.total_score <= current.grade.total_score => {}
                _ => best = Some(entry),
            }
        }
        best
    }

    pub fn best_draft(&self) -> Option<&Draft> {
        self.best_entry().map(|e| &e.draft)
    }

    /// History entry of the delivered draft, or the best so far for an
    /// unfinished session
    pub fn final_entry(&self) -> Option<&HistoryEntry> {
        match self.outcome {
            Some(ref outcome) => {
                let iteration = outcome.draft().iteration;
                self.history.iter().find(|e| e.iteration() == iteration)
            }
            None => self.best_entry(),
        }
    }

    pub(crate) fn record(&mut self, draft: Draft, grade: GradeResult) -> Result<(), LoopError> {
        if self.is_finalized() {
            return Err(LoopError::AlreadyFinalized);
        }
        debug_assert_eq!(draft.iteration, self.next_iteration());
        debug_assert!(self.history.len() < self.config.max_iterations);
        self.history.push(HistoryEntry { draft, grade });
        Ok(())
    }

    pub(crate) fn finalize(&mut self, outcome: SessionOutcome) -> Result<&SessionOutcome, LoopError> {
        if self.outcome.is_some() {
            return Err(LoopError::AlreadyFinalized);
        }
        self.ended_at = Some(Utc::now());
        Ok(self.outcome.insert(outcome))
    }
}
