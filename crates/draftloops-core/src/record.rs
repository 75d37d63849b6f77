use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use draftloops_critic::LetterGrade;

use crate::outcome::{SessionOutcome, SessionStatus};
use crate::session::{HistoryEntry, Session};
use crate::{LoopError, SourceRef};

/// Serializable snapshot of a session, handed to persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub topic: String,
    /// Digest date, or the start date when the digest has none
    pub date: NaiveDate,
    pub status: SessionStatus,
    pub outcome: Option<SessionOutcome>,
    pub best_iteration: Option<usize>,
    pub final_score: Option<f64>,
    pub final_grade: Option<LetterGrade>,
    pub threshold: f64,
    pub max_iterations: usize,
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Text of the delivered (or best so far) draft
    pub fn final_text(&self) -> Option<&str> {
        let iteration = self.best_iteration?;
        self.history
            .iter()
            .find(|e| e.iteration() == iteration)
            .map(|e| e.draft.text.as_str())
    }

    pub fn iterations(&self) -> usize {
        self.history.len()
    }
}

impl Session {
    /// Snapshot this session. `failure` is the error the run ended with, if
    /// it did not reach an outcome.
    pub fn to_record(&self, failure: Option<&LoopError>) -> SessionRecord {
        let (status, error) = match (self.outcome(), failure) {
            (Some(outcome), _) => (outcome.status(), None),
            (None, Some(LoopError::Interrupted)) => (SessionStatus::Interrupted, None),
            (None, Some(e)) => (SessionStatus::Failed, Some(e.to_string())),
            (None, None) => (SessionStatus::Running, None),
        };

        let final_entry = self.final_entry();
        let ended_at = self
            .ended_at()
            .or_else(|| failure.map(|_| Utc::now()));

        SessionRecord {
            id: self.id().to_string(),
            topic: self.topic().to_string(),
            date: self
                .digest()
                .date
                .unwrap_or_else(|| self.started_at().date_naive()),
            status,
            outcome: self.outcome().cloned(),
            best_iteration: final_entry.map(|e| e.iteration()),
            final_score: final_entry.map(|e| e.grade.total_score),
            final_grade: final_entry.map(|e| e.grade.letter_grade),
            threshold: self.threshold(),
            max_iterations: self.max_iterations(),
            history: self.history().to_vec(),
            sources: self.digest().sources.clone(),
            error,
            started_at: self.started_at(),
            ended_at,
        }
    }
}
