use serde::{Deserialize, Serialize};

use crate::Draft;

/// How a finalized session ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The first draft whose grade met the threshold
    Accepted { draft: Draft },
    /// No draft met the threshold; the highest-scoring one
    Exhausted { best: Draft },
}

impl SessionOutcome {
    /// The delivered draft
    pub fn draft(&self) -> &Draft {
        match self {
            Self::Accepted { draft } => draft,
            Self::Exhausted { best } => best,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Accepted { .. } => SessionStatus::Accepted,
            Self::Exhausted { .. } => SessionStatus::Exhausted,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.status().exit_code()
    }
}

/// Status stored with a session record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Accepted,
    Exhausted,
    Interrupted,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Accepted => "accepted",
            Self::Exhausted => "exhausted",
            Self::Interrupted => "interrupted",
            Self::Failed => "failed",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Accepted => 0,
            Self::Exhausted => 1,
            Self::Interrupted => 130,
            Self::Running | Self::Failed => 2,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(Self::Running),
            "accepted" => Ok(Self::Accepted),
            "exhausted" => Ok(Self::Exhausted),
            "interrupted" => Ok(Self::Interrupted),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}
