use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::rubric::{normalize_name, Rubric};

const GRADE_OPEN: &str = "<grade>";
const GRADE_CLOSE: &str = "</grade>";

/// Score and comment for one rubric criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub name: String,
    pub score: f64,
    pub max_points: u32,
    pub comment: String,
}

/// Critic output mapped onto a rubric, before a threshold is applied.
///
/// `scores` is in rubric order and holds exactly one entry per criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSheet {
    pub scores: Vec<CriterionScore>,
    pub summary: String,
}

/// Letter grade derived from a total score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LetterGrade {
    #[serde(rename = "F")]
    F,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "D+")]
    DPlus,
    #[serde(rename = "C-")]
    CMinus,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "C+")]
    CPlus,
    #[serde(rename = "B-")]
    BMinus,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "B+")]
    BPlus,
    #[serde(rename = "A-")]
    AMinus,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "A+")]
    APlus,
}

impl LetterGrade {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 97.0 => LetterGrade::APlus,
            s if s >= 93.0 => LetterGrade::A,
            s if s >= 90.0 => LetterGrade::AMinus,
            s if s >= 87.0 => LetterGrade::BPlus,
            s if s >= 83.0 => LetterGrade::B,
            s if s >= 80.0 => LetterGrade::BMinus,
            s if s >= 77.0 => LetterGrade::CPlus,
            s if s >= 73.0 => LetterGrade::C,
            s if s >= 70.0 => LetterGrade::CMinus,
            s if s >= 67.0 => LetterGrade::DPlus,
            s if s >= 60.0 => LetterGrade::D,
            _ => LetterGrade::F,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LetterGrade::APlus => "A+",
            LetterGrade::A => "A",
            LetterGrade::AMinus => "A-",
            LetterGrade::BPlus => "B+",
            LetterGrade::B => "B",
            LetterGrade::BMinus => "B-",
            LetterGrade::CPlus => "C+",
            LetterGrade::C => "C",
            LetterGrade::CMinus => "C-",
            LetterGrade::DPlus => "D+",
            LetterGrade::D => "D",
            LetterGrade::F => "F",
        }
    }
}

impl std::fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A graded draft: per-criterion scores, their sum, and the verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    pub per_criterion: Vec<CriterionScore>,
    pub total_score: f64,
    pub letter_grade: LetterGrade,
    pub accepted: bool,
    #[serde(default)]
    pub summary: String,
    /// Why this grade was substituted with zeros, if it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

impl GradeResult {
    /// Apply `threshold` to a score sheet
    pub fn evaluate(sheet: ScoreSheet, threshold: f64) -> Self {
        let total_score: f64 = sheet.scores.iter().map(|s| s.score).sum();
        Self {
            letter_grade: LetterGrade::from_score(total_score),
            accepted: total_score >= threshold,
            total_score,
            per_criterion: sheet.scores,
            summary: sheet.summary,
            degraded: None,
        }
    }

    /// Zero score on every criterion, used when no usable grade could be
    /// obtained for a draft
    pub fn degraded(rubric: &Rubric, threshold: f64, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let scores = rubric
            .criteria()
            .iter()
            .map(|c| CriterionScore {
                name: c.name.clone(),
                score: 0.0,
                max_points: c.max_points,
                comment: format!("Not graded: {}", reason),
            })
            .collect();
        let mut grade = Self::evaluate(
            ScoreSheet {
                scores,
                summary: String::new(),
            },
            threshold,
        );
        grade.degraded = Some(reason);
        grade
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn score_for(&self, name: &str) -> Option<&CriterionScore> {
        let key = normalize_name(name);
        self.per_criterion
            .iter()
            .find(|s| normalize_name(&s.name) == key)
    }

    /// Per-criterion comments formatted for a revision prompt
    pub fn feedback(&self) -> String {
        let mut out = String::new();
        for s in &self.per_criterion {
            out.push_str(&format!(
                "- {} ({}/{}): {}\n",
                s.name,
                format_points(s.score),
                s.max_points,
                s.comment.trim()
            ));
        }
        if !self.summary.trim().is_empty() {
            out.push_str(&format!("\nOverall: {}\n", self.summary.trim()));
        }
        out
    }

    /// Short description of the grade for logging
    pub fn short_description(&self) -> String {
        let verdict = if self.accepted { "ACCEPTED" } else { "REVISE" };
        match self.degraded {
            Some(_) => format!("{} 0/100 (ungraded)", verdict),
            None => format!(
                "{} {}/100 ({})",
                verdict,
                format_points(self.total_score),
                self.letter_grade
            ),
        }
    }
}

/// Render a score without a trailing `.0` for whole numbers
pub fn format_points(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{:.0}", score)
    } else {
        format!("{:.1}", score)
    }
}

#[derive(Error, Debug)]
pub enum GradeParseError {
    #[error("No <grade> block found in critic output")]
    NoGradeBlock,

    #[error("Malformed grade block: {0}")]
    MalformedBlock(String),

    #[error("Failed to parse grade JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Grade is missing criterion '{0}'")]
    MissingCriterion(String),

    #[error("Grade contains unknown criterion '{0}'")]
    UnknownCriterion(String),

    #[error("Grade scores criterion '{0}' more than once")]
    DuplicateCriterion(String),

    #[error("Score for '{criterion}' is not a number: {value}")]
    NonNumericScore { criterion: String, value: String },

    #[error("Score for '{criterion}' is {score}, outside 0..={max}")]
    ScoreOutOfRange {
        criterion: String,
        score: f64,
        max: u32,
    },
}

#[derive(Debug, Deserialize)]
struct RawGrade {
    criteria: Vec<RawCriterion>,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct RawCriterion {
    name: String,
    score: serde_json::Value,
    comment: String,
}

impl ScoreSheet {
    /// Parse a critic response against `rubric`.
    ///
    /// Expected format in critic output:
    /// ```text
    /// <grade>
    /// {"criteria": [{"name": "Hook/Opening", "score": 17, "comment": "..."}],
    ///  "summary": "..."}
    /// </grade>
    /// ```
    /// A response that is nothing but the JSON object is accepted too.
    pub fn parse(critic_output: &str, rubric: &Rubric) -> Result<Self, GradeParseError> {
        debug!(output_len = critic_output.len(), "Parsing critic grade");

        let json_str = Self::extract_block(critic_output)?;
        let raw: RawGrade = serde_json::from_str(json_str)?;
        Self::map_onto(raw, rubric)
    }

    fn extract_block(output: &str) -> Result<&str, GradeParseError> {
        let start = output.find(GRADE_OPEN);
        let end = output.rfind(GRADE_CLOSE);

        match (start, end) {
            (Some(start), Some(end)) if start < end => {
                Ok(output[start + GRADE_OPEN.len()..end].trim())
            }
            (Some(_), Some(_)) => Err(GradeParseError::MalformedBlock(
                "closing tag precedes opening tag".to_string(),
            )),
            (Some(_), None) => Err(GradeParseError::MalformedBlock(
                "missing </grade>".to_string(),
            )),
            (None, Some(_)) => Err(GradeParseError::MalformedBlock(
                "missing <grade>".to_string(),
            )),
            (None, None) => {
                let trimmed = output.trim();
                if trimmed.starts_with('{') && trimmed.ends_with('}') {
                    Ok(trimmed)
                } else {
                    Err(GradeParseError::NoGradeBlock)
                }
            }
        }
    }

    fn map_onto(raw: RawGrade, rubric: &Rubric) -> Result<Self, GradeParseError> {
        let mut slots: Vec<Option<CriterionScore>> = vec![None; rubric.len()];

        for entry in raw.criteria {
            let index = rubric
                .position(&entry.name)
                .ok_or_else(|| GradeParseError::UnknownCriterion(entry.name.clone()))?;
            let criterion = &rubric.criteria()[index];

            if slots[index].is_some() {
                return Err(GradeParseError::DuplicateCriterion(criterion.name.clone()));
            }

            let score = entry
                .score
                .as_f64()
                .filter(|s| s.is_finite())
                .ok_or_else(|| GradeParseError::NonNumericScore {
                    criterion: criterion.name.clone(),
                    value: entry.score.to_string(),
                })?;

            if score < 0.0 || score > f64::from(criterion.max_points) {
                return Err(GradeParseError::ScoreOutOfRange {
                    criterion: criterion.name.clone(),
                    score,
                    max: criterion.max_points,
                });
            }

            slots[index] = Some(CriterionScore {
                name: criterion.name.clone(),
                score,
                max_points: criterion.max_points,
                comment: entry.comment.trim().to_string(),
            });
        }

        let mut scores = Vec::with_capacity(slots.len());
        for (slot, criterion) in slots.into_iter().zip(rubric.criteria()) {
            match slot {
                Some(score) => scores.push(score),
                None => return Err(GradeParseError::MissingCriterion(criterion.name.clone())),
            }
        }

        Ok(Self {
            scores,
            summary: raw.summary.trim().to_string(),
        })
    }
}
