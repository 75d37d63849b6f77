use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Points every rubric must add up to
pub const RUBRIC_TOTAL_POINTS: u32 = 100;

/// One named, point-weighted grading criterion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    pub max_points: u32,
    /// Question shown to the critic for this criterion
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Criterion {
    pub fn new(name: impl Into<String>, max_points: u32) -> Self {
        Self {
            name: name.into(),
            max_points,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RubricError {
    #[error("Rubric has no criteria")]
    Empty,

    #[error("Rubric criteria must sum to 100 points, got {0}")]
    WrongTotal(u32),

    #[error("Rubric criterion name cannot be empty")]
    EmptyName,

    #[error("Rubric criterion '{0}' must be worth at least one point")]
    ZeroPoints(String),

    #[error("Rubric criterion '{0}' appears more than once")]
    DuplicateCriterion(String),
}

/// Fixed, ordered grading schema. Validated on construction and immutable
/// afterwards; share it between sessions behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RubricRepr", into = "RubricRepr")]
pub struct Rubric {
    criteria: Vec<Criterion>,
}

/// Unvalidated serde shape of a rubric
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RubricRepr {
    criteria: Vec<Criterion>,
}

impl TryFrom<RubricRepr> for Rubric {
    type Error = RubricError;

    fn try_from(repr: RubricRepr) -> Result<Self, Self::Error> {
        Rubric::new(repr.criteria)
    }
}

impl From<Rubric> for RubricRepr {
    fn from(rubric: Rubric) -> Self {
        RubricRepr {
            criteria: rubric.criteria,
        }
    }
}

impl Rubric {
    pub fn new(criteria: Vec<Criterion>) -> Result<Self, RubricError> {
        if criteria.is_empty() {
            return Err(RubricError::Empty);
        }

        let mut seen = HashSet::new();
        for criterion in &criteria {
            let key = normalize_name(&criterion.name);
            if key.is_empty() {
                return Err(RubricError::EmptyName);
            }
            if criterion.max_points == 0 {
                return Err(RubricError::ZeroPoints(criterion.name.clone()));
            }
            if !seen.insert(key) {
                return Err(RubricError::DuplicateCriterion(criterion.name.clone()));
            }
        }

        let total = criteria
            .iter()
            .try_fold(0u32, |acc, c| acc.checked_add(c.max_points))
            .ok_or(RubricError::WrongTotal(u32::MAX))?;
        if total != RUBRIC_TOTAL_POINTS {
            return Err(RubricError::WrongTotal(total));
        }

        Ok(Self { criteria })
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Look up a criterion by name, ignoring case and surrounding whitespace
    pub fn position(&self, name: &str) -> Option<usize> {
        let key = normalize_name(name);
        self.criteria
            .iter()
            .position(|c| normalize_name(&c.name) == key)
    }
}

impl Default for Rubric {
    /// The five-part essay rubric used for blog posts
    fn default() -> Self {
        Self {
            criteria: vec![
                Criterion::new("Hook/Opening", 20)
                    .with_description("Does it grab attention immediately?"),
                Criterion::new("Argument Clarity", 20)
                    .with_description("Is the main point clear and well-supported?"),
                Criterion::new("Evidence and Examples", 20)
                    .with_description("Are quotes and examples used effectively?"),
                Criterion::new("Paragraph Structure", 20)
                    .with_description("Do paragraphs flow smoothly with good transitions?"),
                Criterion::new("Conclusion Strength", 20)
                    .with_description("Does it tie back and leave a lasting impact?"),
            ],
        }
    }
}

pub(crate) fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
