//! Rubric grading: the rubric schema, the critic prompt, and parsing of the
//! critic's `<grade>` block into a [`GradeResult`].

pub mod evaluator;
mod grade;
mod prompts;
mod rubric;

pub use evaluator::{Critic, CriticError, GradeRequest, OracleCritic};
pub use grade::{
    format_points, CriterionScore, GradeParseError, GradeResult, LetterGrade, ScoreSheet,
};
pub use prompts::CriticPrompts;
pub use rubric::{Criterion, Rubric, RubricError, RUBRIC_TOTAL_POINTS};
