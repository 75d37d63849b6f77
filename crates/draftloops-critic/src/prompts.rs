use crate::Rubric;

/// Longest draft passed to the critic verbatim
const MAX_DRAFT_CHARS: usize = 20_000;

/// Prompt templates for the critic
pub struct CriticPrompts;

impl CriticPrompts {
    /// System role for the grading oracle
    pub fn system() -> &'static str {
        "You are an experienced AP English teacher grading blog posts. \
         You are fair, specific, and strict about the rubric."
    }

    /// Build the grading prompt for one draft
    pub fn build_grading_prompt(draft: &str, rubric: &Rubric) -> String {
        let mut criteria = String::new();
        for c in rubric.criteria() {
            if c.description.is_empty() {
                criteria.push_str(&format!("- {} ({} points)\n", c.name, c.max_points));
            } else {
                criteria.push_str(&format!(
                    "- {} ({} points): {}\n",
                    c.name, c.max_points, c.description
                ));
            }
        }

        let example = rubric
            .criteria()
            .iter()
            .map(|c| {
                format!(
                    r#"{{"name": "{}", "score": <0-{}>, "comment": "..."}}"#,
                    c.name, c.max_points
                )
            })
            .collect::<Vec<_>>()
            .join(",\n  ");

        format!(
            r#"Grade the blog post below against this rubric.

## Rubric
{criteria}
## Blog Post
{draft}

---

## Instructions

Score every criterion from 0 up to its maximum. Comments must be specific
enough that the writer can act on them in a revision: point at sentences or
paragraphs, say what is wrong, and say what would be better.

Do not add criteria, drop criteria, or rename them.

## Required Response Format

You may reason briefly first. Then end your response with exactly one grade
block:

<grade>
{{"criteria": [
  {example}
], "summary": "One or two sentences on the post as a whole"}}
</grade>"#,
            criteria = criteria,
            draft = truncate_draft(draft, MAX_DRAFT_CHARS),
            example = example,
        )
    }

    /// Prompt used when the previous response could not be parsed
    pub fn build_reformat_prompt(draft: &str, rubric: &Rubric, problem: &str) -> String {
        format!(
            "Your previous grade could not be read: {problem}\n\n{prompt}",
            problem = problem,
            prompt = Self::build_grading_prompt(draft, rubric),
        )
    }
}

fn truncate_draft(draft: &str, max_len: usize) -> &str {
    if draft.len() <= max_len {
        return draft;
    }
    let mut end = max_len;
    while !draft.is_char_boundary(end) {
        end -= 1;
    }
    // Prefer a paragraph boundary
    match draft[..end].rfind('\n') {
        Some(pos) => &draft[..pos],
        None => &draft[..end],
    }
}
