use crate::{Feedback, SourceDigest};

const STYLE_GUIDELINES: &str = "\
- 500 words or less
- No section headers
- Flowing paragraphs that transition smoothly
- At most two long sentences per paragraph
- A strong hook in the first few sentences
- A conclusion that ties back to the opening
- Actionable insights over summary
- Specific examples and quotes where they help";

/// Prompt templates for the writer
pub struct WriterPrompts;

impl WriterPrompts {
    /// System role for the writing oracle
    pub fn system() -> &'static str {
        "You are an expert blog writer and writing instructor."
    }

    /// Prompt for the first draft
    pub fn build_draft_prompt(topic: &str, digest: &SourceDigest) -> String {
        format!(
            r#"You are an expert blog writer specializing in technology and business content.

## Style Guidelines
{style}

## Topic
{topic}

## Source Material
{context}

{source}

---

Write a compelling blog post that:
1. Opens with a strong hook that draws readers in
2. Presents insights from the podcast content
3. Provides actionable takeaways for business and tech readers
4. Includes relevant quotes to support key points
5. Concludes with a thought-provoking statement that ties back to the opening

Return only the article text. Be concise, engaging, and focused on delivering value quickly."#,
            style = STYLE_GUIDELINES,
            topic = topic,
            context = digest.topic_context,
            source = digest.source_text.trim(),
        )
    }

    /// Prompt for a revision of the previous draft
    pub fn build_revision_prompt(topic: &str, digest: &SourceDigest, feedback: &Feedback) -> String {
        format!(
            r#"You are revising a blog post based on feedback from an AP English teacher.

## Topic
{topic}

## Source Material
{context}

{source}

## Current Draft (scored {score}/100)
{draft}

## Teacher Feedback
{notes}

---

Rewrite the blog post so it addresses every point in the feedback while keeping:
- The core message and insights
- A concise, engaging style (500 words or less, no section headers)
- A strong hook and a conclusion that ties back to it
- Smooth paragraph transitions
- Actionable takeaways

Return the complete revised article, not a list of changes."#,
            topic = topic,
            context = digest.topic_context,
            source = digest.source_text.trim(),
            score = draftloops_critic::format_points(feedback.total_score),
            draft = feedback.previous_draft.trim(),
            notes = feedback.notes.trim(),
        )
    }
}
