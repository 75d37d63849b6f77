//! Markdown export of finished articles.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use draftloops_core::SessionRecord;
use draftloops_critic::format_points;

/// Longest feedback excerpt kept per iteration in the grading history
const FEEDBACK_PREVIEW_CHARS: usize = 200;

/// URL-friendly slug: lowercase, word characters only, single hyphens.
pub fn slugify(text: &str) -> String {
    let kept: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();

    let mut slug = String::with_capacity(kept.len());
    let mut pending_hyphen = false;
    for c in kept.chars() {
        if c == '-' || c.is_whitespace() {
            pending_hyphen = true;
        } else {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        }
    }
    slug
}

/// `{dir}/{YYYY-MM-DD}-{slug}.md`
pub fn article_path(dir: &Path, record: &SessionRecord) -> PathBuf {
    let slug = match slugify(&record.topic) {
        s if s.is_empty() => "article".to_string(),
        s => s,
    };
    dir.join(format!("{}-{}.md", record.date.format("%Y-%m-%d"), slug))
}

/// Render the delivered draft with front matter and grading history.
/// `None` when the session produced no draft.
pub fn render_markdown(record: &SessionRecord, model: &str) -> Option<String> {
    let text = record.final_text()?;
    let score = record.final_score.map(format_points).unwrap_or_default();
    let grade = record
        .final_grade
        .map(|g| g.to_string())
        .unwrap_or_default();
    let source = record.sources.first();
    let generated = record
        .ended_at
        .unwrap_or(record.started_at)
        .format("%Y-%m-%dT%H:%M:%SZ");

    let mut out = String::new();
    out.push_str("---\n");
    let _ = writeln!(out, "title: \"{}\"", escape_quotes(&record.topic));
    let _ = writeln!(out, "date: {}", record.date.format("%Y-%m-%d"));
    if let Some(source) = source {
        let _ = writeln!(
            out,
            "source_episode: \"{}\"",
            escape_quotes(&source.episode_title)
        );
        let _ = writeln!(
            out,
            "source_podcast: \"{}\"",
            escape_quotes(&source.podcast_title)
        );
    }
    let _ = writeln!(out, "final_grade: \"{}\"", grade);
    let _ = writeln!(out, "final_score: {}", score);
    let _ = writeln!(out, "status: {}", record.status);
    let _ = writeln!(out, "model: \"{}\"", escape_quotes(model));
    let _ = writeln!(out, "session_id: {}", record.id);
    out.push_str("---\n\n");

    let _ = writeln!(out, "# {}\n", record.topic);
    out.push_str(text.trim());
    out.push_str("\n\n---\n\n## Generation Notes\n\n");

    let _ = writeln!(out, "- **Final Grade**: {} ({}/100)", grade, score);
    let _ = writeln!(out, "- **Iterations**: {}", record.iterations());
    if let Some(best) = record.best_iteration {
        let _ = writeln!(out, "- **Delivered Draft**: iteration {}", best);
    }
    match record.sources.as_slice() {
        [] => {}
        [only] => {
            let _ = writeln!(
                out,
                "- **Source**: {} from {}",
                only.episode_title, only.podcast_title
            );
        }
        many => {
            let _ = writeln!(out, "- **Sources**: {} episodes", many.len());
        }
    }
    let _ = writeln!(out, "- **Generated**: {}", generated);

    out.push_str("\n### Grading History\n");
    for entry in &record.history {
        let grade = &entry.grade;
        let label = if grade.is_degraded() {
            "ungraded".to_string()
        } else {
            grade.letter_grade.to_string()
        };
        let feedback = grade.feedback();
        let preview: String = feedback.chars().take(FEEDBACK_PREVIEW_CHARS).collect();
        let _ = write!(
            out,
            "\n**Iteration {}**: {} ({}/100)\n{}",
            entry.iteration(),
            label,
            format_points(grade.total_score),
            preview.trim_end()
        );
        if feedback.chars().count() > FEEDBACK_PREVIEW_CHARS {
            out.push_str("...");
        }
        out.push('\n');
    }

    Some(out)
}

/// Write the article under `dir`. Returns the file path, or `None` when
/// there is no draft to export.
pub fn export_article(dir: &Path, record: &SessionRecord, model: &str) -> Result<Option<PathBuf>> {
    let Some(content) = render_markdown(record, model) else {
        return Ok(None);
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = article_path(dir, record);
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(Some(path))
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
