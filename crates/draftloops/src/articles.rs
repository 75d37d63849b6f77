use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Subcommand;
use colored::Colorize;

use draftloops_core::{SessionRecord, SessionStatus};
use draftloops_critic::format_points;
use draftloops_db::{ArticleFilter, ArticleStats, ArticleSummary, Database};

#[derive(Subcommand, Debug)]
pub enum ArticlesAction {
    /// List stored articles
    List {
        /// Filter by status (accepted, exhausted, interrupted, failed)
        #[arg(long)]
        status: Option<String>,

        /// Search topic text
        #[arg(long)]
        topic: Option<String>,

        /// Show articles for digests on or after this date (YYYY-MM-DD)
        #[arg(long)]
        after: Option<String>,

        /// Show articles for digests on or before this date (YYYY-MM-DD)
        #[arg(long)]
        before: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one article with its grading history
    Show {
        /// Article ID or unique prefix
        id: String,

        /// Print every draft, not just the delivered one
        #[arg(long)]
        drafts: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show aggregate statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete an article
    Delete {
        /// Article ID or unique prefix
        id: String,
    },
}

pub fn handle_articles_command(db: &Database, action: ArticlesAction) -> Result<()> {
    match action {
        ArticlesAction::List {
            status,
            topic,
            after,
            before,
            json,
        } => {
            let filter = build_filter(status, topic, after, before)?;
            let summaries = db.articles().list(&filter)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else if summaries.is_empty() {
                println!("{}", "No articles found.".dimmed());
            } else {
                print_articles_table(&summaries);
            }
        }
        ArticlesAction::Show { id, drafts, json } => {
            let record = find_article(db, &id)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_article_detail(&record, drafts);
            }
        }
        ArticlesAction::Stats { json } => {
            let stats = db.articles().stats(&ArticleFilter::default())?;

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats);
            }
        }
        ArticlesAction::Delete { id } => {
            let record = find_article(db, &id)?;
            db.articles().delete(&record.id)?;
            println!("Deleted {}", record.id);
        }
    }

    Ok(())
}

fn find_article(db: &Database, id: &str) -> Result<SessionRecord> {
    db.articles()
        .get(id)?
        .with_context(|| format!("No article matches '{}'", id))
}

pub fn parse_date(value: &str, flag: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("Invalid {} date '{}': {}", flag, value, e))
}

fn build_filter(
    status: Option<String>,
    topic: Option<String>,
    after: Option<String>,
    before: Option<String>,
) -> Result<ArticleFilter> {
    let status = status
        .map(|s| s.parse::<SessionStatus>().map_err(anyhow::Error::msg))
        .transpose()?;
    let after = after.map(|s| parse_date(&s, "--after")).transpose()?;
    let before = before.map(|s| parse_date(&s, "--before")).transpose()?;

    Ok(ArticleFilter {
        status,
        topic,
        after,
        before,
    })
}

fn colored_status(status: SessionStatus) -> String {
    let s = status.as_str();
    match status {
        SessionStatus::Accepted => s.bright_green().to_string(),
        SessionStatus::Failed => s.bright_red().to_string(),
        SessionStatus::Running => s.bright_cyan().to_string(),
        SessionStatus::Exhausted | SessionStatus::Interrupted => s.bright_yellow().to_string(),
    }
}

fn print_articles_table(summaries: &[ArticleSummary]) {
    println!(
        "{:<10} {:<12} {:<12} {:<6} {:<12} {:<8} {}",
        "ID".dimmed(),
        "DATE".dimmed(),
        "STATUS".dimmed(),
        "ITERS".dimmed(),
        "SCORE".dimmed(),
        "DURATION".dimmed(),
        "TOPIC".dimmed(),
    );

    for s in summaries {
        let id: String = s.id.chars().take(8).collect();
        // Pad before coloring so escape codes do not break alignment
        let status = colored_status(s.status);
        let status_pad = " ".repeat(12usize.saturating_sub(s.status.as_str().len()));
        let score = match (s.final_score, s.final_grade) {
            (Some(score), Some(grade)) => format!("{} ({})", format_points(score), grade),
            _ => "-".to_string(),
        };
        let duration = s
            .duration_secs
            .map(format_duration)
            .unwrap_or_else(|| "...".to_string());
        let topic = if s.topic.chars().count() > 50 {
            format!("{}...", s.topic.chars().take(50).collect::<String>())
        } else {
            s.topic.clone()
        };

        println!(
            "{:<10} {:<12} {}{} {:<6} {:<12} {:<8} {}",
            id,
            s.date.format("%Y-%m-%d"),
            status,
            status_pad,
            s.iterations,
            score,
            duration,
            topic
        );
    }
}

fn print_article_detail(record: &SessionRecord, drafts: bool) {
    println!("{}", "=== Article Detail ===".bright_blue().bold());
    println!("{}  {}", "ID:".dimmed(), record.id);
    println!("{}  {}", "Topic:".dimmed(), record.topic);
    println!("{}  {}", "Digest Date:".dimmed(), record.date.format("%Y-%m-%d"));
    println!(
        "{}  {}",
        "Started:".dimmed(),
        record.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("{}  {}", "Status:".dimmed(), colored_status(record.status));
    println!(
        "{}  {}/100 over at most {} iteration(s)",
        "Threshold:".dimmed(),
        format_points(record.threshold),
        record.max_iterations
    );
    if let (Some(score), Some(grade)) = (record.final_score, record.final_grade) {
        println!(
            "{}  {} ({}/100), iteration {}",
            "Final:".dimmed(),
            grade,
            format_points(score),
            record.best_iteration.unwrap_or_default()
        );
    }
    if let Some(ref error) = record.error {
        println!("{}  {}", "Error:".dimmed(), error.bright_red());
    }
    if !record.sources.is_empty() {
        println!("{}", "Sources:".dimmed());
        for source in &record.sources {
            println!("  {} ({})", source.episode_title, source.podcast_title);
        }
    }

    if !record.history.is_empty() {
        println!();
        println!(
            "{}",
            format!("--- Iterations ({}) ---", record.history.len()).dimmed()
        );
        for entry in &record.history {
            let grade = &entry.grade;
            println!();
            println!(
                "  {} {} {}",
                format!("[{}]", entry.iteration()).bright_blue(),
                entry.draft.created_at.format("%H:%M:%S"),
                if grade.accepted {
                    grade.short_description().bright_green().to_string()
                } else {
                    grade.short_description().bright_yellow().to_string()
                }
            );
            println!(
                "    {} {} words",
                "Draft:".dimmed(),
                entry.draft.word_count()
            );
            if let Some(ref reason) = grade.degraded {
                println!("    {} {}", "Degraded:".dimmed(), reason.bright_red());
            }
            for score in &grade.per_criterion {
                println!(
                    "    {:<28} {:>5}/{:<3} {}",
                    score.name,
                    format_points(score.score),
                    score.max_points,
                    score.comment.dimmed()
                );
            }
            if drafts {
                println!();
                for line in entry.draft.text.lines() {
                    println!("    {}", line);
                }
            }
        }
    }

    if !drafts {
        if let Some(text) = record.final_text() {
            println!();
            println!("{}", "--- Delivered Draft ---".dimmed());
            println!("{}", text);
        }
    }
}

fn print_stats(stats: &ArticleStats) {
    println!("{}", "=== Article Statistics ===".bright_blue().bold());
    println!("{}  {}", "Total Articles:".dimmed(), stats.total);
    println!(
        "{}  {} accepted, {} exhausted, {} interrupted, {} failed",
        "Outcomes:".dimmed(),
        stats.accepted,
        stats.exhausted,
        stats.interrupted,
        stats.failed
    );
    println!(
        "{}  {:.1}%",
        "Acceptance Rate:".dimmed(),
        stats.acceptance_rate * 100.0
    );
    println!(
        "{}  {:.1}%",
        "First-Draft Accepts:".dimmed(),
        stats.first_draft_acceptance_rate * 100.0
    );
    println!("{}  {:.1}", "Avg Iterations:".dimmed(), stats.avg_iterations);
    println!("{}  {:.1}", "Avg Final Score:".dimmed(), stats.avg_final_score);
    println!(
        "{}  {:+.1}",
        "Avg Improvement:".dimmed(),
        stats.avg_improvement
    );

    if !stats.by_day.is_empty() {
        println!();
        println!("{}", "By Digest Date:".dimmed());
        for day in &stats.by_day {
            println!("  {}  {}", day.date, day.count);
        }
    }
}

fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.0}s", secs)
    } else {
        let mins = (secs / 60.0).floor() as u64;
        let remaining_secs = (secs % 60.0) as u64;
        format!("{}m {}s", mins, remaining_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter() {
        let filter = build_filter(
            Some("Accepted".into()),
            Some("agents".into()),
            Some("2025-01-01".into()),
            None,
        )
        .unwrap();
        assert_eq!(filter.status, Some(SessionStatus::Accepted));
        assert_eq!(filter.after, NaiveDate::from_ymd_opt(2025, 1, 1));
        assert_eq!(filter.before, None);
    }

    #[test]
    fn test_build_filter_rejects_bad_input() {
        assert!(build_filter(Some("done".into()), None, None, None).is_err());
        assert!(build_filter(None, None, Some("01/02/2025".into()), None).is_err());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42.0), "42s");
        assert_eq!(format_duration(125.0), "2m 5s");
    }

    #[test]
    fn test_show_and_delete_by_prefix() {
        let db = Database::open_in_memory().unwrap();
        let record = crate::export::tests::sample_record();
        db.articles().save(&record).unwrap();

        assert_eq!(find_article(&db, "abc").unwrap().id, "abc123");
        handle_articles_command(&db, ArticlesAction::Delete { id: "abc".into() }).unwrap();
        assert!(find_article(&db, "abc").is_err());
    }
}
