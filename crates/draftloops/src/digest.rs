use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::info;

use draftloops_core::{DigestExport, EpisodeSummary, SourceDigest};
use draftloops_db::Database;

use crate::articles::parse_date;

#[derive(Subcommand, Debug)]
pub enum DigestAction {
    /// Load a digest export file into the local database
    Import {
        /// JSON file with `{date, total_episodes, summaries}`
        file: PathBuf,
    },

    /// Show the summaries stored for a date
    Show {
        /// Digest date (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List dates that have stored summaries
    Dates,
}

pub fn handle_digest_command(db: &Database, action: DigestAction) -> Result<()> {
    match action {
        DigestAction::Import { file } => {
            let count = import_file(db, &file)?;
            println!(
                "{} Imported {} summaries from {}",
                "✓".bright_green(),
                count,
                file.display()
            );
        }
        DigestAction::Show { date, json } => {
            let date = resolve_date(date.as_deref())?;
            let summaries = db.digests().by_date(date)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else if summaries.is_empty() {
                println!(
                    "{}",
                    format!("No summaries for {}.", date.format("%Y-%m-%d")).dimmed()
                );
            } else {
                print_summaries(date, &summaries);
            }
        }
        DigestAction::Dates => {
            let days = db.digests().dates()?;
            if days.is_empty() {
                println!("{}", "No digests imported.".dimmed());
            }
            for day in days {
                println!("{}  {} episode(s)", day.date.format("%Y-%m-%d"), day.episodes);
            }
        }
    }
    Ok(())
}

pub fn import_file(db: &Database, file: &Path) -> Result<usize> {
    let export = DigestExport::load(file)
        .with_context(|| format!("Failed to load digest {}", file.display()))?;
    let count = db.digests().import(&export)?;
    info!(file = %file.display(), count, "Digest imported");
    Ok(count)
}

/// `--date` value, or today
pub fn resolve_date(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(value) => parse_date(value, "--date"),
        None => Ok(Local::now().date_naive()),
    }
}

/// Source material for a write: the digest file when given, otherwise the
/// summaries stored for `date`.
pub fn load_source(db: &Database, digest_file: Option<&Path>, date: NaiveDate) -> Result<SourceDigest> {
    let mut summaries = match digest_file {
        Some(path) => {
            DigestExport::load(path)
                .with_context(|| format!("Failed to load digest {}", path.display()))?
                .summaries
        }
        None => db.digests().by_date(date)?,
    };

    if summaries.is_empty() {
        anyhow::bail!(
            "No summaries found for {}. Import a digest with `draftloops digest import <file>` or pass --digest-file.",
            date.format("%Y-%m-%d")
        );
    }

    summaries.sort_by(|a, b| {
        (&a.podcast_title, &a.episode_title).cmp(&(&b.podcast_title, &b.episode_title))
    });
    Ok(SourceDigest::from_summaries(&summaries)?)
}

fn print_summaries(date: NaiveDate, summaries: &[EpisodeSummary]) {
    println!(
        "{}",
        format!("=== Digest {} ({} episodes) ===", date.format("%Y-%m-%d"), summaries.len())
            .bright_blue()
            .bold()
    );
    for s in summaries {
        println!();
        println!("{} {}", s.podcast_title.bright_cyan(), s.episode_title.bold());
        if !s.key_topics.is_empty() {
            println!("  {} {}", "Topics:".dimmed(), s.key_topics.join(", "));
        }
        if !s.themes.is_empty() {
            println!("  {} {}", "Themes:".dimmed(), s.themes.join(", "));
        }
        if !s.startups.is_empty() {
            println!("  {} {}", "Startups:".dimmed(), s.startups.join(", "));
        }
        let preview: String = s.full_summary.chars().take(300).collect();
        if !preview.is_empty() {
            println!("  {}", preview);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT: &str = r#"{
        "date": "2025-01-15",
        "total_episodes": 2,
        "summaries": [
            {"episode_title": "Zed", "podcast_title": "Beta Pod", "full_summary": "Later."},
            {"episode_title": "Alpha", "podcast_title": "Alpha Pod", "full_summary": "First.",
             "key_topics": ["AI"], "quotes": ["\"Ship it\""]}
        ]
    }"#;

    fn write_export(dir: &Path) -> PathBuf {
        let path = dir.join("digest.json");
        std::fs::write(&path, EXPORT).unwrap();
        path
    }

    #[test]
    fn test_import_then_load_from_db() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let file = write_export(dir.path());

        assert_eq!(import_file(&db, &file).unwrap(), 2);

        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let digest = load_source(&db, None, date).unwrap();
        assert_eq!(digest.sources.len(), 2);
        assert_eq!(digest.sources[0].podcast_title, "Alpha Pod");
        assert_eq!(digest.date, Some(date));
        assert!(digest.source_text.contains("First."));
    }

    #[test]
    fn test_load_from_file_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let file = write_export(dir.path());

        let other_day = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let digest = load_source(&db, Some(&file), other_day).unwrap();
        assert_eq!(digest.sources[0].episode_title, "Alpha");
        assert_eq!(digest.sources[1].episode_title, "Zed");
    }

    #[test]
    fn test_missing_digest_is_error() {
        let db = Database::open_in_memory().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let err = load_source(&db, None, date).unwrap_err();
        assert!(err.to_string().contains("No summaries found for 2025-01-15"));
    }

    #[test]
    fn test_resolve_date() {
        assert_eq!(
            resolve_date(Some("2025-01-15")).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
        );
        assert!(resolve_date(Some("yesterday")).is_err());
        assert_eq!(resolve_date(None).unwrap(), Local::now().date_naive());
    }
}
