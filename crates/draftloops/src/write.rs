use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

use draftloops_core::{
    oracle_label, LoopRunner, OracleGenerator, Session, SessionRecord, SessionStatus,
};
use draftloops_critic::{format_points, OracleCritic};
use draftloops_db::Database;
use draftloops_logging::{Logger, SessionWriter};
use draftloops_oracle::{create_oracle, ProviderKind};

use crate::config::{ProjectConfig, Role};
use crate::digest::{load_source, resolve_date};
use crate::export::export_article;
use crate::social::{generate_social_posts, social_path};

#[derive(Args, Debug)]
pub struct WriteArgs {
    /// Article topic
    #[arg(short, long)]
    pub topic: String,

    /// Digest date to draw from (YYYY-MM-DD, default: today)
    #[arg(long)]
    pub date: Option<String>,

    /// Read summaries from a digest export file instead of the database
    #[arg(long)]
    pub digest_file: Option<PathBuf>,

    /// Minimum total score (0-100) for acceptance
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Maximum drafts to write
    #[arg(short = 'n', long)]
    pub max_iterations: Option<usize>,

    /// Provider for both writer and critic
    #[arg(short, long, value_enum)]
    pub provider: Option<ProviderChoice>,

    /// Provider specifically for the writer
    #[arg(long, value_enum)]
    pub writer_provider: Option<ProviderChoice>,

    /// Provider specifically for the critic
    #[arg(long, value_enum)]
    pub critic_provider: Option<ProviderChoice>,

    /// Model for both roles
    #[arg(short, long)]
    pub model: Option<String>,

    /// Directory for article markdown
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Also generate Twitter and LinkedIn posts
    #[arg(long)]
    pub social: bool,

    /// Output final result as JSON
    #[arg(long)]
    pub json_output: bool,

    /// Dry run: show what would happen without calling any model
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ProviderChoice {
    Ollama,
    Openai,
    Command,
}

impl From<ProviderChoice> for ProviderKind {
    fn from(choice: ProviderChoice) -> Self {
        match choice {
            ProviderChoice::Ollama => ProviderKind::Ollama,
            ProviderChoice::Openai => ProviderKind::OpenAi,
            ProviderChoice::Command => ProviderKind::Command,
        }
    }
}

/// Run one session end to end. Returns the process exit code.
pub async fn handle_write(
    args: WriteArgs,
    config: &ProjectConfig,
    db: &Database,
    logger: Arc<Logger>,
) -> Result<i32> {
    let date = resolve_date(args.date.as_deref())?;
    let digest = load_source(db, args.digest_file.as_deref(), date)?;
    let session_config = config.session_config(args.threshold, args.max_iterations)?;

    let writer_provider = args.writer_provider.or(args.provider).map(ProviderKind::from);
    let critic_provider = args.critic_provider.or(args.provider).map(ProviderKind::from);
    let writer_settings =
        config.oracle_settings(Role::Writer, writer_provider, args.model.as_deref())?;
    let critic_settings =
        config.oracle_settings(Role::Critic, critic_provider, args.model.as_deref())?;

    let mut session = Session::new(args.topic.as_str(), digest, session_config)?;
    let output_dir = args.output_dir.clone().unwrap_or_else(|| config.output_dir());

    if args.dry_run {
        println!("=== Dry Run ===");
        println!("Topic: {}", session.topic());
        println!("Source: {}", session.digest().topic_context);
        println!(
            "Writer: {} {}",
            writer_settings.provider,
            writer_settings.model.as_deref().unwrap_or("(default model)")
        );
        println!(
            "Critic: {} {}",
            critic_settings.provider,
            critic_settings.model.as_deref().unwrap_or("(default model)")
        );
        println!("Threshold: {}", format_points(session.threshold()));
        println!("Max iterations: {}", session.max_iterations());
        let criteria: Vec<String> = session
            .rubric()
            .criteria()
            .iter()
            .map(|c| format!("{} ({})", c.name, c.max_points))
            .collect();
        println!("Rubric: {}", criteria.join(", "));
        println!("Output dir: {}", output_dir.display());
        return Ok(0);
    }

    // Create oracles
    let writer_oracle = create_oracle(&writer_settings).context("Failed to set up writer")?;
    let critic_oracle = create_oracle(&critic_settings).context("Failed to set up critic")?;

    // Verify oracles are available
    if !writer_oracle.is_available().await {
        anyhow::bail!(
            "Writer '{}' is not available. Check that the provider is running or installed.",
            oracle_label(writer_oracle.as_ref())
        );
    }
    if !critic_oracle.is_available().await {
        anyhow::bail!(
            "Critic '{}' is not available. Check that the provider is running or installed.",
            oracle_label(critic_oracle.as_ref())
        );
    }

    let mut generator = OracleGenerator::new(writer_oracle.as_ref());
    if let Some(temperature) = config.temperature(Role::Writer) {
        generator = generator.with_temperature(temperature);
    }
    let mut critic = OracleCritic::new(critic_oracle.as_ref());
    if let Some(temperature) = config.temperature(Role::Critic) {
        critic = critic.with_temperature(temperature);
    }

    let mut runner = LoopRunner::new(&generator, &critic, logger);
    match SessionWriter::new(session.topic()) {
        Ok(writer) => {
            info!(path = %writer.path().display(), "Session log");
            runner = runner.with_session_writer(Arc::new(writer));
        }
        Err(e) => warn!(error = %e, "Could not create session log, continuing without it"),
    }

    // Handle Ctrl+C gracefully
    let interrupt_handle = runner.interrupt_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted. Stopping after the current step...");
        interrupt_handle.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    // Run the loop
    let result = runner.run(&mut session).await;
    let record = session.to_record(result.as_ref().err());

    if let Err(e) = db.articles().save(&record) {
        warn!(error = %e, id = %record.id, "Failed to save article");
    }

    let model = oracle_label(writer_oracle.as_ref());
    let article_path = match export_article(&output_dir, &record, &model) {
        Ok(path) => path,
        Err(e) => {
            warn!(error = %e, "Failed to export article");
            None
        }
    };

    let mut social_file = None;
    if args.social {
        if let (Some(text), Some(path)) = (record.final_text(), article_path.as_deref()) {
            match generate_social_posts(
                writer_oracle.as_ref(),
                &session.config().retry,
                session.topic(),
                text,
            )
            .await
            {
                Ok(posts) => {
                    let target = social_path(path);
                    std::fs::write(&target, posts.to_markdown(session.topic()))
                        .with_context(|| format!("Failed to write {}", target.display()))?;
                    social_file = Some(target);
                }
                Err(e) => warn!(error = %e, "Skipping social posts"),
            }
        }
    }

    // Output result
    if args.json_output {
        let json = serde_json::json!({
            "record": record,
            "article_path": article_path,
            "social_path": social_file,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        print_outcome(&record, article_path.as_deref(), social_file.as_deref());
    }

    Ok(match result {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => e.exit_code(),
    })
}

fn print_outcome(record: &SessionRecord, article: Option<&Path>, social: Option<&Path>) {
    let duration = record
        .ended_at
        .map(|end| (end - record.started_at).num_milliseconds() as f64 / 1000.0)
        .unwrap_or_default();
    let final_score = match (record.final_score, record.final_grade) {
        (Some(score), Some(grade)) => format!("{} ({}/100)", grade, format_points(score)),
        _ => "none".to_string(),
    };

    eprintln!();
    match record.status {
        SessionStatus::Accepted => {
            eprintln!("=== ACCEPTED ===");
            eprintln!("Iterations: {}", record.iterations());
            eprintln!("Final grade: {}", final_score);
        }
        SessionStatus::Exhausted => {
            eprintln!("=== EXHAUSTED ===");
            eprintln!(
                "No draft reached {}/100 in {} iteration(s)",
                format_points(record.threshold),
                record.iterations()
            );
            eprintln!(
                "Best draft: iteration {}, {}",
                record.best_iteration.unwrap_or_default(),
                final_score
            );
        }
        SessionStatus::Interrupted => {
            eprintln!("=== INTERRUPTED ===");
            eprintln!("Stopped after {} iteration(s)", record.iterations());
            eprintln!("Best so far: {}", final_score);
        }
        SessionStatus::Failed | SessionStatus::Running => {
            eprintln!("=== FAILED ===");
            eprintln!(
                "Error after {} iteration(s): {}",
                record.iterations(),
                record.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    eprintln!("Duration: {:.1}s", duration);
    eprintln!("Article ID: {}", record.id);
    if let Some(path) = article {
        eprintln!("Article: {}", path.display());
    }
    if let Some(path) = social {
        eprintln!("Social posts: {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftloops_logging::LogFormat;

    fn args(topic: &str, digest_file: PathBuf) -> WriteArgs {
        WriteArgs {
            topic: topic.into(),
            date: None,
            digest_file: Some(digest_file),
            threshold: None,
            max_iterations: None,
            provider: None,
            writer_provider: None,
            critic_provider: None,
            model: None,
            output_dir: None,
            social: false,
            json_output: false,
            dry_run: true,
        }
    }

    fn digest_file(dir: &Path) -> PathBuf {
        let path = dir.join("digest.json");
        std::fs::write(
            &path,
            r#"{"date": "2025-01-15", "summaries": [
                {"episode_title": "Ep", "podcast_title": "Pod", "full_summary": "Text"}
            ]}"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_provider_choice() {
        assert_eq!(ProviderKind::from(ProviderChoice::Openai), ProviderKind::OpenAi);
        assert_eq!(ProviderKind::from(ProviderChoice::Command), ProviderKind::Command);
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_calls() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let logger = Arc::new(Logger::new(LogFormat::Compact));

        let code = handle_write(
            args("AI agents", digest_file(dir.path())),
            &ProjectConfig::default(),
            &db,
            logger,
        )
        .await
        .unwrap();

        assert_eq!(code, 0);
        assert!(db
            .articles()
            .list(&draftloops_db::ArticleFilter::default())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_bad_threshold_fails_before_any_call() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let logger = Arc::new(Logger::new(LogFormat::Compact));

        let mut bad = args("AI agents", digest_file(dir.path()));
        bad.threshold = Some(150.0);
        bad.dry_run = false;

        let err = handle_write(bad, &ProjectConfig::default(), &db, logger)
            .await
            .unwrap_err();
        assert!(err.to_string().to_lowercase().contains("threshold"));
    }

    #[tokio::test]
    async fn test_missing_digest_fails() {
        let db = Database::open_in_memory().unwrap();
        let logger = Arc::new(Logger::new(LogFormat::Compact));

        let mut no_digest = args("AI agents", PathBuf::new());
        no_digest.digest_file = None;
        no_digest.date = Some("2025-01-15".into());

        assert!(handle_write(no_digest, &ProjectConfig::default(), &db, logger)
            .await
            .is_err());
    }
}
