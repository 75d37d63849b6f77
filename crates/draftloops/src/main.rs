mod articles;
mod config;
mod digest;
mod export;
mod init;
mod social;
mod write;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use draftloops_db::Database;
use draftloops_logging::{init_tracing, LogFormat, Logger};

use crate::articles::{handle_articles_command, ArticlesAction};
use crate::config::ProjectConfig;
use crate::digest::{handle_digest_command, DigestAction};
use crate::write::{handle_write, WriteArgs};

#[derive(Parser, Debug)]
#[command(
    name = "draftloops",
    about = "Draft, grade and revise articles from podcast digests",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormatChoice,

    /// Diagnostic log level (RUST_LOG overrides)
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Mirror loop events as JSON lines into this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Config file (default: ./draftloops.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write an article about a topic from a day's digest
    Write(WriteArgs),

    /// Manage imported podcast digests
    Digest {
        #[command(subcommand)]
        action: DigestAction,
    },

    /// Browse stored articles
    Articles {
        #[command(subcommand)]
        action: ArticlesAction,
    },

    /// Write a default draftloops.toml in the current directory
    Init {
        /// Replace an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_format: LogFormat = cli.log_format.into();
    init_tracing(&cli.log_level, log_format);

    let code = match run(cli, log_format).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".bright_red().bold(), e);
            2
        }
    };

    // Exit with appropriate code
    std::process::exit(code);
}

async fn run(cli: Cli, log_format: LogFormat) -> Result<i32> {
    let working_dir = std::env::current_dir().context("Failed to get current directory")?;

    if let Commands::Init { force } = cli.command {
        init::handle_init(&working_dir, force).await?;
        return Ok(0);
    }

    let config = match cli.config {
        Some(ref path) => ProjectConfig::load_from(path)?,
        None => ProjectConfig::load(&working_dir)?.unwrap_or_default(),
    };
    let db = open_database(cli.database.as_ref().or(config.database.as_ref()))?;

    match cli.command {
        Commands::Write(args) => {
            let logger = match cli.log_file {
                Some(ref path) => Logger::with_file(log_format, path)
                    .with_context(|| format!("Failed to open log file {}", path.display()))?,
                None => Logger::new(log_format),
            };
            handle_write(args, &config, &db, Arc::new(logger)).await
        }
        Commands::Digest { action } => {
            handle_digest_command(&db, action)?;
            Ok(0)
        }
        Commands::Articles { action } => {
            handle_articles_command(&db, action)?;
            Ok(0)
        }
        Commands::Init { .. } => Ok(0),
    }
}

fn open_database(path: Option<&PathBuf>) -> Result<Database> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            Database::open_at(path)
                .with_context(|| format!("Failed to open database {}", path.display()))
        }
        None => Database::open().context("Failed to open database"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_write() {
        let cli = Cli::try_parse_from([
            "draftloops",
            "write",
            "--topic",
            "AI agents",
            "--threshold",
            "85",
            "-n",
            "4",
            "--provider",
            "openai",
            "--log-format",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Write(args) => {
                assert_eq!(args.topic, "AI agents");
                assert_eq!(args.threshold, Some(85.0));
                assert_eq!(args.max_iterations, Some(4));
                assert!(!args.social);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(matches!(cli.log_format, LogFormatChoice::Json));
    }

    #[test]
    fn test_cli_requires_topic() {
        assert!(Cli::try_parse_from(["draftloops", "write"]).is_err());
    }

    #[test]
    fn test_cli_parses_articles_list() {
        let cli = Cli::try_parse_from([
            "draftloops",
            "articles",
            "list",
            "--status",
            "accepted",
            "--json",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Articles {
                action: ArticlesAction::List { json: true, .. }
            }
        ));
    }

    #[test]
    fn test_open_database_at_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("draftloops.db");
        open_database(Some(&path)).unwrap();
        assert!(path.exists());
    }
}
