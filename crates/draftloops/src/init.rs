//! Initialization for draftloops.
//!
//! Writes a commented `draftloops.toml` into the working directory.

use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

use draftloops_oracle::{create_oracle, OracleSettings, ProviderKind};

use crate::config::CONFIG_FILE_NAME;

pub const DEFAULT_CONFIG: &str = r#"# draftloops configuration

# Provider for both writer and critic: "ollama", "openai" or "command"
provider = "ollama"
model = "llama3.2"
# base_url = "http://localhost:11434"
# api_key_env = "OPENAI_API_KEY"
# timeout_secs = 300

# Command provider: prompt goes to stdin, answer is read from stdout
# command = "ollama"
# args = ["run", "llama3.2"]

# Minimum total score (0-100) for a draft to be accepted
threshold = 91.0
max_iterations = 3
output_dir = "articles"

# Override per-role:
# [writer]
# model = "llama3.2"
# temperature = 0.7

# [critic]
# provider = "openai"
# model = "gpt-4o-mini"
# temperature = 0.2

[retry]
max_attempts = 3
base_delay_ms = 1000
max_delay_ms = 30000
# call_timeout_secs = 600

# Custom rubric. Criteria must add up to 100 points.
# [[rubric]]
# name = "Clarity of Thesis"
# max_points = 20
# description = "Is the main argument clear and well-defined?"
"#;

/// Write the default config into `dir`. Returns the path written.
pub fn write_default_config(dir: &Path, force: bool) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILE_NAME);

    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists. Use --force to replace it.",
            config_path.display()
        );
    }

    fs::write(&config_path, DEFAULT_CONFIG)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    Ok(config_path)
}

pub async fn handle_init(dir: &Path, force: bool) -> Result<()> {
    eprintln!("{}", "Setting up draftloops...".bold());
    eprintln!();

    let config_path = write_default_config(dir, force)?;
    eprintln!(
        "{} Config saved to {}",
        "✓".bright_green(),
        config_path.display()
    );

    // The default config points at a local Ollama server
    eprintln!();
    eprintln!("{}", "Checking for a local Ollama server...".dimmed());
    let ollama = create_oracle(&OracleSettings::new(ProviderKind::Ollama))?;
    if ollama.is_available().await {
        eprintln!("  {} Ollama is running", "✓".bright_green());
    } else {
        eprintln!(
            "  {} Ollama not reachable. Start it, or set another provider in {}",
            "⚠".bright_yellow(),
            CONFIG_FILE_NAME
        );
    }

    print_getting_started();
    Ok(())
}

/// Print the getting started guide
pub fn print_getting_started() {
    eprintln!();
    eprintln!("{}", "Getting started:".bold());
    eprintln!(
        "  {} Import a digest: {}",
        "1.".dimmed(),
        "draftloops digest import digest.json".bright_cyan()
    );
    eprintln!(
        "  {} Write an article: {}",
        "2.".dimmed(),
        "draftloops write --topic \"...\"".bright_cyan()
    );
    eprintln!(
        "  {} Review results: {}",
        "3.".dimmed(),
        "draftloops articles list".bright_cyan()
    );
}
