use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Structured log events for the draft/grade/revise loop.
///
/// Iteration numbers are 1-based, matching the session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    SessionStarted {
        topic: String,
        writer: String,
        critic: String,
        threshold: f64,
        max_iterations: usize,
    },
    DraftStarted {
        iteration: usize,
        revision: bool,
    },
    DraftCompleted {
        iteration: usize,
        words: usize,
        duration_secs: f64,
    },
    GradingStarted {
        iteration: usize,
    },
    /// The critic reply could not be parsed and grading is being repeated
    GradeRetry {
        iteration: usize,
        error: String,
    },
    GradeDegraded {
        iteration: usize,
        reason: String,
    },
    GradingCompleted {
        iteration: usize,
        total_score: f64,
        letter_grade: String,
        accepted: bool,
    },
    Revising {
        iteration: usize,
        feedback_preview: String,
    },
    Accepted {
        iteration: usize,
        total_score: f64,
        duration_secs: f64,
    },
    Exhausted {
        iterations: usize,
        best_iteration: usize,
        best_score: f64,
        duration_secs: f64,
    },
    Interrupted {
        iterations: usize,
    },
    Failed {
        iteration: usize,
        error: String,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }

    /// Single-line rendering without the timestamp prefix
    fn compact(&self) -> Option<String> {
        let line = match self {
            LogEvent::SessionStarted {
                threshold,
                max_iterations,
                ..
            } => format!("session:start threshold={} max={}", threshold, max_iterations),
            LogEvent::DraftStarted {
                iteration,
                revision,
            } => {
                let kind = if *revision { "revise" } else { "draft" };
                format!("{}:start:{}", kind, iteration)
            }
            LogEvent::DraftCompleted {
                iteration,
                words,
                duration_secs,
            } => format!(
                "draft:done:{} words={} {:.1}s",
                iteration, words, duration_secs
            ),
            LogEvent::GradingStarted { iteration } => format!("grade:start:{}", iteration),
            LogEvent::GradeRetry { iteration, error } => {
                format!("grade:retry:{} {}", iteration, error)
            }
            LogEvent::GradeDegraded { iteration, reason } => {
                format!("grade:degraded:{} {}", iteration, reason)
            }
            LogEvent::GradingCompleted {
                iteration,
                total_score,
                letter_grade,
                accepted,
            } => format!(
                "grade:done:{} {}/100 {} accepted={}",
                iteration, total_score, letter_grade, accepted
            ),
            LogEvent::Revising { .. } => return None,
            LogEvent::Accepted {
                iteration,
                total_score,
                duration_secs,
            } => format!(
                "session:accepted:{} {}/100 {:.1}s",
                iteration, total_score, duration_secs
            ),
            LogEvent::Exhausted {
                iterations,
                best_iteration,
                best_score,
                ..
            } => format!(
                "session:exhausted:{} best={} {}/100",
                iterations, best_iteration, best_score
            ),
            LogEvent::Interrupted { iterations } => {
                format!("session:interrupted:{}", iterations)
            }
            LogEvent::Failed { iteration, error } => format!("error:{}:{}", iteration, error),
        };
        Some(line)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for loop events. Writes to stderr and optionally mirrors every
/// event as JSON into a file.
pub struct Logger {
    format: LogFormat,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            file_writer: Some(Mutex::new(file)),
        })
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                let _ = writeln!(file, "{}", json);
            }
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
        }
    }

    fn log_json(&self, event: &LogEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        match event {
            LogEvent::SessionStarted {
                topic,
                writer,
                critic,
                threshold,
                max_iterations,
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╭─────────────────────────────────────────────────────────────────────╮"
                        .bright_blue()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {}{}",
                    "│".bright_blue(),
                    "draftloops".bold().bright_white(),
                    " ".repeat(57) + &"│".bright_blue().to_string()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Topic:".dimmed(),
                    Self::truncate_with_padding(topic, 60, 67).dimmed()
                );
                let models = format!("{} / {}", writer, critic);
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Writer/Critic:".dimmed(),
                    Self::truncate_with_padding(&models, 52, 59).dimmed()
                );
                let target = format!("{}/100 within {} drafts", threshold, max_iterations);
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Target:".dimmed(),
                    Self::truncate_with_padding(&target, 59, 66).dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╰─────────────────────────────────────────────────────────────────────╯"
                        .bright_blue()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::DraftStarted {
                iteration,
                revision,
            } => {
                let iter_text = format!("─ Draft {} ", iteration);
                let padding = "─".repeat(67usize.saturating_sub(iter_text.chars().count()));
                let _ = writeln!(
                    stderr,
                    "{}{}{}",
                    "┌".bright_blue(),
                    iter_text.bright_blue().bold(),
                    padding.bright_blue()
                );
                let _ = writeln!(stderr);
                let label = if *revision { "REVISE" } else { "WRITE" };
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_cyan(),
                    label.bright_cyan().bold()
                );
            }
            LogEvent::DraftCompleted {
                words,
                duration_secs,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "    {} {} words ({:.1}s)",
                    "✓".bright_green(),
                    words,
                    duration_secs
                );
                let _ = writeln!(stderr);
            }
            LogEvent::GradingStarted { .. } => {
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_magenta(),
                    "GRADE".bright_magenta().bold()
                );
            }
            LogEvent::GradeRetry { error, .. } => {
                let _ = writeln!(
                    stderr,
                    "    {} Unreadable grade, asking again: {}",
                    "↻".bright_yellow(),
                    error.dimmed()
                );
            }
            LogEvent::GradeDegraded { reason, .. } => {
                let _ = writeln!(
                    stderr,
                    "    {} Scored 0: {}",
                    "✗".bright_red(),
                    reason.bright_red()
                );
            }
            LogEvent::GradingCompleted {
                total_score,
                letter_grade,
                accepted,
                ..
            } => {
                let line = format!("Grade: {} ({}/100)", letter_grade, total_score);
                let styled = if *accepted {
                    format!("✓ {}", line).bright_green().to_string()
                } else {
                    format!("→ {}", line).bright_yellow().to_string()
                };
                let _ = writeln!(stderr, "    {}", styled);
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    "└─────────────────────────────────────────────────────────────────────┘"
                        .bright_blue()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::Revising { .. } => {
                // Feedback preview is debug info
            }
            LogEvent::Accepted { .. } | LogEvent::Exhausted { .. } => {
                // Final outcome is printed by the command
            }
            LogEvent::Interrupted { iterations } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} Interrupted after {} graded drafts",
                    "⚠".bright_yellow(),
                    iterations
                );
            }
            LogEvent::Failed { iteration, error } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} Error in draft {}: {}",
                    "✗".bright_red(),
                    iteration,
                    error.bright_red()
                );
            }
        }
    }

    fn log_compact(&self, event: &LogEvent) {
        if let Some(line) = event.compact() {
            let timestamp = chrono::Utc::now().format("%H:%M:%S");
            let _ = writeln!(std::io::stderr(), "[{}] {}", timestamp, line);
        }
    }

    /// Truncate a string and pad to exact width
    fn truncate_with_padding(s: &str, max_len: usize, total_width: usize) -> String {
        let truncated = if s.chars().count() > max_len {
            let head: String = s.chars().take(max_len - 3).collect();
            format!("{}...", head)
        } else {
            s.to_string()
        };

        let padding_needed = total_width.saturating_sub(truncated.chars().count() + 1);
        format!("{}{}│", truncated, " ".repeat(padding_needed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged() {
        let event = LogEvent::GradingCompleted {
            iteration: 2,
            total_score: 88.0,
            letter_grade: "B+".into(),
            accepted: false,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "grading_completed");
        assert_eq!(json["iteration"], 2);
        assert!(event.with_timestamp()["timestamp"].is_string());
    }

    #[test]
    fn test_compact_lines() {
        let started = LogEvent::DraftStarted {
            iteration: 2,
            revision: true,
        };
        assert_eq!(started.compact().as_deref(), Some("revise:start:2"));

        let exhausted = LogEvent::Exhausted {
            iterations: 3,
            best_iteration: 2,
            best_score: 88.5,
            duration_secs: 12.0,
        };
        assert_eq!(
            exhausted.compact().as_deref(),
            Some("session:exhausted:3 best=2 88.5/100")
        );

        let revising = LogEvent::Revising {
            iteration: 1,
            feedback_preview: "tighten".into(),
        };
        assert!(revising.compact().is_none());
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("compact".parse::<LogFormat>(), Ok(LogFormat::Compact));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_truncate_with_padding() {
        let padded = Logger::truncate_with_padding("short", 10, 12);
        assert_eq!(padded, "short      │");
        let cut = Logger::truncate_with_padding("a much longer topic", 10, 12);
        assert_eq!(cut, "a much ... │");
    }

    #[test]
    fn test_file_mirror_is_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.jsonl");
        let logger = Logger::with_file(LogFormat::Compact, &path).unwrap();
        logger.log(&LogEvent::GradingStarted { iteration: 1 });
        logger.log(&LogEvent::Interrupted { iterations: 1 });

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "grading_started");
    }
}
