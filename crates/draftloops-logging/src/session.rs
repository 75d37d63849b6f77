use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Each line type in the session JSONL file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionLine {
    SessionStart {
        timestamp: DateTime<Utc>,
        session_id: String,
        topic: String,
        writer: String,
        critic: String,
        writer_model: Option<String>,
        critic_model: Option<String>,
        threshold: f64,
        max_iterations: usize,
    },
    Iteration {
        iteration: usize,
        draft: String,
        total_score: f64,
        letter_grade: String,
        accepted: bool,
        feedback: String,
        degraded: Option<String>,
        timestamp: DateTime<Utc>,
    },
    SessionEnd {
        status: String,
        iterations: usize,
        best_iteration: Option<usize>,
        final_score: Option<f64>,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },
}

/// Writes session data as JSONL to a file in ~/.local/share/draftloops/sessions/.
pub struct SessionWriter {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl SessionWriter {
    /// Open a new session file in the default sessions directory. The file
    /// name is the current UTC timestamp plus a short hash of the topic.
    pub fn new(topic: &str) -> io::Result<Self> {
        Self::in_dir(&Self::sessions_dir()?, topic)
    }

    /// Open a new session file under `dir`
    pub fn in_dir(dir: &Path, topic: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;

        let now = Utc::now();
        let timestamp_str = now.format("%Y-%m-%dT%H-%M-%SZ").to_string();

        let filename = format!("{}_{}.jsonl", timestamp_str, short_hash(topic));
        let path = dir.join(filename);

        let file = File::create(&path)?;

        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one line and flush it.
    pub fn write(&self, line: &SessionLine) {
        if let Ok(json) = serde_json::to_string(line) {
            if let Ok(mut writer) = self.file.lock() {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
    }

    /// Read back every line of a session file
    pub fn read_lines(path: &Path) -> io::Result<Vec<SessionLine>> {
        let contents = fs::read_to_string(path)?;
        contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(io::Error::other))
            .collect()
    }

    fn sessions_dir() -> io::Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine data directory",
            )
        })?;
        Ok(data_dir.join("draftloops").join("sessions"))
    }
}

/// First six hex characters of the SHA-256 of `text`
pub(crate) fn short_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = hex::encode(hasher.finalize());
    hash[..6].to_string()
}
