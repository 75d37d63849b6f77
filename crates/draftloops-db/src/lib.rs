//! Database layer for draftloops.
//!
//! Provides a unified `Database` struct that owns the SQLite connection
//! and provides access to domain-specific stores: episode summaries that
//! feed the writer, and the articles the loop produced.

mod articles;
mod digests;

pub use articles::{ArticleFilter, ArticleStats, ArticleSummary, Articles, DayCount};
pub use digests::{DigestDay, Digests};

use rusqlite::Connection;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The main database struct that owns the SQLite connection.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the default location.
    ///
    /// The default location is `~/.local/share/draftloops/draftloops.db`.
    pub fn open() -> Result<Self, rusqlite::Error> {
        let db_path = Self::default_path();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        Self::open_at(&db_path)
    }

    /// Open or create a database at a specific path.
    pub fn open_at(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Get the default database path.
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("draftloops")
            .join("draftloops.db")
    }

    /// Access the episode summaries store.
    pub fn digests(&self) -> Digests<'_> {
        let conn = self.conn.lock().expect("Database lock poisoned");
        Digests::new(conn)
    }

    /// Access the articles store.
    pub fn articles(&self) -> Articles<'_> {
        let conn = self.conn.lock().expect("Database lock poisoned");
        Articles::new(conn)
    }

    fn init_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                episode_title TEXT NOT NULL,
                podcast_title TEXT NOT NULL,
                full_summary TEXT NOT NULL DEFAULT '',
                key_topics TEXT NOT NULL DEFAULT '[]',
                themes TEXT NOT NULL DEFAULT '[]',
                quotes TEXT NOT NULL DEFAULT '[]',
                startups TEXT NOT NULL DEFAULT '[]',
                digest_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (episode_title, podcast_title, digest_date)
            );

            CREATE INDEX IF NOT EXISTS idx_summaries_digest_date ON summaries(digest_date);

            CREATE TABLE IF NOT EXISTS articles (
                id TEXT PRIMARY KEY,
                topic TEXT NOT NULL,
                digest_date TEXT NOT NULL,
                status TEXT NOT NULL,
                outcome TEXT,
                best_iteration INTEGER,
                final_score REAL,
                final_grade TEXT,
                threshold REAL NOT NULL,
                max_iterations INTEGER NOT NULL,
                iteration_count INTEGER NOT NULL,
                sources TEXT NOT NULL DEFAULT '[]',
                error TEXT,
                started_at TEXT NOT NULL,
                ended_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_articles_started_at ON articles(started_at DESC);
            CREATE INDEX IF NOT EXISTS idx_articles_status ON articles(status);

            CREATE TABLE IF NOT EXISTS article_iterations (
                article_id TEXT NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
                iteration INTEGER NOT NULL,
                draft_text TEXT NOT NULL,
                total_score REAL NOT NULL,
                letter_grade TEXT NOT NULL,
                accepted INTEGER NOT NULL,
                grade TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (article_id, iteration)
            );
            "#,
        )
    }
}

/// Decode a JSON text column
pub(crate) fn json_column<T: DeserializeOwned>(
    index: usize,
    text: &str,
) -> Result<T, rusqlite::Error> {
    serde_json::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Encode a value for a JSON text column
pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, rusqlite::Error> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Parse a stored RFC 3339 timestamp
pub(crate) fn parse_timestamp(
    index: usize,
    text: &str,
) -> Result<chrono::DateTime<chrono::Utc>, rusqlite::Error> {
    chrono::DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                index,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

/// Parse a stored `YYYY-MM-DD` date
pub(crate) fn parse_date(index: usize, text: &str) -> Result<chrono::NaiveDate, rusqlite::Error> {
    chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}
