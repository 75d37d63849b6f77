//! Episode summaries, the source material for articles.

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::MutexGuard;

use draftloops_core::{DigestExport, EpisodeSummary};

use crate::{json_column, parse_date, to_json};

/// Number of summaries stored for one digest date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestDay {
    pub date: NaiveDate,
    pub episodes: usize,
}

/// Summaries store with a borrowed connection.
pub struct Digests<'db> {
    conn: MutexGuard<'db, Connection>,
}

impl<'db> Digests<'db> {
    pub(crate) fn new(conn: MutexGuard<'db, Connection>) -> Self {
        Self { conn }
    }

    /// Insert or replace a summary for `date`. An episode is identified by
    /// its title, podcast and digest date.
    pub fn insert(&self, summary: &EpisodeSummary, date: NaiveDate) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            r#"
            INSERT INTO summaries (
                episode_title, podcast_title, full_summary, key_topics,
                themes, quotes, startups, digest_date, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(episode_title, podcast_title, digest_date) DO UPDATE SET
                full_summary = excluded.full_summary,
                key_topics = excluded.key_topics,
                themes = excluded.themes,
                quotes = excluded.quotes,
                startups = excluded.startups
            "#,
            params![
                summary.episode_title,
                summary.podcast_title,
                summary.full_summary,
                to_json(&summary.key_topics)?,
                to_json(&summary.themes)?,
                to_json(&summary.quotes)?,
                to_json(&summary.startups)?,
                date.format("%Y-%m-%d").to_string(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Load an exporter file. Returns the number of summaries stored.
    pub fn import(&self, export: &DigestExport) -> Result<usize, rusqlite::Error> {
        let tx = self.conn.unchecked_transaction()?;
        for summary in &export.summaries {
            self.insert(summary, summary.digest_date.unwrap_or(export.date))?;
        }
        tx.commit()?;
        Ok(export.summaries.len())
    }

    /// All summaries for a date, ordered by podcast then episode.
    pub fn by_date(&self, date: NaiveDate) -> Result<Vec<EpisodeSummary>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT episode_title, podcast_title, full_summary, key_topics,
                   themes, quotes, startups, digest_date
            FROM summaries
            WHERE digest_date = ?1
            ORDER BY podcast_title, episode_title
            "#,
        )?;

        let rows = stmt.query_map(params![date.format("%Y-%m-%d").to_string()], |row| {
            let key_topics: String = row.get(3)?;
            let themes: String = row.get(4)?;
            let quotes: String = row.get(5)?;
            let startups: String = row.get(6)?;
            let digest_date: String = row.get(7)?;
            Ok(EpisodeSummary {
                episode_title: row.get(0)?,
                podcast_title: row.get(1)?,
                full_summary: row.get(2)?,
                key_topics: json_column(3, &key_topics)?,
                themes: json_column(4, &themes)?,
                quotes: json_column(5, &quotes)?,
                startups: json_column(6, &startups)?,
                digest_date: Some(parse_date(7, &digest_date)?),
            })
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    /// Dates that have summaries, newest first.
    pub fn dates(&self) -> Result<Vec<DigestDay>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT digest_date, COUNT(*)
            FROM summaries
            GROUP BY digest_date
            ORDER BY digest_date DESC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            let date: String = row.get(0)?;
            Ok(DigestDay {
                date: parse_date(0, &date)?,
                episodes: row.get::<_, i64>(1)? as usize,
            })
        })?;

        let mut days = Vec::new();
        for row in rows {
            days.push(row?);
        }
        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use chrono::NaiveDate;
    use draftloops_core::{DigestExport, EpisodeSummary};

    fn summary(episode: &str, podcast: &str) -> EpisodeSummary {
        EpisodeSummary {
            episode_title: episode.into(),
            podcast_title: podcast.into(),
            full_summary: "Summary".into(),
            key_topics: vec!["AI".into()],
            themes: vec!["growth".into()],
            quotes: vec!["\"Ship weekly\"".into()],
            startups: vec![],
            digest_date: None,
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn test_insert_and_by_date() {
        let db = Database::open_in_memory().unwrap();
        db.digests().insert(&summary("B ep", "Zeta"), date(15)).unwrap();
        db.digests().insert(&summary("A ep", "Alpha"), date(15)).unwrap();
        db.digests().insert(&summary("C ep", "Alpha"), date(16)).unwrap();

        let found = db.digests().by_date(date(15)).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].podcast_title, "Alpha");
        assert_eq!(found[0].quotes, vec!["\"Ship weekly\"".to_string()]);
        assert_eq!(found[0].digest_date, Some(date(15)));

        assert!(db.digests().by_date(date(1)).unwrap().is_empty());
    }

    #[test]
    fn test_import_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let export = DigestExport {
            date: date(15),
            total_episodes: 2,
            summaries: vec![summary("A ep", "Alpha"), summary("B ep", "Beta")],
        };

        assert_eq!(db.digests().import(&export).unwrap(), 2);
        assert_eq!(db.digests().import(&export).unwrap(), 2);

        let days = db.digests().dates().unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].episodes, 2);
        assert_eq!(days[0].date, date(15));
    }

    #[test]
    fn test_reimport_updates_summary() {
        let db = Database::open_in_memory().unwrap();
        db.digests().insert(&summary("A ep", "Alpha"), date(15)).unwrap();

        let mut changed = summary("A ep", "Alpha");
        changed.full_summary = "Revised".into();
        db.digests().insert(&changed, date(15)).unwrap();

        let found = db.digests().by_date(date(15)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].full_summary, "Revised");
    }
}
