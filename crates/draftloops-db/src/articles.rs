//! Finished (and unfinished) article sessions.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::MutexGuard;

use draftloops_core::{Draft, HistoryEntry, SessionRecord, SessionStatus};
use draftloops_critic::{GradeResult, LetterGrade};

use crate::{json_column, parse_date, parse_timestamp, to_json};

/// Summary for list views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub id: String,
    pub topic: String,
    pub date: NaiveDate,
    pub status: SessionStatus,
    pub iterations: usize,
    pub best_iteration: Option<usize>,
    pub final_score: Option<f64>,
    pub final_grade: Option<LetterGrade>,
    /// Score of the first draft
    pub first_score: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub duration_secs: Option<f64>,
}

/// Filter parameters for listing articles.
#[derive(Debug, Default, Clone)]
pub struct ArticleFilter {
    pub status: Option<SessionStatus>,
    /// Substring match on the topic
    pub topic: Option<String>,
    /// Inclusive bounds on the digest date
    pub after: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
}

/// Aggregate statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleStats {
    pub total: usize,
    pub accepted: usize,
    pub exhausted: usize,
    pub interrupted: usize,
    pub failed: usize,
    pub acceptance_rate: f64,
    /// Share of accepted articles that passed on the first draft
    pub first_draft_acceptance_rate: f64,
    pub avg_iterations: f64,
    pub avg_final_score: f64,
    /// Mean gain from first draft to delivered draft, over articles with
    /// more than one draft
    pub avg_improvement: f64,
    pub by_day: Vec<DayCount>,
}

/// Articles count for a single digest date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCount {
    pub date: String,
    pub count: usize,
}

/// Articles store with a borrowed connection.
pub struct Articles<'db> {
    conn: MutexGuard<'db, Connection>,
}

impl<'db> Articles<'db> {
    pub(crate) fn new(conn: MutexGuard<'db, Connection>) -> Self {
        Self { conn }
    }

    /// Store a session record, replacing any earlier save of the same id.
    pub fn save(&self, record: &SessionRecord) -> Result<(), rusqlite::Error> {
        let tx = self.conn.unchecked_transaction()?;

        let outcome = record.outcome.as_ref().map(to_json).transpose()?;
        tx.execute(
            r#"
            INSERT INTO articles (
                id, topic, digest_date, status, outcome, best_iteration,
                final_score, final_grade, threshold, max_iterations,
                iteration_count, sources, error, started_at, ended_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                outcome = excluded.outcome,
                best_iteration = excluded.best_iteration,
                final_score = excluded.final_score,
                final_grade = excluded.final_grade,
                iteration_count = excluded.iteration_count,
                error = excluded.error,
                ended_at = excluded.ended_at
            "#,
            params![
                record.id,
                record.topic,
                record.date.format("%Y-%m-%d").to_string(),
                record.status.as_str(),
                outcome,
                record.best_iteration.map(|n| n as i64),
                record.final_score,
                record.final_grade.map(|g| g.as_str()),
                record.threshold,
                record.max_iterations as i64,
                record.iterations() as i64,
                to_json(&record.sources)?,
                record.error,
                record.started_at.to_rfc3339(),
                record.ended_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        tx.execute(
            "DELETE FROM article_iterations WHERE article_id = ?1",
            params![record.id],
        )?;
        for entry in &record.history {
            tx.execute(
                r#"
                INSERT INTO article_iterations (
                    article_id, iteration, draft_text, total_score,
                    letter_grade, accepted, grade, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    record.id,
                    entry.iteration() as i64,
                    entry.draft.text,
                    entry.grade.total_score,
                    entry.grade.letter_grade.as_str(),
                    entry.grade.accepted,
                    to_json(&entry.grade)?,
                    entry.draft.created_at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()
    }

    /// Get a full record by ID. A unique ID prefix also matches.
    pub fn get(&self, id: &str) -> Result<Option<SessionRecord>, rusqlite::Error> {
        let Some(id) = self.resolve_id(id)? else {
            return Ok(None);
        };

        let record = self
            .conn
            .query_row(
                r#"
                SELECT id, topic, digest_date, status, outcome, best_iteration,
                       final_score, final_grade, threshold, max_iterations,
                       sources, error, started_at, ended_at
                FROM articles WHERE id = ?1
                "#,
                params![id],
                Self::row_to_record,
            )
            .optional()?;

        match record {
            Some(mut r) => {
                r.history = self.get_history(&id)?;
                Ok(Some(r))
            }
            None => Ok(None),
        }
    }

    /// List articles matching the given filter, newest first.
    pub fn list(&self, filter: &ArticleFilter) -> Result<Vec<ArticleSummary>, rusqlite::Error> {
        let mut sql = String::from(
            r#"
            SELECT a.id, a.topic, a.digest_date, a.status, a.iteration_count,
                   a.best_iteration, a.final_score, a.final_grade,
                   (SELECT i.total_score FROM article_iterations i
                    WHERE i.article_id = a.id ORDER BY i.iteration LIMIT 1),
                   a.started_at, a.ended_at
            FROM articles a WHERE 1=1
            "#,
        );
        let mut param_values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            sql.push_str(" AND a.status = ?");
            param_values.push(Box::new(status.as_str()));
        }

        if let Some(ref topic) = filter.topic {
            sql.push_str(" AND a.topic LIKE ?");
            param_values.push(Box::new(format!("%{}%", topic)));
        }

        if let Some(after) = filter.after {
            sql.push_str(" AND a.digest_date >= ?");
            param_values.push(Box::new(after.format("%Y-%m-%d").to_string()));
        }

        if let Some(before) = filter.before {
            sql.push_str(" AND a.digest_date <= ?");
            param_values.push(Box::new(before.format("%Y-%m-%d").to_string()));
        }

        sql.push_str(" ORDER BY a.started_at DESC");

        let params: Vec<&dyn rusqlite::ToSql> = param_values.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), Self::row_to_summary)?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }

        Ok(summaries)
    }

    /// Compute aggregate statistics over articles matching the filter.
    pub fn stats(&self, filter: &ArticleFilter) -> Result<ArticleStats, rusqlite::Error> {
        let summaries = self.list(filter)?;
        let total = summaries.len();

        let count = |status: SessionStatus| summaries.iter().filter(|s| s.status == status).count();
        let accepted = count(SessionStatus::Accepted);
        let exhausted = count(SessionStatus::Exhausted);
        let interrupted = count(SessionStatus::Interrupted);
        let failed = count(SessionStatus::Failed);

        if total == 0 {
            return Ok(ArticleStats {
                total: 0,
                accepted: 0,
                exhausted: 0,
                interrupted: 0,
                failed: 0,
                acceptance_rate: 0.0,
                first_draft_acceptance_rate: 0.0,
                avg_iterations: 0.0,
                avg_final_score: 0.0,
                avg_improvement: 0.0,
                by_day: Vec::new(),
            });
        }

        let first_draft = summaries
            .iter()
            .filter(|s| s.status == SessionStatus::Accepted && s.iterations == 1)
            .count();

        let scores: Vec<f64> = summaries.iter().filter_map(|s| s.final_score).collect();
        let improvements: Vec<f64> = summaries
            .iter()
            .filter(|s| s.iterations > 1)
            .filter_map(|s| Some(s.final_score? - s.first_score?))
            .collect();

        Ok(ArticleStats {
            total,
            accepted,
            exhausted,
            interrupted,
            failed,
            acceptance_rate: accepted as f64 / total as f64,
            first_draft_acceptance_rate: ratio(first_draft, accepted),
            avg_iterations: summaries.iter().map(|s| s.iterations as f64).sum::<f64>()
                / total as f64,
            avg_final_score: mean(&scores),
            avg_improvement: mean(&improvements),
            by_day: Self::compute_by_day(&summaries),
        })
    }

    /// Delete an article by ID (cascades to iterations).
    pub fn delete(&self, id: &str) -> Result<bool, rusqlite::Error> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM articles WHERE id = ?1", params![id])?;
        Ok(rows_affected > 0)
    }

    // Helper methods

    /// Exact ID, or the single ID starting with `id`
    fn resolve_id(&self, id: &str) -> Result<Option<String>, rusqlite::Error> {
        let exact: Option<String> = self
            .conn
            .query_row("SELECT id FROM articles WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        if exact.is_some() {
            return Ok(exact);
        }

        let mut stmt = self
            .conn
            .prepare("SELECT id FROM articles WHERE id LIKE ?1 || '%' LIMIT 2")?;
        let rows = stmt.query_map(params![id], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }

        Ok(match ids.len() {
            1 => ids.pop(),
            _ => None,
        })
    }

    fn get_history(&self, article_id: &str) -> Result<Vec<HistoryEntry>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT iteration, draft_text, grade, created_at
            FROM article_iterations
            WHERE article_id = ?1
            ORDER BY iteration
            "#,
        )?;

        let rows = stmt.query_map(params![article_id], |row| {
            let grade: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok(HistoryEntry {
                draft: Draft {
                    iteration: row.get::<_, i64>(0)? as usize,
                    text: row.get(1)?,
                    created_at: parse_timestamp(3, &created_at)?,
                },
                grade: json_column::<GradeResult>(2, &grade)?,
            })
        })?;

        let mut history = Vec::new();
        for row in rows {
            history.push(row?);
        }

        Ok(history)
    }

    fn row_to_record(row: &rusqlite::Row) -> Result<SessionRecord, rusqlite::Error> {
        let date: String = row.get(2)?;
        let status: String = row.get(3)?;
        let outcome: Option<String> = row.get(4)?;
        let final_grade: Option<String> = row.get(7)?;
        let sources: String = row.get(10)?;
        let started_at: String = row.get(12)?;
        let ended_at: Option<String> = row.get(13)?;

        Ok(SessionRecord {
            id: row.get(0)?,
            topic: row.get(1)?,
            date: parse_date(2, &date)?,
            status: parse_status(3, &status)?,
            outcome: outcome.map(|o| json_column(4, &o)).transpose()?,
            best_iteration: row.get::<_, Option<i64>>(5)?.map(|n| n as usize),
            final_score: row.get(6)?,
            final_grade: final_grade.map(|g| parse_grade(7, &g)).transpose()?,
            threshold: row.get(8)?,
            max_iterations: row.get::<_, i64>(9)? as usize,
            history: Vec::new(), // Populated by get()
            sources: json_column(10, &sources)?,
            error: row.get(11)?,
            started_at: parse_timestamp(12, &started_at)?,
            ended_at: ended_at.map(|t| parse_timestamp(13, &t)).transpose()?,
        })
    }

    fn row_to_summary(row: &rusqlite::Row) -> Result<ArticleSummary, rusqlite::Error> {
        let date: String = row.get(2)?;
        let status: String = row.get(3)?;
        let final_grade: Option<String> = row.get(7)?;
        let started_at: String = row.get(9)?;
        let ended_at: Option<String> = row.get(10)?;

        let started_at = parse_timestamp(9, &started_at)?;
        let duration_secs = ended_at
            .map(|t| parse_timestamp(10, &t))
            .transpose()?
            .map(|end| (end - started_at).num_milliseconds() as f64 / 1000.0);

        Ok(ArticleSummary {
            id: row.get(0)?,
            topic: row.get(1)?,
            date: parse_date(2, &date)?,
            status: parse_status(3, &status)?,
            iterations: row.get::<_, i64>(4)? as usize,
            best_iteration: row.get::<_, Option<i64>>(5)?.map(|n| n as usize),
            final_score: row.get(6)?,
            final_grade: final_grade.map(|g| parse_grade(7, &g)).transpose()?,
            first_score: row.get(8)?,
            started_at,
            duration_secs,
        })
    }

    fn compute_by_day(summaries: &[ArticleSummary]) -> Vec<DayCount> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for s in summaries {
            *counts.entry(s.date.format("%Y-%m-%d").to_string()).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(date, count)| DayCount { date, count })
            .collect()
    }
}

fn parse_status(index: usize, text: &str) -> Result<SessionStatus, rusqlite::Error> {
    text.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, e.into())
    })
}

fn parse_grade(index: usize, text: &str) -> Result<LetterGrade, rusqlite::Error> {
    serde_json::from_value(serde_json::Value::String(text.to_string())).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
