use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Summary of one podcast episode, as produced by the digest exporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode_title: String,
    pub podcast_title: String,
    #[serde(default)]
    pub full_summary: String,
    #[serde(default)]
    pub key_topics: Vec<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub quotes: Vec<String>,
    /// Companies and startups mentioned
    #[serde(default)]
    pub startups: Vec<String>,
    #[serde(default)]
    pub digest_date: Option<NaiveDate>,
}

/// The exporter's JSON file: `{date, total_episodes, summaries}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestExport {
    pub date: NaiveDate,
    #[serde(default)]
    pub total_episodes: usize,
    pub summaries: Vec<EpisodeSummary>,
}

#[derive(Error, Debug)]
pub enum DigestError {
    #[error("Failed to read digest file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse digest JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Digest contains no summaries")]
    Empty,
}

impl DigestExport {
    pub fn from_json(json: &str) -> Result<Self, DigestError> {
        let mut export: DigestExport = serde_json::from_str(json)?;
        // Summaries inherit the export date unless they carry their own
        for summary in &mut export.summaries {
            summary.digest_date.get_or_insert(export.date);
        }
        Ok(export)
    }

    pub fn load(path: &Path) -> Result<Self, DigestError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

/// Episode a digest was built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub episode_title: String,
    pub podcast_title: String,
}

/// Source material handed to the writer. The loop treats it as opaque text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDigest {
    /// One line naming where the material comes from
    pub topic_context: String,
    /// The material itself
    pub source_text: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

impl SourceDigest {
    pub fn new(topic_context: impl Into<String>, source_text: impl Into<String>) -> Self {
        Self {
            topic_context: topic_context.into(),
            source_text: source_text.into(),
            date: None,
            sources: Vec::new(),
        }
    }

    /// Combine every summary into one digest. Summaries are kept in the
    /// order given.
    pub fn from_summaries(summaries: &[EpisodeSummary]) -> Result<Self, DigestError> {
        if summaries.is_empty() {
            return Err(DigestError::Empty);
        }

        let sources: Vec<SourceRef> = summaries
            .iter()
            .map(|s| SourceRef {
                episode_title: s.episode_title.clone(),
                podcast_title: s.podcast_title.clone(),
            })
            .collect();

        let topic_context = match sources.as_slice() {
            [only] => format!("Episode: {} from {}", only.episode_title, only.podcast_title),
            many => {
                let mut seen = HashSet::new();
                let podcasts: Vec<&str> = many
                    .iter()
                    .map(|s| s.podcast_title.as_str())
                    .filter(|p| seen.insert(*p))
                    .collect();
                format!("{} episodes from {}", many.len(), podcasts.join(", "))
            }
        };

        let source_text = summaries
            .iter()
            .map(render_summary)
            .collect::<Vec<_>>()
            .join("\n");

        Ok(Self {
            topic_context,
            source_text,
            date: summaries.iter().find_map(|s| s.digest_date),
            sources,
        })
    }

    /// First source, used for article front matter
    pub fn primary_source(&self) -> Option<&SourceRef> {
        self.sources.first()
    }
}

fn render_summary(summary: &EpisodeSummary) -> String {
    let mut out = format!(
        "Episode: {} from {}\n",
        summary.episode_title, summary.podcast_title
    );
    if !summary.full_summary.trim().is_empty() {
        out.push_str(&format!("Summary: {}\n", summary.full_summary.trim()));
    }
    if !summary.key_topics.is_empty() {
        out.push_str(&format!("Key Topics: {}\n", summary.key_topics.join(", ")));
    }
    if !summary.themes.is_empty() {
        out.push_str(&format!("Themes: {}\n", summary.themes.join(", ")));
    }
    if !summary.quotes.is_empty() {
        out.push_str("Notable Quotes:\n");
        for quote in &summary.quotes {
            out.push_str(&format!("> {}\n", quote));
        }
    }
    if !summary.startups.is_empty() {
        out.push_str(&format!(
            "Companies Mentioned: {}\n",
            summary.startups.join(", ")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(episode: &str, podcast: &str) -> EpisodeSummary {
        EpisodeSummary {
            episode_title: episode.into(),
            podcast_title: podcast.into(),
            full_summary: "Founders discuss pricing.".into(),
            key_topics: vec!["pricing".into(), "AI".into()],
            themes: vec![],
            quotes: vec!["Charge more.".into()],
            startups: vec!["Acme".into()],
            digest_date: None,
        }
    }

    #[test]
    fn test_single_summary_digest() {
        let digest = SourceDigest::from_summaries(&[summary("Ep 1", "20VC")]).unwrap();
        assert_eq!(digest.topic_context, "Episode: Ep 1 from 20VC");
        assert!(digest.source_text.contains("Key Topics: pricing, AI"));
        assert!(digest.source_text.contains("> Charge more."));
        assert!(digest.source_text.contains("Companies Mentioned: Acme"));
        assert!(!digest.source_text.contains("Themes:"));
        assert_eq!(digest.primary_source().unwrap().podcast_title, "20VC");
    }

    #[test]
    fn test_multiple_summaries_are_combined() {
        let digest = SourceDigest::from_summaries(&[
            summary("Ep 1", "20VC"),
            summary("Ep 2", "20VC"),
            summary("Ep 9", "Acquired"),
        ])
        .unwrap();
        assert_eq!(digest.topic_context, "3 episodes from 20VC, Acquired");
        assert_eq!(digest.sources.len(), 3);
        assert!(digest.source_text.contains("Episode: Ep 9 from Acquired"));
    }

    #[test]
    fn test_podcasts_listed_once_in_first_seen_order() {
        let digest = SourceDigest::from_summaries(&[
            summary("Ep 1", "20VC"),
            summary("Ep 9", "Acquired"),
            summary("Ep 2", "20VC"),
        ])
        .unwrap();
        assert_eq!(digest.topic_context, "3 episodes from 20VC, Acquired");
    }

    #[test]
    fn test_empty_summaries() {
        assert!(matches!(
            SourceDigest::from_summaries(&[]),
            Err(DigestError::Empty)
        ));
    }

    #[test]
    fn test_parse_exporter_json() {
        let json = r#"{
            "date": "2025-01-15",
            "total_episodes": 1,
            "summaries": [{
                "id": 4,
                "episode_id": 12,
                "episode_title": "The SaaS reset",
                "podcast_title": "Acquired",
                "key_topics": ["SaaS"],
                "themes": ["efficiency"],
                "quotes": [],
                "startups": [],
                "full_summary": "A look at SaaS multiples.",
                "created_at": "2025-01-15 08:00:00"
            }]
        }"#;
        let export = DigestExport::from_json(json).unwrap();
        let expected = NaiveDate::from_ymd_opt(2025, 1, 15);
        assert_eq!(export.summaries[0].digest_date, expected);

        let digest = SourceDigest::from_summaries(&export.summaries).unwrap();
        assert_eq!(digest.date, expected);
    }
}
