//! Social media posts drawn from a finished article.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use draftloops_oracle::{Oracle, OracleRequest, RetryPolicy};

const POSTS_OPEN: &str = "<posts>";
const POSTS_CLOSE: &str = "</posts>";

const TWITTER_POSTS: usize = 3;
const LINKEDIN_POSTS: usize = 2;
const TWEET_MAX_CHARS: usize = 280;

const SYSTEM: &str = "You are a social media editor who turns long-form articles into \
short, engaging posts without inventing facts.";

/// Posts for one article
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialPosts {
    pub twitter: Vec<String>,
    pub linkedin: Vec<String>,
    /// Quotable sentences lifted from the article
    #[serde(default)]
    pub quotes: Vec<String>,
    /// Sentences flagged as key insights
    #[serde(default)]
    pub insights: Vec<String>,
}

impl SocialPosts {
    /// Parse the `<posts>` JSON block of an oracle reply
    pub fn parse(output: &str) -> Result<Self> {
        let json = match (output.find(POSTS_OPEN), output.rfind(POSTS_CLOSE)) {
            (Some(start), Some(end)) if start + POSTS_OPEN.len() <= end => {
                &output[start + POSTS_OPEN.len()..end]
            }
            (None, None) if output.trim_start().starts_with('{') => output,
            _ => bail!("reply has no <posts> block"),
        };

        #[derive(Deserialize)]
        struct RawPosts {
            #[serde(default)]
            twitter: Vec<String>,
            #[serde(default)]
            linkedin: Vec<String>,
        }

        let raw: RawPosts =
            serde_json::from_str(json.trim()).context("<posts> block is not valid JSON")?;

        let clean = |posts: Vec<String>| -> Vec<String> {
            posts
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        };
        let posts = Self {
            twitter: clean(raw.twitter),
            linkedin: clean(raw.linkedin),
            ..Default::default()
        };

        if posts.twitter.is_empty() && posts.linkedin.is_empty() {
            bail!("<posts> block contains no posts");
        }
        for tweet in &posts.twitter {
            let len = tweet.chars().count();
            if len > TWEET_MAX_CHARS {
                warn!(chars = len, "Twitter post is over the length limit");
            }
        }
        Ok(posts)
    }

    pub fn to_markdown(&self, topic: &str) -> String {
        let mut out = format!("# Social posts: {}\n", topic);

        out.push_str("\n## Twitter\n");
        for (i, post) in self.twitter.iter().enumerate() {
            let _ = write!(out, "\n### Post {}\n\n{}\n", i + 1, post);
        }

        out.push_str("\n## LinkedIn\n");
        for (i, post) in self.linkedin.iter().enumerate() {
            let _ = write!(out, "\n### Post {}\n\n{}\n", i + 1, post);
        }

        if !self.quotes.is_empty() {
            out.push_str("\n## Quotable\n\n");
            for quote in &self.quotes {
                let _ = writeln!(out, "> {}\n", quote);
            }
        }
        if !self.insights.is_empty() {
            out.push_str("\n## Key insights\n\n");
            for insight in &self.insights {
                let _ = writeln!(out, "- {}", insight);
            }
        }
        out
    }
}

pub fn build_social_prompt(topic: &str, article: &str) -> String {
    format!(
        r#"Write social media posts based on this article about "{topic}".

ARTICLE:
{article}

Write {TWITTER_POSTS} Twitter posts:
- Each post under {TWEET_MAX_CHARS} characters
- Include relevant hashtags
- Engaging and actionable; reference key insights or quotes when possible

Write {LINKEDIN_POSTS} LinkedIn posts:
- Professional tone suitable for a business audience
- 100-200 words each
- End with a call to action
- Reference the source material appropriately

Reply with the posts inside a <posts> block containing only JSON:
<posts>
{{"twitter": ["...", "...", "..."], "linkedin": ["...", "..."]}}
</posts>"#
    )
}

/// Sentences worth quoting and sentences flagged as insights
pub fn extract_highlights(article: &str) -> (Vec<String>, Vec<String>) {
    const INSIGHT_WORDS: [&str; 4] = ["key", "important", "crucial", "insight"];

    let mut quotes = Vec::new();
    let mut insights = Vec::new();

    for sentence in article.split(". ") {
        let sentence = sentence.trim();
        let len = sentence.chars().count();
        if len <= 50 || len >= TWEET_MAX_CHARS {
            continue;
        }
        let lower = sentence.to_lowercase();
        if INSIGHT_WORDS.iter().any(|w| lower.contains(w)) {
            let mut insight = sentence.to_string();
            if !insight.ends_with('.') {
                insight.push('.');
            }
            insights.push(insight);
        } else if sentence.contains('"') {
            quotes.push(sentence.to_string());
        }
    }

    quotes.truncate(3);
    insights.truncate(5);
    (quotes, insights)
}

/// Ask `oracle` for posts about `article`
pub async fn generate_social_posts(
    oracle: &dyn Oracle,
    retry: &RetryPolicy,
    topic: &str,
    article: &str,
) -> Result<SocialPosts> {
    let request = OracleRequest::new(build_social_prompt(topic, article)).with_system(SYSTEM);
    let response = retry
        .run("social", || oracle.invoke(&request))
        .await
        .context("Social post generation failed")?;

    let mut posts = SocialPosts::parse(&response.text)?;
    let (quotes, insights) = extract_highlights(article);
    posts.quotes = quotes;
    posts.insights = insights;

    info!(
        twitter = posts.twitter.len(),
        linkedin = posts.linkedin.len(),
        "Social posts generated"
    );
    Ok(posts)
}

/// `foo.md` becomes `foo-social.md`
pub fn social_path(article_path: &Path) -> PathBuf {
    let stem = article_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("article");
    article_path.with_file_name(format!("{}-social.md", stem))
}
