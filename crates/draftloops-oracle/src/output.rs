use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::OracleError;

/// Text returned by one oracle call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleResponse {
    /// The generated text, trimmed
    pub text: String,
    /// Model that produced it, when the provider reports one
    pub model: Option<String>,
    /// Wall-clock duration of the call
    #[serde(with = "duration_secs")]
    pub duration: Duration,
}

impl OracleResponse {
    /// Build a response, rejecting empty or whitespace-only text
    pub fn new(text: &str, model: Option<String>, duration: Duration) -> Result<Self, OracleError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(OracleError::EmptyResponse);
        }
        Ok(Self {
            text: text.to_string(),
            model,
            duration,
        })
    }

    pub fn line_count(&self) -> usize {
        self.text.lines().count()
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_rejected() {
        let result = OracleResponse::new("  \n\t ", None, Duration::ZERO);
        assert!(matches!(result, Err(OracleError::EmptyResponse)));
    }

    #[test]
    fn test_text_is_trimmed_and_counted() {
        let response =
            OracleResponse::new("\n  two words\nand more  \n", None, Duration::from_millis(1500))
                .unwrap();
        assert_eq!(response.text, "two words\nand more");
        assert_eq!(response.line_count(), 2);
        assert_eq!(response.word_count(), 4);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["duration"], 1.5);
    }
}
