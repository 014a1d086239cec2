//! Fetches the metadata document a sentinel publishes.

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

pub const SENTINEL_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Body of a sentinel metadata response.
#[derive(Debug, Clone, PartialEq)]
pub enum SentinelDocument {
    Metadata(Value),
    /// Body that is not a JSON document, returned verbatim.
    Raw(String),
}

impl SentinelDocument {
    pub fn from_body(body: String) -> Self {
        match serde_json::from_str::<Value>(&body) {
            Ok(value) if !value.is_null() => SentinelDocument::Metadata(value),
            _ => SentinelDocument::Raw(body),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentinelClient {
    client: reqwest::Client,
}

impl SentinelClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build sentinel HTTP client")?;
        Ok(Self { client })
    }

    /// GET `url`; non-success statuses are errors.
    pub async fn fetch(&self, url: &str) -> Result<SentinelDocument> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("{url} returned an error status"))?;
        let body = response
            .text()
            .await
            .context("failed to read sentinel response body")?;
        Ok(SentinelDocument::from_body(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_body_is_metadata() {
        let document = SentinelDocument::from_body(r#"{"moniker": "sentinel-1"}"#.to_string());
        assert_eq!(
            document,
            SentinelDocument::Metadata(json!({ "moniker": "sentinel-1" }))
        );
    }

    #[test]
    fn other_bodies_are_raw() {
        assert_eq!(
            SentinelDocument::from_body("<html>".to_string()),
            SentinelDocument::Raw("<html>".to_string())
        );
        assert_eq!(
            SentinelDocument::from_body("null".to_string()),
            SentinelDocument::Raw("null".to_string())
        );
    }
}
