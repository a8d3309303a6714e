//! Paper summarization providers.
//!
//! The crawler treats summarization as an optional follow-up: it asks a
//! [`Summarizer`] for a [`StructuredSummary`] and stores whatever comes back.
//! A failed summary marks the paper `failed` and never fails the crawl.
//!
//! # Providers
//!
//! | Config Value | Provider |
//! |-------------|----------|
//! | `"disabled"` | [`DisabledSummarizer`] |
//! | `"openai"` | [`OpenAiSummarizer`] (any OpenAI-compatible `/chat/completions`) |

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::SummarizerConfig;
use crate::models::{Paper, StructuredSummary};

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// `None` when no model is configured.
    fn model_name(&self) -> Option<&str>;

    fn is_enabled(&self) -> bool {
        true
    }

    async fn summarize(&self, paper: &Paper) -> Result<StructuredSummary>;
}

pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    fn model_name(&self) -> Option<&str> {
        None
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn summarize(&self, _paper: &Paper) -> Result<StructuredSummary> {
        bail!("summarizer is disabled")
    }
}

pub struct OpenAiSummarizer {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    language: String,
    interests: String,
    max_retries: u32,
}

impl OpenAiSummarizer {
    /// Reads the key from `OPENAI_API_KEY`.
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &SummarizerConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("summarizer.model required for openai provider"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key,
            model,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            interests: config.interests.clone(),
            max_retries: config.max_retries,
        })
    }

    fn request_body(&self, paper: &Paper) -> serde_json::Value {
        let system = format!(
            "You summarize research papers. Reply in {} with a JSON object with the keys \
             tldr, motivation, method, result, conclusion and relevance. relevance is one of \
             Must, High, Medium, Low, Irrelevant for a reader interested in: {}.",
            self.language, self.interests
        );
        let user = format!(
            "Title: {}\nCategories: {}\n\nAbstract:\n{}",
            paper.title, paper.categories, paper.abstract_text
        );

        serde_json::json!({
            "model": self.model,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        })
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    fn model_name(&self) -> Option<&str> {
        Some(&self.model)
    }

    /// Retry strategy:
    /// - HTTP 429 or 5xx → retry with exponential backoff
    /// - HTTP 4xx (not 429) → fail immediately
    /// - Network error → retry
    async fn summarize(&self, paper: &Paper) -> Result<StructuredSummary> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(paper);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // 1s, 2s, 4s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_chat_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        tracing::warn!(
                            arxiv_id = %paper.arxiv_id,
                            attempt,
                            %status,
                            "summarizer request failed, retrying"
                        );
                        last_err = Some(anyhow!("LLM API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("LLM API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("summarization failed after retries")))
    }
}

/// Pull `choices[0].message.content` and decode it as a summary.
fn parse_chat_response(json: &serde_json::Value) -> Result<StructuredSummary> {
    let content = json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow!("invalid LLM response: missing choices[0].message.content"))?;

    let summary: StructuredSummary = serde_json::from_str(content)
        .map_err(|e| anyhow!("LLM did not return a summary object: {}", e))?;
    Ok(summary)
}

/// Map a relevance label onto `0..=10`.
pub fn relevance_score(label: &str) -> i64 {
    let label = label.trim();
    match label.to_ascii_lowercase().as_str() {
        "must" => 10,
        "high" => 8,
        "medium" => 5,
        "low" => 2,
        "irrelevant" => 0,
        _ => label
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(|n| n.round().clamp(0.0, 10.0) as i64)
            .unwrap_or(5),
    }
}

pub fn create_summarizer(config: &SummarizerConfig) -> Result<Box<dyn Summarizer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledSummarizer)),
        "openai" => Ok(Box::new(OpenAiSummarizer::new(config)?)),
        other => bail!("Unknown summarizer provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SummaryStatus;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn paper() -> Paper {
        Paper {
            paper_id: 1,
            arxiv_id: "1706.03762".into(),
            title: "Attention Is All You Need".into(),
            abstract_text: "Transformers.".into(),
            primary_category: "cs.CL".into(),
            categories: "cs.CL,cs.LG".into(),
            authors: "Ashish Vaswani".into(),
            url_abs: "https://arxiv.org/abs/1706.03762".into(),
            url_pdf: None,
            doi: None,
            comment: None,
            journal_ref: None,
            published_at: "2017-06-12T17:57:34Z".into(),
            updated_at: "2017-06-12T17:57:34Z".into(),
            summary_status: SummaryStatus::Batched,
            created_at: "2024-01-01T00:00:00Z".into(),
        }
    }

    fn config(base_url: String, max_retries: u32) -> SummarizerConfig {
        SummarizerConfig {
            provider: "openai".into(),
            model: Some("gpt-4o-mini".into()),
            base_url,
            max_retries,
            ..SummarizerConfig::default()
        }
    }

    fn chat_reply(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    #[test]
    fn relevance_labels() {
        assert_eq!(relevance_score("Must"), 10);
        assert_eq!(relevance_score("high"), 8);
        assert_eq!(relevance_score(" Medium "), 5);
        assert_eq!(relevance_score("Low"), 2);
        assert_eq!(relevance_score("Irrelevant"), 0);
        assert_eq!(relevance_score("7"), 7);
        assert_eq!(relevance_score("42"), 10);
        assert_eq!(relevance_score("-3"), 0);
        assert_eq!(relevance_score("whatever"), 5);
        assert_eq!(relevance_score(""), 5);
    }

    #[tokio::test]
    async fn disabled_always_errors() {
        let s = DisabledSummarizer;
        assert!(!s.is_enabled());
        assert!(s.summarize(&paper()).await.is_err());
    }

    #[tokio::test]
    async fn openai_parses_json_mode_reply() {
        let server = MockServer::start().await;
        let content = r#"{"tldr":"Attention only.","motivation":"m","method":"x","result":"r","conclusion":"c","relevance":"High"}"#;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_reply(content)))
            .expect(1)
            .mount(&server)
            .await;

        let s = OpenAiSummarizer::with_api_key(&config(server.uri(), 0), "test-key".into())
            .unwrap();
        let summary = s.summarize(&paper()).await.unwrap();
        assert_eq!(summary.tldr, "Attention only.");
        assert_eq!(summary.relevance, "High");
        assert_eq!(s.model_name(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn openai_client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .expect(1)
            .mount(&server)
            .await;

        let s = OpenAiSummarizer::with_api_key(&config(server.uri(), 3), "nope".into()).unwrap();
        let err = s.summarize(&paper()).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn rejects_non_json_content() {
        assert!(parse_chat_response(&chat_reply("not json")).is_err());
        assert!(parse_chat_response(&serde_json::json!({})).is_err());
    }
}
