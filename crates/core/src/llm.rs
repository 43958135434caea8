//! # Completion Client
//!
//! Thin client for an OpenAI-compatible `chat/completions` endpoint. The
//! pipeline only needs one operation: system prompt + user prompt in, text
//! out. Failures are typed so the generator can substitute its fallback
//! file set without guessing what went wrong.

use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion endpoint returned {status}: {body}")]
    BadStatus { status: u16, body: String },
    #[error("completion response carried no message content")]
    EmptyResponse,
}

/// Client for one completion endpoint + model pairing.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    model: String,
}

impl CompletionClient {
    pub fn new(base_url: &str, token: &str, model: &str) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(180))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            model: model.to_string(),
        })
    }

    /// Run one completion and return the raw text of the first choice.
    pub async fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ]
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::BadStatus { status, body });
        }

        let resp: serde_json::Value = response.json().await?;
        let content = resp["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .filter(|s| !s.is_empty())
            .ok_or(CompletionError::EmptyResponse)?;

        Ok(content)
    }
}
