//! # Configuration
//!
//! Environment-derived settings, resolved once at startup and handed to every
//! component through [`crate::context::AppContext`] rather than read ad hoc
//! from process globals.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Default OpenAI-compatible completion endpoint (aiPipe gateway).
pub const DEFAULT_LLM_BASE_URL: &str = "https://aipipe.org/openai/v1";

/// Default completion model.
pub const DEFAULT_LLM_MODEL: &str = "gpt-5";

/// Runtime configuration for the whole service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret inbound requests must present.
    pub secret: String,
    /// GitHub personal access token.
    pub github_token: String,
    /// GitHub account that owns created repositories and Pages sites.
    pub github_owner: String,
    /// Bearer token for the completion endpoint.
    pub llm_token: String,
    /// Base URL of the OpenAI-compatible completion endpoint.
    pub llm_base_url: String,
    /// Model name sent with each completion request.
    pub llm_model: String,
    /// Location of the idempotency store file.
    pub store_path: PathBuf,
    /// Directory decoded attachments are written into.
    pub attachment_dir: PathBuf,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Required: `SECRET`, `GITHUB_TOKEN`, `GITHUB_USERNAME`, `AIPIPE_TOKEN`.
    /// Optional: `LLM_BASE_URL`, `LLM_MODEL`, `PROCESSED_PATH`, `ATTACHMENT_DIR`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            secret: require("SECRET")?,
            github_token: require("GITHUB_TOKEN")?,
            github_owner: require("GITHUB_USERNAME")?,
            llm_token: require("AIPIPE_TOKEN")?,
            llm_base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_LLM_BASE_URL.to_string()),
            llm_model: std::env::var("LLM_MODEL")
                .unwrap_or_else(|_| DEFAULT_LLM_MODEL.to_string()),
            store_path: std::env::var("PROCESSED_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/processed_requests.json")),
            attachment_dir: std::env::var("ATTACHMENT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/tmp/pagesmith_attachments")),
        })
    }
}

fn require(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("Missing required environment variable: {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_required_var_names_it() {
        std::env::remove_var("SECRET");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("SECRET"));
    }
}
