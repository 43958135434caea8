//! Shared application context: configuration plus the clients built from it.
//!
//! Constructed once at startup and passed explicitly; nothing in the crate
//! reads credentials from process globals after this point.

use crate::config::Config;
use crate::github::RepoClient;
use crate::llm::CompletionClient;
use crate::store::ProcessedStore;
use anyhow::Result;

pub struct AppContext {
    pub config: Config,
    pub llm: CompletionClient,
    pub github: RepoClient,
    pub store: ProcessedStore,
    /// Client for evaluator notifications.
    pub http: reqwest::Client,
}

impl AppContext {
    /// Build all clients up front; a client that cannot be constructed is a
    /// startup failure, not something to discover mid-workflow.
    pub fn new(config: Config) -> Result<Self> {
        let llm = CompletionClient::new(&config.llm_base_url, &config.llm_token, &config.llm_model)?;
        let github = RepoClient::new(&config.github_token, &config.github_owner)?;
        let store = ProcessedStore::new(&config.store_path);
        Ok(Self {
            config,
            llm,
            github,
            store,
            http: reqwest::Client::new(),
        })
    }
}
