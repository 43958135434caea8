//! # Repository Store Client
//!
//! GitHub REST operations the workflow needs: repo lookup/creation, contents
//! upserts (text and binary), newest commit lookup, and the Pages toggle.
//! The contents API is the source of truth for upserts: an existing path's
//! sha is its revision marker and must accompany any update.

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "pagesmith";

/// Attempts for the Pages enablement call.
const PAGES_RETRIES: u32 = 3;
/// Sleep between Pages attempts.
const PAGES_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Repository description length cap (GitHub rejects longer ones).
const DESCRIPTION_MAX: usize = 300;

/// A repository, as much of it as the workflow cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct Repo {
    pub name: String,
    pub full_name: String,
    pub html_url: String,
}

/// A file fetched from a repository: decoded content plus its revision marker.
#[derive(Debug, Clone)]
pub struct RepoFile {
    pub content: Vec<u8>,
    pub sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitEntry {
    sha: String,
}

/// Client bound to one token + owner pairing.
#[derive(Debug, Clone)]
pub struct RepoClient {
    client: reqwest::Client,
    token: String,
    owner: String,
}

impl RepoClient {
    /// GitHub rejects requests without a User-Agent, so a client that lost
    /// its builder settings would be useless; surface the error instead.
    pub fn new(token: &str, owner: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to construct GitHub client")?;
        Ok(Self {
            client,
            token: token.to_string(),
            owner: owner.to_string(),
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The Pages site URL for a repository under this owner.
    pub fn pages_url(&self, repo_name: &str) -> String {
        format!("https://{}.github.io/{}/", self.owner, repo_name)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
    }

    /// Look a repository up by name; `None` on 404.
    pub async fn get_repo(&self, name: &str) -> Result<Option<Repo>> {
        let url = format!("{}/repos/{}/{}", API_BASE, self.owner, name);
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .context("Repo lookup request failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            bail!("Repo lookup returned {}", response.status());
        }
        Ok(Some(response.json().await?))
    }

    /// Create a public, un-initialized repository.
    ///
    /// The description is collapsed to a single line and truncated; the full
    /// brief belongs in the README, not the repo metadata.
    pub async fn create_repo(&self, name: &str, description: &str) -> Result<Repo> {
        let one_line: String = description
            .chars()
            .map(|c| if matches!(c, '\r' | '\n' | '\t') { ' ' } else { c })
            .take(DESCRIPTION_MAX)
            .collect();

        let url = format!("{}/user/repos", API_BASE);
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&json!({
                "name": name,
                "description": format!("{} (see README for full brief)", one_line),
                "private": false,
                "auto_init": false,
            }))
            .send()
            .await
            .context("Repo creation request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Repo creation returned {}: {}", status, body);
        }
        let repo: Repo = response.json().await?;
        tracing::info!("Created repo: {}", repo.full_name);
        Ok(repo)
    }

    /// Resolve a repository: return it if it exists, create it otherwise.
    pub async fn get_or_create_repo(&self, name: &str, description: &str) -> Result<Repo> {
        match self.get_repo(name).await {
            Ok(Some(repo)) => {
                tracing::info!("Repo already exists: {}", repo.full_name);
                return Ok(repo);
            }
            Ok(None) => {}
            // A failed lookup still falls through to creation; only if that
            // also fails is the repository genuinely unreachable.
            Err(e) => tracing::warn!("Repo lookup failed, attempting create: {:#}", e),
        }
        self.create_repo(name, description).await
    }

    /// Fetch a file's decoded content and revision marker; `None` on 404.
    pub async fn get_file(&self, repo_name: &str, path: &str) -> Result<Option<RepoFile>> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            API_BASE, self.owner, repo_name, path
        );
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .context("File fetch request failed")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            bail!("File fetch returned {}", response.status());
        }

        let contents: ContentsResponse = response.json().await?;
        let encoded: String = contents
            .content
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let content = BASE64
            .decode(encoded)
            .context("Contents API returned invalid base64")?;
        Ok(Some(RepoFile {
            content,
            sha: contents.sha,
        }))
    }

    /// Upsert a file: update in place (with its current revision marker) when
    /// the path exists, create it otherwise.
    pub async fn put_file(
        &self,
        repo_name: &str,
        path: &str,
        message: &str,
        content: &[u8],
    ) -> Result<()> {
        // A failed existence probe is treated as "absent"; the PUT below
        // surfaces the real error if there is one.
        let existing_sha = match self.get_file(repo_name, path).await {
            Ok(Some(file)) => Some(file.sha),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Existence probe for {} failed: {:#}", path, e);
                None
            }
        };

        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content),
        });
        if let Some(sha) = &existing_sha {
            body["sha"] = json!(sha);
        }

        let url = format!(
            "{}/repos/{}/{}/contents/{}",
            API_BASE, self.owner, repo_name, path
        );
        let response = self
            .request(reqwest::Method::PUT, url)
            .json(&body)
            .send()
            .await
            .context("File commit request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("File commit for {} returned {}: {}", path, status, text);
        }

        if existing_sha.is_some() {
            tracing::info!("Updated {} in {}/{}", path, self.owner, repo_name);
        } else {
            tracing::info!("Created {} in {}/{}", path, self.owner, repo_name);
        }
        Ok(())
    }

    /// Sha of the newest commit, or `None` for an empty repository.
    pub async fn latest_commit_sha(&self, repo_name: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/repos/{}/{}/commits?per_page=1",
            API_BASE, self.owner, repo_name
        );
        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .context("Commit list request failed")?;

        if !response.status().is_success() {
            bail!("Commit list returned {}", response.status());
        }
        let commits: Vec<CommitEntry> = response.json().await?;
        Ok(commits.into_iter().next().map(|c| c.sha))
    }

    /// Enable Pages for a repository, serving the branch root.
    ///
    /// 201/202 mean enabled, 422 means already enabled; anything else is
    /// retried a fixed number of times. Returns whether Pages ended up on.
    pub async fn enable_pages(&self, repo_name: &str, branch: &str) -> bool {
        let url = format!("{}/repos/{}/{}/pages", API_BASE, self.owner, repo_name);
        let body = json!({ "source": { "branch": branch, "path": "/" } });

        for attempt in 1..=PAGES_RETRIES {
            match self
                .request(reqwest::Method::POST, url.clone())
                .json(&body)
                .send()
                .await
            {
                Ok(response) => match response.status().as_u16() {
                    201 | 202 => {
                        tracing::info!("Pages enabled for {}/{}", self.owner, repo_name);
                        return true;
                    }
                    422 => {
                        tracing::info!("Pages already enabled for {}/{}", self.owner, repo_name);
                        return true;
                    }
                    status => {
                        let text = response.text().await.unwrap_or_default();
                        tracing::warn!(
                            "Pages attempt {}/{} returned {}: {}",
                            attempt,
                            PAGES_RETRIES,
                            status,
                            text
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!("Pages attempt {}/{} failed: {}", attempt, PAGES_RETRIES, e)
                }
            }
            if attempt < PAGES_RETRIES {
                tokio::time::sleep(PAGES_RETRY_DELAY).await;
            }
        }

        tracing::warn!(
            "Failed to enable Pages for {}/{} after {} attempts",
            self.owner,
            repo_name,
            PAGES_RETRIES
        );
        false
    }
}
