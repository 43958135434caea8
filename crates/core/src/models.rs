//! # Pagesmith Models
//!
//! Shared request, attachment, and payload types. The inbound request schema
//! is explicit: required fields are plain, optional ones carry serde defaults,
//! so a malformed body fails at the boundary instead of deep in the workflow.

use serde::{Deserialize, Serialize};

/// An inbound unit of work: one brief, one round, for one task repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Shared secret; checked before anything else happens.
    pub secret: String,
    /// Requester identity, part of the dedup key.
    pub email: String,
    /// Task identifier, used as the repository name.
    pub task: String,
    /// Iteration counter: 1 creates, >= 2 revises.
    #[serde(default = "default_round")]
    pub round: u32,
    /// Caller-supplied uniqueness token, part of the dedup key.
    pub nonce: String,
    /// Free-text project specification.
    pub brief: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Evaluation check strings, embedded verbatim in the prompt.
    #[serde(default)]
    pub checks: Vec<String>,
    /// Where the publish payload gets POSTed when the work is done.
    #[serde(default)]
    pub evaluation_url: Option<String>,
}

fn default_round() -> u32 {
    1
}

impl SubmitRequest {
    /// Canonical dedup key for this request.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(&self.email, &self.task, self.round, &self.nonce)
    }
}

/// Inbound attachment descriptor: either inline `content` (text or base64) or
/// a `data:` URL. Descriptors with neither shape are skipped during decode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default = "default_attachment_name")]
    pub name: String,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

fn default_attachment_name() -> String {
    "attachment".to_string()
}

/// A decoded attachment sitting on local disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedAttachment {
    pub name: String,
    pub path: String,
    pub mime: String,
    pub size: usize,
}

/// The durable record of what was published for one dedup key. Replayed
/// verbatim to the evaluator when a duplicate request arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPayload {
    pub email: String,
    pub task: String,
    pub round: u32,
    pub nonce: String,
    pub repo_url: String,
    pub commit_sha: Option<String>,
    pub pages_url: Option<String>,
}

/// Identity of a unit of work: `{email}::{task}::round{round}::nonce{nonce}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(email: &str, task: &str, round: u32, nonce: &str) -> Self {
        Self(format!("{}::{}::round{}::nonce{}", email, task, round, nonce))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of a single workflow step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum StepOutcome {
    /// Step completed as intended.
    Ok,
    /// Step fell back to a degraded value (null sha, no prior context, ...).
    Degraded(String),
    /// Step failed outright; the workflow continued without it.
    Failed(String),
}

/// Per-step outcomes for one workflow run, in execution order.
///
/// The payload alone can't tell you whether a null `commit_sha` was a fetch
/// failure or an empty repository; this can.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowReport {
    pub steps: Vec<(String, StepOutcome)>,
}

impl WorkflowReport {
    pub fn push(&mut self, step: &str, outcome: StepOutcome) {
        self.steps.push((step.to_string(), outcome));
    }

    /// True when every recorded step completed cleanly.
    pub fn all_ok(&self) -> bool {
        self.steps.iter().all(|(_, o)| *o == StepOutcome::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_canonical_form() {
        let key = DedupKey::new("a@b.com", "demo1", 1, "n1");
        assert_eq!(key.as_str(), "a@b.com::demo1::round1::noncen1");
    }

    #[test]
    fn test_request_defaults() {
        let req: SubmitRequest = serde_json::from_str(
            r#"{"secret":"S","email":"a@b.com","task":"demo1","nonce":"n1","brief":"Build index.html"}"#,
        )
        .unwrap();
        assert_eq!(req.round, 1);
        assert!(req.attachments.is_empty());
        assert!(req.checks.is_empty());
        assert!(req.evaluation_url.is_none());
    }

    #[test]
    fn test_request_missing_required_field_rejected() {
        // no nonce
        let res: Result<SubmitRequest, _> = serde_json::from_str(
            r#"{"secret":"S","email":"a@b.com","task":"demo1","brief":"x"}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_report_all_ok() {
        let mut report = WorkflowReport::default();
        report.push("create_repo", StepOutcome::Ok);
        assert!(report.all_ok());
        report.push("commit_sha", StepOutcome::Degraded("no commits".into()));
        assert!(!report.all_ok());
    }
}
