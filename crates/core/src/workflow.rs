//! # Publishing Workflow
//!
//! The ordered side-effecting sequence that turns an accepted request into a
//! published repository: resolve the repo, generate files, commit attachments
//! and files and a license, enable Pages, then notify the evaluator and
//! record the payload under the request's dedup key.
//!
//! Most steps are fault-tolerant: a failed step records a `Degraded` or
//! `Failed` outcome in the [`WorkflowReport`] and the sequence continues with
//! a null or skipped value. Only an unreachable repository aborts the run.

use crate::attachments::decode_attachments;
use crate::context::AppContext;
use crate::generate::generate_project;
use crate::license::mit_license;
use crate::models::{PublishPayload, StepOutcome, SubmitRequest, WorkflowReport};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Extensions committed as text even when the mime says otherwise.
const TEXT_EXTENSIONS: [&str; 7] = [".md", ".csv", ".json", ".txt", ".html", ".css", ".js"];

/// Run the full publishing sequence for one accepted request.
///
/// Returns the payload delivered to the evaluator plus the per-step report.
/// The caller has already received its HTTP acknowledgment; errors here are
/// for the log, not the requester.
pub async fn process_request(
    ctx: &AppContext,
    request: SubmitRequest,
) -> Result<(PublishPayload, WorkflowReport)> {
    let round = request.round;
    let task = request.task.clone();
    let mut report = WorkflowReport::default();
    tracing::info!("Starting background process for task {} (round {})", task, round);

    // Decode attachments up front for visibility; the generator decodes its
    // own copy as part of prompt assembly.
    let early = decode_attachments(&request.attachments, &ctx.config.attachment_dir).await;
    tracing::info!("Attachments saved: {:?}", early.iter().map(|a| &a.name).collect::<Vec<_>>());
    report.push(
        "decode_attachments",
        if early.len() == request.attachments.len() {
            StepOutcome::Ok
        } else {
            StepOutcome::Degraded(format!(
                "{} of {} attachments decoded",
                early.len(),
                request.attachments.len()
            ))
        },
    );

    // The repository is the one step nothing can proceed without.
    let repo = ctx
        .github
        .get_or_create_repo(&task, &format!("Auto-generated app for task: {}", request.brief))
        .await
        .context("Could not resolve destination repository")?;
    report.push("resolve_repo", StepOutcome::Ok);

    // Round >= 2 revises: pull the previous README as context, best-effort.
    let prev_readme = if round >= 2 {
        match ctx.github.get_file(&repo.name, "README.md").await {
            Ok(Some(file)) => {
                tracing::info!("Loaded previous README for round {} context", round);
                report.push("fetch_prev_readme", StepOutcome::Ok);
                Some(String::from_utf8_lossy(&file.content).into_owned())
            }
            Ok(None) => {
                report.push("fetch_prev_readme", StepOutcome::Degraded("no README yet".into()));
                None
            }
            Err(e) => {
                report.push("fetch_prev_readme", StepOutcome::Degraded(format!("{:#}", e)));
                None
            }
        }
    } else {
        None
    };

    let generated = generate_project(
        &ctx.llm,
        &ctx.config.attachment_dir,
        &request.brief,
        &request.attachments,
        &request.checks,
        round,
        prev_readme.as_deref(),
    )
    .await;
    report.push(
        "generate",
        if generated.used_fallback {
            StepOutcome::Degraded("completion failed, canned files used".into())
        } else {
            StepOutcome::Ok
        },
    );

    // Commit attachments every round: text-like ones verbatim, binary ones
    // raw plus a base64 backup copy under attachments/.
    let mut attachment_failures = Vec::new();
    for att in &generated.attachments {
        if let Err(e) = commit_attachment(ctx, &repo.name, att).await {
            tracing::warn!("Attachment commit failed for '{}': {:#}", att.name, e);
            attachment_failures.push(att.name.clone());
        }
    }
    report.push(
        "commit_attachments",
        if attachment_failures.is_empty() {
            StepOutcome::Ok
        } else {
            StepOutcome::Degraded(format!("failed: {}", attachment_failures.join(", ")))
        },
    );

    // Generated files, then the license. Upserts make re-runs safe.
    let mut file_failures = Vec::new();
    for (name, content) in &generated.files {
        if let Err(e) = ctx
            .github
            .put_file(&repo.name, name, &format!("Add/Update {}", name), content.as_bytes())
            .await
        {
            tracing::warn!("Commit failed for generated file '{}': {:#}", name, e);
            file_failures.push(name.clone());
        }
    }
    report.push(
        "commit_files",
        if file_failures.is_empty() {
            StepOutcome::Ok
        } else {
            StepOutcome::Failed(format!("failed: {}", file_failures.join(", ")))
        },
    );

    let license = mit_license(ctx.github.owner());
    match ctx
        .github
        .put_file(&repo.name, "LICENSE", "Add MIT license", license.as_bytes())
        .await
    {
        Ok(()) => report.push("commit_license", StepOutcome::Ok),
        Err(e) => {
            tracing::warn!("License commit failed: {:#}", e);
            report.push("commit_license", StepOutcome::Failed(format!("{:#}", e)));
        }
    }

    // Pages: toggled once on round 1; later rounds assume it stayed on.
    let pages_url = if round == 1 {
        if ctx.github.enable_pages(&repo.name, "main").await {
            report.push("enable_pages", StepOutcome::Ok);
            Some(ctx.github.pages_url(&repo.name))
        } else {
            report.push("enable_pages", StepOutcome::Failed("retries exhausted".into()));
            None
        }
    } else {
        report.push("enable_pages", StepOutcome::Ok);
        Some(ctx.github.pages_url(&repo.name))
    };

    let commit_sha = match ctx.github.latest_commit_sha(&repo.name).await {
        Ok(Some(sha)) => {
            report.push("commit_sha", StepOutcome::Ok);
            Some(sha)
        }
        Ok(None) => {
            report.push("commit_sha", StepOutcome::Degraded("no commits".into()));
            None
        }
        Err(e) => {
            tracing::warn!("Commit sha fetch failed: {:#}", e);
            report.push("commit_sha", StepOutcome::Degraded(format!("{:#}", e)));
            None
        }
    };

    let payload = PublishPayload {
        email: request.email.clone(),
        task: task.clone(),
        round,
        nonce: request.nonce.clone(),
        repo_url: repo.html_url.clone(),
        commit_sha,
        pages_url,
    };

    // Fire-and-forget delivery. Failure is not retried here; the evaluator's
    // own re-delivery hits the duplicate-replay branch instead.
    if let Some(url) = &request.evaluation_url {
        match notify_evaluator(&ctx.http, url, &payload).await {
            Ok(()) => report.push("notify", StepOutcome::Ok),
            Err(e) => {
                tracing::warn!("Evaluator notification failed: {:#}", e);
                report.push("notify", StepOutcome::Failed(format!("{:#}", e)));
            }
        }
    } else {
        report.push("notify", StepOutcome::Degraded("no evaluation_url".into()));
    }

    let key = request.dedup_key();
    ctx.store
        .record(&key, &payload)
        .await
        .context("Failed to record publish payload")?;
    report.push("record", StepOutcome::Ok);

    tracing::info!(
        "Finished round {} for {} (all steps ok: {})",
        round,
        task,
        report.all_ok()
    );
    Ok((payload, report))
}

async fn commit_attachment(
    ctx: &AppContext,
    repo_name: &str,
    att: &crate::models::SavedAttachment,
) -> Result<()> {
    let bytes = tokio::fs::read(&att.path)
        .await
        .with_context(|| format!("Failed to read {}", att.path))?;

    if is_text_like(&att.mime, &att.name) {
        let text = String::from_utf8_lossy(&bytes);
        ctx.github
            .put_file(
                repo_name,
                &att.name,
                &format!("Add attachment {}", att.name),
                text.as_bytes(),
            )
            .await
    } else {
        ctx.github
            .put_file(repo_name, &att.name, &format!("Add binary {}", att.name), &bytes)
            .await?;
        let b64 = BASE64.encode(&bytes);
        ctx.github
            .put_file(
                repo_name,
                &format!("attachments/{}.b64", att.name),
                &format!("Backup {}.b64", att.name),
                b64.as_bytes(),
            )
            .await
    }
}

fn is_text_like(mime: &str, name: &str) -> bool {
    mime.starts_with("text") || TEXT_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// POST the publish payload to the evaluator. No response contract is relied
/// upon beyond the status code.
pub async fn notify_evaluator(
    client: &reqwest::Client,
    url: &str,
    payload: &PublishPayload,
) -> Result<()> {
    let response = client
        .post(url)
        .json(payload)
        .send()
        .await
        .context("Notification request failed")?;
    if !response.status().is_success() {
        anyhow::bail!("Evaluator returned {}", response.status());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_like_by_mime_and_extension() {
        assert!(is_text_like("text/plain", "whatever.bin"));
        assert!(is_text_like("application/octet-stream", "notes.md"));
        assert!(is_text_like("application/json", "data.json"));
        assert!(!is_text_like("image/png", "logo.png"));
    }
}
