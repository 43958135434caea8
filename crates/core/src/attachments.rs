//! # Attachments
//!
//! Decodes inbound attachment descriptors to local files and produces the
//! short per-file summaries embedded in generation prompts.
//!
//! Decoding is batch-tolerant: a descriptor that fails to decode or write is
//! logged and skipped, never aborting the rest of the batch.

use crate::models::{Attachment, SavedAttachment};
use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::path::Path;
use tokio::fs;

/// Extensions treated as text when deciding whether to preview a file.
const PREVIEW_TEXT_EXTENSIONS: [&str; 4] = [".md", ".txt", ".json", ".csv"];

/// Maximum preview length included in a prompt summary line.
const PREVIEW_CHARS: usize = 1000;

/// Decode a batch of attachment descriptors into `dir`, one file per
/// descriptor under its given name (same name overwrites).
///
/// Returns a record per successfully decoded descriptor. Descriptors carrying
/// neither `content` nor a `data:` URL are skipped silently; decode and write
/// failures are skipped with a warning.
pub async fn decode_attachments(attachments: &[Attachment], dir: &Path) -> Vec<SavedAttachment> {
    if let Err(e) = fs::create_dir_all(dir).await {
        tracing::warn!("Failed to create attachment dir {:?}: {}", dir, e);
        return Vec::new();
    }

    let mut saved = Vec::new();
    for att in attachments {
        match decode_one(att, dir).await {
            Ok(Some(record)) => saved.push(record),
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to decode attachment '{}': {:#}", att.name, e),
        }
    }
    saved
}

async fn decode_one(att: &Attachment, dir: &Path) -> Result<Option<SavedAttachment>> {
    let path = dir.join(&att.name);

    if let Some(content) = &att.content {
        let mime = att.mime.clone().unwrap_or_else(|| "text/plain".to_string());
        let data = if mime.starts_with("text") {
            content.as_bytes().to_vec()
        } else {
            BASE64
                .decode(content.trim())
                .context("content is not valid base64")?
        };
        fs::write(&path, &data)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        return Ok(Some(SavedAttachment {
            name: att.name.clone(),
            path: path.to_string_lossy().into_owned(),
            mime,
            size: data.len(),
        }));
    }

    if let Some(url) = &att.url {
        if let Some(rest) = url.strip_prefix("data:") {
            let (header, payload) = rest
                .split_once(',')
                .context("data URL has no comma separator")?;
            let mime = header.split(';').next().unwrap_or_default().to_string();
            let data = BASE64
                .decode(payload.trim())
                .context("data URL payload is not valid base64")?;
            fs::write(&path, &data)
                .await
                .with_context(|| format!("Failed to write {:?}", path))?;
            return Ok(Some(SavedAttachment {
                name: att.name.clone(),
                path: path.to_string_lossy().into_owned(),
                mime,
                size: data.len(),
            }));
        }
    }

    // Neither inline content nor a data URL: nothing to decode.
    Ok(None)
}

/// One descriptive line per decoded attachment, for prompt inclusion.
///
/// Text-like files get an escaped single-line preview; everything else is
/// reported by name, mime, and size. A file that cannot be read back gets a
/// placeholder line. This function never fails as a whole.
pub async fn summarize_attachments(saved: &[SavedAttachment]) -> String {
    let mut lines = Vec::with_capacity(saved.len());
    for record in saved {
        lines.push(match summarize_one(record).await {
            Ok(line) => line,
            Err(e) => format!(
                "- {} ({}): (could not read preview: {:#})",
                record.name, record.mime, e
            ),
        });
    }
    lines.join("\n")
}

async fn summarize_one(record: &SavedAttachment) -> Result<String> {
    let text_like = record.mime.starts_with("text")
        || PREVIEW_TEXT_EXTENSIONS
            .iter()
            .any(|ext| record.name.ends_with(ext));

    if !text_like {
        return Ok(format!(
            "- {} ({}): {} bytes",
            record.name, record.mime, record.size
        ));
    }

    let raw = fs::read(&record.path)
        .await
        .with_context(|| format!("Failed to read {}", record.path))?;
    let text = String::from_utf8_lossy(&raw);

    let preview = if record.name.ends_with(".csv") {
        let head: Vec<&str> = text.lines().take(3).map(str::trim).collect();
        if head.is_empty() {
            bail!("empty CSV");
        }
        head.join("\\n")
    } else {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        let escaped: String = head.replace('\n', "\\n");
        escaped.chars().take(PREVIEW_CHARS).collect()
    };

    Ok(format!(
        "- {} ({}): preview: {}",
        record.name, record.mime, preview
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attachment;
    use tempfile::tempdir;

    fn descriptor(name: &str, mime: Option<&str>, content: Option<&str>, url: Option<&str>) -> Attachment {
        Attachment {
            name: name.to_string(),
            mime: mime.map(str::to_string),
            content: content.map(str::to_string),
            url: url.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_text_content_round_trips() {
        let dir = tempdir().unwrap();
        let saved = decode_attachments(
            &[descriptor("notes.txt", Some("text/plain"), Some("hello\nworld"), None)],
            dir.path(),
        )
        .await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].size, 11);
        let on_disk = std::fs::read(dir.path().join("notes.txt")).unwrap();
        assert_eq!(on_disk, b"hello\nworld");
    }

    #[tokio::test]
    async fn test_binary_content_decodes_base64() {
        let dir = tempdir().unwrap();
        // 4 bytes: DE AD BE EF
        let saved = decode_attachments(
            &[descriptor("blob.bin", Some("application/octet-stream"), Some("3q2+7w=="), None)],
            dir.path(),
        )
        .await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].size, 4);
        assert_eq!(saved[0].mime, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_malformed_base64_is_skipped() {
        let dir = tempdir().unwrap();
        let saved = decode_attachments(
            &[
                descriptor("bad.bin", Some("application/octet-stream"), Some("!!not-base64!!"), None),
                descriptor("good.txt", Some("text/plain"), Some("ok"), None),
            ],
            dir.path(),
        )
        .await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].name, "good.txt");
    }

    #[tokio::test]
    async fn test_data_url_decodes_with_mime() {
        let dir = tempdir().unwrap();
        let saved = decode_attachments(
            &[descriptor("pixel.png", None, None, Some("data:image/png;base64,3q2+7w=="))],
            dir.path(),
        )
        .await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].mime, "image/png");
        assert_eq!(saved[0].size, 4);
    }

    #[tokio::test]
    async fn test_shapeless_descriptor_skipped_silently() {
        let dir = tempdir().unwrap();
        let saved = decode_attachments(
            &[descriptor("mystery", None, None, Some("https://example.com/f"))],
            dir.path(),
        )
        .await;
        assert!(saved.is_empty());
    }

    #[tokio::test]
    async fn test_summary_previews_text_and_sizes_binary() {
        let dir = tempdir().unwrap();
        let saved = decode_attachments(
            &[
                descriptor("readme.md", Some("text/markdown"), Some("# Title\nBody"), None),
                descriptor("blob.bin", Some("application/octet-stream"), Some("3q2+7w=="), None),
            ],
            dir.path(),
        )
        .await;
        let summary = summarize_attachments(&saved).await;
        assert!(summary.contains("- readme.md (text/markdown): preview: # Title\\nBody"));
        assert!(summary.contains("- blob.bin (application/octet-stream): 4 bytes"));
    }

    #[tokio::test]
    async fn test_summary_csv_takes_three_lines() {
        let dir = tempdir().unwrap();
        let saved = decode_attachments(
            &[descriptor("data.csv", Some("text/csv"), Some("a,b\n1,2\n3,4\n5,6"), None)],
            dir.path(),
        )
        .await;
        let summary = summarize_attachments(&saved).await;
        assert!(summary.contains("preview: a,b\\n1,2\\n3,4"));
        assert!(!summary.contains("5,6"));
    }

    #[tokio::test]
    async fn test_summary_survives_missing_file() {
        let record = SavedAttachment {
            name: "gone.txt".into(),
            path: "/nonexistent/gone.txt".into(),
            mime: "text/plain".into(),
            size: 0,
        };
        let summary = summarize_attachments(&[record]).await;
        assert!(summary.contains("could not read preview"));
    }
}
