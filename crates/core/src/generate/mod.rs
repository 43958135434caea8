//! # Project Generation
//!
//! Builds the generation prompt from a brief, attachments, and evaluation
//! checks, runs the completion endpoint, and parses the response into a
//! file set. Guaranteed to return at least one file: a completion failure
//! substitutes a canned two-file project, and the parser's last tier accepts
//! arbitrary text.

pub mod parser;

use crate::attachments::{decode_attachments, summarize_attachments};
use crate::llm::CompletionClient;
use crate::models::{Attachment, SavedAttachment};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

/// System instruction sent with every generation request.
pub const SYSTEM_PROMPT: &str = include_str!("prompts/system.md");

/// A parsed generation result: the files to commit plus the decoded
/// attachments that informed the prompt.
#[derive(Debug, Clone)]
pub struct GeneratedProject {
    pub files: BTreeMap<String, String>,
    pub attachments: Vec<SavedAttachment>,
    /// True when the completion call failed and the canned files were used.
    pub used_fallback: bool,
}

/// Filenames the brief mentions, in order of appearance.
///
/// Tokens shaped like `name.ext` with a recognized static-site extension.
/// An empty result defaults to the canonical `index.html` + `README.md` pair.
pub fn expected_files(brief: &str) -> Vec<String> {
    static FILENAME: OnceLock<Regex> = OnceLock::new();
    let re = FILENAME.get_or_init(|| {
        Regex::new(r"[\w\-]+\.(?:txt|json|md|svg|html|csv)").expect("filename regex")
    });

    let found: Vec<String> = re.find_iter(brief).map(|m| m.as_str().to_string()).collect();
    if found.is_empty() {
        vec!["index.html".to_string(), "README.md".to_string()]
    } else {
        found
    }
}

/// Compose the user prompt for one generation round.
pub fn build_user_prompt(
    brief: &str,
    round: u32,
    prev_readme: Option<&str>,
    attachments_meta: &str,
    checks: &[String],
    expected: &[String],
) -> String {
    let context_note = match prev_readme {
        Some(readme) if round >= 2 => format!(
            "\n### Previous README.md:\n{}\n\nRevise and enhance this project according to the new brief below.\n",
            readme
        ),
        _ => String::new(),
    };

    let expected_list = expected
        .iter()
        .map(|f| format!("- {}", f))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a professional full-stack web developer assistant.\n\
         \n\
         ### Round\n{round}\n\
         \n\
         ### Task\n{brief}\n\
         {context_note}\n\
         ### Attachments (if any)\n{attachments_meta}\n\
         \n\
         ### Evaluation checks\n{checks:?}\n\
         \n\
         ### Expected files\n\
         The brief mentions or implies these files:\n{expected_list}\n\
         \n\
         ### Output format rules:\n\
         1. You must output **each file separately** using the following format:\n\
         \x20  {file_start} <name.ext>\n\
         \x20  (file content here)\n\
         \x20  {file_end}\n\
         2. Include *all files required by the brief*.\n\
         3. Every file must contain complete, valid content (valid JSON, SVG, HTML, etc.).\n\
         4. Do NOT include commentary outside this format.\n\
         5. The final output must contain all files in one response.\n",
        round = round,
        brief = brief,
        context_note = context_note,
        attachments_meta = attachments_meta,
        checks = checks,
        expected_list = expected_list,
        file_start = parser::FILE_START,
        file_end = parser::FILE_END,
    )
}

/// README used when the model output carries no README of its own.
pub fn readme_fallback(brief: &str, checks: &[String], attachments_meta: &str, round: u32) -> String {
    format!(
        "# Auto-generated README (Round {round})\n\
         \n\
         **Project brief:** {brief}\n\
         \n\
         **Attachments:**\n{attachments_meta}\n\
         \n\
         **Checks to meet:**\n{checks}\n\
         \n\
         ## Setup\n\
         1. Open `index.html` in a browser.\n\
         2. No build steps required.\n\
         \n\
         ## Notes\n\
         This README was generated as a fallback (the model did not return an explicit README).\n",
        round = round,
        brief = brief,
        attachments_meta = attachments_meta,
        checks = checks.join("\n"),
    )
}

/// Canned delimited response used when the completion call itself fails.
fn fallback_response(brief: &str) -> String {
    format!(
        "{start} index.html\n\
         <html><body><h1>Fallback App</h1><p>{brief}</p></body></html>\n\
         {end}\n\
         {start} README.md\n\
         # Auto-generated README\n\
         This fallback was generated due to a completion endpoint error.\n\
         {end}\n",
        start = parser::FILE_START,
        end = parser::FILE_END,
        brief = brief,
    )
}

/// Generate or revise a multi-file project for one round.
///
/// Never fails and never returns an empty file map: completion errors fall
/// back to a canned project, parse misses fall through the parser's tiers.
pub async fn generate_project(
    llm: &CompletionClient,
    attachment_dir: &Path,
    brief: &str,
    attachments: &[Attachment],
    checks: &[String],
    round: u32,
    prev_readme: Option<&str>,
) -> GeneratedProject {
    let saved = decode_attachments(attachments, attachment_dir).await;
    let attachments_meta = summarize_attachments(&saved).await;

    let expected = expected_files(brief);
    let prompt = build_user_prompt(brief, round, prev_readme, &attachments_meta, checks, &expected);

    let (text, used_fallback) = match llm.complete(SYSTEM_PROMPT, &prompt).await {
        Ok(text) => {
            tracing::info!("Generated multi-file project via completion endpoint");
            (text, false)
        }
        Err(e) => {
            tracing::warn!("Completion endpoint failed, using fallback files: {}", e);
            (fallback_response(brief), true)
        }
    };

    let files = parser::parse_response(
        &text,
        &readme_fallback(brief, checks, &attachments_meta, round),
    );
    tracing::info!(
        "Parsed {} files from model output: {:?}",
        files.len(),
        files.keys().collect::<Vec<_>>()
    );

    GeneratedProject {
        files,
        attachments: saved,
        used_fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_files_from_brief() {
        let files = expected_files("Create ashravan.txt and dilemma.json");
        assert_eq!(files, vec!["ashravan.txt", "dilemma.json"]);
    }

    #[test]
    fn test_expected_files_defaults_when_none_mentioned() {
        let files = expected_files("Build a landing page for a bakery");
        assert_eq!(files, vec!["index.html", "README.md"]);
    }

    #[test]
    fn test_prompt_embeds_expected_files_verbatim() {
        let expected = expected_files("Create ashravan.txt and dilemma.json");
        let prompt = build_user_prompt(
            "Create ashravan.txt and dilemma.json",
            1,
            None,
            "",
            &[],
            &expected,
        );
        assert!(prompt.contains("- ashravan.txt"));
        assert!(prompt.contains("- dilemma.json"));
        assert!(prompt.contains(parser::FILE_START));
        assert!(prompt.contains(parser::FILE_END));
    }

    #[test]
    fn test_prompt_includes_round_two_context() {
        let prompt = build_user_prompt("Revise it", 2, Some("# Old README"), "", &[], &[]);
        assert!(prompt.contains("### Previous README.md:"));
        assert!(prompt.contains("# Old README"));
    }

    #[test]
    fn test_round_one_never_gets_context_note() {
        let prompt = build_user_prompt("Build it", 1, Some("# Old README"), "", &[], &[]);
        assert!(!prompt.contains("### Previous README.md:"));
    }

    #[test]
    fn test_prompt_embeds_checks() {
        let checks = vec!["page loads".to_string(), "json is valid".to_string()];
        let prompt = build_user_prompt("Build it", 1, None, "", &checks, &[]);
        assert!(prompt.contains("page loads"));
        assert!(prompt.contains("json is valid"));
    }

    #[test]
    fn test_fallback_response_parses_to_two_files() {
        let files = parser::parse_response(&fallback_response("Build index.html"), "readme");
        assert_eq!(files.len(), 2);
        assert!(files["index.html"].contains("Build index.html"));
        assert!(files["README.md"].contains("fallback"));
    }

    #[test]
    fn test_readme_fallback_carries_brief_verbatim() {
        let readme = readme_fallback("Build a chess clock", &["works".to_string()], "- a.txt", 1);
        assert!(readme.contains("Build a chess clock"));
        assert!(readme.contains("works"));
        assert!(readme.contains("- a.txt"));
    }

    #[test]
    fn test_system_prompt_non_empty() {
        assert!(SYSTEM_PROMPT.len() > 50);
    }
}
