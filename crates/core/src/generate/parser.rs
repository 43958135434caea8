//! # Multi-File Response Parser
//!
//! Parses the model's free-text output into a filename -> content map using
//! the delimiter grammar the prompt requests, with two fallback tiers:
//!
//! 1. Delimited blocks: `>>> filename: <name.ext>` ... `---END FILE---`.
//! 2. Legacy two-part output: one `---README.md---` separator splitting the
//!    code file from the README.
//! 3. Neither: the whole text becomes `index.html` and the caller-supplied
//!    README stands in for the missing one.
//!
//! The marker strings are a versioned contract with the prompt in
//! [`super::build_user_prompt`]; change them together or not at all.

use std::collections::BTreeMap;

/// Start-of-file marker. The rest of the marker line is the filename.
pub const FILE_START: &str = ">>> filename:";

/// End-of-file marker, on its own line after the content.
pub const FILE_END: &str = "---END FILE---";

/// Separator of the legacy two-part format.
pub const LEGACY_SEPARATOR: &str = "---README.md---";

/// Parse model output into a non-empty filename -> content map.
///
/// `fallback_readme` is only used by the last tier, when the text matches
/// neither format and no README can be recovered from it.
pub fn parse_response(text: &str, fallback_readme: &str) -> BTreeMap<String, String> {
    let files = parse_delimited(text);
    if !files.is_empty() {
        return files;
    }

    if let Some((code, readme)) = text.split_once(LEGACY_SEPARATOR) {
        let mut files = BTreeMap::new();
        files.insert("index.html".to_string(), strip_code_fence(code).to_string());
        files.insert("README.md".to_string(), strip_code_fence(readme).to_string());
        return files;
    }

    let mut files = BTreeMap::new();
    files.insert("index.html".to_string(), strip_code_fence(text).to_string());
    files.insert("README.md".to_string(), fallback_readme.to_string());
    files
}

/// Tier 1: scan for `FILE_START` blocks. Content runs to the block's
/// `FILE_END` marker, the next `FILE_START`, or the end of the text,
/// whichever comes first.
fn parse_delimited(text: &str) -> BTreeMap<String, String> {
    let mut files = BTreeMap::new();

    let starts: Vec<usize> = text.match_indices(FILE_START).map(|(i, _)| i).collect();
    for (idx, &start) in starts.iter().enumerate() {
        let block_end = starts.get(idx + 1).copied().unwrap_or(text.len());
        let block = &text[start + FILE_START.len()..block_end];

        // Filename is the remainder of the marker line.
        let Some((name_line, body)) = block.split_once('\n') else {
            continue;
        };
        let name = name_line.trim();
        if name.is_empty() {
            continue;
        }

        let content = match body.find(FILE_END) {
            Some(pos) => &body[..pos],
            None => body,
        };
        files.insert(name.to_string(), strip_code_fence(content).to_string());
    }

    files
}

/// Remove one level of surrounding fenced-code markup, if present.
///
/// Handles an optional language tag on the opening fence. Inner fences are
/// left alone.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the language tag line (or the bare fence line).
    let inner = match rest.split_once('\n') {
        Some((_tag, body)) => body,
        None => return trimmed,
    };

    let inner = inner.trim_end();
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}
