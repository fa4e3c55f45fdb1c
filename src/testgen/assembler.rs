//! testgen/assembler.rs
//!
//! Merges successive generation outputs into one test file.
//!
//! The first output replaces the artifact. Later outputs are appended
//! (Python) or inserted before the file's last closing brace (Java). Existing
//! text is never reordered.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::detectors::language::Language;
use crate::error::{Error, Result, Stage};
use crate::llm::prompt::BatchRole;
use crate::testgen::file::write_text;

const INDENT: usize = 4;

#[derive(Debug)]
pub struct Artifact {
    language: Language,
    content: String,
    started: bool,
    path: Option<PathBuf>,
}

impl Artifact {
    pub fn in_memory(language: Language) -> Self {
        Self {
            language,
            content: String::new(),
            started: false,
            path: None,
        }
    }

    /// Mirrored to `path` after every applied output.
    pub fn at_path(language: Language, path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::in_memory(language)
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_content(self) -> String {
        self.content
    }

    pub fn apply(&mut self, role: BatchRole, text: &str) -> Result<()> {
        self.content = merge(self.language, &self.content, role, text);
        self.started = true;

        if let Some(path) = &self.path {
            write_text(path, &self.content).map_err(|e| Error::io(Stage::Assemble, path, e))?;
            debug!(path = %path.display(), bytes = self.content.len(), role = role.as_str(), "artifact updated");
        }

        Ok(())
    }
}

/* ============================================================
   Merge rules
   ============================================================ */

pub fn merge(language: Language, existing: &str, role: BatchRole, fragment: &str) -> String {
    match role {
        BatchRole::First => with_trailing_newline(fragment.trim_end()),
        BatchRole::Continuation => match language.closing_delimiter() {
            None => append(existing, fragment),
            Some(delim) => insert_before_closing(existing, delim, fragment).unwrap_or_else(|| {
                warn!(%language, "no closing `{delim}` in artifact, appending fragment");
                append(existing, fragment)
            }),
        },
    }
}

/// Insert `fragment`, one level deeper, right before the last `delim`.
pub fn insert_before_closing(existing: &str, delim: char, fragment: &str) -> Option<String> {
    let idx = existing.rfind(delim)?;
    let (head, tail) = existing.split_at(idx);

    let mut out = String::with_capacity(existing.len() + fragment.len() + 16);
    out.push_str(head);
    if !head.is_empty() && !head.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&indent(fragment.trim_matches('\n').trim_end(), INDENT));
    out.push('\n');
    out.push_str(tail);
    Some(out)
}

/// `existing`, a blank line, then `fragment`.
pub fn append(existing: &str, fragment: &str) -> String {
    let fragment = fragment.trim_matches('\n').trim_end();
    if existing.trim().is_empty() {
        return with_trailing_newline(fragment);
    }

    let mut out = existing.trim_end_matches('\n').to_string();
    out.push_str("\n\n");
    out.push_str(fragment);
    out.push('\n');
    out
}

/// Drop a leading ```lang line and a trailing ``` line if the model added them.
pub fn strip_code_fences(text: &str) -> &str {
    let mut s = text.trim();

    if s.starts_with("```") {
        s = match s.find('\n') {
            Some(i) => &s[i + 1..],
            None => "",
        };
    }

    let trimmed = s.trim_end();
    if let Some(body) = trimmed.strip_suffix("```") {
        if body.is_empty() || body.ends_with('\n') {
            s = body;
        }
    }

    s.trim_matches('\n')
}

pub fn indent(s: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    s.lines()
        .map(|l| {
            if l.trim().is_empty() {
                String::new()
            } else {
                format!("{pad}{l}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn with_trailing_newline(s: &str) -> String {
    let mut out = s.to_string();
    if !out.is_empty() {
        out.push('\n');
    }
    out
}
