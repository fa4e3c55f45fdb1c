//! detectors/ast
//!
//! Decomposes a source file into testable units ("blocks"): functions,
//! methods and constructors with their position and enclosing context.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::detectors::language::Language;
use crate::error::{Error, Result, Stage};

pub mod java;
pub mod java_fallback;
pub mod python;
pub mod tree;

/// One testable unit of source code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// `<file name>_<ordinal>`, suffixed `_partN` for split fragments.
    pub block_id: String,
    pub function_name: String,
    pub class_context: Option<String>,
    pub package_context: Option<String>,

    /* 1-based, inclusive */
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,

    pub signature: String,
    pub code: String,
    pub language: Language,

    #[serde(default)]
    pub is_constructor: bool,

    /// Decorator names, recorded for reference only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorators: Vec<String>,
}

impl Block {
    pub(crate) fn unit(language: Language, function_name: String) -> Self {
        Self {
            block_id: String::new(),
            function_name,
            class_context: None,
            package_context: None,
            start_line: None,
            end_line: None,
            signature: String::new(),
            code: String::new(),
            language,
            is_constructor: false,
            decorators: Vec::new(),
        }
    }

    /// `Class.method` or bare `function`.
    pub fn qualified_name(&self) -> String {
        match &self.class_context {
            Some(class) => format!("{class}.{}", self.function_name),
            None => self.function_name.clone(),
        }
    }
}

/* ============================================================
   Public API
   ============================================================ */

/// Parse `source` into blocks ordered by declaration.
///
/// A blank source is an [`Error::EmptyUnits`]. A non-blank source without any
/// function, method or constructor yields one whole-file block.
pub fn parse(source: &str, file: &Path, language: Language) -> Result<Vec<Block>> {
    if source.trim().is_empty() {
        return Err(Error::EmptyUnits {
            file: file.to_path_buf(),
        });
    }

    let mut blocks = match language {
        Language::Python => python::extract(source, file)?,
        Language::Java => java::extract(source),
    };

    if blocks.is_empty() {
        debug!(file = %file.display(), "no units found, using whole-file block");
        blocks.push(whole_file_block(source, file, language));
    }

    blocks.sort_by_key(|b| b.start_line.unwrap_or(usize::MAX));

    let file_name = file_name(file);
    for (idx, block) in blocks.iter_mut().enumerate() {
        block.block_id = format!("{file_name}_{idx}");
    }

    info!(
        file = %file.display(),
        %language,
        blocks = blocks.len(),
        "parsed source"
    );

    Ok(blocks)
}

/// Write the block list as pretty JSON for debugging.
pub fn write_summary(out_dir: &Path, source_file: &Path, blocks: &[Block]) -> Result<PathBuf> {
    let path = out_dir.join(format!("{}.summary.json", file_name(source_file)));

    let text = serde_json::to_string_pretty(blocks).map_err(|source| Error::Serialize {
        stage: Stage::Parse,
        what: "block summary",
        source,
    })?;

    fs::create_dir_all(out_dir).map_err(|e| Error::io(Stage::Parse, out_dir, e))?;
    fs::write(&path, text).map_err(|e| Error::io(Stage::Parse, &path, e))?;

    debug!(path = %path.display(), "wrote block summary");
    Ok(path)
}

/* ============================================================
   Helpers
   ============================================================ */

fn whole_file_block(source: &str, file: &Path, language: Language) -> Block {
    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string();

    let end = source.lines().count().max(1);

    let mut block = Block::unit(language, stem);
    block.start_line = Some(1);
    block.end_line = Some(end);
    block.signature = first_non_blank_line(source);
    block.code = slice_lines(source, 1, end);
    block
}

pub(crate) fn file_name(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "source".to_string())
}

/// Lines `start..=end` (1-based) of `source`.
pub(crate) fn slice_lines(source: &str, start: usize, end: usize) -> String {
    source
        .lines()
        .skip(start.saturating_sub(1))
        .take(end.saturating_sub(start) + 1)
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn first_non_blank_line(code: &str) -> String {
    code.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default()
        .to_string()
}
