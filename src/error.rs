//! error.rs
//!
//! Error taxonomy for a single file's run through the pipeline.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::llm::client::LlmError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    Detect,
    Read,
    Parse,
    Plan,
    Generate,
    Assemble,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Config => "config",
            Stage::Detect => "detect",
            Stage::Read => "read",
            Stage::Parse => "parse",
            Stage::Plan => "plan",
            Stage::Generate => "generate",
            Stage::Assemble => "assemble",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported file type `{extension}` for {}: supported are .py, .java", .file.display())]
    UnsupportedLanguage { file: PathBuf, extension: String },

    #[error("failed to parse {}: {diagnostic}", .file.display())]
    Parse { file: PathBuf, diagnostic: String },

    #[error("no testable units in {}: source is empty", .file.display())]
    EmptyUnits { file: PathBuf },

    #[error(
        "generation failed for {} at batch {} ({}) after {attempts} attempt(s): {source}",
        .file.display(),
        .batch_index + 1,
        .block_ids.join(", ")
    )]
    Generation {
        file: PathBuf,
        batch_index: usize,
        block_ids: Vec<String>,
        attempts: u32,
        #[source]
        source: LlmError,
    },

    #[error("{stage}: I/O error for {}: {source}", .path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{stage}: failed to serialize {what}: {source}")]
    Serialize {
        stage: Stage,
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub fn stage(&self) -> Stage {
        match self {
            Error::UnsupportedLanguage { .. } => Stage::Detect,
            Error::Parse { .. } | Error::EmptyUnits { .. } => Stage::Parse,
            Error::Generation { .. } => Stage::Generate,
            Error::Io { stage, .. } => *stage,
            Error::Config(_) => Stage::Config,
            Error::Serialize { stage, .. } => *stage,
        }
    }

    pub(crate) fn io(stage: Stage, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            stage,
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_error_names_batch_and_blocks() {
        let err = Error::Generation {
            file: PathBuf::from("calc.py"),
            batch_index: 1,
            block_ids: vec!["calc.py_2".into(), "calc.py_3".into()],
            attempts: 3,
            source: LlmError::EmptyResponse,
        };

        let msg = err.to_string();
        assert!(msg.contains("batch 2"));
        assert!(msg.contains("calc.py_2, calc.py_3"));
        assert_eq!(err.stage(), Stage::Generate);
    }

    #[test]
    fn io_errors_keep_their_stage() {
        let err = Error::io(
            Stage::Assemble,
            "out/test_calc.py",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.stage(), Stage::Assemble);
        assert!(err.to_string().starts_with("assemble:"));
    }

    #[test]
    fn serialize_errors_keep_their_stage() {
        let source = serde_json::from_str::<u32>("nope").unwrap_err();
        let err = Error::Serialize {
            stage: Stage::Generate,
            what: "batch prompt",
            source,
        };
        assert_eq!(err.stage(), Stage::Generate);
        assert!(err.to_string().starts_with("generate: failed to serialize batch prompt"));
    }
}
