//! detectors/language.rs
//!
//! Source language detection based on file extensions.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
}

impl Language {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "py" => Some(Language::Python),
            "java" => Some(Language::Java),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::Java => "Java",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::Java => "java",
        }
    }

    /// Test framework the generated file targets.
    pub fn framework(self) -> &'static str {
        match self {
            Language::Python => "pytest",
            Language::Java => "JUnit 5",
        }
    }

    /// Character closing the outermost scope of a generated test file.
    ///
    /// `None` for indentation-structured languages, which are appended to.
    pub fn closing_delimiter(self) -> Option<char> {
        match self {
            Language::Python => None,
            Language::Java => Some('}'),
        }
    }
}

/* ============================================================
   Public API
   ============================================================ */

pub fn detect_language(path: &Path) -> Result<Language> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    Language::from_extension(ext).ok_or_else(|| Error::UnsupportedLanguage {
        file: path.to_path_buf(),
        extension: if ext.is_empty() {
            "<none>".to_string()
        } else {
            format!(".{ext}")
        },
    })
}

/// Expand files and directories into the supported source files they hold.
///
/// Explicit file arguments are kept as-is (even if unsupported) so the
/// pipeline can report them; directories only contribute supported files.
pub fn discover_sources(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut out = Vec::new();

    for path in paths {
        if !path.is_dir() {
            out.push(path.clone());
            continue;
        }

        let mut found: Vec<PathBuf> = WalkDir::new(path)
            .into_iter()
            .filter_entry(|e| !is_ignored(e.path()))
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|x| x.to_str())
                    .and_then(Language::from_extension)
                    .is_some()
            })
            .map(|e| e.into_path())
            .collect();

        found.sort();
        out.extend(found);
    }

    out
}

/* ============================================================
   Helpers
   ============================================================ */

fn is_ignored(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| {
            matches!(
                n,
                "target" | "node_modules" | ".git" | ".venv" | "dist" | "build" | "__pycache__"
            )
        })
        .unwrap_or(false)
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Language::Python => "python",
            Language::Java => "java",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn detects_supported_extensions_case_insensitively() {
        assert_eq!(detect_language(Path::new("calc.py")).unwrap(), Language::Python);
        assert_eq!(detect_language(Path::new("src/Calc.JAVA")).unwrap(), Language::Java);
    }

    #[test]
    fn rejects_unsupported_extension() {
        let err = detect_language(Path::new("main.rs")).unwrap_err();
        match err {
            Error::UnsupportedLanguage { extension, .. } => assert_eq!(extension, ".rs"),
            other => panic!("unexpected error: {other}"),
        }

        assert!(detect_language(Path::new("Makefile")).is_err());
    }

    #[test]
    fn discover_walks_directories_and_skips_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("pkg")).unwrap();
        fs::create_dir_all(dir.path().join(".venv/lib")).unwrap();
        fs::write(dir.path().join("pkg/a.py"), "def a(): pass\n").unwrap();
        fs::write(dir.path().join("pkg/B.java"), "class B {}\n").unwrap();
        fs::write(dir.path().join("pkg/notes.md"), "# notes\n").unwrap();
        fs::write(dir.path().join(".venv/lib/site.py"), "x = 1\n").unwrap();

        let found = discover_sources(&[dir.path().to_path_buf()]);
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["B.java", "a.py"]);
    }
}
