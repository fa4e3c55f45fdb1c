// src/testgen/file.rs

use std::fs;
use std::io;
use std::path::Path;

use crate::detectors::ast::Block;
use crate::detectors::language::Language;

/* ============================================================
   Public API
   ============================================================ */

/// Name the test file is built around: the first enclosing type found in
/// `blocks`, else the source file's stem.
pub fn test_unit_name(blocks: &[Block], source: &Path) -> String {
    let name = blocks
        .iter()
        .find_map(|b| b.class_context.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| {
            source
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("generated")
                .to_string()
        });

    sanitize_name(&name)
}

/// `test_<unit>.py` or `<unit>Test.java`.
pub fn test_file_name(language: Language, unit: &str) -> String {
    match language {
        Language::Python => format!("test_{unit}.py"),
        Language::Java => format!("{unit}Test.java"),
    }
}

/// Replace the file's content, creating parent directories as needed.
pub fn write_text(path: &Path, content: &str) -> io::Result<()> {
    ensure_parent_dir(path)?;
    fs::write(path, content)
}

/* ============================================================
   Helpers
   ============================================================ */

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn sanitize_name(name: &str) -> String {
    let name: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if name.is_empty() {
        "generated".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(class: Option<&str>) -> Block {
        let mut b = Block::unit(Language::Python, "f".into());
        b.class_context = class.map(str::to_string);
        b
    }

    #[test]
    fn class_context_wins_over_module_name() {
        let blocks = vec![block(None), block(Some("Calculator")), block(Some("Other"))];
        let unit = test_unit_name(&blocks, Path::new("src/calc.py"));
        assert_eq!(unit, "Calculator");
        assert_eq!(test_file_name(Language::Python, &unit), "test_Calculator.py");
    }

    #[test]
    fn module_stem_is_used_without_classes() {
        let blocks = vec![block(None)];
        let unit = test_unit_name(&blocks, Path::new("pkg/string-utils.py"));
        assert_eq!(unit, "string_utils");
        assert_eq!(test_file_name(Language::Java, "Util"), "UtilTest.java");
    }

    #[test]
    fn write_text_creates_parents_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/test_x.py");
        write_text(&path, "one").unwrap();
        write_text(&path, "two").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "two");
    }
}
