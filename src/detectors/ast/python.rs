//! detectors/ast/python.rs
//!
//! Function and method extraction for Python sources.

use std::path::Path;

use tree_sitter::Node;

use super::tree::{enclosing_name, line_span, node_text, parse_source, syntax_diagnostic};
use super::{first_non_blank_line, slice_lines, Block};
use crate::detectors::language::Language;
use crate::error::{Error, Result};

/// Every `def` / `async def` in the file, in document order.
pub fn extract(source: &str, file: &Path) -> Result<Vec<Block>> {
    let tree = parse_source(Language::Python, source).ok_or_else(|| Error::Parse {
        file: file.to_path_buf(),
        diagnostic: "python grammar unavailable".into(),
    })?;

    let root = tree.root_node();
    if let Some(diagnostic) = syntax_diagnostic(root) {
        return Err(Error::Parse {
            file: file.to_path_buf(),
            diagnostic,
        });
    }

    let mut blocks = Vec::new();
    collect(root, source, &mut blocks);
    Ok(blocks)
}

fn collect(node: Node, src: &str, out: &mut Vec<Block>) {
    if node.kind() == "function_definition" {
        out.push(function_block(node, src));
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect(child, src, out);
    }
}

fn function_block(node: Node, src: &str) -> Block {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, src).to_string())
        .unwrap_or_default();

    let (start, end) = line_span(node);
    let code = slice_lines(src, start, end);

    let mut block = Block::unit(Language::Python, name);
    block.class_context = enclosing_name(node, &["class_definition"], src);
    block.start_line = Some(start);
    block.end_line = Some(end);
    block.signature = signature_line(&code);
    block.decorators = decorators(node, src);
    block.code = code;
    block
}

fn signature_line(code: &str) -> String {
    code.lines()
        .map(str::trim)
        .find(|l| l.starts_with("def ") || l.starts_with("async def "))
        .map(str::to_string)
        .unwrap_or_else(|| first_non_blank_line(code))
}

/// `@name`, `@pkg.name` and `@name(...)` all record the dotted name.
fn decorators(node: Node, src: &str) -> Vec<String> {
    let Some(parent) = node.parent() else {
        return Vec::new();
    };
    if parent.kind() != "decorated_definition" {
        return Vec::new();
    }

    let mut cursor = parent.walk();
    let out = parent
        .named_children(&mut cursor)
        .filter(|c| c.kind() == "decorator")
        .map(|d| {
            let text = node_text(d, src).trim_start_matches('@').trim();
            text.split('(').next().unwrap_or(text).trim().to_string()
        })
        .filter(|d| !d.is_empty())
        .collect();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Block> {
        extract(src, Path::new("m.py")).unwrap()
    }

    #[test]
    fn top_level_functions_round_trip_exact_slices() {
        let src = "def one():\n    return 1\n\n\ndef two(x):\n    y = x * 2\n    return y\n\nZ = 3\n\ndef three():\n    pass\n";
        let blocks = parse(src);

        assert_eq!(blocks.len(), 3);
        let lines: Vec<&str> = src.lines().collect();
        for b in &blocks {
            let (s, e) = (b.start_line.unwrap(), b.end_line.unwrap());
            assert_eq!(b.code, lines[s - 1..e].join("\n"));
            assert_eq!(b.class_context, None);
        }
        assert_eq!(blocks[1].start_line, Some(5));
        assert_eq!(blocks[1].end_line, Some(7));
        assert_eq!(blocks[1].signature, "def two(x):");
    }

    #[test]
    fn async_and_nested_functions_are_units() {
        let src = r#"
class Service:
    async def fetch(self, url):
        def helper():
            return url
        return helper()
"#;
        let blocks = parse(src);
        let names: Vec<_> = blocks.iter().map(|b| b.function_name.as_str()).collect();
        assert_eq!(names, vec!["fetch", "helper"]);

        assert_eq!(blocks[0].signature, "async def fetch(self, url):");
        assert_eq!(blocks[0].class_context.as_deref(), Some("Service"));
        // nearest class wins even through an enclosing function
        assert_eq!(blocks[1].class_context.as_deref(), Some("Service"));
    }

    #[test]
    fn decorators_are_recorded_but_not_in_signature() {
        let src = r#"
class Repo:
    @staticmethod
    @functools.lru_cache(maxsize=4)
    def load(key):
        return key
"#;
        let blocks = parse(src);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].decorators, vec!["staticmethod", "functools.lru_cache"]);
        assert_eq!(blocks[0].signature, "def load(key):");
        assert!(blocks[0].code.trim_start().starts_with("def load"));
    }

    #[test]
    fn syntax_error_is_parse_error() {
        let err = extract("def broken(:\n    pass\n", Path::new("bad.py")).unwrap_err();
        match err {
            Error::Parse { file, diagnostic } => {
                assert_eq!(file, Path::new("bad.py"));
                assert!(diagnostic.contains("line"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
