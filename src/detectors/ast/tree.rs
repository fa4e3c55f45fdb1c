//! detectors/ast/tree.rs
//!
//! Tree-sitter plumbing shared by the language extractors.

use std::cell::RefCell;

use tree_sitter::{Node, Parser, Tree};

use crate::detectors::language::Language;

thread_local! {
    static PY_PARSER: RefCell<Option<Parser>> =
        RefCell::new(make_parser(&tree_sitter_python::language()));
    static JAVA_PARSER: RefCell<Option<Parser>> =
        RefCell::new(make_parser(&tree_sitter_java::language()));
}

fn make_parser(language: &tree_sitter::Language) -> Option<Parser> {
    let mut p = Parser::new();
    p.set_language(language).ok()?;
    Some(p)
}

/// Build a syntax tree; `None` if the grammar could not be loaded.
pub fn parse_source(language: Language, source: &str) -> Option<Tree> {
    match language {
        Language::Python => PY_PARSER.with(|p| p.borrow_mut().as_mut()?.parse(source, None)),
        Language::Java => JAVA_PARSER.with(|p| p.borrow_mut().as_mut()?.parse(source, None)),
    }
}

/// Describe the first ERROR or MISSING node under `root`.
pub fn syntax_diagnostic(root: Node) -> Option<String> {
    if !root.has_error() {
        return None;
    }

    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let pos = node.start_position();

        if node.is_missing() {
            return Some(format!(
                "missing `{}` at line {}, column {}",
                node.kind(),
                pos.row + 1,
                pos.column + 1
            ));
        }
        if node.is_error() {
            return Some(format!(
                "syntax error at line {}, column {}",
                pos.row + 1,
                pos.column + 1
            ));
        }

        // reversed so the earliest child is visited first
        let mut cursor = node.walk();
        let children: Vec<Node> = node
            .children(&mut cursor)
            .filter(|c| c.has_error())
            .collect();
        stack.extend(children.into_iter().rev());
    }

    Some("syntax error".to_string())
}

pub fn node_text<'s>(node: Node, src: &'s str) -> &'s str {
    node.utf8_text(src.as_bytes()).unwrap_or_default()
}

/// 1-based inclusive line span of `node`.
pub fn line_span(node: Node) -> (usize, usize) {
    (node.start_position().row + 1, node.end_position().row + 1)
}

/// Name of the nearest ancestor whose kind is in `kinds`.
pub fn enclosing_name(node: Node, kinds: &[&str], src: &str) -> Option<String> {
    let mut cur = node.parent();
    while let Some(n) = cur {
        if kinds.contains(&n.kind()) {
            return n
                .child_by_field_name("name")
                .map(|name| node_text(name, src).to_string());
        }
        cur = n.parent();
    }
    None
}
