//! detectors/ast/java.rs
//!
//! Method and constructor extraction for Java sources.
//!
//! The structural parser is tried first; a source with syntax errors is
//! handed to the line-based fallback in `java_fallback`.

use tree_sitter::Node;
use tracing::warn;

use super::tree::{enclosing_name, line_span, node_text, parse_source, syntax_diagnostic};
use super::{java_fallback, slice_lines, Block};
use crate::detectors::language::Language;

const TYPE_KINDS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
];

/// Never fails: falls back to heuristic extraction on malformed input.
pub fn extract(source: &str) -> Vec<Block> {
    match extract_structured(source) {
        Ok(blocks) => blocks,
        Err(diagnostic) => {
            warn!(%diagnostic, "java parse failed, using heuristic extractor");
            java_fallback::extract(source)
        }
    }
}

fn extract_structured(source: &str) -> Result<Vec<Block>, String> {
    let tree = parse_source(Language::Java, source)
        .ok_or_else(|| "java grammar unavailable".to_string())?;

    let root = tree.root_node();
    if let Some(diagnostic) = syntax_diagnostic(root) {
        return Err(diagnostic);
    }

    let package = package_name(root, source);
    let mut blocks = Vec::new();
    collect(root, source, package.as_deref(), &mut blocks);
    Ok(blocks)
}

fn collect(node: Node, src: &str, package: Option<&str>, out: &mut Vec<Block>) {
    match node.kind() {
        "method_declaration" => out.push(unit_block(node, src, package, false)),
        "constructor_declaration" => out.push(unit_block(node, src, package, true)),
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect(child, src, package, out);
    }
}

fn package_name(root: Node, src: &str) -> Option<String> {
    let mut cursor = root.walk();
    let decl = root
        .named_children(&mut cursor)
        .find(|n| n.kind() == "package_declaration")?;

    let mut inner = decl.walk();
    let name = decl
        .named_children(&mut inner)
        .find(|n| matches!(n.kind(), "scoped_identifier" | "identifier"))
        .map(|n| node_text(n, src).to_string());
    name
}

fn unit_block(node: Node, src: &str, package: Option<&str>, is_constructor: bool) -> Block {
    let name = node
        .child_by_field_name("name")
        .map(|n| node_text(n, src).to_string())
        .unwrap_or_default();

    let visibility = visibility(node, src);
    let params = node
        .child_by_field_name("parameters")
        .map(|p| parameters(p, src))
        .unwrap_or_default();

    let signature = if is_constructor {
        format!("{visibility} {name}({})", params.join(", "))
    } else {
        let return_type = node
            .child_by_field_name("type")
            .map(|t| node_text(t, src).to_string())
            .unwrap_or_else(|| "void".to_string());
        format!("{visibility} {return_type} {name}({})", params.join(", "))
    };

    let (start, end) = line_span(node);

    let mut block = Block::unit(Language::Java, name);
    block.class_context = enclosing_name(node, TYPE_KINDS, src);
    block.package_context = package.map(str::to_string);
    block.start_line = Some(start);
    block.end_line = Some(end);
    block.signature = signature;
    block.code = slice_lines(src, start, end);
    block.is_constructor = is_constructor;
    block
}

fn visibility(node: Node, src: &str) -> &'static str {
    let mut cursor = node.walk();
    let modifiers = node
        .children(&mut cursor)
        .find(|c| c.kind() == "modifiers")
        .map(|m| node_text(m, src))
        .unwrap_or_default();

    modifiers
        .split_whitespace()
        .find_map(|word| match word {
            "public" => Some("public"),
            "protected" => Some("protected"),
            "private" => Some("private"),
            _ => None,
        })
        .unwrap_or("public")
}

/// `TYPE NAME` per parameter; varargs keep their `...`.
fn parameters(params: Node, src: &str) -> Vec<String> {
    let mut cursor = params.walk();
    let out = params
        .named_children(&mut cursor)
        .filter_map(|p| match p.kind() {
            "formal_parameter" => {
                let ty = p.child_by_field_name("type").map(|t| node_text(t, src))?;
                let name = p.child_by_field_name("name").map(|n| node_text(n, src))?;
                Some(format!("{ty} {name}"))
            }
            "spread_parameter" => Some(spread_parameter(p, src)),
            _ => None,
        })
        .collect();
    out
}

fn spread_parameter(p: Node, src: &str) -> String {
    let mut cursor = p.walk();
    let parts: Vec<&str> = p
        .children(&mut cursor)
        .filter(|c| c.kind() != "modifiers")
        .map(|c| node_text(c, src))
        .collect();

    // ["String", "...", "args"] -> "String... args"
    let mut out = String::new();
    for part in parts {
        if !out.is_empty() && part != "..." {
            out.push(' ');
        }
        out.push_str(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = r#"package com.example.bank;

import java.util.List;

public class Account {
    private double balance;

    public Account(double initial) {
        this.balance = initial;
    }

    @Override
    public String toString() {
        return "Account(" + balance + ")";
    }

    protected boolean withdraw(double amount, List<String> log) {
        if (amount > balance) {
            return false;
        }
        balance -= amount;
        return true;
    }

    static int total(int... values) {
        int sum = 0;
        for (int v : values) { sum += v; }
        return sum;
    }

    interface Listener {
        void onChange(double value);
    }
}
"#;

    #[test]
    fn extracts_methods_and_constructors_in_order() {
        let blocks = extract(ACCOUNT);
        let names: Vec<_> = blocks.iter().map(|b| b.function_name.as_str()).collect();
        assert_eq!(names, vec!["Account", "toString", "withdraw", "total", "onChange"]);

        assert!(blocks[0].is_constructor);
        assert!(!blocks[1].is_constructor);
        assert_eq!(blocks[4].class_context.as_deref(), Some("Listener"));
        for b in &blocks[..4] {
            assert_eq!(b.class_context.as_deref(), Some("Account"));
            assert_eq!(b.package_context.as_deref(), Some("com.example.bank"));
        }
    }

    #[test]
    fn reconstructs_signatures_with_defaults() {
        let blocks = extract(ACCOUNT);
        assert_eq!(blocks[0].signature, "public Account(double initial)");
        assert_eq!(blocks[1].signature, "public String toString()");
        assert_eq!(
            blocks[2].signature,
            "protected boolean withdraw(double amount, List<String> log)"
        );
        // package-private defaults to public
        assert_eq!(blocks[3].signature, "public int total(int... values)");
    }

    #[test]
    fn code_is_exact_line_slice() {
        let blocks = extract(ACCOUNT);
        let lines: Vec<&str> = ACCOUNT.lines().collect();
        for b in &blocks {
            let (s, e) = (b.start_line.unwrap(), b.end_line.unwrap());
            assert_eq!(b.code, lines[s - 1..e].join("\n"));
        }
        // annotations belong to the unit
        assert!(blocks[1].code.trim_start().starts_with("@Override"));
    }

    #[test]
    fn malformed_source_uses_fallback() {
        let src = "public class Broken {\n    public int ok(int a) {\n        return a;\n    }\n    public void bad( {\n    }\n}\n";
        let blocks = extract(src);
        assert!(blocks.iter().any(|b| b.function_name == "ok"));
    }
}
