//! testgen/summary.rs
//!
//! Human-readable overview of the units a file was decomposed into.

use std::fmt::Write;

use crate::detectors::ast::Block;

const LISTED_METHODS: usize = 5;

enum Chunk<'a> {
    Class { name: &'a str, methods: Vec<&'a Block> },
    Function(&'a Block),
}

impl Chunk<'_> {
    fn lines(&self) -> (Option<usize>, Option<usize>) {
        match self {
            Chunk::Class { methods, .. } => (
                methods.first().and_then(|b| b.start_line),
                methods.last().and_then(|b| b.end_line),
            ),
            Chunk::Function(b) => (b.start_line, b.end_line),
        }
    }
}

/// Consecutive blocks of the same class collapse into one `CLASS` chunk.
fn chunks(blocks: &[Block]) -> Vec<Chunk<'_>> {
    let mut out: Vec<Chunk> = Vec::new();

    for block in blocks {
        let Some(class) = block.class_context.as_deref() else {
            out.push(Chunk::Function(block));
            continue;
        };

        if let Some(Chunk::Class { name, methods }) = out.last_mut() {
            if *name == class {
                methods.push(block);
                continue;
            }
        }

        out.push(Chunk::Class {
            name: class,
            methods: vec![block],
        });
    }

    out
}

pub fn chunk_summary(blocks: &[Block]) -> String {
    let chunks = chunks(blocks);
    let mut s = format!("Total chunks: {}\n\n", chunks.len());

    for (i, chunk) in chunks.iter().enumerate() {
        match chunk {
            Chunk::Class { name, methods } => {
                let _ = writeln!(s, "{}. CLASS: {name}", i + 1);
                let _ = writeln!(s, "   Methods: {}", methods.len());
                for m in methods.iter().take(LISTED_METHODS) {
                    let _ = writeln!(s, "   - {}", m.function_name);
                }
                if methods.len() > LISTED_METHODS {
                    let _ = writeln!(s, "   ... and {} more", methods.len() - LISTED_METHODS);
                }
            }
            Chunk::Function(b) => {
                let _ = writeln!(s, "{}. FUNCTION: {}", i + 1, b.function_name);
            }
        }

        let (start, end) = chunk.lines();
        let _ = writeln!(s, "   Lines: {} - {}\n", or_unknown(start), or_unknown(end));
    }

    s
}

fn or_unknown(line: Option<usize>) -> String {
    line.map(|l| l.to_string()).unwrap_or_else(|| "?".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::language::Language;

    fn method(class: Option<&str>, name: &str, lines: Option<(usize, usize)>) -> Block {
        let mut b = Block::unit(Language::Python, name.to_string());
        b.class_context = class.map(str::to_string);
        b.start_line = lines.map(|l| l.0);
        b.end_line = lines.map(|l| l.1);
        b
    }

    #[test]
    fn groups_class_methods_and_lists_functions() {
        let blocks = vec![
            method(Some("Calculator"), "add", Some((5, 6))),
            method(Some("Calculator"), "divide", Some((8, 11))),
            method(None, "factorial", Some((14, 17))),
        ];

        let text = chunk_summary(&blocks);
        assert_eq!(
            text,
            "Total chunks: 2\n\n\
             1. CLASS: Calculator\n   Methods: 2\n   - add\n   - divide\n   Lines: 5 - 11\n\n\
             2. FUNCTION: factorial\n   Lines: 14 - 17\n\n"
        );
    }

    #[test]
    fn long_classes_are_truncated_and_unknown_lines_marked() {
        let blocks: Vec<Block> = (0..8)
            .map(|i| method(Some("Big"), &format!("m{i}"), None))
            .collect();

        let text = chunk_summary(&blocks);
        assert!(text.contains("Methods: 8"));
        assert!(text.contains("- m4"));
        assert!(!text.contains("- m5"));
        assert!(text.contains("... and 3 more"));
        assert!(text.contains("Lines: ? - ?"));
    }

    #[test]
    fn class_reopened_after_free_function_is_a_new_chunk() {
        let blocks = vec![
            method(Some("A"), "x", Some((1, 2))),
            method(None, "f", Some((3, 4))),
            method(Some("A"), "y", Some((5, 6))),
        ];
        assert!(chunk_summary(&blocks).starts_with("Total chunks: 3"));
    }
}
