//! detectors/ast/java_fallback.rs
//!
//! Line-based Java extractor for sources the structural parser rejects.
//!
//! Scans for `class NAME {` and `RETTYPE NAME(params) {` shapes and finds the
//! end of each unit by brace-depth counting. Returns whatever it recovers,
//! possibly nothing.

use std::sync::LazyLock;

use regex::Regex;

use super::{slice_lines, Block};
use crate::detectors::language::Language;

struct Patterns {
    package: Regex,
    class: Regex,
    method: Regex,
    constructor: Regex,
}

static PATTERNS: LazyLock<Patterns> = LazyLock::new(|| Patterns {
    package: Regex::new(r"^\s*package\s+([\w.]+)\s*;").unwrap(),
    class: Regex::new(r"\b(?:class|interface|enum|record)\s+(\w+)").unwrap(),
    method: Regex::new(
        r"^\s*(?:@\w+(?:\([^)]*\))?\s+)*((?:(?:public|protected|private|static|final|abstract|synchronized|native|default|strictfp)\s+)*)(?:<[^>]+>\s+)?([\w.$\[\]]+(?:<[^()]*>)?(?:\[\])*)\s+(\w+)\s*\(([^)]*)\)",
    )
    .unwrap(),
    constructor: Regex::new(
        r"^\s*(?:@\w+(?:\([^)]*\))?\s+)*((?:(?:public|protected|private)\s+)?)(\w+)\s*\(([^)]*)\)\s*(?:throws\s+[\w.,\s]+)?\{?\s*$",
    )
    .unwrap(),
});

const NOT_A_TYPE: &[&str] = &["return", "new", "else", "throw", "case", "yield"];
const NOT_A_NAME: &[&str] = &[
    "if", "for", "while", "switch", "catch", "synchronized", "try", "return", "new",
];

pub fn extract(source: &str) -> Vec<Block> {
    let p = &*PATTERNS;
    let lines = code_lines(source);

    let package = lines
        .iter()
        .find_map(|l| p.package.captures(l))
        .map(|c| c[1].to_string());

    let mut blocks = Vec::new();
    // (class name, depth of its body)
    let mut classes: Vec<(String, i32)> = Vec::new();
    let mut pending_class: Option<String> = None;
    let mut depth: i32 = 0;
    let mut i = 0;

    while i < lines.len() {
        let code = &lines[i];
        let current_class = classes.last().map(|(name, _)| name.as_str());

        if let Some(caps) = p.class.captures(code) {
            pending_class = Some(caps[1].to_string());
        } else if let Some(mut block) = match_unit(p, code, current_class) {
            if let Some(end) = unit_end(&lines, i) {
                block.class_context = current_class.map(str::to_string);
                block.package_context = package.clone();
                block.start_line = Some(i + 1);
                block.end_line = Some(end + 1);
                block.code = slice_lines(source, i + 1, end + 1);
                blocks.push(block);

                // body braces are balanced; resume after the unit
                i = end + 1;
                continue;
            }
        }

        for ch in code.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    if let Some(name) = pending_class.take() {
                        classes.push((name, depth));
                    }
                }
                '}' => {
                    if classes.last().is_some_and(|(_, d)| *d == depth) {
                        classes.pop();
                    }
                    depth -= 1;
                }
                _ => {}
            }
        }

        i += 1;
    }

    blocks
}

fn match_unit(p: &Patterns, code: &str, current_class: Option<&str>) -> Option<Block> {
    if let (Some(class), Some(caps)) = (current_class, p.constructor.captures(code)) {
        if &caps[2] == class {
            let visibility = visibility(&caps[1]);
            let mut block = Block::unit(Language::Java, caps[2].to_string());
            block.signature = format!("{visibility} {}({})", &caps[2], render_params(&caps[3]));
            block.is_constructor = true;
            return Some(block);
        }
    }

    let caps = p.method.captures(code)?;
    let return_type = caps[2].to_string();
    let name = caps[3].to_string();

    if NOT_A_TYPE.contains(&return_type.as_str()) || NOT_A_NAME.contains(&name.as_str()) {
        return None;
    }

    let visibility = visibility(&caps[1]);
    let mut block = Block::unit(Language::Java, name.clone());
    block.signature = format!(
        "{visibility} {return_type} {name}({})",
        render_params(&caps[4])
    );
    Some(block)
}

/// Index of the line closing the unit starting at `start`.
///
/// `None` for bodiless declarations (`abstract`, interface methods).
fn unit_end(lines: &[String], start: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut opened = false;

    for (i, line) in lines.iter().enumerate().skip(start) {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                ';' if !opened => return None,
                _ => {}
            }
            if opened && depth == 0 {
                return Some(i);
            }
        }
    }

    None
}

fn visibility(modifiers: &str) -> &'static str {
    modifiers
        .split_whitespace()
        .find_map(|w| match w {
            "public" => Some("public"),
            "protected" => Some("protected"),
            "private" => Some("private"),
            _ => None,
        })
        .unwrap_or("public")
}

/// `final @Ann Map<K, V> name` -> `Map<K, V> name`, one entry per parameter.
fn render_params(params: &str) -> String {
    split_top_level(params)
        .iter()
        .filter_map(|param| {
            let words: Vec<&str> = param
                .split_whitespace()
                .filter(|w| *w != "final" && !w.starts_with('@'))
                .collect();
            let (name, ty) = words.split_last()?;
            if ty.is_empty() {
                return None;
            }
            Some(format!("{} {name}", ty.join(" ")))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn split_top_level(params: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut angle = 0i32;
    let mut cur = String::new();

    for ch in params.chars() {
        match ch {
            '<' => angle += 1,
            '>' => angle -= 1,
            ',' if angle == 0 => {
                out.push(std::mem::take(&mut cur));
                continue;
            }
            _ => {}
        }
        cur.push(ch);
    }
    if !cur.trim().is_empty() {
        out.push(cur);
    }
    out
}

/// Source lines with comments removed and literal contents blanked.
/// Line numbering is preserved; `/* */` comments may span lines.
fn code_lines(source: &str) -> Vec<String> {
    let mut in_comment = false;
    source
        .lines()
        .map(|line| code_only(line, &mut in_comment))
        .collect()
}

fn code_only(line: &str, in_comment: &mut bool) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(ch) = chars.next() {
        if *in_comment {
            if ch == '*' && chars.peek() == Some(&'/') {
                chars.next();
                *in_comment = false;
                out.push(' ');
            }
            continue;
        }

        match quote {
            Some(q) => {
                if ch == '\\' {
                    chars.next();
                } else if ch == q {
                    quote = None;
                    out.push(ch);
                }
            }
            None => {
                if ch == '/' {
                    match chars.peek() {
                        Some('/') => break,
                        Some('*') => {
                            chars.next();
                            *in_comment = true;
                            continue;
                        }
                        _ => {}
                    }
                }
                if ch == '"' || ch == '\'' {
                    quote = Some(ch);
                }
                out.push(ch);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_methods_constructors_and_context() {
        let src = r#"package shop.cart;

public class Cart {
    private final Map<String, Integer> items = new HashMap<>();

    public Cart() {
        log("new cart {");
    }

    public void add(final String sku, Map<String, Integer> extra) {
        if (sku == null) {
            throw new IllegalArgumentException("sku");
        }
        items.merge(sku, 1, Integer::sum);
    }

    abstract int size();

    private static List<String> skus() { return new ArrayList<>(items.keySet()); }
"#;
        let blocks = extract(src);
        let names: Vec<_> = blocks.iter().map(|b| b.function_name.as_str()).collect();
        assert_eq!(names, vec!["Cart", "add", "skus"]);

        assert!(blocks[0].is_constructor);
        assert_eq!(blocks[0].signature, "public Cart()");
        assert_eq!(blocks[0].end_line, Some(8));
        assert_eq!(
            blocks[1].signature,
            "public void add(String sku, Map<String, Integer> extra)"
        );
        assert_eq!((blocks[1].start_line, blocks[1].end_line), (Some(10), Some(15)));
        assert_eq!(blocks[2].signature, "private List<String> skus()");
        assert_eq!(blocks[2].start_line, blocks[2].end_line);

        for b in &blocks {
            assert_eq!(b.class_context.as_deref(), Some("Cart"));
            assert_eq!(b.package_context.as_deref(), Some("shop.cart"));
        }
    }

    #[test]
    fn nested_class_context_is_tracked() {
        let src = "class Outer {\n    class Inner {\n        void a() {\n        }\n    }\n    void b() {\n    }\n}\n";
        let blocks = extract(src);
        let ctx: Vec<_> = blocks
            .iter()
            .map(|b| (b.function_name.as_str(), b.class_context.as_deref()))
            .collect();
        assert_eq!(ctx, vec![("a", Some("Inner")), ("b", Some("Outer"))]);
    }

    #[test]
    fn garbage_yields_nothing_without_failing() {
        assert!(extract("}}} {{ not java at all").is_empty());
        assert!(extract("").is_empty());
    }

    #[test]
    fn words_in_comments_do_not_open_classes() {
        let src = r#"public class Svc {
    /**
     * Returns the class name of the target.
     */
    public String label() {
        return "svc";
    }

    /* enum Mode */ private int mode;

    private final Runnable task = new Runnable() {
        public void run() {
        }
    };
}
"#;
        let blocks = extract(src);
        let ctx: Vec<_> = blocks
            .iter()
            .map(|b| (b.function_name.as_str(), b.class_context.as_deref()))
            .collect();
        assert_eq!(ctx, vec![("label", Some("Svc")), ("run", Some("Svc"))]);
        assert_eq!(blocks[1].start_line, Some(12));
    }
}
