//! llm/prompt.rs
//!
//! Prompt construction for the two-phase generation protocol.
//!
//! The first batch asks for a complete, self-contained test file. Every later
//! batch asks only for bare test units that get inserted into that file.

use sha2::{Digest, Sha256};

use crate::detectors::language::Language;
use crate::testgen::planner::Batch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchRole {
    First,
    Continuation,
}

impl BatchRole {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchRole::First => "first",
            BatchRole::Continuation => "continuation",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmPrompt {
    pub system: String,
    pub user: String,
}

impl LlmPrompt {
    /// Stable identifier for logs; prompt text itself is never logged.
    pub fn hash(&self) -> String {
        let mut h = Sha256::new();
        h.update(self.system.as_bytes());
        h.update([0u8]);
        h.update(self.user.as_bytes());
        hex::encode(h.finalize())
    }
}

/* ============================================================
   System instruction (stable per language)
   ============================================================ */

pub fn system_instruction(language: Language) -> String {
    let (imports, example) = match language {
        Language::Python => ("import pytest", PYTHON_EXAMPLE),
        Language::Java => (
            "import org.junit.jupiter.api.Test; import static org.junit.jupiter.api.Assertions.*;",
            JAVA_EXAMPLE,
        ),
    };

    format!(
        r#"You are an expert {language} test generator. Create comprehensive unit tests using {framework}.

For each function/method, generate:
1. Normal operation tests with typical inputs
2. Edge cases and boundary conditions
3. Error conditions and exception handling
4. Use proper imports: {imports}
5. Clean, readable, well-documented test code

Language-specific guidelines:
- For Python: use the pytest framework with plain assert statements
- For Java: use JUnit 5 annotations and assertions

Output only {language} test code. No explanations or meta-text.

{example}"#,
        language = language.name(),
        framework = language.framework(),
    )
}

const PYTHON_EXAMPLE: &str = r#"Example input:
{"function_name": "add", "class_context": "Calculator", "code": "def add(self, a, b):\n    return a + b"}

Example output:
import pytest
from calculator import Calculator

def test_add_positive_numbers():
    assert Calculator().add(2, 3) == 5

def test_add_negative_numbers():
    assert Calculator().add(-1, -1) == -2"#;

const JAVA_EXAMPLE: &str = r#"Example input:
{"function_name": "add", "class_context": "Calculator", "signature": "public int add(int a, int b)"}

Example output:
import org.junit.jupiter.api.Test;
import static org.junit.jupiter.api.Assertions.*;

class CalculatorTest {
    @Test
    void addPositiveNumbers() {
        assertEquals(5, new Calculator().add(2, 3));
    }
}"#;

/* ============================================================
   Batch prompts
   ============================================================ */

/// `test_unit` is the test file's unit name (`Calculator` for
/// `CalculatorTest.java`), so later fragments agree with the first file.
pub fn build_batch_prompt(
    language: Language,
    role: BatchRole,
    batch: &Batch,
    test_unit: &str,
    system_override: Option<&str>,
) -> Result<LlmPrompt, serde_json::Error> {
    let system = system_override
        .map(str::to_string)
        .unwrap_or_else(|| system_instruction(language));

    let payload = serde_json::to_string_pretty(&batch.blocks)?;

    let mut user = String::new();
    user.push_str(&role_instruction(language, role, test_unit));
    user.push_str("\n\nBLOCKS\n");
    user.push_str(&payload);
    user.push('\n');

    Ok(LlmPrompt { system, user })
}

fn role_instruction(language: Language, role: BatchRole, test_unit: &str) -> String {
    match (role, language) {
        (BatchRole::First, Language::Python) => format!(
            "Write a complete pytest file for the blocks below (module tests for `{test_unit}`).\n\
             Include every import the tests need at the top of the file.\n\
             Write several test functions per block, in the order the blocks are given."
        ),
        (BatchRole::First, Language::Java) => format!(
            "Write a complete JUnit 5 test file for the blocks below.\n\
             Include the package declaration (if the blocks have a package_context), all imports, \
             and a single top-level test class named `{test_unit}Test`.\n\
             Write several @Test methods per block, in the order the blocks are given."
        ),
        (BatchRole::Continuation, Language::Python) => format!(
            "Continue the existing pytest file for `{test_unit}`.\n\
             Output ONLY new test functions for the blocks below, in the order given.\n\
             Do NOT repeat imports, fixtures already written, or any module-level setup."
        ),
        (BatchRole::Continuation, Language::Java) => format!(
            "Continue the existing JUnit 5 class `{test_unit}Test`.\n\
             Output ONLY new @Test methods for the blocks below, in the order given.\n\
             Do NOT output a package declaration, imports, or the enclosing class; \
             the methods are inserted into the class body as-is."
        ),
    }
}

/* ============================================================
   Test plan prompt
   ============================================================ */

pub const PLAN_PREVIEW_CHARS: usize = 15_000;

pub fn build_plan_prompt(language: Language, file_name: &str, source: &str) -> LlmPrompt {
    let total = source.chars().count();
    let preview: String = source.chars().take(PLAN_PREVIEW_CHARS).collect();
    let tail = if total > PLAN_PREVIEW_CHARS {
        "\n... (code continues)"
    } else {
        ""
    };

    let user = format!(
        r#"File: {file_name}
Language: {language}
Total size: {total} characters

Code preview:
```{ext}
{preview}{tail}
```

Analyze this code and provide:
- Architecture overview: main classes, their purposes and relationships
- Critical components: functions/methods that need thorough testing
- Testing strategy: framework, required fixtures and mocks, unit vs integration
- Edge cases to test for each component
- Complexity assessment (1-10) and testing priority
- Suggested test file structure

Format it as a clear, actionable test plan."#,
        language = language.name(),
        ext = language.extension(),
    );

    LlmPrompt {
        system: "You are a senior software engineer creating a comprehensive test plan.".into(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::ast::Block;

    fn batch() -> Batch {
        let mut b = Block::unit(Language::Java, "add".into());
        b.block_id = "Calc.java_0".into();
        b.class_context = Some("Calc".into());
        b.signature = "public int add(int a, int b)".into();
        Batch::new(vec![b])
    }

    #[test]
    fn first_batch_requests_complete_file() {
        let p = build_batch_prompt(Language::Java, BatchRole::First, &batch(), "Calc", None).unwrap();
        assert!(p.user.contains("complete JUnit 5 test file"));
        assert!(p.user.contains("CalcTest"));
        assert!(p.user.contains("\"block_id\": \"Calc.java_0\""));
        assert!(p.system.contains("JUnit 5"));
    }

    #[test]
    fn continuation_requests_bare_units() {
        let p = build_batch_prompt(
            Language::Java,
            BatchRole::Continuation,
            &batch(),
            "Calc",
            None,
        )
        .unwrap();
        assert!(p.user.contains("ONLY new @Test methods"));
        assert!(p.user.contains("Do NOT output a package declaration"));
    }

    #[test]
    fn system_override_replaces_default() {
        let p = build_batch_prompt(
            Language::Python,
            BatchRole::First,
            &batch(),
            "calc",
            Some("custom"),
        )
        .unwrap();
        assert_eq!(p.system, "custom");
    }

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        let a = LlmPrompt { system: "s".into(), user: "u".into() };
        let b = LlmPrompt { system: "s".into(), user: "u".into() };
        let c = LlmPrompt { system: "su".into(), user: "".into() };
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
        assert_eq!(a.hash().len(), 64);
    }

    #[test]
    fn plan_prompt_previews_first_chars_only() {
        let src = "x".repeat(PLAN_PREVIEW_CHARS + 10);
        let p = build_plan_prompt(Language::Python, "big.py", &src);
        assert!(p.user.contains("Total size: 15010 characters"));
        assert!(p.user.contains("... (code continues)"));
        assert!(!p.user.contains(&"x".repeat(PLAN_PREVIEW_CHARS + 1)));
    }
}
