//! testgen/plan.rs
//!
//! Optional natural-language test plan requested before generation.
//! Failures only cost the plan, never the run.

use std::path::Path;

use tracing::{info, warn};

use crate::config::GenerationConfig;
use crate::detectors::ast::file_name;
use crate::detectors::language::Language;
use crate::llm::client::{Generator, LlmError};
use crate::llm::prompt::{build_plan_prompt, LlmPrompt};

pub fn generate_test_plan<G: Generator + ?Sized>(
    generator: &G,
    config: &GenerationConfig,
    language: Language,
    source_path: &Path,
    source: &str,
) -> Option<String> {
    let prompt = build_plan_prompt(language, &file_name(source_path), source);

    match request(generator, config, &prompt) {
        Ok(plan) => {
            info!(file = %source_path.display(), chars = plan.len(), prompt_hash = %prompt.hash(), "test plan ready");
            Some(plan)
        }
        Err(e) => {
            warn!(file = %source_path.display(), error = %e, "test plan unavailable, continuing without it");
            None
        }
    }
}

fn request<G: Generator + ?Sized>(
    generator: &G,
    config: &GenerationConfig,
    prompt: &LlmPrompt,
) -> Result<String, LlmError> {
    // the plan prompt carries its own system text
    let config = GenerationConfig {
        system_instruction: None,
        ..config.clone()
    };

    let mut text = String::new();
    for fragment in generator.generate(prompt, &config)? {
        text.push_str(&fragment?);
    }

    let text = text.trim();
    if text.is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::Fragments;

    struct Fixed(Option<&'static str>);

    impl Generator for Fixed {
        fn generate(&self, _: &LlmPrompt, _: &GenerationConfig) -> Result<Fragments, LlmError> {
            match self.0 {
                Some(text) => Ok(Box::new(std::iter::once(Ok(text.to_string())))),
                None => Err(LlmError::Stream("down".into())),
            }
        }
    }

    #[test]
    fn plan_text_is_returned_trimmed() {
        let plan = generate_test_plan(
            &Fixed(Some("\n1. Test add\n")),
            &GenerationConfig::default(),
            Language::Python,
            Path::new("calc.py"),
            "def add(a, b): return a + b",
        );
        assert_eq!(plan.as_deref(), Some("1. Test add"));
    }

    #[test]
    fn failures_are_not_fatal() {
        let plan = generate_test_plan(
            &Fixed(None),
            &GenerationConfig::default(),
            Language::Java,
            Path::new("Calc.java"),
            "class Calc {}",
        );
        assert_eq!(plan, None);
    }
}
