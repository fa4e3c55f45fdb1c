//! testgen/driver.rs
//!
//! Sends batches to the generator one at a time and feeds results to the
//! assembler.
//!
//! A failed multi-block batch is bisected: its back half is queued right
//! after it and the front half is retried with a fresh attempt counter. A
//! single-block batch is retried with exponential backoff until
//! `max_attempts`, after which the whole run fails.

use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::thread;

use tracing::{debug, info, trace, warn};

use crate::config::{GenerationConfig, RetryConfig};
use crate::detectors::language::Language;
use crate::error::{Error, Result, Stage};
use crate::llm::client::{Generator, LlmError};
use crate::llm::prompt::{build_batch_prompt, BatchRole, LlmPrompt};
use crate::testgen::assembler::{strip_code_fences, Artifact};
use crate::testgen::pipeline::Progress;
use crate::testgen::planner::Batch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    InFlight,
    Succeeded,
    Retrying,
    Failed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BatchState::Pending => "pending",
            BatchState::InFlight => "in-flight",
            BatchState::Succeeded => "succeeded",
            BatchState::Retrying => "retrying",
            BatchState::Failed => "failed",
        })
    }
}

pub struct Driver<'a, G: Generator + ?Sized> {
    pub generator: &'a G,
    pub generation: &'a GenerationConfig,
    pub retry: &'a RetryConfig,
    pub language: Language,
    /// Test file unit name shared by every batch prompt.
    pub test_unit: &'a str,
    /// Source file, for error reporting.
    pub source: &'a Path,
}

impl<G: Generator + ?Sized> Driver<'_, G> {
    /// Process every batch in order. Returns the number of batches consumed,
    /// counting halves created by bisection.
    pub fn run(
        &self,
        batches: Vec<Batch>,
        artifact: &mut Artifact,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<usize> {
        let mut queue: VecDeque<Batch> = batches.into();
        let mut index = 0usize;

        while let Some(mut batch) = queue.pop_front() {
            transition(index, BatchState::Pending, BatchState::InFlight);
            let mut attempt = 0u32;

            loop {
                attempt += 1;
                let total = index + 1 + queue.len();
                let role = if artifact.is_started() {
                    BatchRole::Continuation
                } else {
                    BatchRole::First
                };

                progress(Progress::BatchStarted {
                    index,
                    total,
                    attempt,
                    blocks: batch.len(),
                });

                let err = match self.attempt(index, attempt, role, &batch) {
                    Ok(Ok(text)) => {
                        artifact.apply(role, &text)?;
                        transition(index, BatchState::InFlight, BatchState::Succeeded);
                        info!(batch = index + 1, total, blocks = batch.len(), "batch complete");
                        progress(Progress::BatchComplete { index, total });
                        break;
                    }
                    Ok(Err(err)) => err,
                    Err(fatal) => return Err(fatal),
                };

                warn!(
                    batch = index + 1,
                    attempt,
                    blocks = batch.len(),
                    error = %err,
                    "generation attempt failed"
                );

                if batch.len() < 2 && attempt >= self.retry.max_attempts {
                    transition(index, BatchState::InFlight, BatchState::Failed);
                    return Err(Error::Generation {
                        file: self.source.to_path_buf(),
                        batch_index: index,
                        block_ids: batch.block_ids(),
                        attempts: attempt,
                        source: err,
                    });
                }

                transition(index, BatchState::InFlight, BatchState::Retrying);
                let delay = self.retry.delay_for(attempt);

                if batch.len() > 1 {
                    let (front, back) = batch.bisect();
                    info!(
                        batch = index + 1,
                        front = front.len(),
                        back = back.len(),
                        "bisecting failed batch"
                    );
                    progress(Progress::Bisected {
                        index,
                        front: front.len(),
                        back: back.len(),
                    });
                    queue.push_front(back);
                    batch = front;
                    attempt = 0;
                }

                progress(Progress::Retrying {
                    index,
                    attempt,
                    error: err.to_string(),
                });

                if !delay.is_zero() {
                    debug!(delay_ms = delay.as_millis() as u64, "backing off");
                    thread::sleep(delay);
                }
                transition(index, BatchState::Retrying, BatchState::InFlight);
            }

            index += 1;
        }

        Ok(index)
    }

    /// Outer `Err` is fatal and not retried; inner `Err` is a failed attempt.
    fn attempt(
        &self,
        index: usize,
        attempt: u32,
        role: BatchRole,
        batch: &Batch,
    ) -> Result<std::result::Result<String, LlmError>> {
        let prompt = build_batch_prompt(
            self.language,
            role,
            batch,
            self.test_unit,
            self.generation.system_instruction.as_deref(),
        )
        .map_err(|source| Error::Serialize {
            stage: Stage::Generate,
            what: "batch prompt",
            source,
        })?;

        debug!(
            batch = index + 1,
            attempt,
            role = role.as_str(),
            blocks = batch.len(),
            prompt_hash = %prompt.hash(),
            "sending batch"
        );

        Ok(self.collect(&prompt))
    }

    fn collect(&self, prompt: &LlmPrompt) -> std::result::Result<String, LlmError> {
        let mut text = String::new();
        for fragment in self.generator.generate(prompt, self.generation)? {
            text.push_str(&fragment?);
        }

        validate(&text, self.retry.min_response_chars).map(str::to_string)
    }
}

/// Fence-stripped text, or the reason it is unusable.
pub fn validate(text: &str, min_chars: usize) -> std::result::Result<&str, LlmError> {
    let body = strip_code_fences(text);
    let chars = body.trim().chars().count();

    if chars == 0 {
        return Err(LlmError::EmptyResponse);
    }
    if chars < min_chars {
        return Err(LlmError::Truncated {
            chars,
            min: min_chars,
        });
    }
    Ok(body)
}

fn transition(index: usize, from: BatchState, to: BatchState) {
    trace!(batch = index + 1, %from, %to, "batch state");
}
