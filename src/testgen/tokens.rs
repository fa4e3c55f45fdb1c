//! testgen/tokens.rs
//!
//! Approximate model token counts, used only to size batches.

use tiktoken_rs::{cl100k_base, CoreBPE};
use tracing::warn;

pub struct TokenEstimator {
    bpe: Option<CoreBPE>,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenEstimator {
    /// Sub-word (cl100k) counting, or whitespace counting if the encoder
    /// cannot be loaded.
    pub fn new() -> Self {
        match cl100k_base() {
            Ok(bpe) => Self { bpe: Some(bpe) },
            Err(e) => {
                warn!(error = %e, "tokenizer unavailable, estimating by whitespace");
                Self::whitespace()
            }
        }
    }

    pub fn whitespace() -> Self {
        Self { bpe: None }
    }

    pub fn estimate(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => whitespace_estimate(text),
        }
    }

    pub fn strategy(&self) -> &'static str {
        if self.bpe.is_some() {
            "cl100k"
        } else {
            "whitespace"
        }
    }
}

pub fn whitespace_estimate(text: &str) -> usize {
    text.split_whitespace().count().max(1)
}
