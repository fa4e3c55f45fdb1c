//! testgen/planner.rs
//!
//! Groups blocks into token-bounded batches.
//!
//! Packing is greedy and order-preserving. A block that alone exceeds the
//! budget is split by lines into `_partN` fragments, which are then packed
//! the same way.

use tracing::{debug, info};

use crate::detectors::ast::Block;
use crate::testgen::tokens::TokenEstimator;

/// An ordered, non-empty group of blocks sent in one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub blocks: Vec<Block>,
}

impl Batch {
    pub fn new(blocks: Vec<Block>) -> Self {
        debug_assert!(!blocks.is_empty());
        Self { blocks }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_ids(&self) -> Vec<String> {
        self.blocks.iter().map(|b| b.block_id.clone()).collect()
    }

    /// Split into two halves, the first holding the extra block on odd sizes.
    ///
    /// Only meaningful for batches of two or more blocks.
    pub fn bisect(mut self) -> (Batch, Batch) {
        let mid = self.blocks.len().div_ceil(2);
        let back = self.blocks.split_off(mid);
        (Batch::new(self.blocks), Batch::new(back))
    }
}

pub struct BatchPlanner<'e> {
    estimator: &'e TokenEstimator,
    budget: usize,
    split_ceiling: usize,
}

impl<'e> BatchPlanner<'e> {
    pub fn new(estimator: &'e TokenEstimator, budget: usize, split_ratio: f64) -> Self {
        let budget = budget.max(1);
        let split_ceiling = ((budget as f64 * split_ratio) as usize).clamp(1, budget);
        Self {
            estimator,
            budget,
            split_ceiling,
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn split_ceiling(&self) -> usize {
        self.split_ceiling
    }

    /// Estimated cost of a block as it is serialized into a prompt.
    pub fn block_cost(&self, block: &Block) -> usize {
        let text = serde_json::to_string(block).unwrap_or_else(|_| block.code.clone());
        self.estimator.estimate(&text)
    }

    pub fn plan(&self, blocks: Vec<Block>) -> Vec<Batch> {
        let total_blocks = blocks.len();
        let mut out = Vec::new();

        for batch in self.pack(blocks) {
            let oversized = batch.len() == 1 && self.block_cost(&batch.blocks[0]) > self.budget;
            if !oversized {
                out.push(batch);
                continue;
            }

            let block = &batch.blocks[0];
            let fragments = self.split_block(block);
            debug!(
                block = %block.block_id,
                fragments = fragments.len(),
                ceiling = self.split_ceiling,
                "split oversized block"
            );
            out.extend(self.pack(fragments));
        }

        info!(
            blocks = total_blocks,
            batches = out.len(),
            budget = self.budget,
            estimator = self.estimator.strategy(),
            "planned batches"
        );
        out
    }

    fn pack(&self, blocks: Vec<Block>) -> Vec<Batch> {
        let mut batches = Vec::new();
        let mut current: Vec<Block> = Vec::new();
        let mut current_tokens = 0usize;

        for block in blocks {
            let t = self.block_cost(&block);

            if t > self.budget {
                if !current.is_empty() {
                    batches.push(Batch::new(std::mem::take(&mut current)));
                    current_tokens = 0;
                }
                batches.push(Batch::new(vec![block]));
                continue;
            }

            if !current.is_empty() && current_tokens + t > self.budget {
                batches.push(Batch::new(std::mem::take(&mut current)));
                current_tokens = 0;
            }

            current.push(block);
            current_tokens += t;
        }

        if !current.is_empty() {
            batches.push(Batch::new(current));
        }

        batches
    }

    /// Cut `block.code` by lines so each fragment's code estimate stays
    /// within the split ceiling. Each line is estimated once and the running
    /// sum decides the cut. A single line over the ceiling becomes its own
    /// fragment.
    pub fn split_block(&self, block: &Block) -> Vec<Block> {
        let lines: Vec<&str> = block.code.lines().collect();
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        let mut start = 0usize;
        let mut running = 0usize;

        for (i, line) in lines.iter().enumerate() {
            let cost = self.estimator.estimate(line);
            if i > start && running + cost > self.split_ceiling {
                ranges.push((start, i - 1));
                start = i;
                running = 0;
            }
            running += cost;
        }
        if !lines.is_empty() {
            ranges.push((start, lines.len() - 1));
        }

        ranges
            .into_iter()
            .enumerate()
            .map(|(n, (from, to))| {
                let mut part = block.clone();
                part.block_id = format!("{}_part{n}", block.block_id);
                part.code = lines[from..=to].join("\n");
                if let Some(first) = block.start_line {
                    part.start_line = Some(first + from);
                    part.end_line = Some(first + to);
                }
                part
            })
            .collect()
    }
}
