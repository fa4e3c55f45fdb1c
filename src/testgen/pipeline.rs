//! testgen/pipeline.rs
//!
//! One source file from detection to an assembled test file.
//!
//! Stages run strictly in order: detect, read, parse, plan, (test plan),
//! generate + assemble. Any fatal error stops this file's run and is returned
//! with its stage; nothing is retried across stages.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span};

use crate::config::{AppConfig, BatchingConfig};
use crate::detectors::ast::{self, Block};
use crate::detectors::language::{detect_language, Language};
use crate::error::{Error, Result, Stage};
use crate::llm::client::Generator;
use crate::testgen::assembler::Artifact;
use crate::testgen::driver::Driver;
use crate::testgen::file::{test_file_name, test_unit_name};
use crate::testgen::plan::generate_test_plan;
use crate::testgen::planner::{Batch, BatchPlanner};
use crate::testgen::summary::chunk_summary;
use crate::testgen::tokens::TokenEstimator;

/// Checkpoints reported while a file is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Parsed { blocks: usize },
    Planned { batches: usize },
    TestPlanReady,
    BatchStarted {
        index: usize,
        total: usize,
        attempt: u32,
        blocks: usize,
    },
    Retrying {
        index: usize,
        attempt: u32,
        error: String,
    },
    Bisected {
        index: usize,
        front: usize,
        back: usize,
    },
    BatchComplete { index: usize, total: usize },
    Assembled { path: PathBuf },
}

#[derive(Debug, Clone, Serialize)]
pub struct TestArtifact {
    pub path: PathBuf,
    pub content: String,
    pub language: Language,
    pub block_count: usize,
    /// Batches consumed, including halves created by bisection.
    pub batch_count: usize,
    pub test_plan: Option<String>,
    pub chunk_summary: String,
    pub generated_at: DateTime<Utc>,
}

/// A parsed and batched source file, ready for generation.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub language: Language,
    pub source: String,
    pub blocks: Vec<Block>,
    pub batches: Vec<Batch>,
}

/// Detect, read, parse and plan without touching the generator.
pub fn prepare(
    source_path: &Path,
    batching: &BatchingConfig,
    estimator: &TokenEstimator,
) -> Result<Prepared> {
    let language = detect_language(source_path)?;

    let source = fs::read_to_string(source_path)
        .map_err(|e| Error::io(Stage::Read, source_path, e))?;

    let blocks = ast::parse(&source, source_path, language)?;

    let planner = BatchPlanner::new(estimator, batching.token_budget, batching.split_ratio);
    let batches = planner.plan(blocks.clone());

    Ok(Prepared {
        language,
        source,
        blocks,
        batches,
    })
}

pub struct Pipeline<'a, G: Generator + ?Sized> {
    generator: &'a G,
    config: &'a AppConfig,
    estimator: TokenEstimator,
}

impl<'a, G: Generator + ?Sized> Pipeline<'a, G> {
    pub fn new(generator: &'a G, config: &'a AppConfig) -> Self {
        Self {
            generator,
            config,
            estimator: TokenEstimator::new(),
        }
    }

    pub fn with_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn prepare(&self, source_path: &Path) -> Result<Prepared> {
        prepare(source_path, &self.config.batching, &self.estimator)
    }

    pub fn run(
        &self,
        source_path: &Path,
        out_dir: &Path,
        progress: &mut dyn FnMut(Progress),
    ) -> Result<TestArtifact> {
        let span = info_span!("file", path = %source_path.display());
        let _guard = span.enter();

        let Prepared {
            language,
            source,
            blocks,
            batches,
        } = self.prepare(source_path)?;

        progress(Progress::Parsed {
            blocks: blocks.len(),
        });
        progress(Progress::Planned {
            batches: batches.len(),
        });

        if self.config.pipeline.write_summary {
            ast::write_summary(out_dir, source_path, &blocks)?;
        }

        let summary = chunk_summary(&blocks);

        let test_plan = if self.config.pipeline.test_plan {
            let plan = generate_test_plan(
                self.generator,
                &self.config.generation,
                language,
                source_path,
                &source,
            );
            if plan.is_some() {
                progress(Progress::TestPlanReady);
            }
            plan
        } else {
            None
        };

        let unit = test_unit_name(&blocks, source_path);
        let path = out_dir.join(test_file_name(language, &unit));
        let mut artifact = Artifact::at_path(language, &path);

        let driver = Driver {
            generator: self.generator,
            generation: &self.config.generation,
            retry: &self.config.retry,
            language,
            test_unit: &unit,
            source: source_path,
        };
        let batch_count = driver.run(batches, &mut artifact, progress)?;

        info!(
            path = %path.display(),
            blocks = blocks.len(),
            batches = batch_count,
            "test file assembled"
        );
        progress(Progress::Assembled { path: path.clone() });

        Ok(TestArtifact {
            path,
            content: artifact.into_content(),
            language,
            block_count: blocks.len(),
            batch_count,
            test_plan,
            chunk_summary: summary,
            generated_at: Utc::now(),
        })
    }
}
