//! Unit-test generation for Python and Java sources.
//!
//! A source file is decomposed into blocks (functions, methods,
//! constructors), packed into token-bounded batches, and sent batch by batch
//! to a language model. The responses are assembled into one test file per
//! source.

pub mod config;
pub mod detectors;
pub mod error;
pub mod llm;
pub mod logger;
pub mod testgen;

pub use config::AppConfig;
pub use detectors::ast::Block;
pub use detectors::language::Language;
pub use error::{Error, Result, Stage};
pub use llm::client::{Generator, LlmClient, LlmError};
pub use testgen::pipeline::{Pipeline, Progress, TestArtifact};
