use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use vertex_tester::config::{self, AppConfig};
use vertex_tester::detectors::language::discover_sources;
use vertex_tester::llm::client::{LlmClient, Provider};
use vertex_tester::logger;
use vertex_tester::testgen::pipeline::{prepare, Pipeline, Progress};
use vertex_tester::testgen::planner::BatchPlanner;
use vertex_tester::testgen::summary::chunk_summary;
use vertex_tester::testgen::tokens::TokenEstimator;

#[derive(Parser)]
#[command(
    name = "vertex-tester",
    version,
    about = "Generate unit tests for Python and Java sources with a language model."
)]
struct Cli {
    /// -v for debug, -vv for trace (RUST_LOG overrides)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (default: <config dir>/vertex-tester/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Generate a test file for each source file
    Generate(GenerateArgs),
    /// Parse and batch a file offline, without calling the model
    Plan(PlanArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// Source files or directories to scan for .py / .java files
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Output directory for generated tests
    #[arg(short, long, default_value = "generated_tests")]
    out_dir: PathBuf,

    #[arg(long)]
    provider: Option<Provider>,

    #[arg(long)]
    model: Option<String>,

    /// Token budget per batch
    #[arg(long)]
    budget: Option<usize>,

    /// Wait for whole responses instead of streaming
    #[arg(long)]
    no_stream: bool,

    /// Ask for a test plan before generating
    #[arg(long)]
    test_plan: bool,
}

#[derive(Args)]
struct PlanArgs {
    file: PathBuf,

    /// Token budget per batch
    #[arg(long)]
    budget: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let mut cfg = config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        CliCommand::Generate(args) => {
            apply_overrides(&mut cfg, &args);
            cfg.validate()?;
            generate(&cfg, &args)
        }
        CliCommand::Plan(args) => {
            if let Some(budget) = args.budget {
                cfg.batching.token_budget = budget;
            }
            cfg.validate()?;
            plan(&cfg, &args.file)
        }
    }
}

fn apply_overrides(cfg: &mut AppConfig, args: &GenerateArgs) {
    if let Some(provider) = args.provider {
        cfg.llm.provider = provider;
    }
    if let Some(model) = &args.model {
        cfg.llm.model = model.clone();
    }
    if let Some(budget) = args.budget {
        cfg.batching.token_budget = budget;
    }
    if args.no_stream {
        cfg.llm.stream = false;
    }
    if args.test_plan {
        cfg.pipeline.test_plan = true;
    }
}

/* ============================================================
   generate
   ============================================================ */

fn generate(cfg: &AppConfig, args: &GenerateArgs) -> Result<()> {
    let sources = discover_sources(&args.paths);
    if sources.is_empty() {
        bail!("no .py or .java files found in the given paths");
    }

    let client = LlmClient::new(&cfg.llm)?;
    info!(
        provider = %client.provider(),
        model = client.model(),
        files = sources.len(),
        "starting generation"
    );

    let pipeline = Pipeline::new(&client, cfg);
    let mut failed = 0usize;

    for source in &sources {
        println!("==> {}", source.display());

        match pipeline.run(source, &args.out_dir, &mut report) {
            Ok(artifact) => {
                println!(
                    "    {} ({} blocks, {} batches)",
                    artifact.path.display(),
                    artifact.block_count,
                    artifact.batch_count
                );
                if let Some(plan) = &artifact.test_plan {
                    println!("\n{plan}\n");
                }
            }
            Err(e) => {
                failed += 1;
                error!(file = %source.display(), stage = %e.stage(), "{e}");
                println!("    failed at {}: {e}", e.stage());
            }
        }
    }

    let ok = sources.len() - failed;
    println!("\n{ok} generated, {failed} failed");

    if failed > 0 {
        bail!("{failed} of {} file(s) failed", sources.len());
    }
    Ok(())
}

fn report(p: Progress) {
    match p {
        Progress::Parsed { blocks } => println!("    parsed {blocks} blocks"),
        Progress::Planned { batches } => println!("    planned {batches} batches"),
        Progress::TestPlanReady => println!("    test plan ready"),
        Progress::BatchStarted {
            index,
            total,
            attempt,
            blocks,
        } => {
            if attempt == 1 {
                println!("    batch {}/{total}: {blocks} blocks", index + 1);
            }
        }
        Progress::Retrying { index, error, .. } => {
            println!("    batch {} retrying: {error}", index + 1)
        }
        Progress::Bisected { index, front, back } => {
            println!("    batch {} split into {front} + {back}", index + 1)
        }
        Progress::BatchComplete { index, total } => {
            println!("    batch {}/{total} done", index + 1)
        }
        Progress::Assembled { path } => println!("    wrote {}", path.display()),
    }
}

/* ============================================================
   plan
   ============================================================ */

fn plan(cfg: &AppConfig, file: &Path) -> Result<()> {
    let estimator = TokenEstimator::new();
    let prepared = prepare(file, &cfg.batching, &estimator)?;
    let planner = BatchPlanner::new(
        &estimator,
        cfg.batching.token_budget,
        cfg.batching.split_ratio,
    );

    println!("{} ({})\n", file.display(), prepared.language);
    print!("{}", chunk_summary(&prepared.blocks));

    println!(
        "Batches: {} (budget {} tokens, {} estimate)",
        prepared.batches.len(),
        planner.budget(),
        estimator.strategy()
    );
    for (i, batch) in prepared.batches.iter().enumerate() {
        let tokens: usize = batch.blocks.iter().map(|b| planner.block_cost(b)).sum();
        let units: Vec<String> = batch
            .blocks
            .iter()
            .map(|b| format!("{} ({})", b.block_id, b.qualified_name()))
            .collect();
        println!("  {}. ~{tokens} tokens: {}", i + 1, units.join(", "));
    }

    Ok(())
}
