//! OpenMath Bench · Math-benchmark harness for locally hosted models
//!
//! - Loads benchmark problems and the OpenMath symbol knowledge base
//! - Retrieves top-K relevant symbols per problem (keyword mode)
//! - Queries an Ollama-compatible endpoint, grades boxed answers
//! - Writes per-problem JSON, a CSV export, and a Markdown report
//!
//! Important env variables:
//!   OLLAMA_API_URL      : endpoint base URL (default "http://localhost:11434")
//!   HARNESS_CONFIG_PATH : path to TOML config (prompt templates + data paths)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod telemetry;
mod util;
mod domain;
mod config;
mod bench;
mod ontology;
mod keywords;
mod retrieval;
mod prompt;
mod ollama;
mod extract;
mod grade;
mod harness;
mod report;
mod storage;

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Parser;
use tracing::{debug, info, warn};

use crate::bench::StratifyBy;
use crate::domain::{Condition, Mode};
use crate::harness::{Harness, PreparedProblem, RunConfig};
use crate::ollama::OllamaClient;
use crate::prompt::Strategy;
use crate::report::ReportMeta;
use crate::retrieval::Retriever;
use crate::storage::{ResultsStorage, RunMetadata};

#[derive(Parser, Debug)]
#[command(name = "openmath-bench", version, about = "Evaluate a locally hosted model on math problems with OpenMath symbol context")]
struct Cli {
  /// Model name as served by the endpoint.
  #[arg(long, default_value = "johnnyboy/qwen2.5-math-7b:latest")]
  model: String,

  /// Whether to inject retrieved symbol definitions into the prompt.
  #[arg(long, value_enum, default_value_t = Condition::Openmath)]
  condition: Condition,

  /// greedy = one attempt at temperature 0; best-of-n = up to
  /// --max-attempts fresh samples at --temperature.
  #[arg(long, value_enum, default_value_t = Mode::Greedy)]
  mode: Mode,

  /// Minimum per-problem threshold score; problems below are filtered out.
  #[arg(long, default_value_t = 0.0)]
  threshold: f64,

  /// Max problems to run (may be fewer after filtering).
  #[arg(long = "n-problems", default_value_t = 500)]
  n_problems: usize,

  /// Attempt budget per problem (best-of-n mode).
  #[arg(long = "max-attempts", default_value_t = 5)]
  max_attempts: u32,

  #[arg(long = "max-tokens", default_value_t = 4096)]
  max_tokens: u32,

  /// Sampling temperature (best-of-n mode only).
  #[arg(long, default_value_t = 0.6)]
  temperature: f32,

  /// Max OpenMath symbols injected per prompt.
  #[arg(long = "top-k-symbols", default_value_t = 20)]
  top_k_symbols: usize,

  #[arg(long, default_value_t = 42)]
  seed: u64,

  /// Prompting strategy; inferred from the model name when omitted.
  #[arg(long, value_enum)]
  strategy: Option<Strategy>,

  /// Restrict to specific difficulty levels, e.g. --levels 4,5.
  #[arg(long, value_delimiter = ',')]
  levels: Vec<u8>,

  /// Restrict to specific problem types, e.g. --types algebra,geometry.
  #[arg(long, value_delimiter = ',')]
  types: Vec<String>,

  /// Stratify the sample instead of drawing uniformly.
  #[arg(long, value_enum)]
  stratify: Option<StratifyBy>,

  #[arg(long = "ollama-url", env = "OLLAMA_API_URL", default_value = ollama::DEFAULT_BASE_URL)]
  ollama_url: String,

  /// Per-call timeout against the model endpoint.
  #[arg(long = "timeout-secs", default_value_t = 180)]
  timeout_secs: u64,

  #[arg(long = "output-dir", default_value = "./results")]
  output_dir: PathBuf,

  /// Benchmark JSON path (overrides config).
  #[arg(long)]
  problems: Option<PathBuf>,

  /// Knowledge base JSON path (overrides config).
  #[arg(long = "knowledge-base")]
  knowledge_base: Option<PathBuf>,

  /// Keyword index JSON path (overrides config).
  #[arg(long)]
  index: Option<PathBuf>,

  /// Resume a previous run id, skipping completed problems.
  #[arg(long)]
  resume: Option<String>,

  /// Print the run configuration without executing.
  #[arg(long)]
  dry_run: bool,

  /// Run only 2 problems for quick testing.
  #[arg(long = "test-mode")]
  test_mode: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  telemetry::init_tracing();
  let cli = Cli::parse();

  let cfg = config::load_config_from_env().unwrap_or_default();
  let problems_path = cli.problems.clone().unwrap_or_else(|| PathBuf::from(&cfg.paths.problems));
  let kb_path =
    cli.knowledge_base.clone().unwrap_or_else(|| PathBuf::from(&cfg.paths.knowledge_base));
  let index_path = cli.index.clone().unwrap_or_else(|| PathBuf::from(&cfg.paths.index));

  let strategy = cli.strategy.unwrap_or_else(|| Strategy::for_model(&cli.model));
  info!(
    target: "openmath_bench",
    model = %cli.model,
    condition = %cli.condition,
    mode = %cli.mode,
    ?strategy,
    threshold = cli.threshold,
    seed = cli.seed,
    endpoint = %cli.ollama_url,
    "Run configuration"
  );

  // Load and narrow the benchmark.
  let dataset = bench::load_problems(&problems_path)?;
  let dataset = dataset.filter_by_threshold(cli.threshold);
  let dataset = if cli.levels.is_empty() { dataset } else { dataset.filter_by_level(&cli.levels) };
  let dataset = if cli.types.is_empty() { dataset } else { dataset.filter_by_type(&cli.types) };
  if dataset.is_empty() {
    bail!("no problems available at threshold >= {} (try a lower threshold)", cli.threshold);
  }

  let n = if cli.test_mode { 2 } else { cli.n_problems };
  let dataset = match cli.stratify {
    Some(by) => dataset.stratified_sample(n, by, cli.seed),
    None => dataset.sample(n, cli.seed),
  };

  let stats = dataset.statistics();
  info!(target: "openmath_bench", total = stats.total, levels = ?stats.by_level, "Selected problems");

  // Prepare prompt context per problem.
  let prepared = match cli.condition {
    Condition::Baseline => dataset
      .iter()
      .map(|p| PreparedProblem {
        problem: p.clone(),
        context: String::new(),
        symbol_ids: vec![],
      })
      .collect::<Vec<_>>(),
    Condition::Openmath => {
      let kb = ontology::KnowledgeBase::load(&kb_path)?;
      if kb.is_empty() {
        warn!(target: "openmath_bench", "Knowledge base is empty; all prompts will lack context");
      }
      let index = ontology::SymbolIndex::load(&index_path)?;
      let extra_terms: Vec<String> = index.known_terms().cloned().collect();
      let retriever = Retriever::new(kb, index);

      dataset
        .iter()
        .map(|p| {
          if p.has_diagram() {
            debug!(target: "openmath_bench", problem_id = %p.id, "Statement embeds an Asymptote diagram");
          }
          let extraction = keywords::extract(&p.statement, &extra_terms);
          let retrieval =
            retriever.retrieve(&extraction.all_terms(), cli.top_k_symbols, 1);
          let context = prompt::format_symbol_context(
            &retrieval.symbols,
            cli.top_k_symbols,
            &cfg.prompts.context_header,
          );
          if retrieval.symbols.is_empty() {
            warn!(target: "openmath_bench", problem_id = %p.id, "No symbols retrieved; prompt has no context block");
          }
          PreparedProblem { problem: p.clone(), context, symbol_ids: retrieval.symbol_ids }
        })
        .collect()
    }
  };

  let meta = ReportMeta {
    model: cli.model.clone(),
    condition: cli.condition,
    mode: cli.mode,
    threshold: cli.threshold,
    max_tokens: cli.max_tokens,
    max_attempts: cli.max_attempts,
    temperature: cli.temperature,
    top_k_symbols: cli.top_k_symbols,
    seed: cli.seed,
    endpoint: cli.ollama_url.clone(),
    date: Local::now(),
  };

  if cli.dry_run {
    info!(
      target: "openmath_bench",
      problems = prepared.len(),
      report = %report::report_filename(&meta),
      "Dry run; nothing executed"
    );
    return Ok(());
  }

  // Storage: fresh run or resumption.
  let (run_storage, completed) = match &cli.resume {
    Some(run_id) => {
      let s = match ResultsStorage::open(&cli.output_dir, run_id) {
        Ok(s) => s,
        Err(e) => {
          let available = storage::list_runs(&cli.output_dir)?;
          bail!("{e}; available runs: {available:?}");
        }
      };
      let run_meta = s.load_metadata()?;
      if run_meta.model != cli.model {
        warn!(target: "openmath_bench", stored = %run_meta.model, requested = %cli.model, "Resuming with a different model than the stored run");
      }
      let completed = s.completed_problems()?;
      info!(target: "openmath_bench", run_id = %run_id, completed = completed.len(), "Resuming run");
      (s, completed)
    }
    None => {
      let run_meta = RunMetadata::new(
        &cli.model,
        cli.condition,
        cli.mode,
        cli.threshold,
        prepared.len(),
        &dataset.name,
        serde_json::json!({
          "mode": cli.mode,
          "max_attempts": cli.max_attempts,
          "max_tokens": cli.max_tokens,
          "temperature": cli.temperature,
          "top_k_symbols": cli.top_k_symbols,
          "seed": cli.seed,
          "strategy": strategy,
          "endpoint": cli.ollama_url.clone(),
        }),
      );
      (ResultsStorage::create(&cli.output_dir, &run_meta)?, HashSet::new())
    }
  };

  // Run the experiment, one problem at a time.
  let client = OllamaClient::new(&cli.ollama_url, &cli.model, cli.timeout_secs)?;
  let harness = Harness::new(
    client,
    cfg.prompts.clone(),
    strategy,
    RunConfig {
      mode: cli.mode,
      max_attempts: cli.max_attempts,
      temperature: cli.temperature,
      max_tokens: cli.max_tokens,
    },
  );
  harness.run_all(&prepared, Some(&run_storage), &completed).await?;

  // Summarize everything stored for this run (covers resumed problems too).
  let all_results = run_storage.load_results()?;
  let summary = report::summarize(&all_results);
  info!(
    target: "openmath_bench",
    correct = summary.correct,
    total = summary.total,
    accuracy = format!("{:.1}%", summary.overall_accuracy * 100.0),
    avg_attempts = format!("{:.2}", summary.average_attempts),
    aborted = summary.aborted,
    "Experiment complete"
  );

  let summary_path = run_storage.run_dir().join("summary.json");
  std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
    .with_context(|| format!("writing summary {}", summary_path.display()))?;

  let report_path = cli.output_dir.join(report::report_filename(&meta));
  std::fs::write(&report_path, report::render_markdown(&meta, &summary, &all_results))
    .with_context(|| format!("writing report {}", report_path.display()))?;
  info!(target: "openmath_bench", path = %report_path.display(), "Report written");

  run_storage.export_csv(&all_results)?;
  Ok(())
}
