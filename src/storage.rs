//! Run output storage: metadata, per-problem JSON, CSV export, resumption.
//!
//! Layout on disk:
//!
//! ```text
//! results/
//!   <run_id>/
//!     metadata.json
//!     math_00001.json
//!     math_00002.json
//!     results.csv          (written on demand)
//! ```
//!
//! Each problem result is written as soon as it lands, so an interrupted
//! run can be resumed by skipping the ids already present.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Condition, Mode, ProblemResult};
use crate::report::normalize_model_name;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunMetadata {
  pub run_id: String,
  pub run_uuid: Uuid,
  pub started_at: String,
  pub model: String,
  pub condition: Condition,
  pub mode: Mode,
  pub threshold: f64,
  pub n_problems: usize,
  pub dataset: String,
  /// Free-form echo of the run settings for later inspection.
  #[serde(default)]
  pub config: serde_json::Value,
}

impl RunMetadata {
  pub fn new(
    model: &str,
    condition: Condition,
    mode: Mode,
    threshold: f64,
    n_problems: usize,
    dataset: &str,
    config: serde_json::Value,
  ) -> Self {
    let now = Local::now();
    Self {
      run_id: format!("{}_{}", normalize_model_name(model), now.format("%Y%m%d_%H%M%S")),
      run_uuid: Uuid::new_v4(),
      started_at: now.to_rfc3339(),
      model: model.to_string(),
      condition,
      mode,
      threshold,
      n_problems,
      dataset: dataset.to_string(),
      config,
    }
  }
}

pub struct ResultsStorage {
  run_dir: PathBuf,
  run_id: String,
}

impl ResultsStorage {
  /// Create the directory structure for a fresh run and persist its
  /// metadata.
  pub fn create(output_dir: &Path, meta: &RunMetadata) -> Result<Self> {
    let run_dir = output_dir.join(&meta.run_id);
    std::fs::create_dir_all(&run_dir)
      .with_context(|| format!("creating run directory {}", run_dir.display()))?;

    let metadata_path = run_dir.join("metadata.json");
    std::fs::write(&metadata_path, serde_json::to_string_pretty(meta)?)
      .with_context(|| format!("writing {}", metadata_path.display()))?;

    info!(target: "openmath_bench", run_id = %meta.run_id, dir = %run_dir.display(), "Initialized run storage");
    Ok(Self { run_dir, run_id: meta.run_id.clone() })
  }

  /// Open an existing run directory (for resumption or export).
  pub fn open(output_dir: &Path, run_id: &str) -> Result<Self> {
    let run_dir = output_dir.join(run_id);
    if !run_dir.join("metadata.json").is_file() {
      bail!("run {} not found under {}", run_id, output_dir.display());
    }
    Ok(Self { run_dir, run_id: run_id.to_string() })
  }

  pub fn run_id(&self) -> &str {
    &self.run_id
  }

  pub fn run_dir(&self) -> &Path {
    &self.run_dir
  }

  pub fn load_metadata(&self) -> Result<RunMetadata> {
    let path = self.run_dir.join("metadata.json");
    let raw =
      std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_str(&raw)?)
  }

  /// Persist one problem result as `<problem_id>.json`.
  pub fn save_result(&self, result: &ProblemResult) -> Result<PathBuf> {
    let path = self.run_dir.join(format!("{}.json", result.problem_id));
    std::fs::write(&path, serde_json::to_string_pretty(result)?)
      .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
  }

  /// All stored results, sorted by problem id. Unreadable files are
  /// skipped with a warning.
  pub fn load_results(&self) -> Result<Vec<ProblemResult>> {
    let mut results = Vec::new();
    for entry in std::fs::read_dir(&self.run_dir)
      .with_context(|| format!("listing {}", self.run_dir.display()))?
    {
      let path = entry?.path();
      if path.extension().map(|e| e != "json").unwrap_or(true) {
        continue;
      }
      if path.file_name().map(|n| n == "metadata.json" || n == "summary.json").unwrap_or(false) {
        continue;
      }
      match std::fs::read_to_string(&path)
        .map_err(anyhow::Error::from)
        .and_then(|raw| serde_json::from_str::<ProblemResult>(&raw).map_err(Into::into))
      {
        Ok(r) => results.push(r),
        Err(e) => warn!(target: "openmath_bench", path = %path.display(), error = %e, "Skipping unreadable result file"),
      }
    }
    results.sort_by(|a, b| a.problem_id.cmp(&b.problem_id));
    Ok(results)
  }

  /// Problem ids already completed in this run.
  pub fn completed_problems(&self) -> Result<HashSet<String>> {
    Ok(self.load_results()?.into_iter().map(|r| r.problem_id).collect())
  }

  /// Flatten results into one CSV row per problem. Returns the file path.
  pub fn export_csv(&self, results: &[ProblemResult]) -> Result<PathBuf> {
    const FIELDS: &[&str] = &[
      "problem_id",
      "level",
      "problem_type",
      "outcome",
      "is_correct",
      "attempts_used",
      "final_answer",
      "ground_truth",
      "comparison_method",
      "elapsed_secs",
    ];

    let mut out = String::new();
    out.push_str(&FIELDS.join(","));
    out.push('\n');
    for r in results {
      let row = [
        r.problem_id.clone(),
        r.level.to_string(),
        r.problem_type.clone(),
        r.outcome.to_string(),
        r.is_correct.to_string(),
        r.attempts_used.to_string(),
        r.final_answer.clone(),
        r.ground_truth.clone(),
        r.comparison_method.clone(),
        format!("{:.3}", r.elapsed_secs),
      ];
      let escaped: Vec<String> = row.iter().map(|f| csv_escape(f)).collect();
      out.push_str(&escaped.join(","));
      out.push('\n');
    }

    let path = self.run_dir.join("results.csv");
    std::fs::write(&path, out).with_context(|| format!("writing {}", path.display()))?;
    info!(target: "openmath_bench", rows = results.len(), path = %path.display(), "Exported CSV");
    Ok(path)
  }
}

/// List run ids present under an output directory.
pub fn list_runs(output_dir: &Path) -> Result<Vec<String>> {
  let mut runs = Vec::new();
  if !output_dir.is_dir() {
    return Ok(runs);
  }
  for entry in std::fs::read_dir(output_dir)? {
    let path = entry?.path();
    if path.is_dir() && path.join("metadata.json").is_file() {
      if let Some(name) = path.file_name() {
        runs.push(name.to_string_lossy().into_owned());
      }
    }
  }
  runs.sort();
  Ok(runs)
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn csv_escape(field: &str) -> String {
  if field.contains(',') || field.contains('"') || field.contains('\n') {
    format!("\"{}\"", field.replace('"', "\"\""))
  } else {
    field.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Outcome;

  fn metadata() -> RunMetadata {
    RunMetadata::new(
      "gemma2:9b",
      Condition::Openmath,
      Mode::BestOfN,
      0.2,
      2,
      "math500",
      serde_json::json!({"max_attempts": 5}),
    )
  }

  fn result(id: &str) -> ProblemResult {
    ProblemResult {
      problem_id: id.into(),
      level: 2,
      problem_type: "algebra".into(),
      statement: "s".into(),
      ground_truth: "1, 2".into(),
      outcome: Outcome::Solved,
      final_answer: "1, 2".into(),
      is_correct: true,
      comparison_method: "exact_match".into(),
      attempts_used: 1,
      error: None,
      retrieved_symbols: vec![],
      elapsed_secs: 0.5,
      attempts: vec![],
    }
  }

  #[test]
  fn run_id_embeds_sanitized_model_name() {
    assert!(metadata().run_id.starts_with("gemma2-9b_"));
  }

  #[test]
  fn round_trip_results_and_resumption() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let meta = metadata();
    let storage = ResultsStorage::create(tmp.path(), &meta).expect("create");

    storage.save_result(&result("math_00002")).expect("save");
    storage.save_result(&result("math_00001")).expect("save");

    let loaded = storage.load_results().expect("load");
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0].problem_id, "math_00001", "sorted by id");

    let completed = storage.completed_problems().expect("completed");
    assert!(completed.contains("math_00001"));
    assert!(completed.contains("math_00002"));

    let reopened = ResultsStorage::open(tmp.path(), storage.run_id()).expect("open");
    assert_eq!(reopened.load_metadata().expect("meta").model, "gemma2:9b");

    assert!(ResultsStorage::open(tmp.path(), "nope").is_err());
  }

  #[test]
  fn csv_export_escapes_commas() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let storage = ResultsStorage::create(tmp.path(), &metadata()).expect("create");
    let path = storage.export_csv(&[result("math_00001")]).expect("csv");
    let csv = std::fs::read_to_string(path).expect("read");

    let mut lines = csv.lines();
    assert!(lines.next().expect("header").starts_with("problem_id,level"));
    let row = lines.next().expect("row");
    assert!(row.contains("\"1, 2\""), "comma-bearing answer is quoted: {row}");
  }

  #[test]
  fn list_runs_sees_created_run() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let meta = metadata();
    ResultsStorage::create(tmp.path(), &meta).expect("create");
    let runs = list_runs(tmp.path()).expect("list");
    assert_eq!(runs, vec![meta.run_id.clone()]);
    assert!(list_runs(&tmp.path().join("missing")).expect("list").is_empty());
  }
}
