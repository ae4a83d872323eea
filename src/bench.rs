//! MATH benchmark loading, filtering, and sampling.
//!
//! Problems come from a JSON export of the benchmark (one array of
//! records). Field spellings drift across dataset exports, so the loader
//! tolerates `level` as `3` or `"Level 3"` and the category under `type`,
//! `subject`, or `source_domain`, normalizing to lowercase snake_case.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::{info, warn};

use crate::domain::Problem;

#[derive(Debug, Deserialize)]
struct RawProblem {
  #[serde(default)]
  id: Option<String>,
  problem: String,
  #[serde(default)]
  solution: String,
  #[serde(default)]
  answer: String,
  #[serde(default)]
  level: Option<serde_json::Value>,
  #[serde(default, rename = "type")]
  problem_type: Option<String>,
  #[serde(default)]
  subject: Option<String>,
  #[serde(default)]
  source_domain: Option<String>,
  #[serde(default)]
  threshold_score: Option<f64>,
}

impl RawProblem {
  fn into_problem(self, idx: usize) -> Result<Problem> {
    let level = parse_level(self.level.as_ref())?;
    let raw_type = self
      .problem_type
      .or(self.subject)
      .or(self.source_domain)
      .unwrap_or_else(|| "unknown".into());
    Ok(Problem {
      id: self.id.unwrap_or_else(|| format!("math_{idx:05}")),
      statement: self.problem,
      solution: self.solution,
      answer: self.answer,
      level,
      problem_type: normalize_type(&raw_type),
      threshold_score: self.threshold_score.unwrap_or(0.0),
    })
  }
}

/// Accepts `3`, `"3"`, or `"Level 3"`. Levels outside 1..=5 are rejected.
fn parse_level(value: Option<&serde_json::Value>) -> Result<u8> {
  let level = match value {
    None => bail!("missing level"),
    Some(serde_json::Value::Number(n)) => {
      n.as_u64().with_context(|| format!("non-integer level {n}"))? as u8
    }
    Some(serde_json::Value::String(s)) => {
      let digits = s.trim().trim_start_matches("Level").trim();
      digits.parse::<u8>().with_context(|| format!("unparseable level {s:?}"))?
    }
    Some(other) => bail!("unexpected level encoding: {other}"),
  };
  if !(1..=5).contains(&level) {
    bail!("level {level} outside 1..=5");
  }
  Ok(level)
}

fn normalize_type(raw: &str) -> String {
  raw.trim().to_lowercase().replace(' ', "_")
}

/// Stratification key for sampling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StratifyBy {
  Level,
  Type,
}

#[derive(Clone, Debug, Default)]
pub struct DatasetStats {
  pub total: usize,
  pub by_level: BTreeMap<u8, usize>,
  pub by_type: BTreeMap<String, usize>,
}

/// Collection of benchmark problems. Filters return new datasets; the
/// loaded problems themselves are never mutated.
#[derive(Clone, Debug, Default)]
pub struct Dataset {
  pub name: String,
  pub problems: Vec<Problem>,
}

impl Dataset {
  pub fn len(&self) -> usize {
    self.problems.len()
  }

  pub fn is_empty(&self) -> bool {
    self.problems.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &Problem> {
    self.problems.iter()
  }

  fn with_problems(&self, problems: Vec<Problem>) -> Dataset {
    Dataset { name: self.name.clone(), problems }
  }

  pub fn filter_by_level(&self, levels: &[u8]) -> Dataset {
    self.with_problems(
      self.problems.iter().filter(|p| levels.contains(&p.level)).cloned().collect(),
    )
  }

  pub fn filter_by_type(&self, types: &[String]) -> Dataset {
    self.with_problems(
      self
        .problems
        .iter()
        .filter(|p| types.iter().any(|t| *t == p.problem_type))
        .cloned()
        .collect(),
    )
  }

  /// Keep problems whose retrieval confidence reaches `min`. A threshold
  /// of 0.0 keeps everything.
  pub fn filter_by_threshold(&self, min: f64) -> Dataset {
    self.with_problems(
      self.problems.iter().filter(|p| p.threshold_score >= min).cloned().collect(),
    )
  }

  /// Random sample of `n` problems, reproducible for a given seed.
  pub fn sample(&self, n: usize, seed: u64) -> Dataset {
    if n >= self.problems.len() {
      return self.clone();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let sampled: Vec<Problem> =
      self.problems.choose_multiple(&mut rng, n).cloned().collect();
    self.with_problems(sampled)
  }

  /// Stratified sample keeping the level (or type) distribution roughly
  /// proportional; the remainder goes to the first groups in key order.
  pub fn stratified_sample(&self, n: usize, by: StratifyBy, seed: u64) -> Dataset {
    if n >= self.problems.len() {
      return self.clone();
    }
    let mut rng = StdRng::seed_from_u64(seed);

    let mut groups: BTreeMap<String, Vec<&Problem>> = BTreeMap::new();
    for p in &self.problems {
      let key = match by {
        StratifyBy::Level => format!("{}", p.level),
        StratifyBy::Type => p.problem_type.clone(),
      };
      groups.entry(key).or_default().push(p);
    }

    let n_groups = groups.len();
    let per_group = n / n_groups;
    let remainder = n % n_groups;

    let mut sampled: Vec<Problem> = Vec::with_capacity(n);
    for (i, (_, problems)) in groups.into_iter().enumerate() {
      let want = per_group + usize::from(i < remainder);
      let want = want.min(problems.len());
      sampled.extend(problems.choose_multiple(&mut rng, want).map(|p| (*p).clone()));
    }
    sampled.shuffle(&mut rng);
    self.with_problems(sampled)
  }

  pub fn statistics(&self) -> DatasetStats {
    let mut stats = DatasetStats { total: self.problems.len(), ..Default::default() };
    for p in &self.problems {
      *stats.by_level.entry(p.level).or_insert(0) += 1;
      *stats.by_type.entry(p.problem_type.clone()).or_insert(0) += 1;
    }
    stats
  }
}

/// Load a benchmark JSON file. Records that fail to parse are skipped with
/// a warning rather than aborting the whole run.
pub fn load_problems(path: &Path) -> Result<Dataset> {
  let raw = std::fs::read_to_string(path)
    .with_context(|| format!("reading benchmark {}", path.display()))?;
  let records: Vec<serde_json::Value> = serde_json::from_str(&raw)
    .with_context(|| format!("parsing benchmark {}", path.display()))?;

  let mut problems = Vec::with_capacity(records.len());
  for (idx, record) in records.into_iter().enumerate() {
    let parsed = serde_json::from_value::<RawProblem>(record)
      .map_err(anyhow::Error::from)
      .and_then(|r| r.into_problem(idx));
    match parsed {
      Ok(p) => problems.push(p),
      Err(e) => warn!(target: "openmath_bench", index = idx, error = %e, "Skipping problem record"),
    }
  }

  info!(target: "openmath_bench", path = %path.display(), problems = problems.len(), "Loaded benchmark");
  Ok(Dataset {
    name: path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "benchmark".into()),
    problems,
  })
}
