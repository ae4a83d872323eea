//! Aggregation over problem results and the Markdown run report.
//!
//! The report layout is a fixed contract: configuration header, summary
//! accuracy tables (overall, by level, by type), then one section per
//! problem with the rendered prompts, raw response, extracted answer, and
//! correctness flag. Downstream tooling parses these sections.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::domain::{Condition, Mode, Outcome, ProblemResult};

/// Correct/total tally for one summary bucket.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct GroupStats {
  pub total: usize,
  pub correct: usize,
}

impl GroupStats {
  pub fn accuracy(&self) -> f64 {
    if self.total == 0 {
      0.0
    } else {
      self.correct as f64 / self.total as f64
    }
  }

  fn add(&mut self, correct: bool) {
    self.total += 1;
    if correct {
      self.correct += 1;
    }
  }
}

/// Derived at end of run by reducing over all problem results.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunSummary {
  pub total: usize,
  pub correct: usize,
  pub overall_accuracy: f64,
  /// 95% Wilson score interval on the overall accuracy.
  pub confidence_interval_95: (f64, f64),
  pub by_level: BTreeMap<u8, GroupStats>,
  pub by_type: BTreeMap<String, GroupStats>,
  pub average_attempts: f64,
  pub aborted: usize,
}

/// Pure reduction over the result list. A `Failed` result contributes its
/// full attempt budget to the attempt average; an `Aborted` one counts as
/// incorrect with the attempts it actually consumed.
pub fn summarize(results: &[ProblemResult]) -> RunSummary {
  let mut summary = RunSummary { total: results.len(), ..Default::default() };
  if results.is_empty() {
    return summary;
  }

  let mut attempt_sum = 0u64;
  for r in results {
    if r.is_correct {
      summary.correct += 1;
    }
    if r.outcome == Outcome::Aborted {
      summary.aborted += 1;
    }
    attempt_sum += u64::from(r.attempts_used);
    summary.by_level.entry(r.level).or_default().add(r.is_correct);
    summary.by_type.entry(r.problem_type.clone()).or_default().add(r.is_correct);
  }

  summary.overall_accuracy = summary.correct as f64 / summary.total as f64;
  summary.confidence_interval_95 = wilson_interval(summary.correct, summary.total, 1.96);
  summary.average_attempts = attempt_sum as f64 / summary.total as f64;
  summary
}

/// Wilson score confidence interval for a binomial proportion.
fn wilson_interval(successes: usize, total: usize, z: f64) -> (f64, f64) {
  if total == 0 {
    return (0.0, 0.0);
  }
  let n = total as f64;
  let p = successes as f64 / n;
  let denominator = 1.0 + z * z / n;
  let center = (p + z * z / (2.0 * n)) / denominator;
  let spread = z * ((p * (1.0 - p) + z * z / (4.0 * n)) / n).sqrt() / denominator;
  ((center - spread).max(0.0), (center + spread).min(1.0))
}

/// Run-level settings echoed into the report header.
#[derive(Clone, Debug)]
pub struct ReportMeta {
  pub model: String,
  pub condition: Condition,
  pub mode: Mode,
  pub threshold: f64,
  pub max_tokens: u32,
  pub max_attempts: u32,
  pub temperature: f32,
  pub top_k_symbols: usize,
  pub seed: u64,
  pub endpoint: String,
  pub date: DateTime<Local>,
}

/// File-system-safe rendition of a model name like
/// `johnnyboy/qwen2.5-math-7b:latest`.
pub fn normalize_model_name(model: &str) -> String {
  model
    .chars()
    .map(|c| if c == '/' || c == ':' || c.is_whitespace() { '-' } else { c })
    .collect()
}

/// `experiment_<MODEL>_<CONDITION>_<MODE>_<THRESHOLD>_<TIMESTAMP>.md`
pub fn report_filename(meta: &ReportMeta) -> String {
  format!(
    "experiment_{}_{}_{}_{}_{}.md",
    normalize_model_name(&meta.model),
    meta.condition,
    meta.mode,
    meta.threshold,
    meta.date.format("%y%m%d_%H%M")
  )
}

fn pct(stats: &GroupStats) -> f64 {
  stats.accuracy() * 100.0
}

/// Render the full Markdown report.
pub fn render_markdown(meta: &ReportMeta, summary: &RunSummary, results: &[ProblemResult]) -> String {
  let mut lines: Vec<String> = vec![
    "# OpenMath Ontology Mathematical Problem Solving Experiment".into(),
    String::new(),
    format!("**Condition**: {}", meta.condition),
    format!("**Mode**: {}", meta.mode),
    format!("**Model**: {}", meta.model),
    format!("**Threshold**: {}", meta.threshold),
    format!("**Date**: {}", meta.date.format("%Y-%m-%d %H:%M:%S")),
    String::new(),
    "## Configuration".into(),
    String::new(),
    format!("- Number of problems: {} (filtered by threshold >= {})", summary.total, meta.threshold),
    format!("- Max tokens: {}", meta.max_tokens),
    format!("- Max attempts: {}", meta.max_attempts),
    format!("- Temperature: {} (best-of-n only)", meta.temperature),
    format!("- Top K symbols: {}", meta.top_k_symbols),
    format!("- Seed: {}", meta.seed),
    format!("- Endpoint: {}", meta.endpoint),
    String::new(),
    "---".into(),
    String::new(),
    "## Summary".into(),
    String::new(),
    format!(
      "**Overall Accuracy**: {}/{} ({:.1}%)",
      summary.correct,
      summary.total,
      summary.overall_accuracy * 100.0
    ),
    format!(
      "**95% CI**: [{:.1}%, {:.1}%]",
      summary.confidence_interval_95.0 * 100.0,
      summary.confidence_interval_95.1 * 100.0
    ),
    format!("**Average Number of Attempts**: {:.2}", summary.average_attempts),
  ];

  if summary.aborted > 0 {
    lines.push(format!("**Aborted Problems**: {} (client errors)", summary.aborted));
  }

  lines.extend([String::new(), "### By Level".into()]);
  for (level, stats) in &summary.by_level {
    lines.push(format!("- Level {}: {}/{} ({:.1}%)", level, stats.correct, stats.total, pct(stats)));
  }

  lines.extend([String::new(), "### By Problem Type".into()]);
  for (ptype, stats) in &summary.by_type {
    lines.push(format!("- {}: {}/{} ({:.1}%)", ptype, stats.correct, stats.total, pct(stats)));
  }

  lines.extend([String::new(), "---".into(), String::new(), "# Detailed Results".into(), String::new()]);

  for r in results {
    lines.extend([
      format!("## Problem {}", r.problem_id),
      format!("  Level: {}", r.level),
      format!("  Type: {}", r.problem_type),
      format!("  Problem Statement: {}", r.statement),
      format!("  Ground Truth: {}", r.ground_truth),
      String::new(),
      format!("## Response {}", r.problem_id),
      format!("  Attempt: {}", r.attempts_used),
      format!("  Answer: {}", r.final_answer),
      format!("  Is Correct: {}", r.is_correct),
    ]);
    if let Some(error) = &r.error {
      lines.push(format!("  Error: {}", error));
    }
    if !r.retrieved_symbols.is_empty() {
      lines.push(format!("  OpenMath Symbols: {:?}", r.retrieved_symbols));
    }

    let last = r.attempts.last();
    let system = last.map(|a| a.system_prompt.as_str()).unwrap_or("");
    let user = last.map(|a| a.user_prompt.as_str()).unwrap_or("");
    let response = last.map(|a| a.response.as_str()).unwrap_or("");

    lines.extend([
      String::new(),
      "--- System Prompt ---".into(),
      if system.is_empty() { "(empty)".into() } else { system.to_string() },
      "--- End System Prompt ---".into(),
      String::new(),
      "--- User Prompt ---".into(),
      user.to_string(),
      "--- End User Prompt ---".into(),
      String::new(),
      "--- LLM Response ---".into(),
      response.to_string(),
      "--- End LLM Response ---".into(),
      String::new(),
      "-".repeat(56),
      String::new(),
    ]);
  }

  lines.join("\n")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Attempt, Outcome};
  use chrono::TimeZone;

  fn result(id: &str, level: u8, ptype: &str, correct: bool, attempts_used: u32) -> ProblemResult {
    ProblemResult {
      problem_id: id.into(),
      level,
      problem_type: ptype.into(),
      statement: format!("statement {id}"),
      ground_truth: "42".into(),
      outcome: if correct { Outcome::Solved } else { Outcome::Failed },
      final_answer: if correct { "42".into() } else { "41".into() },
      is_correct: correct,
      comparison_method: "exact_match".into(),
      attempts_used,
      error: None,
      retrieved_symbols: vec![],
      elapsed_secs: 1.0,
      attempts: vec![Attempt {
        problem_id: id.into(),
        attempt_number: attempts_used,
        system_prompt: "SYS".into(),
        user_prompt: "USER".into(),
        response: "\\boxed{42}".into(),
        extracted_answer: Some("42".into()),
        is_correct: correct,
        comparison_method: "exact_match".into(),
        elapsed_secs: 1.0,
      }],
    }
  }

  /// 10 synthetic results: level 1 all correct (4), level 2 all incorrect
  /// (3), level 3 mixed (2 of 3 correct).
  fn synthetic() -> Vec<ProblemResult> {
    let mut v = Vec::new();
    for i in 0..4 {
      v.push(result(&format!("a{i}"), 1, "algebra", true, 1));
    }
    for i in 0..3 {
      v.push(result(&format!("g{i}"), 2, "geometry", false, 5));
    }
    v.push(result("p0", 3, "precalculus", true, 2));
    v.push(result("p1", 3, "precalculus", true, 3));
    v.push(result("p2", 3, "precalculus", false, 5));
    v
  }

  #[test]
  fn aggregation_over_synthetic_results() {
    let results = synthetic();
    let s = summarize(&results);
    assert_eq!(s.total, 10);
    assert_eq!(s.correct, 6);
    assert!((s.overall_accuracy - 0.6).abs() < 1e-12);

    assert_eq!(s.by_level[&1].correct, 4);
    assert!((s.by_level[&1].accuracy() - 1.0).abs() < 1e-12);
    assert!((s.by_level[&2].accuracy() - 0.0).abs() < 1e-12);
    assert!((s.by_level[&3].accuracy() - 2.0 / 3.0).abs() < 1e-12);

    assert_eq!(s.by_type["algebra"].total, 4);
    assert_eq!(s.by_type["geometry"].correct, 0);

    // (4*1 + 3*5 + 2 + 3 + 5) / 10
    assert!((s.average_attempts - 2.9).abs() < 1e-12);
  }

  #[test]
  fn empty_results_summarize_to_zero() {
    let s = summarize(&[]);
    assert_eq!(s.total, 0);
    assert_eq!(s.overall_accuracy, 0.0);
  }

  #[test]
  fn wilson_interval_brackets_the_point_estimate() {
    let (lo, hi) = wilson_interval(6, 10, 1.96);
    assert!(lo < 0.6 && 0.6 < hi);
    assert!(lo >= 0.0 && hi <= 1.0);
    assert_eq!(wilson_interval(0, 0, 1.96), (0.0, 0.0));
  }

  fn meta() -> ReportMeta {
    ReportMeta {
      model: "johnnyboy/qwen2.5-math-7b:latest".into(),
      condition: Condition::Openmath,
      mode: Mode::BestOfN,
      threshold: 0.2,
      max_tokens: 4096,
      max_attempts: 5,
      temperature: 0.6,
      top_k_symbols: 20,
      seed: 42,
      endpoint: "http://localhost:11434".into(),
      date: Local.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap(),
    }
  }

  #[test]
  fn filename_is_filesystem_safe() {
    let name = report_filename(&meta());
    assert_eq!(
      name,
      "experiment_johnnyboy-qwen2.5-math-7b-latest_openmath_best-of-n_0.2_250601_1230.md"
    );
  }

  #[test]
  fn report_structure_is_stable() {
    let results = synthetic();
    let s = summarize(&results);
    let md = render_markdown(&meta(), &s, &results);

    assert!(md.starts_with("# OpenMath Ontology Mathematical Problem Solving Experiment"));
    assert!(md.contains("**Condition**: openmath"));
    assert!(md.contains("## Configuration"));
    assert!(md.contains("**Overall Accuracy**: 6/10 (60.0%)"));
    assert!(md.contains("### By Level"));
    assert!(md.contains("- Level 1: 4/4 (100.0%)"));
    assert!(md.contains("- Level 2: 0/3 (0.0%)"));
    assert!(md.contains("### By Problem Type"));
    assert!(md.contains("- geometry: 0/3 (0.0%)"));
    assert!(md.contains("# Detailed Results"));
    assert!(md.contains("## Problem a0"));
    assert!(md.contains("## Response a0"));
    assert!(md.contains("--- System Prompt ---\nSYS\n--- End System Prompt ---"));
    assert!(md.contains("--- LLM Response ---\n\\boxed{42}\n--- End LLM Response ---"));
  }
}
