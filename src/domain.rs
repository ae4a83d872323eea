//! Domain models for the evaluation harness: problems, attempts, and
//! per-problem results.
//!
//! Every entity here is created once and read thereafter; nothing mutates
//! an `Attempt` or `ProblemResult` after it is recorded.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Experimental condition: whether retrieved symbol definitions are
/// injected into the prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
  Baseline,
  Openmath,
}

impl std::fmt::Display for Condition {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Condition::Baseline => write!(f, "baseline"),
      Condition::Openmath => write!(f, "openmath"),
    }
  }
}

/// Inference mode. `Greedy` performs a single attempt at temperature 0.
/// `BestOfN` draws up to `max_attempts` independent samples at the
/// configured temperature; the model has no memory of prior attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
  Greedy,
  BestOfN,
}

impl std::fmt::Display for Mode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Mode::Greedy => write!(f, "greedy"),
      Mode::BestOfN => write!(f, "best-of-n"),
    }
  }
}

/// A single benchmark problem. Immutable, loaded once from a static source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Problem {
  pub id: String,
  pub statement: String,
  #[serde(default)]
  pub solution: String,
  /// Ground-truth answer (LaTeX/text) the model output is compared against.
  pub answer: String,
  /// Difficulty level, 1 (easiest) to 5 (hardest).
  pub level: u8,
  /// Category string, e.g. "precalculus" or "number_theory".
  pub problem_type: String,
  /// Per-problem retrieval confidence score, used only to filter the run.
  #[serde(default)]
  pub threshold_score: f64,
}

impl Problem {
  /// True if the statement embeds an Asymptote `[asy]` graphics block.
  pub fn has_diagram(&self) -> bool {
    self.statement.contains("[asy]") || self.statement.contains("[/asy]")
  }
}

/// One model call for one problem. Appended to the problem's attempt log
/// as it happens; never mutated after creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Attempt {
  pub problem_id: String,
  /// 1-based attempt counter.
  pub attempt_number: u32,
  pub system_prompt: String,
  pub user_prompt: String,
  pub response: String,
  pub extracted_answer: Option<String>,
  pub is_correct: bool,
  pub comparison_method: String,
  pub elapsed_secs: f64,
}

/// Terminal state of a problem after the attempt loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  /// A graded-correct attempt was produced within the attempt budget.
  Solved,
  /// The attempt budget was exhausted without a correct answer. This is a
  /// normal, expected terminal outcome, not an error condition.
  Failed,
  /// A client/transport error aborted the problem. Surfaced to the
  /// operator, never silently retried.
  Aborted,
}

impl std::fmt::Display for Outcome {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Outcome::Solved => write!(f, "solved"),
      Outcome::Failed => write!(f, "failed"),
      Outcome::Aborted => write!(f, "aborted"),
    }
  }
}

/// Folded result of a problem's attempt list: the first correct attempt
/// wins, otherwise the last attempt stands as the (incorrect) final answer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProblemResult {
  pub problem_id: String,
  pub level: u8,
  pub problem_type: String,
  pub statement: String,
  pub ground_truth: String,
  pub outcome: Outcome,
  pub final_answer: String,
  pub is_correct: bool,
  pub comparison_method: String,
  pub attempts_used: u32,
  /// Client error message for `Aborted` results.
  #[serde(default)]
  pub error: Option<String>,
  /// Symbol ids injected into this problem's prompt, if any.
  #[serde(default)]
  pub retrieved_symbols: Vec<String>,
  pub elapsed_secs: f64,
  /// The full attempt log, in order.
  #[serde(default)]
  pub attempts: Vec<Attempt>,
}

impl ProblemResult {
  /// Fold an attempt log into a result for a problem that ran to a
  /// terminal state (solved or budget exhausted).
  pub fn from_attempts(problem: &Problem, attempts: Vec<Attempt>, symbols: Vec<String>) -> Self {
    let solved = attempts.iter().find(|a| a.is_correct);
    let decisive = solved.or_else(|| attempts.last());
    let (outcome, attempts_used) = match solved {
      Some(a) => (Outcome::Solved, a.attempt_number),
      None => (Outcome::Failed, attempts.len() as u32),
    };
    let elapsed = attempts.iter().map(|a| a.elapsed_secs).sum();
    Self {
      problem_id: problem.id.clone(),
      level: problem.level,
      problem_type: problem.problem_type.clone(),
      statement: problem.statement.clone(),
      ground_truth: problem.answer.clone(),
      outcome,
      final_answer: decisive
        .and_then(|a| a.extracted_answer.clone())
        .unwrap_or_default(),
      is_correct: solved.is_some(),
      comparison_method: decisive
        .map(|a| a.comparison_method.clone())
        .unwrap_or_else(|| "no_answer".to_string()),
      attempts_used,
      error: None,
      retrieved_symbols: symbols,
      elapsed_secs: elapsed,
      attempts,
    }
  }

  /// Result for a problem aborted by a client error mid-loop. The attempts
  /// that did complete are kept for the record.
  pub fn aborted(problem: &Problem, attempts: Vec<Attempt>, symbols: Vec<String>, error: String) -> Self {
    let attempts_used = attempts.len() as u32;
    let elapsed = attempts.iter().map(|a| a.elapsed_secs).sum();
    Self {
      problem_id: problem.id.clone(),
      level: problem.level,
      problem_type: problem.problem_type.clone(),
      statement: problem.statement.clone(),
      ground_truth: problem.answer.clone(),
      outcome: Outcome::Aborted,
      final_answer: String::new(),
      is_correct: false,
      comparison_method: "error".to_string(),
      attempts_used,
      error: Some(error),
      retrieved_symbols: symbols,
      elapsed_secs: elapsed,
      attempts,
    }
  }
}
