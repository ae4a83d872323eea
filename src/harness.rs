//! The attempt loop: prompting, inference, extraction, grading, retries.
//!
//! Per problem, attempts run `k = 1..=max_attempts`. Each attempt is an
//! independent fresh sample (the model has no memory of prior attempts);
//! the first graded-correct attempt terminates the loop. Retries apply
//! only to grading mismatches; a transport error aborts the problem and
//! the run moves on to the next one.

use std::collections::HashSet;

use anyhow::Result;
use tracing::{debug, error, info, instrument};

use crate::config::Prompts;
use crate::domain::{Mode, Problem, ProblemResult};
use crate::extract;
use crate::grade;
use crate::ollama::ChatBackend;
use crate::prompt::{self, Strategy};
use crate::storage::ResultsStorage;

/// Settings for one experiment run.
#[derive(Clone, Debug)]
pub struct RunConfig {
  pub mode: Mode,
  pub max_attempts: u32,
  pub temperature: f32,
  pub max_tokens: u32,
}

/// A problem with its prompt context already prepared by retrieval.
#[derive(Clone, Debug)]
pub struct PreparedProblem {
  pub problem: Problem,
  pub context: String,
  pub symbol_ids: Vec<String>,
}

pub struct Harness<B: ChatBackend> {
  backend: B,
  prompts: Prompts,
  strategy: Strategy,
  cfg: RunConfig,
}

impl<B: ChatBackend> Harness<B> {
  pub fn new(backend: B, prompts: Prompts, strategy: Strategy, cfg: RunConfig) -> Self {
    Self { backend, prompts, strategy, cfg }
  }

  /// Run one problem to a terminal state.
  #[instrument(level = "info", skip_all, fields(problem_id = %prepared.problem.id))]
  pub async fn run_problem(&self, prepared: &PreparedProblem) -> ProblemResult {
    let problem = &prepared.problem;
    let composed =
      prompt::build(&self.prompts, self.strategy, &problem.statement, &prepared.context);

    let (temperature, budget) = match self.cfg.mode {
      Mode::Greedy => (0.0, 1),
      Mode::BestOfN => (self.cfg.temperature, self.cfg.max_attempts.max(1)),
    };

    let mut attempts = Vec::new();
    for attempt_number in 1..=budget {
      let completion = match self
        .backend
        .chat(&composed.system, &composed.user, temperature, self.cfg.max_tokens)
        .await
      {
        Ok(c) => c,
        Err(e) => {
          error!(target: "experiment", problem_id = %problem.id, attempt = attempt_number, error = %e, "Model call failed; aborting problem");
          return ProblemResult::aborted(
            problem,
            attempts,
            prepared.symbol_ids.clone(),
            e.to_string(),
          );
        }
      };

      let extracted = extract::last_boxed_answer(&completion.text);
      let verdict = grade::grade(extracted.as_deref(), &problem.answer);
      let correct = verdict.is_correct;
      if !correct {
        debug!(
          target: "experiment",
          problem_id = %problem.id,
          attempt = attempt_number,
          method = %verdict.method,
          boxed_candidates = extract::boxed_answers(&completion.text).len(),
          "Attempt graded incorrect"
        );
      }

      attempts.push(crate::domain::Attempt {
        problem_id: problem.id.clone(),
        attempt_number,
        system_prompt: composed.system.clone(),
        user_prompt: composed.user.clone(),
        response: completion.text,
        extracted_answer: extracted,
        is_correct: correct,
        comparison_method: verdict.method,
        elapsed_secs: completion.elapsed_secs,
      });

      if correct {
        break;
      }
    }

    let result = ProblemResult::from_attempts(problem, attempts, prepared.symbol_ids.clone());
    info!(
      target: "experiment",
      problem_id = %problem.id,
      outcome = %result.outcome,
      attempts = result.attempts_used,
      "Problem finished"
    );
    result
  }

  /// Run a whole prepared set sequentially, persisting each result as it
  /// lands. Problems in `skip` (already completed in a resumed run) are
  /// not re-run.
  pub async fn run_all(
    &self,
    prepared: &[PreparedProblem],
    storage: Option<&ResultsStorage>,
    skip: &HashSet<String>,
  ) -> Result<Vec<ProblemResult>> {
    let total = prepared.len();
    let mut results = Vec::with_capacity(total);

    for (i, p) in prepared.iter().enumerate() {
      if skip.contains(&p.problem.id) {
        info!(target: "experiment", problem_id = %p.problem.id, "Already completed; skipping");
        continue;
      }
      info!(target: "experiment", current = i + 1, total, problem_id = %p.problem.id, "Running problem");

      let result = self.run_problem(p).await;
      if let Some(storage) = storage {
        storage.save_result(&result)?;
      }
      results.push(result);
    }

    Ok(results)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::Outcome;
  use crate::ollama::{ChatBackend, Completion, ModelError};
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  // Scripted backend: pops canned responses in order; `None` simulates a
  // transport failure. Repeats the last response once the script runs dry.
  struct Scripted {
    responses: Mutex<Vec<Option<String>>>,
    calls: AtomicUsize,
  }

  impl Scripted {
    fn new(responses: &[Option<&str>]) -> Self {
      Self {
        responses: Mutex::new(responses.iter().map(|r| r.map(|s| s.to_string())).collect()),
        calls: AtomicUsize::new(0),
      }
    }

    fn call_count(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl ChatBackend for Scripted {
    async fn chat(
      &self,
      _system: &str,
      _user: &str,
      _temperature: f32,
      _max_tokens: u32,
    ) -> Result<Completion, ModelError> {
      let n = self.calls.fetch_add(1, Ordering::SeqCst);
      let responses = self.responses.lock().expect("lock");
      let scripted = responses.get(n).or_else(|| responses.last()).cloned().flatten();
      match scripted {
        Some(text) => Ok(Completion { text, elapsed_secs: 0.01 }),
        None => Err(ModelError::Unavailable("connection refused".into())),
      }
    }
  }

  fn problem() -> Problem {
    Problem {
      id: "math_00042".into(),
      statement: "What is $6 \\times 7$?".into(),
      solution: String::new(),
      answer: "42".into(),
      level: 1,
      problem_type: "prealgebra".into(),
      threshold_score: 0.3,
    }
  }

  fn prepared() -> PreparedProblem {
    PreparedProblem { problem: problem(), context: String::new(), symbol_ids: vec![] }
  }

  fn harness(backend: Scripted, mode: Mode, max_attempts: u32) -> Harness<Scripted> {
    Harness::new(
      backend,
      Prompts::default(),
      Strategy::MinimalistCot,
      RunConfig { mode, max_attempts, temperature: 0.6, max_tokens: 1024 },
    )
  }

  #[tokio::test]
  async fn attempt_cap_respected_when_never_correct() {
    let h = harness(Scripted::new(&[Some("nope, \\boxed{41}")]), Mode::BestOfN, 5);
    let r = h.run_problem(&prepared()).await;
    assert_eq!(h.backend.call_count(), 5, "exactly max_attempts calls");
    assert_eq!(r.outcome, Outcome::Failed);
    assert_eq!(r.attempts_used, 5);
    assert_eq!(r.final_answer, "41");
    assert!(!r.is_correct);
  }

  #[tokio::test]
  async fn first_correct_attempt_terminates_loop() {
    let h = harness(
      Scripted::new(&[Some("\\boxed{40}"), Some("\\boxed{42}"), Some("\\boxed{0}")]),
      Mode::BestOfN,
      5,
    );
    let r = h.run_problem(&prepared()).await;
    assert_eq!(h.backend.call_count(), 2);
    assert_eq!(r.outcome, Outcome::Solved);
    assert_eq!(r.attempts_used, 2);
    assert!(r.is_correct);
    assert_eq!(r.final_answer, "42");
  }

  #[tokio::test]
  async fn greedy_mode_is_single_shot() {
    let h = harness(Scripted::new(&[Some("\\boxed{41}")]), Mode::Greedy, 5);
    let r = h.run_problem(&prepared()).await;
    assert_eq!(h.backend.call_count(), 1);
    assert_eq!(r.outcome, Outcome::Failed);
    assert_eq!(r.attempts_used, 1);
  }

  #[tokio::test]
  async fn missing_box_consumes_an_attempt() {
    let h = harness(
      Scripted::new(&[Some("I cannot find a closed form."), Some("\\boxed{42}")]),
      Mode::BestOfN,
      5,
    );
    let r = h.run_problem(&prepared()).await;
    assert_eq!(r.attempts_used, 2);
    assert_eq!(r.attempts[0].extracted_answer, None);
    assert_eq!(r.attempts[0].comparison_method, "no_answer");
    assert!(r.is_correct);
  }

  #[tokio::test]
  async fn transport_error_aborts_without_retry() {
    let h = harness(Scripted::new(&[Some("\\boxed{41}"), None]), Mode::BestOfN, 5);
    let r = h.run_problem(&prepared()).await;
    assert_eq!(h.backend.call_count(), 2, "no transport-level retry");
    assert_eq!(r.outcome, Outcome::Aborted);
    assert_eq!(r.attempts_used, 1, "completed attempts are kept");
    assert!(r.error.as_deref().unwrap_or_default().contains("connection refused"));
  }

  #[tokio::test]
  async fn run_all_skips_completed_problems() {
    let h = harness(Scripted::new(&[Some("\\boxed{42}")]), Mode::BestOfN, 5);
    let mut skip = HashSet::new();
    skip.insert("math_00042".to_string());
    let results = h.run_all(&[prepared()], None, &skip).await.expect("run");
    assert!(results.is_empty());
    assert_eq!(h.backend.call_count(), 0);
  }
}
