//! Loading harness configuration (prompt templates + data file paths) from TOML.
//!
//! See `HarnessConfig` and `Prompts` for the expected schema. Everything has
//! a compiled-in default so the binary runs with no config file at all.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct HarnessConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub paths: DataPaths,
}

/// Prompt templates used when composing model requests. Defaults match the
/// prompting strategies the harness was tuned with; override in TOML to
/// adjust tone/structure.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  /// Structured-reasoning system prompt (strategy `system2_reflection`).
  pub system2_system: String,
  /// Closing instruction appended to the user prompt (strategy `minimalist_cot`).
  pub minimalist_trigger: String,
  /// Heading placed above the injected symbol definitions.
  pub context_header: String,
  /// User-message template; `{problem}` is replaced with the statement.
  pub user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      system2_system: "You are an expert mathematician. Your goal is to solve challenging mathematical problems correctly.\n\
Follow this strict process:\n\
1. BREAKDOWN: Identify the core question and variables.\n\
2. PLAN: Outline the steps to solve the problem.\n\
3. SOLVE: Execute the steps carefully, showing all work.\n\
4. VERIFY: Double-check your logic and calculations.\n\
5. FORMAT: Put the final answer inside \\boxed{}."
        .into(),
      minimalist_trigger:
        "Please reason step by step, and put your final answer within \\boxed{}.".into(),
      context_header: "## Relevant Mathematical Definitions and Properties".into(),
      user_template: "Problem: {problem}".into(),
    }
  }
}

/// Where the static inputs live: the benchmark problems, the OpenMath
/// knowledge base, and its keyword index.
#[derive(Clone, Debug, Deserialize)]
pub struct DataPaths {
  #[serde(default = "DataPaths::default_problems")]
  pub problems: String,
  #[serde(default = "DataPaths::default_knowledge_base")]
  pub knowledge_base: String,
  #[serde(default = "DataPaths::default_index")]
  pub index: String,
}

impl DataPaths {
  fn default_problems() -> String {
    "data/math500.json".into()
  }
  fn default_knowledge_base() -> String {
    "data/openmath.json".into()
  }
  fn default_index() -> String {
    "data/index.json".into()
  }
}

impl Default for DataPaths {
  fn default() -> Self {
    Self {
      problems: Self::default_problems(),
      knowledge_base: Self::default_knowledge_base(),
      index: Self::default_index(),
    }
  }
}

/// Attempt to load `HarnessConfig` from HARNESS_CONFIG_PATH. On any
/// parsing/IO error, returns None and the compiled-in defaults apply.
pub fn load_config_from_env() -> Option<HarnessConfig> {
  let path = std::env::var("HARNESS_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<HarnessConfig>(&s) {
      Ok(cfg) => {
        info!(target: "openmath_bench", %path, "Loaded harness config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "openmath_bench", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "openmath_bench", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_complete() {
    let cfg = HarnessConfig::default();
    assert!(cfg.prompts.system2_system.contains("\\boxed{}"));
    assert!(cfg.prompts.minimalist_trigger.contains("step by step"));
    assert_eq!(cfg.paths.problems, "data/math500.json");
  }

  #[test]
  fn partial_toml_fills_in_defaults() {
    let cfg: HarnessConfig = toml::from_str(
      r#"
[paths]
problems = "bench/problems.json"
"#,
    )
    .expect("parse");
    assert_eq!(cfg.paths.problems, "bench/problems.json");
    assert_eq!(cfg.paths.index, "data/index.json");
    assert!(cfg.prompts.user_template.contains("{problem}"));
  }
}
