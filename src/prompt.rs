//! Prompt composition with retrieved OpenMath context.
//!
//! Pure functions: identical inputs always produce identical prompts. The
//! symbol context block is shared by both strategies; the strategies
//! differ in where the context lands and how the final-answer instruction
//! is phrased.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::config::Prompts;
use crate::ontology::Symbol;
use crate::util::{collapse_ws, fill_template};

/// How prompts are phrased for a given model family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
  /// Bare problem plus a one-line chain-of-thought trigger; symbol context
  /// (if any) becomes the entire system prompt. Suits instruction-tuned
  /// math models.
  MinimalistCot,
  /// Structured five-step system prompt with the context prepended; the
  /// user message is `Problem: {...}`.
  System2Reflection,
}

impl Strategy {
  /// Default strategy for a model name. Dedicated math models respond
  /// better to the minimalist trigger; general chat models get the
  /// structured preamble.
  pub fn for_model(model: &str) -> Self {
    let m = model.to_lowercase();
    if m.contains("math") || m.contains("qwen") {
      Strategy::MinimalistCot
    } else {
      Strategy::System2Reflection
    }
  }
}

/// A composed prompt ready for inference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposedPrompt {
  pub system: String,
  pub user: String,
}

/// Format retrieved symbols into the definitions block injected into
/// prompts. Returns an empty string when there are no symbols so baseline
/// prompts stay untouched.
pub fn format_symbol_context(symbols: &[Symbol], top_k: usize, header: &str) -> String {
  if symbols.is_empty() || top_k == 0 {
    return String::new();
  }

  let mut lines: Vec<String> = vec![header.to_string(), String::new()];

  for sym in symbols.iter().take(top_k) {
    lines.push(format!("### {}:{}", sym.cd, sym.name));

    if !sym.description.is_empty() {
      lines.push(format!("**Description:** {}", collapse_ws(&sym.description)));
    }

    if !sym.cmp_properties.is_empty() {
      lines.push("**Properties:**".to_string());
      for prop in sym.cmp_properties.iter().take(3) {
        lines.push(format!("  - {}", collapse_ws(prop)));
      }
    }

    if let Some(example) = sym.examples.iter().find(|e| !e.is_empty()) {
      lines.push(format!("**Example:** {}", collapse_ws(example)));
    }

    lines.push(String::new());
  }

  lines.join("\n").trim_end().to_string()
}

/// Compose the system and user prompts for one problem.
pub fn build(prompts: &Prompts, strategy: Strategy, problem: &str, context: &str) -> ComposedPrompt {
  match strategy {
    Strategy::MinimalistCot => ComposedPrompt {
      system: context.to_string(),
      user: format!("{}\n\n{}", problem, prompts.minimalist_trigger),
    },
    Strategy::System2Reflection => {
      let system = if context.is_empty() {
        prompts.system2_system.clone()
      } else {
        format!("{}\n\n{}", context, prompts.system2_system)
      };
      ComposedPrompt {
        system,
        user: fill_template(&prompts.user_template, &[("problem", problem)]),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Prompts;
  use crate::ontology::Symbol;

  fn gcd_symbol() -> Symbol {
    Symbol {
      id: "arith1:gcd".into(),
      cd: "arith1".into(),
      name: "gcd".into(),
      description: "The  greatest common divisor\nof its arguments.".into(),
      type_signature: String::new(),
      cmp_properties: vec!["gcd(a, b) divides a".into(), "gcd(a, b) divides b".into()],
      examples: vec!["gcd(6, 9) = 3".into()],
      sympy_function: Some("sympy.gcd".into()),
    }
  }

  #[test]
  fn context_block_format() {
    let prompts = Prompts::default();
    let ctx = format_symbol_context(&[gcd_symbol()], 5, &prompts.context_header);
    assert!(ctx.starts_with("## Relevant Mathematical Definitions and Properties"));
    assert!(ctx.contains("### arith1:gcd"));
    assert!(ctx.contains("**Description:** The greatest common divisor of its arguments."));
    assert!(ctx.contains("  - gcd(a, b) divides a"));
    assert!(ctx.contains("**Example:** gcd(6, 9) = 3"));
  }

  #[test]
  fn empty_symbols_produce_empty_context() {
    assert_eq!(format_symbol_context(&[], 5, "## header"), "");
    assert_eq!(format_symbol_context(&[gcd_symbol()], 0, "## header"), "");
  }

  #[test]
  fn minimalist_puts_context_in_system_and_trigger_in_user() {
    let prompts = Prompts::default();
    let p = build(&prompts, Strategy::MinimalistCot, "What is 1+1?", "CTX");
    assert_eq!(p.system, "CTX");
    assert!(p.user.starts_with("What is 1+1?"));
    assert!(p.user.ends_with("within \\boxed{}."));
  }

  #[test]
  fn system2_prepends_context_to_preamble() {
    let prompts = Prompts::default();
    let p = build(&prompts, Strategy::System2Reflection, "What is 1+1?", "CTX");
    assert!(p.system.starts_with("CTX\n\n"));
    assert!(p.system.contains("BREAKDOWN"));
    assert_eq!(p.user, "Problem: What is 1+1?");

    let baseline = build(&prompts, Strategy::System2Reflection, "What is 1+1?", "");
    assert!(baseline.system.starts_with("You are an expert mathematician"));
  }

  #[test]
  fn composition_is_deterministic() {
    let prompts = Prompts::default();
    let a = build(&prompts, Strategy::MinimalistCot, "P", "C");
    let b = build(&prompts, Strategy::MinimalistCot, "P", "C");
    assert_eq!(a, b);
  }

  #[test]
  fn strategy_selection_by_model_name() {
    assert_eq!(Strategy::for_model("qwen2.5-math-7b"), Strategy::MinimalistCot);
    assert_eq!(Strategy::for_model("gemma2:9b"), Strategy::System2Reflection);
  }
}
