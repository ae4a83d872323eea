//! Syntactic answer grading.
//!
//! An extracted answer is correct when it equals the ground truth after a
//! light textual normalization: surrounding `$` delimiters dropped,
//! `\left`/`\right` sizing commands removed, all whitespace removed.
//! Equality is syntactic, never symbolic or numeric: `3\sqrt{13}` and
//! `\sqrt{117}` are different answers here even though they denote the
//! same value.

use serde::{Deserialize, Serialize};

/// Outcome of one comparison, tagged with the method that decided it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Verdict {
  pub is_correct: bool,
  /// "exact_match", "normalized_match", "no_match", or "no_answer".
  pub method: String,
  pub normalized_predicted: String,
  pub normalized_ground_truth: String,
}

/// Normalize an answer string for comparison. Idempotent: normalizing an
/// already-normalized string yields the same string.
pub fn normalize(s: &str) -> String {
  let s = s.trim().trim_matches('$');
  let s = s.replace("\\left", "").replace("\\right", "");
  s.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Compare an extracted answer (possibly absent) against the ground truth.
pub fn grade(extracted: Option<&str>, ground_truth: &str) -> Verdict {
  let predicted = match extracted {
    Some(p) if !p.trim().is_empty() => p,
    _ => {
      return Verdict {
        is_correct: false,
        method: "no_answer".into(),
        normalized_predicted: String::new(),
        normalized_ground_truth: normalize(ground_truth),
      }
    }
  };

  if predicted.trim() == ground_truth.trim() {
    return Verdict {
      is_correct: true,
      method: "exact_match".into(),
      normalized_predicted: predicted.trim().into(),
      normalized_ground_truth: ground_truth.trim().into(),
    };
  }

  let norm_pred = normalize(predicted);
  let norm_truth = normalize(ground_truth);
  let matched = !norm_truth.is_empty() && norm_pred == norm_truth;
  Verdict {
    is_correct: matched,
    method: if matched { "normalized_match" } else { "no_match" }.into(),
    normalized_predicted: norm_pred,
    normalized_ground_truth: norm_truth,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalization_is_idempotent() {
    let inputs = [
      "\\left( 3, \\frac{\\pi}{2} \\right)",
      "$52_8$",
      "  3\\sqrt{13} ",
      "\\begin{pmatrix}1\\\\2\\end{pmatrix}",
    ];
    for s in inputs {
      let once = normalize(s);
      assert_eq!(normalize(&once), once, "not idempotent for {s:?}");
    }
  }

  #[test]
  fn whitespace_and_sizing_commands_are_insignificant() {
    let v = grade(Some("\\left(3, \\frac{\\pi}{2}\\right)"), "\\left( 3, \\frac{\\pi}{2} \\right)");
    assert!(v.is_correct);
    assert_eq!(v.method, "normalized_match");
  }

  #[test]
  fn exact_match_is_reported_as_such() {
    let v = grade(Some("52_8"), "52_8");
    assert!(v.is_correct);
    assert_eq!(v.method, "exact_match");
  }

  #[test]
  fn dollar_delimiters_are_insignificant() {
    let v = grade(Some("$52_8$"), "52_8");
    assert!(v.is_correct);
  }

  #[test]
  fn mathematically_equal_but_textually_different_is_wrong() {
    // Equality is syntactic, not semantic.
    let v = grade(Some("3\\sqrt{13}"), "\\sqrt{117}");
    assert!(!v.is_correct);
    assert_eq!(v.method, "no_match");
  }

  #[test]
  fn missing_answer_is_incorrect_not_a_crash() {
    let v = grade(None, "42");
    assert!(!v.is_correct);
    assert_eq!(v.method, "no_answer");

    let v = grade(Some("   "), "42");
    assert!(!v.is_correct);
    assert_eq!(v.method, "no_answer");
  }
}
