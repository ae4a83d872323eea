//! Keyword extraction from math problem statements.
//!
//! Turns free-form problem text (English prose + LaTeX) into a flat list
//! of retrieval terms: known math functions, single-word math terms,
//! multi-word phrases, and operators. Asymptote `[asy]` figure blocks are
//! stripped first; LaTeX commands are mapped to plain keywords before
//! tokenization since they are case-sensitive.

use once_cell::sync::Lazy;
use regex::Regex;

static ASY_BLOCK: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?is)\[asy\].*?\[/asy\]").expect("asy block regex"));

static TOKEN: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"[a-zA-Z_][a-zA-Z0-9_]*|\d+\.?\d*").expect("token regex"));

/// LaTeX commands mapped to extractable keywords. Applied longest-first so
/// `\sinh` is not shadowed by `\sin`.
const LATEX_SYMBOLS: &[(&str, &str)] = &[
  (r"\lceil", " ceiling "),
  (r"\rceil", " ceiling "),
  (r"\lfloor", " floor "),
  (r"\rfloor", " floor "),
  (r"\frac", " fraction "),
  (r"\sqrt", " sqrt "),
  (r"\sinh", " sinh "),
  (r"\cosh", " cosh "),
  (r"\tanh", " tanh "),
  (r"\arcsin", " arcsin "),
  (r"\arccos", " arccos "),
  (r"\arctan", " arctan "),
  (r"\sin", " sin "),
  (r"\cos", " cos "),
  (r"\tan", " tan "),
  (r"\cot", " cot "),
  (r"\sec", " sec "),
  (r"\csc", " csc "),
  (r"\ln", " ln "),
  (r"\log", " log "),
  (r"\exp", " exp "),
  (r"\sum", " sum "),
  (r"\prod", " product "),
  (r"\int", " integral "),
  (r"\gcd", " gcd "),
  (r"\lcm", " lcm "),
  (r"\bmod", " mod "),
  (r"\pmod", " mod "),
  (r"\mod", " mod "),
  (r"\lim", " limit "),
  (r"\infty", " infinity "),
  (r"\pm", " plus_minus "),
  (r"\cdot", " times "),
  (r"\times", " times "),
  (r"\div", " divide "),
  (r"\overline", " conjugate "),
  (r"\cup", " union "),
  (r"\cap", " intersection "),
  (r"\emptyset", " empty_set "),
  (r"\leq", " <= "),
  (r"\le", " <= "),
  (r"\geq", " >= "),
  (r"\ge", " >= "),
  (r"\neq", " != "),
  (r"\ne", " != "),
  (r"\lvert", " absolute_value "),
  (r"\rvert", " absolute_value "),
];

/// Multi-word mathematical phrases, longest first so partial phrases do
/// not re-match.
const MATH_PHRASES: &[&str] = &[
  "greatest common divisor",
  "least common multiple",
  "lowest common multiple",
  "highest common factor",
  "less than or equal",
  "greater than or equal",
  "binomial coefficient",
  "standard deviation",
  "complex conjugate",
  "natural logarithm",
  "absolute value",
  "imaginary part",
  "geometric mean",
  "arithmetic mean",
  "inverse tangent",
  "inverse cosine",
  "square root",
  "cube root",
  "dot product",
  "cross product",
  "inverse sine",
  "n choose k",
  "real part",
];

const MATH_FUNCTIONS: &[&str] = &[
  "sin", "cos", "tan", "cot", "sec", "csc", "arcsin", "arccos", "arctan", "sinh", "cosh", "tanh",
  "log", "ln", "exp", "gcd", "lcm", "mod", "abs", "sqrt", "lim", "limit", "floor", "ceil",
  "ceiling", "factorial",
];

const MATH_TERMS: &[&str] = &[
  "sum", "product", "quotient", "remainder", "difference", "fraction", "exponent", "power", "root",
  "derivative", "integral", "infinity", "continuous", "prime", "composite", "divisor", "divisible",
  "multiple", "factor", "modulo", "modulus", "union", "intersection", "complement", "subset",
  "cardinality", "equation", "inequality", "polynomial", "quadratic", "linear", "coefficient",
  "sine", "cosine", "tangent", "angle", "radian", "area", "perimeter", "volume", "circumference",
  "radius", "diameter", "triangle", "circle", "matrix", "vector", "determinant", "eigenvalue",
  "mean", "median", "probability", "distribution", "pi", "conjugate", "permutation", "combination",
];

/// Common English words that appear in problem statements but are not
/// mathematical terms. Matching them against symbol descriptions dilutes
/// retrieval scores.
const STOP_WORDS: &[&str] = &[
  "a", "an", "the", "this", "that", "these", "those", "is", "are", "was", "were", "be", "been",
  "has", "have", "had", "do", "does", "did", "find", "calculate", "compute", "solve", "determine",
  "evaluate", "show", "prove", "express", "simplify", "answer", "write", "let", "given", "of",
  "in", "to", "for", "with", "on", "at", "by", "from", "into", "between", "and", "or", "but",
  "if", "then", "when", "while", "it", "its", "they", "their", "we", "you", "what", "which",
  "how", "why", "all", "each", "every", "some", "such", "no", "any", "only", "same", "so",
  "than", "can", "will", "may", "must", "should", "would", "could", "about", "as", "using",
  "number", "numbers", "value", "values", "form", "many", "much", "first", "second", "third",
  "last", "total", "two", "three", "four", "five", "positive", "negative", "real", "smallest",
  "largest", "greater", "smaller", "image", "line", "end", "cases", "begin", "text", "terms",
  "term", "order", "degree", "base", "side", "sides", "point", "times", "b", "c", "d", "e", "f",
  "g", "h", "i", "j", "k", "l", "m", "n", "o", "p", "q", "r", "s", "t", "u", "v", "w", "x", "y",
  "z",
];

const OPERATORS: &[&str] = &["**", "<=", ">=", "!=", "==", "+", "-", "*", "/", "^", "=", "<", ">", "%", "!"];

/// Result of keyword extraction from one problem statement.
#[derive(Clone, Debug, Default)]
pub struct Extraction {
  pub keywords: Vec<String>,
  pub operators: Vec<String>,
  pub functions: Vec<String>,
  pub phrases: Vec<String>,
}

impl Extraction {
  /// All extracted terms combined, extraction-order preserved.
  pub fn all_terms(&self) -> Vec<String> {
    self
      .keywords
      .iter()
      .chain(self.operators.iter())
      .chain(self.functions.iter())
      .chain(self.phrases.iter())
      .cloned()
      .collect()
  }
}

/// Extract retrieval terms from a problem statement.
///
/// `extra_terms` lets the caller pass index-known keywords (from the
/// symbol index) so that vocabulary outside the built-in tables is still
/// picked up.
pub fn extract(problem: &str, extra_terms: &[String]) -> Extraction {
  let mut result = Extraction::default();

  let cleaned = ASY_BLOCK.replace_all(problem, " ");
  let cleaned = convert_latex_symbols(&cleaned);
  let mut text = cleaned.to_lowercase();

  // Phrases first, before tokenizing tears them apart.
  for phrase in MATH_PHRASES {
    if text.contains(phrase) {
      result.phrases.push((*phrase).to_string());
      text = text.replace(phrase, " ");
    }
  }

  for op in OPERATORS {
    if text.contains(op) {
      result.operators.push((*op).to_string());
    }
  }

  let tokens: Vec<String> = TOKEN
    .find_iter(&text)
    .map(|m| m.as_str().to_lowercase())
    .collect();

  for token in &tokens {
    if MATH_FUNCTIONS.contains(&token.as_str()) {
      result.functions.push(token.clone());
    }
  }

  for token in &tokens {
    if STOP_WORDS.contains(&token.as_str()) {
      continue;
    }
    if MATH_TERMS.contains(&token.as_str()) || extra_terms.iter().any(|t| t == token) {
      result.keywords.push(token.clone());
    }
  }

  dedupe_in_place(&mut result.keywords);
  dedupe_in_place(&mut result.operators);
  dedupe_in_place(&mut result.functions);
  dedupe_in_place(&mut result.phrases);
  result
}

/// Map LaTeX commands to keyword tokens. Longest command first so prefixes
/// (`\sin` inside `\sinh`) do not clobber longer commands.
fn convert_latex_symbols(text: &str) -> String {
  static SORTED: Lazy<Vec<(&str, &str)>> = Lazy::new(|| {
    let mut v: Vec<(&str, &str)> = LATEX_SYMBOLS.to_vec();
    v.sort_by_key(|(cmd, _)| std::cmp::Reverse(cmd.len()));
    v
  });
  let mut out = text.to_string();
  for (cmd, keyword) in SORTED.iter() {
    out = out.replace(cmd, keyword);
  }
  out
}

fn dedupe_in_place(items: &mut Vec<String>) {
  let mut seen = std::collections::HashSet::new();
  items.retain(|item| seen.insert(item.clone()));
}
