//! OpenMath knowledge base: a string-keyed lookup of symbol entries.
//!
//! Symbol entries are static reference data copied out of the OpenMath
//! content dictionaries (descriptions, formal properties, examples). They
//! carry no executable semantics here; the harness only formats them into
//! prompts.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Content dictionaries that hold protocol/encoding metadata rather than
/// mathematics. Symbols from these pollute retrieval and are excluded.
pub const NON_MATHEMATICAL_CDS: &[&str] = &[
  "meta", "metagrp", "metasig", "error", "scscp1", "scscp2", "altenc", "mathmlattr", "sts",
  "mathmltypes",
];

/// One ontology symbol, e.g. `arith1:gcd`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Symbol {
  pub id: String,
  pub cd: String,
  pub name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub type_signature: String,
  /// Formal (commented) mathematical properties.
  #[serde(default)]
  pub cmp_properties: Vec<String>,
  #[serde(default)]
  pub examples: Vec<String>,
  /// SymPy function this symbol maps to, when one exists.
  #[serde(default)]
  pub sympy_function: Option<String>,
}

impl Symbol {
  pub fn is_mathematical(&self) -> bool {
    !NON_MATHEMATICAL_CDS.contains(&self.cd.as_str())
  }
}

#[derive(Debug, Deserialize)]
struct KnowledgeBaseFile {
  #[serde(default)]
  symbols: HashMap<String, Symbol>,
}

/// The full symbol table, keyed by `cd:name` id.
#[derive(Clone, Debug, Default)]
pub struct KnowledgeBase {
  symbols: HashMap<String, Symbol>,
}

impl KnowledgeBase {
  pub fn load(path: &Path) -> Result<Self> {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading knowledge base {}", path.display()))?;
    let file: KnowledgeBaseFile = serde_json::from_str(&raw)
      .with_context(|| format!("parsing knowledge base {}", path.display()))?;
    let kb = Self::from_symbols(file.symbols.into_values());
    info!(target: "openmath_bench", path = %path.display(), symbols = kb.len(), "Loaded knowledge base");
    Ok(kb)
  }

  pub fn from_symbols(symbols: impl IntoIterator<Item = Symbol>) -> Self {
    Self {
      symbols: symbols.into_iter().map(|s| (s.id.clone(), s)).collect(),
    }
  }

  pub fn get(&self, id: &str) -> Option<&Symbol> {
    self.symbols.get(id)
  }

  #[allow(dead_code)]
  pub fn contains(&self, id: &str) -> bool {
    self.symbols.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }

  /// All symbols belonging to one content dictionary.
  #[allow(dead_code)]
  pub fn symbols_for_cd(&self, cd: &str) -> Vec<&Symbol> {
    let mut out: Vec<&Symbol> = self.symbols.values().filter(|s| s.cd == cd).collect();
    out.sort_by(|a, b| a.id.cmp(&b.id));
    out
  }
}

#[derive(Debug, Deserialize, Default)]
struct IndexFile {
  #[serde(default)]
  index: HashMap<String, Vec<String>>,
  #[serde(default)]
  aliases: HashMap<String, Vec<String>>,
  #[serde(default)]
  synonyms: HashMap<String, Vec<String>>,
}

/// Keyword index over the knowledge base: direct keyword → symbol ids,
/// operator aliases ("+" → arith1:plus), and synonym expansion
/// ("sine" → "sin").
#[derive(Clone, Debug, Default)]
pub struct SymbolIndex {
  pub index: HashMap<String, Vec<String>>,
  pub aliases: HashMap<String, Vec<String>>,
  pub synonyms: HashMap<String, Vec<String>>,
}

impl SymbolIndex {
  pub fn load(path: &Path) -> Result<Self> {
    let raw =
      std::fs::read_to_string(path).with_context(|| format!("reading index {}", path.display()))?;
    let file: IndexFile =
      serde_json::from_str(&raw).with_context(|| format!("parsing index {}", path.display()))?;
    info!(target: "openmath_bench", path = %path.display(), keywords = file.index.len(), "Loaded keyword index");
    Ok(Self {
      index: file.index,
      aliases: file.aliases,
      synonyms: file.synonyms,
    })
  }

  /// All keys a keyword extractor may usefully emit (keywords, aliases,
  /// synonym phrases).
  pub fn known_terms(&self) -> impl Iterator<Item = &String> {
    self
      .index
      .keys()
      .chain(self.aliases.keys())
      .chain(self.synonyms.keys())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn symbol(id: &str, desc: &str, sympy: Option<&str>) -> Symbol {
    let (cd, name) = id.split_once(':').expect("cd:name id");
    Symbol {
      id: id.into(),
      cd: cd.into(),
      name: name.into(),
      description: desc.into(),
      type_signature: String::new(),
      cmp_properties: vec![],
      examples: vec![],
      sympy_function: sympy.map(|s| s.to_string()),
    }
  }

  #[test]
  fn lookup_by_id() {
    let kb = KnowledgeBase::from_symbols([
      symbol("arith1:gcd", "greatest common divisor", Some("sympy.gcd")),
      symbol("transc1:sin", "sine", Some("sympy.sin")),
    ]);
    assert_eq!(kb.len(), 2);
    assert!(kb.contains("arith1:gcd"));
    assert_eq!(kb.get("transc1:sin").map(|s| s.cd.as_str()), Some("transc1"));
    assert!(kb.get("arith1:lcm").is_none());
  }

  #[test]
  fn metadata_cds_are_not_mathematical() {
    let s = symbol("meta:CDName", "name of a CD", None);
    assert!(!s.is_mathematical());
    assert!(symbol("arith1:plus", "addition", None).is_mathematical());
  }

  #[test]
  fn symbols_for_cd_sorted_by_id() {
    let kb = KnowledgeBase::from_symbols([
      symbol("arith1:plus", "", None),
      symbol("arith1:gcd", "", None),
      symbol("transc1:sin", "", None),
    ]);
    let ids: Vec<&str> = kb.symbols_for_cd("arith1").iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["arith1:gcd", "arith1:plus"]);
  }
}
