//! Keyword-based retrieval of OpenMath symbols.
//!
//! Each query term resolves through the index (direct keyword hits),
//! operator aliases, and synonym expansion; symbols are ranked by how many
//! distinct terms matched them. The top-K symbols feed the prompt builder.

use std::collections::HashMap;

use tracing::debug;

use crate::ontology::{KnowledgeBase, Symbol, SymbolIndex};

/// Symbols retrieved for one problem, ranked best-first.
#[derive(Clone, Debug, Default)]
pub struct Retrieval {
  pub query_terms: Vec<String>,
  pub symbol_ids: Vec<String>,
  pub symbols: Vec<Symbol>,
  /// Number of matching query terms per symbol id.
  pub scores: HashMap<String, usize>,
}

pub struct Retriever {
  kb: KnowledgeBase,
  index: SymbolIndex,
}

impl Retriever {
  pub fn new(kb: KnowledgeBase, index: SymbolIndex) -> Self {
    Self { kb, index }
  }

  /// Retrieve up to `max_symbols` symbols matching at least `min_score`
  /// of the query terms. Ties rank alphabetically by id so results are
  /// deterministic.
  pub fn retrieve(&self, terms: &[String], max_symbols: usize, min_score: usize) -> Retrieval {
    let mut matches: HashMap<String, usize> = HashMap::new();

    for term in terms {
      let term = term.to_lowercase();
      for symbol_id in self.resolve_term(&term) {
        let known = match self.kb.get(&symbol_id) {
          Some(sym) => sym.is_mathematical(),
          None => false,
        };
        if known {
          *matches.entry(symbol_id).or_insert(0) += 1;
        }
      }
    }

    let mut scored: Vec<(String, usize)> = matches
      .into_iter()
      .filter(|(_, score)| *score >= min_score)
      .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(max_symbols);

    let mut result = Retrieval {
      query_terms: terms.to_vec(),
      ..Default::default()
    };
    for (symbol_id, score) in scored {
      if let Some(sym) = self.kb.get(&symbol_id) {
        result.symbols.push(sym.clone());
        result.symbol_ids.push(symbol_id.clone());
        result.scores.insert(symbol_id, score);
      }
    }

    debug!(target: "openmath_bench", terms = terms.len(), symbols = result.symbols.len(), "Symbol retrieval");
    result
  }

  /// Resolve one lowercase term to symbol ids, deduplicated with order
  /// preserved: direct index hit, then alias, then synonym targets looked
  /// back up through the index.
  fn resolve_term(&self, term: &str) -> Vec<String> {
    let mut matched: Vec<String> = Vec::new();

    if let Some(ids) = self.index.index.get(term) {
      matched.extend(ids.iter().cloned());
    }
    if let Some(ids) = self.index.aliases.get(term) {
      matched.extend(ids.iter().cloned());
    }
    if let Some(targets) = self.index.synonyms.get(term) {
      for target in targets {
        if let Some(ids) = self.index.index.get(target) {
          matched.extend(ids.iter().cloned());
        }
      }
    }

    let mut seen = std::collections::HashSet::new();
    matched.retain(|id| seen.insert(id.clone()));
    matched
  }
}
