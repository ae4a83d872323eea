//! Boxed-answer extraction from free-form model output.
//!
//! Solutions mark their final answer with the LaTeX `\boxed{...}`
//! convention. Contents may themselves contain braces (fractions, matrix
//! environments), so extraction tracks `{}` depth instead of using a
//! regular expression. Only curly braces participate in depth tracking;
//! `\lfloor`/`\rfloor` and friends pass through verbatim.

const BOX_MARKER: &str = "\\boxed{";

/// Contents of the last `\boxed{...}` in `text`, or `None` if there is no
/// complete boxed answer. When a response contains several boxes (some
/// malformed outputs do), the last one is taken as the final answer.
pub fn last_boxed_answer(text: &str) -> Option<String> {
  boxed_occurrences(text).into_iter().last()
}

/// All complete `\boxed{...}` contents in order of appearance,
/// deduplicated with order preserved.
pub fn boxed_answers(text: &str) -> Vec<String> {
  let mut seen: Vec<String> = Vec::new();
  for ans in boxed_occurrences(text) {
    if !seen.contains(&ans) {
      seen.push(ans);
    }
  }
  seen
}

/// Every complete boxed occurrence, in order, untrimmed duplicates included.
fn boxed_occurrences(text: &str) -> Vec<String> {
  let mut out = Vec::new();
  let mut search_from = 0;
  while let Some(rel) = text[search_from..].find(BOX_MARKER) {
    let content_start = search_from + rel + BOX_MARKER.len();
    match read_braced(&text[content_start..]) {
      Some((inner, consumed)) => {
        let trimmed = inner.trim();
        if !trimmed.is_empty() {
          out.push(trimmed.to_string());
        }
        search_from = content_start + consumed;
      }
      // Unterminated box: nothing usable from here on.
      None => break,
    }
  }
  out
}

/// Read up to the `}` matching an already-consumed `{`. Returns the inner
/// text and the number of bytes consumed including the closing brace.
fn read_braced(s: &str) -> Option<(&str, usize)> {
  let mut depth = 1usize;
  for (i, ch) in s.char_indices() {
    match ch {
      '{' => depth += 1,
      '}' => {
        depth -= 1;
        if depth == 0 {
          return Some((&s[..i], i + 1));
        }
      }
      _ => {}
    }
  }
  None
}
