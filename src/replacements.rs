use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Placeholder -> original value, scoped to a single conversion request.
///
/// Placeholders are random and are not checked against each other or against
/// the text they are inserted into; a collision is possible but improbable at
/// the token lengths used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplacementMap {
  entries: HashMap<String, String>,
}

impl ReplacementMap {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert(&mut self, placeholder: impl Into<String>, original: impl Into<String>) {
    self.entries.insert(placeholder.into(), original.into());
  }

  pub fn get(&self, placeholder: &str) -> Option<&str> {
    self.entries.get(placeholder).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  /// Replaces every placeholder occurring in `text` with its original value in one pass.
  /// Text that matches no placeholder is left untouched.
  pub fn restore_text(&self, text: &str) -> String {
    let Some(re) = alternation(self.iter().map(|(placeholder, _)| placeholder)) else {
      return text.to_string();
    };
    re.replace_all(text, |caps: &regex::Captures<'_>| {
      let m = &caps[0];
      self.get(m).unwrap_or(m).to_string()
    })
    .into_owned()
  }
}

impl FromIterator<(String, String)> for ReplacementMap {
  fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
    Self {
      entries: iter.into_iter().collect(),
    }
  }
}

/// Regex matching any of `literals`, longest first so a literal never shadows
/// a longer one that starts with it. `None` when there is nothing to match.
pub(crate) fn alternation<'a>(literals: impl IntoIterator<Item = &'a str>) -> Option<Regex> {
  let mut keys: Vec<&str> = literals.into_iter().filter(|k| !k.is_empty()).collect();
  if keys.is_empty() {
    return None;
  }
  keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
  keys.dedup();
  let pattern = keys
    .iter()
    .map(|k| regex::escape(k))
    .collect::<Vec<_>>()
    .join("|");
  Regex::new(&pattern).ok()
}

/// Single-pass replacement of several literals at once. Pairs with an empty
/// `from` are ignored.
pub(crate) fn replace_literals(text: &str, pairs: &[(&str, &str)]) -> String {
  let Some(re) = alternation(pairs.iter().map(|(from, _)| *from)) else {
    return text.to_string();
  };
  re.replace_all(text, |caps: &regex::Captures<'_>| {
    let m = &caps[0];
    pairs
      .iter()
      .find(|(from, _)| *from == m)
      .map(|(_, to)| (*to).to_string())
      .unwrap_or_else(|| m.to_string())
  })
  .into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn map(pairs: &[(&str, &str)]) -> ReplacementMap {
    pairs
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect()
  }

  #[test]
  fn restore_text_replaces_every_occurrence() {
    let m = map(&[("abc123.com", "1.2.3.4"), ("secretxyz", "hunter2")]);
    let text = "server: abc123.com\npassword: secretxyz\nsni: abc123.com\n";
    assert_eq!(
      m.restore_text(text),
      "server: 1.2.3.4\npassword: hunter2\nsni: 1.2.3.4\n"
    );
  }

  #[test]
  fn restore_text_prefers_longer_keys() {
    // A password token that is a prefix of a host placeholder must not win.
    let m = map(&[("tok", "pw"), ("tok.com", "example.org")]);
    assert_eq!(m.restore_text("tok.com tok"), "example.org pw");
  }

  #[test]
  fn restore_text_escapes_keys() {
    let m = map(&[("a.b", "x")]);
    assert_eq!(m.restore_text("a.b aXb"), "x aXb");
  }

  #[test]
  fn empty_map_is_identity() {
    let m = ReplacementMap::new();
    assert_eq!(m.restore_text("nothing to see"), "nothing to see");
  }

  #[test]
  fn replace_literals_does_not_reprocess_output() {
    // "a" -> "b" and "b" -> "a" swap in one pass instead of collapsing.
    assert_eq!(replace_literals("ab", &[("a", "b"), ("b", "a")]), "ba");
  }

  #[test]
  fn serializes_as_plain_object() {
    let m = map(&[("k", "v")]);
    assert_eq!(serde_json::to_string(&m).unwrap(), r#"{"k":"v"}"#);
    let back: ReplacementMap = serde_json::from_str(r#"{"k":"v"}"#).unwrap();
    assert_eq!(back, m);
  }
}
