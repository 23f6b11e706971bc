use serde_yaml::Value as YamlValue;

use crate::codec::decode_text;
use crate::links::ProxyScheme;

#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
  /// Base64 subscription; payload is the decoded text.
  Base64(String),
  /// Structured multi-proxy document (Clash-style YAML).
  Structured(YamlValue),
  /// Anything else; payload is the input unchanged.
  Unknown(String),
}

impl Classified {
  pub fn kind(&self) -> &'static str {
    match self {
      Classified::Base64(_) => "base64",
      Classified::Structured(_) => "structured",
      Classified::Unknown(_) => "unknown",
    }
  }
}

/// Never fails. Single proxy links should be recognised by scheme before
/// calling this: a bare link is neither base64 nor a structured document.
pub fn classify(blob: &str) -> Classified {
  if let Ok(text) = decode_text(blob.trim()) {
    return Classified::Base64(text);
  }
  match serde_yaml::from_str::<YamlValue>(blob) {
    Ok(doc @ (YamlValue::Mapping(_) | YamlValue::Sequence(_))) => Classified::Structured(doc),
    _ => Classified::Unknown(blob.to_string()),
  }
}

/// True when at least one line starts with a supported proxy scheme.
pub fn looks_like_link_list(text: &str) -> bool {
  text.lines().any(|line| ProxyScheme::detect(line.trim()).is_some())
}

/// Non-empty lines of a link list, split on `\n` or `\r\n`.
pub fn link_lines(text: &str) -> impl Iterator<Item = &str> {
  text
    .split('\n')
    .map(|line| line.strip_suffix('\r').unwrap_or(line))
    .filter(|line| !line.trim().is_empty())
}
