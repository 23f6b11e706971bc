use crate::codec::{base64_encode_std, decode_text};
use crate::links::{self, LinkStyles};
use crate::replacements::ReplacementMap;
use crate::sniff::link_lines;

/// How a backend body was recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPath {
  /// Base64 link list: each link recovered structurally.
  Subscription { recovered: usize, dropped: usize },
  /// Anything else: literal placeholder substitution.
  Text,
}

/// Restores original values in a backend response body.
///
/// A body that decodes as base64 is treated as a link list; links that do not
/// recover are dropped and the rest re-encoded as standard base64 joined by
/// `\r\n`. Any other body goes through [`ReplacementMap::restore_text`].
pub fn recover_response(
  body: &str,
  map: &ReplacementMap,
  styles: &LinkStyles,
) -> (String, RecoveryPath) {
  let Ok(decoded) = decode_text(body.trim()) else {
    return (map.restore_text(body), RecoveryPath::Text);
  };

  let mut out = Vec::new();
  let mut dropped = 0usize;
  for line in link_lines(&decoded) {
    match links::recover(line, map, styles) {
      Some(link) => out.push(link),
      None => dropped += 1,
    }
  }
  let recovered = out.len();
  (
    base64_encode_std(out.join("\r\n")),
    RecoveryPath::Subscription { recovered, dropped },
  )
}
