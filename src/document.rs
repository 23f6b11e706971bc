//! Masking of structured (Clash-style) multi-proxy documents.

use serde_yaml::{Mapping, Value as YamlValue};

use crate::codec::{random_host, random_token, random_uuid};
use crate::replacements::ReplacementMap;

fn y_map_get_mut<'a>(m: &'a mut Mapping, key: &str) -> Option<&'a mut YamlValue> {
  m.iter_mut()
    .find(|(k, _)| k.as_str() == Some(key))
    .map(|(_, v)| v)
}

fn y_scalar(v: &YamlValue) -> Option<String> {
  match v {
    YamlValue::String(s) => Some(s.clone()),
    YamlValue::Number(n) => Some(n.to_string()),
    YamlValue::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

/// Swaps the scalar at `key` for `placeholder`, recording the original.
fn swap_field(record: &mut Mapping, key: &str, placeholder: String, map: &mut ReplacementMap) -> bool {
  let Some(slot) = y_map_get_mut(record, key) else {
    return false;
  };
  let Some(original) = y_scalar(slot).filter(|s| !s.is_empty()) else {
    return false;
  };
  *slot = YamlValue::String(placeholder.clone());
  map.insert(placeholder, original);
  true
}

/// Masks `server`, `password` and `uuid` of every record under `proxies`,
/// each record with its own placeholders. Other fields pass through in order.
///
/// Returns the re-serialized document, or `None` when it has no `proxies` list.
pub fn mask_document(mut doc: YamlValue, map: &mut ReplacementMap) -> Option<String> {
  let proxies = doc
    .as_mapping_mut()
    .and_then(|m| y_map_get_mut(m, "proxies"))
    .and_then(|v| v.as_sequence_mut())?;

  for proxy in proxies.iter_mut() {
    let Some(record) = proxy.as_mapping_mut() else {
      continue;
    };
    if !swap_field(record, "server", random_host(12), map) {
      continue;
    }
    swap_field(record, "password", random_token(12), map);
    swap_field(record, "uuid", random_uuid(), map);
  }

  serde_yaml::to_string(&doc).ok()
}
