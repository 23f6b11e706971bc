use serde_json::Value as JsonValue;

use super::{split_scheme, LinkFields};
use crate::codec::{decode_text, Base64Style};
use crate::replacements::replace_literals;

/// `vmess://<base64(json)>`; `add` is the server, `id` the user UUID.
#[derive(Debug)]
pub(super) struct VmessLink {
  prefix: String,
  style: Base64Style,
  json: String,
  server: String,
  id: String,
}

fn json_get_str<'a>(obj: &'a JsonValue, key: &str) -> Option<&'a str> {
  obj
    .get(key)
    .and_then(|v| v.as_str())
    .filter(|s| !s.trim().is_empty())
}

pub(super) fn parse(link: &str) -> Option<VmessLink> {
  let (prefix, body) = split_scheme(link)?;
  let body = body.trim();
  let json = decode_text(body).ok()?;
  let obj: JsonValue = serde_json::from_str(&json).ok()?;
  let server = json_get_str(&obj, "add")?.to_string();
  let id = json_get_str(&obj, "id")?.to_string();

  // Escaped forms would survive a literal rewrite unmasked.
  if !json.contains(&server) || !json.contains(&id) {
    return None;
  }

  Some(VmessLink {
    prefix: prefix.to_string(),
    style: Base64Style::detect(body, true),
    json,
    server,
    id,
  })
}

impl LinkFields for VmessLink {
  fn server(&self) -> &str {
    &self.server
  }

  fn secret(&self) -> Option<&str> {
    Some(&self.id)
  }

  fn styles(&self) -> Vec<Base64Style> {
    vec![self.style]
  }

  fn set_styles(&mut self, styles: &[Base64Style]) {
    if let Some(style) = styles.first() {
      self.style = *style;
    }
  }

  fn rewrite(&self, server: &str, secret: Option<&str>) -> String {
    let id = secret.unwrap_or(&self.id);
    let json = replace_literals(
      &self.json,
      &[(self.server.as_str(), server), (self.id.as_str(), id)],
    );
    format!("{}{}", self.prefix, self.style.encode(json))
  }
}
