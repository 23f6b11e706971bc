use regex::Regex;
use std::sync::OnceLock;

use super::{split_scheme, LinkFields};
use crate::replacements::replace_literals;

#[derive(Debug)]
pub(super) struct HysteriaLink {
  prefix: String,
  body: String,
  server: String,
}

fn pattern() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"^(?i:hysteria)://(\[[^\]]+\]|[^:/?#@\[\]]+):\d+(?:[/?#]|$)").expect("static pattern")
  })
}

pub(super) fn parse(link: &str) -> Option<HysteriaLink> {
  let caps = pattern().captures(link)?;
  let (prefix, body) = split_scheme(link)?;
  Some(HysteriaLink {
    prefix: prefix.to_string(),
    body: body.to_string(),
    server: caps.get(1)?.as_str().to_string(),
  })
}

impl LinkFields for HysteriaLink {
  fn server(&self) -> &str {
    &self.server
  }

  fn secret(&self) -> Option<&str> {
    None
  }

  fn rewrite(&self, server: &str, _secret: Option<&str>) -> String {
    let body = replace_literals(&self.body, &[(self.server.as_str(), server)]);
    format!("{}{}", self.prefix, body)
  }
}
