use regex::Regex;
use std::sync::OnceLock;

use super::{split_scheme, LinkFields};
use crate::replacements::replace_literals;

/// `trojan://` and `vless://`: `<scheme>://<secret>@<server>:<port>...`.
#[derive(Debug)]
pub(super) struct UserinfoLink {
  prefix: String,
  body: String,
  secret: String,
  server: String,
}

fn pattern() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(r"^(?i:trojan|vless)://([^@/?#]+)@(\[[^\]]+\]|[^:/?#@\[\]]+):\d+")
      .expect("static pattern")
  })
}

pub(super) fn parse(link: &str) -> Option<UserinfoLink> {
  let caps = pattern().captures(link)?;
  let (prefix, body) = split_scheme(link)?;
  Some(UserinfoLink {
    prefix: prefix.to_string(),
    body: body.to_string(),
    secret: caps.get(1)?.as_str().to_string(),
    server: caps.get(2)?.as_str().to_string(),
  })
}

impl LinkFields for UserinfoLink {
  fn server(&self) -> &str {
    &self.server
  }

  fn secret(&self) -> Option<&str> {
    Some(&self.secret)
  }

  fn rewrite(&self, server: &str, secret: Option<&str>) -> String {
    let secret = secret.unwrap_or(&self.secret);
    let body = replace_literals(
      &self.body,
      &[(self.secret.as_str(), secret), (self.server.as_str(), server)],
    );
    format!("{}{}", self.prefix, body)
  }
}
