use super::{split_scheme, LinkFields};
use crate::codec::{decode_text, Base64Style};

/// Decoded form: `server:port:protocol:method:obfs:base64(password)/?params`.
#[derive(Debug)]
pub(super) struct SsrLink {
  prefix: String,
  outer: Base64Style,
  server: String,
  port: String,
  protocol: String,
  method: String,
  obfs: String,
  password: String,
  password_style: Base64Style,
  params: String,
  suffix: String,
}

pub(super) fn parse(link: &str) -> Option<SsrLink> {
  let (prefix, body) = split_scheme(link)?;
  let body = body.replace('\r', "");
  let (encoded, suffix) = match body.find('#') {
    Some(idx) => body.split_at(idx),
    None => (body.as_str(), ""),
  };
  let decoded = decode_text(encoded).ok()?;

  let (main, params) = match decoded.find("/?") {
    Some(idx) => decoded.split_at(idx),
    None => match decoded.strip_suffix('/') {
      Some(main) => (main, "/"),
      None => return None,
    },
  };

  let mut fields = main.rsplitn(6, ':');
  let password_b64 = fields.next()?;
  let obfs = fields.next()?;
  let method = fields.next()?;
  let protocol = fields.next()?;
  let port = fields.next()?;
  let server = fields.next()?;
  if server.is_empty() || port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  let password = decode_text(password_b64).ok()?;

  Some(SsrLink {
    prefix: prefix.to_string(),
    outer: Base64Style::detect(encoded, false),
    server: server.to_string(),
    port: port.to_string(),
    protocol: protocol.to_string(),
    method: method.to_string(),
    obfs: obfs.to_string(),
    password,
    password_style: Base64Style::detect(password_b64, false),
    params: params.to_string(),
    suffix: suffix.to_string(),
  })
}

impl LinkFields for SsrLink {
  fn server(&self) -> &str {
    &self.server
  }

  fn secret(&self) -> Option<&str> {
    Some(&self.password)
  }

  fn styles(&self) -> Vec<Base64Style> {
    vec![self.outer, self.password_style]
  }

  fn set_styles(&mut self, styles: &[Base64Style]) {
    if let [outer, password_style] = styles {
      self.outer = *outer;
      self.password_style = *password_style;
    }
  }

  fn rewrite(&self, server: &str, secret: Option<&str>) -> String {
    let password = secret.unwrap_or(&self.password);
    let inner = format!(
      "{}:{}:{}:{}:{}:{}{}",
      server,
      self.port,
      self.protocol,
      self.method,
      self.obfs,
      self.password_style.encode(password),
      self.params
    );
    format!("{}{}{}", self.prefix, self.outer.encode(inner), self.suffix)
  }
}
