use super::{leading_host_port, split_scheme, LinkFields};
use crate::codec::{decode_text, Base64Style};
use crate::replacements::replace_literals;

#[derive(Debug)]
enum Userinfo {
  Encoded(Base64Style),
  Plain,
}

#[derive(Debug)]
enum Form {
  /// `ss://<userinfo>@<host>:<port>[/?plugin][#tag]`
  Sip002 { userinfo: Userinfo, rest: String },
  /// `ss://<base64(method:password@host:port)>[?query][#tag]`
  Legacy {
    style: Base64Style,
    host_port: String,
    suffix: String,
  },
}

#[derive(Debug)]
pub(super) struct SsLink {
  prefix: String,
  method: String,
  password: String,
  server: String,
  form: Form,
}

pub(super) fn parse(link: &str) -> Option<SsLink> {
  let (prefix, body) = split_scheme(link)?;
  let before_hash = body.split('#').next().unwrap_or("");

  if before_hash.contains('@') {
    let (userinfo_raw, rest) = body.split_once('@')?;
    let (method, password, userinfo) = if userinfo_raw.contains(':') {
      let (m, p) = userinfo_raw.split_once(':')?;
      (m.to_string(), p.to_string(), Userinfo::Plain)
    } else {
      let decoded = decode_text(userinfo_raw).ok()?;
      let (m, p) = decoded.split_once(':')?;
      (
        m.to_string(),
        p.to_string(),
        Userinfo::Encoded(Base64Style::detect(userinfo_raw, false)),
      )
    };
    let (server, _port) = leading_host_port(rest)?;
    if method.is_empty() || password.is_empty() {
      return None;
    }
    return Some(SsLink {
      prefix: prefix.to_string(),
      method,
      password,
      server: server.to_string(),
      form: Form::Sip002 {
        userinfo,
        rest: rest.to_string(),
      },
    });
  }

  let split = body.find(['?', '#']).unwrap_or(body.len());
  let (encoded, suffix) = body.split_at(split);
  let decoded = decode_text(encoded).ok()?;
  let (creds, host_port) = decoded.rsplit_once('@')?;
  let (method, password) = creds.split_once(':')?;
  let (server, _port) = leading_host_port(host_port)?;
  if method.is_empty() || password.is_empty() {
    return None;
  }
  Some(SsLink {
    prefix: prefix.to_string(),
    method: method.to_string(),
    password: password.to_string(),
    server: server.to_string(),
    form: Form::Legacy {
      style: Base64Style::detect(encoded, false),
      host_port: host_port.to_string(),
      suffix: suffix.to_string(),
    },
  })
}

impl LinkFields for SsLink {
  fn server(&self) -> &str {
    &self.server
  }

  fn secret(&self) -> Option<&str> {
    Some(&self.password)
  }

  fn styles(&self) -> Vec<Base64Style> {
    match &self.form {
      Form::Sip002 {
        userinfo: Userinfo::Encoded(style),
        ..
      }
      | Form::Legacy { style, .. } => vec![*style],
      Form::Sip002 {
        userinfo: Userinfo::Plain,
        ..
      } => Vec::new(),
    }
  }

  fn set_styles(&mut self, styles: &[Base64Style]) {
    let Some(recorded) = styles.first() else {
      return;
    };
    match &mut self.form {
      Form::Sip002 {
        userinfo: Userinfo::Encoded(style),
        ..
      }
      | Form::Legacy { style, .. } => *style = *recorded,
      Form::Sip002 {
        userinfo: Userinfo::Plain,
        ..
      } => {}
    }
  }

  fn rewrite(&self, server: &str, secret: Option<&str>) -> String {
    let password = secret.unwrap_or(&self.password);
    let creds = format!("{}:{}", self.method, password);
    let swap = [(self.server.as_str(), server)];
    match &self.form {
      Form::Sip002 { userinfo, rest } => {
        let userinfo = match userinfo {
          Userinfo::Encoded(style) => style.encode(&creds),
          Userinfo::Plain => creds,
        };
        format!("{}{}@{}", self.prefix, userinfo, replace_literals(rest, &swap))
      }
      Form::Legacy {
        style,
        host_port,
        suffix,
      } => {
        let body = format!("{}@{}", creds, replace_literals(host_port, &swap));
        format!(
          "{}{}{}",
          self.prefix,
          style.encode(body),
          replace_literals(suffix, &swap)
        )
      }
    }
  }
}
