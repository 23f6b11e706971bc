//! Protocol-aware masking and recovery of single proxy links.
//!
//! Every scheme parser locates the same two sensitive fields (server and, for
//! all but hysteria, a secret) and knows how to rebuild the link with other
//! values in their place. Masking rebuilds with fresh placeholders; recovery
//! rebuilds with the originals looked up in the [`ReplacementMap`].

mod hysteria;
mod ss;
mod ssr;
mod trojan;
mod vmess;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::codec::{random_host, random_token, random_uuid, Base64Style};
use crate::replacements::ReplacementMap;
use crate::sniff::link_lines;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyScheme {
  Ss,
  Ssr,
  Vmess,
  Trojan,
  Vless,
  Hysteria,
}

const PREFIXES: [(&str, ProxyScheme); 7] = [
  ("ss://", ProxyScheme::Ss),
  ("ssr://", ProxyScheme::Ssr),
  ("vmess://", ProxyScheme::Vmess),
  ("vmess1://", ProxyScheme::Vmess),
  ("trojan://", ProxyScheme::Trojan),
  ("vless://", ProxyScheme::Vless),
  ("hysteria://", ProxyScheme::Hysteria),
];

impl ProxyScheme {
  /// Scheme of `link` by prefix, ASCII case-insensitive.
  pub fn detect(link: &str) -> Option<Self> {
    let head = link.trim_start();
    PREFIXES.iter().find_map(|(prefix, scheme)| {
      let candidate = head.get(..prefix.len())?;
      candidate.eq_ignore_ascii_case(prefix).then_some(*scheme)
    })
  }

  pub fn name(self) -> &'static str {
    match self {
      ProxyScheme::Ss => "ss",
      ProxyScheme::Ssr => "ssr",
      ProxyScheme::Vmess => "vmess",
      ProxyScheme::Trojan => "trojan",
      ProxyScheme::Vless => "vless",
      ProxyScheme::Hysteria => "hysteria",
    }
  }

  fn host_placeholder(self) -> String {
    match self {
      ProxyScheme::Ss | ProxyScheme::Ssr | ProxyScheme::Hysteria => random_host(12),
      ProxyScheme::Vmess | ProxyScheme::Trojan | ProxyScheme::Vless => random_host(10),
    }
  }

  fn secret_placeholder(self) -> String {
    match self {
      ProxyScheme::Ss | ProxyScheme::Ssr | ProxyScheme::Hysteria => random_token(12),
      ProxyScheme::Vmess | ProxyScheme::Trojan | ProxyScheme::Vless => random_uuid(),
    }
  }

  fn parse(self, link: &str) -> Option<Box<dyn LinkFields>> {
    Some(match self {
      ProxyScheme::Ss => Box::new(ss::parse(link)?),
      ProxyScheme::Ssr => Box::new(ssr::parse(link)?),
      ProxyScheme::Vmess => Box::new(vmess::parse(link)?),
      ProxyScheme::Trojan | ProxyScheme::Vless => Box::new(trojan::parse(link)?),
      ProxyScheme::Hysteria => Box::new(hysteria::parse(link)?),
    })
  }
}

/// Sensitive fields of a parsed link and how to put other values in their place.
trait LinkFields {
  fn server(&self) -> &str;

  fn secret(&self) -> Option<&str>;

  /// Base64 encodings carried by the link, outermost first.
  fn styles(&self) -> Vec<Base64Style> {
    Vec::new()
  }

  /// Replaces the encodings used by [`LinkFields::rewrite`]; same order as `styles`.
  fn set_styles(&mut self, _styles: &[Base64Style]) {}

  /// The link with every occurrence of the current server (and secret) replaced.
  fn rewrite(&self, server: &str, secret: Option<&str>) -> String;
}

/// Base64 shapes of masked links, keyed by host placeholder.
///
/// A masked payload has a different length than the original, so its padding
/// cannot tell how the original was encoded; recovery reads it from here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkStyles {
  by_host: HashMap<String, Vec<Base64Style>>,
}

impl LinkStyles {
  pub fn new() -> Self {
    Self::default()
  }

  fn record(&mut self, host_placeholder: String, styles: Vec<Base64Style>) {
    if !styles.is_empty() {
      self.by_host.insert(host_placeholder, styles);
    }
  }

  fn get(&self, host_placeholder: &str) -> Option<&[Base64Style]> {
    self.by_host.get(host_placeholder).map(Vec::as_slice)
  }
}

/// Masks `link`, recording each placeholder in `map` and its encodings in
/// `styles`. `None` when the link is not a supported scheme or does not parse;
/// nothing is recorded in that case.
pub fn mask(link: &str, map: &mut ReplacementMap, styles: &mut LinkStyles) -> Option<String> {
  let link = link.trim();
  let scheme = ProxyScheme::detect(link)?;
  let fields = scheme.parse(link)?;

  let host = scheme.host_placeholder();
  let secret = fields.secret().map(|_| scheme.secret_placeholder());
  let masked = fields.rewrite(&host, secret.as_deref());

  styles.record(host.clone(), fields.styles());
  map.insert(host, fields.server());
  if let (Some(placeholder), Some(original)) = (secret, fields.secret()) {
    map.insert(placeholder, original);
  }
  Some(masked)
}

/// Inverse of [`mask`]. `None` when the link does not parse or one of its
/// placeholder fields is missing from `map`. Links without recorded styles
/// keep the encoding shape of the masked payload.
pub fn recover(link: &str, map: &ReplacementMap, styles: &LinkStyles) -> Option<String> {
  let link = link.trim();
  let scheme = ProxyScheme::detect(link)?;
  let mut fields = scheme.parse(link)?;
  if let Some(recorded) = styles.get(fields.server()) {
    fields.set_styles(recorded);
  }

  let server = map.get(fields.server())?;
  let secret = match fields.secret() {
    Some(placeholder) => Some(map.get(placeholder)?),
    None => None,
  };
  Some(fields.rewrite(server, secret))
}

/// Masks every line of a link list, dropping lines that do not mask.
pub fn mask_lines(text: &str, map: &mut ReplacementMap, styles: &mut LinkStyles) -> Vec<String> {
  link_lines(text)
    .filter_map(|line| mask(line, map, styles))
    .collect()
}

/// Recovers every line of a link list, dropping lines that do not recover.
pub fn recover_lines(text: &str, map: &ReplacementMap, styles: &LinkStyles) -> Vec<String> {
  link_lines(text)
    .filter_map(|line| recover(line, map, styles))
    .collect()
}

/// Splits `link` after its `scheme://`, keeping the prefix as written.
fn split_scheme(link: &str) -> Option<(&str, &str)> {
  let idx = link.find("://")? + 3;
  Some(link.split_at(idx))
}

/// Host and port at the start of `s` (`host:port...`). Bracketed IPv6 hosts
/// keep their brackets so they can be replaced as one literal.
fn leading_host_port(s: &str) -> Option<(&str, &str)> {
  let (host, after) = if s.starts_with('[') {
    let end = s.find(']')? + 1;
    s.split_at(end)
  } else {
    let end = s.find([':', '/', '?', '#', '@']).unwrap_or(s.len());
    s.split_at(end)
  };
  if host.is_empty() || host == "[]" {
    return None;
  }
  let after = after.strip_prefix(':')?;
  let digits = after
    .find(|c: char| !c.is_ascii_digit())
    .unwrap_or(after.len());
  if digits == 0 {
    return None;
  }
  Some((host, &after[..digits]))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codec::{base64_encode_std, decode_text};

  fn round_trip(link: &str) -> (String, ReplacementMap) {
    let mut map = ReplacementMap::new();
    let mut styles = LinkStyles::new();
    let masked =
      mask(link, &mut map, &mut styles).unwrap_or_else(|| panic!("mask failed for {link}"));
    assert_ne!(masked, link);
    let recovered =
      recover(&masked, &map, &styles).unwrap_or_else(|| panic!("recover failed for {masked}"));
    assert_eq!(recovered, link);
    (masked, map)
  }

  #[test]
  fn detects_schemes_case_insensitively() {
    assert_eq!(ProxyScheme::detect("ss://abc"), Some(ProxyScheme::Ss));
    assert_eq!(ProxyScheme::detect("SSR://abc"), Some(ProxyScheme::Ssr));
    assert_eq!(ProxyScheme::detect("vmess1://abc"), Some(ProxyScheme::Vmess));
    assert_eq!(ProxyScheme::detect("Trojan://a@b:1"), Some(ProxyScheme::Trojan));
    assert_eq!(ProxyScheme::detect("vless://a@b:1"), Some(ProxyScheme::Vless));
    assert_eq!(ProxyScheme::detect("hysteria://b:1?x"), Some(ProxyScheme::Hysteria));
    assert_eq!(ProxyScheme::detect("https://example.com/sub"), None);
    assert_eq!(ProxyScheme::detect("s"), None);
  }

  #[test]
  fn leading_host_port_handles_ipv6_and_rejects_missing_port() {
    assert_eq!(leading_host_port("1.2.3.4:8388#x"), Some(("1.2.3.4", "8388")));
    assert_eq!(leading_host_port("[::1]:443?a=b"), Some(("[::1]", "443")));
    assert_eq!(leading_host_port("example.com/path"), None);
    assert_eq!(leading_host_port(":443"), None);
    assert_eq!(leading_host_port("host:abc"), None);
  }

  #[test]
  fn ss_example_masks_server_and_password() {
    let link = "ss://YWVzLTI1Ni1nY206cGFzcw==@1.2.3.4:8388#node1";
    let mut map = ReplacementMap::new();
    let mut styles = LinkStyles::new();
    let masked = mask(link, &mut map, &mut styles).unwrap();

    let rest = masked.strip_prefix("ss://").unwrap();
    let (userinfo, host_part) = rest.split_once('@').unwrap();
    let (host, tail) = host_part.split_once(':').unwrap();
    assert!(host.ends_with(".com"));
    assert_eq!(host.len(), 16);
    assert_eq!(tail, "8388#node1");
    assert_eq!(map.get(host), Some("1.2.3.4"));

    let decoded = decode_text(userinfo).unwrap();
    let (method, password) = decoded.split_once(':').unwrap();
    assert_eq!(method, "aes-256-gcm");
    assert_eq!(password.len(), 12);
    assert_eq!(map.get(password), Some("pass"));
    assert_eq!(map.len(), 2);

    assert_eq!(
      styles.get(host),
      Some(&[Base64Style { url_safe: true, padded: true }][..])
    );
    let recovered = recover(&masked, &map, &styles).unwrap();
    assert_eq!(recovered, link);

    // Without the recorded style the masked payload's own shape is kept.
    let unstyled = recover(&masked, &map, &LinkStyles::new()).unwrap();
    let (userinfo, tail) = unstyled.strip_prefix("ss://").unwrap().split_once('@').unwrap();
    assert_eq!(decode_text(userinfo).unwrap(), "aes-256-gcm:pass");
    assert_eq!(tail, "1.2.3.4:8388#node1");
  }

  #[test]
  fn encoded_links_of_every_length_round_trip_exactly() {
    for n in 1..=14 {
      let host = format!("{}.example.net", "h".repeat(n));

      let json = format!(r#"{{"add":"{host}","id":"0e3c9a2b-1111-4222-8333-444455556666","port":443}}"#);
      round_trip(&format!("vmess://{}", crate::codec::base64_encode(&json)));
      round_trip(&format!("vmess://{}", base64_encode_std(&json)));

      let password = "p".repeat(n);
      round_trip(&format!(
        "ss://{}@{host}:8388#n{n}",
        base64_encode_std(format!("aes-256-gcm:{password}"))
      ));
      round_trip(&format!(
        "ss://{}#legacy",
        base64_encode_std(format!("aes-256-gcm:{password}@{host}:8388"))
      ));

      let inner = format!(
        "{host}:8989:origin:aes-256-cfb:plain:{}/?remarks=bg",
        base64_encode_std(&password)
      );
      round_trip(&format!("ssr://{}", base64_encode_std(&inner)));
      round_trip(&format!("ssr://{}", crate::codec::base64_encode(&inner)));
    }
  }

  #[test]
  fn plain_links_record_no_styles() {
    let mut map = ReplacementMap::new();
    let mut styles = LinkStyles::new();
    mask("trojan://pw@example.com:443", &mut map, &mut styles).unwrap();
    mask("ss://aes-128-gcm:pw@example.com:443", &mut map, &mut styles).unwrap();
    assert_eq!(styles, LinkStyles::new());
  }

  #[test]
  fn ss_canonical_userinfo_round_trips_exactly() {
    round_trip("ss://YWVzLTI1Ni1nY206cGFzcw@1.2.3.4:8388#node1");
    round_trip("ss://Y2hhY2hhMjAtaWV0Zi1wb2x5MTMwNTpwYXNzd29yZA@[2001:db8::2]:8388/?plugin=v2ray-plugin#v6");
  }

  #[test]
  fn ss_plain_userinfo_and_plugin_query() {
    round_trip("ss://2022-blake3-aes-128-gcm:c2VjcmV0a2V5MTIzNDU2Nw%3D%3D@example.net:443/?plugin=obfs-local%3Bobfs-host%3Dexample.net#Home");
  }

  #[test]
  fn ss_legacy_whole_body_encoding() {
    let body = crate::codec::base64_encode("chacha20-ietf-poly1305:p@ss:word@10.0.0.1:8443");
    let link = format!("ss://{body}#legacy%20node");
    let (masked, map) = round_trip(&link);
    assert!(masked.ends_with("#legacy%20node"));
    let masked_body = masked
      .strip_prefix("ss://")
      .and_then(|s| s.split('#').next())
      .unwrap();
    let decoded = decode_text(masked_body).unwrap();
    assert!(decoded.starts_with("chacha20-ietf-poly1305:"));
    assert!(!decoded.contains("10.0.0.1"));
    assert!(map.iter().any(|(_, v)| v == "p@ss:word"));
  }

  #[test]
  fn ssr_round_trip() {
    let pw = crate::codec::base64_encode("ssr-secret");
    let inner = format!("203.0.113.9:8989:auth_aes128_md5:aes-128-ctr:tls1.2_ticket_auth:{pw}/?obfsparam=&remarks=5rWL6K-V");
    let link = format!("ssr://{}", crate::codec::base64_encode(&inner));
    let (masked, map) = round_trip(&link);
    let decoded = decode_text(masked.strip_prefix("ssr://").unwrap()).unwrap();
    assert!(!decoded.contains("203.0.113.9"));
    assert!(decoded.ends_with("/?obfsparam=&remarks=5rWL6K-V"));
    assert!(map.iter().any(|(_, v)| v == "ssr-secret"));
  }

  #[test]
  fn vmess_round_trip_keeps_json_layout() {
    let json = r#"{"v":"2","ps":"hk-01","add":"hk.example.com","port":"443","id":"b831381d-6324-4d53-ad4f-8cda48b30811","aid":"0","net":"ws","host":"hk.example.com","path":"/ray","tls":"tls"}"#;
    let link = format!("vmess://{}", base64_encode_std(json));
    let (masked, map) = round_trip(&link);
    let decoded = decode_text(masked.strip_prefix("vmess://").unwrap()).unwrap();
    assert!(!decoded.contains("hk.example.com"));
    assert!(!decoded.contains("b831381d-6324-4d53-ad4f-8cda48b30811"));
    assert!(decoded.contains(r#""ps":"hk-01""#));
    let value: serde_json::Value = serde_json::from_str(&decoded).unwrap();
    let host = value["add"].as_str().unwrap();
    assert_eq!(host.len(), 14);
    assert_eq!(map.get(host), Some("hk.example.com"));
    assert_eq!(value["id"].as_str().unwrap().len(), 36);
  }

  #[test]
  fn vmess1_prefix_is_preserved() {
    let json = r#"{"add":"1.1.1.1","id":"0e3c9a2b-1111-4222-8333-444455556666","port":443}"#;
    let link = format!("vmess1://{}", base64_encode_std(json));
    let (masked, _) = round_trip(&link);
    assert!(masked.starts_with("vmess1://"));
  }

  #[test]
  fn scheme_is_never_rewritten() {
    for link in [
      "vless://ss@example.com:443?type=tcp#x",
      "trojan://jan@ojan.example:443#trojan",
      "hysteria://teria:443?peer=teria#hy",
    ] {
      let scheme = link.split("://").next().unwrap();
      let (masked, _) = round_trip(link);
      assert!(masked.starts_with(&format!("{scheme}://")), "{masked}");
    }
  }

  #[test]
  fn trojan_and_vless_replace_every_occurrence() {
    let link = "trojan://s3cr3t@jp.example.org:443?security=tls&sni=jp.example.org#jp.example.org";
    let (masked, map) = round_trip(link);
    assert!(!masked.contains("jp.example.org"));
    assert!(!masked.contains("s3cr3t"));
    assert_eq!(map.len(), 2);

    round_trip("vless://0e3c9a2b-1111-4222-8333-444455556666@[2001:db8::1]:8443?encryption=none&type=grpc#v6");
  }

  #[test]
  fn hysteria_masks_server_only() {
    let link = "hysteria://hy.example.com:36712?protocol=udp&auth=pw&peer=hy.example.com&upmbps=50#hy";
    let (masked, map) = round_trip(link);
    assert_eq!(map.len(), 1);
    assert!(masked.contains("auth=pw"));
    assert!(!masked.contains("hy.example.com"));
  }

  #[test]
  fn malformed_links_are_rejected_without_touching_the_map() {
    let mut map = ReplacementMap::new();
    for link in [
      "vmess://not-base64",
      "ss://",
      "ss://@host:1",
      "ssr://Zm9v",
      "trojan://no-at-sign:443",
      "hysteria://host-without-port?x",
      "http://example.com",
      "",
    ] {
      assert_eq!(mask(link, &mut map, &mut LinkStyles::new()), None, "{link}");
    }
    assert!(map.is_empty());
  }

  #[test]
  fn recover_needs_every_placeholder_in_the_map() {
    let mut map = ReplacementMap::new();
    let styles = LinkStyles::new();
    let masked = mask("trojan://pw@example.com:443#x", &mut map, &mut LinkStyles::new()).unwrap();
    assert_eq!(recover(&masked, &ReplacementMap::new(), &styles), None);

    let partial: ReplacementMap = map
      .iter()
      .filter(|(_, v)| *v == "example.com")
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    assert_eq!(recover(&masked, &partial, &styles), None);
  }

  #[test]
  fn identical_links_get_independent_placeholders() {
    let mut map = ReplacementMap::new();
    let mut styles = LinkStyles::new();
    let a = mask("trojan://pw@example.com:443", &mut map, &mut styles).unwrap();
    let b = mask("trojan://pw@example.com:443", &mut map, &mut styles).unwrap();
    assert_ne!(a, b);
    assert_eq!(map.len(), 4);
  }

  #[test]
  fn mask_lines_drops_unparseable_lines() {
    let mut map = ReplacementMap::new();
    let mut styles = LinkStyles::new();
    let masked = mask_lines(
      "trojan://pw@a.example.org:443#a\r\nvmess://not-base64\r\n\r\nhysteria://h.example.org:1",
      &mut map,
      &mut styles,
    );
    assert_eq!(masked.len(), 2);
    assert_eq!(map.len(), 3);

    let recovered = recover_lines(&masked.join("\n"), &map, &styles);
    assert_eq!(
      recovered,
      ["trojan://pw@a.example.org:443#a", "hysteria://h.example.org:1"]
    );
  }
}
