use anyhow::{bail, Context, Result};
use clap::Args as ClapArgs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, BufReader};

use crate::codec::base64_encode_std;
use crate::document::mask_document;
use crate::links::{self, LinkStyles, ProxyScheme};
use crate::recovery::recover_response;
use crate::replacements::ReplacementMap;
use crate::sniff::{classify, looks_like_link_list, Classified};

#[derive(ClapArgs, Debug, Clone)]
pub struct MaskArgs {
  /// Read the input from stdin.
  #[arg(long, default_value_t = false)]
  pub stdin: bool,

  /// Input provided directly as an argument (a link, a base64 subscription, a link list or a YAML document).
  #[arg(long)]
  pub text: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RecoverArgs {
  /// JSON line printed by `mask`, or a bare replacement map object.
  #[arg(long)]
  pub map: PathBuf,

  /// Read the converted output from stdin.
  #[arg(long, default_value_t = false)]
  pub stdin: bool,

  /// Converted output provided directly as an argument.
  #[arg(long)]
  pub text: Option<String>,
}

#[derive(Debug, Serialize)]
struct MaskOut<'a> {
  format: &'static str,
  masked: String,
  replacements: &'a ReplacementMap,
  styles: &'a LinkStyles,
}

/// The parts of a `mask` output line that recovery needs.
#[derive(Debug, Deserialize)]
struct MaskRecord {
  replacements: ReplacementMap,
  #[serde(default)]
  styles: LinkStyles,
}

async fn read_input(stdin: bool, text: Option<String>) -> Result<String> {
  match text {
    Some(t) if !stdin => Ok(t),
    _ => {
      let mut buf = String::new();
      let mut reader = BufReader::new(tokio::io::stdin());
      reader.read_to_string(&mut buf).await?;
      Ok(buf)
    }
  }
}

fn is_single_link(trimmed: &str) -> bool {
  !trimmed.contains('\n') && ProxyScheme::detect(trimmed).is_some()
}

/// Masks any supported input form, keeping that form on output.
fn mask_input(
  input: &str,
  map: &mut ReplacementMap,
  styles: &mut LinkStyles,
) -> Option<(&'static str, String)> {
  let trimmed = input.trim();
  if is_single_link(trimmed) {
    return links::mask(trimmed, map, styles).map(|m| ("link", m));
  }
  match classify(input) {
    Classified::Base64(text) => {
      let masked = links::mask_lines(&text, map, styles);
      (!masked.is_empty()).then(|| ("base64", base64_encode_std(masked.join("\r\n"))))
    }
    Classified::Structured(doc) => mask_document(doc, map).map(|m| ("structured", m)),
    Classified::Unknown(text) if looks_like_link_list(&text) => {
      let masked = links::mask_lines(&text, map, styles);
      (!masked.is_empty()).then(|| ("links", masked.join("\n")))
    }
    Classified::Unknown(_) => None,
  }
}

/// Inverse of [`mask_input`]: single links and plain link lists are recovered
/// structurally, everything else like a backend response body. `None` only
/// when a single link does not recover.
fn recover_input(input: &str, map: &ReplacementMap, styles: &LinkStyles) -> Option<String> {
  let trimmed = input.trim();
  if is_single_link(trimmed) {
    return links::recover(trimmed, map, styles);
  }
  if let Classified::Unknown(text) = classify(input) {
    if looks_like_link_list(&text) {
      return Some(links::recover_lines(&text, map, styles).join("\n"));
    }
  }
  let (out, path) = recover_response(input, map, styles);
  tracing::debug!(path = ?path, "recovered input");
  Some(out)
}

/// Accepts the whole `mask` output line or just its `replacements` object.
fn parse_map(raw: &str) -> Result<(ReplacementMap, LinkStyles)> {
  let value: serde_json::Value = serde_json::from_str(raw)?;
  if value.get("replacements").is_some() {
    let record: MaskRecord = serde_json::from_value(value)?;
    return Ok((record.replacements, record.styles));
  }
  Ok((serde_json::from_value(value)?, LinkStyles::new()))
}

pub async fn run_mask(args: MaskArgs) -> Result<()> {
  let input = read_input(args.stdin, args.text).await?;
  let mut map = ReplacementMap::new();
  let mut styles = LinkStyles::new();
  let Some((format, masked)) = mask_input(&input, &mut map, &mut styles) else {
    bail!("input contains no maskable proxy links or proxies document");
  };
  tracing::debug!(format, placeholders = map.len(), "masked input");

  let out = MaskOut {
    format,
    masked,
    replacements: &map,
    styles: &styles,
  };
  println!("{}", serde_json::to_string(&out)?);
  Ok(())
}

pub async fn run_recover(args: RecoverArgs) -> Result<()> {
  let raw = tokio::fs::read_to_string(&args.map)
    .await
    .with_context(|| format!("read replacement map: {}", args.map.display()))?;
  let (map, styles) =
    parse_map(&raw).with_context(|| format!("parse replacement map: {}", args.map.display()))?;
  if map.is_empty() {
    tracing::warn!(map = %args.map.display(), "replacement map is empty; nothing will be restored");
  }

  let input = read_input(args.stdin, args.text).await?;
  let Some(out) = recover_input(&input, &map, &styles) else {
    bail!("link placeholders are not in the replacement map");
  };
  println!("{out}");
  Ok(())
}
