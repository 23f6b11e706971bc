use base64::alphabet;
use base64::engine::general_purpose::{
  GeneralPurpose, GeneralPurposeConfig, STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD,
};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

const TOKEN_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

// Accepts what browser `atob` accepts once padding is restored.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
  &alphabet::STANDARD,
  GeneralPurposeConfig::new()
    .with_decode_allow_trailing_bits(true)
    .with_decode_padding_mode(DecodePaddingMode::RequireCanonical),
);

/// URL-safe, unpadded base64.
pub fn base64_encode(bytes: impl AsRef<[u8]>) -> String {
  URL_SAFE_NO_PAD.encode(bytes)
}

/// Standard, padded base64. Whole subscription bodies are re-encoded this way.
pub fn base64_encode_std(bytes: impl AsRef<[u8]>) -> String {
  STANDARD.encode(bytes)
}

/// Decodes standard or URL-safe base64, padded or not. ASCII whitespace is ignored.
pub fn base64_decode(input: &str) -> Result<Vec<u8>, DecodeError> {
  let mut cleaned: String = input
    .chars()
    .filter(|c| !c.is_ascii_whitespace())
    .map(|c| match c {
      '-' => '+',
      '_' => '/',
      other => other,
    })
    .collect();
  let rem = cleaned.len() % 4;
  if rem != 0 {
    cleaned.push_str(&"=".repeat(4 - rem));
  }
  Ok(LENIENT.decode(cleaned.as_bytes())?)
}

pub fn decode_text(input: &str) -> Result<String, DecodeError> {
  let bytes = base64_decode(input)?;
  Ok(String::from_utf8(bytes)?)
}

/// Alphabet and padding of an encoded string, so a rewritten payload can be
/// re-encoded the way it arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Base64Style {
  pub url_safe: bool,
  pub padded: bool,
}

impl Base64Style {
  /// An encoding without `=` whose length is a multiple of 4 reads the same
  /// padded or not; `prefer_padded` settles that case.
  pub fn detect(encoded: &str, prefer_padded: bool) -> Self {
    let mut len = 0usize;
    let mut standard_only = false;
    let mut has_padding = false;
    for c in encoded.chars().filter(|c| !c.is_ascii_whitespace()) {
      len += 1;
      match c {
        '+' | '/' => standard_only = true,
        '=' => has_padding = true,
        _ => {}
      }
    }
    let padded = if has_padding {
      true
    } else if len % 4 != 0 {
      false
    } else {
      prefer_padded
    };
    Self {
      url_safe: !standard_only,
      padded,
    }
  }

  pub fn encode(self, bytes: impl AsRef<[u8]>) -> String {
    match (self.url_safe, self.padded) {
      (true, true) => URL_SAFE.encode(bytes),
      (true, false) => base64_encode(bytes),
      (false, true) => STANDARD.encode(bytes),
      (false, false) => STANDARD_NO_PAD.encode(bytes),
    }
  }
}

/// Lowercase alphanumeric token. Not cryptographically secure.
pub fn random_token(len: usize) -> String {
  (0..len)
    .map(|_| TOKEN_CHARSET[fastrand::usize(..TOKEN_CHARSET.len())] as char)
    .collect()
}

pub fn random_host(len: usize) -> String {
  format!("{}.com", random_token(len))
}

pub fn random_uuid() -> String {
  uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encode_is_url_safe_and_unpadded() {
    // 0xfb 0xff encodes to "+/8=" in the standard alphabet.
    assert_eq!(base64_encode([0xfbu8, 0xff]), "-_8");
    assert_eq!(base64_encode_std([0xfbu8, 0xff]), "+/8=");
  }

  #[test]
  fn decode_accepts_both_alphabets_and_missing_padding() {
    assert_eq!(base64_decode("-_8").unwrap(), vec![0xfb, 0xff]);
    assert_eq!(base64_decode("+/8=").unwrap(), vec![0xfb, 0xff]);
    assert_eq!(decode_text("YWVzLTI1Ni1nY206cGFzcw").unwrap(), "aes-256-gcm:pass");
    assert_eq!(decode_text("YWVzLTI1Ni1nY206cGFzcw==").unwrap(), "aes-256-gcm:pass");
  }

  #[test]
  fn decode_ignores_line_wrapping() {
    assert_eq!(decode_text("YWVzLTI1\r\nNi1nY206\ncGFzcw==\n").unwrap(), "aes-256-gcm:pass");
  }

  #[test]
  fn decode_round_trips_arbitrary_bytes() {
    let samples: [&[u8]; 5] = [b"", b"a", b"ab", b"abc", &[0, 255, 128, 7, 63, 62]];
    for s in samples {
      assert_eq!(base64_decode(&base64_encode(s)).unwrap(), s);
    }
  }

  #[test]
  fn decode_rejects_non_base64() {
    assert!(base64_decode("not base64!").is_err());
    assert!(base64_decode("proxies:\n  - name: a").is_err());
    // A single dangling character can never be valid.
    assert!(base64_decode("abcde").is_err());
  }

  #[test]
  fn decode_text_rejects_binary() {
    assert!(matches!(decode_text("/w"), Err(DecodeError::NotUtf8(_))));
  }

  #[test]
  fn style_detection_preserves_shape() {
    let style = Base64Style::detect("YWJj+/8=", false);
    assert_eq!(style, Base64Style { url_safe: false, padded: true });

    let unpadded = Base64Style::detect("YWVzLTI1Ni1nY206cGFzcw", true);
    assert_eq!(unpadded, Base64Style { url_safe: true, padded: false });
    assert_eq!(unpadded.encode("aes-256-gcm:pass"), "YWVzLTI1Ni1nY206cGFzcw");

    let padded = Base64Style::detect("YWVzLTI1Ni1nY206cGFzcw==", false);
    assert_eq!(padded.encode("aes-256-gcm:pass"), "YWVzLTI1Ni1nY206cGFzcw==");
  }

  #[test]
  fn ambiguous_padding_follows_preference() {
    // 12 bytes encode to 16 characters with no padding either way.
    assert!(Base64Style::detect("YWJjZGVmZ2hpamts", true).padded);
    assert!(!Base64Style::detect("YWJjZGVmZ2hpamts", false).padded);
  }

  #[test]
  fn tokens_use_lowercase_alphanumerics() {
    let t = random_token(12);
    assert_eq!(t.len(), 12);
    assert!(t.bytes().all(|b| TOKEN_CHARSET.contains(&b)));
    let host = random_host(10);
    assert!(host.ends_with(".com"));
    assert_eq!(host.len(), 14);
  }

  #[test]
  fn uuid_has_v4_version_and_variant() {
    let id = random_uuid();
    assert_eq!(id.len(), 36);
    let parts: Vec<&str> = id.split('-').collect();
    assert_eq!(parts.len(), 5);
    assert!(parts[2].starts_with('4'));
    assert!(matches!(parts[3].chars().next(), Some('8' | '9' | 'a' | 'b')));
  }

  #[test]
  fn tokens_rarely_collide() {
    // Collisions are possible by construction; at 36^12 they should not show up here.
    let mut seen = std::collections::HashSet::new();
    for _ in 0..10_000 {
      assert!(seen.insert(random_token(12)));
    }
  }
}
