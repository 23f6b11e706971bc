use anyhow::Result;
use async_trait::async_trait;
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::{Method, StatusCode};
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;

use crate::error::ConvertError;

#[derive(Debug, Clone)]
pub struct OutboundRequest {
  pub method: Method,
  pub url: String,
  pub headers: HeaderMap,
  pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: Bytes,
}

impl UpstreamResponse {
  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// Outbound HTTP: source subscriptions, the conversion backend, the presentation page.
#[async_trait]
pub trait Upstream: Send + Sync {
  async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, ConvertError>;
}

// Headers that describe one hop, or that the HTTP client recomputes itself.
const HOP_HEADERS: [HeaderName; 9] = [
  header::HOST,
  header::CONNECTION,
  header::CONTENT_LENGTH,
  header::TRANSFER_ENCODING,
  header::TE,
  header::TRAILER,
  header::UPGRADE,
  header::PROXY_AUTHORIZATION,
  header::ACCEPT_ENCODING,
];

/// Inbound request headers that may be replayed against another origin.
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
  let mut out = headers.clone();
  for name in HOP_HEADERS.iter() {
    out.remove(name);
  }
  out.remove("keep-alive");
  out.remove("proxy-connection");
  out
}

/// Upstream response headers that still hold once the body has been rewritten.
pub fn reusable_response_headers(headers: &HeaderMap) -> HeaderMap {
  let mut out = headers.clone();
  for name in [
    header::CONTENT_LENGTH,
    header::CONTENT_ENCODING,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
  ] {
    out.remove(name);
  }
  out
}

pub fn default_user_agent() -> &'static str {
  concat!("submask/", env!("CARGO_PKG_VERSION"))
}

pub struct HttpUpstream {
  client: Client,
}

impl HttpUpstream {
  pub fn new(timeout_ms: u64, user_agent: &str) -> Result<Self> {
    let client = Client::builder()
      .user_agent(user_agent)
      .redirect(reqwest::redirect::Policy::limited(10))
      .timeout(Duration::from_millis(timeout_ms.max(1)))
      .build()?;
    Ok(Self { client })
  }
}

#[async_trait]
impl Upstream for HttpUpstream {
  async fn send(&self, request: OutboundRequest) -> Result<UpstreamResponse, ConvertError> {
    let target = request.url.clone();
    let mut builder = self
      .client
      .request(request.method, &request.url)
      .headers(request.headers);
    if !request.body.is_empty() {
      builder = builder.body(request.body);
    }
    let res = builder
      .send()
      .await
      .map_err(|e| ConvertError::upstream(&target, e))?;

    let status = res.status();
    let headers = res.headers().clone();
    let body = res
      .bytes()
      .await
      .map_err(|e| ConvertError::upstream(&target, e))?;
    Ok(UpstreamResponse {
      status,
      headers,
      body,
    })
  }
}
