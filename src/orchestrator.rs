//! End-to-end conversion: mask the inputs, stage documents, call the backend,
//! recover its answer, and always clean up what was staged.

use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use url::Url;

use crate::codec::{base64_encode_std, random_token};
use crate::document::mask_document;
use crate::error::ConvertError;
use crate::links::{self, LinkStyles, ProxyScheme};
use crate::observe::{ConversionObserver, SkipReason, Stage};
use crate::recovery::recover_response;
use crate::replacements::ReplacementMap;
use crate::sniff::{classify, looks_like_link_list, Classified};
use crate::staging::StagingStore;
use crate::upstream::{
  forwardable_headers, reusable_response_headers, OutboundRequest, Upstream, UpstreamResponse,
};

pub const SUBSCRIPTION_PATH: &str = "subscription";
const STAGING_KEY_LEN: usize = 11;

/// An inbound conversion call, already detached from the HTTP framework.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
  /// `scheme://host[:port]` under which staged documents are reachable.
  pub origin: String,
  pub path: String,
  pub query: Vec<(String, String)>,
  pub method: Method,
  pub headers: HeaderMap,
  pub body: Bytes,
}

impl ConversionRequest {
  pub fn query_value(&self, name: &str) -> Option<&str> {
    self
      .query
      .iter()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_str())
  }
}

#[derive(Debug, Clone)]
pub struct ConversionResponse {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: Bytes,
}

/// `scheme://host[:port]` of an absolute http(s) URL.
pub fn origin_of(raw: &str) -> Option<String> {
  let url = Url::parse(raw.trim()).ok()?;
  if !matches!(url.scheme(), "http" | "https") {
    return None;
  }
  let origin = url.origin();
  origin.is_tuple().then(|| origin.ascii_serialization())
}

fn backend_override_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"^(https?://[^/]+)[.].+$").expect("static pattern"))
}

fn is_http_url(s: &str) -> bool {
  s.starts_with("http://") || s.starts_with("https://")
}

/// Query string with the first `url` replaced by `items` and any later `url`
/// pairs dropped; other pairs keep their order.
fn rewrite_query(query: &[(String, String)], items: &str) -> String {
  let mut out = url::form_urlencoded::Serializer::new(String::new());
  let mut replaced = false;
  for (k, v) in query {
    if k != "url" {
      out.append_pair(k, v);
    } else if !replaced {
      out.append_pair(k, items);
      replaced = true;
    }
  }
  out.finish()
}

fn mask_link_list(text: &str, map: &mut ReplacementMap, styles: &mut LinkStyles) -> Option<String> {
  let masked = links::mask_lines(text, map, styles);
  if masked.is_empty() {
    return None;
  }
  Some(base64_encode_std(masked.join("\r\n")))
}

struct RequestState {
  map: ReplacementMap,
  styles: LinkStyles,
  items: Vec<String>,
  staged: Vec<String>,
  stage: Stage,
}

impl RequestState {
  fn new() -> Self {
    Self {
      map: ReplacementMap::new(),
      styles: LinkStyles::new(),
      items: Vec::new(),
      staged: Vec::new(),
      stage: Stage::Ingesting,
    }
  }
}

pub struct ConversionOrchestrator {
  staging: StagingStore,
  upstream: Arc<dyn Upstream>,
  observer: Arc<dyn ConversionObserver>,
  backend: String,
}

impl ConversionOrchestrator {
  /// `backend` must already be an origin (see [`origin_of`]).
  pub fn new(
    staging: StagingStore,
    upstream: Arc<dyn Upstream>,
    observer: Arc<dyn ConversionObserver>,
    backend: impl Into<String>,
  ) -> Self {
    Self {
      staging,
      upstream,
      observer,
      backend: backend.into(),
    }
  }

  pub fn staging(&self) -> &StagingStore {
    &self.staging
  }

  pub async fn convert(&self, request: ConversionRequest) -> Result<ConversionResponse, ConvertError> {
    let mut state = RequestState::new();
    let result = self.pipeline(&request, &mut state).await;

    for key in &state.staged {
      if let Err(e) = self.staging.delete(key).await {
        self.observer.cleanup_failed(key, &e);
      }
    }

    match &result {
      Ok(_) => self.observer.stage(Stage::Done),
      Err(e) => self.observer.failed(state.stage, e),
    }
    result
  }

  fn enter(&self, state: &mut RequestState, stage: Stage) {
    state.stage = stage;
    self.observer.stage(stage);
  }

  fn backend_for(&self, request: &ConversionRequest) -> String {
    request
      .query_value("bd")
      .filter(|bd| backend_override_re().is_match(bd))
      .and_then(origin_of)
      .unwrap_or_else(|| self.backend.clone())
  }

  async fn pipeline(
    &self,
    request: &ConversionRequest,
    state: &mut RequestState,
  ) -> Result<ConversionResponse, ConvertError> {
    self.enter(state, Stage::Ingesting);
    let url_param = request
      .query_value("url")
      .filter(|v| !v.is_empty())
      .ok_or(ConvertError::MissingUrl)?;
    let segments: Vec<&str> = url_param
      .split('|')
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .collect();
    if segments.is_empty() {
      return Err(ConvertError::NoValidLinks);
    }

    self.enter(state, Stage::Masking);
    for (index, segment) in segments.iter().enumerate() {
      self.mask_segment(index, segment, request, state).await?;
    }
    if state.items.is_empty() {
      return Err(ConvertError::NoValidLinks);
    }

    self.enter(state, Stage::Dispatching);
    let backend = self.backend_for(request);
    let query = rewrite_query(&request.query, &state.items.join("|"));
    let outbound = OutboundRequest {
      method: request.method.clone(),
      url: format!("{backend}{}?{query}", request.path),
      headers: forwardable_headers(&request.headers),
      body: request.body.clone(),
    };
    let response = self.upstream.send(outbound).await?;
    self.observer.dispatched(&backend, response.status.as_u16());

    self.enter(state, Stage::Recovering);
    let headers = reusable_response_headers(&response.headers);
    if response.status != StatusCode::OK {
      return Ok(ConversionResponse {
        status: response.status,
        headers,
        body: response.body,
      });
    }
    let (body, path) = recover_response(&response.text(), &state.map, &state.styles);
    self.observer.recovered(path);
    Ok(ConversionResponse {
      status: StatusCode::OK,
      headers,
      body: Bytes::from(body),
    })
  }

  async fn fetch_source(&self, url: &str, request: &ConversionRequest) -> Result<UpstreamResponse, ConvertError> {
    self
      .upstream
      .send(OutboundRequest {
        method: request.method.clone(),
        url: url.to_string(),
        headers: forwardable_headers(&request.headers),
        body: Bytes::new(),
      })
      .await
  }

  async fn mask_segment(
    &self,
    index: usize,
    segment: &str,
    request: &ConversionRequest,
    state: &mut RequestState,
  ) -> Result<(), ConvertError> {
    let before = state.map.len();
    if let Some(scheme) = ProxyScheme::detect(segment).filter(|_| !segment.contains('\n')) {
      match links::mask(segment, &mut state.map, &mut state.styles) {
        Some(link) => {
          self
            .observer
            .segment_masked(index, scheme.name(), state.map.len() - before);
          state.items.push(link);
        }
        None => self.observer.segment_skipped(index, &SkipReason::Unparseable),
      }
      return Ok(());
    }

    let (payload, source_headers) = if is_http_url(segment) {
      match self.fetch_source(segment, request).await {
        Ok(res) if res.status.is_success() => (res.text(), Some(reusable_response_headers(&res.headers))),
        Ok(res) => {
          self
            .observer
            .segment_skipped(index, &SkipReason::HttpStatus(res.status.as_u16()));
          return Ok(());
        }
        Err(_) => {
          self.observer.segment_skipped(index, &SkipReason::FetchFailed);
          return Ok(());
        }
      }
    } else {
      (segment.to_string(), None)
    };

    let classified = classify(&payload);
    let kind = classified.kind();
    let document = match classified {
      Classified::Base64(text) => mask_link_list(&text, &mut state.map, &mut state.styles),
      Classified::Structured(doc) => mask_document(doc, &mut state.map),
      Classified::Unknown(text) if looks_like_link_list(&text) => {
        mask_link_list(&text, &mut state.map, &mut state.styles)
      }
      Classified::Unknown(_) => {
        self.observer.segment_skipped(index, &SkipReason::Unparseable);
        return Ok(());
      }
    };
    let Some(document) = document else {
      self.observer.segment_skipped(index, &SkipReason::NothingMasked);
      return Ok(());
    };

    let key = random_token(STAGING_KEY_LEN);
    state.staged.push(key.clone());
    let bytes = document.len();
    self.staging.put(&key, document, source_headers.as_ref()).await?;
    self.observer.staged(&key, bytes);
    self.observer.segment_masked(index, kind, state.map.len() - before);
    state
      .items
      .push(format!("{}/{SUBSCRIPTION_PATH}/{key}", request.origin));
    Ok(())
  }
}
