use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use clap::Args as ClapArgs;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::observe::TracingObserver;
use crate::orchestrator::{origin_of, ConversionOrchestrator, ConversionRequest, SUBSCRIPTION_PATH};
use crate::staging::{StagingStore, DEFAULT_MAX_ENTRIES};
use crate::upstream::{default_user_agent, HttpUpstream, OutboundRequest, Upstream};

const FRONTEND_MARKER: &str = "https://bulianglin2023.dev";

#[derive(ClapArgs, Debug, Clone)]
pub struct Args {
  /// Listen address.
  #[arg(long, env = "SUBMASK_LISTEN", default_value = "0.0.0.0:8787")]
  pub listen: SocketAddr,

  /// Conversion backend URL; only its origin is used.
  #[arg(long, env = "SUBMASK_BACKEND")]
  pub backend: String,

  /// Public URL of this service, used for staged document links. Defaults to X-Forwarded-Proto + Host.
  #[arg(long, env = "SUBMASK_PUBLIC_URL")]
  pub public_url: Option<String>,

  /// Presentation page served at `/`.
  #[arg(
    long,
    env = "SUBMASK_FRONTEND_URL",
    default_value = "https://raw.githubusercontent.com/yu1ec/subconverter-mask/master/frontend.html"
  )]
  pub frontend_url: String,

  /// Outbound request timeout (ms), clamped to 1000..=120000.
  #[arg(long, env = "SUBMASK_TIMEOUT_MS", default_value_t = 15_000)]
  pub timeout_ms: u64,

  /// User-Agent for outbound requests whose caller sent none.
  #[arg(long, env = "SUBMASK_USER_AGENT")]
  pub user_agent: Option<String>,

  /// Most staged entries held at once (each document and its header entry count separately).
  #[arg(long, env = "SUBMASK_MAX_STAGED", default_value_t = DEFAULT_MAX_ENTRIES)]
  pub max_staged: usize,
}

#[derive(Clone)]
pub struct AppState {
  pub orchestrator: Arc<ConversionOrchestrator>,
  pub upstream: Arc<dyn Upstream>,
  pub frontend_url: String,
  pub public_origin: Option<String>,
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/", any(frontend))
    .route("/subscription", any(subscription))
    .route("/subscription/*rest", any(subscription))
    .fallback(convert)
    .with_state(state)
}

fn request_origin(public_origin: Option<&str>, headers: &HeaderMap) -> String {
  if let Some(origin) = public_origin {
    return origin.to_string();
  }
  let proto = headers
    .get("x-forwarded-proto")
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.split(',').next())
    .map(str::trim)
    .filter(|v| !v.is_empty())
    .unwrap_or("http");
  let host = headers
    .get(HOST)
    .and_then(|v| v.to_str().ok())
    .unwrap_or("localhost");
  format!("{proto}://{host}")
}

async fn frontend(State(state): State<AppState>, headers: HeaderMap) -> Response {
  let origin = request_origin(state.public_origin.as_deref(), &headers);
  let res = state
    .upstream
    .send(OutboundRequest {
      method: Method::GET,
      url: state.frontend_url.clone(),
      headers: HeaderMap::new(),
      body: Bytes::new(),
    })
    .await;
  match res {
    Ok(res) if res.status == StatusCode::OK => {
      let html = res.text().replace(FRONTEND_MARKER, &origin);
      ([(CONTENT_TYPE, "text/html")], html).into_response()
    }
    Ok(res) => {
      tracing::warn!(status = res.status.as_u16(), "frontend fetch returned non-200");
      (res.status, "Failed to fetch frontend").into_response()
    }
    Err(e) => {
      tracing::warn!(error = %e, "frontend fetch failed");
      (StatusCode::INTERNAL_SERVER_ERROR, "Error loading frontend").into_response()
    }
  }
}

async fn subscription(State(state): State<AppState>, uri: Uri) -> Response {
  let key = uri
    .path()
    .split('/')
    .filter(|s| !s.is_empty())
    .last()
    .unwrap_or(SUBSCRIPTION_PATH);
  match state.orchestrator.staging().get(key).await {
    Ok(Some(entry)) => (entry.headers, entry.body).into_response(),
    Ok(None) => (StatusCode::NOT_FOUND, "Not Found").into_response(),
    Err(e) => {
      tracing::warn!(key, error = %e, "staged entry unreadable");
      (StatusCode::INTERNAL_SERVER_ERROR, format!("Processing error: {e}")).into_response()
    }
  }
}

async fn convert(
  State(state): State<AppState>,
  method: Method,
  uri: Uri,
  headers: HeaderMap,
  body: Bytes,
) -> Response {
  let query = url::form_urlencoded::parse(uri.query().unwrap_or("").as_bytes())
    .into_owned()
    .collect();
  let request = ConversionRequest {
    origin: request_origin(state.public_origin.as_deref(), &headers),
    path: uri.path().to_string(),
    query,
    method,
    headers,
    body,
  };
  match state.orchestrator.convert(request).await {
    Ok(res) => (res.status, res.headers, res.body).into_response(),
    Err(e) => e.into_response(),
  }
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::warn!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutdown requested");
}

pub async fn run(args: Args) -> Result<()> {
  let backend = origin_of(&args.backend)
    .with_context(|| format!("invalid backend url: {}", args.backend))?;
  let public_origin = match args.public_url.as_deref() {
    Some(u) => Some(origin_of(u).with_context(|| format!("invalid public url: {u}"))?),
    None => None,
  };
  let timeout_ms = args.timeout_ms.max(1_000).min(120_000);
  let ua = args
    .user_agent
    .clone()
    .unwrap_or_else(|| default_user_agent().to_string());

  let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::new(timeout_ms, &ua)?);
  let orchestrator = ConversionOrchestrator::new(
    StagingStore::in_memory(args.max_staged.max(2)),
    upstream.clone(),
    Arc::new(TracingObserver),
    backend.clone(),
  );
  let app = router(AppState {
    orchestrator: Arc::new(orchestrator),
    upstream,
    frontend_url: args.frontend_url.clone(),
    public_origin,
  });

  let listener = tokio::net::TcpListener::bind(args.listen)
    .await
    .with_context(|| format!("bind {}", args.listen))?;
  tracing::info!(listen = %args.listen, backend = %backend, timeout_ms, "submask listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;
  Ok(())
}
