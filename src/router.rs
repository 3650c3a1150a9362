use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{self, CorsLayer};
use tracing::{error, info, info_span, warn, Instrument};

use crate::assets;
use crate::chat::{self, MAX_BODY_BYTES};
use crate::config::AppConfig;
use crate::discovery;
use crate::error::ApiError;
use crate::models::{ChatReply, HealthResponse, ModelsResponse};
use crate::upstream::GroqClient;

const ALLOWED_METHODS: &str = "GET, POST, OPTIONS";
const ALLOWED_HEADERS: &str = "Content-Type, Authorization";

/// Process-scoped state shared by every request.
pub struct RouterState {
  pub started_at: Instant,
  pub config: AppConfig,
  pub client: GroqClient,
  request_counter: AtomicU64,
}

impl RouterState {
  pub fn new(config: AppConfig) -> anyhow::Result<Self> {
    let client = GroqClient::new(config.api_base.clone(), config.api_key.clone())?;
    Ok(Self::with_client(config, client))
  }

  pub fn with_client(config: AppConfig, client: GroqClient) -> Self {
    Self {
      started_at: Instant::now(),
      config,
      client,
      request_counter: AtomicU64::new(0),
    }
  }

  fn next_request_id(&self) -> u64 {
    self.request_counter.fetch_add(1, Ordering::Relaxed) + 1
  }
}

/// The complete request handler. Hosts that manage their own listener can
/// mount this directly.
pub fn build_router(state: Arc<RouterState>) -> Router {
  Router::new()
    .route("/health", get(health).fallback(static_files))
    .route("/api/models", get(models).fallback(api_not_found))
    .route(
      "/api/chat",
      post(chat)
        .fallback(api_not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
    )
    .route("/api/", any(api_not_found))
    .route("/api/*rest", any(api_not_found))
    .fallback(static_files)
    .layer(CatchPanicLayer::custom(panic_response))
    .layer(
      CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods(cors::Any)
        .allow_headers(cors::Any),
    )
    .layer(middleware::from_fn(preflight))
    .layer(middleware::from_fn_with_state(state.clone(), track_request))
    .with_state(state)
}

pub async fn run_router(listener: tokio::net::TcpListener, state: RouterState) -> anyhow::Result<()> {
  let app = build_router(Arc::new(state));
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(err) = tokio::signal::ctrl_c().await {
    error!("failed to listen for shutdown signal: {err}");
    std::future::pending::<()>().await;
  }
  info!("shutdown signal received");
}

async fn track_request(State(state): State<Arc<RouterState>>, request: Request, next: Next) -> Response {
  let id = state.next_request_id();
  let method = request.method().clone();
  let path = request.uri().path().to_string();
  let started = Instant::now();
  let span = info_span!("request", id);

  let mut response = next.run(request).instrument(span.clone()).await;

  let status = response.status().as_u16();
  let elapsed_ms = started.elapsed().as_millis() as u64;
  span.in_scope(|| {
    if response.status().is_server_error() {
      error!(%method, %path, status, elapsed_ms, "request finished");
    } else if response.status().is_client_error() {
      warn!(%method, %path, status, elapsed_ms, "request finished");
    } else {
      info!(%method, %path, status, elapsed_ms, "request finished");
    }
  });

  response
    .headers_mut()
    .insert("x-request-id", HeaderValue::from(id));
  response
}

/// Answers every OPTIONS request, preflight or not, with an empty 204.
async fn preflight(request: Request, next: Next) -> Response {
  if request.method() != Method::OPTIONS {
    return next.run(request).await;
  }
  (
    StatusCode::NO_CONTENT,
    [
      (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
      (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS),
      (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS),
      (header::ACCESS_CONTROL_MAX_AGE, "86400"),
    ],
  )
    .into_response()
}

fn panic_response(_payload: Box<dyn Any + Send + 'static>) -> Response {
  ApiError::Internal("Internal server error".to_string()).into_response()
}

async fn health(State(state): State<Arc<RouterState>>) -> Json<HealthResponse> {
  let api_key = if state.config.has_api_key() { "set" } else { "MISSING" };
  Json(HealthResponse {
    ok: true,
    uptime_sec: state.started_at.elapsed().as_secs(),
    api_key: api_key.to_string(),
  })
}

async fn models(State(state): State<Arc<RouterState>>) -> Json<ModelsResponse> {
  Json(discovery::discover_models(&state.client).await)
}

async fn chat(
  State(state): State<Arc<RouterState>>,
  body: Result<Bytes, BytesRejection>,
) -> Result<Json<ChatReply>, ApiError> {
  let body = body.map_err(body_rejection)?;
  let reply = chat::proxy_chat(&state.client, &body).await?;
  Ok(Json(reply))
}

fn body_rejection(rejection: BytesRejection) -> ApiError {
  if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
    ApiError::PayloadTooLarge {
      limit: MAX_BODY_BYTES,
    }
  } else {
    ApiError::BadRequest(format!("Failed to read request body: {}", rejection.body_text()))
  }
}

async fn api_not_found(method: Method, uri: Uri) -> ApiError {
  ApiError::NotFound(format!("No route for {method} {}", uri.path()))
}

async fn static_files(State(state): State<Arc<RouterState>>, uri: Uri) -> Result<Response, ApiError> {
  assets::serve(&state.config.static_root, uri.path()).await
}
