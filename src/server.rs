use axum::body::Body;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;

use crate::app::AppBundle;
use crate::config::{API_KEY_ENV, Config};
use crate::dispatch::ChatDispatcher;
use crate::error::{PortfolioError, Result};
use crate::models::ChatRequest;
use crate::protocol::{STREAM_HEADER, STREAM_VERSION};

#[derive(Clone)]
pub struct AppState {
    pub bundle: Arc<AppBundle>,
    /// `None` until an API key is configured.
    pub dispatcher: Option<Arc<ChatDispatcher>>,
}

impl AppState {
    pub fn new(config: &Config, bundle: Arc<AppBundle>) -> Result<Self> {
        let dispatcher = bundle.live_dispatcher(config)?.map(Arc::new);
        Ok(Self { bundle, dispatcher })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/presets", get(presets))
        .route("/api/views", get(views))
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Result<Response> {
    let dispatcher = state
        .dispatcher
        .as_ref()
        .ok_or_else(|| PortfolioError::MissingApiKey(API_KEY_ENV.to_string()))?;

    let exchange = dispatcher.dispatch(&request.messages).await?;
    let lines = ReceiverStream::new(exchange.events).map(|event| Ok::<_, Infallible>(event.encode()));

    Response::builder()
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .header(STREAM_HEADER, STREAM_VERSION)
        .body(Body::from_stream(lines))
        .map_err(|e| PortfolioError::Internal(format!("Failed to build response: {e}")))
}

async fn presets(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.bundle.compiled.presets.clone())
}

async fn views(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.bundle.compiled.views.clone())
}
