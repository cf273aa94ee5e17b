//! Streaming relay between browser clients and the hosted completion API.
//!
//! The relay owns no state between requests: each `POST` resolves the
//! upstream key, prepends the persona, makes exactly one upstream call and
//! either passes the event stream through untouched or reports a JSON error.

use crate::api::{CompletionProvider, CompletionRequest, UpstreamReply};
use crate::config::{self, RelayConfig};
use crate::models::ChatTurn;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower_http::set_header::SetResponseHeaderLayer;

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
pub const EVENT_STREAM: &str = "text/event-stream";

#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    pub provider: Arc<dyn CompletionProvider>,
}

impl RelayState {
    pub fn new(config: RelayConfig, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            config: Arc::new(config),
            provider,
        }
    }
}

#[derive(Deserialize, Debug)]
struct RelayRequest {
    messages: Vec<ChatTurn>,
}

/// Errors a relay request can end in. Every variant becomes a JSON
/// `{"error": ...}` body; see the `IntoResponse` impl for status codes.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Rate limit exceeded, coba lagi nanti ya 🙏")]
    RateLimited,

    #[error("Payment required, tolong isi credit workspace dulu")]
    PaymentRequired,

    /// Any other non-2xx upstream status. Status and body are logged only.
    #[error("AI gateway error")]
    Gateway { status: u16, body: String },

    /// The upstream credential could not be resolved.
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    BadPayload(String),

    #[error("{0}")]
    Upstream(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RelayError::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
            RelayError::Gateway { .. }
            | RelayError::Configuration(_)
            | RelayError::BadPayload(_)
            | RelayError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn from_upstream_status(status: u16, body: String) -> Self {
        match status {
            429 => RelayError::RateLimited,
            402 => RelayError::PaymentRequired,
            _ => RelayError::Gateway { status, body },
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match &self {
            RelayError::Gateway { status, body } => {
                log::error!("AI gateway error: {} {}", status, body);
            }
            RelayError::RateLimited | RelayError::PaymentRequired => {
                log::warn!("Upstream refused the request: {}", self);
            }
            other => log::error!("Chat error: {}", other),
        }
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Builds the relay router. The endpoint is served at `/chat` and at the
/// hosted-functions path clients use by default.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/chat", post(chat).options(preflight))
        .route("/functions/v1/chat", post(chat).options(preflight))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static(ALLOW_ORIGIN),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        ))
        .with_state(state)
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn chat(State(state): State<RelayState>, body: Bytes) -> Result<Response, RelayError> {
    // Parsed by hand so a bad body is reported like every other failure.
    let request: RelayRequest = serde_json::from_slice(&body)
        .map_err(|e| RelayError::BadPayload(format!("Invalid request body: {}", e)))?;

    let api_key = config::get_api_key(&state.config.api_key_ref)
        .map_err(|e| RelayError::Configuration(e.to_string()))?;

    let completion = CompletionRequest {
        model: state.config.model.clone(),
        system_prompt: state.config.persona.clone(),
        turns: request.messages,
    };
    log::info!("Relaying {} turns to model {}", completion.turns.len(), completion.model);

    let reply = state
        .provider
        .open_stream(&api_key, &completion)
        .await
        .map_err(|e| RelayError::Upstream(format!("{:#}", e)))?;

    match reply {
        UpstreamReply::Streaming(stream) => Ok((
            [(header::CONTENT_TYPE, EVENT_STREAM)],
            Body::from_stream(stream),
        )
            .into_response()),
        UpstreamReply::Rejected { status, body } => {
            Err(RelayError::from_upstream_status(status, body))
        }
    }
}
