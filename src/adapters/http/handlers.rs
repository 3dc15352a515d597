//! HTTP handlers for the webhook endpoints.
//!
//! Handlers stay thin: they reduce the axum request to a [`RawRequest`],
//! hand it to the orchestrator and map the outcome onto the fixed
//! plain-text response contract (`"ok"` / `"pong"` / `"cancelled"`,
//! 403 on signature failure, 400 on malformed payloads, 500 otherwise).

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::adapters::vendors::{
    FastspringAdapter, GithubAdapter, GithubCronAdapter, ManualAdapter, RawRequest, VendorAdapter,
};
use crate::application::WebhookOrchestrator;
use crate::domain::billing::BillingError;

/// Shared state for the webhook routes. Cloned per request; all members
/// are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<WebhookOrchestrator>,
    pub github: Arc<GithubAdapter>,
    pub fastspring: Arc<FastspringAdapter>,
    pub manual: Arc<ManualAdapter>,
    pub github_cron: Arc<GithubCronAdapter>,
}

pub async fn github_hook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    process(&state, state.github.as_ref(), &headers, body).await
}

pub async fn fastspring_hook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    process(&state, state.fastspring.as_ref(), &headers, body).await
}

/// Internal-replay route. HTTP callers can never attach the internal
/// payload the manual adapter verifies against, so every external request
/// is rejected with 403; in-process callers go through the orchestrator
/// directly.
pub async fn manual_hook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    process(&state, state.manual.as_ref(), &headers, body).await
}

/// Internal-replay route for the renewal scanner; same rejection contract
/// as [`manual_hook`].
pub async fn github_cron_hook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    process(&state, state.github_cron.as_ref(), &headers, body).await
}

async fn process(
    state: &AppState,
    adapter: &dyn VendorAdapter,
    headers: &HeaderMap,
    body: Bytes,
) -> Response {
    let request = RawRequest::new(flatten_headers(headers), body.to_vec());
    match state.orchestrator.process(adapter, &request).await {
        Ok(outcome) => (StatusCode::OK, outcome.body().to_string()).into_response(),
        Err(e) => error_response(e),
    }
}

fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn error_response(err: BillingError) -> Response {
    match err {
        BillingError::Forbidden => StatusCode::FORBIDDEN.into_response(),
        BillingError::MalformedPayload(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
        other => {
            error!(error = %other, "webhook processing failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
