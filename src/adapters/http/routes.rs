//! Axum router for the webhook endpoints.

use axum::routing::post;
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers::{
    fastspring_hook, github_cron_hook, github_hook, manual_hook, AppState,
};

/// One POST route per vendor plus the two internal-replay routes.
pub fn hook_routes() -> Router<AppState> {
    Router::new()
        .route("/github", post(github_hook))
        .route("/fastspring", post(fastspring_hook))
        .route("/manual", post(manual_hook))
        .route("/github-cron", post(github_cron_hook))
}

/// The complete service router, mounted at the root.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/hooks", hook_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
