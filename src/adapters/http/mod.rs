//! HTTP adapter - axum routes for the vendor webhook endpoints.

mod handlers;
mod routes;

pub use handlers::AppState;
pub use routes::router;
