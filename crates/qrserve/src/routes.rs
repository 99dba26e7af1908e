use axum::Router;
use axum::http::{HeaderValue, header};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::handlers;

/// Value sent on every response so browsers never reuse a previous session's files.
pub const NO_CACHE: &str = "no-store, no-cache, must-revalidate";

/// Create the file serving router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .fallback(handlers::serve_path)
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static(NO_CACHE),
        ))
        .layer(TraceLayer::new_for_http())
}
