use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that do not pass through the route guard. The login and
/// no-access screens only display the payload the guard attached.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe.
        .route("/health", get(|| async { "ok" }))
        // GET /api/session
        // Current loading flag, identity and profile.
        .route("/api/session", get(handlers::get_session))
        // GET /api/navigation
        // Sidebar items with permission hints.
        .route("/api/navigation", get(handlers::get_navigation))
        // POST /api/auth/session signs in, DELETE signs out.
        .route(
            "/api/auth/session",
            post(handlers::sign_in).delete(handlers::sign_out),
        )
        .route("/login", get(handlers::login_view))
        .route("/no-access", get(handlers::no_access_view))
}
