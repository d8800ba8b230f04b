use crate::{
    AppState,
    guard::{self, RouteTable},
    handlers,
    policy::{RouteRequirement, permissions},
};
use axum::{Router, middleware, routing::get};

/// route_table
///
/// The requirement declarations for the console. The shell admits staff
/// and admins; each view adds the permission key it needs.
pub fn route_table() -> RouteTable {
    RouteTable::new(RouteRequirement::shell())
        .route(
            "/",
            "dashboard",
            Some("Dashboard"),
            RouteRequirement::permission(permissions::VIEW_REPORTS),
        )
        .route(
            "/users",
            "users",
            Some("Users"),
            RouteRequirement::permission(permissions::MANAGE_USERS),
        )
        .route(
            "/contract",
            "contracts",
            Some("Contracts"),
            RouteRequirement::permission(permissions::MANAGE_CONTRACTS),
        )
        .route(
            "/faqs",
            "faqs",
            Some("FAQs"),
            RouteRequirement::permission(permissions::MANAGE_FAQS),
        )
        .route(
            "/content",
            "app-settings",
            Some("App Settings"),
            RouteRequirement::permission(permissions::MANAGE_FAQS),
        )
        // Reachable by URL; not linked from the sidebar.
        .route(
            "/user-feedback",
            "user-feedback",
            None,
            RouteRequirement::permission(permissions::VIEW_REPORTS),
        )
        // Any signed-in account can open its own profile.
        .route("/profile", "profile", None, RouteRequirement::shell())
}

/// Console Router Module
///
/// Mounts one generic view handler per table entry and wraps the whole
/// shell, fallback included, in the route guard.
pub fn console_routes(state: AppState) -> Router<AppState> {
    let router = state
        .routes
        .entries
        .iter()
        .fold(Router::new(), |router, entry| {
            router.route(entry.path, get(handlers::render_view))
        });

    router
        .fallback(handlers::not_found_view)
        .layer(middleware::from_fn_with_state(state, guard::route_guard))
}
