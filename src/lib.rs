use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Access-control core, leaf first.
pub mod auth;
pub mod repository;
pub mod resolver;
pub mod session;
pub mod policy;
pub mod guard;
pub mod navigation;

// Supporting layers.
pub mod config;
pub mod handlers;
pub mod models;

// Module for routing segregation (Public, Console).
pub mod routes;
use routes::{console, public};

// --- Public Re-exports ---

pub use auth::{AuthProvider, AuthProviderState, IdTokenAuthProvider, MockAuthProvider};
pub use config::AppConfig;
pub use guard::RouteTable;
pub use repository::{MockProfileStore, ProfileStoreState};
pub use resolver::ProfileResolver;
pub use session::{SessionStore, SubscriptionHandle};

/// ApiDoc
///
/// OpenAPI document for the console's session and display endpoints,
/// served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_session, handlers::get_navigation, handlers::sign_in,
        handlers::sign_out, handlers::login_view, handlers::no_access_view,
    ),
    components(
        schemas(
            models::Identity, models::Role, models::Status, models::Profile,
            models::SessionView, models::SignInResponse, models::ViewResponse,
            models::NoAccessView, models::LoginView, navigation::NavItem,
            policy::RequiredPermission, policy::RouteRequirement, policy::Redirect,
            policy::RedirectTarget, policy::DenyReason, handlers::ErrorBody,
        )
    ),
    tags(
        (name = "venue-console", description = "Venue Console access-control API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The shared container for the session, its collaborators and the route
/// table. Cloning is cheap; everything mutable sits behind the session store.
#[derive(Clone)]
pub struct AppState {
    /// The single source of the current identity/profile snapshot.
    pub session: Arc<SessionStore>,
    /// External auth provider (ID tokens in production, mock in tests).
    pub auth: AuthProviderState,
    /// Requirement declarations for every guarded view.
    pub routes: Arc<RouteTable>,
    pub config: AppConfig,
}

impl AppState {
    /// Wires a resolver over `store` and a fresh, not yet subscribed session store.
    pub fn new(config: AppConfig, store: ProfileStoreState, auth: AuthProviderState) -> Self {
        let resolver = ProfileResolver::new(store, config.profile_fetch_timeout);
        Self {
            session: SessionStore::new(resolver),
            auth,
            routes: Arc::new(console::route_table()),
            config,
        }
    }

    /// Attaches the session store to the auth provider.
    pub async fn start_session(&self) -> Result<SubscriptionHandle, session::SessionError> {
        self.session.subscribe(Arc::clone(&self.auth)).await
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles public and guarded routes, the observability layers and the
/// application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public routes: no guard.
        .merge(public::public_routes())
        // Console shell: every view and the not-found fallback run behind the guard.
        .merge(console::console_routes(state.clone()))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    x_request_id.clone(),
                    MakeRequestUuid,
                ))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for each request, tagged with its `x-request-id` so every log line
/// of a request (guard decisions included) can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
