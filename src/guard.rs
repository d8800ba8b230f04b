use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use url::form_urlencoded;
use uuid::Uuid;

use crate::{
    AppState,
    models::SessionSnapshot,
    policy::{self, AccessDecision, Redirect, RouteRequirement},
};

// --- Route Table ---

/// RouteEntry
///
/// One guarded console view and the requirement declared for it.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub path: &'static str,
    /// View identifier handed back to the front-end.
    pub view: &'static str,
    /// Sidebar label. Entries without one are not part of the navigation.
    pub label: Option<&'static str>,
    pub requirement: RouteRequirement,
}

/// RouteTable
///
/// The console's guarded routes as data. The shell requirement wraps every
/// entry (and every unknown path under the shell); each entry adds its own
/// requirement inside it.
#[derive(Debug, Clone)]
pub struct RouteTable {
    pub shell: RouteRequirement,
    pub entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new(shell: RouteRequirement) -> Self {
        Self {
            shell,
            entries: Vec::new(),
        }
    }

    pub fn route(
        mut self,
        path: &'static str,
        view: &'static str,
        label: Option<&'static str>,
        requirement: RouteRequirement,
    ) -> Self {
        self.entries.push(RouteEntry {
            path,
            view,
            label,
            requirement,
        });
        self
    }

    pub fn entry(&self, path: &str) -> Option<&RouteEntry> {
        let path = normalize_path(path);
        self.entries.iter().find(|e| e.path == path)
    }

    /// The ancestor chain of requirements for `path`, outermost first.
    pub fn chain_for(&self, path: &str) -> Vec<&RouteRequirement> {
        match self.entry(path) {
            Some(entry) => vec![&self.shell, &entry.requirement],
            None => vec![&self.shell],
        }
    }
}

fn normalize_path(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

// --- Caller Session ---

/// Cookie carrying the session id issued at sign-in.
pub const SESSION_COOKIE: &str = "console_session";

/// caller_session
///
/// The session id the request presents, if any. A missing or malformed
/// cookie is the same as no session.
pub fn caller_session(headers: &HeaderMap) -> Option<Uuid> {
    session_from_jar(&CookieJar::from_headers(headers))
}

pub fn session_from_jar(jar: &CookieJar) -> Option<Uuid> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

// --- Guard State Machine ---

/// GuardState
///
/// `Loading` makes no decision at all, not even a redirect, so an unknown
/// auth state never flashes the login page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardState {
    Loading,
    Render,
    Redirect(Redirect),
}

/// evaluate
///
/// Runs the access policy over the route's requirement chain for the given
/// session snapshot. Recomputed on every call.
pub fn evaluate(snapshot: &SessionSnapshot, table: &RouteTable, path: &str) -> GuardState {
    if snapshot.is_loading() {
        return GuardState::Loading;
    }

    let profile = snapshot.profile_or_default();
    let chain = table.chain_for(path);

    match policy::decide_chain(snapshot.identity(), &profile, &chain, path) {
        AccessDecision::Allow => GuardState::Render,
        AccessDecision::DenyRedirect(redirect) => GuardState::Redirect(redirect),
    }
}

/// redirect_location
///
/// Builds `/login?...` or `/no-access?...` carrying the reason payload as
/// query parameters. Multiple required keys are comma-joined.
pub fn redirect_location(redirect: &Redirect) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("reason", redirect.reason.as_str());
    query.append_pair("from", &redirect.from);
    if let Some(required) = &redirect.required {
        query.append_pair("required", &required.to_string());
    }
    format!("{}?{}", redirect.target.path(), query.finish())
}

fn redirect_response(redirect: Redirect) -> Response {
    let location = redirect_location(&redirect);
    let mut response = (StatusCode::SEE_OTHER, Json(redirect)).into_response();
    match HeaderValue::from_str(&location) {
        Ok(value) => {
            response.headers_mut().insert(header::LOCATION, value);
        }
        Err(e) => tracing::error!(error = %e, "unencodable redirect location"),
    }
    response
}

/// route_guard
///
/// Middleware wrapping the console shell. Waits briefly for the session to
/// settle; if it is still loading the request gets `503` with no body.
/// A request that does not present the signed-in session's id is evaluated
/// with no identity. Denials are `303 See Other` so the denied route is not
/// kept in history.
pub async fn route_guard(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let caller = caller_session(request.headers());
    let snapshot = state
        .session
        .settled(state.config.guard_settle_timeout)
        .await
        .scoped_to(caller);

    match evaluate(&snapshot, &state.routes, &path) {
        GuardState::Render => next.run(request).await,
        GuardState::Loading => {
            tracing::debug!(path = %path, "session still loading, deferring decision");
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
            response
        }
        GuardState::Redirect(redirect) => {
            tracing::info!(
                path = %path,
                reason = %redirect.reason,
                target = redirect.target.path(),
                "access denied"
            );
            redirect_response(redirect)
        }
    }
}
