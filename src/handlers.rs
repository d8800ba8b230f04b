use crate::{
    AppState,
    auth::{AuthError, Credential},
    config::Env,
    guard::{self, SESSION_COOKIE},
    models::{LoginView, NoAccessView, SessionState, SessionView, SignInResponse, ViewResponse},
    navigation::{self, NavItem},
    policy::DenyReason,
};
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// --- Errors ---

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// ApiError
///
/// Failures of the session endpoints. Authorization denials on console
/// views are not errors and never go through this type.
#[derive(Debug)]
pub enum ApiError {
    /// No usable credential was presented.
    Unauthorized,
    InvalidCredential,
    ExpiredToken,
    SignInMethodNotAllowed,
    AccountDisabled,
    /// The request does not carry the id of the signed-in session.
    NoSession,
    /// The session did not pick up the new identity in time.
    SessionUnavailable,
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Couldn't sign you in. Please try again.",
            ),
            ApiError::InvalidCredential => (
                StatusCode::UNAUTHORIZED,
                "invalid_credential",
                "The sign-in credential is invalid.",
            ),
            ApiError::ExpiredToken => (
                StatusCode::UNAUTHORIZED,
                "token_expired",
                "Your sign-in has expired. Please sign in again.",
            ),
            ApiError::SignInMethodNotAllowed => (
                StatusCode::UNAUTHORIZED,
                "sign_in_method_not_allowed",
                "This sign-in method is not enabled.",
            ),
            ApiError::AccountDisabled => (
                StatusCode::FORBIDDEN,
                "account_disabled",
                "This account has been disabled.",
            ),
            ApiError::NoSession => (
                StatusCode::UNAUTHORIZED,
                "no_session",
                "No active session for this client.",
            ),
            ApiError::SessionUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "session_unavailable",
                "The session could not be established. Try again.",
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_server_error",
                "internal server error",
            ),
        };
        let body = ErrorBody {
            code,
            message: message.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::ExpiredToken => ApiError::ExpiredToken,
            AuthError::InvalidToken => ApiError::InvalidCredential,
            AuthError::CredentialRejected => ApiError::SignInMethodNotAllowed,
            AuthError::SubscriptionUnavailable(_) => ApiError::Internal,
        }
    }
}

// --- Query Structs ---

#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SignInQuery {
    /// Where to go after sign-in. Only same-origin paths are honoured.
    pub redirect_to: Option<String>,
}

/// RedirectQuery
///
/// The reason payload the guard attaches to `/login` and `/no-access`.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RedirectQuery {
    pub from: Option<String>,
    pub reason: Option<String>,
    /// Comma-separated permission keys.
    pub required: Option<String>,
}

/// Same-origin paths only. Browsers read `/\host` as `//host`, so
/// backslashes and control characters are rejected anywhere.
fn is_local_path(path: &str) -> bool {
    let mut chars = path.chars();
    chars.next() == Some('/')
        && !matches!(chars.next(), Some('/' | '\\'))
        && !path.chars().any(|c| c == '\\' || c.is_control())
}

fn safe_redirect(target: Option<String>) -> String {
    match target {
        Some(path) if is_local_path(&path) => path,
        _ => "/".to_string(),
    }
}

// --- Handlers ---

/// get_session
///
/// [Public Route] The session as seen by the caller: loading flag, identity
/// and profile. Callers without the session cookie see a signed-out session.
#[utoipa::path(
    get,
    path = "/api/session",
    responses((status = 200, description = "Session", body = SessionView))
)]
pub async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> Json<SessionView> {
    let snapshot = state
        .session
        .snapshot()
        .scoped_to(guard::caller_session(&headers));
    Json(SessionView::from(&snapshot))
}

/// get_navigation
///
/// [Public Route] Every sidebar item, with the ones the current profile
/// cannot open dimmed rather than removed.
#[utoipa::path(
    get,
    path = "/api/navigation",
    responses((status = 200, description = "Navigation", body = [NavItem]))
)]
pub async fn get_navigation(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<Vec<NavItem>> {
    let profile = state
        .session
        .snapshot()
        .scoped_to(guard::caller_session(&headers))
        .profile_or_default();
    Json(navigation::build_navigation(&state.routes, &profile))
}

/// sign_in
///
/// [Public Route] Signs in with a bearer ID token (or, locally, an
/// `x-user-id` header), waits for the session to resolve the profile and
/// hands the session id back as the `console_session` cookie. Accounts
/// whose profile is disabled are signed straight back out.
#[utoipa::path(
    post,
    path = "/api/auth/session",
    params(SignInQuery),
    responses(
        (status = 200, description = "Signed in", body = SignInResponse),
        (status = 401, description = "Invalid or expired credential", body = ErrorBody),
        (status = 403, description = "Account disabled", body = ErrorBody),
        (status = 503, description = "Session did not settle", body = ErrorBody)
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    Query(query): Query<SignInQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SignInResponse>), ApiError> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let credential = match bearer {
        Some(token) => Credential::IdToken(token.to_string()),
        None if state.config.env == Env::Local => {
            let id = headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
                .ok_or(ApiError::Unauthorized)?;
            let email = headers
                .get("x-user-email")
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            Credential::LocalUser {
                id: id.to_string(),
                email,
            }
        }
        None => return Err(ApiError::Unauthorized),
    };

    // Watch from before the sign-in so the notification it triggers cannot be missed.
    let mut session = state.session.watch();
    let before = session.borrow().generation;

    let identity = state.auth.sign_in(credential).await.map_err(|e| {
        tracing::warn!(error = %e, "sign-in rejected");
        ApiError::from(e)
    })?;

    let wait = state.config.profile_fetch_timeout + state.config.guard_settle_timeout;
    let settled = tokio::time::timeout(
        wait,
        session.wait_for(|s| s.generation > before && !s.is_loading()),
    )
    .await
    .ok()
    .and_then(Result::ok)
    .map(|snapshot| snapshot.clone());

    let Some(snapshot) = settled else {
        tracing::warn!(identity_id = %identity.id, "session did not settle after sign-in");
        return Err(ApiError::SessionUnavailable);
    };

    let (profile, session_id) = match snapshot.state {
        SessionState::SignedIn {
            identity: signed_in,
            profile,
            session_id,
        } if signed_in.id == identity.id => (profile, session_id),
        _ => {
            tracing::info!(identity_id = %identity.id, "sign-in superseded before the session settled");
            return Err(ApiError::Unauthorized);
        }
    };

    if !profile.is_active() {
        tracing::info!(identity_id = %identity.id, "disabled account signed in, signing out");
        state.auth.sign_out().await?;
        return Err(ApiError::AccountDisabled);
    }

    let cookie = Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path("/")
        .http_only(true)
        .secure(state.config.env == Env::Production)
        .same_site(SameSite::Lax)
        .build();

    Ok((
        jar.add(cookie),
        Json(SignInResponse {
            identity,
            redirect_to: safe_redirect(query.redirect_to),
            session_id,
        }),
    ))
}

/// sign_out
///
/// [Public Route] Ends the current session. Only the holder of the
/// session cookie may end it.
#[utoipa::path(
    delete,
    path = "/api/auth/session",
    responses(
        (status = 204, description = "Signed out"),
        (status = 401, description = "Caller does not hold the session", body = ErrorBody)
    )
)]
pub async fn sign_out(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), ApiError> {
    let caller = guard::session_from_jar(&jar);
    let current = state.session.snapshot().session_id();
    if caller.is_none() || caller != current {
        return Err(ApiError::NoSession);
    }

    state.auth.sign_out().await?;
    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
    Ok((jar, StatusCode::NO_CONTENT))
}

/// login_view
///
/// [Public Route] The login screen's data: where to return after sign-in.
#[utoipa::path(
    get,
    path = "/login",
    params(RedirectQuery),
    responses((status = 200, description = "Login view", body = LoginView))
)]
pub async fn login_view(Query(query): Query<RedirectQuery>) -> Json<LoginView> {
    Json(LoginView {
        redirect_to: safe_redirect(query.from),
        reason: query.reason,
    })
}

/// no_access_view
///
/// [Public Route] Explains a denial: what was requested, why it was
/// refused and what the account holds. Not behind the shell guard, so a
/// disabled account redirected here does not loop.
#[utoipa::path(
    get,
    path = "/no-access",
    params(RedirectQuery),
    responses((status = 200, description = "No-access view", body = NoAccessView))
)]
pub async fn no_access_view(
    State(state): State<AppState>,
    Query(query): Query<RedirectQuery>,
    headers: HeaderMap,
) -> Json<NoAccessView> {
    let profile = state
        .session
        .snapshot()
        .scoped_to(guard::caller_session(&headers))
        .profile_or_default();

    let required = query
        .required
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect();

    Json(NoAccessView {
        from: safe_redirect(query.from),
        reason: query
            .reason
            .unwrap_or_else(|| DenyReason::MissingPermission.as_str().to_string()),
        required,
        role: profile.role,
        status: profile.status,
        permissions: profile.permissions.into_iter().collect(),
    })
}

/// render_view
///
/// [Guarded Route] Reached only after every guard in the route's chain
/// allowed the request. Tells the client which console view to mount.
pub async fn render_view(State(state): State<AppState>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    match state.routes.entry(&path) {
        Some(entry) => Json(ViewResponse {
            view: entry.view.to_string(),
            path,
        })
        .into_response(),
        None => not_found_view(uri).await,
    }
}

/// not_found_view
///
/// [Guarded Route] Unknown paths inside the console shell.
pub async fn not_found_view(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ViewResponse {
            view: "not-found".to_string(),
            path: uri.path().to_string(),
        }),
    )
        .into_response()
}
