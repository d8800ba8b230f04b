use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeSet;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Identity & Authorization Records ---

/// Identity
///
/// The authenticated principal as reported by the external auth provider.
/// The console never creates or destroys identities, it only observes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Identity {
    /// Provider-issued unique id. Also the key of the profile document.
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Role
///
/// The coarse RBAC field. Anything the store returns that is not a known
/// role is coerced to `Staff`, the least privileged of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    #[default]
    Staff,
}

impl Role {
    /// Lenient parse: trims and lowercases, unknown or missing values yield the default.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
            Some("admin") => Role::Admin,
            Some("staff") => Role::Staff,
            _ => Role::default(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
        }
    }
}

/// Status
///
/// Account status. Unknown or missing values are coerced to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Status {
    #[default]
    Active,
    Disabled,
}

impl Status {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("active") => Status::Active,
            Some("disabled") => Status::Disabled,
            _ => Status::default(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Disabled => "disabled",
        }
    }
}

/// ProfileDocument
///
/// The raw authorization record as stored in the `profiles` collection/table.
/// Every field is optional and unvalidated; it must go through
/// [`Profile::from_document`] before any access decision sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, Default)]
pub struct ProfileDocument {
    pub role: Option<String>,
    pub status: Option<String>,
    pub permissions: Option<Vec<String>>,
}

/// Profile
///
/// The normalized authorization record for one identity.
/// `permissions` is a set: ordering and duplicates carry no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Profile {
    pub role: Role,
    pub status: Status,
    pub permissions: BTreeSet<String>,
}

impl Profile {
    /// Applies the defaults (`staff`, `active`, no permissions) to a raw document.
    /// Empty permission keys are dropped; the rest are kept verbatim and
    /// matched exactly.
    pub fn from_document(doc: ProfileDocument) -> Self {
        let permissions = doc
            .permissions
            .unwrap_or_default()
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            role: Role::parse(doc.role.as_deref()),
            status: Status::parse(doc.status.as_deref()),
            permissions,
        }
    }

    /// The profile substituted whenever the authoritative record cannot be read.
    pub fn fail_closed() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    pub fn has_permission(&self, key: &str) -> bool {
        self.permissions.contains(key)
    }
}

// --- Session Snapshot ---

/// SessionState
///
/// The single process-wide view of who is signed in. Identity and profile
/// are always published together, so a reader can never pair the profile of
/// one identity with a newer identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No auth notification has been received yet.
    #[default]
    Loading,
    /// An identity arrived and its profile fetch is still in flight.
    Resolving { identity: Identity },
    SignedOut,
    SignedIn {
        identity: Identity,
        profile: Profile,
        session_id: Uuid,
    },
}

/// SessionSnapshot
///
/// A state plus the generation that produced it. The generation increases
/// on every auth notification; results tagged with an older generation are
/// stale and must be dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub generation: u64,
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Loading,
            generation: 0,
            updated_at: Utc::now(),
        }
    }
}

impl SessionSnapshot {
    pub fn is_loading(&self) -> bool {
        matches!(
            self.state,
            SessionState::Loading | SessionState::Resolving { .. }
        )
    }

    /// The identity of a fully resolved session.
    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::SignedIn { identity, .. } => Some(identity),
            _ => None,
        }
    }

    pub fn profile(&self) -> Option<&Profile> {
        match &self.state {
            SessionState::SignedIn { profile, .. } => Some(profile),
            _ => None,
        }
    }

    /// The profile navigation and display code should use when nobody is signed in.
    pub fn profile_or_default(&self) -> Profile {
        self.profile().cloned().unwrap_or_default()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match &self.state {
            SessionState::SignedIn { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }

    /// scoped_to
    ///
    /// The snapshot as seen by a caller presenting `caller` as its session id.
    /// A signed-in session is only visible to the holder of its id; everyone
    /// else sees `SignedOut`. Loading states are shared as they are.
    pub fn scoped_to(&self, caller: Option<Uuid>) -> SessionSnapshot {
        match self.session_id() {
            Some(owner) if caller != Some(owner) => SessionSnapshot {
                state: SessionState::SignedOut,
                ..self.clone()
            },
            _ => self.clone(),
        }
    }
}

// --- Response Schemas (Output) ---

/// SessionView
///
/// Output schema for `GET /api/session`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionView {
    pub loading: bool,
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    #[ts(type = "string | null")]
    pub session_id: Option<Uuid>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl From<&SessionSnapshot> for SessionView {
    fn from(snapshot: &SessionSnapshot) -> Self {
        Self {
            loading: snapshot.is_loading(),
            identity: snapshot.identity().cloned(),
            profile: snapshot.profile().cloned(),
            session_id: snapshot.session_id(),
            updated_at: snapshot.updated_at,
        }
    }
}

/// SignInResponse
///
/// Output schema for `POST /api/auth/session`: who signed in and where the
/// client should navigate next.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignInResponse {
    pub identity: Identity,
    pub redirect_to: String,
    /// Also set as the `console_session` cookie; guarded views require it.
    #[ts(type = "string")]
    pub session_id: Uuid,
}

/// ViewResponse
///
/// Placeholder body for a console screen that passed its guards. The screens
/// themselves live in the front-end; this only confirms which view to mount.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ViewResponse {
    pub view: String,
    pub path: String,
}

/// NoAccessView
///
/// Output schema for `GET /no-access`: the denial details plus what the
/// current account actually holds.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NoAccessView {
    pub from: String,
    pub reason: String,
    pub required: Vec<String>,
    pub role: Role,
    pub status: Status,
    pub permissions: Vec<String>,
}

/// LoginView
///
/// Output schema for `GET /login`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginView {
    pub redirect_to: String,
    pub reason: Option<String>,
}
