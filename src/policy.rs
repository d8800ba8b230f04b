use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::models::{Identity, Profile, Role};

/// Permission Catalog
///
/// The permission keys the user-management screens can grant.
pub mod permissions {
    pub const MANAGE_CONTRACTS: &str = "manage_contracts";
    pub const MANAGE_FAQS: &str = "manage_faqs";
    pub const MANAGE_USERS: &str = "manage_users";
    pub const VIEW_REPORTS: &str = "view_reports";

    pub const ALL: [&str; 4] = [MANAGE_CONTRACTS, MANAGE_FAQS, MANAGE_USERS, VIEW_REPORTS];
}

// --- Route Requirements ---

/// RequiredPermission
///
/// A single permission key or a list of keys, all of which must be held.
/// Serialized untagged so it reads as either `"manage_users"` or
/// `["manage_users", "view_reports"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(untagged)]
#[ts(export)]
pub enum RequiredPermission {
    One(String),
    All(Vec<String>),
}

impl RequiredPermission {
    /// Coerces to a list of keys.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            RequiredPermission::One(key) => vec![key.as_str()],
            RequiredPermission::All(keys) => keys.iter().map(String::as_str).collect(),
        }
    }
}

impl fmt::Display for RequiredPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keys().join(","))
    }
}

/// RouteRequirement
///
/// What a guarded route demands. Declared once when the route table is
/// assembled and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RouteRequirement {
    pub allow_staff: bool,
    pub required_permission: Option<RequiredPermission>,
}

impl RouteRequirement {
    /// Staff and admins, no permission key.
    pub fn shell() -> Self {
        Self {
            allow_staff: true,
            required_permission: None,
        }
    }

    pub fn admin_only() -> Self {
        Self {
            allow_staff: false,
            required_permission: None,
        }
    }

    /// Staff and admins holding `key`.
    pub fn permission(key: impl Into<String>) -> Self {
        Self {
            allow_staff: true,
            required_permission: Some(RequiredPermission::One(key.into())),
        }
    }

    pub fn all_permissions<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow_staff: true,
            required_permission: Some(RequiredPermission::All(
                keys.into_iter().map(Into::into).collect(),
            )),
        }
    }

    pub fn with_allow_staff(mut self, allow_staff: bool) -> Self {
        self.allow_staff = allow_staff;
        self
    }
}

// --- Decisions ---

/// Where a denied request is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum RedirectTarget {
    Login,
    NoAccess,
}

impl RedirectTarget {
    pub fn path(&self) -> &'static str {
        match self {
            RedirectTarget::Login => "/login",
            RedirectTarget::NoAccess => "/no-access",
        }
    }
}

/// Why a request was denied. The variant order in [`decide`] determines
/// which reason is reported when several would apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum DenyReason {
    Unauthenticated,
    Forbidden,
    Inactive,
    MissingPermission,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Unauthenticated => "unauthenticated",
            DenyReason::Forbidden => "forbidden",
            DenyReason::Inactive => "inactive",
            DenyReason::MissingPermission => "missing-permission",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Redirect
///
/// The navigation payload attached to a denial. The login and no-access
/// views read it for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Redirect {
    pub target: RedirectTarget,
    pub reason: DenyReason,
    /// The path originally requested, so the client can return after sign-in.
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<RequiredPermission>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    DenyRedirect(Redirect),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            AccessDecision::Allow => None,
            AccessDecision::DenyRedirect(redirect) => Some(redirect.reason),
        }
    }

    fn deny(target: RedirectTarget, reason: DenyReason, from: &str) -> Self {
        AccessDecision::DenyRedirect(Redirect {
            target,
            reason,
            from: from.to_string(),
            required: None,
        })
    }
}

// --- Policy ---

/// has_all
///
/// Conjunctive membership: true iff every required key is granted.
/// No requirement is always satisfied, even by an empty grant set.
/// Shared by the guard and the navigation so both agree on what is accessible.
pub fn has_all(granted: &BTreeSet<String>, required: Option<&RequiredPermission>) -> bool {
    match required {
        None => true,
        Some(required) => required.keys().iter().all(|key| granted.contains(*key)),
    }
}

/// decide
///
/// Pure access decision for one route requirement. Checks run in a fixed
/// order and the first failure determines the reported reason:
/// identity, role, status, then permissions. Admins are subject to the
/// permission check like everyone else.
pub fn decide(
    identity: Option<&Identity>,
    profile: &Profile,
    requirement: &RouteRequirement,
    requested_path: &str,
) -> AccessDecision {
    if identity.is_none() {
        return AccessDecision::deny(
            RedirectTarget::Login,
            DenyReason::Unauthenticated,
            requested_path,
        );
    }

    let role_ok = profile.role == Role::Admin
        || (requirement.allow_staff && profile.role == Role::Staff);
    if !role_ok {
        return AccessDecision::deny(
            RedirectTarget::NoAccess,
            DenyReason::Forbidden,
            requested_path,
        );
    }

    if !profile.is_active() {
        return AccessDecision::deny(
            RedirectTarget::NoAccess,
            DenyReason::Inactive,
            requested_path,
        );
    }

    let required = requirement.required_permission.as_ref();
    if !has_all(&profile.permissions, required) {
        return AccessDecision::DenyRedirect(Redirect {
            target: RedirectTarget::NoAccess,
            reason: DenyReason::MissingPermission,
            from: requested_path.to_string(),
            required: required.cloned(),
        });
    }

    AccessDecision::Allow
}

/// decide_chain
///
/// Evaluates nested guards outermost first. A request has to pass every
/// requirement in its ancestor chain; the first denial wins.
pub fn decide_chain(
    identity: Option<&Identity>,
    profile: &Profile,
    chain: &[&RouteRequirement],
    requested_path: &str,
) -> AccessDecision {
    for requirement in chain {
        let decision = decide(identity, profile, requirement, requested_path);
        if !decision.is_allowed() {
            return decision;
        }
    }
    AccessDecision::Allow
}
