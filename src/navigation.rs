use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    guard::RouteTable,
    models::Profile,
    policy::{self, RequiredPermission},
};

pub const NO_ACCESS_HINT: &str = "No access";

/// NavItem
///
/// One sidebar link. Items the profile cannot open stay in the list,
/// dimmed and with a hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NavItem {
    pub path: String,
    pub label: String,
    pub required: Option<RequiredPermission>,
    pub accessible: bool,
    pub dimmed: bool,
    pub hint: Option<String>,
}

/// build_navigation
///
/// Uses the same `has_all` predicate as the guard. Role and status are not
/// considered here; the guard enforces those.
pub fn build_navigation(table: &RouteTable, profile: &Profile) -> Vec<NavItem> {
    table
        .entries
        .iter()
        .filter_map(|entry| {
            let label = entry.label?;
            let required = entry.requirement.required_permission.clone();
            let accessible = policy::has_all(&profile.permissions, required.as_ref());
            Some(NavItem {
                path: entry.path.to_string(),
                label: label.to_string(),
                required,
                accessible,
                dimmed: !accessible,
                hint: (!accessible).then(|| NO_ACCESS_HINT.to_string()),
            })
        })
        .collect()
}
