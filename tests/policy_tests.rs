use std::collections::BTreeSet;
use venue_console::{
    models::{Identity, Profile, ProfileDocument, Role, Status},
    policy::{
        AccessDecision, DenyReason, RedirectTarget, RequiredPermission, RouteRequirement,
        decide, decide_chain, has_all, permissions,
    },
};

fn profile(role: Role, status: Status, perms: &[&str]) -> Profile {
    Profile {
        role,
        status,
        permissions: perms.iter().map(|p| p.to_string()).collect(),
    }
}

fn someone() -> Identity {
    Identity::new("uid-1")
}

fn granted(perms: &[&str]) -> BTreeSet<String> {
    perms.iter().map(|p| p.to_string()).collect()
}

// --- hasAll ---

#[test]
fn test_has_all_without_requirement_is_true_even_for_empty_grants() {
    assert!(has_all(&BTreeSet::new(), None));
    assert!(has_all(&granted(&["view_reports"]), None));
}

#[test]
fn test_has_all_is_conjunctive() {
    let required = RequiredPermission::All(vec!["manage_users".into(), "view_reports".into()]);

    assert!(has_all(&granted(&["manage_users", "view_reports", "manage_faqs"]), Some(&required)));
    // A partial match fails exactly like no match.
    assert!(!has_all(&granted(&["manage_users"]), Some(&required)));
    assert!(!has_all(&granted(&[]), Some(&required)));
}

#[test]
fn test_has_all_single_key() {
    let required = RequiredPermission::One("manage_faqs".into());
    assert!(has_all(&granted(&["manage_faqs"]), Some(&required)));
    assert!(!has_all(&granted(&["manage_users"]), Some(&required)));
}

#[test]
fn test_has_all_empty_key_list_is_satisfied() {
    let required = RequiredPermission::All(vec![]);
    assert!(has_all(&BTreeSet::new(), Some(&required)));
}

// --- decide ---

#[test]
fn test_no_identity_always_redirects_to_login() {
    let requirements = [
        RouteRequirement::shell(),
        RouteRequirement::admin_only(),
        RouteRequirement::permission(permissions::MANAGE_USERS),
    ];
    let profiles = [
        Profile::default(),
        profile(Role::Admin, Status::Active, &permissions::ALL),
        profile(Role::Staff, Status::Disabled, &[]),
    ];

    for requirement in &requirements {
        for p in &profiles {
            match decide(None, p, requirement, "/users") {
                AccessDecision::DenyRedirect(redirect) => {
                    assert_eq!(redirect.target, RedirectTarget::Login);
                    assert_eq!(redirect.reason, DenyReason::Unauthenticated);
                    assert_eq!(redirect.from, "/users");
                    assert_eq!(redirect.required, None);
                }
                AccessDecision::Allow => panic!("anonymous request must not be allowed"),
            }
        }
    }
}

#[test]
fn test_scenario_a_staff_with_permission_is_allowed() {
    let p = profile(Role::Staff, Status::Active, &["view_reports"]);
    let req = RouteRequirement::permission("view_reports");
    assert_eq!(decide(Some(&someone()), &p, &req, "/"), AccessDecision::Allow);
}

#[test]
fn test_scenario_b_staff_missing_permission() {
    let p = profile(Role::Staff, Status::Active, &[]);
    let req = RouteRequirement::permission("manage_users");

    match decide(Some(&someone()), &p, &req, "/users") {
        AccessDecision::DenyRedirect(redirect) => {
            assert_eq!(redirect.target, RedirectTarget::NoAccess);
            assert_eq!(redirect.reason, DenyReason::MissingPermission);
            assert_eq!(
                redirect.required,
                Some(RequiredPermission::One("manage_users".into()))
            );
            assert_eq!(redirect.from, "/users");
        }
        AccessDecision::Allow => panic!("expected missing-permission"),
    }
}

#[test]
fn test_scenario_c_disabled_staff_is_inactive() {
    let p = profile(Role::Staff, Status::Disabled, &[]);
    for req in [RouteRequirement::shell(), RouteRequirement::permission("manage_users")] {
        let decision = decide(Some(&someone()), &p, &req, "/profile");
        assert_eq!(decision.reason(), Some(DenyReason::Inactive));
    }
}

#[test]
fn test_scenario_d_staff_on_admin_only_route_is_forbidden() {
    let p = profile(Role::Staff, Status::Active, &permissions::ALL);
    let decision = decide(Some(&someone()), &p, &RouteRequirement::admin_only(), "/settings");
    assert_eq!(decision.reason(), Some(DenyReason::Forbidden));
}

#[test]
fn test_scenario_e_anonymous_keeps_requested_path() {
    let decision = decide(None, &Profile::default(), &RouteRequirement::shell(), "/contract");
    match decision {
        AccessDecision::DenyRedirect(redirect) => {
            assert_eq!(redirect.target.path(), "/login");
            assert_eq!(redirect.from, "/contract");
        }
        AccessDecision::Allow => panic!("expected login redirect"),
    }
}

#[test]
fn test_forbidden_takes_precedence_over_inactive() {
    // Role fails and status fails: the role check runs first.
    let p = profile(Role::Staff, Status::Disabled, &[]);
    let decision = decide(Some(&someone()), &p, &RouteRequirement::admin_only(), "/");
    assert_eq!(decision.reason(), Some(DenyReason::Forbidden));
}

#[test]
fn test_inactive_takes_precedence_over_missing_permission() {
    let p = profile(Role::Staff, Status::Disabled, &[]);
    let decision = decide(
        Some(&someone()),
        &p,
        &RouteRequirement::permission("manage_users"),
        "/users",
    );
    assert_eq!(decision.reason(), Some(DenyReason::Inactive));
}

#[test]
fn test_admin_does_not_bypass_permission_check() {
    let p = profile(Role::Admin, Status::Active, &[]);
    let decision = decide(
        Some(&someone()),
        &p,
        &RouteRequirement::permission("manage_users"),
        "/users",
    );
    assert_eq!(decision.reason(), Some(DenyReason::MissingPermission));
}

#[test]
fn test_admin_passes_admin_only_route() {
    let p = profile(Role::Admin, Status::Active, &[]);
    let decision = decide(Some(&someone()), &p, &RouteRequirement::admin_only(), "/");
    assert!(decision.is_allowed());
}

#[test]
fn test_disabled_admin_is_inactive() {
    let p = profile(Role::Admin, Status::Disabled, &permissions::ALL);
    let decision = decide(Some(&someone()), &p, &RouteRequirement::admin_only(), "/");
    assert_eq!(decision.reason(), Some(DenyReason::Inactive));
}

#[test]
fn test_multi_key_requirement_reports_full_list() {
    let p = profile(Role::Staff, Status::Active, &["manage_faqs"]);
    let req = RouteRequirement::all_permissions(["manage_faqs", "view_reports"]);

    match decide(Some(&someone()), &p, &req, "/content") {
        AccessDecision::DenyRedirect(redirect) => {
            assert_eq!(
                redirect.required.map(|r| r.to_string()),
                Some("manage_faqs,view_reports".to_string())
            );
        }
        AccessDecision::Allow => panic!("partial grant must be denied"),
    }
}

#[test]
fn test_decide_is_idempotent() {
    let p = profile(Role::Staff, Status::Active, &["view_reports"]);
    let identity = someone();
    for req in [
        RouteRequirement::permission("view_reports"),
        RouteRequirement::permission("manage_users"),
        RouteRequirement::admin_only(),
    ] {
        let first = decide(Some(&identity), &p, &req, "/x");
        let second = decide(Some(&identity), &p, &req, "/x");
        assert_eq!(first, second);
    }
}

#[test]
fn test_decide_on_normalized_unknown_values() {
    // Unknown role and status fall back to staff/active before the policy runs.
    let p = Profile::from_document(ProfileDocument {
        role: Some("superuser".into()),
        status: Some("archived".into()),
        permissions: None,
    });
    assert_eq!(p.role, Role::Staff);
    assert_eq!(p.status, Status::Active);

    let decision = decide(Some(&someone()), &p, &RouteRequirement::admin_only(), "/");
    assert_eq!(decision.reason(), Some(DenyReason::Forbidden));
}

// --- decide_chain ---

#[test]
fn test_chain_requires_every_guard() {
    let shell = RouteRequirement::admin_only();
    let inner = RouteRequirement::permission("view_reports");
    let staff = profile(Role::Staff, Status::Active, &["view_reports"]);

    // Inner guard alone would allow; the outer admin-only shell denies.
    let decision = decide_chain(Some(&someone()), &staff, &[&shell, &inner], "/");
    assert_eq!(decision.reason(), Some(DenyReason::Forbidden));

    let admin = profile(Role::Admin, Status::Active, &["view_reports"]);
    assert!(decide_chain(Some(&someone()), &admin, &[&shell, &inner], "/").is_allowed());
}

#[test]
fn test_chain_reports_first_failing_guard() {
    let shell = RouteRequirement::shell();
    let inner = RouteRequirement::permission("manage_contracts");
    let p = profile(Role::Staff, Status::Active, &[]);

    let decision = decide_chain(Some(&someone()), &p, &[&shell, &inner], "/contract");
    assert_eq!(decision.reason(), Some(DenyReason::MissingPermission));
}
