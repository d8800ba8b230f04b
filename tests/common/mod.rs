#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use venue_console::{
    AppConfig, AppState, MockAuthProvider, MockProfileStore,
    guard::SESSION_COOKIE,
    models::{Identity, ProfileDocument, SessionSnapshot},
};

pub fn doc(role: &str, status: &str, permissions: &[&str]) -> ProfileDocument {
    ProfileDocument {
        role: Some(role.to_string()),
        status: Some(status.to_string()),
        permissions: Some(permissions.iter().map(|p| p.to_string()).collect()),
    }
}

pub fn identity(id: &str) -> Identity {
    Identity {
        email: Some(format!("{id}@example.com")),
        ..Identity::new(id)
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        profile_fetch_timeout: Duration::from_millis(500),
        guard_settle_timeout: Duration::from_millis(50),
        ..AppConfig::default()
    }
}

/// State wired to a mock provider and store, already subscribed.
pub async fn subscribed_state(store: MockProfileStore) -> (AppState, Arc<MockAuthProvider>) {
    let provider = Arc::new(MockAuthProvider::new());
    let state = AppState::new(test_config(), Arc::new(store), provider.clone());
    state
        .start_session()
        .await
        .expect("mock subscription should succeed");
    (state, provider)
}

/// Waits until the snapshot satisfies `pred`, panicking after two seconds.
pub async fn wait_until<F>(state: &AppState, pred: F) -> SessionSnapshot
where
    F: FnMut(&SessionSnapshot) -> bool,
{
    let mut rx = state.session.watch();
    let snapshot = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(pred))
        .await
        .expect("timed out waiting for session state")
        .expect("session channel closed");
    snapshot.clone()
}

pub async fn signed_in_as(state: &AppState, provider: &MockAuthProvider, id: &str) -> SessionSnapshot {
    provider.emit(Some(identity(id)));
    let id = id.to_string();
    wait_until(state, move |s| s.identity().map(|i| i.id == id).unwrap_or(false)).await
}

/// `Cookie` header value presenting the session of `snapshot`.
pub fn session_cookie(snapshot: &SessionSnapshot) -> String {
    let session_id = snapshot.session_id().expect("snapshot should be signed in");
    format!("{SESSION_COOKIE}={session_id}")
}
