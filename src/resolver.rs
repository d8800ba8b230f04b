use std::time::Duration;

use crate::models::Profile;
use crate::repository::ProfileStoreState;

/// ProfileResolver
///
/// Loads and normalizes the profile of a signed-in identity. Never fails:
/// a missing document, a store error or a timeout all yield
/// [`Profile::fail_closed`], so the access policy always has a well-formed
/// profile to evaluate.
#[derive(Clone)]
pub struct ProfileResolver {
    store: ProfileStoreState,
    timeout: Duration,
}

impl ProfileResolver {
    pub fn new(store: ProfileStoreState, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn resolve(&self, identity_id: &str) -> Profile {
        match tokio::time::timeout(self.timeout, self.store.get_profile(identity_id)).await {
            Ok(Ok(Some(doc))) => {
                let profile = Profile::from_document(doc);
                tracing::debug!(
                    identity_id,
                    role = profile.role.as_str(),
                    status = profile.status.as_str(),
                    permissions = profile.permissions.len(),
                    "profile resolved"
                );
                profile
            }
            Ok(Ok(None)) => {
                tracing::warn!(identity_id, "no profile document, using fail-closed defaults");
                Profile::fail_closed()
            }
            Ok(Err(e)) => {
                tracing::error!(identity_id, error = %e, "failed to load profile");
                Profile::fail_closed()
            }
            Err(_) => {
                tracing::warn!(
                    identity_id,
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "profile fetch timed out, using fail-closed defaults"
                );
                Profile::fail_closed()
            }
        }
    }
}
