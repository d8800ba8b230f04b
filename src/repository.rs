use crate::models::ProfileDocument;
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// ProfileStoreError
///
/// Failures reading a profile document. None of these ever reach a user:
/// the resolver turns every one of them into the fail-closed profile.
#[derive(Debug, Error)]
pub enum ProfileStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("profile store rejected the request with status {0}")]
    Rejected(u16),
    #[error("{0}")]
    Unavailable(String),
}

/// ProfileStore Trait
///
/// Read-only contract for the external store holding one authorization
/// document per identity, keyed by identity id. Writes happen through the
/// user-management screens and never through this trait.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Returns `Ok(None)` when the identity has no profile document.
    async fn get_profile(&self, identity_id: &str) -> Result<Option<ProfileDocument>, ProfileStoreError>;
}

/// ProfileStoreState
///
/// The shared handle used by the resolver and the application state.
pub type ProfileStoreState = Arc<dyn ProfileStore>;

// 1. Postgres (self-hosted BaaS database)

/// PostgresProfileStore
///
/// Reads `profiles(id text primary key, role text, status text, permissions text[])`.
pub struct PostgresProfileStore {
    pool: PgPool,
}

impl PostgresProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    async fn get_profile(&self, identity_id: &str) -> Result<Option<ProfileDocument>, ProfileStoreError> {
        let doc = sqlx::query_as::<_, ProfileDocument>(
            "SELECT role, status, permissions FROM profiles WHERE id = $1",
        )
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc)
    }
}

// 2. REST (managed BaaS, PostgREST-style endpoint)

/// RestProfileStore
///
/// Queries `GET {base}/rest/v1/profiles?id=eq.{id}&select=role,status,permissions`
/// with the project API key. The endpoint answers with a JSON array holding
/// zero or one row.
#[derive(Clone)]
pub struct RestProfileStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RestProfileStore {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl ProfileStore for RestProfileStore {
    async fn get_profile(&self, identity_id: &str) -> Result<Option<ProfileDocument>, ProfileStoreError> {
        let url = format!("{}/rest/v1/profiles", self.base_url);
        let filter = format!("eq.{}", identity_id);

        let response = self
            .client
            .get(&url)
            .query(&[("id", filter.as_str()), ("select", "role,status,permissions")])
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProfileStoreError::Rejected(status.as_u16()));
        }

        let mut rows: Vec<ProfileDocument> = response.json().await?;
        Ok(rows.pop())
    }
}

// 3. The Mock Implementation (For Tests and Local Runs)

/// MockProfileStore
///
/// In-memory store with canned documents. A per-identity delay makes it
/// possible to hold a fetch in flight while the session moves on.
#[derive(Clone, Default)]
pub struct MockProfileStore {
    documents: HashMap<String, ProfileDocument>,
    delays: HashMap<String, Duration>,
    /// When true, every lookup returns a simulated backend failure.
    pub should_fail: bool,
}

impl MockProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn with_profile(mut self, identity_id: &str, doc: ProfileDocument) -> Self {
        self.documents.insert(identity_id.to_string(), doc);
        self
    }

    pub fn with_delay(mut self, identity_id: &str, delay: Duration) -> Self {
        self.delays.insert(identity_id.to_string(), delay);
        self
    }
}

#[async_trait]
impl ProfileStore for MockProfileStore {
    async fn get_profile(&self, identity_id: &str) -> Result<Option<ProfileDocument>, ProfileStoreError> {
        if let Some(delay) = self.delays.get(identity_id) {
            tokio::time::sleep(*delay).await;
        }

        if self.should_fail {
            return Err(ProfileStoreError::Unavailable(
                "Mock Profile Store Error: Simulation requested".to_string(),
            ));
        }

        Ok(self.documents.get(identity_id).cloned())
    }
}
