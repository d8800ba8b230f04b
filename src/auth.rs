use async_trait::async_trait;
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::{config::Env, models::Identity};

/// AuthError
///
/// Failures at the boundary with the external auth provider.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth provider subscription could not be established: {0}")]
    SubscriptionUnavailable(String),
    #[error("token expired")]
    ExpiredToken,
    #[error("invalid token")]
    InvalidToken,
    #[error("credential type not accepted in this environment")]
    CredentialRejected,
}

/// Claims
///
/// Payload of an ID token issued by the managed auth service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the identity id, also the profile document key.
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
    pub exp: usize,
    pub iat: usize,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            id: claims.sub,
            display_name: claims.name,
            email: claims.email,
            photo_url: claims.picture,
        }
    }
}

/// Credential
///
/// What a client presents to sign in.
#[derive(Debug, Clone)]
pub enum Credential {
    /// A signed ID token from the managed auth service.
    IdToken(String),
    /// Development bypass, honoured only in `Env::Local`.
    LocalUser { id: String, email: Option<String> },
}

/// AuthSubscription
///
/// A stream of auth state changes: `Some(identity)` on sign-in,
/// `None` on sign-out.
pub struct AuthSubscription {
    receiver: mpsc::UnboundedReceiver<Option<Identity>>,
}

impl AuthSubscription {
    pub async fn next(&mut self) -> Option<Option<Identity>> {
        self.receiver.recv().await
    }
}

/// AuthProvider Trait
///
/// The narrow contract the session store consumes from the external auth
/// provider. `Send + Sync + async_trait` so it can live behind an `Arc<dyn _>`.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Registers for auth state-change notifications.
    async fn subscribe(&self) -> Result<AuthSubscription, AuthError>;

    /// Verifies a credential and, on success, notifies subscribers of the new identity.
    async fn sign_in(&self, credential: Credential) -> Result<Identity, AuthError>;

    /// Ends the current session and notifies subscribers with `None`.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

pub type AuthProviderState = Arc<dyn AuthProvider>;

/// Fan-out of auth events to every live subscription.
#[derive(Default)]
struct Subscribers {
    senders: Mutex<Vec<mpsc::UnboundedSender<Option<Identity>>>>,
}

impl Subscribers {
    fn register(&self, initial: Option<Option<Identity>>) -> AuthSubscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        if let Some(event) = initial {
            let _ = tx.send(event);
        }
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        AuthSubscription { receiver }
    }

    fn publish(&self, event: Option<Identity>) {
        // Dropped subscriptions are pruned here.
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

// 1. The Real Implementation (ID tokens from the managed auth service)

/// IdTokenAuthProvider
///
/// Verifies HS256 ID tokens with the project's JWT secret and keeps the
/// current identity. Like a persisted browser session, a new subscriber is
/// told the current state straight away.
pub struct IdTokenAuthProvider {
    jwt_secret: String,
    env: Env,
    current: Mutex<Option<Identity>>,
    subscribers: Subscribers,
}

impl IdTokenAuthProvider {
    pub fn new(jwt_secret: &str, env: Env) -> Self {
        Self {
            jwt_secret: jwt_secret.to_string(),
            env,
            current: Mutex::new(None),
            subscribers: Subscribers::default(),
        }
    }

    /// Decodes and validates an ID token (signature and expiry).
    pub fn verify_token(&self, token: &str) -> Result<Identity, AuthError> {
        let decoding_key = DecodingKey::from_secret(self.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;

        match decode::<Claims>(token, &decoding_key, &validation) {
            Ok(data) => Ok(data.claims.into()),
            Err(e) => match e.kind() {
                ErrorKind::ExpiredSignature => Err(AuthError::ExpiredToken),
                _ => Err(AuthError::InvalidToken),
            },
        }
    }

    fn set_current(&self, identity: Option<Identity>) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = identity.clone();
        self.subscribers.publish(identity);
    }
}

#[async_trait]
impl AuthProvider for IdTokenAuthProvider {
    async fn subscribe(&self) -> Result<AuthSubscription, AuthError> {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(self.subscribers.register(Some(current)))
    }

    async fn sign_in(&self, credential: Credential) -> Result<Identity, AuthError> {
        let identity = match credential {
            Credential::IdToken(token) => self.verify_token(&token)?,
            Credential::LocalUser { id, email } if self.env == Env::Local => Identity {
                email,
                ..Identity::new(id)
            },
            Credential::LocalUser { .. } => return Err(AuthError::CredentialRejected),
        };

        tracing::info!(identity_id = %identity.id, "identity signed in");
        self.set_current(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        tracing::info!("identity signed out");
        self.set_current(None);
        Ok(())
    }
}

// 2. The Mock Implementation (For Tests)

/// MockAuthProvider
///
/// Emits only what a test tells it to. Nothing is sent on subscribe, so the
/// session stays loading until the first `emit`.
#[derive(Default)]
pub struct MockAuthProvider {
    subscribers: Subscribers,
    /// When true, `subscribe` fails as if the provider were unreachable.
    pub should_fail: bool,
}

impl MockAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn emit(&self, identity: Option<Identity>) {
        self.subscribers.publish(identity);
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn subscribe(&self) -> Result<AuthSubscription, AuthError> {
        if self.should_fail {
            return Err(AuthError::SubscriptionUnavailable(
                "Mock Auth Error: Simulation requested".to_string(),
            ));
        }
        Ok(self.subscribers.register(None))
    }

    async fn sign_in(&self, credential: Credential) -> Result<Identity, AuthError> {
        let identity = match credential {
            Credential::LocalUser { id, email } => Identity {
                email,
                ..Identity::new(id)
            },
            Credential::IdToken(_) => return Err(AuthError::CredentialRejected),
        };
        self.emit(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.emit(None);
        Ok(())
    }
}
