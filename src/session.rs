use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    auth::{AuthError, AuthProviderState},
    models::{Identity, Profile, SessionSnapshot, SessionState},
    resolver::ProfileResolver,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store is already subscribed to the auth provider")]
    AlreadySubscribed,
    #[error(transparent)]
    Subscription(#[from] AuthError),
}

/// SubscriptionHandle
///
/// Owns the task consuming auth events. Dropping the handle leaves the task
/// running; `cancel` stops it.
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
    store: Arc<SessionStore>,
}

impl SubscriptionHandle {
    pub fn cancel(self) {
        self.task.abort();
        self.store.abort_inflight();
    }
}

/// SessionStore
///
/// The single writer of the process-wide identity/profile pair. Readers get
/// consistent snapshots through a `watch` channel.
///
/// Every auth notification bumps a generation counter. A profile fetch is
/// tagged with the generation it was started for, and its result is only
/// published if that generation is still current.
pub struct SessionStore {
    state: watch::Sender<SessionSnapshot>,
    resolver: ProfileResolver,
    generation: AtomicU64,
    subscribed: AtomicBool,
    inflight: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(resolver: ProfileResolver) -> Arc<Self> {
        let (state, _) = watch::channel(SessionSnapshot::default());
        Arc::new(Self {
            state,
            resolver,
            generation: AtomicU64::new(0),
            subscribed: AtomicBool::new(false),
            inflight: Mutex::new(None),
        })
    }

    /// subscribe
    ///
    /// Attaches to the auth provider. Allowed once per store; a failure to
    /// attach leaves the session loading for good, which the guard treats as
    /// "no decision" rather than allowing or denying.
    pub async fn subscribe(
        self: &Arc<Self>,
        provider: AuthProviderState,
    ) -> Result<SubscriptionHandle, SessionError> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadySubscribed);
        }

        let mut subscription = match provider.subscribe().await {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::error!(error = %e, "auth subscription failed, session will stay loading");
                return Err(e.into());
            }
        };

        let store = Arc::clone(self);
        let task = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                store.handle_auth_event(event);
            }
            tracing::warn!("auth event stream closed");
        });

        Ok(SubscriptionHandle {
            task,
            store: Arc::clone(self),
        })
    }

    /// handle_auth_event
    ///
    /// Applies one auth notification. A sign-out is published immediately;
    /// a sign-in is published as `Resolving` and becomes `SignedIn` once its
    /// profile arrives. Either way, any fetch for the previous identity is
    /// cancelled.
    pub fn handle_auth_event(self: &Arc<Self>, identity: Option<Identity>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.abort_inflight();

        match identity {
            None => {
                tracing::debug!(generation, "session signed out");
                self.publish(generation, SessionState::SignedOut);
            }
            Some(identity) => {
                tracing::debug!(generation, identity_id = %identity.id, "resolving profile");
                self.publish(
                    generation,
                    SessionState::Resolving {
                        identity: identity.clone(),
                    },
                );

                let store = Arc::clone(self);
                let task = tokio::spawn(async move {
                    let profile = store.resolver.resolve(&identity.id).await;
                    store.apply_profile(generation, identity, profile);
                });
                *self.inflight.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
            }
        }
    }

    /// Publishes a resolved profile unless a newer notification superseded it.
    /// The generation check and the write happen under the channel's lock.
    fn apply_profile(&self, generation: u64, identity: Identity, profile: Profile) -> bool {
        let identity_id = identity.id.clone();
        let applied = self.state.send_if_modified(|snapshot| {
            if snapshot.generation != generation {
                return false;
            }
            snapshot.state = SessionState::SignedIn {
                identity,
                profile,
                session_id: Uuid::new_v4(),
            };
            snapshot.updated_at = Utc::now();
            true
        });

        if applied {
            tracing::info!(generation, identity_id = %identity_id, "session loaded");
        } else {
            tracing::debug!(generation, identity_id = %identity_id, "discarding stale profile result");
        }
        applied
    }

    fn publish(&self, generation: u64, state: SessionState) {
        self.state.send_replace(SessionSnapshot {
            state,
            generation,
            updated_at: Utc::now(),
        });
    }

    fn abort_inflight(&self) {
        if let Some(task) = self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// settled
    ///
    /// Waits up to `wait` for the session to stop loading and returns the
    /// snapshot current at that point, which may still be loading.
    pub async fn settled(&self, wait: Duration) -> SessionSnapshot {
        let mut rx = self.state.subscribe();
        match tokio::time::timeout(wait, rx.wait_for(|s| !s.is_loading())).await {
            Ok(Ok(snapshot)) => snapshot.clone(),
            _ => self.snapshot(),
        }
    }
}
