//! Authentication feature
//!
//! One manager holds the authentication status. Its bound operation
//! restores a stored session; sign-in and sign-out run through the same
//! manager so every observer sees one ordered history.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use herald_core::{OperationError, Outcome, SubscriberId};
use herald_state::{Backpressure, Operation, OperationFuture, StateManager, Subscription};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;

use crate::adapters::within;

/// Username and password entered by the user
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.username.trim().is_empty() {
            return Err(AuthError::MissingUsername);
        }
        if self.password.is_empty() {
            return Err(AuthError::MissingPassword);
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Authenticated session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user: String,
    pub token: String,
}

/// Value held by the authentication manager
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthStatus {
    SignedOut,
    SignedIn(Session),
}

impl AuthStatus {
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthStatus::SignedIn(session) => Some(session),
            AuthStatus::SignedOut => None,
        }
    }
}

/// Authentication failures reported by backends
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("username is required")]
    MissingUsername,

    #[error("password is required")]
    MissingPassword,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("auth backend error: {0}")]
    Backend(String),
}

impl From<AuthError> for OperationError {
    fn from(err: AuthError) -> Self {
        OperationError::from_error(&err)
    }
}

pub type AuthFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AuthError>> + Send + 'a>>;

/// Authentication backend
pub trait AuthBackend: Send + Sync + 'static {
    fn sign_in(&self, credentials: Credentials) -> AuthFuture<'_, Session>;

    fn sign_out(&self, session: Session) -> AuthFuture<'_, ()>;

    /// Previously stored session, if any
    fn restore(&self) -> AuthFuture<'_, Option<Session>>;
}

type SessionSlot = Arc<Mutex<Option<Session>>>;

/// Bound operation of the authentication manager
struct RestoreSession {
    backend: Arc<dyn AuthBackend>,
    slot: SessionSlot,
    timeout: Option<Duration>,
}

impl Operation for RestoreSession {
    type Output = AuthStatus;

    fn run(&self) -> OperationFuture<'_, AuthStatus> {
        Box::pin(async move {
            let restored = within(self.timeout, async {
                self.backend.restore().await.map_err(OperationError::from)
            })
            .await?;
            *self.slot.lock() = restored.clone();
            Ok::<_, OperationError>(match restored {
                Some(session) => AuthStatus::SignedIn(session),
                None => AuthStatus::SignedOut,
            })
        })
    }
}

/// Authentication state manager plus its user intents
#[derive(Clone)]
pub struct AuthFeature {
    manager: StateManager<AuthStatus>,
    backend: Arc<dyn AuthBackend>,
    slot: SessionSlot,
    timeout: Option<Duration>,
}

impl AuthFeature {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        policy: Backpressure,
        timeout: Option<Duration>,
    ) -> Self {
        let slot: SessionSlot = Arc::new(Mutex::new(None));
        let restore = RestoreSession {
            backend: Arc::clone(&backend),
            slot: Arc::clone(&slot),
            timeout,
        };
        AuthFeature {
            manager: StateManager::with_backpressure(restore, policy),
            backend,
            slot,
            timeout,
        }
    }

    pub fn manager(&self) -> &StateManager<AuthStatus> {
        &self.manager
    }

    pub fn attach(&self) -> Subscription<AuthStatus> {
        self.manager.attach()
    }

    pub fn detach(&self, id: SubscriberId) -> bool {
        self.manager.detach(id)
    }

    /// Session held after the last settled operation
    pub fn session(&self) -> Option<Session> {
        self.slot.lock().clone()
    }

    /// Resume a stored session
    pub async fn restore(&self) -> Outcome<AuthStatus> {
        self.manager.trigger().await
    }

    pub async fn sign_in(&self, credentials: Credentials) -> Outcome<AuthStatus> {
        let backend = Arc::clone(&self.backend);
        let slot = Arc::clone(&self.slot);
        let timeout = self.timeout;

        self.manager
            .trigger_with(async move {
                credentials.validate()?;
                let session = within(timeout, async move {
                    backend.sign_in(credentials).await.map_err(OperationError::from)
                })
                .await?;
                info!(user = %session.user, "signed in");
                *slot.lock() = Some(session.clone());
                Ok::<_, OperationError>(AuthStatus::SignedIn(session))
            })
            .await
    }

    /// Sign out; succeeds as `SignedOut` even when nobody was signed in
    pub async fn sign_out(&self) -> Outcome<AuthStatus> {
        let backend = Arc::clone(&self.backend);
        let slot = Arc::clone(&self.slot);
        let timeout = self.timeout;

        self.manager
            .trigger_with(async move {
                let session = slot.lock().clone();
                if let Some(session) = session {
                    let user = session.user.clone();
                    within(timeout, async move {
                        backend.sign_out(session).await.map_err(OperationError::from)
                    })
                    .await?;
                    info!(%user, "signed out");
                }
                *slot.lock() = None;
                Ok::<_, OperationError>(AuthStatus::SignedOut)
            })
            .await
    }
}
