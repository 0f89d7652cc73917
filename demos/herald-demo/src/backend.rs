//! Simulated backends with random latency

use std::collections::HashMap;
use std::ops::Range;
use std::time::Duration;

use herald_core::OperationError;
use herald_runtime::{AuthBackend, AuthError, AuthFuture, Credentials, Session, StringBackend, StringFuture};
use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;

fn jitter(range: &Range<u64>) -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(range.clone()))
}

/// In-memory account store with one known user
pub struct SimulatedAuth {
    accounts: HashMap<String, String>,
    stored: Mutex<Option<Session>>,
    latency_ms: Range<u64>,
}

impl SimulatedAuth {
    pub fn new(latency_ms: Range<u64>) -> Self {
        let mut accounts = HashMap::new();
        accounts.insert("ada".to_string(), "analytical".to_string());
        SimulatedAuth {
            accounts,
            stored: Mutex::new(None),
            latency_ms,
        }
    }
}

impl AuthBackend for SimulatedAuth {
    fn sign_in(&self, credentials: Credentials) -> AuthFuture<'_, Session> {
        let delay = jitter(&self.latency_ms);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            match self.accounts.get(&credentials.username) {
                Some(password) if *password == credentials.password => {
                    let token: u64 = rand::thread_rng().gen();
                    let session = Session {
                        user: credentials.username,
                        token: format!("{token:016x}"),
                    };
                    *self.stored.lock() = Some(session.clone());
                    Ok(session)
                }
                _ => Err(AuthError::InvalidCredentials),
            }
        })
    }

    fn sign_out(&self, session: Session) -> AuthFuture<'_, ()> {
        let delay = jitter(&self.latency_ms);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            debug!(user = %session.user, "session revoked");
            *self.stored.lock() = None;
            Ok(())
        })
    }

    fn restore(&self) -> AuthFuture<'_, Option<Session>> {
        let delay = jitter(&self.latency_ms);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            Ok(self.stored.lock().clone())
        })
    }
}

/// Fixed string table
pub struct SimulatedStrings {
    table: HashMap<&'static str, &'static str>,
    latency_ms: Range<u64>,
}

impl SimulatedStrings {
    pub fn new(latency_ms: Range<u64>) -> Self {
        SimulatedStrings {
            table: HashMap::from([
                ("greeting", "Hello from Herald"),
                ("farewell", "Goodbye"),
            ]),
            latency_ms,
        }
    }
}

impl StringBackend for SimulatedStrings {
    fn fetch<'a>(&'a self, key: &'a str) -> StringFuture<'a> {
        let delay = jitter(&self.latency_ms);
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            self.table
                .get(key)
                .map(|value| value.to_string())
                .ok_or_else(|| OperationError::failed(format!("no string for key {key:?}")))
        })
    }
}
