//! Process-wide service holder
//!
//! Builds one manager per feature domain and exposes them to any number of
//! independent observer trees.

use std::sync::{Arc, OnceLock};

use herald_core::{HeraldError, HeraldResult};
use tracing::info;

use crate::auth::{AuthBackend, AuthFeature};
use crate::config::RuntimeConfig;
use crate::strings::{StringBackend, StringFeature};

static SERVICES: OnceLock<Services> = OnceLock::new();

/// One manager per feature domain
#[derive(Clone)]
pub struct Services {
    pub auth: AuthFeature,
    pub strings: StringFeature,
}

impl Services {
    pub fn new(
        auth_backend: Arc<dyn AuthBackend>,
        string_backend: Arc<dyn StringBackend>,
        config: &RuntimeConfig,
    ) -> HeraldResult<Self> {
        config.validate()?;
        let policy = config.mailbox.backpressure()?;
        let timeout = config.operation_timeout;

        Ok(Services {
            auth: AuthFeature::new(auth_backend, policy, timeout),
            strings: StringFeature::new(string_backend, config.greeting_key.clone(), policy, timeout),
        })
    }

    /// Make `services` the process-wide instance
    pub fn install(services: Services) -> HeraldResult<&'static Services> {
        SERVICES
            .set(services)
            .map_err(|_| HeraldError::AlreadyInstalled)?;
        info!("services installed");
        Services::global()
    }

    pub fn global() -> HeraldResult<&'static Services> {
        SERVICES.get().ok_or(HeraldError::NotInstalled)
    }

    /// Tear down every feature manager
    pub fn shutdown(&self) {
        self.auth.manager().shutdown();
        self.strings.manager().shutdown();
    }
}
