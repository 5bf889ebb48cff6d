//! Authentication session and token lifecycle.
//!
//! This module provides:
//! - `TokenCodec`: local claims decoding and expiry checks
//! - `CredentialStore`: durable storage for the access and renewal credentials
//! - `SessionState`: the in-memory authority on who is signed in
//! - `AuthGateway`: sign-in, registration, sign-out and session restore
//! - `RenewalCoordinator`: single-flight exchange of the renewal credential
//!
//! `AuthStack` wires one instance of each around a shared `SessionState`.

pub mod credentials;
pub mod error;
pub mod gateway;
pub mod renewal;
pub mod session;
pub mod token;

use std::sync::Arc;

use anyhow::Result;

pub use credentials::{CredentialKey, CredentialStore, FileStore, KeyringStore, MemoryStore};
pub use error::{AuthError, RenewalFailure, RequestError, RestoreOutcome, SignInOutcome};
pub use gateway::AuthGateway;
pub use renewal::RenewalCoordinator;
pub use session::{Phase, RouteAccess, Session, SessionState, SignOutReason};
pub use token::{Claims, Clock, DecodeError, SystemClock, TokenCodec};

use crate::api::{ApiClient, RequestAuthorizer};
use crate::config::{Config, CredentialBackend};

/// The session components, sharing one store and one `SessionState`.
pub struct AuthStack {
    pub store: Arc<dyn CredentialStore>,
    pub session: Arc<SessionState>,
    pub renewal: Arc<RenewalCoordinator>,
    pub requests: Arc<RequestAuthorizer>,
    pub gateway: AuthGateway,
}

impl AuthStack {
    /// Build with the credential backend named in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn CredentialStore> = match config.credential_backend {
            CredentialBackend::File => Arc::new(FileStore::new(config.data_dir()?)),
            CredentialBackend::Keyring => Arc::new(KeyringStore::new()),
        };
        Self::new(config, store)
    }

    pub fn new(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self> {
        Self::with_clock(config, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let api = ApiClient::new(config)?;
        let session = Arc::new(SessionState::new());
        let renewal = Arc::new(RenewalCoordinator::new(
            api.clone(),
            store.clone(),
            session.clone(),
        ));
        let requests = Arc::new(RequestAuthorizer::new(
            api,
            store.clone(),
            renewal.clone(),
        ));
        let gateway = AuthGateway::new(
            requests.clone(),
            store.clone(),
            session.clone(),
            TokenCodec::with_skew_secs(config.clock_skew_secs),
            clock,
        );

        Ok(Self {
            store,
            session,
            renewal,
            requests,
            gateway,
        })
    }
}
