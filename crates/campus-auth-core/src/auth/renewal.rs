//! Exchange of the renewal credential for a fresh access credential.
//!
//! At most one exchange is in flight. Every caller that hits a 401 while an
//! exchange is outstanding awaits that same exchange and receives its
//! result. The slot is emptied as soon as the exchange resolves, so the
//! next 401 after that starts a new one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Method;
use tracing::{debug, info, warn};

use crate::api::client::REFRESH_PATH;
use crate::api::ApiClient;
use crate::models::{Credential, RefreshRequest, RefreshResponse};

use super::{CredentialKey, CredentialStore, RenewalFailure, SessionState, SignOutReason};

type RenewalResult = Result<Credential, RenewalFailure>;
type InFlight = Shared<BoxFuture<'static, RenewalResult>>;

pub struct RenewalCoordinator {
    api: ApiClient,
    store: Arc<dyn CredentialStore>,
    session: Arc<SessionState>,
    in_flight: Mutex<Option<(u64, InFlight)>>,
    next_id: AtomicU64,
}

impl RenewalCoordinator {
    pub fn new(api: ApiClient, store: Arc<dyn CredentialStore>, session: Arc<SessionState>) -> Self {
        Self {
            api,
            store,
            session,
            in_flight: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Obtain a fresh access credential.
    ///
    /// `rejected` is the credential the failing request carried. If the
    /// store already holds a different one, an exchange finished after that
    /// request left and its result is reused without another exchange.
    pub async fn refresh(&self, rejected: Option<&Credential>) -> RenewalResult {
        if let Some(current) = self.superseding_credential(rejected) {
            debug!("Access credential already renewed, reusing it");
            return Ok(current);
        }

        let (id, exchange) = self.join_or_start();
        let result = exchange.await;

        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(slot.as_ref(), Some((current, _)) if *current == id) {
            *slot = None;
        }
        result
    }

    /// True while an exchange is outstanding.
    pub fn is_renewing(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn superseding_credential(&self, rejected: Option<&Credential>) -> Option<Credential> {
        let rejected = rejected?;
        match self.store.get(CredentialKey::Access) {
            Ok(Some(current)) if current != rejected.as_str() => Some(Credential::new(current)),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read access credential");
                None
            }
        }
    }

    fn join_or_start(&self) -> (u64, InFlight) {
        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((id, exchange)) = slot.as_ref() {
            debug!(renewal = id, "Joining in-flight renewal");
            return (*id, exchange.clone());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let epoch = self.session.epoch();
        debug!(renewal = id, epoch, "Starting renewal exchange");
        self.session.begin_refresh();
        let exchange = Self::exchange(
            self.api.clone(),
            self.store.clone(),
            self.session.clone(),
            epoch,
        )
        .boxed()
        .shared();
        *slot = Some((id, exchange.clone()));
        (id, exchange)
    }

    /// Run one exchange on behalf of the sign-in identified by `epoch`.
    ///
    /// Nothing is persisted or signed out unless that sign-in is still
    /// current when the backend answers.
    async fn exchange(
        api: ApiClient,
        store: Arc<dyn CredentialStore>,
        session: Arc<SessionState>,
        epoch: u64,
    ) -> RenewalResult {
        let result = match Self::request_credential(&api, store.as_ref()).await {
            Ok(access) => session
                .apply_renewal(epoch, access.clone(), |credential| {
                    store.set(CredentialKey::Access, credential.as_str())
                })
                .map(|()| access),
            Err(failure) => Err(failure),
        };

        match &result {
            Ok(_) => info!("Access credential renewed"),
            Err(RenewalFailure::Superseded) => {
                info!("Session changed during renewal, discarding credential")
            }
            Err(failure) => {
                let cleared = session.expire(epoch, SignOutReason::RenewalFailed, || {
                    if let Err(e) = store.clear_all() {
                        warn!(error = %e, "Failed to clear stored credentials");
                    }
                });
                if cleared {
                    warn!(error = %failure, "Renewal failed, signed out");
                } else {
                    debug!(error = %failure, "Renewal failed after the session had already changed");
                }
            }
        }
        result
    }

    async fn request_credential(api: &ApiClient, store: &dyn CredentialStore) -> RenewalResult {
        let renewal = store
            .get(CredentialKey::Renewal)
            .map_err(|e| RenewalFailure::Storage(e.to_string()))?
            .ok_or(RenewalFailure::MissingCredential)?;

        let body = serde_json::to_value(RefreshRequest {
            refresh_token: &renewal,
        })
        .map_err(|e| RenewalFailure::InvalidResponse(e.to_string()))?;

        // Sent without a bearer credential: the one we hold was just rejected.
        let response = api.send(Method::POST, REFRESH_PATH, Some(&body), None).await?;
        let parsed: RefreshResponse = ApiClient::read_json(response).await?;

        if !parsed.success {
            return Err(RenewalFailure::Rejected("backend reported failure".to_string()));
        }
        parsed
            .access_token
            .ok_or_else(|| RenewalFailure::InvalidResponse("missing accessToken".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryStore, Phase};
    use crate::config::Config;
    use crate::models::Profile;

    fn sign_in(session: &SessionState) {
        let profile: Profile = serde_json::from_str(r#"{"id": 1, "name": "Ada"}"#).unwrap();
        session.set_authenticated(profile, Credential::new("a1"));
    }

    fn coordinator(store: Arc<MemoryStore>) -> (RenewalCoordinator, Arc<SessionState>) {
        let config = Config {
            // Never contacted: every case here fails before the exchange
            api_base_url: "http://127.0.0.1:9/api/v1".to_string(),
            ..Config::default()
        };
        let session = Arc::new(SessionState::new());
        let api = ApiClient::new(&config).expect("client");
        (RenewalCoordinator::new(api, store, session.clone()), session)
    }

    #[tokio::test]
    async fn test_missing_renewal_credential_signs_out() {
        let store = Arc::new(MemoryStore::new());
        store.set(CredentialKey::Access, "a1").unwrap();
        let (renewal, session) = coordinator(store.clone());
        sign_in(&session);

        let result = renewal.refresh(Some(&Credential::new("a1"))).await;

        assert_eq!(result, Err(RenewalFailure::MissingCredential));
        assert_eq!(store.get(CredentialKey::Access).unwrap(), None);
        assert_eq!(session.phase(), Phase::Unauthenticated);
        assert!(session.get().redirect_to_sign_in());
        assert!(!renewal.is_renewing());
    }

    #[tokio::test]
    async fn test_failure_after_sign_out_keeps_reason() {
        let store = Arc::new(MemoryStore::new());
        let (renewal, session) = coordinator(store);
        session.set_unauthenticated(SignOutReason::UserRequested);

        let result = renewal.refresh(None).await;

        assert_eq!(result, Err(RenewalFailure::MissingCredential));
        assert_eq!(session.get().sign_out_reason, Some(SignOutReason::UserRequested));
        assert!(!session.get().redirect_to_sign_in());
    }

    #[tokio::test]
    async fn test_superseded_credential_is_reused() {
        let store = Arc::new(MemoryStore::new());
        store.set(CredentialKey::Access, "a2").unwrap();
        let (renewal, session) = coordinator(store);

        let result = renewal.refresh(Some(&Credential::new("a1"))).await;

        assert_eq!(result, Ok(Credential::new("a2")));
        assert_eq!(session.phase(), Phase::Initializing);
    }
}
