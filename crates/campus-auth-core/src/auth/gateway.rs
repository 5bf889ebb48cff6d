use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::api::client::{
    FORGOT_PASSWORD_PATH, LOGIN_PATH, PROFILE_PATH, REGISTER_PATH, RESET_PASSWORD_PATH,
    VERIFY_EMAIL_PATH,
};
use crate::api::{ApiRequest, RequestAuthorizer};
use crate::models::{Credential, Envelope, LoginRequest, LoginResponse, Profile, RegistrationRequest};

use super::{
    AuthError, Clock, CredentialKey, CredentialStore, RequestError, RestoreOutcome, SessionState,
    SignInOutcome, SignOutReason, TokenCodec,
};

/// User initiated session flows: sign-in, registration, sign-out and
/// restoring the stored session at process start.
pub struct AuthGateway {
    requests: Arc<RequestAuthorizer>,
    store: Arc<dyn CredentialStore>,
    session: Arc<SessionState>,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
}

impl AuthGateway {
    pub fn new(
        requests: Arc<RequestAuthorizer>,
        store: Arc<dyn CredentialStore>,
        session: Arc<SessionState>,
        codec: TokenCodec,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            requests,
            store,
            session,
            codec,
            clock,
        }
    }

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    /// Sign in and persist both credentials.
    ///
    /// The full profile is fetched afterwards; if that fails the reduced
    /// user embedded in the sign-in response is used instead and the
    /// session is marked degraded. Backend errors are returned unchanged.
    ///
    /// Either both credentials end up stored and the session authenticated,
    /// or neither credential is left behind.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignInOutcome, AuthError> {
        let request = ApiRequest::post(LOGIN_PATH).json(&LoginRequest { email, password })?;
        let login: Envelope<LoginResponse> = self.requests.request(request).await?;
        let LoginResponse {
            access_token,
            refresh_token,
            user,
        } = login.data;

        let persisted = self
            .store
            .set(CredentialKey::Access, access_token.as_str())
            .and_then(|_| self.store.set(CredentialKey::Renewal, refresh_token.as_str()));
        if let Err(e) = persisted {
            warn!(error = %e, "Failed to persist credentials, discarding sign-in");
            self.clear(SignOutReason::NoCredential);
            return Err(AuthError::Storage(e));
        }

        self.session.set_renewal_credential(Some(refresh_token));
        match (self.fetch_profile().await, user) {
            (Ok(profile), _) => {
                info!(user_id = %profile.id, "Signed in");
                self.session.set_authenticated(profile.clone(), access_token);
                Ok(SignInOutcome::Authenticated(profile))
            }
            (Err(e), Some(user)) => {
                warn!(error = %e, "Profile fetch failed after sign-in, using sign-in response");
                self.session.set_authenticated(user.clone(), access_token);
                self.session.mark_degraded();
                Ok(SignInOutcome::DegradedAuthenticated(user))
            }
            (Err(e), None) => {
                warn!(error = %e, "Profile fetch failed and sign-in response has no user");
                self.clear(SignOutReason::ProfileFetchFailed);
                Err(e.into())
            }
        }
    }

    /// Create an account. Never signs the new user in.
    pub async fn register(&self, registration: &RegistrationRequest) -> Result<Value, AuthError> {
        let request = ApiRequest::post(REGISTER_PATH).json(registration)?;
        let response = self.requests.request(request).await?;
        info!(email = %registration.email, "Registration submitted");
        Ok(response)
    }

    /// Forget both credentials and the user. Needs no network and can be
    /// called any number of times.
    pub fn sign_out(&self) {
        self.clear(SignOutReason::UserRequested);
    }

    /// Rebuild the session from the stored access credential.
    pub async fn restore_session(&self) -> RestoreOutcome {
        self.session.begin_restore();

        let stored = match self.store.get(CredentialKey::Access) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to read stored access credential, discarding it");
                self.clear(SignOutReason::NoCredential);
                return RestoreOutcome::NoCredential;
            }
        };
        let Some(token) = stored else {
            debug!("No stored access credential");
            self.session.set_unauthenticated(SignOutReason::NoCredential);
            return RestoreOutcome::NoCredential;
        };

        let claims = match self.codec.decode(&token) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(error = %e, "Stored access credential does not decode");
                self.clear(SignOutReason::MalformedCredential);
                return RestoreOutcome::Malformed(e);
            }
        };
        if self.codec.is_expired(&claims, self.clock.now()) {
            info!("Stored access credential expired");
            self.clear(SignOutReason::Expired);
            return RestoreOutcome::Expired;
        }

        match self.fetch_profile().await {
            Ok(profile) => {
                let renewal = self.store.get(CredentialKey::Renewal).ok().flatten();
                self.session.set_renewal_credential(renewal.map(Credential::new));
                self.session.set_authenticated(profile.clone(), Credential::new(token));
                info!(user_id = %profile.id, "Session restored");
                RestoreOutcome::Authenticated(profile)
            }
            Err(e) => {
                warn!(error = %e, "Profile fetch failed during restore");
                self.clear(SignOutReason::ProfileFetchFailed);
                RestoreOutcome::ProfileFetchFailed(e.to_string())
            }
        }
    }

    /// Re-fetch `/users/me` and replace the profile wholesale.
    pub async fn refresh_profile(&self) -> Result<Profile, RequestError> {
        let me: Envelope<Profile> = self.requests.get(PROFILE_PATH).await?;
        self.session.replace_profile(me.data.clone());
        Ok(me.data)
    }

    /// Submit profile changes, then re-fetch the whole profile.
    pub async fn update_profile<B: Serialize + ?Sized>(&self, changes: &B) -> Result<Profile, RequestError> {
        let _: Value = self.requests.put(PROFILE_PATH, changes).await?;
        self.refresh_profile().await
    }

    pub async fn verify_email(&self, token: &str) -> Result<(), AuthError> {
        let _: Value = self
            .requests
            .post(VERIFY_EMAIL_PATH, &json!({ "token": token }))
            .await?;
        Ok(())
    }

    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let _: Value = self
            .requests
            .post(FORGOT_PASSWORD_PATH, &json!({ "email": email }))
            .await?;
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, password: &str) -> Result<(), AuthError> {
        let path = format!("{}/{}", RESET_PASSWORD_PATH, urlencoding::encode(token));
        let _: Value = self
            .requests
            .put(&path, &json!({ "password": password }))
            .await?;
        Ok(())
    }

    /// `/users/me` with the stored credential. A 401 here must not start a
    /// renewal: callers have their own fallback.
    async fn fetch_profile(&self) -> Result<Profile, RequestError> {
        let me: Envelope<Profile> = self
            .requests
            .request(ApiRequest::get(PROFILE_PATH).without_renewal())
            .await?;
        Ok(me.data)
    }

    /// Sign out first, then clear the store. A renewal finishing in
    /// between is discarded by the session, or its credential is cleared
    /// here.
    fn clear(&self, reason: SignOutReason) {
        self.session.set_unauthenticated(reason);
        if let Err(e) = self.store.clear_all() {
            warn!(error = %e, "Failed to clear stored credentials");
        }
    }
}
