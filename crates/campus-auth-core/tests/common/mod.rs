#![allow(dead_code)]

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use campus_auth_core::auth::{Clock, MemoryStore};
use campus_auth_core::{AuthStack, Config, CredentialKey, CredentialStore, Credential, Profile};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Unsigned JWT-shaped token expiring `secs` after `now`.
pub fn token_expiring(now: DateTime<Utc>, secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = json!({"sub": "1", "exp": (now + Duration::seconds(secs)).timestamp()});
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

pub fn stack_at(
    server_url: &str,
    store: Arc<dyn CredentialStore>,
    now: DateTime<Utc>,
) -> AuthStack {
    let config = Config {
        api_base_url: server_url.to_string(),
        ..Config::default()
    };
    AuthStack::with_clock(&config, store, Arc::new(FixedClock(now))).expect("stack")
}

pub fn stack(server_url: &str, store: Arc<dyn CredentialStore>) -> AuthStack {
    stack_at(server_url, store, Utc::now())
}

pub fn profile_json() -> serde_json::Value {
    json!({"id": 1, "name": "Ada", "email": "user@x.edu", "role": "student"})
}

/// Put the stack into `Authenticated` with `a1`/`r1` stored.
pub fn signed_in(stack: &AuthStack, store: &MemoryStore) {
    store.set(CredentialKey::Access, "a1").unwrap();
    store.set(CredentialKey::Renewal, "r1").unwrap();
    let profile: Profile = serde_json::from_value(profile_json()).unwrap();
    stack.session.set_renewal_credential(Some(Credential::new("r1")));
    stack.session.set_authenticated(profile, Credential::new("a1"));
}

pub fn stored(store: &MemoryStore, key: CredentialKey) -> Option<String> {
    store.get(key).unwrap()
}

/// In-memory store whose reads or writes of one key fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_get: Option<CredentialKey>,
    pub fail_set: Option<CredentialKey>,
}

impl CredentialStore for FlakyStore {
    fn get(&self, key: CredentialKey) -> anyhow::Result<Option<String>> {
        if self.fail_get == Some(key) {
            anyhow::bail!("keychain locked");
        }
        self.inner.get(key)
    }

    fn set(&self, key: CredentialKey, value: &str) -> anyhow::Result<()> {
        if self.fail_set == Some(key) {
            anyhow::bail!("keychain locked");
        }
        self.inner.set(key, value)
    }

    fn clear(&self, key: CredentialKey) -> anyhow::Result<()> {
        self.inner.clear(key)
    }
}
