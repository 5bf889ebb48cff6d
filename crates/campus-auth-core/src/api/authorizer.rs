//! Authorization stage of the request pipeline.
//!
//! Every request leaves with the stored access credential as a bearer
//! header. A 401 hands control to `RenewalCoordinator` and the request is
//! re-issued once with the renewed credential. The attempt counter on
//! `ApiRequest` bounds this at `MAX_AUTH_RETRIES`.

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::{CredentialKey, CredentialStore, RenewalCoordinator, RequestError};
use crate::models::Credential;

use super::client::LOGIN_PATH;
use super::{ApiClient, ApiError};

/// Re-issues allowed per request after a renewal.
pub const MAX_AUTH_RETRIES: u8 = 1;

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    attempt: u8,
    renew_on_unauthorized: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            body: None,
            attempt: 0,
            renew_on_unauthorized: true,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request body: {}", e)))?;
        self.body = Some(body);
        Ok(self)
    }

    /// Let a 401 fail the request instead of starting a renewal.
    pub fn without_renewal(mut self) -> Self {
        self.renew_on_unauthorized = false;
        self
    }

    /// Times this request has been re-issued after a renewal.
    pub fn attempt(&self) -> u8 {
        self.attempt
    }

    /// A failed sign-in must surface its 401, never renew.
    pub fn is_sign_in(&self) -> bool {
        let path = self.path.split('?').next().unwrap_or_default();
        path.trim_end_matches('/') == LOGIN_PATH
    }

    fn may_renew(&self) -> bool {
        self.renew_on_unauthorized && !self.is_sign_in() && self.attempt < MAX_AUTH_RETRIES
    }
}

pub struct RequestAuthorizer {
    api: ApiClient,
    store: Arc<dyn CredentialStore>,
    renewal: Arc<RenewalCoordinator>,
}

impl RequestAuthorizer {
    pub fn new(
        api: ApiClient,
        store: Arc<dyn CredentialStore>,
        renewal: Arc<RenewalCoordinator>,
    ) -> Self {
        Self {
            api,
            store,
            renewal,
        }
    }

    fn stored_credential(&self) -> Option<Credential> {
        match self.store.get(CredentialKey::Access) {
            Ok(value) => value.map(Credential::new),
            Err(e) => {
                warn!(error = %e, "Failed to read access credential");
                None
            }
        }
    }

    /// Send a request, renewing the session once on a 401.
    ///
    /// When renewal fails the request fails with `RequestError::Renewal`
    /// and the session has already moved to `Unauthenticated`.
    pub async fn send(&self, mut request: ApiRequest) -> Result<reqwest::Response, RequestError> {
        let mut credential = self.stored_credential();
        loop {
            let result = self
                .api
                .send(
                    request.method.clone(),
                    &request.path,
                    request.body.as_ref(),
                    credential.as_ref(),
                )
                .await;

            match result {
                Err(e) if e.is_unauthorized() && request.may_renew() => {
                    request.attempt += 1;
                    debug!(path = %request.path, attempt = request.attempt, "Unauthorized, renewing session");
                    let renewed = self.renewal.refresh(credential.as_ref()).await?;
                    credential = Some(renewed);
                }
                Err(e) => return Err(e.into()),
                Ok(response) => return Ok(response),
            }
        }
    }

    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, RequestError> {
        let response = self.send(request).await?;
        Ok(ApiClient::read_json(response).await?)
    }

    // ===== Convenience methods for domain pages =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        self.request(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RequestError> {
        self.request(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RequestError> {
        self.request(ApiRequest::put(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        self.request(ApiRequest::delete(path)).await
    }
}
