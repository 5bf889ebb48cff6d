//! HTTP client for the campus backend.
//!
//! `ApiClient` only knows how to build URLs, attach an explicit bearer
//! credential and turn non-success statuses into `ApiError`. Deciding which
//! credential to send, and what to do on a 401, is `RequestAuthorizer`'s job.

use std::time::Duration;

use anyhow::Result;
use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::models::Credential;

use super::ApiError;

// ============================================================================
// Endpoints
// ============================================================================

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const VERIFY_EMAIL_PATH: &str = "/auth/verify-email";
pub const FORGOT_PASSWORD_PATH: &str = "/auth/forgot-password";
pub const RESET_PASSWORD_PATH: &str = "/auth/reset-password";
pub const PROFILE_PATH: &str = "/users/me";

/// API client for the campus backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send one request and fail on any non-success status.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        credential: Option<&Credential>,
    ) -> Result<reqwest::Response, ApiError> {
        let url = self.url(path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(header::ACCEPT, "application/json");

        if let Some(credential) = credential {
            request = request.header(header::AUTHORIZATION, credential.bearer());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(%method, path, authorized = credential.is_some(), "Sending request");
        let response = request.send().await?;
        Self::check_response(response).await
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(%status, "Request rejected");
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Decode a JSON body; an empty body decodes as `null`.
    pub async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let bytes = response.bytes().await?;
        let bytes: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &bytes
        };
        serde_json::from_slice(bytes).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}
