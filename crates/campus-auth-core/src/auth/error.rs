use thiserror::Error;

use crate::api::ApiError;
use crate::models::Profile;

use super::DecodeError;

/// The renewal exchange could not produce a fresh access credential.
///
/// Cloned to every caller waiting on the same exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenewalFailure {
    #[error("no renewal credential stored")]
    MissingCredential,

    #[error("renewal credential rejected: {0}")]
    Rejected(String),

    #[error("renewal request failed: {0}")]
    Network(String),

    #[error("unexpected renewal response: {0}")]
    InvalidResponse(String),

    #[error("could not persist renewed credential: {0}")]
    Storage(String),

    /// The user signed out (or in again) while the exchange was in flight
    #[error("session changed during renewal")]
    Superseded,
}

impl From<ApiError> for RenewalFailure {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NetworkError(e) => RenewalFailure::Network(e.to_string()),
            ApiError::InvalidResponse(detail) => RenewalFailure::InvalidResponse(detail),
            other => RenewalFailure::Rejected(other.to_string()),
        }
    }
}

/// Failure of a request sent through `RequestAuthorizer`.
#[derive(Error, Debug)]
pub enum RequestError {
    /// Any backend or transport error, passed through unchanged
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A 401 could not be recovered; the session has been cleared
    #[error("session renewal failed: {0}")]
    Renewal(#[from] RenewalFailure),
}

impl RequestError {
    pub fn user_message(&self) -> String {
        match self {
            RequestError::Api(e) => e.user_message(),
            RequestError::Renewal(_) => "Your session has expired. Please sign in again.".to_string(),
        }
    }
}

/// Failure of a user initiated flow on `AuthGateway`.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Backend reported error (invalid credentials, unverified email, ...)
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("session renewal failed: {0}")]
    Renewal(RenewalFailure),

    #[error("failed to persist credentials")]
    Storage(#[source] anyhow::Error),
}

impl From<RequestError> for AuthError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Api(e) => AuthError::Api(e),
            RequestError::Renewal(f) => AuthError::Renewal(f),
        }
    }
}

impl AuthError {
    /// Readable message derived from the backend payload, with a generic fallback.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Api(e) => e.user_message(),
            AuthError::Renewal(_) => "Your session has expired. Please sign in again.".to_string(),
            AuthError::Storage(_) => "Could not save your sign-in on this device.".to_string(),
        }
    }
}

/// Result of a successful sign-in.
#[derive(Debug, Clone, PartialEq)]
pub enum SignInOutcome {
    /// Profile fetched from `/users/me`
    Authenticated(Profile),
    /// `/users/me` failed; the reduced user from the sign-in response is in use
    DegradedAuthenticated(Profile),
}

impl SignInOutcome {
    pub fn profile(&self) -> &Profile {
        match self {
            SignInOutcome::Authenticated(p) | SignInOutcome::DegradedAuthenticated(p) => p,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, SignInOutcome::DegradedAuthenticated(_))
    }
}

/// How restoring the stored session ended. Only the first variant leaves
/// the user signed in; every other one clears the session.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    Authenticated(Profile),
    NoCredential,
    /// Expired per local claims; no network call was made
    Expired,
    /// Stored credential does not decode
    Malformed(DecodeError),
    /// Backend rejected `/users/me` (revoked server-side, or unreachable)
    ProfileFetchFailed(String),
}

impl RestoreOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, RestoreOutcome::Authenticated(_))
    }
}
