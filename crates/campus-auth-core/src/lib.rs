//! Session and token lifecycle for the campus portal client.
//!
//! The portal's pages are thin views over the backend; what this crate owns
//! is deciding whether the user is signed in, keeping the short-lived access
//! credential valid, renewing it transparently on a 401, and failing safely
//! back to the sign-in screen when renewal is impossible.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, ApiRequest, RequestAuthorizer};
pub use auth::{
    AuthError, AuthGateway, AuthStack, CredentialKey, CredentialStore, Phase, RenewalCoordinator,
    RenewalFailure, RequestError, RestoreOutcome, RouteAccess, Session, SessionState,
    SignInOutcome, SignOutReason, TokenCodec,
};
pub use config::Config;
pub use models::{Credential, Profile, RegistrationRequest, Role};
