//! REST client for the campus backend.
//!
//! `ApiClient` sends single requests with an explicit bearer credential.
//! `RequestAuthorizer` sits in front of it for everything the portal sends:
//! it attaches the stored access credential and recovers from a 401 by
//! renewing the session once.

pub mod authorizer;
pub mod client;
pub mod error;

pub use authorizer::{ApiRequest, RequestAuthorizer, MAX_AUTH_RETRIES};
pub use client::ApiClient;
pub use error::ApiError;
