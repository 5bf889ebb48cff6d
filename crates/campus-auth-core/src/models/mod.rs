//! Data models exchanged with the campus backend.
//!
//! - `Profile`, `Role`, `UserId`: the signed-in user's snapshot
//! - `Credential`: an opaque token string that never prints itself
//! - Wire payloads for the `/auth/*` endpoints and their response envelopes

pub mod auth;
pub mod user;

pub use auth::{
    Credential, Envelope, LoginRequest, LoginResponse, RefreshRequest, RefreshResponse,
    RegistrationRequest,
};
pub use user::{Profile, Role, UserId};
