use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::{debug, info};

use crate::models::{Credential, Profile, Role};

use super::RenewalFailure;

#[cfg(feature = "ts")]
use ts_rs::TS;

/// Lifecycle phase of the session.
///
/// `Initializing` and `LoggedOut` are transient; observers settle on
/// `Unauthenticated` or `Authenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub enum Phase {
    Initializing,
    Unauthenticated,
    Authenticated,
    Refreshing,
    LoggedOut,
}

/// Why the session last fell back to `Unauthenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(TS), ts(export))]
pub enum SignOutReason {
    UserRequested,
    NoCredential,
    Expired,
    MalformedCredential,
    ProfileFetchFailed,
    RenewalFailed,
}

impl SignOutReason {
    /// The shell should send the user to the sign-in screen.
    pub fn requires_redirect(&self) -> bool {
        matches!(
            self,
            SignOutReason::Expired
                | SignOutReason::MalformedCredential
                | SignOutReason::ProfileFetchFailed
                | SignOutReason::RenewalFailed
        )
    }
}

/// Outcome of a route guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Still restoring; render a placeholder
    Loading,
    SignInRequired,
    /// Signed in, but the role is not permitted here
    Forbidden,
    Allowed,
}

/// Snapshot of the process-wide session.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub phase: Phase,
    /// Present iff `phase` is `Authenticated` or `Refreshing`
    pub user: Option<Profile>,
    pub access_credential: Option<Credential>,
    pub renewal_credential: Option<Credential>,
    /// The profile is the reduced copy embedded in the sign-in response
    pub degraded: bool,
    pub sign_out_reason: Option<SignOutReason>,
}

impl Session {
    fn initializing() -> Self {
        Self {
            phase: Phase::Initializing,
            user: None,
            access_credential: None,
            renewal_credential: None,
            degraded: false,
            sign_out_reason: None,
        }
    }

    /// True only while the stored session is being restored.
    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Initializing
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.phase, Phase::Authenticated | Phase::Refreshing)
    }

    pub fn redirect_to_sign_in(&self) -> bool {
        self.phase == Phase::Unauthenticated
            && self.sign_out_reason.map(|r| r.requires_redirect()).unwrap_or(false)
    }
}

/// In-memory authority on who is signed in.
///
/// One instance per process, shared by `Arc` with every consumer. Changes
/// are published through a `watch` channel, so subscribers always see the
/// latest snapshot.
///
/// The epoch counts sign-ins and sign-outs. It only changes inside the
/// channel's write lock, so a check against it in `apply_renewal` cannot
/// interleave with a sign-out.
pub struct SessionState {
    tx: watch::Sender<Session>,
    epoch: AtomicU64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Session::initializing());
        Self {
            tx,
            epoch: AtomicU64::new(0),
        }
    }

    /// Identifies the current sign-in; any sign-in or sign-out moves it on.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn bump_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> Session {
        self.tx.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.tx.borrow().phase
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.tx.borrow().is_loading()
    }

    pub fn user(&self) -> Option<Profile> {
        self.tx.borrow().user.clone()
    }

    /// Back to `Initializing` ahead of a restore.
    pub fn begin_restore(&self) {
        self.tx.send_modify(|session| {
            self.bump_epoch();
            *session = Session::initializing();
        });
    }

    pub fn set_authenticated(&self, user: Profile, access: Credential) {
        info!(user_id = %user.id, "Session authenticated");
        self.tx.send_modify(|session| {
            self.bump_epoch();
            session.phase = Phase::Authenticated;
            session.user = Some(user);
            session.access_credential = Some(access);
            session.degraded = false;
            session.sign_out_reason = None;
        });
    }

    pub fn set_renewal_credential(&self, renewal: Option<Credential>) {
        self.tx.send_modify(|session| session.renewal_credential = renewal);
    }

    /// Flag that the profile came from the sign-in response, not `/users/me`.
    pub fn mark_degraded(&self) {
        self.tx.send_modify(|session| session.degraded = true);
    }

    /// Swap in a refetched profile without touching credentials.
    pub fn replace_profile(&self, user: Profile) {
        self.tx.send_if_modified(|session| {
            if !session.is_authenticated() {
                return false;
            }
            session.user = Some(user);
            session.degraded = false;
            true
        });
    }

    /// `Authenticated` -> `Refreshing`. No effect in any other phase.
    pub fn begin_refresh(&self) -> bool {
        self.tx.send_if_modified(|session| {
            if session.phase != Phase::Authenticated {
                return false;
            }
            debug!("Session refreshing");
            session.phase = Phase::Refreshing;
            true
        })
    }

    /// Install a renewed access credential, provided the sign-in it was
    /// requested for is still current and signed in.
    ///
    /// `persist` runs under the session lock. A sign-out racing with this
    /// either lands first, and the credential is discarded unpersisted, or
    /// lands after and clears the persisted credential itself.
    pub fn apply_renewal(
        &self,
        epoch: u64,
        access: Credential,
        persist: impl FnOnce(&Credential) -> anyhow::Result<()>,
    ) -> Result<(), RenewalFailure> {
        let mut outcome = Err(RenewalFailure::Superseded);
        self.tx.send_if_modified(|session| {
            if self.epoch() != epoch || !session.is_authenticated() {
                return false;
            }
            if let Err(e) = persist(&access) {
                outcome = Err(RenewalFailure::Storage(e.to_string()));
                return false;
            }
            session.phase = Phase::Authenticated;
            session.access_credential = Some(access);
            outcome = Ok(());
            true
        });
        outcome
    }

    /// Pass through `LoggedOut` and settle on `Unauthenticated`.
    pub fn set_unauthenticated(&self, reason: SignOutReason) {
        info!(?reason, "Session cleared");
        self.tx.send_modify(|session| {
            self.bump_epoch();
            Self::log_out(session);
        });
        self.settle(reason);
    }

    /// Sign out only if `epoch` is still the current sign-in. `clear` runs
    /// under the session lock before anyone can observe the change.
    pub fn expire(&self, epoch: u64, reason: SignOutReason, clear: impl FnOnce()) -> bool {
        let expired = self.tx.send_if_modified(|session| {
            if self.epoch() != epoch || !session.is_authenticated() {
                return false;
            }
            self.bump_epoch();
            clear();
            Self::log_out(session);
            true
        });
        if expired {
            info!(?reason, "Session cleared");
            self.settle(reason);
        }
        expired
    }

    fn log_out(session: &mut Session) {
        session.phase = Phase::LoggedOut;
        session.user = None;
        session.access_credential = None;
        session.renewal_credential = None;
        session.degraded = false;
    }

    fn settle(&self, reason: SignOutReason) {
        self.tx.send_modify(|session| {
            session.phase = Phase::Unauthenticated;
            session.sign_out_reason = Some(reason);
        });
    }

    /// Guard for a screen restricted to `roles`; `None` admits any signed-in user.
    pub fn route_access(&self, roles: Option<&[Role]>) -> RouteAccess {
        let session = self.tx.borrow();
        if session.is_loading() {
            return RouteAccess::Loading;
        }
        let Some(user) = session.user.as_ref() else {
            return RouteAccess::SignInRequired;
        };
        match roles {
            Some(roles) if !user.has_role(roles) => RouteAccess::Forbidden,
            _ => RouteAccess::Allowed,
        }
    }
}
