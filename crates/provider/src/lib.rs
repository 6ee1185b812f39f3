//! Collaborator interfaces for the invitation scheduler
//!
//! The scheduler never talks to the platform directly. It goes through two
//! traits defined here:
//! - `AccountConnector` establishes a session for one account
//! - `InvitationProvider` lists participants, joins the destination group and
//!   sends invitations
//!
//! Provider-specific error wording is turned into a typed `InviteOutcome` at
//! this boundary (see `classify`), so the scheduler only ever matches on enum
//! variants.

pub mod classify;
pub mod filter;

pub use classify::{
    classify_invite_error, classify_join_error, is_session_revoked, parse_wait_secs,
};
pub use filter::{ExportFilters, LastOnlineFilter, MemberFilter, PhotoFilter};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Identity to invite: a public username or an opaque numeric user id.
///
/// Deserializes from either a JSON number or a JSON string, so target lists
/// exported by `/export-members` can be posted back to `/start` unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetId {
    Id(i64),
    Username(String),
}

impl TargetId {
    /// Build a target from user input, stripping a leading `@`.
    pub fn username(name: &str) -> Self {
        TargetId::Username(name.trim().trim_start_matches('@').to_string())
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetId::Id(id) => write!(f, "{id}"),
            TargetId::Username(name) => f.write_str(name),
        }
    }
}

/// Result of a join or invite call, as seen by the scheduler.
///
/// - `Success`: the operation went through (for joins, "already a member" also
///   counts as success)
/// - `RateLimited`: the platform wants this account to wait `wait_secs`
///   before trying again. `wait_secs` is 0 when the wait could not be parsed.
/// - `PermanentRejection`: can never succeed for this target/account pair
/// - `TransientFailure`: anything else, including timeouts
/// - `SessionRevoked`: the account's session died mid-call; the account is at
///   fault, not the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteOutcome {
    Success,
    RateLimited { wait_secs: u64 },
    PermanentRejection { reason: String },
    TransientFailure { error: String },
    SessionRevoked { reason: String },
}

impl InviteOutcome {
    /// Outcome label for logging and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            InviteOutcome::Success => "success",
            InviteOutcome::RateLimited { .. } => "rate_limited",
            InviteOutcome::PermanentRejection { .. } => "rejected",
            InviteOutcome::TransientFailure { .. } => "failed",
            InviteOutcome::SessionRevoked { .. } => "revoked",
        }
    }
}

/// A member of a source group, as returned by `list_participants`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    /// Last time the user was seen online, unix seconds. `None` when hidden.
    #[serde(default)]
    pub last_online: Option<i64>,
    #[serde(default)]
    pub has_photo: bool,
}

impl Participant {
    /// Invitation target for this participant: username when public, else id.
    pub fn target(&self) -> TargetId {
        match &self.username {
            Some(name) if !name.is_empty() => TargetId::Username(name.clone()),
            _ => TargetId::Id(self.id),
        }
    }
}

/// Errors from establishing an account session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// The session was revoked or the credentials are invalid. The account
    /// cannot be used again until it is re-provisioned.
    #[error("session revoked: {0}")]
    Revoked(String),

    /// The connection could not be established right now.
    #[error("connection failed: {0}")]
    Unavailable(String),
}

/// Errors from provider operations that are not per-target outcomes.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("connect failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("participant listing failed: {0}")]
    Listing(String),

    #[error("internal provider error: {0}")]
    Internal(String),
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Establishes a platform session for an account.
///
/// Must be idempotent: the scheduler calls `connect` before every attempt and
/// expects a cheap no-op when the session is already up.
pub trait AccountConnector: Send + Sync {
    fn connect<'a>(
        &'a self,
        account: &'a str,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<(), ConnectError>> + Send + 'a>>;
}

/// Platform operations used by the scheduler and the export endpoint.
///
/// Uses `Pin<Box<dyn Future>>` return types so the scheduler can hold an
/// `Arc<dyn InvitationProvider>`. Implementations are responsible for bounding
/// each call with a timeout and reporting it as `TransientFailure`.
pub trait InvitationProvider: Send + Sync {
    /// Identifier for logging and health reporting.
    fn id(&self) -> &str;

    /// List the members of `group` as seen by `account`.
    fn list_participants<'a>(
        &'a self,
        account: &'a str,
        group: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Participant>>> + Send + 'a>>;

    /// Make `account` a member of `group` if it is not one already.
    fn ensure_joined<'a>(
        &'a self,
        account: &'a str,
        group: &'a str,
    ) -> Pin<Box<dyn Future<Output = InviteOutcome> + Send + 'a>>;

    /// Invite `target` into `group` using `account`.
    fn invite<'a>(
        &'a self,
        account: &'a str,
        group: &'a str,
        target: &'a TargetId,
    ) -> Pin<Box<dyn Future<Output = InviteOutcome> + Send + 'a>>;
}
