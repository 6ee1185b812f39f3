//! Error types for scheduler operations

/// Errors from scheduler operations.
///
/// Per-target provider outcomes inside a campaign never surface here; they are
/// recorded in the journal. These variants are what callers of the control
/// operations (start, retry, export) can see.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("no eligible account: {0}")]
    NoEligibleAccount(String),

    #[error("Already running")]
    AlreadyRunning,

    #[error("No accounts selected")]
    NoAccountsSelected,

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("account {account} is rate limited for {wait_secs}s")]
    RateLimited { account: String, wait_secs: u64 },

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("invite failed: {0}")]
    Transient(String),

    #[error("account {account} is unusable: {reason}")]
    AccountUnusable { account: String, reason: String },

    #[error(transparent)]
    Provider(#[from] provider::ProviderError),
}

/// Result alias for scheduler operations.
pub type Result<T> = std::result::Result<T, Error>;
