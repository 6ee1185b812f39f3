//! Multi-account invitation scheduler
//!
//! Walks a list of invitation targets, hands each one to the next eligible
//! account in a rotation, and reacts to platform rate limits by cooling the
//! offending account while the others carry on.
//!
//! Account lifecycle:
//! 1. Accounts are provisioned at process start → `Active`
//! 2. Campaign tick selects accounts round-robin, skipping ineligible ones
//! 3. Provider reports a rate limit → `Cooling` until the requested wait elapses,
//!    the target goes to the back of the queue
//! 4. Cooldown expires → reactivation task (or the next selection) returns the
//!    account to `Active`
//! 5. Session revoked or the destination group refuses the account → `Exhausted`
//!    for the rest of the process lifetime
//!
//! All mutable state lives behind one mutex inside `Controller`; provider calls
//! run outside the lock.

pub mod campaign;
pub mod cooldown;
pub mod error;
pub mod export;
pub mod journal;
pub mod queue;
pub mod reactivation;
pub mod registry;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use campaign::{
    Attempt, CampaignState, CampaignStatus, Controller, ControllerConfig, StartRequest,
    StartSummary, TickReport,
};
pub use cooldown::{CooldownEntry, CooldownManager, CooldownView};
pub use error::{Error, Result};
pub use journal::{Journal, LogEntry, Snapshot, Stats};
pub use queue::{Target, TargetQueue, TargetStatus};
pub use reactivation::spawn_reactivation_task;
pub use registry::{Account, AccountRegistry, AccountState, PoolCounts};
