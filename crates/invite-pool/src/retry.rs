//! One-shot retry of a single target, outside any campaign.
//!
//! Picks an active account round-robin with its own cursor, so a burst of
//! retries spreads over the pool. Never touches the campaign queue, counters
//! or log. A rate limit still cools the account that hit it.

use std::sync::atomic::Ordering;

use provider::{InviteOutcome, TargetId};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::campaign::{Attempt, Controller};
use crate::error::{Error, Result};

impl Controller {
    /// Invite `target` into `group` once. Returns the account that succeeded.
    pub async fn retry(&self, target: &TargetId, group: &str) -> Result<String> {
        if group.trim().is_empty() {
            return Err(Error::Invalid("group must not be empty".into()));
        }
        let account = {
            let mut core = self.core.lock().await;
            core.settle(Instant::now());
            let active: Vec<&str> = core
                .registry
                .list()
                .iter()
                .filter(|a| core.cooldowns.is_eligible(a))
                .map(|a| a.label.as_str())
                .collect();
            if active.is_empty() {
                return Err(Error::NoEligibleAccount(core.registry.describe()));
            }
            let index = self.retry_cursor.fetch_add(1, Ordering::Relaxed) % active.len();
            active[index].to_string()
        };

        info!(account = %account, target = %target, group, "retrying invite");
        let attempt = self.attempt(&account, group.trim(), target).await;
        metrics::counter!("invite_attempts_total", "outcome" => attempt.label()).increment(1);

        match attempt {
            Attempt::Resolved(InviteOutcome::Success) => Ok(account),
            Attempt::Resolved(InviteOutcome::RateLimited { wait_secs }) => {
                let mut guard = self.core.lock().await;
                let core = &mut *guard;
                core.cooldowns.apply(
                    &mut core.registry,
                    &account,
                    wait_secs,
                    target.clone(),
                    Instant::now(),
                )?;
                drop(guard);
                self.cooldown_changed.notify_one();
                Err(Error::RateLimited { account, wait_secs })
            }
            Attempt::Resolved(InviteOutcome::PermanentRejection { reason }) => {
                Err(Error::Rejected(reason))
            }
            Attempt::Resolved(InviteOutcome::TransientFailure { error }) => {
                Err(Error::Transient(error))
            }
            Attempt::Resolved(InviteOutcome::SessionRevoked { reason })
            | Attempt::AccountUnusable(reason) => {
                warn!(account = %account, reason = %reason, "account unusable during retry");
                if let Err(e) = self.core.lock().await.registry.mark_exhausted(&account) {
                    warn!(account = %account, error = %e, "failed to mark account exhausted");
                }
                Err(Error::AccountUnusable { account, reason })
            }
        }
    }
}
