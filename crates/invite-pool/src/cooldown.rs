//! Cooldown manager
//!
//! Turns a rate-limit signal into a `CooldownEntry` and moves the account to
//! `Cooling`. Expiries are kept in a min-heap so the reactivation task can sleep
//! until exactly the next one, and so selection code can drain whatever has
//! already expired before deciding.
//!
//! The entry and the account's `Cooling` state are always changed together.
//! The heap may hold stale deadlines (an entry replaced or cleared); those are
//! skipped when popped.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use provider::TargetId;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::Result;
use crate::registry::{Account, AccountRegistry, AccountState};

/// Lower bound for any cooldown. A zero or unparseable wait still benches the
/// account for this long.
pub const MIN_COOLDOWN_SECS: u64 = 1;

/// Upper bound for any cooldown. Wait values come from the platform and are not
/// trusted to be sane.
pub const MAX_COOLDOWN_SECS: u64 = 7 * 24 * 3600;

/// A live cooldown for one account.
#[derive(Debug, Clone)]
pub struct CooldownEntry {
    pub account: String,
    /// Target whose attempt triggered the cooldown.
    pub target: TargetId,
    pub expires_at: Instant,
    /// Wall-clock expiry, for display.
    pub expires_wall: DateTime<Utc>,
    /// Cooldown length at creation, after clamping.
    pub wait_secs: u64,
}

impl CooldownEntry {
    /// Seconds left at `now`, rounded up, never negative.
    pub fn remaining_secs(&self, now: Instant) -> u64 {
        let left = self.expires_at.saturating_duration_since(now);
        left.as_millis().div_ceil(1000) as u64
    }
}

/// Cooldown as shown by the flood-wait view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownView {
    pub username: TargetId,
    pub account: String,
    /// Local time of day the cooldown ends, `HH:MM:SS`.
    pub end_time: String,
    pub expires_at: DateTime<Utc>,
    pub remaining_sec: u64,
}

#[derive(Debug, Default)]
pub struct CooldownManager {
    /// Live entries, oldest first. At most one per account.
    entries: Vec<CooldownEntry>,
    deadlines: BinaryHeap<Reverse<(Instant, String)>>,
}

impl CooldownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bench `account` for `wait_secs` (clamped) because of `target`.
    ///
    /// Replaces any existing entry for the same account. Exhausted accounts get
    /// no entry and `None` is returned.
    pub fn apply(
        &mut self,
        registry: &mut AccountRegistry,
        account: &str,
        wait_secs: u64,
        target: TargetId,
        now: Instant,
    ) -> Result<Option<CooldownEntry>> {
        if registry.get(account)?.state == AccountState::Exhausted {
            debug!(account, "not cooling an exhausted account");
            return Ok(None);
        }
        let wait_secs = wait_secs.clamp(MIN_COOLDOWN_SECS, MAX_COOLDOWN_SECS);
        let expires_at = now + Duration::from_secs(wait_secs);
        registry.mark_cooling(account, expires_at)?;

        let entry = CooldownEntry {
            account: account.to_string(),
            target,
            expires_at,
            expires_wall: Utc::now() + chrono::Duration::seconds(wait_secs as i64),
            wait_secs,
        };
        self.entries.retain(|e| e.account != account);
        self.entries.push(entry.clone());
        self.deadlines
            .push(Reverse((expires_at, account.to_string())));

        metrics::counter!("invite_cooldowns_total").increment(1);
        info!(
            account,
            target = %entry.target,
            wait_secs,
            "account entering cooldown (rate limited)"
        );
        Ok(Some(entry))
    }

    /// True iff the account can be used right now.
    pub fn is_eligible(&self, account: &Account) -> bool {
        account.state == AccountState::Active
    }

    /// True when none of `labels` can currently proceed. Unknown labels count
    /// as unable to proceed.
    pub fn all_cooling_or_exhausted(&self, registry: &AccountRegistry, labels: &[String]) -> bool {
        !labels.iter().any(|label| {
            registry
                .get(label)
                .is_ok_and(|account| self.is_eligible(account))
        })
    }

    /// Remove every entry expired at `now` and return those accounts to Active.
    ///
    /// Returns the reactivated labels in expiry order.
    pub fn reap_expired(&mut self, registry: &mut AccountRegistry, now: Instant) -> Vec<String> {
        let mut reactivated = Vec::new();
        while let Some(Reverse((deadline, _))) = self.deadlines.peek() {
            if *deadline > now {
                break;
            }
            let Some(Reverse((deadline, label))) = self.deadlines.pop() else {
                break;
            };
            let live = self
                .entries
                .iter()
                .position(|e| e.account == label && e.expires_at == deadline);
            let Some(index) = live else {
                debug!(account = %label, "skipping stale cooldown deadline");
                continue;
            };
            self.entries.remove(index);
            if registry.mark_active(&label).is_ok() {
                info!(account = %label, "cooldown expired, account available again");
                reactivated.push(label);
            }
        }
        reactivated
    }

    /// Earliest pending deadline, possibly stale.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Drop every entry and return the affected accounts to Active.
    pub fn clear(&mut self, registry: &mut AccountRegistry) {
        for entry in self.entries.drain(..) {
            let _ = registry.mark_active(&entry.account);
        }
        self.deadlines.clear();
    }

    pub fn entries(&self) -> &[CooldownEntry] {
        &self.entries
    }

    /// Live entries with remaining seconds computed at `now`.
    pub fn views(&self, now: Instant) -> Vec<CooldownView> {
        self.entries
            .iter()
            .map(|e| CooldownView {
                username: e.target.clone(),
                account: e.account.clone(),
                end_time: e
                    .expires_wall
                    .with_timezone(&Local)
                    .format("%H:%M:%S")
                    .to_string(),
                expires_at: e.expires_wall,
                remaining_sec: e.remaining_secs(now),
            })
            .collect()
    }
}
