//! Account registry
//!
//! Holds the accounts provisioned at process start, in insertion order, and
//! each one's availability. Accounts are never removed while the process runs;
//! only their state changes.

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Availability of an account.
///
/// Transitions:
/// - Active → Cooling (rate limit reported)
/// - Cooling → Active (cooldown expired)
/// - Active → Exhausted (session revoked, or refused by the destination group)
/// - Cooling → Exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Active,
    Cooling { until: Instant },
    Exhausted,
}

impl AccountState {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            AccountState::Active => "active",
            AccountState::Cooling { .. } => "cooling",
            AccountState::Exhausted => "exhausted",
        }
    }
}

/// A credentialed platform account.
#[derive(Debug, Clone)]
pub struct Account {
    /// Provisioning slot number.
    pub id: u32,
    /// Display label, unique within the registry (e.g. `account3`).
    pub label: String,
    /// Identity hint shown to operators, usually the phone number.
    pub phone: String,
    pub state: AccountState,
}

impl Account {
    pub fn new(id: u32, label: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            phone: phone.into(),
            state: AccountState::Active,
        }
    }
}

/// Account counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolCounts {
    pub total: usize,
    pub active: usize,
    pub cooling: usize,
    pub exhausted: usize,
}

impl PoolCounts {
    /// Overall label: all active → healthy, some → degraded, none → unhealthy.
    pub fn status(&self) -> &'static str {
        if self.total > 0 && self.active == self.total {
            "healthy"
        } else if self.active > 0 {
            "degraded"
        } else {
            "unhealthy"
        }
    }
}

#[derive(Debug, Default)]
pub struct AccountRegistry {
    accounts: Vec<Account>,
}

impl AccountRegistry {
    /// Build a registry. Later accounts with a label already seen are dropped.
    pub fn new(accounts: Vec<Account>) -> Self {
        let mut kept: Vec<Account> = Vec::with_capacity(accounts.len());
        for account in accounts {
            if kept.iter().any(|a| a.label == account.label) {
                warn!(account = %account.label, "duplicate account label, ignoring");
                continue;
            }
            kept.push(account);
        }
        info!(accounts = kept.len(), "account registry initialized");
        Self { accounts: kept }
    }

    /// All accounts in insertion order.
    pub fn list(&self) -> &[Account] {
        &self.accounts
    }

    pub fn get(&self, label: &str) -> Result<&Account> {
        self.accounts
            .iter()
            .find(|a| a.label == label)
            .ok_or_else(|| Error::AccountNotFound(label.to_string()))
    }

    fn get_mut(&mut self, label: &str) -> Result<&mut Account> {
        self.accounts
            .iter_mut()
            .find(|a| a.label == label)
            .ok_or_else(|| Error::AccountNotFound(label.to_string()))
    }

    pub fn mark_cooling(&mut self, label: &str, until: Instant) -> Result<()> {
        let account = self.get_mut(label)?;
        if account.state == AccountState::Exhausted {
            debug!(account = label, "ignoring cooldown for exhausted account");
            return Ok(());
        }
        account.state = AccountState::Cooling { until };
        Ok(())
    }

    pub fn mark_active(&mut self, label: &str) -> Result<()> {
        let account = self.get_mut(label)?;
        if account.state == AccountState::Exhausted {
            return Ok(());
        }
        account.state = AccountState::Active;
        Ok(())
    }

    pub fn mark_exhausted(&mut self, label: &str) -> Result<()> {
        let account = self.get_mut(label)?;
        warn!(account = label, "account exhausted");
        account.state = AccountState::Exhausted;
        Ok(())
    }

    pub fn counts(&self) -> PoolCounts {
        let mut counts = PoolCounts {
            total: self.accounts.len(),
            ..Default::default()
        };
        for account in &self.accounts {
            match account.state {
                AccountState::Active => counts.active += 1,
                AccountState::Cooling { .. } => counts.cooling += 1,
                AccountState::Exhausted => counts.exhausted += 1,
            }
        }
        counts
    }

    /// Human-readable summary used in `NoEligibleAccount` messages.
    pub fn describe(&self) -> String {
        let c = self.counts();
        format!(
            "{} of {} accounts active ({} cooling, {} exhausted)",
            c.active, c.total, c.cooling, c.exhausted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry(labels: &[&str]) -> AccountRegistry {
        AccountRegistry::new(
            labels
                .iter()
                .enumerate()
                .map(|(i, l)| Account::new(i as u32 + 1, *l, format!("+1555000{i}")))
                .collect(),
        )
    }

    #[test]
    fn list_keeps_insertion_order() {
        let reg = registry(&["account2", "account1", "account3"]);
        let labels: Vec<_> = reg.list().iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["account2", "account1", "account3"]);
    }

    #[test]
    fn duplicate_labels_are_dropped() {
        let reg = AccountRegistry::new(vec![
            Account::new(1, "a", "+1"),
            Account::new(2, "a", "+2"),
        ]);
        assert_eq!(reg.list().len(), 1);
        assert_eq!(reg.get("a").unwrap().phone, "+1");
    }

    #[test]
    fn get_unknown_is_not_found() {
        let reg = registry(&["a"]);
        assert!(matches!(reg.get("zzz"), Err(Error::AccountNotFound(l)) if l == "zzz"));
    }

    #[test]
    fn state_transitions() {
        let mut reg = registry(&["a", "b"]);
        let until = Instant::now() + Duration::from_secs(30);

        reg.mark_cooling("a", until).unwrap();
        assert_eq!(reg.get("a").unwrap().state, AccountState::Cooling { until });

        reg.mark_active("a").unwrap();
        assert_eq!(reg.get("a").unwrap().state, AccountState::Active);

        reg.mark_exhausted("b").unwrap();
        assert_eq!(reg.get("b").unwrap().state, AccountState::Exhausted);
    }

    #[test]
    fn exhausted_is_sticky() {
        let mut reg = registry(&["a"]);
        reg.mark_exhausted("a").unwrap();
        reg.mark_active("a").unwrap();
        reg.mark_cooling("a", Instant::now()).unwrap();
        assert_eq!(reg.get("a").unwrap().state, AccountState::Exhausted);
    }

    #[test]
    fn counts_and_status() {
        let mut reg = registry(&["a", "b", "c"]);
        assert_eq!(reg.counts().status(), "healthy");

        reg.mark_cooling("a", Instant::now() + Duration::from_secs(5))
            .unwrap();
        reg.mark_exhausted("b").unwrap();
        let counts = reg.counts();
        assert_eq!(
            counts,
            PoolCounts {
                total: 3,
                active: 1,
                cooling: 1,
                exhausted: 1
            }
        );
        assert_eq!(counts.status(), "degraded");
        assert_eq!(
            reg.describe(),
            "1 of 3 accounts active (1 cooling, 1 exhausted)"
        );

        reg.mark_exhausted("c").unwrap();
        assert_eq!(reg.counts().status(), "unhealthy");
    }

    #[test]
    fn empty_registry_is_unhealthy() {
        assert_eq!(AccountRegistry::default().counts().status(), "unhealthy");
    }
}
