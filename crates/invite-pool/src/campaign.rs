//! Campaign controller
//!
//! Owns every piece of scheduler state behind one mutex and drives the run
//! loop. A campaign walks its target queue one tick at a time; each tick picks
//! the next eligible account in rotation, hands one target to the provider and
//! applies the outcome.
//!
//! States: `Idle → Running → {Stopped, Completed}`. `restart` returns to Idle
//! and wipes stats, logs and cooldowns.
//!
//! A tick holds the lock while choosing, releases it for the provider call, and
//! takes it again to apply the result. At most one tick is in flight across the
//! whole controller: a new campaign waits for a stopped campaign's pending call,
//! whose result is still recorded. Only `restart` drops an in-flight result, and
//! even then its effect on the account (cooldown, exhaustion) is applied.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use provider::{AccountConnector, ConnectError, InvitationProvider, InviteOutcome, TargetId};
use serde::Serialize;
use tokio::sync::{Mutex, Notify, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cooldown::{CooldownManager, CooldownView};
use crate::error::{Error, Result};
use crate::journal::{Journal, LogEntry, Snapshot, Stats};
use crate::queue::{Target, TargetQueue, TargetStatus};
use crate::registry::{Account, AccountRegistry, PoolCounts};

/// Controller settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Fixed pause between two ticks.
    pub tick_delay: Duration,
    /// Log entries kept before the oldest are evicted.
    pub log_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_delay: Duration::from_secs(30),
            log_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignState {
    Idle,
    Running,
    Stopped,
    Completed,
}

/// Parameters for a new campaign.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub group: String,
    pub targets: Vec<TargetId>,
    /// Account labels to rotate through, in order.
    pub accounts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartSummary {
    pub campaign_id: Uuid,
    pub accounts: usize,
    pub targets: usize,
    pub delay: Duration,
}

impl StartSummary {
    /// Fractional delays keep their digits: 1500 ms reads `1.5s`.
    pub fn message(&self) -> String {
        format!(
            "Started with {} accounts, delay {}s",
            self.accounts,
            self.delay.as_secs_f64()
        )
    }
}

/// What happened to a target handed to an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// The provider answered for this target.
    Resolved(InviteOutcome),
    /// The account itself can no longer be used (revoked session, refused by
    /// the destination group). The target is not at fault.
    AccountUnusable(String),
}

impl From<InviteOutcome> for Attempt {
    fn from(outcome: InviteOutcome) -> Self {
        match outcome {
            InviteOutcome::SessionRevoked { reason } => Attempt::AccountUnusable(reason),
            other => Attempt::Resolved(other),
        }
    }
}

impl Attempt {
    pub fn label(&self) -> &'static str {
        match self {
            Attempt::Resolved(outcome) => outcome.label(),
            Attempt::AccountUnusable(_) => "account_unusable",
        }
    }
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickReport {
    /// No running campaign (never started, stopped, or replaced).
    Idle,
    /// Another tick is still waiting on the provider.
    Busy,
    /// The queue ran dry; the campaign is now Completed.
    Completed,
    /// No account in the rotation is eligible; the campaign is now Stopped.
    NoEligibleAccount,
    /// A target was handed to an account.
    Attempted {
        account: String,
        target: TargetId,
        attempt: Attempt,
    },
    /// The scheduler was restarted while the provider call was in flight.
    Discarded,
}

impl TickReport {
    /// Whether the run loop should stop scheduling ticks.
    pub fn ends_loop(&self) -> bool {
        matches!(
            self,
            TickReport::Idle | TickReport::Completed | TickReport::NoEligibleAccount
        )
    }
}

/// Campaign progress for the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignStatus {
    pub state: CampaignState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub total: usize,
    pub pending: usize,
    pub stats: Stats,
    pub pool: PoolCounts,
}

struct Campaign {
    id: Uuid,
    group: String,
    queue: TargetQueue,
    rotation: Vec<String>,
    rotation_index: usize,
    state: CampaignState,
    cancel: watch::Sender<bool>,
}

impl Campaign {
    fn halt(&mut self, state: CampaignState) {
        self.state = state;
        let _ = self.cancel.send(true);
    }
}

pub(crate) struct Core {
    pub(crate) registry: AccountRegistry,
    pub(crate) cooldowns: CooldownManager,
    journal: Journal,
    campaign: Option<Campaign>,
    /// A tick's provider call is outstanding.
    in_flight: bool,
}

impl Core {
    /// Drain expired cooldowns so account states are exact at `now`.
    pub(crate) fn settle(&mut self, now: Instant) {
        self.cooldowns.reap_expired(&mut self.registry, now);
    }
}

/// The invitation scheduler.
///
/// Cheap to share as `Arc<Controller>`; every operation takes `&self`.
pub struct Controller {
    pub(crate) core: Mutex<Core>,
    pub(crate) connector: Arc<dyn AccountConnector>,
    pub(crate) provider: Arc<dyn InvitationProvider>,
    config: ControllerConfig,
    pub(crate) cooldown_changed: Notify,
    tick_settled: Notify,
    pub(crate) retry_cursor: AtomicUsize,
}

impl Controller {
    pub fn new(
        accounts: Vec<Account>,
        connector: Arc<dyn AccountConnector>,
        provider: Arc<dyn InvitationProvider>,
        config: ControllerConfig,
    ) -> Self {
        info!(
            provider = provider.id(),
            tick_delay_ms = config.tick_delay.as_millis() as u64,
            "campaign controller initialized"
        );
        Self {
            core: Mutex::new(Core {
                registry: AccountRegistry::new(accounts),
                cooldowns: CooldownManager::new(),
                journal: Journal::new(config.log_capacity),
                campaign: None,
                in_flight: false,
            }),
            connector,
            provider,
            config,
            cooldown_changed: Notify::new(),
            tick_settled: Notify::new(),
            retry_cursor: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Snapshot of all accounts in registry order, with cooldowns settled.
    pub async fn accounts(&self) -> Vec<Account> {
        let mut core = self.core.lock().await;
        core.settle(Instant::now());
        core.registry.list().to_vec()
    }

    pub async fn account(&self, label: &str) -> Result<Account> {
        let mut core = self.core.lock().await;
        core.settle(Instant::now());
        core.registry.get(label).cloned()
    }

    /// Start a campaign and spawn its run loop. The first tick fires after one
    /// tick delay.
    pub async fn start(self: &Arc<Self>, request: StartRequest) -> Result<StartSummary> {
        let (summary, cancel) = self.install(request).await?;
        let controller = Arc::clone(self);
        let campaign_id = summary.campaign_id;
        tokio::spawn(async move { controller.run(campaign_id, cancel).await });
        Ok(summary)
    }

    /// Validate a start request and install the campaign without spawning the
    /// run loop. Counters are reset; the log is kept.
    ///
    /// If a stopped campaign still has a provider call out, waits for its
    /// result to be recorded first.
    pub async fn install(
        &self,
        request: StartRequest,
    ) -> Result<(StartSummary, watch::Receiver<bool>)> {
        if request.accounts.is_empty() {
            return Err(Error::NoAccountsSelected);
        }
        if request.group.trim().is_empty() {
            return Err(Error::Invalid("group must not be empty".into()));
        }

        let mut guard = loop {
            // Registered before the check so a settle in between is not missed.
            let settled = self.tick_settled.notified();
            let guard = self.core.lock().await;
            if guard
                .campaign
                .as_ref()
                .is_some_and(|c| c.state == CampaignState::Running)
            {
                return Err(Error::AlreadyRunning);
            }
            if !guard.in_flight {
                break guard;
            }
            drop(guard);
            debug!("waiting for the previous campaign's invite to settle");
            settled.await;
        };
        let core = &mut *guard;

        let mut rotation: Vec<String> = Vec::with_capacity(request.accounts.len());
        for label in request.accounts {
            core.registry.get(&label)?;
            if !rotation.contains(&label) {
                rotation.push(label);
            }
        }

        let (cancel, cancel_rx) = watch::channel(false);
        let campaign = Campaign {
            id: Uuid::new_v4(),
            group: request.group.trim().to_string(),
            queue: TargetQueue::new(request.targets),
            rotation,
            rotation_index: 0,
            state: CampaignState::Running,
            cancel,
        };
        let summary = StartSummary {
            campaign_id: campaign.id,
            accounts: campaign.rotation.len(),
            targets: campaign.queue.total_enqueued(),
            delay: self.config.tick_delay,
        };

        core.journal.reset_stats();
        if let Some(previous) = core.campaign.replace(campaign) {
            debug!(campaign_id = %previous.id, "replacing finished campaign");
        }
        info!(
            campaign_id = %summary.campaign_id,
            accounts = summary.accounts,
            targets = summary.targets,
            "campaign started"
        );
        Ok((summary, cancel_rx))
    }

    /// Stop the running campaign. Idempotent; returns whether anything was
    /// running. A provider call already in flight completes and is recorded.
    pub async fn stop(&self) -> bool {
        let mut core = self.core.lock().await;
        match core.campaign.as_mut() {
            Some(campaign) if campaign.state == CampaignState::Running => {
                campaign.halt(CampaignState::Stopped);
                info!(campaign_id = %campaign.id, "campaign stopped");
                true
            }
            _ => false,
        }
    }

    /// Stop and reset everything: campaign, stats, logs, cooldowns. Accounts
    /// that were cooling become Active; exhausted accounts stay exhausted.
    pub async fn restart(&self) {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;
        if let Some(mut campaign) = core.campaign.take() {
            campaign.halt(CampaignState::Stopped);
        }
        core.journal.clear();
        core.cooldowns.clear(&mut core.registry);
        drop(guard);
        self.cooldown_changed.notify_one();
        info!("scheduler restarted");
    }

    /// Run one tick against whatever campaign is current.
    pub async fn tick(&self) -> TickReport {
        self.tick_for(None).await
    }

    /// Run one tick, but only if `expected` is still the current campaign.
    async fn tick_for(&self, expected: Option<Uuid>) -> TickReport {
        let (campaign_id, group, slot, rotation_len, target) = {
            let mut guard = self.core.lock().await;
            let core = &mut *guard;
            core.settle(Instant::now());

            let Some(campaign) = core.campaign.as_mut() else {
                return TickReport::Idle;
            };
            if expected.is_some_and(|id| id != campaign.id) {
                return TickReport::Idle;
            }
            if campaign.state != CampaignState::Running {
                return TickReport::Idle;
            }
            if core.in_flight {
                return TickReport::Busy;
            }
            if campaign.queue.is_empty() {
                campaign.halt(CampaignState::Completed);
                info!(campaign_id = %campaign.id, "campaign completed, queue empty");
                return TickReport::Completed;
            }

            let n = campaign.rotation.len();
            let slot = if core
                .cooldowns
                .all_cooling_or_exhausted(&core.registry, &campaign.rotation)
            {
                None
            } else {
                (0..n)
                    .map(|offset| (campaign.rotation_index + offset) % n)
                    .find(|&i| {
                        core.registry
                            .get(&campaign.rotation[i])
                            .is_ok_and(|account| core.cooldowns.is_eligible(account))
                    })
            };
            let Some(slot) = slot else {
                campaign.halt(CampaignState::Stopped);
                warn!(
                    campaign_id = %campaign.id,
                    pending = campaign.queue.len(),
                    pool = %core.registry.describe(),
                    "no eligible account, campaign stopped"
                );
                return TickReport::NoEligibleAccount;
            };
            let Some(mut target) = campaign.queue.dequeue() else {
                campaign.halt(CampaignState::Completed);
                return TickReport::Completed;
            };
            target.account = Some(campaign.rotation[slot].clone());
            target.attempts += 1;
            core.in_flight = true;
            (campaign.id, campaign.group.clone(), slot, n, target)
        };

        let account = target.account.clone().unwrap_or_default();
        debug!(%campaign_id, account = %account, target = %target.id, "attempting invite");
        let attempt = self.attempt(&account, &group, &target.id).await;
        metrics::counter!("invite_attempts_total", "outcome" => attempt.label()).increment(1);

        let mut guard = self.core.lock().await;
        let core = &mut *guard;
        let now = Instant::now();
        core.in_flight = false;
        self.tick_settled.notify_waiters();

        // Account-level consequences hold regardless of what happened to the
        // campaign meanwhile.
        match &attempt {
            Attempt::Resolved(InviteOutcome::RateLimited { wait_secs }) => {
                if let Err(e) =
                    core.cooldowns
                        .apply(&mut core.registry, &account, *wait_secs, target.id.clone(), now)
                {
                    warn!(account = %account, error = %e, "failed to apply cooldown");
                }
                self.cooldown_changed.notify_one();
            }
            Attempt::AccountUnusable(reason) => {
                warn!(account = %account, reason = %reason, "account unusable, marking exhausted");
                if let Err(e) = core.registry.mark_exhausted(&account) {
                    warn!(account = %account, error = %e, "failed to mark account exhausted");
                }
            }
            Attempt::Resolved(_) => {}
        }

        let Some(campaign) = core.campaign.as_mut().filter(|c| c.id == campaign_id) else {
            info!(
                %campaign_id,
                account = %account,
                target = %target.id,
                "scheduler restarted during attempt, result discarded"
            );
            return TickReport::Discarded;
        };
        campaign.rotation_index = (slot + 1) % rotation_len;

        let report = TickReport::Attempted {
            account: account.clone(),
            target: target.id.clone(),
            attempt: attempt.clone(),
        };
        match attempt {
            Attempt::Resolved(InviteOutcome::Success) => {
                info!(account = %account, target = %target.id, "invite succeeded");
                core.journal.record(target.resolve(TargetStatus::Success, None));
            }
            Attempt::Resolved(InviteOutcome::RateLimited { .. }) => {
                campaign.queue.requeue_at_back(target);
            }
            Attempt::Resolved(InviteOutcome::PermanentRejection { reason }) => {
                info!(account = %account, target = %target.id, reason = %reason, "target skipped");
                core.journal
                    .record(target.resolve(TargetStatus::Skipped, Some(reason)));
            }
            Attempt::Resolved(InviteOutcome::TransientFailure { error }) => {
                warn!(account = %account, target = %target.id, error = %error, "invite failed");
                core.journal
                    .record(target.resolve(TargetStatus::Failed, Some(error)));
            }
            Attempt::Resolved(InviteOutcome::SessionRevoked { .. }) | Attempt::AccountUnusable(_) => {
                campaign.queue.requeue_at_front(target);
            }
        }
        report
    }

    /// Connect, join the destination group if needed, invite.
    pub(crate) async fn attempt(&self, account: &str, group: &str, target: &TargetId) -> Attempt {
        match self.connector.connect(account).await {
            Ok(()) => {}
            Err(ConnectError::Revoked(reason)) => return Attempt::AccountUnusable(reason),
            Err(e @ ConnectError::Unavailable(_)) => {
                return Attempt::Resolved(InviteOutcome::TransientFailure {
                    error: e.to_string(),
                });
            }
        }
        match self.provider.ensure_joined(account, group).await {
            InviteOutcome::Success => {}
            InviteOutcome::PermanentRejection { reason } => {
                return Attempt::AccountUnusable(format!("cannot join {group}: {reason}"));
            }
            other => return other.into(),
        }
        self.provider.invite(account, group, target).await.into()
    }

    /// Tick loop for one campaign. Exits when the campaign ends, is stopped,
    /// or is replaced.
    async fn run(self: Arc<Self>, campaign_id: Uuid, mut cancel: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.tick_delay) => {}
                _ = cancel.changed() => {}
            }
            if *cancel.borrow() || cancel.has_changed().is_err() {
                debug!(%campaign_id, "campaign timer cancelled");
                break;
            }
            let report = self.tick_for(Some(campaign_id)).await;
            if report.ends_loop() {
                debug!(%campaign_id, ?report, "campaign loop finished");
                break;
            }
        }
    }

    pub async fn status(&self) -> CampaignStatus {
        let mut core = self.core.lock().await;
        core.settle(Instant::now());
        let pool = core.registry.counts();
        let stats = core.journal.stats();
        match core.campaign.as_ref() {
            Some(c) => CampaignStatus {
                state: c.state,
                campaign_id: Some(c.id),
                group: Some(c.group.clone()),
                total: c.queue.total_enqueued(),
                pending: c.queue.len(),
                stats,
                pool,
            },
            None => CampaignStatus {
                state: CampaignState::Idle,
                campaign_id: None,
                group: None,
                total: 0,
                pending: 0,
                stats,
                pool,
            },
        }
    }

    pub async fn stats(&self) -> Stats {
        self.core.lock().await.journal.stats()
    }

    pub async fn logs(&self) -> Vec<LogEntry> {
        self.core.lock().await.journal.logs()
    }

    /// Live cooldowns, remaining seconds computed now.
    pub async fn flood_waits(&self) -> Vec<CooldownView> {
        let mut core = self.core.lock().await;
        let now = Instant::now();
        core.settle(now);
        core.cooldowns.views(now)
    }

    pub async fn snapshot(&self) -> Snapshot {
        let mut core = self.core.lock().await;
        let now = Instant::now();
        core.settle(now);
        Snapshot {
            stats: core.journal.stats(),
            logs: core.journal.logs(),
            cooldowns: core.cooldowns.views(now),
        }
    }

    /// Pool health: per-account state plus overall status.
    pub async fn health(&self) -> serde_json::Value {
        let mut core = self.core.lock().await;
        let now = Instant::now();
        core.settle(now);
        let counts = core.registry.counts();
        let accounts: Vec<serde_json::Value> = core
            .registry
            .list()
            .iter()
            .map(|a| match a.state {
                crate::AccountState::Cooling { until } => serde_json::json!({
                    "name": a.label,
                    "status": a.state.label(),
                    "cooldown_remaining_secs": until.saturating_duration_since(now).as_secs(),
                }),
                _ => serde_json::json!({
                    "name": a.label,
                    "status": a.state.label(),
                }),
            })
            .collect();
        serde_json::json!({
            "status": counts.status(),
            "accounts_total": counts.total,
            "accounts_active": counts.active,
            "accounts_cooling": counts.cooling,
            "accounts_exhausted": counts.exhausted,
            "accounts": accounts,
        })
    }
}
