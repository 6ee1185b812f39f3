//! Background task returning cooled accounts to service.
//!
//! Selection already drains expired cooldowns before it decides, so this task
//! is not needed for correctness of a running campaign. It keeps the account
//! list, health and flood-wait views accurate between ticks, and lets a
//! stopped campaign's operator see accounts come back on time.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::campaign::Controller;

impl Controller {
    /// Reap expired cooldowns now. Returns the next deadline, if any.
    pub(crate) async fn reactivate_expired(&self) -> Option<Instant> {
        let mut guard = self.core.lock().await;
        let core = &mut *guard;
        let reactivated = core
            .cooldowns
            .reap_expired(&mut core.registry, Instant::now());
        if !reactivated.is_empty() {
            info!(accounts = ?reactivated, "accounts reactivated");
        }
        core.cooldowns.next_deadline()
    }
}

/// Spawn the reactivation task. It sleeps until the earliest cooldown deadline
/// and is woken early whenever a cooldown is added or cleared.
pub fn spawn_reactivation_task(controller: Arc<Controller>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match controller.reactivate_expired().await {
                Some(deadline) => {
                    debug!(
                        in_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
                        "next cooldown expiry scheduled"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {}
                        _ = controller.cooldown_changed.notified() => {}
                    }
                }
                None => controller.cooldown_changed.notified().await,
            }
        }
    })
}
