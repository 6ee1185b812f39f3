//! Target queue
//!
//! FIFO of pending invitation targets. The only reordering is done by the two
//! requeue operations: `requeue_at_front` for account-side failures that
//! should not cost the target its place, and `requeue_at_back` for targets hit
//! by a rate limit so the rest of the line goes first.

use std::collections::VecDeque;

use provider::TargetId;
use serde::Serialize;

/// Lifecycle of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Pending,
    Success,
    Failed,
    Skipped,
}

/// An identity to invite, with its outcome once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: TargetId,
    pub status: TargetStatus,
    pub reason: Option<String>,
    /// Account of the most recent attempt.
    pub account: Option<String>,
    pub attempts: u32,
}

impl Target {
    pub fn new(id: TargetId) -> Self {
        Self {
            id,
            status: TargetStatus::Pending,
            reason: None,
            account: None,
            attempts: 0,
        }
    }

    /// Mark the target resolved. Consumes it; resolved targets only live on in
    /// the journal.
    pub fn resolve(mut self, status: TargetStatus, reason: Option<String>) -> Self {
        self.status = status;
        self.reason = reason;
        self
    }
}

#[derive(Debug, Default)]
pub struct TargetQueue {
    pending: VecDeque<Target>,
    enqueued: usize,
}

impl TargetQueue {
    pub fn new(ids: impl IntoIterator<Item = TargetId>) -> Self {
        let pending: VecDeque<Target> = ids.into_iter().map(Target::new).collect();
        let enqueued = pending.len();
        Self { pending, enqueued }
    }

    pub fn peek(&self) -> Option<&Target> {
        self.pending.front()
    }

    pub fn dequeue(&mut self) -> Option<Target> {
        self.pending.pop_front()
    }

    pub fn requeue_at_front(&mut self, target: Target) {
        self.pending.push_front(target);
    }

    pub fn requeue_at_back(&mut self, target: Target) {
        self.pending.push_back(target);
    }

    /// Targets still waiting.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Targets handed to the queue when it was created. Requeues don't count.
    pub fn total_enqueued(&self) -> usize {
        self.enqueued
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.pending.iter()
    }
}
