//! Scripted provider for controller tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use provider::{
    AccountConnector, ConnectError, InvitationProvider, InviteOutcome, Participant, ProviderError,
    TargetId,
};
use tokio::sync::Notify;

use crate::campaign::{Controller, ControllerConfig};
use crate::registry::Account;

#[derive(Default)]
pub struct ScriptedProvider {
    invites: Mutex<VecDeque<InviteOutcome>>,
    joins: Mutex<HashMap<String, InviteOutcome>>,
    revoked: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(String, TargetId)>>,
    participants: Mutex<Vec<Participant>>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedProvider {
    /// Invite outcomes returned in order; `Success` once the script runs out.
    pub fn with_invites(outcomes: Vec<InviteOutcome>) -> Self {
        Self {
            invites: Mutex::new(outcomes.into()),
            ..Default::default()
        }
    }

    pub fn revoke(&self, account: &str) {
        self.revoked.lock().unwrap().insert(account.to_string());
    }

    pub fn set_join(&self, account: &str, outcome: InviteOutcome) {
        self.joins
            .lock()
            .unwrap()
            .insert(account.to_string(), outcome);
    }

    pub fn set_participants(&self, participants: Vec<Participant>) {
        *self.participants.lock().unwrap() = participants;
    }

    /// Make every invite wait on the returned notify after being logged.
    pub fn hold_invites(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// `(account, target)` for every invite issued so far.
    pub fn calls(&self) -> Vec<(String, TargetId)> {
        self.calls.lock().unwrap().clone()
    }
}

impl AccountConnector for ScriptedProvider {
    fn connect<'a>(
        &'a self,
        account: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ConnectError>> + Send + 'a>> {
        let revoked = self.revoked.lock().unwrap().contains(account);
        Box::pin(async move {
            if revoked {
                Err(ConnectError::Revoked("AUTH_KEY_UNREGISTERED".into()))
            } else {
                Ok(())
            }
        })
    }
}

impl InvitationProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    fn list_participants<'a>(
        &'a self,
        _account: &'a str,
        group: &'a str,
    ) -> Pin<Box<dyn Future<Output = provider::Result<Vec<Participant>>> + Send + 'a>> {
        let participants = self.participants.lock().unwrap().clone();
        Box::pin(async move {
            if group == "missing" {
                return Err(ProviderError::Listing("CHANNEL_INVALID".into()));
            }
            Ok(participants)
        })
    }

    fn ensure_joined<'a>(
        &'a self,
        account: &'a str,
        _group: &'a str,
    ) -> Pin<Box<dyn Future<Output = InviteOutcome> + Send + 'a>> {
        let outcome = self
            .joins
            .lock()
            .unwrap()
            .get(account)
            .cloned()
            .unwrap_or(InviteOutcome::Success);
        Box::pin(async move { outcome })
    }

    fn invite<'a>(
        &'a self,
        account: &'a str,
        _group: &'a str,
        target: &'a TargetId,
    ) -> Pin<Box<dyn Future<Output = InviteOutcome> + Send + 'a>> {
        self.calls
            .lock()
            .unwrap()
            .push((account.to_string(), target.clone()));
        let outcome = self
            .invites
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(InviteOutcome::Success);
        let gate = self.gate.lock().unwrap().clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            outcome
        })
    }
}

pub fn users(names: &[&str]) -> Vec<TargetId> {
    names.iter().map(|n| TargetId::username(n)).collect()
}

/// Controller over `labels` with default settings, backed by `provider`.
pub fn controller(labels: &[&str], provider: Arc<ScriptedProvider>) -> Controller {
    let accounts = labels
        .iter()
        .enumerate()
        .map(|(i, label)| Account::new(i as u32 + 1, *label, format!("+1555000{i}")))
        .collect();
    Controller::new(
        accounts,
        provider.clone(),
        provider,
        ControllerConfig::default(),
    )
}
