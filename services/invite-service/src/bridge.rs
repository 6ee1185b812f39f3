//! HTTP bridge to the messaging platform
//!
//! The platform client itself runs as a separate bridge process. This module
//! speaks the bridge's small JSON protocol and implements the scheduler's
//! collaborator traits on top of it:
//!
//! - `POST /connect {account, api_id, api_hash, session}`
//! - `POST /join {account, group}`
//! - `POST /invite {account, group, target}`
//! - `POST /participants {account, group}` → `{participants: [...]}`
//!
//! Failures come back as `{"error": "<platform error string>"}` with a non-2xx
//! status. Those strings are classified here and nowhere else.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use common::Secret;
use provider::{
    AccountConnector, ConnectError, InvitationProvider, InviteOutcome, Participant, ProviderError,
    TargetId, classify_invite_error, classify_join_error, is_session_revoked,
};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{AccountConfig, BridgeConfig};

struct Credentials {
    api_id: i64,
    api_hash: Secret<String>,
    session: Secret<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BridgeReply {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    participants: Vec<Participant>,
}

#[derive(Debug, thiserror::Error)]
enum CallError {
    #[error("timeout")]
    Timeout,

    #[error("bridge unreachable: {0}")]
    Transport(String),

    #[error("{message}")]
    Rejected { status: StatusCode, message: String },
}

impl CallError {
    fn kind(&self) -> &'static str {
        match self {
            CallError::Timeout => "timeout",
            CallError::Transport(_) => "transport",
            CallError::Rejected { .. } => "rejected",
        }
    }
}

impl From<reqwest::Error> for CallError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CallError::Timeout
        } else {
            CallError::Transport(e.to_string())
        }
    }
}

/// Collaborator implementation backed by the bridge.
///
/// Sessions are opened lazily on first use and remembered, so `connect` is a
/// no-op for an account that is already up.
pub struct BridgeClient {
    client: reqwest::Client,
    base_url: String,
    credentials: HashMap<String, Credentials>,
    connected: Mutex<HashSet<String>>,
}

impl BridgeClient {
    pub fn new(config: &BridgeConfig, accounts: &[AccountConfig]) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        let credentials = accounts
            .iter()
            .map(|a| {
                (
                    a.label.clone(),
                    Credentials {
                        api_id: a.api_id,
                        api_hash: a.api_hash.clone(),
                        session: a.session.clone(),
                    },
                )
            })
            .collect();
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
            connected: Mutex::new(HashSet::new()),
        })
    }

    async fn call(&self, path: &str, body: serde_json::Value) -> Result<BridgeReply, CallError> {
        let url = format!("{}/{path}", self.base_url);
        let result = self.send(&url, body).await;
        if let Err(e) = &result {
            crate::metrics::record_bridge_error(path, e.kind());
        }
        result
    }

    /// Drop the cached session so the next connect goes back to the bridge.
    async fn forget_if_revoked(&self, account: &str, outcome: &InviteOutcome) {
        if let InviteOutcome::SessionRevoked { reason } = outcome {
            warn!(account, error = %reason, "session revoked mid-call");
            self.connected.lock().await.remove(account);
        }
    }

    async fn send(&self, url: &str, body: serde_json::Value) -> Result<BridgeReply, CallError> {
        let response = self.client.post(url).json(&body).send().await?;
        let status = response.status();
        let reply = match response.json::<BridgeReply>().await {
            Ok(reply) => reply,
            Err(e) if e.is_timeout() => return Err(CallError::Timeout),
            Err(_) => BridgeReply::default(),
        };
        if status.is_success() && reply.error.is_none() {
            return Ok(reply);
        }
        Err(CallError::Rejected {
            status,
            message: reply
                .error
                .unwrap_or_else(|| format!("bridge returned HTTP {status}")),
        })
    }
}

impl AccountConnector for BridgeClient {
    fn connect<'a>(
        &'a self,
        account: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), ConnectError>> + Send + 'a>> {
        Box::pin(async move {
            if self.connected.lock().await.contains(account) {
                return Ok(());
            }
            let Some(creds) = self.credentials.get(account) else {
                return Err(ConnectError::Revoked(format!(
                    "no credentials for {account}"
                )));
            };

            let body = serde_json::json!({
                "account": account,
                "api_id": creds.api_id,
                "api_hash": creds.api_hash.expose(),
                "session": creds.session.expose(),
            });
            match self.call("connect", body).await {
                Ok(_) => {
                    self.connected.lock().await.insert(account.to_string());
                    debug!(account, "session established");
                    Ok(())
                }
                Err(CallError::Rejected { status, message })
                    if status == StatusCode::UNAUTHORIZED
                        || status == StatusCode::FORBIDDEN
                        || is_session_revoked(&message) =>
                {
                    warn!(account, error = %message, "session revoked");
                    Err(ConnectError::Revoked(message))
                }
                Err(e) => Err(ConnectError::Unavailable(e.to_string())),
            }
        })
    }
}

impl InvitationProvider for BridgeClient {
    fn id(&self) -> &str {
        "bridge"
    }

    fn list_participants<'a>(
        &'a self,
        account: &'a str,
        group: &'a str,
    ) -> Pin<Box<dyn Future<Output = provider::Result<Vec<Participant>>> + Send + 'a>> {
        Box::pin(async move {
            let body = serde_json::json!({ "account": account, "group": group });
            self.call("participants", body)
                .await
                .map(|reply| reply.participants)
                .map_err(|e| ProviderError::Listing(e.to_string()))
        })
    }

    fn ensure_joined<'a>(
        &'a self,
        account: &'a str,
        group: &'a str,
    ) -> Pin<Box<dyn Future<Output = InviteOutcome> + Send + 'a>> {
        Box::pin(async move {
            let body = serde_json::json!({ "account": account, "group": group });
            match self.call("join", body).await {
                Ok(_) => InviteOutcome::Success,
                Err(CallError::Rejected { message, .. }) => {
                    let outcome = classify_join_error(&message);
                    self.forget_if_revoked(account, &outcome).await;
                    outcome
                }
                Err(e) => InviteOutcome::TransientFailure {
                    error: e.to_string(),
                },
            }
        })
    }

    fn invite<'a>(
        &'a self,
        account: &'a str,
        group: &'a str,
        target: &'a TargetId,
    ) -> Pin<Box<dyn Future<Output = InviteOutcome> + Send + 'a>> {
        Box::pin(async move {
            let body = serde_json::json!({
                "account": account,
                "group": group,
                "target": target,
            });
            match self.call("invite", body).await {
                Ok(_) => InviteOutcome::Success,
                Err(CallError::Rejected { message, .. }) => {
                    let outcome = classify_invite_error(&message);
                    self.forget_if_revoked(account, &outcome).await;
                    outcome
                }
                Err(e) => InviteOutcome::TransientFailure {
                    error: e.to_string(),
                },
            }
        })
    }
}
