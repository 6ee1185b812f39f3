//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The file path comes
//! from `--config`, then `CONFIG_PATH`, then `invite-service.toml`.
//!
//! Accounts can be listed under `[[accounts]]` or provisioned from numbered
//! env vars `API_ID_i`, `API_HASH_i`, `SESSION_i`, `PHONE_i` (i = 1..=10),
//! which become `account{i}`. API hashes and session strings are held in
//! `Secret` and never logged.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Highest slot number scanned for env-provisioned accounts.
pub const MAX_ENV_ACCOUNTS: u32 = 10;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub campaign: CampaignConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

/// Control API listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: default_max_connections(),
        }
    }
}

/// Scheduler pacing and retention
#[derive(Debug, Deserialize)]
pub struct CampaignConfig {
    /// Pause between two invitation attempts.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            log_capacity: default_log_capacity(),
        }
    }
}

impl CampaignConfig {
    pub fn tick_delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Platform bridge the service drives over HTTP
#[derive(Debug, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_url")]
    pub base_url: String,
    /// Upper bound for any single bridge call.
    #[serde(default = "default_bridge_timeout")]
    pub timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: default_bridge_url(),
            timeout_secs: default_bridge_timeout(),
        }
    }
}

impl BridgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Credentials for one platform account
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub label: String,
    pub api_id: i64,
    pub api_hash: Secret<String>,
    pub session: Secret<String>,
    #[serde(default)]
    pub phone: String,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_max_connections() -> usize {
    256
}

fn default_delay_ms() -> u64 {
    30_000
}

fn default_log_capacity() -> usize {
    1000
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_bridge_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Build a configuration from TOML text plus environment overlays, and
    /// validate it. An empty string yields defaults plus env.
    pub fn parse(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> common::Result<()> {
        if let Some(delay) = env_var("DELAY_MS") {
            self.campaign.delay_ms = parse_env("DELAY_MS", &delay)?;
        }
        if let Some(port) = env_var("PORT") {
            self.server.listen_addr.set_port(parse_env("PORT", &port)?);
        }

        for slot in 1..=MAX_ENV_ACCOUNTS {
            let Some(account) = account_from_env(slot)? else {
                continue;
            };
            match self.accounts.iter_mut().find(|a| a.label == account.label) {
                Some(existing) => *existing = account,
                None => self.accounts.push(account),
            }
        }
        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        if !self.bridge.base_url.starts_with("http://")
            && !self.bridge.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "bridge base_url must start with http:// or https://, got: {}",
                self.bridge.base_url
            )));
        }
        if self.bridge.timeout_secs == 0 {
            return Err(common::Error::Config(
                "bridge timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.campaign.delay_ms == 0 {
            return Err(common::Error::Config(
                "delay_ms must be greater than 0".into(),
            ));
        }
        if self.campaign.log_capacity == 0 {
            return Err(common::Error::Config(
                "log_capacity must be greater than 0".into(),
            ));
        }

        for (i, account) in self.accounts.iter().enumerate() {
            if account.label.trim().is_empty() {
                return Err(common::Error::Config(format!(
                    "account #{} has an empty label",
                    i + 1
                )));
            }
            if account.session.is_blank() || account.api_hash.is_blank() {
                return Err(common::Error::Config(format!(
                    "account {} is missing its session or api hash",
                    account.label
                )));
            }
            if self.accounts[..i].iter().any(|a| a.label == account.label) {
                return Err(common::Error::Config(format!(
                    "duplicate account label: {}",
                    account.label
                )));
            }
        }
        Ok(())
    }

    /// Accounts for the scheduler registry, in configuration order.
    pub fn registry_accounts(&self) -> Vec<invite_pool::Account> {
        self.accounts
            .iter()
            .enumerate()
            .map(|(i, a)| invite_pool::Account::new(i as u32 + 1, &a.label, &a.phone))
            .collect()
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("invite-service.toml")
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(name: &str, value: &str) -> common::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| common::Error::Env {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Read slot `i` from the environment. A slot needs all of API id, API hash
/// and session; partially filled slots are skipped with a warning.
fn account_from_env(slot: u32) -> common::Result<Option<AccountConfig>> {
    let api_id = env_var(&format!("API_ID_{slot}"));
    let api_hash = env_var(&format!("API_HASH_{slot}"));
    let session = env_var(&format!("SESSION_{slot}"));

    match (api_id, api_hash, session) {
        (Some(api_id), Some(api_hash), Some(session)) => Ok(Some(AccountConfig {
            label: format!("account{slot}"),
            api_id: parse_env(&format!("API_ID_{slot}"), &api_id)?,
            api_hash: Secret::new(api_hash),
            session: Secret::new(session),
            phone: env_var(&format!("PHONE_{slot}")).unwrap_or_default(),
        })),
        (None, None, None) => Ok(None),
        _ => {
            warn!(slot, "incomplete account credentials in environment, skipping");
            Ok(None)
        }
    }
}
