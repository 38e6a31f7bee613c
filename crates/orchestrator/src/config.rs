//! Orchestrator configuration loaded from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `DISPATCH_INTERVAL_MS` | `500` |
//! | `DISPATCH_RETRY_LIMIT` | `2` |
//! | `POLL_INTERVAL_MS` | `5000` |
//! | `POLL_JITTER_MS` | `250` |
//! | `POLL_TIMEOUT_SECS` | `1800` |
//! | `PROVIDER_REQUEST_TIMEOUT_SECS` | `30` |
//! | `PROVIDERS` | empty (comma-separated provider names) |
//! | `PROVIDER_<NAME>_URL` | required per provider |
//! | `PROVIDER_<NAME>_DIALECT` | `task` |
//! | `PROVIDER_<NAME>_API_KEY` | unset |
//! | `PROVIDER_<NAME>_KINDS` | empty (kinds served by default) |
//! | `ASSET_STORE_URL` | unset (artifacts are not persisted) |
//! | `ASSET_STORE_TOKEN` | required with `ASSET_STORE_URL` |
//! | `ASSET_OWNER_ID` | required with `ASSET_STORE_URL` |
//!
//! `<NAME>` is the provider name upper-cased with `-` replaced by `_`.

use std::time::Duration;

use scenegen_core::asset::AssetKind;
use scenegen_core::config::{
    env_optional, env_parse_or, env_required, parse_value, split_list, ConfigError,
};
use scenegen_core::types::DbId;
use scenegen_providers::Dialect;

/// Timing of the per-task polling loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Base delay between two status checks. Also bounds each status request.
    pub interval: Duration,
    /// Upper bound of the random delay added to every interval.
    pub jitter: Duration,
    /// Give up on a provider task after this long.
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            jitter: Duration::from_millis(250),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// One configured generation provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub name: String,
    pub dialect: Dialect,
    pub base_url: String,
    pub api_key: Option<String>,
    /// Kinds this provider serves when a queue entry names no provider.
    pub kinds: Vec<AssetKind>,
}

/// Where successful artifacts are persisted.
#[derive(Debug, Clone)]
pub struct AssetStoreSettings {
    pub base_url: String,
    pub token: String,
    pub owner_id: DbId,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Minimum spacing between two dispatch starts.
    pub dispatch_interval: Duration,
    /// Re-queues allowed for a transient submit failure before the job fails.
    pub dispatch_retry_limit: u32,
    pub poll: PollConfig,
    /// Timeout applied to every provider HTTP request.
    pub provider_request_timeout: Duration,
    pub providers: Vec<ProviderSettings>,
    pub asset_store: Option<AssetStoreSettings>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dispatch_interval: Duration::from_millis(500),
            dispatch_retry_limit: 2,
            poll: PollConfig::default(),
            provider_request_timeout: Duration::from_secs(30),
            providers: Vec::new(),
            asset_store: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let poll = PollConfig {
            interval: Duration::from_millis(env_parse_or("POLL_INTERVAL_MS", 5000u64)?),
            jitter: Duration::from_millis(env_parse_or("POLL_JITTER_MS", 250u64)?),
            timeout: Duration::from_secs(env_parse_or("POLL_TIMEOUT_SECS", 1800u64)?),
        };
        if poll.interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "POLL_INTERVAL_MS".into(),
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let dispatch_interval = Duration::from_millis(env_parse_or("DISPATCH_INTERVAL_MS", 500u64)?);
        if dispatch_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "DISPATCH_INTERVAL_MS".into(),
                value: "0".into(),
                reason: "must be greater than zero".into(),
            });
        }

        let providers = match env_optional("PROVIDERS") {
            Some(raw) => split_list(&raw)
                .iter()
                .map(|name| provider_from_env(name))
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let asset_store = match env_optional("ASSET_STORE_URL") {
            Some(base_url) => Some(AssetStoreSettings {
                base_url,
                token: env_required("ASSET_STORE_TOKEN")?,
                owner_id: parse_value("ASSET_OWNER_ID", &env_required("ASSET_OWNER_ID")?)?,
            }),
            None => None,
        };

        Ok(Self {
            dispatch_interval,
            dispatch_retry_limit: env_parse_or("DISPATCH_RETRY_LIMIT", defaults.dispatch_retry_limit)?,
            poll,
            provider_request_timeout: Duration::from_secs(env_parse_or(
                "PROVIDER_REQUEST_TIMEOUT_SECS",
                30u64,
            )?),
            providers,
            asset_store,
        })
    }
}

/// Environment variable prefix for a provider name.
pub fn provider_env_prefix(name: &str) -> String {
    let normalized: String = name
        .chars()
        .map(|c| match c {
            '-' | '.' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect();
    format!("PROVIDER_{normalized}")
}

fn provider_from_env(name: &str) -> Result<ProviderSettings, ConfigError> {
    let prefix = provider_env_prefix(name);
    let key = |suffix: &str| format!("{prefix}_{suffix}");

    let dialect = match env_optional(&key("DIALECT")) {
        Some(raw) => parse_value(&key("DIALECT"), &raw)?,
        None => Dialect::Task,
    };
    let kinds = match env_optional(&key("KINDS")) {
        Some(raw) => split_list(&raw)
            .iter()
            .map(|k| parse_value::<AssetKind>(&key("KINDS"), k))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(ProviderSettings {
        name: name.to_string(),
        dialect,
        base_url: env_required(&key("URL"))?,
        api_key: env_optional(&key("API_KEY")),
        kinds,
    })
}
