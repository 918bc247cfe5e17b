use std::time::Duration;

use anyhow::{Context, Result, bail};
use rentloop_core::{MarketRole, User};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_REALTIME_CHANNEL: &str = "rentloop.realtime";
pub const DEFAULT_REALTIME_EMIT_CHANNEL: &str = "rentloop.realtime.emit";

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub api_base_url: String,
    pub api_token: String,
    pub redis_url: String,
    pub http_addr: String,
    pub user_id: String,
    pub user_role: MarketRole,
    pub poll_interval: Duration,
    pub watch_property_ids: Vec<String>,
    pub realtime_channel: String,
    pub realtime_emit_channel: String,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        Self::from_lookup(default_http_addr, |key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(default_http_addr: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_token = get("API_TOKEN").context("API_TOKEN is required")?;
        let user_id = get("USER_ID").context("USER_ID is required")?;
        let redis_url = get("REDIS_URL").context("REDIS_URL is required")?;
        let api_base_url = get("API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let http_addr = get("HTTP_ADDR").unwrap_or_else(|| default_http_addr.to_string());

        let user_role = match get("USER_ROLE") {
            Some(raw) => MarketRole::parse(&raw).with_context(|| {
                format!("USER_ROLE must be buyer, seller or admin, got '{raw}'")
            })?,
            None => MarketRole::Buyer,
        };

        let poll_interval = match get("POLL_INTERVAL_SECS") {
            Some(raw) => {
                let secs: u64 = raw
                    .parse()
                    .with_context(|| format!("POLL_INTERVAL_SECS is not a number: '{raw}'"))?;
                if secs == 0 {
                    bail!("POLL_INTERVAL_SECS must be positive");
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(5),
        };

        let watch_property_ids: Vec<String> = get("WATCH_PROPERTY_IDS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            api_base_url,
            api_token,
            redis_url,
            http_addr,
            user_id,
            user_role,
            poll_interval,
            watch_property_ids,
            realtime_channel: get("REALTIME_CHANNEL")
                .unwrap_or_else(|| DEFAULT_REALTIME_CHANNEL.to_string()),
            realtime_emit_channel: get("REALTIME_EMIT_CHANNEL")
                .unwrap_or_else(|| DEFAULT_REALTIME_EMIT_CHANNEL.to_string()),
        })
    }

    pub fn user(&self) -> User {
        User::new(self.user_id.clone(), self.user_role)
    }
}
