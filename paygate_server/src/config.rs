//! Server configuration
//!
//! Everything is read from environment variables (a `.env` file is loaded first, if present). Invalid values are
//! logged and replaced by their defaults, so the server always starts. A rail is only enabled when its payment
//! target is configured: `PAYGATE_QR_PAYLOAD` for QR, the receive address for the coin rails.
use std::{env, str::FromStr, time::Duration as StdDuration};

use chrono::Duration;
use log::*;
use paygate_common::{helpers::parse_boolean_flag, Secret};
use paygate_engine::{
    db_types::Rail,
    rails::{
        CoinAExplorer,
        CoinBExplorer,
        CoinRail,
        QrRail,
        RailRegistry,
        DEFAULT_COIN_A_DECIMALS,
        DEFAULT_HISTORY_LIMIT,
    },
};

use crate::errors::ServerError;

const DEFAULT_PAYGATE_HOST: &str = "127.0.0.1";
const DEFAULT_PAYGATE_PORT: u16 = 8360;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/paygate_store.db";
const DEFAULT_SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(15);
const DEFAULT_POLL_INTERVAL: StdDuration = StdDuration::from_secs(20);
const DEFAULT_EXPLORER_TIMEOUT: StdDuration = StdDuration::from_secs(10);
const DEFAULT_QR_TTL_MINUTES: i64 = 5;
const DEFAULT_COIN_TTL_MINUTES: i64 = 30;
const DEFAULT_MIN_CONFIRMATIONS: u32 = 1;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Run the database migrations on start-up.
    pub run_migrations: bool,
    /// How often the expiry sweeper looks for overdue reservations.
    pub sweep_interval: StdDuration,
    /// How often each pull-based rail is polled while it has a pending order.
    pub poll_interval: StdDuration,
    /// Upper bound on every explorer call, and on a complete poll.
    pub explorer_timeout: StdDuration,
    /// The most recent historical transactions looked at per poll.
    pub history_limit: usize,
    pub qr: Option<QrConfig>,
    pub coin_a: Option<CoinAConfig>,
    pub coin_b: Option<CoinBConfig>,
}

#[derive(Clone, Debug)]
pub struct QrConfig {
    /// The static QR payload payers scan.
    pub payload: String,
    pub ttl: Duration,
}

#[derive(Clone, Debug)]
pub struct CoinAConfig {
    pub explorer_url: String,
    pub address: String,
    pub decimals: u32,
    pub ttl: Duration,
    pub min_confirmations: u32,
}

#[derive(Clone, Debug)]
pub struct CoinBConfig {
    pub explorer_url: String,
    pub address: String,
    pub api_key: Secret<String>,
    pub ttl: Duration,
    pub min_confirmations: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_PAYGATE_HOST.to_string(),
            port: DEFAULT_PAYGATE_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            run_migrations: true,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
            explorer_timeout: DEFAULT_EXPLORER_TIMEOUT,
            history_limit: DEFAULT_HISTORY_LIMIT,
            qr: None,
            coin_a: None,
            coin_b: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("PAYGATE_HOST").ok().unwrap_or_else(|| DEFAULT_PAYGATE_HOST.into());
        let port = parse_env("PAYGATE_PORT", DEFAULT_PAYGATE_PORT);
        let database_url = env::var("PAYGATE_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ PAYGATE_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let run_migrations = parse_boolean_flag(env::var("PAYGATE_RUN_MIGRATIONS").ok(), true);
        let sweep_interval = parse_interval("PAYGATE_SWEEP_INTERVAL", DEFAULT_SWEEP_INTERVAL);
        let poll_interval = parse_interval("PAYGATE_POLL_INTERVAL", DEFAULT_POLL_INTERVAL);
        let explorer_timeout = parse_interval("PAYGATE_EXPLORER_TIMEOUT", DEFAULT_EXPLORER_TIMEOUT);
        let history_limit = parse_env("PAYGATE_HISTORY_LOOKUP_LIMIT", DEFAULT_HISTORY_LIMIT);
        let qr = QrConfig::from_env();
        let coin_a = CoinAConfig::from_env();
        let coin_b = CoinBConfig::from_env();
        let config = Self {
            host,
            port,
            database_url,
            run_migrations,
            sweep_interval,
            poll_interval,
            explorer_timeout,
            history_limit,
            qr,
            coin_a,
            coin_b,
        };
        if config.enabled_rails().is_empty() {
            warn!("🚨️ No payment rail is configured. Every order request will be rejected.");
        }
        config
    }

    pub fn enabled_rails(&self) -> Vec<Rail> {
        let mut rails = Vec::new();
        if self.qr.is_some() {
            rails.push(Rail::Qr);
        }
        if self.coin_a.is_some() {
            rails.push(Rail::CoinA);
        }
        if self.coin_b.is_some() {
            rails.push(Rail::CoinB);
        }
        rails
    }

    /// Builds an adapter for every configured rail.
    pub fn rail_registry(&self) -> Result<RailRegistry, ServerError> {
        let mut rails = RailRegistry::new();
        if let Some(qr) = &self.qr {
            let rail = QrRail::new(qr.payload.as_str(), qr.ttl)
                .map_err(|e| ServerError::ConfigurationError(format!("QR amount parser. {e}")))?;
            rails.register(rail);
        }
        if let Some(c) = &self.coin_a {
            let explorer = CoinAExplorer::new(&c.explorer_url, c.decimals, self.explorer_timeout)
                .map_err(|e| ServerError::ConfigurationError(format!("Coin-A explorer. {e}")))?;
            let rail = CoinRail::new(Rail::CoinA, explorer, c.address.as_str(), c.ttl)
                .with_min_confirmations(c.min_confirmations)
                .with_history_limit(self.history_limit);
            rails.register(rail);
        }
        if let Some(c) = &self.coin_b {
            let explorer = CoinBExplorer::new(&c.explorer_url, c.api_key.reveal(), self.explorer_timeout)
                .map_err(|e| ServerError::ConfigurationError(format!("Coin-B explorer. {e}")))?;
            let rail = CoinRail::new(Rail::CoinB, explorer, c.address.as_str(), c.ttl)
                .with_min_confirmations(c.min_confirmations)
                .with_history_limit(self.history_limit);
            rails.register(rail);
        }
        info!("🪛️ Enabled rails: {:?}", rails.rails());
        Ok(rails)
    }
}

impl QrConfig {
    pub fn from_env() -> Option<Self> {
        let Some(payload) = non_empty_env("PAYGATE_QR_PAYLOAD") else {
            info!("🪛️ PAYGATE_QR_PAYLOAD is not set. The QR rail is disabled.");
            return None;
        };
        let ttl = Duration::minutes(parse_env("PAYGATE_QR_TTL", DEFAULT_QR_TTL_MINUTES));
        Some(Self { payload, ttl })
    }
}

impl CoinAConfig {
    pub fn from_env() -> Option<Self> {
        let Some(address) = non_empty_env("PAYGATE_COIN_A_ADDRESS") else {
            info!("🪛️ PAYGATE_COIN_A_ADDRESS is not set. The Coin-A rail is disabled.");
            return None;
        };
        let Some(explorer_url) = non_empty_env("PAYGATE_COIN_A_EXPLORER_URL") else {
            error!("🪛️ PAYGATE_COIN_A_ADDRESS is set, but PAYGATE_COIN_A_EXPLORER_URL is not. Coin-A is disabled.");
            return None;
        };
        Some(Self {
            explorer_url,
            address,
            decimals: parse_env("PAYGATE_COIN_A_DECIMALS", DEFAULT_COIN_A_DECIMALS),
            ttl: Duration::minutes(parse_env("PAYGATE_COIN_A_TTL", DEFAULT_COIN_TTL_MINUTES)),
            min_confirmations: parse_env("PAYGATE_COIN_A_MIN_CONFIRMATIONS", DEFAULT_MIN_CONFIRMATIONS),
        })
    }
}

impl CoinBConfig {
    pub fn from_env() -> Option<Self> {
        let Some(address) = non_empty_env("PAYGATE_COIN_B_ADDRESS") else {
            info!("🪛️ PAYGATE_COIN_B_ADDRESS is not set. The Coin-B rail is disabled.");
            return None;
        };
        let Some(explorer_url) = non_empty_env("PAYGATE_COIN_B_EXPLORER_URL") else {
            error!("🪛️ PAYGATE_COIN_B_ADDRESS is set, but PAYGATE_COIN_B_EXPLORER_URL is not. Coin-B is disabled.");
            return None;
        };
        let api_key = Secret::new(env::var("PAYGATE_COIN_B_API_KEY").unwrap_or_default());
        if api_key.is_empty() {
            warn!("🪛️ PAYGATE_COIN_B_API_KEY is not set. Coin-B explorer requests will be unauthenticated.");
        }
        Some(Self {
            explorer_url,
            address,
            api_key,
            ttl: Duration::minutes(parse_env("PAYGATE_COIN_B_TTL", DEFAULT_COIN_TTL_MINUTES)),
            min_confirmations: parse_env("PAYGATE_COIN_B_MIN_CONFIRMATIONS", DEFAULT_MIN_CONFIRMATIONS),
        })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_env<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ Invalid configuration value for {name} ({s}). {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
    }
}

/// Reads a duration in whole seconds. Zero is not a usable interval, so it falls back to the default.
fn parse_interval(name: &str, default: StdDuration) -> StdDuration {
    match parse_env(name, default.as_secs()) {
        0 => {
            warn!("🪛️ {name} must be at least 1 second. Using the default, {}s, instead.", default.as_secs());
            default
        },
        secs => StdDuration::from_secs(secs),
    }
}
