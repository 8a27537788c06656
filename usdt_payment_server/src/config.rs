use std::env;

use chrono::Duration;
use log::*;
use upg_common::Secret;
use usdt_payment_engine::{OrderPolicy, SuffixPoolConfig};

const DEFAULT_UPG_HOST: &str = "127.0.0.1";
const DEFAULT_UPG_PORT: u16 = 8480;
const DEFAULT_ORDER_EXPIRY: Duration = Duration::minutes(30);
const DEFAULT_LEASE_TTL: Duration = Duration::minutes(35);
const DEFAULT_LEASE_GRACE: Duration = Duration::minutes(5);
const DEFAULT_SETTLEMENT_RETENTION: Duration = Duration::days(7);
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// The shared TRC20 deposit address shown to every buyer. The exact transfer amount, not the address,
    /// identifies the order.
    pub deposit_address: String,
    /// The HMAC secret shared with the chain watcher that posts settlement notifications.
    pub webhook_secret: Secret<String>,
    pub suffix_pool: SuffixPoolConfig,
    pub order_policy: OrderPolicy,
    /// How often the expiry worker sweeps for overdue orders.
    pub reaper_interval: std::time::Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_UPG_HOST.to_string(),
            port: DEFAULT_UPG_PORT,
            database_url: String::default(),
            deposit_address: String::default(),
            webhook_secret: random_webhook_secret(),
            suffix_pool: SuffixPoolConfig::default(),
            order_policy: OrderPolicy::default(),
            reaper_interval: std::time::Duration::from_secs(DEFAULT_REAPER_INTERVAL_SECS),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("UPG_HOST").ok().unwrap_or_else(|| DEFAULT_UPG_HOST.into());
        let port = env::var("UPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for UPG_PORT. {e} Using the default, {DEFAULT_UPG_PORT}, instead."
                    );
                    DEFAULT_UPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_UPG_PORT);
        let database_url = env::var("UPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ UPG_DATABASE_URL is not set. Please set it to the URL for the gateway database.");
            String::default()
        });
        let deposit_address = env::var("UPG_DEPOSIT_ADDRESS").ok().unwrap_or_else(|| {
            error!(
                "🪛️ UPG_DEPOSIT_ADDRESS is not set. Please set it to the shared TRC20 address buyers must pay into. \
                 Orders created without it cannot tell the buyer where to send funds."
            );
            String::default()
        });
        let webhook_secret = match env::var("UPG_WEBHOOK_SECRET") {
            Ok(s) if !s.trim().is_empty() => Secret::new(s),
            _ => {
                warn!(
                    "🚨️🚨️🚨️ UPG_WEBHOOK_SECRET has not been set. I'm using a random value for this session. The \
                     chain watcher will not be able to sign notifications that this server accepts, so no payments \
                     will settle. DO NOT operate a production instance like this. 🚨️🚨️🚨️"
                );
                random_webhook_secret()
            },
        };
        let suffix_pool = configure_suffix_pool();
        let order_policy = configure_order_policy();
        let reaper_interval = env::var("UPG_REAPER_INTERVAL_SECS")
            .ok()
            .and_then(|s| {
                s.parse::<u64>()
                    .map_err(|e| warn!("🪛️ Invalid configuration value for UPG_REAPER_INTERVAL_SECS. {e}"))
                    .ok()
            })
            .map(std::time::Duration::from_secs)
            .unwrap_or(std::time::Duration::from_secs(DEFAULT_REAPER_INTERVAL_SECS));
        Self { host, port, database_url, deposit_address, webhook_secret, suffix_pool, order_policy, reaper_interval }
    }
}

fn random_webhook_secret() -> Secret<String> {
    Secret::new(format!("{:032x}{:032x}", rand::random::<u128>(), rand::random::<u128>()))
}

fn configure_suffix_pool() -> SuffixPoolConfig {
    let defaults = SuffixPoolConfig::default();
    let min_suffix = env_u16("UPG_SUFFIX_MIN", defaults.min_suffix);
    let max_suffix = env_u16("UPG_SUFFIX_MAX", defaults.max_suffix);
    let grace = env_duration_secs("UPG_LEASE_GRACE_SECS", DEFAULT_LEASE_GRACE);
    if !(1..=999).contains(&min_suffix) || !(min_suffix..=999).contains(&max_suffix) {
        error!(
            "🪛️ The suffix range [{min_suffix}, {max_suffix}] is invalid. Suffixes must satisfy 1 <= min <= max <= \
             999. Using the default range instead."
        );
        return SuffixPoolConfig { grace, ..defaults };
    }
    SuffixPoolConfig { min_suffix, max_suffix, grace }
}

fn configure_order_policy() -> OrderPolicy {
    let order_expiry = env_duration_secs("UPG_ORDER_EXPIRY_SECS", DEFAULT_ORDER_EXPIRY);
    let lease_ttl = env_duration_secs("UPG_LEASE_TTL_SECS", DEFAULT_LEASE_TTL);
    if lease_ttl < order_expiry {
        warn!(
            "🪛️ The lease TTL ({}s) is shorter than the order expiry ({}s). Suffixes may be reclaimed while their \
             orders are still pending, which risks double-matched amounts.",
            lease_ttl.num_seconds(),
            order_expiry.num_seconds()
        );
    }
    let settlement_retention = env::var("UPG_SETTLEMENT_RETENTION_HOURS")
        .ok()
        .and_then(|s| {
            s.parse::<i64>()
                .map_err(|e| warn!("🪛️ Invalid configuration value for UPG_SETTLEMENT_RETENTION_HOURS. {e}"))
                .ok()
        })
        .map(Duration::hours)
        .unwrap_or(DEFAULT_SETTLEMENT_RETENTION);
    OrderPolicy { order_expiry, lease_ttl, settlement_retention }
}

fn env_u16(var: &str, default: u16) -> u16 {
    env::var(var)
        .ok()
        .and_then(|s| s.parse::<u16>().map_err(|e| warn!("🪛️ Invalid configuration value for {var}. {e}")).ok())
        .unwrap_or(default)
}

fn env_duration_secs(var: &str, default: Duration) -> Duration {
    env::var(var)
        .ok()
        .and_then(|s| s.parse::<i64>().map_err(|e| warn!("🪛️ Invalid configuration value for {var}. {e}")).ok())
        .map(Duration::seconds)
        .unwrap_or(default)
}
