use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // RPC
    pub rpc_http_url: String,
    pub rpc_wss_url: String,

    // Data providers
    pub raydium_api_url: String,
    pub solscan_api_url: String,
    pub solscan_api_key: Option<String>,
    pub goplus_api_url: String,
    pub dexscreener_api_url: String,
    pub twitter_bearer_token: Option<String>,
    pub telegram_bot_token: Option<String>,

    // Alerts
    pub slack_webhook_url: Option<String>,
    pub telegram_chat_id: Option<String>,

    // Runtime
    pub dry_run: bool,
    pub poll_interval_secs: u64,
    /// How far back the first cycle looks, so listings from just before
    /// startup are still considered new.
    pub initial_lookback_secs: u64,
    pub fetch_retry_base_ms: u64,
    pub listing_timeout_secs: u64,
    pub provider_timeout_secs: u64,
    pub queue_capacity: usize,
    pub seen_capacity: usize,
    pub watch_activity: bool,

    // Gate thresholds
    pub min_liquidity_usd: f64,
    pub max_market_cap_usd: f64,
    pub min_holders: u64,
    pub max_top_holder_share: f64,
    pub min_lock_days: u64,
    pub min_social_score: u32,

    // Execution
    pub buy_amount_sol: f64,
    pub slippage_bps: u64,
    pub max_slippage_bps: u64,

    // Keys
    pub sol_keypair_path: Option<String>,

    // Persistence
    pub heartbeat_log_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_http_url: "https://api.mainnet-beta.solana.com".into(),
            rpc_wss_url: "wss://api.mainnet-beta.solana.com".into(),
            raydium_api_url: "https://api.raydium.io".into(),
            solscan_api_url: "https://public-api.solscan.io".into(),
            solscan_api_key: None,
            goplus_api_url: "https://api.gopluslabs.io".into(),
            dexscreener_api_url: "https://api.dexscreener.com".into(),
            twitter_bearer_token: None,
            telegram_bot_token: None,
            slack_webhook_url: None,
            telegram_chat_id: None,
            dry_run: true,
            poll_interval_secs: 30,
            initial_lookback_secs: 24 * 60 * 60,
            fetch_retry_base_ms: 2_000,
            listing_timeout_secs: 60,
            provider_timeout_secs: 10,
            queue_capacity: 100,
            seen_capacity: 50_000,
            watch_activity: true,
            min_liquidity_usd: 500.0,
            max_market_cap_usd: 1_000_000.0,
            min_holders: 100,
            max_top_holder_share: 0.15,
            min_lock_days: 30,
            min_social_score: 2,
            buy_amount_sol: 0.1,
            slippage_bps: 100,
            max_slippage_bps: 500,
            sol_keypair_path: None,
            heartbeat_log_path: "./heartbeat.log".into(),
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().map(|s| s.trim().to_lowercase()) {
        None => default,
        Some(v) if v.is_empty() => default,
        Some(v) if v == "1" || v == "true" || v == "yes" || v == "y" || v == "on" => true,
        Some(v) if v == "0" || v == "false" || v == "no" || v == "n" || v == "off" => false,
        Some(_) => default,
    }
}

/// Missing keys fall back to the default; present but unparseable keys are fatal.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{key}: cannot parse {raw:?}")),
        _ => Ok(default),
    }
}

fn env_string(keys: &[&str], default: String) -> String {
    keys.iter()
        .find_map(|k| std::env::var(k).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or(default)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// `SNIPER_CONFIG` points at a JSON file; otherwise the environment is used.
    pub fn load() -> Result<Self> {
        match env_opt("SNIPER_CONFIG") {
            Some(path) => Self::from_file(&path),
            None => Self::from_env(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: Config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_env() -> Result<Self> {
        let d = Config::default();

        let cfg = Self {
            rpc_http_url: env_string(&["SNIPER_RPC_HTTP", "HELIUS_HTTP_URL"], d.rpc_http_url),
            rpc_wss_url: env_string(&["SNIPER_RPC_WS", "HELIUS_WSS_URL"], d.rpc_wss_url),

            raydium_api_url: env_string(&["RAYDIUM_API_URL"], d.raydium_api_url),
            solscan_api_url: env_string(&["SOLSCAN_API_URL"], d.solscan_api_url),
            solscan_api_key: env_opt("SOLSCAN_API_KEY"),
            goplus_api_url: env_string(&["GOPLUS_API_URL"], d.goplus_api_url),
            dexscreener_api_url: env_string(&["DEXSCREENER_API_URL"], d.dexscreener_api_url),
            twitter_bearer_token: env_opt("TWITTER_BEARER_TOKEN"),
            telegram_bot_token: env_opt("TELEGRAM_BOT_TOKEN"),

            slack_webhook_url: env_opt("SLACK_WEBHOOK_URL"),
            telegram_chat_id: env_opt("TELEGRAM_CHAT_ID"),

            dry_run: env_bool("DRY_RUN", d.dry_run),
            poll_interval_secs: env_parse("SNIPER_POLL_INTERVAL_SECS", d.poll_interval_secs)?,
            initial_lookback_secs: env_parse("SNIPER_INITIAL_LOOKBACK_SECS", d.initial_lookback_secs)?,
            fetch_retry_base_ms: env_parse("SNIPER_FETCH_RETRY_BASE_MS", d.fetch_retry_base_ms)?,
            listing_timeout_secs: env_parse("SNIPER_LISTING_TIMEOUT_SECS", d.listing_timeout_secs)?,
            provider_timeout_secs: env_parse("SNIPER_PROVIDER_TIMEOUT_SECS", d.provider_timeout_secs)?,
            queue_capacity: env_parse("SNIPER_QUEUE_CAPACITY", d.queue_capacity)?,
            seen_capacity: env_parse("SNIPER_SEEN_CAPACITY", d.seen_capacity)?,
            watch_activity: env_bool("SNIPER_WATCH_ACTIVITY", d.watch_activity),

            min_liquidity_usd: env_parse("SNIPER_MIN_LIQUIDITY_USD", d.min_liquidity_usd)?,
            max_market_cap_usd: env_parse("SNIPER_MAX_MARKET_CAP_USD", d.max_market_cap_usd)?,
            min_holders: env_parse("SNIPER_MIN_HOLDERS", d.min_holders)?,
            max_top_holder_share: env_parse("SNIPER_MAX_TOP_HOLDER_SHARE", d.max_top_holder_share)?,
            min_lock_days: env_parse("SNIPER_MIN_LOCK_DAYS", d.min_lock_days)?,
            min_social_score: env_parse("SNIPER_MIN_SOCIAL_SCORE", d.min_social_score)?,

            buy_amount_sol: env_parse("SNIPER_BUY_AMOUNT_SOL", d.buy_amount_sol)?,
            slippage_bps: env_parse("SNIPER_SLIPPAGE_BPS", d.slippage_bps)?,
            max_slippage_bps: env_parse("SNIPER_MAX_SLIPPAGE_BPS", d.max_slippage_bps)?,

            sol_keypair_path: env_opt("SOL_KEYPAIR_PATH"),

            heartbeat_log_path: env_string(&["SNIPER_HEARTBEAT_LOG"], d.heartbeat_log_path),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_liquidity_usd <= 0.0 || self.max_market_cap_usd <= 0.0 {
            return Err(anyhow!("liquidity and market cap thresholds must be positive"));
        }
        if self.min_holders == 0 {
            return Err(anyhow!("SNIPER_MIN_HOLDERS must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.max_top_holder_share) {
            return Err(anyhow!("SNIPER_MAX_TOP_HOLDER_SHARE must be a fraction in 0..=1"));
        }
        if self.min_social_score > 5 {
            return Err(anyhow!("SNIPER_MIN_SOCIAL_SCORE cannot exceed 5"));
        }
        if self.buy_amount_sol <= 0.0 {
            return Err(anyhow!("invalid buy amount"));
        }
        if self.queue_capacity == 0 || self.seen_capacity == 0 {
            return Err(anyhow!("queue and seen-state capacities must be positive"));
        }
        if self.poll_interval_secs == 0 {
            return Err(anyhow!("SNIPER_POLL_INTERVAL_SECS must be positive"));
        }
        crate::engine::ensure_slippage_bounds(self.slippage_bps, self.max_slippage_bps)?;
        Ok(())
    }

    pub fn settings(&self) -> Settings {
        Settings {
            gate: GateThresholds {
                min_liquidity_usd: self.min_liquidity_usd,
                max_market_cap_usd: self.max_market_cap_usd,
                min_holders: self.min_holders,
                max_top_holder_share: self.max_top_holder_share,
                min_lock: Duration::from_secs(self.min_lock_days * 24 * 60 * 60),
                min_social_score: self.min_social_score,
            },
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            initial_lookback: Duration::from_secs(self.initial_lookback_secs),
            fetch_retry_base: Duration::from_millis(self.fetch_retry_base_ms),
            queue_capacity: self.queue_capacity,
            seen_capacity: self.seen_capacity,
            buy_amount_sol: self.buy_amount_sol,
            slippage_bps: self.slippage_bps,
            watch_activity: self.watch_activity,
            dry_run: self.dry_run,
        }
    }
}

/// Thresholds of the safety gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GateThresholds {
    pub min_liquidity_usd: f64,
    pub max_market_cap_usd: f64,
    pub min_holders: u64,
    pub max_top_holder_share: f64,
    pub min_lock: Duration,
    pub min_social_score: u32,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Config::default().settings().gate
    }
}

/// Immutable runtime settings handed to the pipeline at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gate: GateThresholds,
    pub poll_interval: Duration,
    pub initial_lookback: Duration,
    pub fetch_retry_base: Duration,
    pub queue_capacity: usize,
    pub seen_capacity: usize,
    pub buy_amount_sol: f64,
    pub slippage_bps: u64,
    pub watch_activity: bool,
    pub dry_run: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Config::default().settings()
    }
}
