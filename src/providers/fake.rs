//! Deterministic in-memory providers used by tests and offline runs.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{
    HolderProvider, HolderStats, HoneypotProvider, LockProvider, MetricsProvider, SafetyProvider,
    SocialProvider,
};
use crate::domain::{
    HoneypotIndicators, LockStatus, Pair, PoolRef, SafetySnapshot, SocialSignals, TokenMetrics,
};
use crate::engine::BuyExecutor;
use crate::error::{ExecutionError, FetchError, ProviderError, SubscriptionError};
use crate::fetcher::ListingSource;
use crate::watcher::ActivityFeed;
use solana_sdk::signature::Keypair;

/// A listable pair with a pool, liquidity and price set.
pub fn pair(address: &str, symbol: &str) -> Pair {
    Pair {
        address: address.to_string(),
        name: format!("{symbol}-SOL"),
        symbol: symbol.to_string(),
        timestamp: None,
        pool: PoolRef {
            amm_id: address.to_string(),
            lp_mint: format!("{symbol}lp"),
            base_mint: format!("{symbol}mint"),
            quote_mint: "So11111111111111111111111111111111111111112".into(),
            base_decimals: 6,
            quote_decimals: 9,
        },
        market: format!("{symbol}mkt"),
        token_address: None,
        price: Some(0.001),
        liquidity: Some(20_000.0),
        volume_24h: Some(10_000.0),
        market_cap: Some(100_000.0),
    }
}

/// Snapshot that clears the default gate thresholds.
pub fn healthy_snapshot() -> SafetySnapshot {
    SafetySnapshot {
        lock: LockStatus::locked_for(Duration::from_secs(180 * 86_400)),
        honeypot: false,
        top_holder_share: 0.05,
        holder_count: 1_000,
        social: SocialSignals {
            twitter_followers: 500,
            telegram_members: 1_000,
            website: true,
            repository: true,
            whitepaper: true,
        },
    }
}

/// Replays scripted listing results; repeats the last one when exhausted.
pub struct ScriptedListing {
    script: Mutex<VecDeque<Result<Vec<Pair>, FetchError>>>,
    last_ok: Mutex<Vec<Pair>>,
    calls: AtomicUsize,
}

impl ScriptedListing {
    pub fn new(script: Vec<Result<Vec<Pair>, FetchError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last_ok: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingSource for ScriptedListing {
    async fn list_pairs(&self) -> Result<Vec<Pair>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().map_err(|_| FetchError::Status(500))?.pop_front();
        let mut last = self.last_ok.lock().map_err(|_| FetchError::Status(500))?;
        match next {
            Some(Ok(pairs)) => {
                *last = pairs.clone();
                Ok(pairs)
            }
            Some(Err(e)) => Err(e),
            None => Ok(last.clone()),
        }
    }
}

/// Metrics from the pair's own fields, with optional per-address failures.
#[derive(Default)]
pub struct FakeMetrics {
    failures: HashMap<String, String>,
}

impl FakeMetrics {
    pub fn failing_for(mut self, address: &str, cause: &str) -> Self {
        self.failures.insert(address.to_string(), cause.to_string());
        self
    }
}

#[async_trait]
impl MetricsProvider for FakeMetrics {
    async fn metrics(&self, pair: &Pair) -> Result<TokenMetrics, ProviderError> {
        if let Some(cause) = self.failures.get(&pair.address) {
            return Err(ProviderError::api("fake-metrics", cause.clone()));
        }
        Ok(TokenMetrics {
            liquidity: pair.liquidity.unwrap_or_default(),
            volume_24h: pair.volume_24h.unwrap_or_default(),
            market_cap: pair.market_cap.unwrap_or_default(),
        })
    }
}

/// Fixed snapshot with per-address overrides.
pub struct FakeSafety {
    default: SafetySnapshot,
    overrides: HashMap<String, SafetySnapshot>,
}

impl FakeSafety {
    pub fn new(default: SafetySnapshot) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with(mut self, address: &str, snapshot: SafetySnapshot) -> Self {
        self.overrides.insert(address.to_string(), snapshot);
        self
    }
}

#[async_trait]
impl SafetyProvider for FakeSafety {
    async fn snapshot(&self, pair: &Pair) -> Result<SafetySnapshot, ProviderError> {
        Ok(self.overrides.get(&pair.address).copied().unwrap_or(self.default))
    }
}

pub struct FakeLock(pub LockStatus);

#[async_trait]
impl LockProvider for FakeLock {
    async fn lock_status(&self, _mint: &str) -> Result<LockStatus, ProviderError> {
        Ok(self.0)
    }
}

pub struct FakeHoneypot(pub HoneypotIndicators);

#[async_trait]
impl HoneypotProvider for FakeHoneypot {
    async fn indicators(&self, _mint: &str) -> Result<HoneypotIndicators, ProviderError> {
        Ok(self.0)
    }
}

pub struct FakeHolders(Result<HolderStats, String>);

impl FakeHolders {
    pub fn ok(top_holder_share: f64, holder_count: u64) -> Self {
        Self(Ok(HolderStats {
            top_holder_share,
            holder_count,
        }))
    }

    pub fn failing(cause: &str) -> Self {
        Self(Err(cause.to_string()))
    }
}

#[async_trait]
impl HolderProvider for FakeHolders {
    async fn holders(&self, _mint: &str) -> Result<HolderStats, ProviderError> {
        self.0
            .clone()
            .map_err(|cause| ProviderError::api("fake-holders", cause))
    }
}

pub struct FakeSocial(pub SocialSignals);

#[async_trait]
impl SocialProvider for FakeSocial {
    async fn presence(&self, _pair: &Pair) -> Result<SocialSignals, ProviderError> {
        Ok(self.0)
    }
}

/// Buys succeed with signature `sig-<address>` unless the address is listed
/// as failing.
#[derive(Default)]
pub struct FakeExecutor {
    failing: HashMap<String, String>,
    bought: Mutex<Vec<String>>,
}

impl FakeExecutor {
    pub fn failing_for(mut self, address: &str, cause: &str) -> Self {
        self.failing.insert(address.to_string(), cause.to_string());
        self
    }

    pub fn attempted(&self) -> Vec<String> {
        self.bought.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl BuyExecutor for FakeExecutor {
    async fn attempt_buy(
        &self,
        _wallet: &Keypair,
        pair: &Pair,
        _amount_sol: f64,
    ) -> Result<String, ExecutionError> {
        if let Ok(mut v) = self.bought.lock() {
            v.push(pair.address.clone());
        }
        match self.failing.get(&pair.address) {
            Some(cause) => Err(ExecutionError::Simulation(cause.clone())),
            None => Ok(format!("sig-{}", pair.address)),
        }
    }
}

/// Emits `events` activity events, then either fails (for listed addresses)
/// or waits for cancellation.
#[derive(Default)]
pub struct FakeActivity {
    pub events: u64,
    failing: HashMap<String, String>,
}

impl FakeActivity {
    pub fn with_events(events: u64) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn failing_for(mut self, address: &str, cause: &str) -> Self {
        self.failing.insert(address.to_string(), cause.to_string());
        self
    }
}

#[async_trait]
impl ActivityFeed for FakeActivity {
    async fn watch(&self, pair: &Pair, cancel: CancellationToken) -> Result<u64, SubscriptionError> {
        if let Some(cause) = self.failing.get(&pair.address) {
            return Err(SubscriptionError::Subscribe(cause.clone()));
        }
        cancel.cancelled().await;
        Ok(self.events)
    }
}
