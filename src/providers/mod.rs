//! Capabilities the safety gate draws on.
//!
//! Each capability has one HTTP implementation and a deterministic fake in
//! [`fake`] so the pipeline runs without network access.

pub mod fake;
pub mod goplus;
pub mod social;
pub mod solscan;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::domain::{HoneypotIndicators, LockStatus, Pair, SafetySnapshot, SocialSignals, TokenMetrics};
use crate::error::ProviderError;

#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn metrics(&self, pair: &Pair) -> Result<TokenMetrics, ProviderError>;
}

#[async_trait]
pub trait SafetyProvider: Send + Sync {
    async fn snapshot(&self, pair: &Pair) -> Result<SafetySnapshot, ProviderError>;
}

#[async_trait]
pub trait LockProvider: Send + Sync {
    async fn lock_status(&self, mint: &str) -> Result<LockStatus, ProviderError>;
}

#[async_trait]
pub trait HoneypotProvider: Send + Sync {
    async fn indicators(&self, mint: &str) -> Result<HoneypotIndicators, ProviderError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HolderStats {
    pub top_holder_share: f64,
    pub holder_count: u64,
}

#[async_trait]
pub trait HolderProvider: Send + Sync {
    async fn holders(&self, mint: &str) -> Result<HolderStats, ProviderError>;
}

#[async_trait]
pub trait SocialProvider: Send + Sync {
    async fn presence(&self, pair: &Pair) -> Result<SocialSignals, ProviderError>;
}

/// Runs the four safety sub-checks in order; the first failure aborts the
/// snapshot and names the failing check.
#[derive(Clone)]
pub struct CompositeSafety {
    pub lock: Arc<dyn LockProvider>,
    pub honeypot: Arc<dyn HoneypotProvider>,
    pub holders: Arc<dyn HolderProvider>,
    pub social: Arc<dyn SocialProvider>,
}

#[async_trait]
impl SafetyProvider for CompositeSafety {
    async fn snapshot(&self, pair: &Pair) -> Result<SafetySnapshot, ProviderError> {
        let mint = pair.token_mint();

        let lock = self
            .lock
            .lock_status(mint)
            .await
            .map_err(ProviderError::in_check("lock"))?;
        let indicators = self
            .honeypot
            .indicators(mint)
            .await
            .map_err(ProviderError::in_check("honeypot"))?;
        let holders = self
            .holders
            .holders(mint)
            .await
            .map_err(ProviderError::in_check("holders"))?;
        let social = self
            .social
            .presence(pair)
            .await
            .map_err(ProviderError::in_check("social"))?;

        debug!(mint, ?lock, ?indicators, ?holders, ?social, "safety.snapshot");
        Ok(SafetySnapshot {
            lock,
            honeypot: indicators.is_honeypot(),
            top_holder_share: holders.top_holder_share,
            holder_count: holders.holder_count,
            social,
        })
    }
}
