use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Address the listing API uses as a placeholder for "no account".
pub const SYSTEM_PROGRAM_ADDRESS: &str = "11111111111111111111111111111111";

/// Wrapped SOL mint.
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Pool reference of a listed pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolRef {
    pub amm_id: String,
    pub lp_mint: String,
    pub base_mint: String,
    pub quote_mint: String,
    pub base_decimals: u8,
    pub quote_decimals: u8,
}

/// A pair as reported by the listing source.
///
/// Never mutated after decode; every fetch cycle builds fresh values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub address: String,
    pub name: String,
    pub symbol: String,
    /// Raw reported creation time (RFC 3339 when present).
    pub timestamp: Option<String>,
    pub pool: PoolRef,
    pub market: String,
    pub token_address: Option<String>,
    pub price: Option<f64>,
    pub liquidity: Option<f64>,
    pub volume_24h: Option<f64>,
    pub market_cap: Option<f64>,
}

impl Pair {
    /// Mint of the non-SOL side. The safety providers are keyed by it and
    /// buys land in its token account.
    pub fn token_mint(&self) -> &str {
        let usable = |m: &str| !m.is_empty() && m != WSOL_MINT;
        match self.token_address.as_deref() {
            Some(t) if usable(t) => t,
            _ if usable(self.pool.base_mint.as_str()) => &self.pool.base_mint,
            _ if usable(self.pool.quote_mint.as_str()) => &self.pool.quote_mint,
            _ => &self.address,
        }
    }

    pub fn sol_is_base(&self) -> bool {
        self.pool.base_mint == WSOL_MINT
    }

    pub fn token_decimals(&self) -> u8 {
        if self.sol_is_base() {
            self.pool.quote_decimals
        } else {
            self.pool.base_decimals
        }
    }

    /// AMM account used for pool resolution and activity subscriptions.
    pub fn amm_id(&self) -> &str {
        if self.pool.amm_id.is_empty() {
            &self.address
        } else {
            &self.pool.amm_id
        }
    }

    pub fn label(&self) -> &str {
        if self.symbol.is_empty() {
            &self.name
        } else {
            &self.symbol
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub liquidity: f64,
    pub volume_24h: f64,
    pub market_cap: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LockStatus {
    pub locked: bool,
    pub remaining: Duration,
}

impl LockStatus {
    pub fn unlocked() -> Self {
        Self::default()
    }

    pub fn locked_for(remaining: Duration) -> Self {
        Self { locked: true, remaining }
    }
}

/// Raw honeypot indicators as reported by a security API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HoneypotIndicators {
    pub flagged: bool,
    /// `None` when the provider did not say.
    pub sellable: Option<bool>,
    /// Percent, e.g. 25.0 for 25%.
    pub buy_tax_pct: Option<f64>,
    pub sell_tax_pct: Option<f64>,
    pub transfer_paused: bool,
    pub blacklisted: bool,
}

impl HoneypotIndicators {
    pub const MAX_TAX_PCT: f64 = 20.0;

    pub fn is_honeypot(&self) -> bool {
        let taxed = |t: Option<f64>| t.is_some_and(|t| t > Self::MAX_TAX_PCT);
        self.flagged
            || self.sellable == Some(false)
            || taxed(self.buy_tax_pct)
            || taxed(self.sell_tax_pct)
            || self.transfer_paused
            || self.blacklisted
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SocialSignals {
    pub twitter_followers: u64,
    pub telegram_members: u64,
    pub website: bool,
    pub repository: bool,
    pub whitepaper: bool,
}

impl SocialSignals {
    pub const AUDIENCE_THRESHOLD: u64 = 100;

    /// Number of presence criteria met, 0..=5.
    pub fn score(&self) -> u32 {
        [
            self.twitter_followers > Self::AUDIENCE_THRESHOLD,
            self.telegram_members > Self::AUDIENCE_THRESHOLD,
            self.website,
            self.repository,
            self.whitepaper,
        ]
        .iter()
        .filter(|hit| **hit)
        .count() as u32
    }

    /// Website/repository/whitepaper hits, used by the score multiplier.
    pub fn artefacts(&self) -> u32 {
        [self.website, self.repository, self.whitepaper]
            .iter()
            .filter(|hit| **hit)
            .count() as u32
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetySnapshot {
    pub lock: LockStatus,
    pub honeypot: bool,
    /// Fraction 0..1 of supply held by the largest holder.
    pub top_holder_share: f64,
    pub holder_count: u64,
    pub social: SocialSignals,
}

/// Outcome of the safety gate for one pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub pass: bool,
    pub score: f64,
    pub reasons: Vec<String>,
}

impl GateDecision {
    pub fn from_reasons(reasons: Vec<String>, score: f64) -> Self {
        Self {
            pass: reasons.is_empty(),
            score,
            reasons,
        }
    }

    pub fn unavailable(cause: impl fmt::Display) -> Self {
        Self::from_reasons(vec![format!("data unavailable: {cause}")], 0.0)
    }

    /// State a pair is in once the gate has ruled on it.
    pub fn state(&self) -> PairState {
        if self.pass {
            PairState::Passed
        } else {
            PairState::Failed
        }
    }
}

/// A gate-passed pair travelling through the dispatch queue.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub pair: Pair,
    pub decision: GateDecision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BuyOutcome {
    Bought { signature: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyAttempt {
    pub wallet: String,
    pub pair_address: String,
    pub symbol: String,
    pub amount_sol: f64,
    pub outcome: BuyOutcome,
}

impl BuyAttempt {
    pub fn state(&self) -> PairState {
        match self.outcome {
            BuyOutcome::Bought { .. } => PairState::Bought,
            BuyOutcome::Failed { .. } => PairState::BuyFailed,
        }
    }
}

/// Lifecycle of a discovered pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PairState {
    Discovered,
    Passed,
    Failed,
    Dispatched,
    Executing,
    Bought,
    BuyFailed,
}

impl PairState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PairState::Failed | PairState::Bought | PairState::BuyFailed)
    }
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PairState::Discovered => "discovered",
            PairState::Passed => "evaluated.pass",
            PairState::Failed => "evaluated.fail",
            PairState::Dispatched => "dispatched",
            PairState::Executing => "executing",
            PairState::Bought => "bought",
            PairState::BuyFailed => "buy_failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn honeypot_from_any_indicator() {
        let clean = HoneypotIndicators {
            sellable: Some(true),
            buy_tax_pct: Some(5.0),
            sell_tax_pct: Some(20.0),
            ..Default::default()
        };
        assert!(!clean.is_honeypot());

        let cases = [
            HoneypotIndicators { flagged: true, ..clean },
            HoneypotIndicators { sellable: Some(false), ..clean },
            HoneypotIndicators { buy_tax_pct: Some(20.5), ..clean },
            HoneypotIndicators { sell_tax_pct: Some(35.0), ..clean },
            HoneypotIndicators { transfer_paused: true, ..clean },
            HoneypotIndicators { blacklisted: true, ..clean },
        ];
        for c in cases {
            assert!(c.is_honeypot(), "{c:?}");
        }
    }

    #[test]
    fn social_score_counts_each_criterion() {
        let s = SocialSignals {
            twitter_followers: 100,
            telegram_members: 101,
            website: true,
            repository: false,
            whitepaper: true,
        };
        assert_eq!(s.score(), 3);
        assert_eq!(s.artefacts(), 2);
    }

    #[test]
    fn token_mint_falls_back_to_base_mint_then_address() {
        let mut p = Pair {
            address: "pair".into(),
            ..Default::default()
        };
        assert_eq!(p.token_mint(), "pair");
        p.pool.base_mint = "base".into();
        assert_eq!(p.token_mint(), "base");
        p.token_address = Some("tok".into());
        assert_eq!(p.token_mint(), "tok");
    }

    #[test]
    fn token_mint_skips_wsol_on_either_side() {
        let mut p = Pair {
            address: "pair".into(),
            pool: PoolRef {
                base_mint: WSOL_MINT.into(),
                quote_mint: "NewTokenMint111".into(),
                base_decimals: 9,
                quote_decimals: 6,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(p.sol_is_base());
        assert_eq!(p.token_mint(), "NewTokenMint111");
        assert_eq!(p.token_decimals(), 6);

        p.token_address = Some(WSOL_MINT.into());
        assert_eq!(p.token_mint(), "NewTokenMint111");

        std::mem::swap(&mut p.pool.base_mint, &mut p.pool.quote_mint);
        p.pool.base_decimals = 6;
        p.pool.quote_decimals = 9;
        assert!(!p.sol_is_base());
        assert_eq!(p.token_mint(), "NewTokenMint111");
        assert_eq!(p.token_decimals(), 6);
    }

    #[test]
    fn decision_passes_only_without_reasons() {
        let ok = GateDecision::from_reasons(vec![], 10.0);
        assert!(ok.pass);
        assert_eq!(ok.state(), PairState::Passed);
        assert!(!ok.state().is_terminal());
        let d = GateDecision::unavailable("timeout");
        assert!(!d.pass);
        assert_eq!(d.state(), PairState::Failed);
        assert!(d.state().is_terminal());
        assert_eq!(d.reasons, vec!["data unavailable: timeout".to_string()]);
    }
}
