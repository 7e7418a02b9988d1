use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::GateThresholds;
use crate::domain::{GateDecision, Pair, SafetySnapshot, SocialSignals, TokenMetrics};
use crate::providers::{MetricsProvider, SafetyProvider};

/// Number of social criteria a token can meet.
const SOCIAL_CRITERIA: u32 = 5;

#[derive(Clone)]
pub struct SafetyGate {
    metrics: Arc<dyn MetricsProvider>,
    safety: Arc<dyn SafetyProvider>,
    thresholds: GateThresholds,
}

impl SafetyGate {
    pub fn new(
        metrics: Arc<dyn MetricsProvider>,
        safety: Arc<dyn SafetyProvider>,
        thresholds: GateThresholds,
    ) -> Self {
        Self {
            metrics,
            safety,
            thresholds,
        }
    }

    /// Never fails: provider errors turn into a failing decision so the
    /// caller can move on to the next pair.
    pub async fn evaluate(&self, pair: &Pair) -> GateDecision {
        let metrics = match self.metrics.metrics(pair).await {
            Ok(m) => m,
            Err(e) => {
                warn!(address = %pair.address, symbol = %pair.label(), error = %e, "gate.metrics_unavailable");
                return GateDecision::unavailable(e);
            }
        };
        let snapshot = match self.safety.snapshot(pair).await {
            Ok(s) => s,
            Err(e) => {
                warn!(address = %pair.address, symbol = %pair.label(), error = %e, "gate.safety_unavailable");
                return GateDecision::unavailable(e);
            }
        };

        let decision = decide(&metrics, &snapshot, &self.thresholds);
        if decision.pass {
            info!(address = %pair.address, symbol = %pair.label(), score = decision.score, "gate.pass");
        } else {
            info!(
                address = %pair.address,
                symbol = %pair.label(),
                score = decision.score,
                reasons = ?decision.reasons,
                "gate.fail"
            );
        }
        decision
    }
}

fn days(d: Duration) -> String {
    format!("{:.1}d", d.as_secs_f64() / 86_400.0)
}

/// Runs every threshold check; none short-circuits.
pub fn decide(m: &TokenMetrics, s: &SafetySnapshot, t: &GateThresholds) -> GateDecision {
    let mut reasons = Vec::new();

    if m.liquidity < t.min_liquidity_usd {
        reasons.push(format!(
            "Low liquidity: ${:.2} < ${:.2}",
            m.liquidity, t.min_liquidity_usd
        ));
    }

    if !s.lock.locked {
        reasons.push("Liquidity not locked".to_string());
    } else if s.lock.remaining < t.min_lock {
        reasons.push(format!(
            "Lock duration too short: {} < {}",
            days(s.lock.remaining),
            days(t.min_lock)
        ));
    }

    if s.honeypot {
        reasons.push("Detected honeypot characteristics".to_string());
    }

    if s.top_holder_share > t.max_top_holder_share {
        reasons.push(format!(
            "Top holder owns too much: {:.1}% > {:.1}%",
            s.top_holder_share * 100.0,
            t.max_top_holder_share * 100.0
        ));
    }

    if s.holder_count < t.min_holders {
        reasons.push(format!("Few holders: {} < {}", s.holder_count, t.min_holders));
    }

    let social = s.social.score();
    if social < t.min_social_score {
        reasons.push(format!(
            "Weak social presence: {social}/{SOCIAL_CRITERIA} criteria met"
        ));
    }

    GateDecision::from_reasons(reasons, score(m, s, t))
}

/// Advisory desirability score. Does not affect pass/fail.
pub fn score(m: &TokenMetrics, s: &SafetySnapshot, t: &GateThresholds) -> f64 {
    let liquidity = (m.liquidity / t.min_liquidity_usd).min(5.0) * 20.0;
    let volume = if m.liquidity > 0.0 {
        (m.volume_24h / m.liquidity * 50.0).min(100.0)
    } else {
        0.0
    };
    let cap = (1.0 - m.market_cap / t.max_market_cap_usd).max(0.0) * 30.0;

    let base = (liquidity + volume + cap).max(0.0);
    base * multiplier(s, t)
}

fn multiplier(s: &SafetySnapshot, t: &GateThresholds) -> f64 {
    let holders = (s.holder_count as f64 / t.min_holders as f64).min(2.0);
    let concentration = if s.top_holder_share > 0.5 { 0.5 } else { 1.0 };
    let lock = if s.lock.locked { 1.2 } else { 1.0 };
    holders * concentration * lock * artefact_bonus(&s.social)
}

fn artefact_bonus(social: &SocialSignals) -> f64 {
    1.0 + 0.1 * social.artefacts() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LockStatus;
    use crate::providers::fake::{healthy_snapshot, pair, FakeMetrics, FakeSafety};

    fn metrics(liquidity: f64, volume_24h: f64, market_cap: f64) -> TokenMetrics {
        TokenMetrics {
            liquidity,
            volume_24h,
            market_cap,
        }
    }

    #[test]
    fn low_liquidity_and_few_holders_both_reported() {
        let t = GateThresholds::default();
        let s = SafetySnapshot {
            holder_count: 50,
            ..healthy_snapshot()
        };
        let d = decide(&metrics(200.0, 0.0, 10_000.0), &s, &t);
        assert!(!d.pass);
        assert_eq!(d.reasons.len(), 2, "{:?}", d.reasons);
        assert!(d.reasons[0].starts_with("Low liquidity"));
        assert_eq!(d.reasons[0], "Low liquidity: $200.00 < $500.00");
        assert!(d.reasons[1].starts_with("Few holders"));
    }

    #[test]
    fn pass_iff_no_reasons() {
        let t = GateThresholds::default();
        let ok = decide(&metrics(20_000.0, 5_000.0, 100_000.0), &healthy_snapshot(), &t);
        assert!(ok.pass);
        assert!(ok.reasons.is_empty());

        let unlocked = SafetySnapshot {
            lock: LockStatus::unlocked(),
            ..healthy_snapshot()
        };
        let d = decide(&metrics(20_000.0, 5_000.0, 100_000.0), &unlocked, &t);
        assert!(!d.pass);
        assert_eq!(d.reasons, vec!["Liquidity not locked".to_string()]);
    }

    #[test]
    fn short_lock_and_concentration() {
        let t = GateThresholds::default();
        let s = SafetySnapshot {
            lock: LockStatus::locked_for(Duration::from_secs(10 * 86_400)),
            top_holder_share: 0.4,
            honeypot: true,
            social: SocialSignals::default(),
            ..healthy_snapshot()
        };
        let d = decide(&metrics(20_000.0, 0.0, 100_000.0), &s, &t);
        assert_eq!(
            d.reasons,
            vec![
                "Lock duration too short: 10.0d < 30.0d".to_string(),
                "Detected honeypot characteristics".to_string(),
                "Top holder owns too much: 40.0% > 15.0%".to_string(),
                "Weak social presence: 0/5 criteria met".to_string(),
            ]
        );
    }

    #[test]
    fn score_is_non_negative_and_grows_with_liquidity() {
        let t = GateThresholds::default();
        let s = healthy_snapshot();
        let mut prev = -1.0;
        for liq in [0.0, 100.0, 500.0, 1_000.0, 2_000.0, 2_499.0] {
            let sc = score(&metrics(liq, 0.0, 2_000_000.0), &s, &t);
            assert!(sc >= 0.0);
            assert!(sc > prev, "liq={liq} score={sc} prev={prev}");
            prev = sc;
        }
        // Capped at 5x the minimum.
        let at_cap = score(&metrics(2_500.0, 0.0, 2_000_000.0), &s, &t);
        let beyond = score(&metrics(50_000.0, 0.0, 2_000_000.0), &s, &t);
        assert_eq!(at_cap, beyond);
    }

    #[test]
    fn score_multiplier_components() {
        let t = GateThresholds::default();
        let m = metrics(500.0, 0.0, 1_000_000.0);
        // base = 20; holders 1000/100 capped at 2, locked 1.2, three artefacts 1.3
        let sc = score(&m, &healthy_snapshot(), &t);
        assert!((sc - 20.0 * 2.0 * 1.2 * 1.3).abs() < 1e-9, "{sc}");

        let whale = SafetySnapshot {
            top_holder_share: 0.6,
            ..healthy_snapshot()
        };
        assert!((score(&m, &whale, &t) - sc / 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn metrics_failure_is_data_unavailable() {
        let gate = SafetyGate::new(
            Arc::new(FakeMetrics::default().failing_for("A", "solscan timeout")),
            Arc::new(FakeSafety::new(healthy_snapshot())),
            GateThresholds::default(),
        );
        let d = gate.evaluate(&pair("A", "AAA")).await;
        assert!(!d.pass);
        assert_eq!(d.score, 0.0);
        assert!(d.reasons[0].starts_with("data unavailable: "), "{:?}", d.reasons);
        assert!(d.reasons[0].contains("solscan timeout"));

        assert!(gate.evaluate(&pair("B", "BBB")).await.pass);
    }
}
