use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::{DispatchError, DispatchSender, Offer};
use crate::domain::{Dispatched, PairState};
use crate::fetcher::PairFetcher;
use crate::freshness::FreshnessTracker;
use crate::gate::SafetyGate;
use crate::monitoring::{append_line, heartbeat_line};

/// Counters for one discovery cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub new: usize,
    pub passed: usize,
    pub rejected: usize,
    pub dispatched: usize,
    pub dropped: usize,
    /// False when the listing source could not be reached at all.
    pub fetch_ok: bool,
}

/// The discovery loop: fetch, dedup, gate, dispatch.
pub struct Scanner {
    fetcher: PairFetcher,
    tracker: FreshnessTracker,
    gate: SafetyGate,
    queue: DispatchSender,
    heartbeat_path: Option<PathBuf>,
    cycles: u64,
}

impl Scanner {
    pub fn new(fetcher: PairFetcher, tracker: FreshnessTracker, gate: SafetyGate, queue: DispatchSender) -> Self {
        Self {
            fetcher,
            tracker,
            gate,
            queue,
            heartbeat_path: None,
            cycles: 0,
        }
    }

    pub fn with_heartbeat(mut self, path: impl Into<PathBuf>) -> Self {
        self.heartbeat_path = Some(path.into());
        self
    }

    pub fn tracker(&self) -> &FreshnessTracker {
        &self.tracker
    }

    pub fn queue(&self) -> &DispatchSender {
        &self.queue
    }

    /// One cycle. Only a closed dispatch queue is an error; everything else
    /// degrades to a smaller (or empty) cycle.
    pub async fn run_cycle(&mut self, cycle_start: DateTime<Utc>) -> Result<CycleReport, DispatchError> {
        let mut report = CycleReport::default();

        let pairs = match self.fetcher.fetch().await {
            Ok(pairs) => pairs,
            Err(e) if e.is_data_quality() => {
                warn!(error = %e, "scanner.no_valid_pairs");
                self.tracker.update(&[], cycle_start);
                report.fetch_ok = true;
                return Ok(report);
            }
            Err(e) => {
                // Nothing observed, so the freshness boundary stays put.
                warn!(error = %e, last_cycle = %self.tracker.last_cycle(), "scanner.fetch_failed");
                return Ok(report);
            }
        };
        report.fetch_ok = true;
        report.fetched = pairs.len();

        let fresh = self.tracker.update(&pairs, cycle_start);
        report.new = fresh.len();

        for new in fresh {
            let pair = new.pair;
            debug!(address = %pair.address, symbol = %pair.label(), state = %PairState::Discovered, "scanner.pair");

            let decision = self.gate.evaluate(&pair).await;
            info!(
                address = %pair.address,
                score = decision.score,
                reasons = ?decision.reasons,
                state = %decision.state(),
                "scanner.evaluated"
            );
            if !decision.pass {
                report.rejected += 1;
                continue;
            }
            report.passed += 1;

            let address = pair.address.clone();
            match self.queue.offer(Dispatched { pair, decision })? {
                Offer::Queued => {
                    report.dispatched += 1;
                    info!(%address, state = %PairState::Dispatched, queued = self.queue.len(), "scanner.dispatched");
                }
                Offer::Dropped => report.dropped += 1,
            }
        }
        Ok(report)
    }

    /// Run cycles on a fixed interval until cancelled or the execution
    /// stage goes away.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_s = interval.as_secs(), last_cycle = %self.tracker.last_cycle(), "scanner.start");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let start = Utc::now();
            let report = tokio::select! {
                _ = cancel.cancelled() => break,
                r = self.run_cycle(start) => r?,
            };
            self.cycles += 1;
            info!(
                cycle = self.cycles,
                fetched = report.fetched,
                new = report.new,
                passed = report.passed,
                rejected = report.rejected,
                dispatched = report.dispatched,
                dropped = report.dropped,
                seen = self.tracker.seen_len(),
                "scanner.heartbeat"
            );
            if let Some(path) = &self.heartbeat_path {
                if let Err(e) = append_line(path, &heartbeat_line(self.cycles, &report)) {
                    warn!(error = %e, path = %path.display(), "scanner.heartbeat_write_failed");
                }
            }
        }

        info!(cycles = self.cycles, dropped_total = self.queue.dropped(), "scanner.stop");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateThresholds;
    use crate::dispatch::DispatchQueue;
    use crate::error::FetchError;
    use crate::dispatch::DispatchReceiver;
    use crate::domain::{Pair, SYSTEM_PROGRAM_ADDRESS};
    use crate::providers::fake::{healthy_snapshot, pair, FakeMetrics, FakeSafety, ScriptedListing};
    use std::sync::Arc;

    fn scanner(script: Vec<Result<Vec<Pair>, FetchError>>, start: DateTime<Utc>) -> (Scanner, DispatchReceiver) {
        let (tx, rx) = DispatchQueue::new(10);
        let gate = SafetyGate::new(
            Arc::new(FakeMetrics::default()),
            Arc::new(FakeSafety::new(healthy_snapshot())),
            GateThresholds::default(),
        );
        let fetcher = PairFetcher::new(Arc::new(ScriptedListing::new(script)), Duration::ZERO);
        (Scanner::new(fetcher, FreshnessTracker::new(100, start), gate, tx), rx)
    }

    fn t(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn transport_failure_keeps_the_boundary() {
        let start = t("2024-01-01T00:00:00Z");
        let script = (0..3).map(|_| Err(FetchError::Status(503))).collect();
        let (mut s, _rx) = scanner(script, start);
        let report = s.run_cycle(t("2024-01-01T00:00:30Z")).await.unwrap();
        assert!(!report.fetch_ok);
        assert_eq!(s.tracker().last_cycle(), start);
    }

    #[tokio::test]
    async fn empty_valid_set_advances_the_boundary() {
        let start = t("2024-01-01T00:00:00Z");
        let (mut s, _rx) = scanner(vec![Ok(vec![pair(SYSTEM_PROGRAM_ADDRESS, "SYS")])], start);
        let now = t("2024-01-01T00:00:30Z");
        let report = s.run_cycle(now).await.unwrap();
        assert!(report.fetch_ok);
        assert_eq!(report.fetched, 0);
        assert_eq!(s.tracker().last_cycle(), now);
        assert_eq!(s.tracker().seen_len(), 0);
    }

    #[tokio::test]
    async fn new_passing_pairs_are_dispatched_once() {
        let start = t("2024-01-01T00:00:00Z");
        let (mut s, mut rx) = scanner(vec![Ok(vec![pair("A", "AAA"), pair("B", "BBB")])], start);

        let r1 = s.run_cycle(t("2024-01-01T00:00:30Z")).await.unwrap();
        assert_eq!((r1.fetched, r1.new, r1.passed, r1.dispatched), (2, 2, 2, 2));
        assert_eq!(rx.recv().await.unwrap().pair.address, "A");
        assert_eq!(rx.recv().await.unwrap().pair.address, "B");

        // Same listing next cycle: nothing new.
        let r2 = s.run_cycle(t("2024-01-01T00:01:00Z")).await.unwrap();
        assert_eq!((r2.fetched, r2.new, r2.dispatched), (2, 0, 0));
    }

    #[tokio::test]
    async fn closed_queue_stops_the_cycle() {
        let (mut s, rx) = scanner(vec![Ok(vec![pair("A", "AAA")])], t("2024-01-01T00:00:00Z"));
        drop(rx);
        let err = s.run_cycle(t("2024-01-01T00:00:30Z")).await.unwrap_err();
        assert_eq!(err, DispatchError::Closed);
    }
}
