use chrono::{DateTime, Utc};
use solana_sdk::signature::Keypair;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use pair_sentinel::config::GateThresholds;
use pair_sentinel::dispatch::DispatchQueue;
use pair_sentinel::domain::{PairState, SafetySnapshot, SYSTEM_PROGRAM_ADDRESS};
use pair_sentinel::execution::ExecutionStage;
use pair_sentinel::fetcher::PairFetcher;
use pair_sentinel::freshness::FreshnessTracker;
use pair_sentinel::gate::SafetyGate;
use pair_sentinel::providers::fake::{
    healthy_snapshot, pair, FakeActivity, FakeExecutor, FakeMetrics, FakeSafety, ScriptedListing,
};
use pair_sentinel::scanner::Scanner;

fn t(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

#[tokio::test]
async fn sentinel_address_never_reaches_the_tracker() {
    let listing = ScriptedListing::new(vec![Ok(vec![pair(SYSTEM_PROGRAM_ADDRESS, "SYS"), pair("A", "AAA")])]);
    let (tx, _rx) = DispatchQueue::new(10);
    let mut scanner = Scanner::new(
        PairFetcher::new(Arc::new(listing), Duration::ZERO),
        FreshnessTracker::new(100, t("2024-01-01T00:00:00Z")),
        SafetyGate::new(
            Arc::new(FakeMetrics::default()),
            Arc::new(FakeSafety::new(healthy_snapshot())),
            GateThresholds::default(),
        ),
        tx,
    );

    let report = scanner.run_cycle(t("2024-01-01T00:00:30Z")).await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.new, 1);
    assert_eq!(scanner.tracker().seen_len(), 1);
}

#[tokio::test]
async fn provider_failure_does_not_stop_the_cycle() {
    let listing = ScriptedListing::new(vec![Ok(vec![pair("A", "AAA"), pair("B", "BBB"), pair("C", "CCC")])]);
    let weak = SafetySnapshot {
        holder_count: 50,
        ..healthy_snapshot()
    };
    let (tx, mut rx) = DispatchQueue::new(10);
    let mut scanner = Scanner::new(
        PairFetcher::new(Arc::new(listing), Duration::ZERO),
        FreshnessTracker::new(100, t("2024-01-01T00:00:00Z")),
        SafetyGate::new(
            Arc::new(FakeMetrics::default().failing_for("A", "solscan 502")),
            Arc::new(FakeSafety::new(healthy_snapshot()).with("B", weak)),
            GateThresholds::default(),
        ),
        tx,
    );

    let report = scanner.run_cycle(t("2024-01-01T00:00:30Z")).await.unwrap();
    assert_eq!((report.new, report.passed, report.rejected, report.dispatched), (3, 1, 2, 1));
    assert_eq!(rx.recv().await.unwrap().pair.address, "C");
}

#[tokio::test]
async fn discovered_pairs_flow_through_to_buys() {
    let listing = Arc::new(ScriptedListing::new(vec![
        Ok(vec![pair("A", "AAA"), pair("B", "BBB")]),
        Ok(vec![pair("A", "AAA"), pair("B", "BBB"), pair("C", "CCC")]),
    ]));
    let (tx, rx) = DispatchQueue::new(10);
    let mut scanner = Scanner::new(
        PairFetcher::new(listing.clone(), Duration::ZERO),
        FreshnessTracker::new(100, t("2024-01-01T00:00:00Z")),
        SafetyGate::new(
            Arc::new(FakeMetrics::default()),
            Arc::new(FakeSafety::new(healthy_snapshot())),
            GateThresholds::default(),
        ),
        tx,
    );

    let executor = Arc::new(FakeExecutor::default().failing_for("C", "insufficient balance"));
    let feed = Arc::new(FakeActivity::with_events(2).failing_for("B", "ws refused"));
    let stage = ExecutionStage::new(executor.clone(), feed, Arc::new(Keypair::new()), 0.1, true);

    let cancel = CancellationToken::new();
    let consumer = tokio::spawn(stage.run(rx, cancel.clone()));

    let r1 = scanner.run_cycle(t("2024-01-01T00:00:30Z")).await.unwrap();
    let r2 = scanner.run_cycle(t("2024-01-01T00:01:00Z")).await.unwrap();
    assert_eq!((r1.new, r1.dispatched), (2, 2));
    assert_eq!((r2.new, r2.dispatched), (1, 1));
    assert_eq!(listing.calls(), 2);

    // Dropping the scanner closes the queue; the consumer drains and stops.
    drop(scanner);
    let summary = tokio::time::timeout(Duration::from_secs(5), consumer)
        .await
        .expect("consumer stopped")
        .unwrap();

    assert_eq!(executor.attempted(), vec!["A", "B", "C"]);
    let states: Vec<_> = summary.attempts.iter().map(|a| a.state()).collect();
    assert_eq!(states, vec![PairState::Bought, PairState::Bought, PairState::BuyFailed]);
    assert!(states.iter().all(|s| s.is_terminal()));

    // B's subscription failed on its own; A's ran until shutdown.
    assert_eq!(summary.subscriptions.len(), 2);
    let a = summary.subscriptions.iter().find(|r| r.address == "A").unwrap();
    assert_eq!(a.result.as_ref().ok(), Some(&2));
    let b = summary.subscriptions.iter().find(|r| r.address == "B").unwrap();
    assert!(b.result.is_err());
    assert_eq!(summary.panicked, 0);
}

#[tokio::test]
async fn cancellation_stops_the_consumer() {
    let (_tx, rx) = DispatchQueue::new(1);
    let stage = ExecutionStage::new(
        Arc::new(FakeExecutor::default()),
        Arc::new(FakeActivity::default()),
        Arc::new(Keypair::new()),
        0.1,
        true,
    );
    let cancel = CancellationToken::new();
    let consumer = tokio::spawn(stage.run(rx, cancel.clone()));
    cancel.cancel();
    let summary = tokio::time::timeout(Duration::from_secs(5), consumer).await.unwrap().unwrap();
    assert!(summary.attempts.is_empty());
}
