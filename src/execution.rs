use solana_sdk::signature::{Keypair, Signer};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::dispatch::DispatchReceiver;
use crate::domain::{BuyAttempt, BuyOutcome, Dispatched, PairState};
use crate::engine::BuyExecutor;
use crate::notifier::Notifier;
use crate::watcher::{ActivityFeed, SubscriptionReport};

/// Attempts and subscription reports kept for the shutdown summary.
pub const DEFAULT_HISTORY: usize = 64;

/// What the consumer loop did before it stopped: running totals plus the
/// most recent attempts and subscription reports, oldest first.
#[derive(Debug, Default)]
pub struct ExecutionSummary {
    pub bought: u64,
    pub buy_failed: u64,
    pub subscriptions_ended: u64,
    pub subscriptions_failed: u64,
    pub panicked: usize,
    pub attempts: VecDeque<BuyAttempt>,
    pub subscriptions: VecDeque<SubscriptionReport>,
    history: usize,
}

impl ExecutionSummary {
    fn new(history: usize) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    fn record_attempt(&mut self, attempt: BuyAttempt) {
        match attempt.outcome {
            BuyOutcome::Bought { .. } => self.bought += 1,
            BuyOutcome::Failed { .. } => self.buy_failed += 1,
        }
        remember(&mut self.attempts, attempt, self.history);
    }

    fn record_subscription(&mut self, report: SubscriptionReport) {
        match report.result {
            Ok(_) => self.subscriptions_ended += 1,
            Err(_) => self.subscriptions_failed += 1,
        }
        remember(&mut self.subscriptions, report, self.history);
    }
}

fn remember<T>(ring: &mut VecDeque<T>, item: T, cap: usize) {
    if cap == 0 {
        return;
    }
    if ring.len() == cap {
        ring.pop_front();
    }
    ring.push_back(item);
}

/// Consumer side of the dispatch queue: one buy per dispatched pair, then an
/// optional activity subscription supervised in a `JoinSet`.
pub struct ExecutionStage {
    executor: Arc<dyn BuyExecutor>,
    feed: Arc<dyn ActivityFeed>,
    wallet: Arc<Keypair>,
    amount_sol: f64,
    watch_activity: bool,
    notifier: Notifier,
    history: usize,
}

impl ExecutionStage {
    pub fn new(
        executor: Arc<dyn BuyExecutor>,
        feed: Arc<dyn ActivityFeed>,
        wallet: Arc<Keypair>,
        amount_sol: f64,
        watch_activity: bool,
    ) -> Self {
        Self {
            executor,
            feed,
            wallet,
            amount_sol,
            watch_activity,
            notifier: Notifier::disabled(),
            history: DEFAULT_HISTORY,
        }
    }

    pub fn with_history(mut self, history: usize) -> Self {
        self.history = history;
        self
    }

    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Consume until cancelled or every sender is gone, then stop the
    /// subscriptions and collect their reports.
    pub async fn run(self, mut rx: DispatchReceiver, cancel: CancellationToken) -> ExecutionSummary {
        let subs_cancel = cancel.child_token();
        let mut subs: JoinSet<SubscriptionReport> = JoinSet::new();
        let mut summary = ExecutionSummary::new(self.history);
        info!(wallet = %self.wallet.pubkey(), amount_sol = self.amount_sol, "execution.start");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(joined) = subs.join_next(), if !subs.is_empty() => {
                    collect(&mut summary, joined);
                }
                next = rx.recv() => match next {
                    Some(item) => {
                        let attempt = self.execute(item, &mut subs, &subs_cancel).await;
                        summary.record_attempt(attempt);
                    }
                    None => break,
                },
            }
        }

        rx.close();
        subs_cancel.cancel();
        while let Some(joined) = subs.join_next().await {
            collect(&mut summary, joined);
        }
        info!(
            bought = summary.bought,
            buy_failed = summary.buy_failed,
            subscriptions_ended = summary.subscriptions_ended,
            subscriptions_failed = summary.subscriptions_failed,
            panicked = summary.panicked,
            "execution.stop"
        );
        summary
    }

    async fn execute(
        &self,
        item: Dispatched,
        subs: &mut JoinSet<SubscriptionReport>,
        subs_cancel: &CancellationToken,
    ) -> BuyAttempt {
        let pair = item.pair;
        info!(
            address = %pair.address,
            symbol = %pair.label(),
            score = item.decision.score,
            state = %PairState::Executing,
            "execution.buy"
        );

        let outcome = match self.executor.attempt_buy(&self.wallet, &pair, self.amount_sol).await {
            Ok(signature) => BuyOutcome::Bought { signature },
            Err(e) => BuyOutcome::Failed { reason: e.to_string() },
        };
        let attempt = BuyAttempt {
            wallet: self.wallet.pubkey().to_string(),
            pair_address: pair.address.clone(),
            symbol: pair.symbol.clone(),
            amount_sol: self.amount_sol,
            outcome,
        };

        match &attempt.outcome {
            BuyOutcome::Bought { signature } => {
                info!(address = %pair.address, %signature, state = %attempt.state(), "execution.bought");
                if self.watch_activity {
                    let feed = self.feed.clone();
                    let token = subs_cancel.clone();
                    subs.spawn(async move {
                        let result = feed.watch(&pair, token).await;
                        SubscriptionReport {
                            address: pair.address,
                            result,
                        }
                    });
                }
            }
            BuyOutcome::Failed { reason } => {
                warn!(address = %pair.address, %reason, state = %attempt.state(), "execution.buy_failed");
            }
        }

        self.notifier.buy_outcome(&attempt).await;
        attempt
    }
}

fn collect(summary: &mut ExecutionSummary, joined: Result<SubscriptionReport, JoinError>) {
    match joined {
        Ok(report) => {
            match &report.result {
                Ok(events) => info!(address = %report.address, events, "execution.subscription_ended"),
                Err(e) => warn!(address = %report.address, error = %e, "execution.subscription_failed"),
            }
            summary.record_subscription(report);
        }
        Err(e) if e.is_panic() => {
            error!(error = %e, "execution.subscription_panicked");
            summary.panicked += 1;
        }
        Err(e) => warn!(error = %e, "execution.subscription_aborted"),
    }
}
