use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::RetryIf;
use tracing::{debug, info, warn};

use crate::domain::{Pair, SYSTEM_PROGRAM_ADDRESS};
use crate::error::FetchError;

/// Total attempts per fetch, first try included.
pub const MAX_ATTEMPTS: usize = 3;

/// Where pairs come from. One call returns the full current listing.
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn list_pairs(&self) -> Result<Vec<Pair>, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingAddress,
    SystemAddress,
    NoIdentifiers,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rejection::MissingAddress => "empty address",
            Rejection::SystemAddress => "system program address",
            Rejection::NoIdentifiers => "no market, mint, liquidity or price",
        })
    }
}

/// A pair is usable when it has a real address and at least one identifying signal.
pub fn check_pair(p: &Pair) -> Result<(), Rejection> {
    let address = p.address.trim();
    if address.is_empty() {
        return Err(Rejection::MissingAddress);
    }
    if address == SYSTEM_PROGRAM_ADDRESS {
        return Err(Rejection::SystemAddress);
    }

    let has_base = !p.pool.base_mint.is_empty();
    let has_quote = !p.pool.quote_mint.is_empty();
    let market_backed = !p.market.is_empty() && (has_base || has_quote);
    let positive = |v: Option<f64>| v.is_some_and(|v| v > 0.0);

    if market_backed || positive(p.liquidity) || positive(p.price) || (has_base && has_quote) {
        Ok(())
    } else {
        Err(Rejection::NoIdentifiers)
    }
}

/// Keep valid pairs in order; returns them with the number dropped.
pub fn filter_valid(pairs: Vec<Pair>) -> (Vec<Pair>, usize) {
    let mut dropped = 0usize;
    let valid = pairs
        .into_iter()
        .filter(|p| match check_pair(p) {
            Ok(()) => true,
            Err(reason) => {
                dropped += 1;
                debug!(address = %p.address, name = %p.name, %reason, "fetcher.drop");
                false
            }
        })
        .collect();
    (valid, dropped)
}

pub struct PairFetcher {
    source: Arc<dyn ListingSource>,
    retry_base: Duration,
}

impl PairFetcher {
    pub fn new(source: Arc<dyn ListingSource>, retry_base: Duration) -> Self {
        Self { source, retry_base }
    }

    /// Fetch with bounded linear backoff, then apply the validity filter.
    pub async fn fetch(&self) -> Result<Vec<Pair>, FetchError> {
        let mut attempts = 0usize;
        let delays = (1..MAX_ATTEMPTS as u32).map(|i| self.retry_base * i);

        let result = RetryIf::spawn(
            delays,
            || {
                attempts += 1;
                self.source.list_pairs()
            },
            |e: &FetchError| {
                let retry = e.is_retryable();
                if retry {
                    warn!(error = %e, "fetcher.attempt_failed");
                }
                retry
            },
        )
        .await;

        let pairs = match result {
            Ok(pairs) => pairs,
            Err(last) if last.is_retryable() => {
                return Err(FetchError::Exhausted {
                    attempts,
                    last: Box::new(last),
                })
            }
            Err(e) => return Err(e),
        };

        let total = pairs.len();
        let (valid, dropped) = filter_valid(pairs);
        info!(total, valid = valid.len(), dropped, attempts, "fetcher.fetched");

        if valid.is_empty() {
            return Err(FetchError::NoValidPairs { total });
        }
        Ok(valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::fake::{pair, ScriptedListing};

    fn fetcher(source: ScriptedListing) -> (PairFetcher, Arc<ScriptedListing>) {
        let source = Arc::new(source);
        (PairFetcher::new(source.clone(), Duration::from_millis(1)), source)
    }

    #[test]
    fn system_and_empty_addresses_are_invalid() {
        let mut p = pair("11111111111111111111111111111111", "SYS");
        assert_eq!(check_pair(&p), Err(Rejection::SystemAddress));
        p.address = "   ".into();
        assert_eq!(check_pair(&p), Err(Rejection::MissingAddress));
    }

    #[test]
    fn validity_needs_one_identifier() {
        let mut p = pair("PairX", "X");
        p.liquidity = None;
        p.price = None;
        p.pool.base_mint.clear();
        p.pool.quote_mint.clear();
        p.market.clear();
        assert_eq!(check_pair(&p), Err(Rejection::NoIdentifiers));

        let mut market_only = p.clone();
        market_only.market = "Mkt".into();
        assert_eq!(check_pair(&market_only), Err(Rejection::NoIdentifiers));
        market_only.pool.quote_mint = "So11".into();
        assert!(check_pair(&market_only).is_ok());

        let mut priced = p.clone();
        priced.price = Some(0.01);
        assert!(check_pair(&priced).is_ok());

        let mut liquid = p.clone();
        liquid.liquidity = Some(0.0);
        assert!(check_pair(&liquid).is_err());
        liquid.liquidity = Some(1.0);
        assert!(check_pair(&liquid).is_ok());

        let mut mints = p;
        mints.pool.base_mint = "A".into();
        mints.pool.quote_mint = "B".into();
        assert!(check_pair(&mints).is_ok());
    }

    #[test]
    fn filter_is_idempotent_and_keeps_order() {
        let input = vec![
            pair("A", "A"),
            pair("11111111111111111111111111111111", "SYS"),
            pair("", "EMPTY"),
            pair("B", "B"),
        ];
        let (once, dropped) = filter_valid(input);
        assert_eq!(dropped, 2);
        let (twice, dropped_again) = filter_valid(once.clone());
        assert_eq!(dropped_again, 0);
        assert_eq!(once, twice);
        let addrs: Vec<_> = twice.iter().map(|p| p.address.as_str()).collect();
        assert_eq!(addrs, ["A", "B"]);
    }

    #[tokio::test]
    async fn retries_transient_failures_then_succeeds() {
        let (f, src) = fetcher(ScriptedListing::new(vec![
            Err(FetchError::Status(502)),
            Err(FetchError::Status(429)),
            Ok(vec![pair("A", "A")]),
        ]));
        let pairs = f.fetch().await.unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(src.calls(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_three_attempts_wrapping_last_error() {
        let (f, src) = fetcher(ScriptedListing::new(vec![
            Err(FetchError::Status(500)),
            Err(FetchError::Status(502)),
            Err(FetchError::Status(503)),
            Ok(vec![pair("A", "A")]),
        ]));
        match f.fetch().await {
            Err(FetchError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, FetchError::Status(503)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(src.calls(), 3);
    }

    /// Fails every call and records when each one arrived.
    #[derive(Default)]
    struct Unreachable {
        at: std::sync::Mutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl ListingSource for Unreachable {
        async fn list_pairs(&self) -> Result<Vec<Pair>, FetchError> {
            self.at.lock().unwrap().push(tokio::time::Instant::now());
            Err(FetchError::Status(503))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_linearly_with_attempt() {
        let base = Duration::from_secs(10);
        let source = Arc::new(Unreachable::default());
        let f = PairFetcher::new(source.clone(), base);

        let start = tokio::time::Instant::now();
        assert!(f.fetch().await.is_err());
        assert!(start.elapsed() >= base * 3);

        let at = source.at.lock().unwrap().clone();
        assert_eq!(at.len(), MAX_ATTEMPTS);
        let gaps: Vec<_> = at.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps[0] >= base && gaps[0] < base * 2);
        assert!(gaps[1] >= base * 2 && gaps[1] < base * 3);
    }

    #[tokio::test]
    async fn decode_failure_is_not_retried() {
        let bad = serde_json::from_str::<Vec<u8>>("nope").unwrap_err();
        let (f, src) = fetcher(ScriptedListing::new(vec![
            Err(FetchError::Decode(bad)),
            Ok(vec![pair("A", "A")]),
        ]));
        assert!(matches!(f.fetch().await, Err(FetchError::Decode(_))));
        assert_eq!(src.calls(), 1);
    }

    #[tokio::test]
    async fn nothing_valid_is_a_data_quality_error() {
        let (f, _) = fetcher(ScriptedListing::new(vec![Ok(vec![
            pair("11111111111111111111111111111111", "SYS"),
            pair("", "EMPTY"),
        ])]));
        let err = f.fetch().await.unwrap_err();
        assert!(err.is_data_quality());
        assert!(matches!(err, FetchError::NoValidPairs { total: 2 }));
    }
}
