//! Decides which listed pairs are new since the previous cycle.

use chrono::{DateTime, Utc};
use lru::LruCache;
use std::num::NonZeroUsize;
use tracing::{debug, info};

use crate::domain::Pair;

/// Address → last-observed time. Least recently observed entries are evicted
/// once capacity is reached.
pub struct SeenState {
    entries: LruCache<String, DateTime<Utc>>,
}

impl SeenState {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(cap),
        }
    }

    pub fn get(&mut self, address: &str) -> Option<DateTime<Utc>> {
        self.entries.get(address).copied()
    }

    pub fn set(&mut self, address: &str, at: DateTime<Utc>) {
        self.entries.put(address.to_string(), at);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A pair the tracker considers new, with the timestamp that made it so.
#[derive(Debug, Clone)]
pub struct NewPair {
    pub pair: Pair,
    pub reported_at: DateTime<Utc>,
}

/// Parse a reported timestamp; `None` for missing, `-`, or garbage.
pub fn parse_reported(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() || raw == "-" {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub struct FreshnessTracker {
    seen: SeenState,
    last_cycle: DateTime<Utc>,
}

impl FreshnessTracker {
    pub fn new(capacity: usize, last_cycle: DateTime<Utc>) -> Self {
        Self {
            seen: SeenState::new(capacity),
            last_cycle,
        }
    }

    pub fn last_cycle(&self) -> DateTime<Utc> {
        self.last_cycle
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    /// Emit pairs new since the last cycle, in input order, then move the
    /// cycle boundary to `cycle_start`.
    pub fn update(&mut self, pairs: &[Pair], cycle_start: DateTime<Utc>) -> Vec<NewPair> {
        let mut fresh = Vec::new();
        let mut skipped = 0usize;

        for pair in pairs {
            let address = pair.address.as_str();
            let last_seen = self.seen.get(address);

            let reported_at = match parse_reported(pair.timestamp.as_deref()) {
                Some(t) => t,
                None if last_seen.is_some() => {
                    skipped += 1;
                    continue;
                }
                None => cycle_start,
            };

            let unseen_or_newer = match last_seen {
                None => true,
                Some(prev) => reported_at > prev,
            };
            let is_new = unseen_or_newer && reported_at > self.last_cycle;

            // Keep the later of the two so a future-dated listing cannot re-emit.
            self.seen.set(address, cycle_start.max(reported_at));

            if is_new {
                debug!(address, symbol = %pair.symbol, %reported_at, "freshness.new");
                fresh.push(NewPair {
                    pair: pair.clone(),
                    reported_at,
                });
            } else if last_seen.is_none() {
                debug!(address, %reported_at, last_cycle = %self.last_cycle, "freshness.predates_window");
            }
        }

        info!(
            input = pairs.len(),
            new = fresh.len(),
            skipped_untimed = skipped,
            seen = self.seen.len(),
            last_cycle = %self.last_cycle,
            "freshness.cycle"
        );
        self.last_cycle = cycle_start;
        fresh
    }
}
