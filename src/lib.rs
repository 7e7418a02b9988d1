//! pair_sentinel: polls a DEX listing for new pairs, gates them on liquidity,
//! lock, holder and social signals, and buys the ones that pass.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod engine;
pub mod error;
pub mod execution;
pub mod fetcher;
pub mod freshness;
pub mod gate;
pub mod monitoring;
pub mod notifier;
pub mod providers;
pub mod raydium;
pub mod scanner;
pub mod watcher;

#[cfg(test)]
mod test_http;

pub use config::{Config, Settings};
pub use domain::{GateDecision, Pair};
