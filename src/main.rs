use anyhow::{Context, Result};
use chrono::Utc;
use solana_sdk::signature::Signer;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use pair_sentinel::config::Config;
use pair_sentinel::dispatch::DispatchQueue;
use pair_sentinel::engine::{load_keypair, Engine};
use pair_sentinel::execution::ExecutionStage;
use pair_sentinel::fetcher::PairFetcher;
use pair_sentinel::freshness::FreshnessTracker;
use pair_sentinel::gate::SafetyGate;
use pair_sentinel::monitoring;
use pair_sentinel::notifier::Notifier;
use pair_sentinel::providers::goplus::GoPlusClient;
use pair_sentinel::providers::social::SocialClient;
use pair_sentinel::providers::solscan::SolscanClient;
use pair_sentinel::providers::CompositeSafety;
use pair_sentinel::raydium::RaydiumClient;
use pair_sentinel::scanner::Scanner;
use pair_sentinel::watcher::PubsubActivity;

#[tokio::main]
async fn main() -> Result<()> {
    // Load local .env if present (no-op in prod/systemd envs)
    let _ = dotenvy::dotenv();

    monitoring::init_tracing();

    let cfg = Config::load().context("loading configuration")?;
    let wallet = Arc::new(load_keypair(cfg.sol_keypair_path.as_deref())?);
    let settings = Arc::new(cfg.settings());
    info!(
        dry_run = settings.dry_run,
        rpc_http = %cfg.rpc_http_url,
        raydium = %cfg.raydium_api_url,
        wallet = %wallet.pubkey(),
        poll_s = settings.poll_interval.as_secs(),
        buy_amount_sol = settings.buy_amount_sol,
        slippage_bps = settings.slippage_bps,
        gate = ?settings.gate,
        "boot"
    );

    let provider_timeout = Duration::from_secs(cfg.provider_timeout_secs);
    let raydium = RaydiumClient::new(
        cfg.raydium_api_url.clone(),
        Duration::from_secs(cfg.listing_timeout_secs),
        provider_timeout,
    );
    let solscan = Arc::new(SolscanClient::new(
        cfg.solscan_api_url.clone(),
        cfg.solscan_api_key.clone(),
        provider_timeout,
    ));
    let goplus = Arc::new(GoPlusClient::new(cfg.goplus_api_url.clone(), provider_timeout));
    let safety = CompositeSafety {
        lock: goplus.clone(),
        honeypot: goplus,
        holders: solscan.clone(),
        social: Arc::new(SocialClient::new(
            cfg.dexscreener_api_url.clone(),
            cfg.twitter_bearer_token.clone(),
            cfg.telegram_bot_token.clone(),
            provider_timeout,
        )),
    };

    let (tx, rx) = DispatchQueue::new(settings.queue_capacity);
    let lookback = chrono::Duration::from_std(settings.initial_lookback).context("initial lookback out of range")?;
    let scanner = Scanner::new(
        PairFetcher::new(Arc::new(raydium.clone()), settings.fetch_retry_base),
        FreshnessTracker::new(settings.seen_capacity, Utc::now() - lookback),
        SafetyGate::new(solscan, Arc::new(safety), settings.gate.clone()),
        tx,
    )
    .with_heartbeat(&cfg.heartbeat_log_path);

    let stage = ExecutionStage::new(
        Arc::new(Engine::new(cfg.rpc_http_url.clone(), raydium, settings.slippage_bps, settings.dry_run)),
        Arc::new(PubsubActivity::new(cfg.rpc_wss_url.clone())),
        wallet,
        settings.buy_amount_sol,
        settings.watch_activity,
    )
    .with_notifier(Notifier::new(
        cfg.slack_webhook_url.clone(),
        cfg.telegram_bot_token.clone(),
        cfg.telegram_chat_id.clone(),
    ));

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone())?;

    let executor = tokio::spawn(stage.run(rx, cancel.clone()));
    let discovery = scanner.run(settings.poll_interval, cancel.clone()).await;
    if let Err(e) = &discovery {
        error!(error = %e, "scanner.failed");
    }
    // Scanner is done either way; let the consumer drain and stop.
    cancel.cancel();
    let summary = executor.await.context("execution stage panicked")?;
    info!(
        bought = summary.bought,
        buy_failed = summary.buy_failed,
        subscriptions = summary.subscriptions_ended + summary.subscriptions_failed,
        "shutdown"
    );
    discovery
}

/// SIGINT/SIGTERM cancel the shared token.
fn spawn_shutdown_listener(cancel: CancellationToken) -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
                _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            }
            cancel.cancel();
        });
    }
    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("received SIGINT, shutting down");
            cancel.cancel();
        });
    }
    Ok(())
}
