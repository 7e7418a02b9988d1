use async_trait::async_trait;
use futures_util::StreamExt;
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::RpcAccountInfoConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::domain::Pair;
use crate::error::SubscriptionError;

/// Post-buy activity on a pair's AMM account.
#[async_trait]
pub trait ActivityFeed: Send + Sync {
    /// Runs until cancelled or the stream ends. Returns the number of
    /// account updates observed.
    async fn watch(&self, pair: &Pair, cancel: CancellationToken) -> Result<u64, SubscriptionError>;
}

/// How one subscription task ended, as collected by the consumer loop.
#[derive(Debug)]
pub struct SubscriptionReport {
    pub address: String,
    pub result: Result<u64, SubscriptionError>,
}

/// `accountSubscribe` over the RPC websocket, one connection per watch.
pub struct PubsubActivity {
    ws_url: String,
}

impl PubsubActivity {
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }
}

#[async_trait]
impl ActivityFeed for PubsubActivity {
    async fn watch(&self, pair: &Pair, cancel: CancellationToken) -> Result<u64, SubscriptionError> {
        let amm = Pubkey::from_str(pair.amm_id())
            .map_err(|_| SubscriptionError::InvalidAddress(pair.amm_id().to_string()))?;

        let client = PubsubClient::new(&self.ws_url)
            .await
            .map_err(|e| SubscriptionError::Connect(e.to_string()))?;
        let (mut stream, unsubscribe) = client
            .account_subscribe(
                &amm,
                Some(RpcAccountInfoConfig {
                    encoding: Some(UiAccountEncoding::Base64),
                    commitment: Some(CommitmentConfig::confirmed()),
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| SubscriptionError::Subscribe(e.to_string()))?;
        info!(address = %pair.address, amm = %amm, "watcher.subscribed");

        let mut events = 0u64;
        let closed = loop {
            tokio::select! {
                _ = cancel.cancelled() => break false,
                next = stream.next() => match next {
                    Some(update) => {
                        events += 1;
                        debug!(
                            address = %pair.address,
                            slot = update.context.slot,
                            lamports = update.value.lamports,
                            events,
                            "watcher.activity"
                        );
                    }
                    None => break true,
                },
            }
        };

        drop(stream);
        unsubscribe().await;
        if closed {
            return Err(SubscriptionError::Closed { events });
        }
        Ok(events)
    }
}
