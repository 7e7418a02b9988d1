use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::{HolderProvider, HolderStats, MetricsProvider};
use crate::domain::{Pair, TokenMetrics};
use crate::error::ProviderError;

const PROVIDER: &str = "solscan";

/// Token market data and holder distribution from the Solscan public API.
#[derive(Clone)]
pub struct SolscanClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
    timeout: Duration,
}

impl SolscanClient {
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http: Client::new(),
            timeout,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ProviderError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut req = self
            .http
            .get(url)
            .query(query)
            .header(ACCEPT, "application/json")
            .timeout(self.timeout);
        if let Some(key) = self.api_key.as_deref() {
            req = req.header("token", key);
        }
        let resp = req.send().await.map_err(ProviderError::http(PROVIDER))?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: resp.status().as_u16(),
            });
        }
        resp.json().await.map_err(ProviderError::http(PROVIDER))
    }
}

#[derive(Debug, Deserialize)]
struct MetaResponse {
    #[serde(default)]
    data: MetaData,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetaData {
    #[serde(rename = "marketCap")]
    market_cap: Option<serde_json::Value>,
    #[serde(rename = "volume24h")]
    volume_24h: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct HoldersResponse {
    data: HoldersData,
}

#[derive(Debug, Deserialize)]
struct HoldersData {
    #[serde(rename = "total", default)]
    total: u64,
    #[serde(default)]
    items: Vec<HolderItem>,
}

#[derive(Debug, Deserialize)]
struct HolderItem {
    #[serde(default)]
    share: Option<serde_json::Value>,
}

/// Solscan serves numbers both as JSON numbers and as decimal strings.
fn number(v: Option<&serde_json::Value>) -> f64 {
    match v {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or_default(),
        Some(serde_json::Value::String(s)) => s.trim().trim_end_matches('%').parse().unwrap_or_default(),
        _ => 0.0,
    }
}

#[async_trait]
impl MetricsProvider for SolscanClient {
    async fn metrics(&self, pair: &Pair) -> Result<TokenMetrics, ProviderError> {
        let meta: MetaResponse = self
            .get("token/meta", &[("tokenAddress", pair.token_mint())])
            .await?;
        Ok(TokenMetrics {
            // The listing's liquidity is the pool's own figure; Solscan has none.
            liquidity: pair.liquidity.unwrap_or_default(),
            volume_24h: number(meta.data.volume_24h.as_ref()),
            market_cap: number(meta.data.market_cap.as_ref()),
        })
    }
}

#[async_trait]
impl HolderProvider for SolscanClient {
    async fn holders(&self, mint: &str) -> Result<HolderStats, ProviderError> {
        let resp: HoldersResponse = self
            .get("token/holders", &[("tokenAddress", mint), ("limit", "100")])
            .await?;
        Ok(holder_stats(&resp.data))
    }
}

fn holder_stats(data: &HoldersData) -> HolderStats {
    // Share is reported in percent.
    let top = data
        .items
        .first()
        .map(|h| number(h.share.as_ref()) / 100.0)
        .unwrap_or_default();
    HolderStats {
        top_holder_share: top.clamp(0.0, 1.0),
        holder_count: data.total,
    }
}
