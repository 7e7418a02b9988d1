use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::domain::{Pair, PoolRef};
use crate::error::{FetchError, ProviderError};
use crate::fetcher::ListingSource;

#[derive(Clone)]
pub struct RaydiumClient {
    base_url: String,
    http: Client,
    listing_timeout: Duration,
    lookup_timeout: Duration,
}

impl RaydiumClient {
    pub fn new(base_url: String, listing_timeout: Duration, lookup_timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            // gzip feature: Accept-Encoding is sent and bodies are inflated transparently.
            http: Client::builder().gzip(true).build().unwrap_or_default(),
            listing_timeout,
            lookup_timeout,
        }
    }

    pub async fn pairs(&self) -> Result<Vec<Pair>, FetchError> {
        let url = format!("{}/v2/main/pairs", self.base_url);
        let resp = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, "Mozilla/5.0")
            .timeout(self.listing_timeout)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status().as_u16()));
        }
        let body = resp.bytes().await?;
        debug!(bytes = body.len(), "raydium.pairs.body");
        decode_pairs(&body)
    }

    pub async fn pool_accounts(&self, amm_id: &str) -> Result<PoolAccountsResponse, ProviderError> {
        let url = format!("{}/v2/main/pool/{}", self.base_url, amm_id);
        let resp = self
            .http
            .get(url)
            .timeout(self.lookup_timeout)
            .send()
            .await
            .map_err(ProviderError::http("raydium"))?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status {
                provider: "raydium",
                status: resp.status().as_u16(),
            });
        }
        resp.json().await.map_err(ProviderError::http("raydium"))
    }
}

#[async_trait]
impl ListingSource for RaydiumClient {
    async fn list_pairs(&self) -> Result<Vec<Pair>, FetchError> {
        self.pairs().await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolAccountsResponse {
    #[serde(rename = "baseVault")]
    pub base_vault: String,
    #[serde(rename = "quoteVault")]
    pub quote_vault: String,
    #[serde(rename = "feeAccount")]
    pub fee_account: String,
}

/// Decode a listing body into canonical pairs, preserving order.
pub fn decode_pairs(body: &[u8]) -> Result<Vec<Pair>, FetchError> {
    let raw: Vec<RawPair> = serde_json::from_slice(body)?;
    Ok(raw.into_iter().map(Pair::from).collect())
}

/// Wire shape of a listing record. Covers both the nested `pool` layout and
/// the flat `ammId`/`baseMint` layout the API has served over time. Every
/// field is optional so that a null anywhere only blanks that field.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPair {
    name: Option<String>,
    symbol: Option<String>,
    address: Option<String>,
    #[serde(rename = "ammId")]
    amm_id: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    timestamp: Option<String>,
    pool: Option<RawPool>,
    market: Option<String>,
    #[serde(rename = "lpMint")]
    lp_mint: Option<String>,
    #[serde(rename = "baseMint")]
    base_mint: Option<String>,
    #[serde(rename = "quoteMint")]
    quote_mint: Option<String>,
    #[serde(rename = "tokenAddress")]
    token_address: Option<String>,
    price: Option<f64>,
    liquidity: Option<f64>,
    volume24h: Option<f64>,
    volume_24h: Option<f64>,
    #[serde(rename = "marketCap")]
    market_cap: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPool {
    #[serde(rename = "ammId")]
    amm_id: Option<String>,
    #[serde(rename = "lpMint")]
    lp_mint: Option<String>,
    #[serde(rename = "baseMint")]
    base_mint: Option<String>,
    #[serde(rename = "quoteMint")]
    quote_mint: Option<String>,
    #[serde(rename = "baseDecimals")]
    base_decimals: Option<u8>,
    #[serde(rename = "quoteDecimals")]
    quote_decimals: Option<u8>,
}

/// First non-blank value, or empty.
fn pick(a: Option<String>, b: Option<String>) -> String {
    a.filter(|v| !v.trim().is_empty())
        .or(b.filter(|v| !v.trim().is_empty()))
        .unwrap_or_default()
}

impl From<RawPair> for Pair {
    fn from(r: RawPair) -> Self {
        let nested = r.pool.unwrap_or_default();
        let pool = PoolRef {
            amm_id: pick(nested.amm_id, r.amm_id.clone()),
            lp_mint: pick(nested.lp_mint, r.lp_mint),
            base_mint: pick(nested.base_mint, r.base_mint),
            quote_mint: pick(nested.quote_mint, r.quote_mint),
            base_decimals: nested.base_decimals.unwrap_or_default(),
            quote_decimals: nested.quote_decimals.unwrap_or_default(),
        };
        let name = r.name.unwrap_or_default();
        let symbol = match r.symbol.filter(|s| !s.is_empty()) {
            Some(s) => s,
            None => name.split('-').next().unwrap_or_default().to_string(),
        };
        Pair {
            address: pick(r.address, r.amm_id).trim().to_string(),
            name,
            symbol,
            timestamp: r.timestamp,
            pool,
            market: r.market.unwrap_or_default(),
            token_address: r.token_address.filter(|t| !t.is_empty()),
            price: r.price,
            liquidity: r.liquidity,
            volume_24h: r.volume24h.or(r.volume_24h),
            market_cap: r.market_cap,
        }
    }
}

/// Accepts a string, a unix-seconds number, or null.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map(|t| t.to_rfc3339()),
        _ => None,
    })
}
