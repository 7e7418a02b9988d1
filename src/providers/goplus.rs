use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use lru::LruCache;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::{debug, warn};

use super::{HoneypotProvider, LockProvider};
use crate::domain::{HoneypotIndicators, LockStatus};
use crate::error::ProviderError;

const PROVIDER: &str = "goplus";
const ATTEMPTS: usize = 3;
const CACHE_ENTRIES: usize = 256;
const CACHE_TTL: Duration = Duration::from_secs(60);

type SecurityCache = LruCache<String, (Instant, TokenSecurity)>;

/// GoPlus token-security lookups: liquidity lock and honeypot indicators.
///
/// Both come from the same endpoint, so responses are cached per mint for a
/// short while and one snapshot costs one request.
#[derive(Clone)]
pub struct GoPlusClient {
    base_url: String,
    http: Client,
    timeout: Duration,
    retry_delay: Duration,
    cache: Arc<Mutex<SecurityCache>>,
}

impl GoPlusClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
            timeout,
            retry_delay: Duration::from_secs(2),
            cache: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(CACHE_ENTRIES).unwrap_or(NonZeroUsize::MIN),
            ))),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn fetch_once(&self, mint: &str) -> Result<TokenSecurity, ProviderError> {
        let url = format!("{}/api/v1/token_security/solana", self.base_url);
        let resp = self
            .http
            .get(url)
            .query(&[("contract_addresses", mint)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ProviderError::http(PROVIDER))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
            });
        }
        let body = resp.bytes().await.map_err(ProviderError::http(PROVIDER))?;
        decode_security(&body, mint)
    }

    fn cached(&self, mint: &str) -> Option<TokenSecurity> {
        let mut cache = self.cache.lock().ok()?;
        let fresh = cache
            .get(mint)
            .and_then(|(at, sec)| (at.elapsed() < CACHE_TTL).then(|| sec.clone()));
        if fresh.is_none() {
            cache.pop(mint);
        }
        fresh
    }

    /// Retries rate limiting and transport failures a bounded number of times.
    async fn security(&self, mint: &str) -> Result<TokenSecurity, ProviderError> {
        if let Some(sec) = self.cached(mint) {
            debug!(mint, "goplus.cache_hit");
            return Ok(sec);
        }
        let strategy = FixedInterval::new(self.retry_delay).take(ATTEMPTS - 1);
        let sec = RetryIf::spawn(
            strategy,
            || self.fetch_once(mint),
            |e: &ProviderError| {
                let retry = is_transient(e);
                if retry {
                    warn!(mint, error = %e, "goplus.retry");
                }
                retry
            },
        )
        .await?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(mint.to_string(), (Instant::now(), sec.clone()));
        }
        Ok(sec)
    }
}

/// Rate limiting, server errors and transport failures. A body that does not
/// decode will not decode on the next try either.
fn is_transient(e: &ProviderError) -> bool {
    match e {
        ProviderError::Http { .. } => true,
        ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

fn decode_security(body: &[u8], mint: &str) -> Result<TokenSecurity, ProviderError> {
    let resp: SecurityResponse = serde_json::from_slice(body)
        .map_err(|e| ProviderError::api(PROVIDER, format!("undecodable response: {e}")))?;
    resp.into_token(mint)
}

#[async_trait]
impl LockProvider for GoPlusClient {
    async fn lock_status(&self, mint: &str) -> Result<LockStatus, ProviderError> {
        let sec = self.security(mint).await?;
        let info = sec.lock_info.unwrap_or_default();
        let status = lock_status(&info, Utc::now())?;
        debug!(
            mint,
            locked = status.locked,
            remaining_h = status.remaining.as_secs() / 3600,
            percentage = info.percentage.unwrap_or_default(),
            "goplus.lock"
        );
        Ok(status)
    }
}

#[async_trait]
impl HoneypotProvider for GoPlusClient {
    async fn indicators(&self, mint: &str) -> Result<HoneypotIndicators, ProviderError> {
        Ok(self.security(mint).await?.indicators())
    }
}

#[derive(Debug, Deserialize)]
struct SecurityResponse {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default, alias = "data")]
    result: HashMap<String, TokenSecurity>,
}

impl SecurityResponse {
    fn into_token(mut self, mint: &str) -> Result<TokenSecurity, ProviderError> {
        if self.code != 1 {
            return Err(ProviderError::api(PROVIDER, format!("code {}: {}", self.code, self.message)));
        }
        if let Some(t) = self.result.remove(mint) {
            return Ok(t);
        }
        if let Some(t) = self.result.remove(&mint.to_lowercase()) {
            return Ok(t);
        }
        if self.result.len() == 1 {
            if let Some((_, t)) = self.result.into_iter().next() {
                return Ok(t);
            }
        }
        Err(ProviderError::api(PROVIDER, format!("no security data for {mint}")))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct TokenSecurity {
    is_honeypot: Option<String>,
    is_sellable: Option<String>,
    buy_tax: Option<String>,
    sell_tax: Option<String>,
    #[serde(alias = "transfer_paused")]
    transfer_pausable: Option<String>,
    is_blacklisted: Option<String>,
    lock_info: Option<LockInfo>,
}

impl TokenSecurity {
    fn indicators(&self) -> HoneypotIndicators {
        let flag = |v: &Option<String>| v.as_deref().map(str::trim) == Some("1");
        let pct = |v: &Option<String>| v.as_deref().and_then(|s| s.trim().parse::<f64>().ok());
        HoneypotIndicators {
            flagged: flag(&self.is_honeypot),
            sellable: self.is_sellable.as_deref().map(|s| s.trim() != "0"),
            buy_tax_pct: pct(&self.buy_tax),
            sell_tax_pct: pct(&self.sell_tax),
            transfer_paused: flag(&self.transfer_pausable),
            blacklisted: flag(&self.is_blacklisted),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct LockInfo {
    is_locked: bool,
    percentage: Option<f64>,
    end_time: Option<String>,
}

fn parse_end_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(t.and_utc());
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

/// An expired lock counts as no lock.
fn lock_status(info: &LockInfo, now: DateTime<Utc>) -> Result<LockStatus, ProviderError> {
    if !info.is_locked {
        return Ok(LockStatus::unlocked());
    }
    let raw = info.end_time.as_deref().unwrap_or_default();
    let end = parse_end_time(raw)
        .ok_or_else(|| ProviderError::api(PROVIDER, format!("unparseable lock end time {raw:?}")))?;
    match (end - now).to_std() {
        Ok(remaining) if !remaining.is_zero() => Ok(LockStatus::locked_for(remaining)),
        _ => Ok(LockStatus::unlocked()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_http::serve_once;

    const BODY: &str = r#"{
        "code": 1, "message": "OK",
        "result": {"mintabc": {
            "is_sellable": "1", "buy_tax": "3", "sell_tax": "25.5",
            "transfer_pausable": "0", "is_blacklisted": "0", "is_honeypot": "0",
            "lock_info": {"is_locked": true, "percentage": 95.0, "end_time": "2030-01-01 00:00:00"}
        }}
    }"#;

    #[test]
    fn decodes_indicators_and_lock() {
        let resp: SecurityResponse = serde_json::from_str(BODY).unwrap();
        let sec = resp.into_token("mintABC").unwrap();
        let ind = sec.indicators();
        assert_eq!(ind.sellable, Some(true));
        assert_eq!(ind.sell_tax_pct, Some(25.5));
        assert!(ind.is_honeypot());

        let now = "2029-12-31T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let lock = lock_status(&sec.lock_info.unwrap(), now).unwrap();
        assert!(lock.locked);
        assert_eq!(lock.remaining, Duration::from_secs(86_400));
    }

    #[test]
    fn expired_lock_is_unlocked() {
        let info = LockInfo {
            is_locked: true,
            percentage: None,
            end_time: Some("2020-01-01 00:00:00".into()),
        };
        assert_eq!(lock_status(&info, Utc::now()).unwrap(), LockStatus::unlocked());
    }

    #[test]
    fn undecodable_body_is_not_retried() {
        let err = decode_security(b"<html>rate limited</html>", "x").unwrap_err();
        assert!(matches!(err, ProviderError::Api { .. }));
        assert!(!is_transient(&err));
        assert!(is_transient(&ProviderError::Status { provider: PROVIDER, status: 429 }));
        assert!(is_transient(&ProviderError::Status { provider: PROVIDER, status: 502 }));
        assert!(!is_transient(&ProviderError::Status { provider: PROVIDER, status: 404 }));
    }

    #[tokio::test]
    async fn lock_and_honeypot_share_one_request() {
        let (base, server) = serve_once("200 OK", None, BODY.as_bytes().to_vec()).await;
        let client = GoPlusClient::new(base, Duration::from_secs(5)).with_retry_delay(Duration::from_millis(1));

        let lock = client.lock_status("mintabc").await.unwrap();
        let ind = client.indicators("mintabc").await.unwrap();
        assert!(lock.locked);
        assert_eq!(ind.sell_tax_pct, Some(25.5));

        // The responder only ever accepts one connection.
        let head = server.await.unwrap();
        assert!(head.contains("contract_addresses=mintabc"));
    }

    #[test]
    fn api_error_code_is_reported() {
        let resp: SecurityResponse =
            serde_json::from_str(r#"{"code": 4029, "message": "too many requests"}"#).unwrap();
        let err = resp.into_token("x").unwrap_err();
        assert!(err.to_string().contains("too many requests"));
    }
}
