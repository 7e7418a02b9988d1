use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::SocialProvider;
use crate::domain::{Pair, SocialSignals};
use crate::error::ProviderError;

const PROVIDER: &str = "dexscreener";

/// Social presence: links come from DexScreener token info, audience sizes
/// from Twitter/Telegram when credentials are configured, and existence of
/// website/repository/whitepaper from HEAD probes. Individual probe failures
/// count as "absent"; only the link lookup itself can fail the check.
#[derive(Clone)]
pub struct SocialClient {
    dexscreener_url: String,
    twitter_bearer: Option<String>,
    telegram_bot_token: Option<String>,
    http: Client,
    timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SocialLinks {
    pub website: Option<String>,
    pub twitter: Option<String>,
    pub telegram: Option<String>,
    pub repository: Option<String>,
}

impl SocialClient {
    pub fn new(
        dexscreener_url: String,
        twitter_bearer: Option<String>,
        telegram_bot_token: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            dexscreener_url: dexscreener_url.trim_end_matches('/').to_string(),
            twitter_bearer,
            telegram_bot_token,
            http: Client::new(),
            timeout,
        }
    }

    async fn links(&self, mint: &str) -> Result<SocialLinks, ProviderError> {
        let url = format!("{}/latest/dex/tokens/{}", self.dexscreener_url, mint);
        let resp = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ProviderError::http(PROVIDER))?;
        if !resp.status().is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: resp.status().as_u16(),
            });
        }
        let body: TokenPairsResponse = resp.json().await.map_err(ProviderError::http(PROVIDER))?;
        Ok(links_from(&body))
    }

    async fn exists(&self, url: &str) -> bool {
        match self.http.head(url).timeout(self.timeout).send().await {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                debug!(url, error = %e, "social.probe_failed");
                false
            }
        }
    }

    async fn twitter_followers(&self, handle: &str) -> u64 {
        let Some(token) = self.twitter_bearer.as_deref() else {
            return 0;
        };
        let url = format!("https://api.twitter.com/2/users/by/username/{handle}");
        let resp = self
            .http
            .get(url)
            .query(&[("user.fields", "public_metrics")])
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await;
        match resp {
            Ok(r) if r.status().is_success() => r
                .json::<TwitterUser>()
                .await
                .map(|u| u.data.public_metrics.followers_count)
                .unwrap_or_default(),
            _ => 0,
        }
    }

    async fn telegram_members(&self, handle: &str) -> u64 {
        let Some(token) = self.telegram_bot_token.as_deref() else {
            return 0;
        };
        let url = format!("https://api.telegram.org/bot{token}/getChatMemberCount");
        let chat = format!("@{handle}");
        let resp = self
            .http
            .get(url)
            .query(&[("chat_id", chat.as_str())])
            .timeout(self.timeout)
            .send()
            .await;
        match resp {
            Ok(r) => match r.json::<TelegramCount>().await {
                Ok(c) if c.ok => c.result,
                _ => 0,
            },
            Err(_) => 0,
        }
    }
}

#[async_trait]
impl SocialProvider for SocialClient {
    async fn presence(&self, pair: &Pair) -> Result<SocialSignals, ProviderError> {
        let links = self.links(pair.token_mint()).await?;
        let mut s = SocialSignals::default();

        if let Some(h) = links.twitter.as_deref().and_then(handle) {
            s.twitter_followers = self.twitter_followers(h).await;
        }
        if let Some(h) = links.telegram.as_deref().and_then(handle) {
            s.telegram_members = self.telegram_members(h).await;
        }
        if let Some(site) = links.website.as_deref() {
            s.website = self.exists(site).await;
            let base = site.trim_end_matches('/');
            for path in ["whitepaper.pdf", "docs/whitepaper.pdf"] {
                if self.exists(&format!("{base}/{path}")).await {
                    s.whitepaper = true;
                    break;
                }
            }
        }
        if let Some(repo) = links.repository.as_deref() {
            s.repository = self.exists(repo).await;
        }

        debug!(mint = pair.token_mint(), ?links, ?s, "social.presence");
        Ok(s)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TokenPairsResponse {
    pairs: Option<Vec<DexPair>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DexPair {
    info: Option<DexInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DexInfo {
    websites: Vec<DexLink>,
    socials: Vec<DexLink>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DexLink {
    #[serde(rename = "type")]
    kind: Option<String>,
    label: Option<String>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct TwitterUser {
    data: TwitterData,
}

#[derive(Debug, Deserialize)]
struct TwitterData {
    public_metrics: TwitterMetrics,
}

#[derive(Debug, Deserialize)]
struct TwitterMetrics {
    followers_count: u64,
}

#[derive(Debug, Deserialize)]
struct TelegramCount {
    ok: bool,
    #[serde(default)]
    result: u64,
}

fn is_repo(url: &str) -> bool {
    url.contains("github.com") || url.contains("gitlab.com")
}

/// First link of each kind across all pairs of the token.
fn links_from(body: &TokenPairsResponse) -> SocialLinks {
    let mut out = SocialLinks::default();
    let infos = body
        .pairs
        .iter()
        .flatten()
        .filter_map(|p| p.info.as_ref());

    for info in infos {
        for w in &info.websites {
            if w.url.is_empty() {
                continue;
            }
            let is_docs = w.label.as_deref().is_some_and(|l| l.eq_ignore_ascii_case("github"));
            if is_repo(&w.url) || is_docs {
                out.repository.get_or_insert_with(|| w.url.clone());
            } else {
                out.website.get_or_insert_with(|| w.url.clone());
            }
        }
        for s in &info.socials {
            let slot = match s.kind.as_deref().map(str::to_ascii_lowercase).as_deref() {
                Some("twitter") | Some("x") => &mut out.twitter,
                Some("telegram") => &mut out.telegram,
                Some("github") => &mut out.repository,
                _ if is_repo(&s.url) => &mut out.repository,
                _ => continue,
            };
            if !s.url.is_empty() {
                slot.get_or_insert_with(|| s.url.clone());
            }
        }
    }
    out
}

/// Last path segment of a profile URL, e.g. `https://t.me/foo` → `foo`.
fn handle(url: &str) -> Option<&str> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(|h| h.trim_start_matches('@'))
        .filter(|h| !h.is_empty() && !h.contains(':'))
}
