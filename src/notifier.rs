use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::warn;

use crate::domain::{BuyAttempt, BuyOutcome};

/// Best-effort alerts to a Slack webhook and/or a Telegram chat.
#[derive(Clone)]
pub struct Notifier {
    slack_webhook_url: Option<String>,
    telegram: Option<(String, String)>,
    http: Client,
}

#[derive(Serialize)]
struct SlackPayload<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct TelegramPayload<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl Notifier {
    pub fn new(
        slack_webhook_url: Option<String>,
        telegram_bot_token: Option<String>,
        telegram_chat_id: Option<String>,
    ) -> Self {
        let telegram = telegram_bot_token.zip(telegram_chat_id);
        Self {
            slack_webhook_url,
            telegram,
            http: Client::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, None, None)
    }

    pub fn is_enabled(&self) -> bool {
        self.slack_webhook_url.is_some() || self.telegram.is_some()
    }

    pub async fn alert(&self, text: &str) -> Result<()> {
        if let Some(url) = self.slack_webhook_url.as_deref() {
            let resp = self.http.post(url).json(&SlackPayload { text }).send().await?;
            if !resp.status().is_success() {
                return Err(anyhow!("slack webhook failed: {}", resp.status()));
            }
        }
        if let Some((token, chat_id)) = &self.telegram {
            let url = format!("https://api.telegram.org/bot{token}/sendMessage");
            let resp = self
                .http
                .post(url)
                .json(&TelegramPayload { chat_id, text })
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(anyhow!("telegram sendMessage failed: {}", resp.status()));
            }
        }
        Ok(())
    }

    /// Failures are logged and swallowed.
    pub async fn buy_outcome(&self, attempt: &BuyAttempt) {
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = self.alert(&buy_message(attempt)).await {
            warn!(error = %e, address = %attempt.pair_address, "notifier.failed");
        }
    }
}

pub fn buy_message(a: &BuyAttempt) -> String {
    match &a.outcome {
        BuyOutcome::Bought { signature } => format!(
            "Bought {} ({}) for {} SOL: {}",
            a.symbol, a.pair_address, a.amount_sol, signature
        ),
        BuyOutcome::Failed { reason } => format!(
            "Buy failed for {} ({}): {}",
            a.symbol, a.pair_address, reason
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_pair_and_outcome() {
        let mut a = BuyAttempt {
            wallet: "W".into(),
            pair_address: "P".into(),
            symbol: "TOK".into(),
            amount_sol: 0.1,
            outcome: BuyOutcome::Bought {
                signature: "DRY_RUN".into(),
            },
        };
        assert_eq!(buy_message(&a), "Bought TOK (P) for 0.1 SOL: DRY_RUN");
        a.outcome = BuyOutcome::Failed {
            reason: "simulation failed: x".into(),
        };
        assert_eq!(buy_message(&a), "Buy failed for TOK (P): simulation failed: x");
    }

    #[tokio::test]
    async fn unconfigured_notifier_is_a_no_op() {
        let n = Notifier::disabled();
        assert!(!n.is_enabled());
        n.alert("hello").await.unwrap();
    }
}
