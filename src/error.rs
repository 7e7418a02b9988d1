use solana_client::client_error::ClientError;
use thiserror::Error;

/// Failure of one listing fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("listing source returned status {0}")]
    Status(u16),
    #[error("malformed listing payload: {0}")]
    Decode(#[from] serde_json::Error),
    /// The source answered but nothing survived the validity filter.
    #[error("no valid pairs after filtering {total} reported pairs")]
    NoValidPairs { total: usize },
    #[error("giving up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport(_) | FetchError::Status(_))
    }

    /// "Provider returned nothing usable" as opposed to "provider down".
    pub fn is_data_quality(&self) -> bool {
        matches!(self, FetchError::NoValidPairs { .. })
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider}: transport: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider}: status {status}")]
    Status { provider: &'static str, status: u16 },
    #[error("{provider}: {message}")]
    Api {
        provider: &'static str,
        message: String,
    },
    #[error("{check} check failed: {source}")]
    SubCheck {
        check: &'static str,
        #[source]
        source: Box<ProviderError>,
    },
}

impl ProviderError {
    /// Body decode failures become `Api`; everything else is transport.
    pub fn http(provider: &'static str) -> impl FnOnce(reqwest::Error) -> ProviderError {
        move |source| {
            if source.is_decode() {
                ProviderError::api(provider, format!("undecodable response: {source}"))
            } else {
                ProviderError::Http { provider, source }
            }
        }
    }

    pub fn api(provider: &'static str, message: impl Into<String>) -> Self {
        ProviderError::Api {
            provider,
            message: message.into(),
        }
    }

    pub fn in_check(check: &'static str) -> impl FnOnce(ProviderError) -> ProviderError {
        move |e| ProviderError::SubCheck {
            check,
            source: Box::new(e),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("insufficient balance: have {have_sol:.4} SOL, need {need_sol:.4} SOL")]
    InsufficientBalance { have_sol: f64, need_sol: f64 },
    #[error("balance lookup failed: {0}")]
    Balance(#[source] Box<ClientError>),
    #[error("invalid address {0}")]
    InvalidAddress(String),
    #[error("pool accounts unavailable: {0}")]
    PoolResolution(String),
    #[error("pair {0} has no WSOL side")]
    NotSolPaired(String),
    #[error("no reference price for {0}")]
    NoReferencePrice(String),
    #[error("blockhash fetch failed: {0}")]
    Blockhash(#[source] Box<ClientError>),
    #[error("simulation failed: {0}")]
    Simulation(String),
    #[error("submission failed: {0}")]
    Submission(#[source] Box<ClientError>),
}

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("connect: {0}")]
    Connect(String),
    #[error("subscribe: {0}")]
    Subscribe(String),
    #[error("stream closed after {events} events")]
    Closed { events: u64 },
    #[error("invalid address {0}")]
    InvalidAddress(String),
}
