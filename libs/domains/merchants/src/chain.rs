//! Chain registration capability.
//!
//! The API calls it best-effort with a timeout right after a registration
//! commits; the onboarding worker calls it authoritatively for every
//! `merchant.created` event. Implementations must be idempotent by merchant
//! id, which is also sent as the idempotency key.

use async_trait::async_trait;
use core_config::{ConfigError, FromEnv, env_or_default, env_parse_or};
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::MerchantId;

pub const STUB_FAILURE: &str = "chain registration not implemented";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Worth retrying: timeouts, 5xx, transport failures.
    #[error("transient chain error: {0}")]
    Transient(String),

    #[error("permanent chain error: {0}")]
    Permanent(String),

    #[error("chain rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
    },
}

impl ChainError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ChainError::Permanent(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub merchant_id: MerchantId,
    pub wallet_address: String,
}

impl RegistrationRequest {
    pub fn new(merchant_id: MerchantId, wallet_address: impl Into<String>) -> Self {
        Self {
            merchant_id,
            wallet_address: wallet_address.into(),
        }
    }

    pub fn idempotency_key(&self) -> String {
        self.merchant_id.to_hex()
    }
}

/// Registers a merchant on chain and returns the transaction id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainRegistrar: Send + Sync {
    async fn register(&self, request: &RegistrationRequest) -> Result<String, ChainError>;

    /// Name for logs.
    fn name(&self) -> &'static str;
}

/// Placeholder used until a real gateway is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubRegistrar;

#[async_trait]
impl ChainRegistrar for StubRegistrar {
    async fn register(&self, _request: &RegistrationRequest) -> Result<String, ChainError> {
        Err(ChainError::Permanent(STUB_FAILURE.to_string()))
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Deterministic test double. Counts every call, so duplicate submissions
/// are observable.
#[derive(Debug, Default)]
pub struct InMemoryRegistrar {
    calls: AtomicUsize,
    submitted: Mutex<Vec<MerchantId>>,
    failure: Mutex<Option<ChainError>>,
    delay: Option<Duration>,
}

impl InMemoryRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_with(error: ChainError) -> Self {
        Self {
            failure: Mutex::new(Some(error)),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `None` makes subsequent calls succeed.
    pub async fn set_failure(&self, error: Option<ChainError>) {
        *self.failure.lock().await = error;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn submissions_for(&self, merchant_id: &MerchantId) -> usize {
        self.submitted
            .lock()
            .await
            .iter()
            .filter(|id| *id == merchant_id)
            .count()
    }

    /// The txid this double assigns to a merchant.
    pub fn txid_for(merchant_id: &MerchantId) -> String {
        const_hex::encode(Sha256::digest(merchant_id.as_bytes()))
    }
}

#[async_trait]
impl ChainRegistrar for InMemoryRegistrar {
    async fn register(&self, request: &RegistrationRequest) -> Result<String, ChainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().await.push(request.merchant_id);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failure.lock().await.clone() {
            return Err(error);
        }
        Ok(Self::txid_for(&request.merchant_id))
    }

    fn name(&self) -> &'static str {
        "in-memory"
    }
}

#[derive(Debug, Serialize)]
struct RegisterBody<'a> {
    merchant_id: String,
    wallet_address: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterReply {
    txid: String,
}

/// Client for an HTTP registration gateway.
#[derive(Debug, Clone)]
pub struct HttpRegistrar {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRegistrar {
    pub fn new(config: &ChainConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

fn retry_after_ms(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}

#[async_trait]
impl ChainRegistrar for HttpRegistrar {
    async fn register(&self, request: &RegistrationRequest) -> Result<String, ChainError> {
        let mut call = self
            .client
            .post(format!("{}/merchants/register", self.base_url))
            .header("Idempotency-Key", request.idempotency_key())
            .json(&RegisterBody {
                merchant_id: request.merchant_id.to_hex(),
                wallet_address: &request.wallet_address,
            });
        if let Some(key) = &self.api_key {
            call = call.header("TRON-PRO-API-KEY", key);
        }

        debug!(merchant_id = %request.merchant_id, "Submitting chain registration");

        let response = call
            .send()
            .await
            .map_err(|e| ChainError::Transient(e.to_string()))?;
        let status = response.status();

        if status.is_success() {
            let reply: RegisterReply = response
                .json()
                .await
                .map_err(|e| ChainError::Permanent(format!("malformed gateway reply: {e}")))?;
            return Ok(reply.txid);
        }

        let retry_after = retry_after_ms(&response);
        let body = response.text().await.unwrap_or_default();
        let message = format!("gateway returned {status}: {body}");
        warn!(merchant_id = %request.merchant_id, %status, "Chain registration rejected");

        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => ChainError::RateLimited {
                message,
                retry_after_ms: retry_after,
            },
            s if s.is_server_error() => ChainError::Transient(message),
            _ => ChainError::Permanent(message),
        })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrarKind {
    Stub,
    Http,
}

#[derive(Clone)]
pub struct ChainConfig {
    pub kind: RegistrarKind,
    pub api_base: String,
    pub api_key: Option<String>,
    /// Bound on a single call, including the synchronous API attempt.
    pub timeout: Duration,
}

impl std::fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainConfig")
            .field("kind", &self.kind)
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            kind: RegistrarKind::Stub,
            api_base: "https://api.trongrid.io".to_string(),
            api_key: None,
            timeout: Duration::from_millis(5000),
        }
    }
}

impl FromEnv for ChainConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let kind = match env_or_default("CHAIN_REGISTRAR", "stub")
            .to_lowercase()
            .as_str()
        {
            "stub" => RegistrarKind::Stub,
            "http" => RegistrarKind::Http,
            other => {
                return Err(ConfigError::ParseError {
                    key: "CHAIN_REGISTRAR".to_string(),
                    details: format!("expected stub or http, got {other}"),
                });
            }
        };

        Ok(Self {
            kind,
            api_base: env_or_default("TRON_API_BASE", "https://api.trongrid.io"),
            api_key: std::env::var("TRON_API_KEY").ok().filter(|k| !k.is_empty()),
            timeout: Duration::from_millis(env_parse_or("CHAIN_TIMEOUT_MS", 5000u64)?),
        })
    }
}

/// Pick the registrar named by the configuration.
pub fn build_registrar(config: &ChainConfig) -> Result<Arc<dyn ChainRegistrar>, reqwest::Error> {
    Ok(match config.kind {
        RegistrarKind::Stub => Arc::new(StubRegistrar),
        RegistrarKind::Http => Arc::new(HttpRegistrar::new(config)?),
    })
}
