//! Binance spot integration.
//!
//! Implements the Convert API flow (quote → accept → order status) used
//! for execution, and the public 24h ticker endpoint used as the price
//! feed.
//!
//! API docs: https://developers.binance.com/docs/convert
//! Auth: `X-MBX-APIKEY` header plus an HMAC-SHA256 `signature` over the
//! exact query string, keyed by the API secret.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use rust_decimal::prelude::*;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    AcceptedOrder, ConvertApi, ExchangeError, OrderState, OrderStatus, Quote, QuoteAmount,
    QuoteRequest,
};
use crate::config::{AppConfig, ExchangeConfig};

type HmacSha256 = Hmac<Sha256>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const CONNECTOR_NAME: &str = "binance";
const QUOTE_PATH: &str = "/sapi/v1/convert/getQuote";
const ACCEPT_PATH: &str = "/sapi/v1/convert/acceptQuote";
const ORDER_STATUS_PATH: &str = "/sapi/v1/convert/orderStatus";
const TICKER_24H_PATH: &str = "/api/v3/ticker/24hr";

// ---------------------------------------------------------------------------
// API response types (Binance JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    quote_id: String,
    ratio: String,
    #[serde(default)]
    inverse_ratio: Option<String>,
    from_amount: String,
    to_amount: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcceptResponse {
    /// Binance sends this as a string here but as a number elsewhere.
    order_id: serde_json::Value,
    order_status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderStatusResponse {
    order_id: serde_json::Value,
    order_status: String,
    #[serde(default)]
    from_asset: String,
    #[serde(default)]
    to_asset: String,
    #[serde(default)]
    from_amount: Option<String>,
    #[serde(default)]
    to_amount: Option<String>,
    #[serde(default)]
    ratio: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    msg: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// API key pair for signed endpoints.
pub struct Credentials {
    pub api_key: String,
    pub secret: SecretString,
}

/// Binance REST client.
pub struct BinanceClient {
    http: Client,
    base_url: String,
    credentials: Option<Credentials>,
    recv_window_ms: u64,
    /// Last timestamp handed out; signed requests never reuse or go back.
    last_timestamp: AtomicI64,
}

impl BinanceClient {
    /// Create a new client.
    ///
    /// `credentials` may be `None` when only the public ticker feed is
    /// needed (simulation-only mode).
    pub fn new(
        base_url: &str,
        credentials: Option<Credentials>,
        recv_window_ms: u64,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("TRIARB/0.1.0 (triangular-arbitrage-engine)")
            .build()
            .context("Failed to build HTTP client for Binance")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms,
            last_timestamp: AtomicI64::new(0),
        })
    }

    /// Build a client from config, resolving secrets from the environment.
    ///
    /// Missing credentials are fatal unless `require_credentials` is false.
    pub fn from_config(cfg: &ExchangeConfig, require_credentials: bool) -> Result<Self> {
        let credentials = match (
            AppConfig::resolve_env(&cfg.api_key_env),
            AppConfig::resolve_env(&cfg.api_secret_env),
        ) {
            (Ok(api_key), Ok(secret)) if !api_key.is_empty() && !secret.is_empty() => {
                Some(Credentials {
                    api_key,
                    secret: SecretString::new(secret),
                })
            }
            (key, secret) => {
                if require_credentials {
                    key?;
                    secret?;
                    anyhow::bail!(
                        "Exchange credentials in {} / {} are empty",
                        cfg.api_key_env,
                        cfg.api_secret_env
                    );
                }
                warn!("No exchange credentials configured, convert API unavailable");
                None
            }
        };

        info!(
            base_url = %cfg.base_url,
            authenticated = credentials.is_some(),
            "Binance client ready"
        );

        Self::new(
            &cfg.base_url,
            credentials,
            cfg.recv_window_ms,
            Duration::from_secs(cfg.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -- Feed -------------------------------------------------------------

    /// Fetch the raw 24h ticker array for every symbol.
    pub async fn fetch_ticker_snapshot(&self) -> Result<serde_json::Value, ExchangeError> {
        let url = format!("{}{}", self.base_url, TICKER_24H_PATH);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;
        Self::decode(resp).await
    }

    // -- Signing ----------------------------------------------------------

    /// Strictly increasing millisecond timestamp.
    fn next_timestamp(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last_timestamp.load(Ordering::SeqCst);
        loop {
            let next = now.max(prev + 1);
            match self.last_timestamp.compare_exchange(
                prev,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let creds = self.credentials.as_ref().ok_or_else(|| {
            ExchangeError::MissingCredentials(format!("{path} requires an API key and secret"))
        })?;

        let query = signed_query(
            params,
            self.recv_window_ms,
            self.next_timestamp(),
            creds.secret.expose_secret(),
        )?;
        let url = format!("{}{}?{}", self.base_url, path, query);

        debug!(%method, path, "Signed Binance request");

        let resp = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &creds.api_key)
            .send()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ExchangeError> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ExchangeError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }

        serde_json::from_str(&body).map_err(|e| ExchangeError::Decode(format!("{e}: {body}")))
    }
}

/// Build `params&recvWindow=..&timestamp=..&signature=..`.
pub fn signed_query(
    params: &[(&str, String)],
    recv_window_ms: u64,
    timestamp: i64,
    secret: &str,
) -> Result<String, ExchangeError> {
    let mut query: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect();
    query.push(format!("recvWindow={recv_window_ms}"));
    query.push(format!("timestamp={timestamp}"));
    let query = query.join("&");

    let signature = sign(&query, secret)?;
    Ok(format!("{query}&signature={signature}"))
}

/// Hex-encoded HMAC-SHA256 of `payload`.
pub fn sign(payload: &str, secret: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ExchangeError::Signing(format!("Invalid secret key: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn api_error(status: u16, body: &str) -> ExchangeError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) => ExchangeError::Api {
            status,
            code: err.code,
            message: err.msg,
        },
        Err(_) => ExchangeError::Api {
            status,
            code: 0,
            message: body.to_string(),
        },
    }
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, ExchangeError> {
    Decimal::from_str(raw.trim())
        .or_else(|_| Decimal::from_scientific(raw.trim()))
        .map_err(|e| ExchangeError::Decode(format!("{field}={raw:?}: {e}")))
}

fn parse_optional_decimal(field: &str, raw: Option<&str>) -> Result<Decimal, ExchangeError> {
    match raw {
        Some(r) if !r.trim().is_empty() => parse_decimal(field, r),
        _ => Ok(Decimal::ZERO),
    }
}

fn id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn format_amount(amount: Decimal) -> String {
    amount.normalize().to_string()
}

// ---------------------------------------------------------------------------
// ConvertApi implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ConvertApi for BinanceClient {
    async fn request_quote(&self, request: &QuoteRequest) -> Result<Quote, ExchangeError> {
        let mut params = vec![
            ("fromAsset", request.from_asset.clone()),
            ("toAsset", request.to_asset.clone()),
        ];
        match request.amount {
            QuoteAmount::Spend(amount) => params.push(("fromAmount", format_amount(amount))),
            QuoteAmount::Receive(amount) => params.push(("toAmount", format_amount(amount))),
        }
        params.push(("validTime", request.valid_time.as_str().to_string()));

        let resp: QuoteResponse = self.signed_request(Method::POST, QUOTE_PATH, &params).await?;

        Ok(Quote {
            ratio: parse_decimal("ratio", &resp.ratio)?,
            inverse_ratio: parse_optional_decimal("inverseRatio", resp.inverse_ratio.as_deref())?,
            from_amount: parse_decimal("fromAmount", &resp.from_amount)?,
            to_amount: parse_decimal("toAmount", &resp.to_amount)?,
            quote_id: resp.quote_id,
        })
    }

    async fn accept_quote(&self, quote_id: &str) -> Result<AcceptedOrder, ExchangeError> {
        let params = [("quoteId", quote_id.to_string())];
        let resp: AcceptResponse = self.signed_request(Method::POST, ACCEPT_PATH, &params).await?;

        Ok(AcceptedOrder {
            order_id: id_string(&resp.order_id),
            status: OrderState::parse(&resp.order_status),
        })
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderStatus, ExchangeError> {
        let params = [("orderId", order_id.to_string())];
        let resp: OrderStatusResponse = self
            .signed_request(Method::GET, ORDER_STATUS_PATH, &params)
            .await?;

        Ok(OrderStatus {
            order_id: id_string(&resp.order_id),
            state: OrderState::parse(&resp.order_status),
            from_asset: resp.from_asset,
            to_asset: resp.to_asset,
            from_amount: parse_optional_decimal("fromAmount", resp.from_amount.as_deref())?,
            to_amount: parse_optional_decimal("toAmount", resp.to_amount.as_deref())?,
            ratio: parse_optional_decimal("ratio", resp.ratio.as_deref())?,
        })
    }

    fn name(&self) -> &str {
        CONNECTOR_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
