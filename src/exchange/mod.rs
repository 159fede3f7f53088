//! Exchange integration.
//!
//! Defines the `ConvertApi` trait the execution engine drives, the
//! request/response types it exchanges, and a Binance implementation:
//! - `binance`: signed REST client for the Convert API plus the public
//!   24h ticker feed.

pub mod binance;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures surfaced by an exchange connector.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExchangeError {
    #[error("Transport error: {0}")]
    Transport(String),

    /// The exchange answered with an error payload; `message` is its own text.
    #[error("Exchange rejected request (HTTP {status}, code {code}): {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },

    #[error("Failed to decode exchange response: {0}")]
    Decode(String),

    #[error("Request signing failed: {0}")]
    Signing(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
}

// ---------------------------------------------------------------------------
// Quote request
// ---------------------------------------------------------------------------

/// How long a quote stays acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuoteValidity {
    #[serde(rename = "10s")]
    TenSeconds,
    #[serde(rename = "30s")]
    ThirtySeconds,
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "2m")]
    TwoMinutes,
}

impl QuoteValidity {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteValidity::TenSeconds => "10s",
            QuoteValidity::ThirtySeconds => "30s",
            QuoteValidity::OneMinute => "1m",
            QuoteValidity::TwoMinutes => "2m",
        }
    }
}

impl fmt::Display for QuoteValidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exactly one side of the conversion is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteAmount {
    /// Amount of the source currency to spend.
    Spend(Decimal),
    /// Amount of the destination currency to receive.
    Receive(Decimal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub from_asset: String,
    pub to_asset: String,
    pub amount: QuoteAmount,
    pub valid_time: QuoteValidity,
}

impl QuoteRequest {
    pub fn spend(from: &str, to: &str, amount: Decimal, valid_time: QuoteValidity) -> Self {
        Self {
            from_asset: from.to_string(),
            to_asset: to.to_string(),
            amount: QuoteAmount::Spend(amount),
            valid_time,
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// A non-committal conversion offer.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub quote_id: String,
    pub ratio: Decimal,
    pub inverse_ratio: Decimal,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
}

/// Result of accepting a quote.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedOrder {
    pub order_id: String,
    pub status: OrderState,
}

/// Lifecycle state of a conversion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderState {
    /// Still processing; carries the exchange's raw status string.
    Pending(String),
    Success,
    Failed,
}

impl OrderState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SUCCESS" => OrderState::Success,
            "FAIL" | "FAILED" => OrderState::Failed,
            _ => OrderState::Pending(raw.to_string()),
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderState::Pending(raw) => write!(f, "{raw}"),
            OrderState::Success => write!(f, "SUCCESS"),
            OrderState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Snapshot of an order returned by a status poll.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatus {
    pub order_id: String,
    pub state: OrderState,
    pub from_asset: String,
    pub to_asset: String,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
    pub ratio: Decimal,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Abstraction over an exchange's quote → accept → poll conversion flow.
///
/// Implementors own request signing and replay protection; callers only
/// supply the business fields.
#[async_trait]
pub trait ConvertApi: Send + Sync {
    /// Request a quote without committing to it.
    async fn request_quote(&self, request: &QuoteRequest) -> Result<Quote, ExchangeError>;

    /// Accept a previously issued quote.
    async fn accept_quote(&self, quote_id: &str) -> Result<AcceptedOrder, ExchangeError>;

    /// Fetch the current state of a conversion order.
    async fn order_status(&self, order_id: &str) -> Result<OrderStatus, ExchangeError>;

    /// Connector name for logging.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_state_parse() {
        assert_eq!(OrderState::parse("SUCCESS"), OrderState::Success);
        assert_eq!(OrderState::parse("success"), OrderState::Success);
        assert_eq!(OrderState::parse("FAIL"), OrderState::Failed);
        assert_eq!(OrderState::parse("FAILED"), OrderState::Failed);
        assert_eq!(
            OrderState::parse("PROCESS"),
            OrderState::Pending("PROCESS".to_string())
        );
        assert!(matches!(OrderState::parse("ACCEPT_SUCCESS"), OrderState::Pending(_)));
    }

    #[test]
    fn test_quote_validity_strings() {
        assert_eq!(QuoteValidity::TenSeconds.as_str(), "10s");
        assert_eq!(QuoteValidity::TwoMinutes.to_string(), "2m");
        let parsed: QuoteValidity = serde_json::from_str("\"1m\"").unwrap();
        assert_eq!(parsed, QuoteValidity::OneMinute);
    }

    #[test]
    fn test_api_error_carries_exchange_message() {
        let err = ExchangeError::Api {
            status: 400,
            code: -2010,
            message: "Insufficient balance".into(),
        };
        assert!(err.to_string().contains("Insufficient balance"));
        assert!(err.to_string().contains("-2010"));
    }
}
