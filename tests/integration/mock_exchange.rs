//! Scripted exchange for integration testing.
//!
//! Provides a deterministic `ConvertApi` implementation: quotes convert at
//! fixed per-pair rates, accepted orders settle after a configurable number
//! of pending polls, and every call is logged for inspection. All state is
//! in-memory.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use triarb::exchange::{
    AcceptedOrder, ConvertApi, ExchangeError, OrderState, OrderStatus, Quote, QuoteAmount,
    QuoteRequest, QuoteValidity,
};

/// One call received by the exchange, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Quote {
        from: String,
        to: String,
        amount: Decimal,
        valid_time: QuoteValidity,
    },
    Accept(String),
    Status(String),
}

#[derive(Debug, Clone)]
struct Conversion {
    from: String,
    to: String,
    from_amount: Decimal,
    to_amount: Decimal,
}

#[derive(Debug, Clone)]
struct Order {
    conversion: Conversion,
    polls: u32,
}

pub struct ScriptedExchange {
    rates: HashMap<(String, String), Decimal>,
    /// Pending responses before an order reaches its terminal state.
    pending_polls: u32,
    /// Orders converting `from → to` end FAILED instead of SUCCESS.
    failing_pair: Option<(String, String)>,
    force_error: Mutex<Option<ExchangeError>>,
    quotes: Mutex<HashMap<String, Conversion>>,
    orders: Mutex<HashMap<String, Order>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedExchange {
    pub fn new() -> Self {
        Self {
            rates: HashMap::new(),
            pending_polls: 0,
            failing_pair: None,
            force_error: Mutex::new(None),
            quotes: Mutex::new(HashMap::new()),
            orders: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_rate(mut self, from: &str, to: &str, rate: Decimal) -> Self {
        self.rates.insert((from.to_string(), to.to_string()), rate);
        self
    }

    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    pub fn with_failing_pair(mut self, from: &str, to: &str) -> Self {
        self.failing_pair = Some((from.to_string(), to.to_string()));
        self
    }

    /// Force all subsequent calls to return this error.
    pub fn set_error(&self, error: ExchangeError) {
        *self.force_error.lock().unwrap() = Some(error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn quote_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Quote { .. }))
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn log(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_error(&self) -> Result<(), ExchangeError> {
        match self.force_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ConvertApi for ScriptedExchange {
    async fn request_quote(&self, request: &QuoteRequest) -> Result<Quote, ExchangeError> {
        let amount = match request.amount {
            QuoteAmount::Spend(v) | QuoteAmount::Receive(v) => v,
        };
        self.log(Call::Quote {
            from: request.from_asset.clone(),
            to: request.to_asset.clone(),
            amount,
            valid_time: request.valid_time,
        });
        self.check_error()?;

        let rate = self
            .rates
            .get(&(request.from_asset.clone(), request.to_asset.clone()))
            .copied()
            .ok_or_else(|| ExchangeError::Api {
                status: 400,
                code: -345233,
                message: format!(
                    "Pair {}/{} not supported",
                    request.from_asset, request.to_asset
                ),
            })?;

        let to_amount = (amount * rate).round_dp(8);
        let quote_id = Uuid::new_v4().to_string();
        self.quotes.lock().unwrap().insert(
            quote_id.clone(),
            Conversion {
                from: request.from_asset.clone(),
                to: request.to_asset.clone(),
                from_amount: amount,
                to_amount,
            },
        );

        Ok(Quote {
            quote_id,
            ratio: rate,
            inverse_ratio: Decimal::ONE / rate,
            from_amount: amount,
            to_amount,
        })
    }

    async fn accept_quote(&self, quote_id: &str) -> Result<AcceptedOrder, ExchangeError> {
        self.log(Call::Accept(quote_id.to_string()));
        self.check_error()?;

        let conversion = self
            .quotes
            .lock()
            .unwrap()
            .remove(quote_id)
            .ok_or_else(|| ExchangeError::Api {
                status: 400,
                code: -345124,
                message: "Quote expired or not found".into(),
            })?;

        let order_id = format!("order-{}-{}", conversion.from, conversion.to);
        self.orders
            .lock()
            .unwrap()
            .insert(order_id.clone(), Order { conversion, polls: 0 });

        Ok(AcceptedOrder {
            order_id,
            status: OrderState::Pending("PROCESS".into()),
        })
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderStatus, ExchangeError> {
        self.log(Call::Status(order_id.to_string()));
        self.check_error()?;

        let mut orders = self.orders.lock().unwrap();
        let order = orders.get_mut(order_id).ok_or_else(|| ExchangeError::Api {
            status: 400,
            code: -2013,
            message: "Order does not exist".into(),
        })?;
        order.polls += 1;

        let c = &order.conversion;
        let failing = self
            .failing_pair
            .as_ref()
            .is_some_and(|(from, to)| *from == c.from && *to == c.to);
        let state = if order.polls <= self.pending_polls {
            OrderState::Pending("PROCESS".into())
        } else if failing {
            OrderState::Failed
        } else {
            OrderState::Success
        };

        Ok(OrderStatus {
            order_id: order_id.to_string(),
            to_amount: if state == OrderState::Success {
                c.to_amount
            } else {
                Decimal::ZERO
            },
            state,
            from_asset: c.from.clone(),
            to_asset: c.to.clone(),
            from_amount: c.from_amount,
            ratio: Decimal::ZERO,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_quote_accept_settle() {
        let ex = ScriptedExchange::new().with_rate("USDT", "BTC", dec!(0.02));
        let q = ex
            .request_quote(&QuoteRequest::spend("USDT", "BTC", dec!(50), QuoteValidity::TenSeconds))
            .await
            .unwrap();
        assert_eq!(q.to_amount, dec!(1));

        let order = ex.accept_quote(&q.quote_id).await.unwrap();
        let status = ex.order_status(&order.order_id).await.unwrap();
        assert_eq!(status.state, OrderState::Success);
        assert_eq!(status.to_amount, dec!(1));
        assert_eq!(ex.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_pending_then_failed() {
        let ex = ScriptedExchange::new()
            .with_rate("USDT", "BTC", dec!(0.02))
            .with_pending_polls(1)
            .with_failing_pair("USDT", "BTC");
        let q = ex
            .request_quote(&QuoteRequest::spend("USDT", "BTC", dec!(50), QuoteValidity::TenSeconds))
            .await
            .unwrap();
        let order = ex.accept_quote(&q.quote_id).await.unwrap();

        let first = ex.order_status(&order.order_id).await.unwrap();
        assert!(matches!(first.state, OrderState::Pending(_)));
        let second = ex.order_status(&order.order_id).await.unwrap();
        assert_eq!(second.state, OrderState::Failed);
    }

    #[tokio::test]
    async fn test_unknown_pair_rejected() {
        let ex = ScriptedExchange::new();
        let err = ex
            .request_quote(&QuoteRequest::spend("USDT", "XYZ", dec!(1), QuoteValidity::TenSeconds))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[tokio::test]
    async fn test_forced_error() {
        let ex = ScriptedExchange::new().with_rate("USDT", "BTC", dec!(0.02));
        ex.set_error(ExchangeError::Transport("connection reset".into()));
        assert!(ex
            .request_quote(&QuoteRequest::spend("USDT", "BTC", dec!(1), QuoteValidity::TenSeconds))
            .await
            .is_err());
        assert!(ex.accept_quote("q").await.is_err());
    }
}
