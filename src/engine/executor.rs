//! Three-leg conversion executor.
//!
//! Drives one candidate through the exchange's quote → accept → poll
//! flow, one leg at a time:
//!
//! ```text
//! Verifying → Converting(1) → Converting(2) → Converting(3) → Settled
//!     └───────────────┴──────────────┴──────────────┴──→ Failed
//! ```
//!
//! Every path ends in an `ExecutionOutcome`; nothing is logged to history
//! here, that is the controller's job.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::TradingConfig;
use crate::exchange::{ConvertApi, ExchangeError, OrderState, OrderStatus, QuoteRequest, QuoteValidity};
use crate::types::Candidate;

/// Decimal places kept when handing a buffered amount to the next leg.
const AMOUNT_SCALE: u32 = 8;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    pub capital: Decimal,
    pub slippage_buffer: Decimal,
    pub verify_before_execute: bool,
    pub verify_min_profit_pct: Decimal,
    pub quote_valid_time: QuoteValidity,
    pub simulation_valid_time: QuoteValidity,
    pub poll_max_attempts: u32,
    pub poll_interval: Duration,
}

impl ExecutionSettings {
    pub fn from_trading(cfg: &TradingConfig) -> Result<Self> {
        Ok(Self {
            capital: cfg.capital_decimal()?,
            slippage_buffer: cfg.slippage_decimal()?,
            verify_before_execute: cfg.verify_before_execute,
            verify_min_profit_pct: cfg.verify_min_decimal()?,
            quote_valid_time: cfg.quote_valid_time,
            simulation_valid_time: cfg.simulation_valid_time,
            poll_max_attempts: cfg.poll_max_attempts,
            poll_interval: cfg.poll_interval(),
        })
    }
}

// ---------------------------------------------------------------------------
// Sleeping
// ---------------------------------------------------------------------------

/// Delay between status polls; swapped out in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Where in the state machine an execution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionStage {
    Verify,
    Quote,
    Accept,
    Poll,
    Settlement,
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStage::Verify => write!(f, "verify"),
            ExecutionStage::Quote => write!(f, "quote"),
            ExecutionStage::Accept => write!(f, "accept"),
            ExecutionStage::Poll => write!(f, "poll"),
            ExecutionStage::Settlement => write!(f, "settlement"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("Leg {leg} {stage} failed: {source}")]
    Exchange {
        leg: usize,
        stage: ExecutionStage,
        source: ExchangeError,
    },

    #[error("Leg {leg} order {order_id} reported FAILED on poll {attempt}")]
    OrderFailed {
        leg: usize,
        order_id: String,
        attempt: u32,
    },

    #[error("Leg {leg} order {order_id} not settled after {attempts} polls")]
    Timeout {
        leg: usize,
        order_id: String,
        attempts: u32,
    },

    #[error("Leg {leg} {stage} produced non-positive output {amount}")]
    NonPositiveOutput {
        leg: usize,
        stage: ExecutionStage,
        amount: Decimal,
    },

    #[error("Leg {leg} {stage} amount out of range: {detail}")]
    AmountOverflow {
        leg: usize,
        stage: ExecutionStage,
        detail: String,
    },
}

impl ExecutionError {
    pub fn stage(&self) -> ExecutionStage {
        match self {
            ExecutionError::Exchange { stage, .. }
            | ExecutionError::NonPositiveOutput { stage, .. }
            | ExecutionError::AmountOverflow { stage, .. } => *stage,
            ExecutionError::OrderFailed { .. } | ExecutionError::Timeout { .. } => {
                ExecutionStage::Poll
            }
        }
    }

    pub fn leg(&self) -> usize {
        match self {
            ExecutionError::Exchange { leg, .. }
            | ExecutionError::OrderFailed { leg, .. }
            | ExecutionError::Timeout { leg, .. }
            | ExecutionError::NonPositiveOutput { leg, .. }
            | ExecutionError::AmountOverflow { leg, .. } => *leg,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Non-committal walk of the cycle using quotes only.
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    /// Amount spent on each leg.
    pub inputs: [Decimal; 3],
    /// Quoted output of each leg.
    pub outputs: [Decimal; 3],
    pub final_amount: Decimal,
    pub profit_pct: Decimal,
}

/// One settled conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegFill {
    pub leg: usize,
    pub order_id: String,
    pub from_asset: String,
    pub to_asset: String,
    pub from_amount: Decimal,
    pub to_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeResult {
    pub capital: Decimal,
    pub final_amount: Decimal,
    pub profit: Decimal,
    pub profit_pct: Decimal,
    pub simulated_pct: Option<Decimal>,
    pub fills: Vec<LegFill>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    Settled(TradeResult),
    /// Verification ran and declined; no funds moved.
    ProfitInsufficient {
        simulated_pct: Decimal,
        simulated_final: Decimal,
    },
    Failed {
        error: ExecutionError,
        simulated_pct: Option<Decimal>,
    },
}

impl ExecutionOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(self, ExecutionOutcome::Settled(_))
    }
}

/// `(profit, profit %)` of `final_amount` against `capital`. `None` when
/// the figures do not fit in a `Decimal`.
fn profit_figures(capital: Decimal, final_amount: Decimal) -> Option<(Decimal, Decimal)> {
    let profit = final_amount.checked_sub(capital)?;
    let pct = if capital.is_zero() {
        Decimal::ZERO
    } else {
        profit.checked_mul(Decimal::ONE_HUNDRED)?.checked_div(capital)?
    };
    Some((profit, pct))
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct Executor {
    api: Arc<dyn ConvertApi>,
    settings: ExecutionSettings,
    sleeper: Arc<dyn Sleeper>,
}

impl Executor {
    pub fn new(api: Arc<dyn ConvertApi>, settings: ExecutionSettings) -> Self {
        Self::with_sleeper(api, settings, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        api: Arc<dyn ConvertApi>,
        settings: ExecutionSettings,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            api,
            settings,
            sleeper,
        }
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    /// Amount handed to the next leg: buffered and truncated.
    fn buffered(
        &self,
        leg: usize,
        stage: ExecutionStage,
        previous_output: Decimal,
    ) -> Result<Decimal, ExecutionError> {
        previous_output
            .checked_mul(self.settings.slippage_buffer)
            .map(|v| v.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::ToZero))
            .ok_or_else(|| ExecutionError::AmountOverflow {
                leg,
                stage,
                detail: format!("{previous_output} x {}", self.settings.slippage_buffer),
            })
    }

    /// Route as `(from, to)` pairs in execution order.
    fn route(candidate: &Candidate) -> [(&str, &str); 3] {
        [
            (candidate.leg_a.from.as_str(), candidate.leg_a.to.as_str()),
            (candidate.leg_b.from.as_str(), candidate.leg_b.to.as_str()),
            (candidate.leg_c.from.as_str(), candidate.leg_c.to.as_str()),
        ]
    }

    /// Quote all three legs without accepting any of them.
    pub async fn simulate(&self, candidate: &Candidate) -> Result<Simulation, ExecutionError> {
        let mut inputs = [Decimal::ZERO; 3];
        let mut outputs = [Decimal::ZERO; 3];
        let mut amount = self.settings.capital;

        for (i, (from, to)) in Self::route(candidate).into_iter().enumerate() {
            let leg = i + 1;
            if i > 0 {
                amount = self.buffered(leg, ExecutionStage::Verify, outputs[i - 1])?;
            }
            inputs[i] = amount;

            let request =
                QuoteRequest::spend(from, to, amount, self.settings.simulation_valid_time);
            let quote = self
                .api
                .request_quote(&request)
                .await
                .map_err(|source| ExecutionError::Exchange {
                    leg,
                    stage: ExecutionStage::Verify,
                    source,
                })?;

            if quote.to_amount <= Decimal::ZERO {
                return Err(ExecutionError::NonPositiveOutput {
                    leg,
                    stage: ExecutionStage::Verify,
                    amount: quote.to_amount,
                });
            }
            debug!(leg, from, to, spend = %amount, receive = %quote.to_amount, "Simulated leg");
            outputs[i] = quote.to_amount;
        }

        let final_amount = outputs[2];
        let (_, profit_pct) = profit_figures(self.settings.capital, final_amount).ok_or_else(|| {
            ExecutionError::AmountOverflow {
                leg: 3,
                stage: ExecutionStage::Verify,
                detail: format!("profit on simulated final amount {final_amount}"),
            }
        })?;
        Ok(Simulation {
            inputs,
            outputs,
            final_amount,
            profit_pct,
        })
    }

    /// Run the full state machine for one candidate.
    pub async fn execute(&self, candidate: &Candidate) -> ExecutionOutcome {
        let route = candidate.route();
        let mut simulated_pct = None;

        if self.settings.verify_before_execute {
            match self.simulate(candidate).await {
                Ok(sim) => {
                    info!(
                        route = %route,
                        spends = ?sim.inputs,
                        simulated_final = %sim.final_amount,
                        simulated_pct = %sim.profit_pct.round_dp(4),
                        "Verification complete"
                    );
                    if sim.profit_pct < self.settings.verify_min_profit_pct {
                        warn!(
                            route = %route,
                            simulated_pct = %sim.profit_pct.round_dp(4),
                            min_pct = %self.settings.verify_min_profit_pct,
                            "Simulated profit insufficient, skipping execution"
                        );
                        return ExecutionOutcome::ProfitInsufficient {
                            simulated_pct: sim.profit_pct,
                            simulated_final: sim.final_amount,
                        };
                    }
                    simulated_pct = Some(sim.profit_pct);
                }
                Err(error) => {
                    warn!(route = %route, error = %error, "Verification failed");
                    return ExecutionOutcome::Failed {
                        error,
                        simulated_pct: None,
                    };
                }
            }
        }

        let result = self
            .run_legs(candidate)
            .await
            .and_then(|fills| self.summarize(fills, simulated_pct));

        match result {
            Ok(result) => {
                info!(
                    route = %route,
                    final_amount = %result.final_amount,
                    profit = %result.profit,
                    profit_pct = %result.profit_pct.round_dp(4),
                    "Execution settled"
                );
                ExecutionOutcome::Settled(result)
            }
            Err(error) => {
                warn!(
                    route = %route,
                    leg = error.leg(),
                    stage = %error.stage(),
                    error = %error,
                    "Execution aborted"
                );
                ExecutionOutcome::Failed {
                    error,
                    simulated_pct,
                }
            }
        }
    }

    /// Convert each leg in turn; stops at the first failure.
    async fn run_legs(&self, candidate: &Candidate) -> Result<Vec<LegFill>, ExecutionError> {
        let mut fills: Vec<LegFill> = Vec::with_capacity(3);

        for (i, (from, to)) in Self::route(candidate).into_iter().enumerate() {
            let leg = i + 1;
            let amount = match fills.last() {
                Some(prev) => self.buffered(leg, ExecutionStage::Quote, prev.to_amount)?,
                None => self.settings.capital,
            };

            let fill = self.convert(leg, from, to, amount).await?;
            info!(
                leg,
                from,
                to,
                spent = %fill.from_amount,
                received = %fill.to_amount,
                order_id = %fill.order_id,
                "Leg settled"
            );
            fills.push(fill);
        }

        Ok(fills)
    }

    fn summarize(
        &self,
        fills: Vec<LegFill>,
        simulated_pct: Option<Decimal>,
    ) -> Result<TradeResult, ExecutionError> {
        let capital = self.settings.capital;
        let final_amount = fills.last().map(|f| f.to_amount).unwrap_or(Decimal::ZERO);
        let (profit, profit_pct) = profit_figures(capital, final_amount).ok_or_else(|| {
            ExecutionError::AmountOverflow {
                leg: fills.len(),
                stage: ExecutionStage::Settlement,
                detail: format!("profit on final amount {final_amount}"),
            }
        })?;

        Ok(TradeResult {
            capital,
            final_amount,
            profit,
            profit_pct,
            simulated_pct,
            fills,
        })
    }

    /// Quote, accept and wait for one leg.
    async fn convert(
        &self,
        leg: usize,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<LegFill, ExecutionError> {
        let request = QuoteRequest::spend(from, to, amount, self.settings.quote_valid_time);
        let quote = self
            .api
            .request_quote(&request)
            .await
            .map_err(|source| ExecutionError::Exchange {
                leg,
                stage: ExecutionStage::Quote,
                source,
            })?;

        let accepted = self
            .api
            .accept_quote(&quote.quote_id)
            .await
            .map_err(|source| ExecutionError::Exchange {
                leg,
                stage: ExecutionStage::Accept,
                source,
            })?;
        debug!(leg, order_id = %accepted.order_id, status = %accepted.status, "Quote accepted");

        let status = self.await_settlement(leg, &accepted.order_id).await?;
        if status.to_amount <= Decimal::ZERO {
            return Err(ExecutionError::NonPositiveOutput {
                leg,
                stage: ExecutionStage::Settlement,
                amount: status.to_amount,
            });
        }

        Ok(LegFill {
            leg,
            order_id: accepted.order_id,
            from_asset: from.to_string(),
            to_asset: to.to_string(),
            from_amount: amount,
            to_amount: status.to_amount,
        })
    }

    /// Bounded status polling. Sleeps only between attempts.
    async fn await_settlement(&self, leg: usize, order_id: &str) -> Result<OrderStatus, ExecutionError> {
        let max = self.settings.poll_max_attempts;

        for attempt in 1..=max {
            let status = self
                .api
                .order_status(order_id)
                .await
                .map_err(|source| ExecutionError::Exchange {
                    leg,
                    stage: ExecutionStage::Poll,
                    source,
                })?;

            match status.state {
                OrderState::Success => return Ok(status),
                OrderState::Failed => {
                    return Err(ExecutionError::OrderFailed {
                        leg,
                        order_id: order_id.to_string(),
                        attempt,
                    })
                }
                OrderState::Pending(ref raw) => {
                    debug!(leg, order_id, attempt, max, status = %raw, "Order pending");
                }
            }

            if attempt < max {
                self.sleeper.sleep(self.settings.poll_interval).await;
            }
        }

        Err(ExecutionError::Timeout {
            leg,
            order_id: order_id.to_string(),
            attempts: max,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
