//! Trade domain - quoting, submission and confirmation of user trades

mod pool_refresher;
mod trade_orchestrator;

pub use pool_refresher::{PoolDataRefresher, RefreshTask, DEFAULT_REFRESH_INTERVAL};
pub use trade_orchestrator::{SubmittedTrade, TradeConfig, TradeOrchestrator};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::quote::{PriceImpact, RoutePlan, SwapDirection, TradeMode};
use crate::domain::transactions::TxReceipt;
use crate::shared::errors::{ListenerError, SubmissionError};
use crate::shared::types::{Address, TokenInfo};

/// Where the orchestrator is in the life of one trade
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradePhase {
    Idle,
    Quoting,
    Quoted(TradeMode),
    Submitting,
    Confirming { hash: String },
    Confirmed { hash: String },
    Failed { hash: String },
}

/// Raw user inputs of the trade form
#[derive(Debug, Clone, PartialEq)]
pub struct TradeInputs {
    pub token_in: Option<Address>,
    pub token_out: Option<Address>,
    pub direction: SwapDirection,
    pub token_in_amount: String,
    pub token_out_amount: String,
}

impl Default for TradeInputs {
    fn default() -> Self {
        Self {
            token_in: None,
            token_out: None,
            direction: SwapDirection::ExactIn,
            token_in_amount: String::new(),
            token_out_amount: String::new(),
        }
    }
}

impl TradeInputs {
    /// Amount of the side the user fixed
    pub fn fixed_amount(&self) -> &str {
        match self.direction {
            SwapDirection::ExactIn => &self.token_in_amount,
            SwapDirection::ExactOut => &self.token_out_amount,
        }
    }

    /// Write the quoted amount into the side the user did not fix
    pub fn set_dependent_amount(&mut self, amount: String) {
        match self.direction {
            SwapDirection::ExactIn => self.token_out_amount = amount,
            SwapDirection::ExactOut => self.token_in_amount = amount,
        }
    }
}

/// Slippage bounds of the current quote, in base units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteBounds {
    pub fee_amount_in_token: String,
    pub fee_amount_out_token: String,
    pub maximum_in_amount: String,
    pub minimum_out_amount: String,
}

/// Context stored with a submitted trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeDetails {
    pub token_in: TokenInfo,
    pub token_out: TokenInfo,
    pub token_in_amount: String,
    pub token_out_amount: String,
    pub exact_in: bool,
    pub quote: QuoteBounds,
    pub price_impact: PriceImpact,
    pub slippage_buffer_rate: Decimal,
}

/// Swap handed to the submitter. `limit` is the minimum output for exact-in
/// swaps and the maximum input for exact-out swaps.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapOrder {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: u128,
    pub amount_out: u128,
    pub limit: u128,
    pub route_plan: RoutePlan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTx {
    pub hash: String,
}

/// Signs and broadcasts trades
#[async_trait]
pub trait TradeSubmitter: Send + Sync {
    async fn submit_wrap(&self, wrapper: &Address, amount: u128) -> Result<SubmittedTx, SubmissionError>;

    async fn submit_unwrap(&self, wrapper: &Address, amount: u128) -> Result<SubmittedTx, SubmissionError>;

    async fn submit_swap_in(&self, order: &SwapOrder) -> Result<SubmittedTx, SubmissionError>;

    async fn submit_swap_out(&self, order: &SwapOrder) -> Result<SubmittedTx, SubmissionError>;
}

/// Resolves once a submitted transaction is mined or has failed
#[async_trait]
pub trait ConfirmationListener: Send + Sync {
    async fn wait(&self, tx: &SubmittedTx) -> Result<TxReceipt, ListenerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Goal {
    ClickSwap,
    Swapped,
}

/// Product analytics hook
pub trait GoalTracker: Send + Sync {
    fn track(&self, goal: Goal);
}

/// Writes goals to the log
pub struct TracingGoalTracker;

impl GoalTracker for TracingGoalTracker {
    fn track(&self, goal: Goal) {
        info!(goal = ?goal, "goal reached");
    }
}
