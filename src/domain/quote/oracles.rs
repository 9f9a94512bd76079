//! Interfaces of the external pricing collaborators

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::shared::errors::OracleError;
use crate::shared::types::Address;
use super::{SwapDirection, WrapDirection};

/// Opaque description of the pools and amounts that satisfy a swap
pub type RoutePlan = serde_json::Value;

/// Pool data the routing oracle searches over
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub pools: serde_json::Value,
}

/// Best-swap lookup parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SwapRequest {
    pub token_in: Address,
    pub token_out: Address,
    pub token_in_decimals: u32,
    pub token_out_decimals: u32,
    pub direction: SwapDirection,
    /// Fixed side of the trade, in base units of that side's token
    pub amount: u128,
}

/// Oracle answer for a swap request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRoute {
    pub has_route: bool,
    /// Unfixed side of the trade, in base units of that side's token
    pub return_amount: u128,
    /// Marginal spot price across the selected pools, normalized
    pub market_spot_price: Decimal,
    pub plan: RoutePlan,
}

impl SwapRoute {
    pub fn none() -> Self {
        Self {
            has_route: false,
            return_amount: 0,
            market_spot_price: Decimal::ZERO,
            plan: RoutePlan::Null,
        }
    }
}

/// Pathfinding oracle over a liquidity-pool graph
#[async_trait]
pub trait RoutingOracle: Send + Sync {
    /// Fetch a fresh pool snapshot
    async fn refresh_pools(&self) -> Result<PoolSnapshot, OracleError>;

    /// Whether a snapshot has been loaded at least once
    fn has_pool_data(&self) -> bool;

    /// Tell the oracle what a swap costs in units of the output token; `None`
    /// lets the oracle work it out on-chain.
    async fn set_cost_output_token(
        &self,
        token: &Address,
        decimals: u32,
        cost: Option<Decimal>,
    ) -> Result<(), OracleError>;

    async fn best_swap(
        &self,
        request: &SwapRequest,
        snapshot: &PoolSnapshot,
    ) -> Result<SwapRoute, OracleError>;
}

/// Conversion rate between a base asset and its tokenized wrapper
#[async_trait]
pub trait WrapperOracle: Send + Sync {
    async fn convert(
        &self,
        wrapper: &Address,
        direction: WrapDirection,
        amount: u128,
    ) -> Result<u128, OracleError>;
}

/// Rate for assets the routing oracle prices through a background wrapper
/// (e.g. a liquid-staking token quoted against its wrapped form)
#[async_trait]
pub trait BackgroundWrapRate: Send + Sync {
    /// Base-asset amount represented by `amount` of the special asset
    async fn rate_for(&self, amount: u128) -> Result<u128, OracleError>;
}
