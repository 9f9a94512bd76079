//! Quote domain - best-swap lookup, wrapper conversion and price impact

mod oracles;
mod quote_engine;
mod swap_cost;
mod trade_mode;

pub use oracles::{
    BackgroundWrapRate, PoolSnapshot, RoutePlan, RoutingOracle, SwapRequest, SwapRoute,
    WrapperOracle,
};
pub use quote_engine::{QuoteEngine, QuoteEngineConfig};
pub use swap_cost::{
    PriceSource, SwapCostEstimator, TokenPriceService, TokenPrices, DEFAULT_SWAP_COST_GAS,
    PRICE_PAGE_SIZE,
};
pub use trade_mode::{TradeMode, WrapDirection, WrapperPair, WrapperPairs};

#[cfg(test)]
pub(crate) use quote_engine::tests as test_support;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::math::to_decimal;
use crate::shared::errors::AmountError;
use crate::shared::types::Address;

/// Smallest price impact reported for a routed swap
pub const MIN_PRICE_IMPACT: Decimal = dec!(0.0001);

/// Price impact at or above which a trade is flagged
pub const HIGH_PRICE_IMPACT_THRESHOLD: Decimal = dec!(0.05);

/// Which side of the trade the user fixed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SwapDirection {
    ExactIn,
    ExactOut,
}

impl SwapDirection {
    pub fn is_exact_in(self) -> bool {
        matches!(self, SwapDirection::ExactIn)
    }
}

/// An executable quote. Amounts are base units; decimal views are derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub direction: SwapDirection,
    pub token_in: Address,
    pub token_out: Address,
    pub token_in_decimals: u32,
    pub token_out_decimals: u32,
    pub amount_in: u128,
    pub amount_out: u128,
    pub market_spot_price: Decimal,
    pub has_route: bool,
    pub route_plan: RoutePlan,
}

impl Quote {
    pub fn amount_in_decimal(&self) -> Result<Decimal, AmountError> {
        to_decimal(self.amount_in, self.token_in_decimals)
    }

    pub fn amount_out_decimal(&self) -> Result<Decimal, AmountError> {
        to_decimal(self.amount_out, self.token_out_decimals)
    }
}

/// Deviation of the effective price from the marginal spot price
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceImpact(Decimal);

impl PriceImpact {
    pub const ZERO: PriceImpact = PriceImpact(Decimal::ZERO);

    /// `max((amount_in / amount_out) / spot - 1, floor)`. Degenerate inputs
    /// (zero output or spot price) report the floor.
    pub fn from_amounts(amount_in: Decimal, amount_out: Decimal, spot_price: Decimal, floor: Decimal) -> Self {
        let floor = floor.max(Decimal::ZERO);
        let impact = amount_in
            .checked_div(amount_out)
            .and_then(|effective| effective.checked_div(spot_price))
            .map(|ratio| ratio - Decimal::ONE)
            .unwrap_or(floor);
        PriceImpact(impact.max(floor))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_high(&self, threshold: Decimal) -> bool {
        self.0 >= threshold
    }
}

/// Everything the engine needs for one quote
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRequest {
    pub token_in: Option<Address>,
    pub token_out: Option<Address>,
    pub token_in_decimals: Option<u32>,
    pub token_out_decimals: Option<u32>,
    pub direction: SwapDirection,
    /// Raw decimal input of the fixed side
    pub amount: String,
    pub mode: TradeMode,
}

/// What a quote run means for the displayed amounts
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteOutcome {
    /// Zero, blank or unparsable amount; no oracle was called
    NoAmount { dependent_amount: String },
    /// Missing token, decimals or pool data; the dependent field is cleared
    Unavailable,
    /// Wrapper conversion; price impact is zero
    Wrapped { quote: Quote, dependent_amount: String },
    Routed {
        quote: Quote,
        price_impact: PriceImpact,
        dependent_amount: String,
    },
}

impl QuoteOutcome {
    pub fn dependent_amount(&self) -> &str {
        match self {
            QuoteOutcome::NoAmount { dependent_amount }
            | QuoteOutcome::Wrapped { dependent_amount, .. }
            | QuoteOutcome::Routed { dependent_amount, .. } => dependent_amount,
            QuoteOutcome::Unavailable => "",
        }
    }

    pub fn price_impact(&self) -> PriceImpact {
        match self {
            QuoteOutcome::Routed { price_impact, .. } => *price_impact,
            _ => PriceImpact::ZERO,
        }
    }

    pub fn quote(&self) -> Option<&Quote> {
        match self {
            QuoteOutcome::Wrapped { quote, .. } | QuoteOutcome::Routed { quote, .. } => Some(quote),
            QuoteOutcome::NoAmount { .. } | QuoteOutcome::Unavailable => None,
        }
    }
}
