//! Quote engine: routing oracle and wrapper conversions behind one call

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::math::{format_fixed_down, format_fixed_up, parse_amount, to_base_units, to_decimal};
use crate::shared::errors::{OracleError, QuoteError};
use crate::shared::types::Address;
use super::{
    BackgroundWrapRate, PoolSnapshot, PriceImpact, Quote, QuoteOutcome, QuoteRequest, RoutePlan,
    RoutingOracle, SwapCostEstimator, SwapDirection, SwapRequest, SwapRoute, TradeMode, WrapDirection,
    WrapperOracle, WrapperPairs, HIGH_PRICE_IMPACT_THRESHOLD, MIN_PRICE_IMPACT,
};

/// Decimals shown in the dependent amount field of a routed swap
const DISPLAY_DECIMALS: u32 = 6;

#[derive(Debug, Clone)]
pub struct QuoteEngineConfig {
    pub min_price_impact: Decimal,
    pub high_price_impact_threshold: Decimal,
    pub oracle_timeout: Duration,
    /// Compute swap cost from stored prices instead of letting the oracle
    /// query it on-chain
    pub price_based_swap_cost: bool,
}

impl Default for QuoteEngineConfig {
    fn default() -> Self {
        Self {
            min_price_impact: MIN_PRICE_IMPACT,
            high_price_impact_threshold: HIGH_PRICE_IMPACT_THRESHOLD,
            oracle_timeout: Duration::from_secs(15),
            price_based_swap_cost: false,
        }
    }
}

/// Produces quotes for wrap, unwrap and routed swap trades
pub struct QuoteEngine {
    oracle: Arc<dyn RoutingOracle>,
    wrapper: Arc<dyn WrapperOracle>,
    background_rates: HashMap<Address, Arc<dyn BackgroundWrapRate>>,
    swap_cost: Option<Arc<SwapCostEstimator>>,
    config: QuoteEngineConfig,
}

impl QuoteEngine {
    pub fn new(
        oracle: Arc<dyn RoutingOracle>,
        wrapper: Arc<dyn WrapperOracle>,
        config: QuoteEngineConfig,
    ) -> Self {
        Self {
            oracle,
            wrapper,
            background_rates: HashMap::new(),
            swap_cost: None,
            config,
        }
    }

    /// Register a background-wrap rate for an asset the oracle quotes through
    /// its wrapped form
    pub fn with_background_rate(mut self, asset: Address, rate: Arc<dyn BackgroundWrapRate>) -> Self {
        self.background_rates.insert(asset, rate);
        self
    }

    pub fn with_swap_cost(mut self, estimator: Arc<SwapCostEstimator>) -> Self {
        self.swap_cost = Some(estimator);
        self
    }

    pub fn config(&self) -> &QuoteEngineConfig {
        &self.config
    }

    pub fn oracle(&self) -> &Arc<dyn RoutingOracle> {
        &self.oracle
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, OracleError>>,
    ) -> Result<Result<T, OracleError>, QuoteError> {
        tokio::time::timeout(self.config.oracle_timeout, call)
            .await
            .map_err(|_| QuoteError::Timeout(self.config.oracle_timeout.as_millis() as u64))
    }

    pub async fn quote(
        &self,
        request: &QuoteRequest,
        snapshot: Option<&PoolSnapshot>,
    ) -> Result<QuoteOutcome, QuoteError> {
        let amount = match parse_amount(&request.amount) {
            Ok(amount) if amount.is_zero() => {
                return Ok(QuoteOutcome::NoAmount {
                    dependent_amount: request.amount.clone(),
                });
            }
            Ok(amount) if !amount.is_sign_negative() => amount,
            _ => {
                debug!("Skipping quote for unusable amount {:?}", request.amount);
                return Ok(QuoteOutcome::NoAmount {
                    dependent_amount: String::new(),
                });
            }
        };

        let (Some(token_in), Some(token_out)) = (&request.token_in, &request.token_out) else {
            return Ok(QuoteOutcome::Unavailable);
        };
        let (Some(decimals_in), Some(decimals_out)) =
            (request.token_in_decimals, request.token_out_decimals)
        else {
            warn!("Cannot quote {} -> {}: unknown token decimals", token_in, token_out);
            return Ok(QuoteOutcome::Unavailable);
        };

        let legs = Legs {
            token_in,
            token_out,
            decimals_in,
            decimals_out,
            direction: request.direction,
            amount,
        };

        match request.mode.wrap_direction() {
            Some(direction) => self.quote_wrap(&legs, request.mode, direction).await,
            None => match snapshot {
                Some(snapshot) if self.oracle.has_pool_data() => self.quote_swap(&legs, snapshot).await,
                _ => {
                    debug!("No pool data yet, cannot quote swap");
                    Ok(QuoteOutcome::Unavailable)
                }
            },
        }
    }

    async fn quote_wrap(
        &self,
        legs: &Legs<'_>,
        mode: TradeMode,
        direction: WrapDirection,
    ) -> Result<QuoteOutcome, QuoteError> {
        let wrapper = WrapperPairs::wrapper_for(mode, legs.token_in, legs.token_out);

        let (amount_in, amount_out, dependent) = match legs.direction {
            SwapDirection::ExactIn => {
                let scaled = to_base_units(legs.amount, legs.decimals_in)?;
                let output = self
                    .bounded(self.wrapper.convert(wrapper, direction, scaled))
                    .await?
                    .map_err(|e| QuoteError::WrapperConversion(e.to_string()))?;
                (scaled, output, to_decimal(output, legs.decimals_in)?)
            }
            SwapDirection::ExactOut => {
                let scaled = to_base_units(legs.amount, legs.decimals_out)?;
                let input = self
                    .bounded(self.wrapper.convert(wrapper, direction.inverse(), scaled))
                    .await?
                    .map_err(|e| QuoteError::WrapperConversion(e.to_string()))?;
                (input, scaled, to_decimal(input, legs.decimals_out)?)
            }
        };

        Ok(QuoteOutcome::Wrapped {
            quote: Quote {
                direction: legs.direction,
                token_in: legs.token_in.clone(),
                token_out: legs.token_out.clone(),
                token_in_decimals: legs.decimals_in,
                token_out_decimals: legs.decimals_out,
                amount_in,
                amount_out,
                market_spot_price: Decimal::ONE,
                has_route: false,
                route_plan: RoutePlan::Null,
            },
            dependent_amount: dependent.to_string(),
        })
    }

    async fn quote_swap(&self, legs: &Legs<'_>, snapshot: &PoolSnapshot) -> Result<QuoteOutcome, QuoteError> {
        // The oracle weighs gas in terms of the token it returns.
        match legs.direction {
            SwapDirection::ExactIn => self.push_swap_cost(legs.token_out, legs.decimals_out).await,
            SwapDirection::ExactOut => self.push_swap_cost(legs.token_in, legs.decimals_in).await,
        }

        let fixed_decimals = match legs.direction {
            SwapDirection::ExactIn => legs.decimals_in,
            SwapDirection::ExactOut => legs.decimals_out,
        };
        let request = SwapRequest {
            token_in: legs.token_in.clone(),
            token_out: legs.token_out.clone(),
            token_in_decimals: legs.decimals_in,
            token_out_decimals: legs.decimals_out,
            direction: legs.direction,
            amount: to_base_units(legs.amount, fixed_decimals)?,
        };

        debug!("Requesting best swap {:?}", request);
        let route = self
            .bounded(self.oracle.best_swap(&request, snapshot))
            .await?
            .map_err(|e| QuoteError::NoSwapFound(e.to_string()))?;

        let (quote, dependent_amount, price_impact) = match legs.direction {
            SwapDirection::ExactIn => {
                let output = to_decimal(route.return_amount, legs.decimals_out)?;
                let dependent = if output > Decimal::ZERO {
                    format_fixed_down(output, DISPLAY_DECIMALS)
                } else {
                    String::new()
                };
                let impact = if route.has_route {
                    let adjusted = self.adjusted_amount(output, legs.token_out, legs.decimals_out).await?;
                    PriceImpact::from_amounts(
                        legs.amount,
                        adjusted,
                        route.market_spot_price,
                        self.config.min_price_impact,
                    )
                } else {
                    PriceImpact::ZERO
                };
                let quote = build_quote(legs, request.amount, route.return_amount, &route);
                (quote, dependent, impact)
            }
            SwapDirection::ExactOut => {
                let input = to_decimal(route.return_amount, legs.decimals_in)?;
                let dependent = if input > Decimal::ZERO {
                    format_fixed_up(input, DISPLAY_DECIMALS)
                } else {
                    String::new()
                };
                let impact = if route.has_route {
                    let adjusted = self.adjusted_amount(legs.amount, legs.token_out, legs.decimals_out).await?;
                    PriceImpact::from_amounts(
                        input,
                        adjusted,
                        route.market_spot_price,
                        self.config.min_price_impact,
                    )
                } else {
                    PriceImpact::ZERO
                };
                let quote = build_quote(legs, route.return_amount, request.amount, &route);
                (quote, dependent, impact)
            }
        };

        Ok(QuoteOutcome::Routed {
            quote,
            price_impact,
            dependent_amount,
        })
    }

    async fn push_swap_cost(&self, token: &Address, decimals: u32) {
        let cost = match (&self.swap_cost, self.config.price_based_swap_cost) {
            (Some(estimator), true) => estimator.cost_in_token(token).await,
            _ => None,
        };
        match self.bounded(self.oracle.set_cost_output_token(token, decimals, cost)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to set swap cost for {}: {}", token, e),
            Err(e) => warn!("Failed to set swap cost for {}: {}", token, e),
        }
    }

    /// Convert an amount of a background-wrapped asset into its base asset
    /// so the ratio compares like with like.
    async fn adjusted_amount(&self, amount: Decimal, token: &Address, decimals: u32) -> Result<Decimal, QuoteError> {
        let Some(rate) = self.background_rates.get(token) else {
            return Ok(amount);
        };
        let denormalized = to_base_units(amount, decimals)?;
        let base_amount = self
            .bounded(rate.rate_for(denormalized))
            .await?
            .map_err(|e| QuoteError::RateLookup(e.to_string()))?;
        Ok(to_decimal(base_amount, decimals)?)
    }
}

struct Legs<'a> {
    token_in: &'a Address,
    token_out: &'a Address,
    decimals_in: u32,
    decimals_out: u32,
    direction: SwapDirection,
    amount: Decimal,
}

fn build_quote(legs: &Legs<'_>, amount_in: u128, amount_out: u128, route: &SwapRoute) -> Quote {
    Quote {
        direction: legs.direction,
        token_in: legs.token_in.clone(),
        token_out: legs.token_out.clone(),
        token_in_decimals: legs.decimals_in,
        token_out_decimals: legs.decimals_out,
        amount_in,
        amount_out,
        market_spot_price: route.market_spot_price,
        has_route: route.has_route,
        route_plan: route.plan.clone(),
    }
}
