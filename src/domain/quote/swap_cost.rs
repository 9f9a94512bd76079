//! Swap cost in output-token terms, fed to the routing oracle so it can weigh
//! extra hops against gas.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::math::to_decimal;
use crate::shared::errors::OracleError;
use crate::shared::types::Address;

/// Gas units charged for a typical swap
pub const DEFAULT_SWAP_COST_GAS: u64 = 100_000;

/// Addresses requested from the price source per page
pub const PRICE_PAGE_SIZE: usize = 1000;

/// Fiat prices for a set of tokens
pub type TokenPrices = HashMap<Address, Decimal>;

/// Source of token prices, e.g. a market data API
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn get_prices(&self, addresses: &[Address]) -> Result<TokenPrices, OracleError>;
}

/// Fetches prices page by page. Pages are requested sequentially with a pause
/// in between to stay under the source's rate limit.
pub struct TokenPriceService<S: PriceSource> {
    source: S,
    page_size: usize,
    page_delay: Duration,
}

impl<S: PriceSource> TokenPriceService<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            page_size: PRICE_PAGE_SIZE,
            page_delay: Duration::from_secs(1),
        }
    }

    pub fn with_paging(source: S, page_size: usize, page_delay: Duration) -> Self {
        Self {
            source,
            page_size: page_size.max(1),
            page_delay,
        }
    }

    pub async fn fetch(&self, addresses: &[Address]) -> Result<TokenPrices, OracleError> {
        let mut prices = TokenPrices::new();
        for (page, chunk) in addresses.chunks(self.page_size).enumerate() {
            if page != 0 {
                tokio::time::sleep(self.page_delay).await;
            }
            info!("Fetching {} prices", chunk.len());
            prices.extend(self.source.get_prices(chunk).await?);
        }
        Ok(prices)
    }
}

#[derive(Debug, Default)]
struct MarketData {
    gas_price_wei: u128,
    prices: TokenPrices,
}

/// Estimates swap cost from stored gas price and token prices
pub struct SwapCostEstimator {
    native_asset: Address,
    swap_cost_gas: u64,
    market: RwLock<MarketData>,
}

impl SwapCostEstimator {
    pub fn new(native_asset: Address, swap_cost_gas: u64) -> Self {
        Self {
            native_asset,
            swap_cost_gas,
            market: RwLock::new(MarketData::default()),
        }
    }

    pub async fn set_gas_price(&self, gas_price_wei: u128) {
        self.market.write().await.gas_price_wei = gas_price_wei;
    }

    pub async fn update_prices(&self, prices: TokenPrices) {
        self.market.write().await.prices.extend(prices);
    }

    /// Pull prices for `tokens` and the native asset from `service`. Returns
    /// how many prices were stored.
    pub async fn refresh_prices<S: PriceSource>(
        &self,
        service: &TokenPriceService<S>,
        tokens: &[Address],
    ) -> Result<usize, OracleError> {
        let mut addresses = tokens.to_vec();
        if !addresses.contains(&self.native_asset) {
            addresses.push(self.native_asset.clone());
        }
        let prices = service.fetch(&addresses).await?;
        let fetched = prices.len();
        self.update_prices(prices).await;
        Ok(fetched)
    }

    /// `gasPrice * swapCostGas * (nativePrice / tokenPrice)`, or `None` when a
    /// price is missing.
    pub async fn cost_in_token(&self, token: &Address) -> Option<Decimal> {
        let market = self.market.read().await;
        let native_price = *market.prices.get(&self.native_asset)?;
        let token_price = *market.prices.get(token)?;
        if token_price.is_zero() {
            return None;
        }
        let gas_price = to_decimal(market.gas_price_wei, 18).ok()?;
        let native_in_token = native_price.checked_div(token_price)?;
        let cost = gas_price
            .checked_mul(Decimal::from(self.swap_cost_gas))?
            .checked_mul(native_in_token)?;
        debug!("Swap cost for {}: {}", token, cost);
        Some(cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn addr(byte: u8) -> Address {
        format!("0x{}", hex::encode([byte; 20])).parse().unwrap()
    }

    struct CountingSource {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PriceSource for CountingSource {
        async fn get_prices(&self, addresses: &[Address]) -> Result<TokenPrices, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(addresses.iter().map(|a| (a.clone(), dec!(1))).collect())
        }
    }

    #[tokio::test]
    async fn test_prices_are_paginated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = TokenPriceService::with_paging(
            CountingSource { calls: calls.clone() },
            2,
            Duration::from_millis(1),
        );
        let addresses: Vec<Address> = (1..=5).map(addr).collect();

        let prices = service.fetch(&addresses).await.unwrap();
        assert_eq!(prices.len(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_swap_cost_in_token() {
        let native = addr(0xee);
        let usdc = addr(0x02);
        let estimator = SwapCostEstimator::new(native.clone(), DEFAULT_SWAP_COST_GAS);
        // 100 gwei
        estimator.set_gas_price(100_000_000_000).await;
        estimator
            .update_prices([(native, dec!(2000)), (usdc.clone(), dec!(1))].into_iter().collect())
            .await;

        // 1e-7 * 100_000 * 2000 = 20 USDC
        assert_eq!(estimator.cost_in_token(&usdc).await, Some(dec!(20)));
        assert_eq!(estimator.cost_in_token(&addr(0x03)).await, None);
    }

    struct FixedSource(TokenPrices);

    #[async_trait]
    impl PriceSource for FixedSource {
        async fn get_prices(&self, addresses: &[Address]) -> Result<TokenPrices, OracleError> {
            Ok(addresses
                .iter()
                .filter_map(|a| self.0.get(a).map(|p| (a.clone(), *p)))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_refresh_prices_feeds_estimator() {
        let native = addr(0xee);
        let usdc = addr(0x02);
        let service = TokenPriceService::new(FixedSource(
            [(native.clone(), dec!(2000)), (usdc.clone(), dec!(1))].into_iter().collect(),
        ));
        let estimator = SwapCostEstimator::new(native, DEFAULT_SWAP_COST_GAS);
        estimator.set_gas_price(100_000_000_000).await;

        let stored = estimator.refresh_prices(&service, &[usdc.clone()]).await.unwrap();

        assert_eq!(stored, 2);
        assert_eq!(estimator.cost_in_token(&usdc).await, Some(dec!(20)));
    }
}
