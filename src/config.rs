use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::time::Duration;
use std::{fs, path::Path};

use crate::domain::quote::{QuoteEngineConfig, WrapperPair, WrapperPairs, HIGH_PRICE_IMPACT_THRESHOLD, MIN_PRICE_IMPACT};
use crate::domain::trade::TradeConfig;
use crate::domain::transactions::{ExplorerLinks, TrackerConfig};
use crate::shared::types::{Address, NetworkId, TokenInfo};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkCfg {
    pub chain_id: NetworkId,
    pub rpc_url: String,
    pub order_book_url: String,
    pub explorer_url: String,
    pub order_explorer_url: String,
    pub request_timeout_ms: u64,
}

impl Default for NetworkCfg {
    fn default() -> Self {
        Self {
            chain_id: 1,
            rpc_url: "https://cloudflare-eth.com".to_string(),
            order_book_url: "https://api.cow.fi/mainnet".to_string(),
            explorer_url: "https://etherscan.io".to_string(),
            order_explorer_url: "https://explorer.cow.fi".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradeCfg {
    pub slippage_tolerance: Decimal,
    pub block_on_high_price_impact: bool,
    pub min_price_impact: Decimal,
    pub high_price_impact_threshold: Decimal,
    pub refresh_interval_secs: u64,
    pub oracle_timeout_ms: u64,
    pub requote_on_refresh: bool,
    pub price_based_swap_cost: bool,
}

impl Default for TradeCfg {
    fn default() -> Self {
        Self {
            slippage_tolerance: dec!(0.01),
            block_on_high_price_impact: false,
            min_price_impact: MIN_PRICE_IMPACT,
            high_price_impact_threshold: HIGH_PRICE_IMPACT_THRESHOLD,
            refresh_interval_secs: 30,
            oracle_timeout_ms: 15_000,
            requote_on_refresh: true,
            price_based_swap_cost: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerCfg {
    pub data_dir: String,
    /// Address recorded as the submitter of new records
    pub account: String,
    pub retention_days: i64,
    pub poll_timeout_ms: u64,
    /// How often `watch` asks for the latest block
    pub block_poll_interval_ms: u64,
}

impl Default for TrackerCfg {
    fn default() -> Self {
        Self {
            data_dir: ".swapdesk".to_string(),
            account: String::new(),
            retention_days: 7,
            poll_timeout_ms: 10_000,
            block_poll_interval_ms: 12_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WrapperCfg {
    pub base: Address,
    pub wrapper: Address,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenCfg {
    pub address: Address,
    pub symbol: String,
    pub decimals: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkCfg,
    pub trade: TradeCfg,
    pub tracker: TrackerCfg,
    pub wrappers: Vec<WrapperCfg>,
    pub tokens: Vec<TokenCfg>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())
            .with_context(|| format!("read {}", path.as_ref().display()))?;
        let cfg: Self = toml::from_str(&s).context("parse Config.toml")?;
        Ok(cfg)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.network.request_timeout_ms)
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            account: self.tracker.account.clone(),
            retention: chrono::Duration::days(self.tracker.retention_days),
            poll_timeout: Duration::from_millis(self.tracker.poll_timeout_ms),
            explorer: ExplorerLinks {
                tx_url: self.network.explorer_url.clone(),
                order_url: self.network.order_explorer_url.clone(),
            },
        }
    }

    pub fn trade_config(&self) -> TradeConfig {
        TradeConfig {
            slippage_tolerance: self.trade.slippage_tolerance,
            block_on_high_price_impact: self.trade.block_on_high_price_impact,
            refresh_interval: Duration::from_secs(self.trade.refresh_interval_secs),
            pool_fetch_timeout: Duration::from_millis(self.trade.oracle_timeout_ms),
            requote_on_refresh: self.trade.requote_on_refresh,
        }
    }

    pub fn quote_engine_config(&self) -> QuoteEngineConfig {
        QuoteEngineConfig {
            min_price_impact: self.trade.min_price_impact,
            high_price_impact_threshold: self.trade.high_price_impact_threshold,
            oracle_timeout: Duration::from_millis(self.trade.oracle_timeout_ms),
            price_based_swap_cost: self.trade.price_based_swap_cost,
        }
    }

    pub fn wrapper_pairs(&self) -> WrapperPairs {
        WrapperPairs::new(
            self.wrappers
                .iter()
                .map(|w| WrapperPair {
                    base: w.base.clone(),
                    wrapper: w.wrapper.clone(),
                })
                .collect(),
        )
    }

    pub fn token_list(&self) -> Vec<TokenInfo> {
        self.tokens
            .iter()
            .map(|t| TokenInfo::new(t.address.clone(), t.symbol.clone(), t.decimals))
            .collect()
    }

    pub fn token(&self, symbol_or_address: &str) -> Option<TokenInfo> {
        self.token_list().into_iter().find(|t| {
            t.symbol.eq_ignore_ascii_case(symbol_or_address)
                || t.address.as_str().eq_ignore_ascii_case(symbol_or_address)
        })
    }
}
