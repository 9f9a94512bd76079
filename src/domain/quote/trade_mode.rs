//! Wrap / unwrap / swap classification of a token pair

use serde::{Deserialize, Serialize};

use crate::shared::types::Address;

/// Direction of a wrapper conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrapDirection {
    Wrap,
    Unwrap,
}

impl WrapDirection {
    pub fn inverse(self) -> Self {
        match self {
            WrapDirection::Wrap => WrapDirection::Unwrap,
            WrapDirection::Unwrap => WrapDirection::Wrap,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    Wrap,
    Unwrap,
    Swap,
}

impl TradeMode {
    pub fn wrap_direction(self) -> Option<WrapDirection> {
        match self {
            TradeMode::Wrap => Some(WrapDirection::Wrap),
            TradeMode::Unwrap => Some(WrapDirection::Unwrap),
            TradeMode::Swap => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeMode::Wrap => "wrap",
            TradeMode::Unwrap => "unwrap",
            TradeMode::Swap => "swap",
        }
    }
}

/// A base asset and the contract that wraps it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrapperPair {
    pub base: Address,
    pub wrapper: Address,
}

/// Known wrapper pairs of the active network
#[derive(Debug, Clone, Default)]
pub struct WrapperPairs {
    pairs: Vec<WrapperPair>,
}

impl WrapperPairs {
    pub fn new(pairs: Vec<WrapperPair>) -> Self {
        Self { pairs }
    }

    pub fn detect(&self, token_in: Option<&Address>, token_out: Option<&Address>) -> TradeMode {
        let (Some(token_in), Some(token_out)) = (token_in, token_out) else {
            return TradeMode::Swap;
        };
        for pair in &self.pairs {
            if &pair.base == token_in && &pair.wrapper == token_out {
                return TradeMode::Wrap;
            }
            if &pair.wrapper == token_in && &pair.base == token_out {
                return TradeMode::Unwrap;
            }
        }
        TradeMode::Swap
    }

    /// Wrapper contract involved in a wrap-mode trade
    pub fn wrapper_for<'a>(mode: TradeMode, token_in: &'a Address, token_out: &'a Address) -> &'a Address {
        match mode {
            TradeMode::Wrap => token_out,
            TradeMode::Unwrap | TradeMode::Swap => token_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        format!("0x{}", hex::encode([byte; 20])).parse().unwrap()
    }

    #[test]
    fn test_detect_trade_mode() {
        let eth = addr(0xee);
        let weth = addr(0x01);
        let usdc = addr(0x02);
        let pairs = WrapperPairs::new(vec![WrapperPair { base: eth.clone(), wrapper: weth.clone() }]);

        assert_eq!(pairs.detect(Some(&eth), Some(&weth)), TradeMode::Wrap);
        assert_eq!(pairs.detect(Some(&weth), Some(&eth)), TradeMode::Unwrap);
        assert_eq!(pairs.detect(Some(&weth), Some(&usdc)), TradeMode::Swap);
        assert_eq!(pairs.detect(None, Some(&usdc)), TradeMode::Swap);
    }

    #[test]
    fn test_wrapper_for() {
        let eth = addr(0xee);
        let weth = addr(0x01);
        assert_eq!(WrapperPairs::wrapper_for(TradeMode::Wrap, &eth, &weth), &weth);
        assert_eq!(WrapperPairs::wrapper_for(TradeMode::Unwrap, &weth, &eth), &weth);
    }
}
