use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Chain {
    #[default]
    Ethereum,
    Arbitrum,
    Base,
    Bsc,
}

/// Addresses of the canonical Uniswap V3 periphery on a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniswapV3Deployment {
    pub factory: Address,
    pub position_manager: Address,
    pub swap_router: Address,
}

const UNISWAP_V3_CANONICAL: UniswapV3Deployment = UniswapV3Deployment {
    factory: address!("1F98431c8aD98523631AE4a59f267346ea31F984"),
    position_manager: address!("C36442b4a4522E871399CD717aBDD847Ab11FE88"),
    swap_router: address!("E592427A0AEce92De3Edee1F18E0157C05861564"),
};

impl Chain {
    pub fn id(&self) -> u64 {
        match self {
            Chain::Ethereum => 1,
            Chain::Arbitrum => 42161,
            Chain::Base => 8453,
            Chain::Bsc => 56,
        }
    }

    /// Symbol of the native currency.
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Bsc => "BNB",
            _ => "ETH",
        }
    }

    /// Symbol of the wrapped native token.
    pub fn wrapped_native_symbol(&self) -> &'static str {
        match self {
            Chain::Bsc => "WBNB",
            _ => "WETH",
        }
    }

    /// Returns the wrapped native token address for the chain.
    pub fn wrapped_native(&self) -> Address {
        match self {
            Chain::Ethereum => address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            Chain::Arbitrum => address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1"),
            Chain::Base => address!("4200000000000000000000000000000000000006"),
            Chain::Bsc => address!("bb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"),
        }
    }

    /// Returns the Uniswap V3 factory, position manager and router, if the canonical
    /// deployment exists on this chain.
    pub fn uniswap_v3(&self) -> Option<UniswapV3Deployment> {
        match self {
            Chain::Ethereum | Chain::Arbitrum => Some(UNISWAP_V3_CANONICAL),
            // Base and BSC use non canonical addresses, they have to be configured explicitly.
            Chain::Base | Chain::Bsc => None,
        }
    }
}
