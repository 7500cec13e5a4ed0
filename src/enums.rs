use std::fmt;
use std::str::FromStr;

use serde::{ Deserialize, Serialize };

use crate::error::AppError;

// ─── Chain ───────────────────────────────────────────────────────────

/// Supported blockchain networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Chain {
    Ethereum,
    Arbitrum,
    Polygon,
    Bsc,
    Avalanche,
    Optimism,
    Base,
    Solana,
}

/// Transfer-retrieval API family a chain belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainFamily {
    Evm,
    Solana,
}

impl Chain {
    /// Canonical lowercase identifier used in reports and env vars.
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Arbitrum => "arbitrum",
            Chain::Polygon => "polygon",
            Chain::Bsc => "bsc",
            Chain::Avalanche => "avalanche",
            Chain::Optimism => "optimism",
            Chain::Base => "base",
            Chain::Solana => "solana",
        }
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            Chain::Solana => ChainFamily::Solana,
            _ => ChainFamily::Evm,
        }
    }

    /// Native token symbol for the chain.
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ETH",
            Chain::Arbitrum => "ETH",
            Chain::Polygon => "POL",
            Chain::Bsc => "BNB",
            Chain::Avalanche => "AVAX",
            Chain::Optimism => "ETH",
            Chain::Base => "ETH",
            Chain::Solana => "SOL",
        }
    }

    pub fn native_decimals(&self) -> u32 {
        match self.family() {
            ChainFamily::Evm => 18,
            ChainFamily::Solana => 9,
        }
    }

    /// Etherscan v2 `chainid` parameter. None for non-EVM chains.
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Chain::Ethereum => Some(1),
            Chain::Arbitrum => Some(42161),
            Chain::Polygon => Some(137),
            Chain::Bsc => Some(56),
            Chain::Avalanche => Some(43114),
            Chain::Optimism => Some(10),
            Chain::Base => Some(8453),
            Chain::Solana => None,
        }
    }

    /// CoinGecko asset platform id for `/simple/token_price/{platform}`.
    pub fn coingecko_platform(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Arbitrum => "arbitrum-one",
            Chain::Polygon => "polygon-pos",
            Chain::Bsc => "binance-smart-chain",
            Chain::Avalanche => "avalanche",
            Chain::Optimism => "optimistic-ethereum",
            Chain::Base => "base",
            Chain::Solana => "solana",
        }
    }

    /// CoinGecko coin id of the native currency, for `/simple/price`.
    pub fn coingecko_native_id(&self) -> &'static str {
        match self {
            Chain::Ethereum | Chain::Arbitrum | Chain::Optimism | Chain::Base => "ethereum",
            Chain::Polygon => "polygon-ecosystem-token",
            Chain::Bsc => "binancecoin",
            Chain::Avalanche => "avalanche-2",
            Chain::Solana => "solana",
        }
    }

    /// Default minimum spacing between two requests to this chain's API.
    pub fn default_min_interval_ms(&self) -> u64 {
        match self.family() {
            // Free Etherscan keys allow ~5 req/s, shared by every EVM chain.
            ChainFamily::Evm => 350,
            ChainFamily::Solana => 150,
        }
    }

    pub fn all() -> &'static [Chain] {
        &[
            Chain::Ethereum,
            Chain::Arbitrum,
            Chain::Polygon,
            Chain::Bsc,
            Chain::Avalanche,
            Chain::Optimism,
            Chain::Base,
            Chain::Solana,
        ]
    }

    /// Only EVM chains.
    pub fn all_evm() -> &'static [Chain] {
        &[
            Chain::Ethereum,
            Chain::Arbitrum,
            Chain::Polygon,
            Chain::Bsc,
            Chain::Avalanche,
            Chain::Optimism,
            Chain::Base,
        ]
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "arbitrum" | "arb" => Ok(Chain::Arbitrum),
            "polygon" | "matic" | "pol" => Ok(Chain::Polygon),
            "bsc" | "bnb" => Ok(Chain::Bsc),
            "avalanche" | "avax" => Ok(Chain::Avalanche),
            "optimism" | "op" => Ok(Chain::Optimism),
            "base" => Ok(Chain::Base),
            "solana" | "sol" => Ok(Chain::Solana),
            _ => Err(AppError::InvalidInput(format!(
                "Unsupported chain: {}. Supported: ethereum, arbitrum, polygon, bsc, avalanche, optimism, base, solana",
                s
            ))),
        }
    }
}

// ─── Direction ──────────────────────────────────────────────────────

/// Direction of a transfer relative to the tracked address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Criticality ────────────────────────────────────────────────────

/// What a chain's fetch failure does to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Criticality {
    /// Failure aborts the whole run.
    Required,
    /// Failure drops the chain's data and the run continues.
    BestEffort,
}
