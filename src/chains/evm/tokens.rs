use std::collections::HashMap;
use lazy_static::lazy_static;

use crate::enums::Chain;

#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u8,
    pub address: String,
}

fn token(symbol: &str, decimals: u8, address: &str) -> TokenInfo {
    TokenInfo {
        symbol: symbol.to_string(),
        decimals,
        address: address.to_lowercase(),
    }
}

lazy_static! {
    /// Well-known ERC-20 contracts, used when an explorer row lacks metadata.
    pub static ref ERC20_TOKENS: HashMap<Chain, Vec<TokenInfo>> = {
        let mut m = HashMap::new();

        m.insert(Chain::Ethereum, vec![
            token("USDT", 6, "0xdAC17F958D2ee523a2206206994597C13D831ec7"),
            token("USDC", 6, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
            token("WETH", 18, "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
            token("DAI", 18, "0x6B175474E89094C44Da98b954EedeAC495271d0F"),
            token("WBTC", 8, "0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"),
            token("LINK", 18, "0x514910771AF9Ca656af840dff83E8264EcF986CA"),
            token("UNI", 18, "0x1f9840a85d5aF5bf1D1762F925BDADdC4201F984"),
        ]);
        m.insert(Chain::Arbitrum, vec![
            token("USDC", 6, "0xaf88d065e77c8cC2239327C5EDb3A432268e5831"),
            token("USDT", 6, "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"),
            token("WETH", 18, "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1"),
            token("ARB", 18, "0x912CE59144191C1204E64559FE8253a0e49E6548"),
        ]);
        m.insert(Chain::Polygon, vec![
            token("USDC", 6, "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"),
            token("USDC.e", 6, "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174"),
            token("USDT", 6, "0xc2132D05D31c914a87C6611C10748AEb04B58e8F"),
            token("WETH", 18, "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619"),
        ]);
        m.insert(Chain::Bsc, vec![
            token("USDT", 18, "0x55d398326f99059fF775485246999027B3197955"),
            token("USDC", 18, "0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d"),
            token("WBNB", 18, "0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"),
        ]);
        m.insert(Chain::Avalanche, vec![
            token("USDC", 6, "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"),
            token("USDT", 6, "0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7"),
            token("WAVAX", 18, "0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7"),
        ]);
        m.insert(Chain::Optimism, vec![
            token("USDC", 6, "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85"),
            token("OP", 18, "0x4200000000000000000000000000000000000042"),
        ]);
        m.insert(Chain::Base, vec![
            token("USDC", 6, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
        ]);

        m
    };
}

pub fn get_token_by_address(chain: Chain, address: &str) -> Option<&'static TokenInfo> {
    let address_lower = address.to_lowercase();
    ERC20_TOKENS.get(&chain)?.iter().find(|t| t.address == address_lower)
}
