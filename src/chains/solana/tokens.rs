use std::collections::HashMap;
use lazy_static::lazy_static;

#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u8,
}

/// Wrapped SOL mint. Balances in it are SOL, but it is a distinct SPL token.
pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

lazy_static! {
    pub static ref SPL_TOKENS: HashMap<String, TokenInfo> = {
        let mut m = HashMap::new();

        // Solana Top Tokens
        for (symbol, decimals, mint) in [
            ("USDC", 6, "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
            ("USDT", 6, "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB"),
            ("wSOL", 9, WRAPPED_SOL_MINT),
            ("RAY", 6, "4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R"),
            ("ORCA", 6, "orcaEKTdK7LKz57vaAYr9QeNsVEPfiu6QeMU1kektZE"),
            ("BONK", 5, "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263"),
            ("JUP", 6, "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN"),
            ("mSOL", 9, "mSoLzYCxHdYgdzU16g5QSh3i5K3z3KZK7ytfqcJm7So"),
            ("SAMO", 9, "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU"),
        ] {
            m.insert(mint.to_string(), TokenInfo {
                symbol: symbol.to_string(),
                decimals,
            });
        }

        m
    };
}

pub fn get_token_by_mint(mint_address: &str) -> Option<&'static TokenInfo> {
    SPL_TOKENS.get(mint_address)
}
