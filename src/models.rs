use std::fmt;

use bigdecimal::BigDecimal;
use chrono::{ DateTime, Utc };
use serde::Serialize;

use crate::enums::{ Chain, Direction };

/// Token id used for a chain's native coin.
pub const NATIVE_TOKEN_ID: &str = "native";

/// Non-fatal problem found while normalizing a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum NormalizationWarning {
    /// Decimals could not be resolved; `amount` holds the unscaled raw integer.
    UnknownDecimals,
}

impl NormalizationWarning {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationWarning::UnknownDecimals => "unknown_decimals",
        }
    }
}

impl fmt::Display for NormalizationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized transfer event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub chain: Chain,
    pub tx_hash: String,
    pub timestamp: DateTime<Utc>,
    pub token_id: String,
    pub token_symbol: String,
    pub direction: Direction,
    /// Always non-negative; the sign lives in `direction`.
    pub amount: BigDecimal,
    pub counterparty: Option<String>,
    pub warning: Option<NormalizationWarning>,
}

impl TransferRecord {
    pub fn key(&self) -> TokenKey {
        TokenKey::new(self.chain, &self.token_id)
    }

    /// Whether the record may take part in balance math.
    pub fn is_countable(&self) -> bool {
        self.warning.is_none()
    }

    /// Amount with the direction applied.
    pub fn signed_amount(&self) -> BigDecimal {
        match self.direction {
            Direction::In => self.amount.clone(),
            Direction::Out => -self.amount.clone(),
        }
    }

    /// Ledger ordering: time first, then identifiers so ties are stable.
    pub fn sort_key(&self) -> (DateTime<Utc>, Chain, &str, &str, Direction) {
        (self.timestamp, self.chain, &self.tx_hash, &self.token_id, self.direction)
    }
}

/// Chain-scoped token identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenKey {
    pub chain: Chain,
    pub token_id: String,
}

impl TokenKey {
    pub fn new(chain: Chain, token_id: &str) -> Self {
        Self {
            chain,
            token_id: token_id.to_string(),
        }
    }

    pub fn native(chain: Chain) -> Self {
        Self::new(chain, NATIVE_TOKEN_ID)
    }

    pub fn is_native(&self) -> bool {
        self.token_id == NATIVE_TOKEN_ID
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.token_id)
    }
}

/// Net holding of one token on one chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub chain: Chain,
    pub token_id: String,
    pub token_symbol: String,
    pub net_amount: BigDecimal,
    pub unit_price: Option<BigDecimal>,
}

impl TokenBalance {
    pub fn key(&self) -> TokenKey {
        TokenKey::new(self.chain, &self.token_id)
    }

    /// Fiat value, or None when the price is unresolved.
    pub fn value(&self) -> Option<BigDecimal> {
        self.unit_price.as_ref().map(|price| &self.net_amount * price)
    }
}

/// Render a decimal in plain notation without trailing zeros.
pub fn format_decimal(value: &BigDecimal) -> String {
    value.normalized().to_plain_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_value_is_absent_without_price() {
        let balance = TokenBalance {
            chain: Chain::Ethereum,
            token_id: "0xabc".to_string(),
            token_symbol: "ABC".to_string(),
            net_amount: dec("12.5"),
            unit_price: None,
        };
        assert_eq!(balance.value(), None);

        let priced = TokenBalance { unit_price: Some(dec("2")), ..balance };
        assert_eq!(priced.value(), Some(dec("25")));
    }

    #[test]
    fn test_format_decimal_trims_without_exponent() {
        assert_eq!(format_decimal(&dec("100.000000")), "100");
        assert_eq!(format_decimal(&dec("0.000000000000000001")), "0.000000000000000001");
        assert_eq!(format_decimal(&dec("-40.50")), "-40.5");
        assert_eq!(format_decimal(&dec("0.0")), "0");
    }
}
