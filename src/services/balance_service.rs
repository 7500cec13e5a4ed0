use std::collections::BTreeMap;

use bigdecimal::BigDecimal;

use crate::models::{ TokenBalance, TokenKey, TransferRecord };

/// Net balances plus the records that could not take part in them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub balances: BTreeMap<TokenKey, TokenBalance>,
    /// Records flagged `unknown_decimals`, in ledger order.
    pub excluded: Vec<TransferRecord>,
}

/// Fold transfers into one net balance per `(chain, token_id)`.
///
/// The result only depends on the multiset of records: sums are exact and
/// the symbol chosen for a key is the smallest one seen, so input order
/// never shows through.
pub fn aggregate(records: &[TransferRecord]) -> Aggregation {
    let mut balances: BTreeMap<TokenKey, TokenBalance> = BTreeMap::new();
    let mut excluded = Vec::new();

    for record in records {
        if !record.is_countable() {
            excluded.push(record.clone());
            continue;
        }

        let balance = balances.entry(record.key()).or_insert_with(|| TokenBalance {
            chain: record.chain,
            token_id: record.token_id.clone(),
            token_symbol: record.token_symbol.clone(),
            net_amount: BigDecimal::from(0),
            unit_price: None,
        });

        balance.net_amount += record.signed_amount();
        if record.token_symbol < balance.token_symbol {
            balance.token_symbol = record.token_symbol.clone();
        }
    }

    excluded.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    Aggregation { balances, excluded }
}

/// Attach resolved unit prices; keys without an entry stay unpriced.
pub fn apply_prices(
    balances: &mut BTreeMap<TokenKey, TokenBalance>,
    prices: &BTreeMap<TokenKey, Option<BigDecimal>>
) {
    for (key, balance) in balances.iter_mut() {
        balance.unit_price = prices.get(key).cloned().flatten();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::{ Chain, Direction };
    use crate::models::{ NormalizationWarning, NATIVE_TOKEN_ID };
    use chrono::{ DateTime, Utc };
    use std::str::FromStr;

    const USDC_ETH: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
    const USDC_ARB: &str = "0xaf88d065e77c8cc2239327c5edb3a432268e5831";

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn record(
        chain: Chain,
        token_id: &str,
        symbol: &str,
        direction: Direction,
        amount: &str,
        secs: i64
    ) -> TransferRecord {
        TransferRecord {
            chain,
            tx_hash: format!("0x{}", secs),
            timestamp: DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
            token_id: token_id.to_string(),
            token_symbol: symbol.to_string(),
            direction,
            amount: dec(amount),
            counterparty: None,
            warning: None,
        }
    }

    fn permutations(items: &[TransferRecord]) -> Vec<Vec<TransferRecord>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head.clone());
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn test_same_symbol_on_different_chains_stays_separate() {
        let records = vec![
            record(Chain::Ethereum, USDC_ETH, "USDC", Direction::In, "100", 1),
            record(Chain::Arbitrum, USDC_ARB, "USDC", Direction::Out, "40", 2),
            record(Chain::Solana, NATIVE_TOKEN_ID, "SOL", Direction::In, "5", 3)
        ];

        let result = aggregate(&records);
        assert_eq!(result.balances.len(), 3);
        assert_eq!(result.balances[&TokenKey::new(Chain::Ethereum, USDC_ETH)].net_amount, dec("100"));
        assert_eq!(result.balances[&TokenKey::new(Chain::Arbitrum, USDC_ARB)].net_amount, dec("-40"));
        assert_eq!(result.balances[&TokenKey::native(Chain::Solana)].net_amount, dec("5"));
    }

    #[test]
    fn test_order_independent_over_all_permutations() {
        let records = vec![
            record(Chain::Ethereum, USDC_ETH, "USDC", Direction::In, "100.5", 1),
            record(Chain::Ethereum, USDC_ETH, "USDC.e", Direction::Out, "0.25", 2),
            record(Chain::Ethereum, NATIVE_TOKEN_ID, "ETH", Direction::In, "0.000000000000000001", 3),
            record(Chain::Polygon, USDC_ETH, "USDC", Direction::In, "7", 4),
            record(Chain::Ethereum, USDC_ETH, "USDC", Direction::Out, "50", 5)
        ];

        let expected = aggregate(&records);
        for permutation in permutations(&records) {
            assert_eq!(aggregate(&permutation), expected);
        }
        assert_eq!(expected.balances[&TokenKey::new(Chain::Ethereum, USDC_ETH)].token_symbol, "USDC");
    }

    #[test]
    fn test_exact_sum_for_18_decimal_amounts() {
        let amounts_in = ["123456789.123456789123456789", "0.000000000000000001", "99999999999.999999999999999999"];
        let amounts_out = ["0.1", "123456789.123456789123456788"];

        let mut records = Vec::new();
        for (i, a) in amounts_in.iter().enumerate() {
            records.push(record(Chain::Ethereum, NATIVE_TOKEN_ID, "ETH", Direction::In, a, i as i64));
        }
        for (i, a) in amounts_out.iter().enumerate() {
            records.push(record(Chain::Ethereum, NATIVE_TOKEN_ID, "ETH", Direction::Out, a, 10 + (i as i64)));
        }

        let sum_in: BigDecimal = amounts_in.iter().map(|a| dec(a)).sum();
        let sum_out: BigDecimal = amounts_out.iter().map(|a| dec(a)).sum();

        let result = aggregate(&records);
        let net = &result.balances[&TokenKey::native(Chain::Ethereum)].net_amount;
        assert_eq!(*net, sum_in - sum_out);
        assert_eq!(*net, dec("99999999999.900000000000000001"));
    }

    #[test]
    fn test_unknown_decimals_are_excluded() {
        let mut flagged = record(Chain::Bsc, "0xdead", "MYST", Direction::In, "123456789", 2);
        flagged.warning = Some(NormalizationWarning::UnknownDecimals);
        let records = vec![flagged.clone(), record(Chain::Bsc, NATIVE_TOKEN_ID, "BNB", Direction::In, "1", 1)];

        let result = aggregate(&records);
        assert_eq!(result.balances.len(), 1);
        assert!(!result.balances.contains_key(&TokenKey::new(Chain::Bsc, "0xdead")));
        assert_eq!(result.excluded, vec![flagged]);
    }

    #[test]
    fn test_apply_prices_leaves_unknown_blank() {
        let records = vec![
            record(Chain::Ethereum, USDC_ETH, "USDC", Direction::In, "100", 1),
            record(Chain::Solana, NATIVE_TOKEN_ID, "SOL", Direction::In, "5", 2)
        ];
        let mut balances = aggregate(&records).balances;
        let mut prices = BTreeMap::new();
        prices.insert(TokenKey::new(Chain::Ethereum, USDC_ETH), Some(dec("1.0001")));
        prices.insert(TokenKey::native(Chain::Solana), None);

        apply_prices(&mut balances, &prices);

        assert_eq!(balances[&TokenKey::new(Chain::Ethereum, USDC_ETH)].value(), Some(dec("100.01")));
        assert_eq!(balances[&TokenKey::native(Chain::Solana)].unit_price, None);
        assert_eq!(balances[&TokenKey::native(Chain::Solana)].value(), None);
    }

    #[test]
    fn test_empty_input() {
        let result = aggregate(&[]);
        assert!(result.balances.is_empty());
        assert!(result.excluded.is_empty());
    }
}
