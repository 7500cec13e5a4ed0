use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use chrono::{ DateTime, Utc };

use crate::chains::evm::{ same_address, tokens as evm_tokens };
use crate::chains::solana::tokens as spl_tokens;
use crate::enums::{ Chain, Direction };
use crate::error::{ AppError, Result };
use crate::models::{ NormalizationWarning, TransferRecord, NATIVE_TOKEN_ID };
use crate::providers::{ EvmTransfer, RawTransfer, SolanaTransfer };

/// Turns chain-native transfer payloads into `TransferRecord`s for one
/// tracked address.
pub struct TransactionNormalizer {
    address: String,
}

impl TransactionNormalizer {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
        }
    }

    pub fn normalize(&self, chain: Chain, raw: &RawTransfer) -> Result<TransferRecord> {
        let record = match raw {
            RawTransfer::Evm(t) => self.normalize_evm(chain, t)?,
            RawTransfer::Solana(t) => self.normalize_solana(chain, t)?,
        };

        if record.warning == Some(NormalizationWarning::UnknownDecimals) {
            tracing::warn!(
                "{}: unknown decimals for token {} in {}, keeping raw amount",
                chain,
                record.token_id,
                record.tx_hash
            );
        }

        Ok(record)
    }

    fn normalize_evm(&self, chain: Chain, t: &EvmTransfer) -> Result<TransferRecord> {
        let seconds: i64 = t.time_stamp
            .trim()
            .parse()
            .map_err(|_| AppError::MalformedPayload(format!("{}: bad timestamp '{}'", t.hash, t.time_stamp)))?;
        let timestamp = timestamp_from_secs(&t.hash, seconds)?;
        let raw = parse_raw_amount(&t.hash, &t.value)?;

        let (token_id, token_symbol, decimals) = if t.native {
            (NATIVE_TOKEN_ID.to_string(), chain.native_symbol().to_string(), Some(chain.native_decimals()))
        } else {
            let token_id = t.contract_address.to_lowercase();
            let known = evm_tokens::get_token_by_address(chain, &token_id);
            let decimals = t.token_decimal
                .as_deref()
                .and_then(|d| d.trim().parse::<u32>().ok())
                .or_else(|| known.map(|k| u32::from(k.decimals)));
            let symbol = non_empty(t.token_symbol.as_deref())
                .map(str::to_string)
                .or_else(|| known.map(|k| k.symbol.clone()))
                .unwrap_or_else(|| token_id.clone());
            (token_id, symbol, decimals)
        };

        let (direction, counterparty) = if same_address(&t.to, &self.address) {
            (Direction::In, &t.from)
        } else {
            (Direction::Out, &t.to)
        };

        let (amount, warning) = scale(raw, decimals);

        Ok(TransferRecord {
            chain,
            tx_hash: t.hash.clone(),
            timestamp,
            token_id,
            token_symbol,
            direction,
            amount,
            counterparty: non_empty(Some(counterparty.as_str())).map(str::to_lowercase),
            warning,
        })
    }

    fn normalize_solana(&self, chain: Chain, t: &SolanaTransfer) -> Result<TransferRecord> {
        let seconds = t.block_time.ok_or_else(||
            AppError::MalformedPayload(format!("{}: no block time for slot {}", t.signature, t.slot))
        )?;
        let timestamp = timestamp_from_secs(&t.signature, seconds)?;
        let raw = parse_raw_amount(&t.signature, &t.raw_amount)?;

        let (token_id, token_symbol, decimals) = match (&t.mint, t.native) {
            (Some(mint), false) => {
                let known = spl_tokens::get_token_by_mint(mint);
                let decimals = t.decimals
                    .map(u32::from)
                    .or_else(|| known.map(|k| u32::from(k.decimals)));
                let symbol = known.map(|k| k.symbol.clone()).unwrap_or_else(|| mint.clone());
                (mint.clone(), symbol, decimals)
            }
            _ => (NATIVE_TOKEN_ID.to_string(), chain.native_symbol().to_string(), Some(chain.native_decimals())),
        };

        // Owners are base58 and case-sensitive.
        let (direction, counterparty) = if t.destination_owner.as_deref() == Some(self.address.as_str()) {
            (Direction::In, t.source_owner.clone())
        } else {
            (Direction::Out, t.destination_owner.clone())
        };

        let (amount, warning) = scale(raw, decimals);

        Ok(TransferRecord {
            chain,
            tx_hash: t.signature.clone(),
            timestamp,
            token_id,
            token_symbol,
            direction,
            amount,
            counterparty,
            warning,
        })
    }
}

/// Parse a raw on-chain integer amount; negatives and fractions are rejected.
fn parse_raw_amount(tx: &str, text: &str) -> Result<BigInt> {
    let malformed = || AppError::MalformedPayload(format!("{}: amount '{}' is not a non-negative integer", tx, text));
    let digits = text.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    digits.parse::<BigInt>().map_err(|_| malformed())
}

fn timestamp_from_secs(tx: &str, seconds: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0).ok_or_else(||
        AppError::MalformedPayload(format!("{}: timestamp {} out of range", tx, seconds))
    )
}

fn scale(raw: BigInt, decimals: Option<u32>) -> (BigDecimal, Option<NormalizationWarning>) {
    match decimals {
        Some(decimals) => (BigDecimal::new(raw, i64::from(decimals)), None),
        None => (BigDecimal::new(raw, 0), Some(NormalizationWarning::UnknownDecimals)),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
