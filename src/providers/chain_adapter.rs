use async_trait::async_trait;
use serde::Deserialize;

use crate::enums::Chain;
use crate::error::Result;

/// One row of an Etherscan `tokentx`, `txlist` or `txlistinternal` result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmTransfer {
    pub block_number: String,
    pub time_stamp: String,
    pub hash: String,
    pub from: String,
    pub to: String,
    pub value: String,
    #[serde(default)]
    pub contract_address: String,
    #[serde(default)]
    pub token_name: Option<String>,
    #[serde(default)]
    pub token_symbol: Option<String>,
    #[serde(default)]
    pub token_decimal: Option<String>,
    #[serde(default)]
    pub log_index: Option<String>,
    #[serde(default)]
    pub is_error: Option<String>,
    /// Call-tree position of an internal transaction.
    #[serde(default)]
    pub trace_id: Option<String>,
    /// Set by the adapter for rows that move the native coin.
    #[serde(skip)]
    pub native: bool,
}

impl EvmTransfer {
    pub fn block(&self) -> u64 {
        self.block_number.parse().unwrap_or(0)
    }

    /// Identity of the row across overlapping pages.
    pub fn dedup_key(&self) -> (String, String, String) {
        (
            self.hash.clone(),
            self.log_index.clone().unwrap_or_default(),
            self.trace_id.clone().unwrap_or_default(),
        )
    }
}

/// A token movement extracted from a Solana transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolanaTransfer {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    /// None for native SOL moved by the system program.
    pub mint: Option<String>,
    pub native: bool,
    pub source_owner: Option<String>,
    pub destination_owner: Option<String>,
    /// Raw integer amount (lamports for SOL).
    pub raw_amount: String,
    pub decimals: Option<u8>,
}

/// Transfer event in its chain-native shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawTransfer {
    Evm(EvmTransfer),
    Solana(SolanaTransfer),
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Chain this adapter fetches.
    fn chain(&self) -> Chain;

    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Every transfer touching `address`, oldest first. Pagination, throttling
    /// and rate-limit retries happen inside.
    async fn fetch_transfers(&self, address: &str) -> Result<Vec<RawTransfer>>;
}
