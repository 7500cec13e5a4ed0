use std::collections::HashSet;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{ json, Value };

use crate::chains::solana::parser::{ decode_transaction, parse_transaction };
use crate::config::ChainConfig;
use crate::enums::Chain;
use crate::error::{ AppError, Result };
use crate::providers::{ ChainAdapter, RawTransfer };
use crate::rpc::{ status_error, RetryPolicy, Throttle };

/// Largest page `getSignaturesForAddress` serves.
const SIGNATURE_PAGE_LIMIT: usize = 1000;

/// SPL Token and Token-2022 program ids.
const TOKEN_PROGRAMS: [&str; 2] = [
    "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
    "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb",
];

// ── JSON-RPC envelope ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl<T> RpcResponse<T> {
    fn into_result(self, method: &str) -> Result<Option<T>> {
        match self.error {
            Some(err) => Err(rpc_error(method, err)),
            None => Ok(self.result),
        }
    }
}

fn rpc_error(method: &str, err: RpcError) -> AppError {
    match err.code {
        429 | -32005 => AppError::RateLimited(format!("{}: {}", method, err.message)),
        // Internal node errors are usually transient.
        -32603 => AppError::Upstream { status: 500, body: format!("{}: {}", method, err.message) },
        code =>
            AppError::Upstream {
                status: 400,
                body: format!("{} failed with code {}: {}", method, code, err.message),
            },
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureInfo {
    signature: String,
    slot: u64,
    #[serde(default)]
    err: Option<Value>,
}

/// `getTokenAccountsByOwner` wraps its list in an rpc context.
#[derive(Debug, Deserialize)]
struct ContextValue<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct KeyedAccount {
    pubkey: String,
}

/// Solana JSON-RPC adapter.
pub struct SolanaAdapter {
    client: reqwest::Client,
    config: ChainConfig,
    retry: RetryPolicy,
    throttle: Throttle,
    signature_limit: Option<usize>,
}

impl SolanaAdapter {
    pub fn new(
        client: reqwest::Client,
        config: ChainConfig,
        retry: RetryPolicy,
        signature_limit: Option<usize>
    ) -> Self {
        let throttle = Throttle::new(config.min_request_interval);
        Self {
            client,
            config,
            retry,
            throttle,
            signature_limit,
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });
        let request = &request;

        self.retry.run(method, move || async move {
            self.throttle.wait().await;

            let response = self.client
                .post(&self.config.api_url)
                .json(request)
                .send().await
                .map_err(|e| AppError::from_reqwest("Solana RPC request failed", e))?;

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(status_error(status, text));
            }

            let rpc_resp: RpcResponse<T> = response
                .json().await
                .map_err(|e| AppError::from_reqwest("Failed to parse Solana RPC response", e))?;

            rpc_resp.into_result(method)
        }).await
    }

    /// Successful signatures for `address`, oldest first.
    async fn signatures(&self, address: &str) -> Result<Vec<SignatureInfo>> {
        let mut all: Vec<SignatureInfo> = Vec::new();
        let mut before: Option<String> = None;

        loop {
            let limit = page_limit(self.signature_limit, all.len());
            if limit == 0 {
                break;
            }

            let mut options = json!({ "limit": limit, "commitment": "finalized" });
            if let Some(before) = &before {
                options["before"] = json!(before);
            }

            let page: Vec<SignatureInfo> = self
                .call("getSignaturesForAddress", json!([address, options])).await?
                .unwrap_or_default();
            let page_len = page.len();
            tracing::debug!("solana: {} signatures before {:?}", page_len, before);

            before = page.last().map(|s| s.signature.clone());
            all.extend(page);

            if page_len < limit {
                break;
            }
        }

        let total = all.len();
        all.retain(|s| s.err.is_none());
        if all.len() < total {
            tracing::debug!("solana: skipped {} failed transactions", total - all.len());
        }

        all.reverse();
        Ok(all)
    }

    /// Token accounts currently owned by `owner`, across both token programs.
    /// Transfers into an existing token account never list the owner's key,
    /// so their signatures are only found through the account itself.
    async fn token_accounts(&self, owner: &str) -> Result<Vec<String>> {
        let mut accounts = Vec::new();
        for program in TOKEN_PROGRAMS {
            let params = json!([
                owner,
                { "programId": program },
                { "encoding": "base64", "dataSlice": { "offset": 0, "length": 0 }, "commitment": "finalized" }
            ]);
            let listed: Option<ContextValue<Vec<KeyedAccount>>> = self.call("getTokenAccountsByOwner", params).await?;
            accounts.extend(
                listed
                    .map(|l| l.value)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|a| a.pubkey)
            );
        }
        Ok(accounts)
    }

    async fn block_time(&self, slot: u64) -> Result<Option<i64>> {
        self.call("getBlockTime", json!([slot])).await
    }
}

/// One list of signatures across several addresses: duplicates dropped,
/// oldest slot first.
fn merge_signatures(lists: Vec<Vec<SignatureInfo>>) -> Vec<SignatureInfo> {
    let mut seen = HashSet::new();
    let mut merged: Vec<SignatureInfo> = lists
        .into_iter()
        .flatten()
        .filter(|s| seen.insert(s.signature.clone()))
        .collect();
    merged.sort_by_key(|s| s.slot);
    merged
}

/// Size of the next signature page given an optional overall cap.
fn page_limit(cap: Option<usize>, fetched: usize) -> usize {
    match cap {
        Some(max) => max.saturating_sub(fetched).min(SIGNATURE_PAGE_LIMIT),
        None => SIGNATURE_PAGE_LIMIT,
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn chain(&self) -> Chain {
        self.config.chain
    }

    fn name(&self) -> &'static str {
        "solana-rpc"
    }

    async fn fetch_transfers(&self, address: &str) -> Result<Vec<RawTransfer>> {
        let accounts = self.token_accounts(address).await?;
        tracing::debug!("solana: {} token accounts owned by {}", accounts.len(), address);

        let mut lists = vec![self.signatures(address).await?];
        for account in &accounts {
            lists.push(self.signatures(account).await?);
        }
        let signatures = merge_signatures(lists);
        tracing::info!("solana: replaying {} transactions", signatures.len());

        let mut transfers = Vec::new();

        for info in &signatures {
            let options = json!({
                "encoding": "jsonParsed",
                "maxSupportedTransactionVersion": 0,
                "commitment": "finalized"
            });
            let payload: Option<Value> = self.call(
                "getTransaction",
                json!([info.signature, options])
            ).await?;

            let payload = match payload {
                Some(p) => p,
                None => {
                    tracing::warn!("solana: transaction {} (slot {}) not found, skipping", info.signature, info.slot);
                    continue;
                }
            };

            let mut tx = decode_transaction(payload)?;
            if tx.block_time.is_none() {
                tx.block_time = self.block_time(tx.slot).await?;
            }

            transfers.extend(parse_transaction(address, &tx)?.into_iter().map(RawTransfer::Solana));
        }

        tracing::info!("solana: fetched {} transfers", transfers.len());

        Ok(transfers)
    }
}
