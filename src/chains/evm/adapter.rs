use std::collections::HashSet;
use std::future::Future;

use async_trait::async_trait;
use serde::Deserialize;

use crate::chains::evm::address::same_address;
use crate::config::ChainConfig;
use crate::enums::Chain;
use crate::error::{ AppError, Result };
use crate::providers::{ ChainAdapter, EvmTransfer, RawTransfer };
use crate::rpc::{ status_error, RetryPolicy, Throttle };

/// Rows requested per page.
const PAGE_SIZE: usize = 1000;
/// Etherscan refuses `page * offset` beyond this.
const RESULT_WINDOW: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    TokenTransfers,
    NativeTransfers,
    /// Native coin moved by contract calls (unwraps, swap payouts, bridges).
    InternalTransfers,
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Action::TokenTransfers => "tokentx",
            Action::NativeTransfers => "txlist",
            Action::InternalTransfers => "txlistinternal",
        }
    }
}

#[derive(Debug, Deserialize)]
struct EtherscanResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: serde_json::Value,
}

/// Etherscan v2 compatible explorer adapter. One instance per EVM chain.
pub struct EvmAdapter {
    client: reqwest::Client,
    config: ChainConfig,
    retry: RetryPolicy,
    throttle: Throttle,
    include_native: bool,
}

impl EvmAdapter {
    pub fn new(
        client: reqwest::Client,
        config: ChainConfig,
        retry: RetryPolicy,
        include_native: bool
    ) -> Self {
        let throttle = Throttle::new(config.min_request_interval);
        Self {
            client,
            config,
            retry,
            throttle,
            include_native,
        }
    }

    async fn fetch_page(
        &self,
        action: Action,
        address: &str,
        start_block: u64,
        page: usize
    ) -> Result<Vec<EvmTransfer>> {
        let label = format!("{} {} page {}", self.config.chain, action.as_str(), page);

        self.retry.run(&label, move || async move {
            self.throttle.wait().await;

            let mut query: Vec<(&str, String)> = vec![
                ("module", "account".to_string()),
                ("action", action.as_str().to_string()),
                ("address", address.to_string()),
                ("startblock", start_block.to_string()),
                ("endblock", "latest".to_string()),
                ("page", page.to_string()),
                ("offset", PAGE_SIZE.to_string()),
                ("sort", "asc".to_string())
            ];
            if let Some(chain_id) = self.config.chain_id {
                query.push(("chainid", chain_id.to_string()));
            }
            if let Some(api_key) = &self.config.api_key {
                query.push(("apikey", api_key.clone()));
            }

            let response = self.client
                .get(&self.config.api_url)
                .query(&query)
                .send().await
                .map_err(|e| AppError::from_reqwest("Explorer request failed", e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(status_error(status, body));
            }

            let body: EtherscanResponse = response
                .json().await
                .map_err(|e| AppError::from_reqwest("Failed to parse explorer response", e))?;

            parse_response(body)
        }).await
    }

    async fn fetch_action(&self, action: Action, address: &str) -> Result<Vec<EvmTransfer>> {
        let rows = paginate(PAGE_SIZE, RESULT_WINDOW, |start_block, page| {
            self.fetch_page(action, address, start_block, page)
        }).await?;

        tracing::debug!("{}: {} {} rows", self.config.chain, rows.len(), action.as_str());

        Ok(match action {
            Action::TokenTransfers => rows,
            Action::NativeTransfers | Action::InternalTransfers =>
                rows
                    .into_iter()
                    .filter(|t| t.is_error.as_deref() != Some("1"))
                    .filter(|t| !t.value.trim_start_matches('0').is_empty())
                    .map(|t| EvmTransfer { native: true, ..t })
                    .collect(),
        })
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain(&self) -> Chain {
        self.config.chain
    }

    fn name(&self) -> &'static str {
        "etherscan"
    }

    async fn fetch_transfers(&self, address: &str) -> Result<Vec<RawTransfer>> {
        let mut rows = self.fetch_action(Action::TokenTransfers, address).await?;
        if self.include_native {
            rows.extend(self.fetch_action(Action::NativeTransfers, address).await?);
            rows.extend(self.fetch_action(Action::InternalTransfers, address).await?);
        }

        // Moving funds to yourself changes nothing.
        rows.retain(|t| !(same_address(&t.from, address) && same_address(&t.to, address)));
        rows.sort_by_key(|t| t.block());

        tracing::info!("{}: fetched {} transfers", self.config.chain, rows.len());

        Ok(rows.into_iter().map(RawTransfer::Evm).collect())
    }
}

/// Interpret an Etherscan envelope.
fn parse_response(body: EtherscanResponse) -> Result<Vec<EvmTransfer>> {
    if body.status == "1" {
        return serde_json
            ::from_value(body.result)
            .map_err(|e| AppError::MalformedPayload(format!("Unexpected explorer rows: {}", e)));
    }

    let detail = match &body.result {
        serde_json::Value::String(s) => s.clone(),
        _ => String::new(),
    };

    if body.message.starts_with("No transactions found") || body.message.starts_with("No records found") {
        return Ok(Vec::new());
    }
    if detail.to_lowercase().contains("rate limit") || body.message.to_lowercase().contains("rate limit") {
        return Err(AppError::RateLimited(detail));
    }

    Err(AppError::Upstream {
        status: 200,
        body: format!("{} {}", body.message, detail).trim().to_string(),
    })
}

/// Walk `page`/`offset` pages; when the explorer's result window is full,
/// restart from the last seen block and skip rows already collected.
async fn paginate<F, Fut>(page_size: usize, result_window: usize, mut fetch: F) -> Result<Vec<EvmTransfer>>
    where F: FnMut(u64, usize) -> Fut, Fut: Future<Output = Result<Vec<EvmTransfer>>>
{
    let mut rows: Vec<EvmTransfer> = Vec::new();
    let mut seen = HashSet::new();
    let mut start_block = 0u64;
    let mut page = 1usize;

    loop {
        let batch = fetch(start_block, page).await?;
        let batch_len = batch.len();
        let mut fresh = 0usize;

        for row in batch {
            if seen.insert(row.dedup_key()) {
                rows.push(row);
                fresh += 1;
            }
        }

        if batch_len < page_size {
            break;
        }
        if fresh == 0 {
            tracing::warn!("Explorer returned a full page with no new rows at block {}, stopping", start_block);
            break;
        }

        if page * page_size >= result_window {
            start_block = rows.last().map(|r| r.block()).unwrap_or(start_block);
            page = 1;
        } else {
            page += 1;
        }
    }

    Ok(rows)
}
