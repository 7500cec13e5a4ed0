use futures::future::try_join_all;

use crate::config::Config;
use crate::enums::{ Chain, Criticality };
use crate::error::Result;
use crate::models::TransferRecord;
use crate::rpc::AdapterRegistry;
use crate::services::TransactionNormalizer;

/// One chain to fetch, for one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTarget {
    pub chain: Chain,
    pub address: String,
    pub criticality: Criticality,
}

/// A best-effort chain whose data is missing from the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedChain {
    pub chain: Chain,
    pub reason: String,
}

/// Merged, ordered ledger of one run.
#[derive(Debug, Default)]
pub struct LedgerRun {
    pub records: Vec<TransferRecord>,
    pub skipped: Vec<SkippedChain>,
}

enum ChainOutcome {
    Collected(Vec<TransferRecord>),
    Skipped(SkippedChain),
}

pub struct LedgerService {
    registry: AdapterRegistry,
}

impl LedgerService {
    pub fn new(registry: AdapterRegistry) -> Self {
        Self { registry }
    }

    /// Every configured chain with the address and failure policy that go with it.
    pub fn targets_from_config(config: &Config) -> Vec<ChainTarget> {
        config
            .configured_chains()
            .into_iter()
            .filter_map(|chain| config.chain_configs.get(&chain))
            .map(|c| ChainTarget {
                chain: c.chain,
                address: c.address.clone(),
                criticality: c.criticality,
            })
            .collect()
    }

    /// Fetch and normalize all targets concurrently.
    ///
    /// A required chain's failure is returned as its `ChainFetch` error and
    /// cancels the chains still in flight. A best-effort chain's failure is
    /// logged and listed in `skipped`.
    pub async fn collect(&self, targets: &[ChainTarget]) -> Result<LedgerRun> {
        let outcomes = try_join_all(targets.iter().map(|target| self.collect_chain(target))).await?;

        let mut run = LedgerRun::default();
        for outcome in outcomes {
            match outcome {
                ChainOutcome::Collected(records) => run.records.extend(records),
                ChainOutcome::Skipped(skipped) => run.skipped.push(skipped),
            }
        }

        run.records.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(run)
    }

    async fn collect_chain(&self, target: &ChainTarget) -> Result<ChainOutcome> {
        match self.fetch_chain(target).await {
            Ok(records) => {
                tracing::info!("{}: {} transfers normalized", target.chain, records.len());
                Ok(ChainOutcome::Collected(records))
            }
            Err(e) => {
                let err = e.into_chain_fetch(target.chain);
                match target.criticality {
                    Criticality::Required => Err(err),
                    Criticality::BestEffort => {
                        tracing::warn!("Skipping best-effort chain {}: {}", target.chain, err);
                        Ok(
                            ChainOutcome::Skipped(SkippedChain {
                                chain: target.chain,
                                reason: err.to_string(),
                            })
                        )
                    }
                }
            }
        }
    }

    async fn fetch_chain(&self, target: &ChainTarget) -> Result<Vec<TransferRecord>> {
        let adapter = self.registry.get(target.chain)?;
        tracing::info!("{}: fetching transfers via {}", target.chain, adapter.name());

        let raw = adapter.fetch_transfers(&target.address).await?;
        let normalizer = TransactionNormalizer::new(&target.address);

        raw.iter()
            .map(|transfer| normalizer.normalize(target.chain, transfer))
            .collect()
    }
}
