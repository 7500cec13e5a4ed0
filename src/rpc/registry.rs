use std::collections::HashMap;
use std::sync::Arc;

use crate::chains::{ evm::EvmAdapter, solana::SolanaAdapter };
use crate::config::Config;
use crate::enums::{ Chain, ChainFamily };
use crate::error::{ AppError, Result };
use crate::providers::ChainAdapter;

/// Lookup table from chain identifier to the adapter that fetches it.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Chain, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One adapter per configured chain, all sharing one HTTP client.
    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        let mut registry = Self::new();

        for chain in config.configured_chains() {
            let chain_config = &config.chain_configs[&chain];
            let adapter: Arc<dyn ChainAdapter> = match chain.family() {
                ChainFamily::Evm =>
                    Arc::new(
                        EvmAdapter::new(
                            client.clone(),
                            chain_config.clone(),
                            config.retry,
                            config.include_native_transfers
                        )
                    ),
                ChainFamily::Solana =>
                    Arc::new(
                        SolanaAdapter::new(
                            client.clone(),
                            chain_config.clone(),
                            config.retry,
                            config.solana_signature_limit
                        )
                    ),
            };
            tracing::debug!("Registered {} adapter for {}", adapter.name(), chain);
            registry.register(adapter);
        }

        registry
    }

    /// Add or replace the adapter for the adapter's chain.
    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(adapter.chain(), adapter);
    }

    pub fn get(&self, chain: Chain) -> Result<Arc<dyn ChainAdapter>> {
        self.adapters
            .get(&chain)
            .cloned()
            .ok_or_else(|| AppError::InvalidInput(format!("No adapter registered for {}", chain)))
    }

    pub fn chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.adapters.keys().copied().collect();
        chains.sort();
        chains
    }
}
