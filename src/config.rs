use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use bigdecimal::BigDecimal;

use crate::chains::{ evm, solana };
use crate::enums::{ Chain, ChainFamily, Criticality };
use crate::error::{ AppError, Result };
use crate::rpc::RetryPolicy;

pub const DEFAULT_EXPLORER_API_URL: &str = "https://api.etherscan.io/v2/api";
pub const DEFAULT_SOLANA_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
pub const COINGECKO_DEMO_API_URL: &str = "https://api.coingecko.com/api/v3";
pub const COINGECKO_PRO_API_URL: &str = "https://pro-api.coingecko.com/api/v3";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinGeckoTier {
    Demo,
    Pro,
}

impl CoinGeckoTier {
    /// Header carrying the API key for this tier.
    pub fn key_header(&self) -> &'static str {
        match self {
            CoinGeckoTier::Demo => "x-cg-demo-api-key",
            CoinGeckoTier::Pro => "x-cg-pro-api-key",
        }
    }

    pub fn default_api_url(&self) -> &'static str {
        match self {
            CoinGeckoTier::Demo => COINGECKO_DEMO_API_URL,
            CoinGeckoTier::Pro => COINGECKO_PRO_API_URL,
        }
    }
}

/// Per-chain configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub chain: Chain,
    pub address: String,
    pub api_url: String,
    pub api_key: Option<String>,
    pub chain_id: Option<u64>,
    pub min_request_interval: Duration,
    pub criticality: Criticality,
}

#[derive(Debug, Clone)]
pub struct PriceConfig {
    pub api_url: String,
    pub api_key: String,
    pub tier: CoinGeckoTier,
    pub fiat_currency: String,
    pub batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub eth_address: Option<String>,
    pub sol_address: Option<String>,
    pub chain_configs: HashMap<Chain, ChainConfig>,
    pub price: PriceConfig,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub include_native_transfers: bool,
    pub solana_signature_limit: Option<usize>,
    pub output_dir: PathBuf,
    pub min_report_value: Option<BigDecimal>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self> where F: Fn(&str) -> Option<String> {
        let var = |key: &str| -> Option<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let eth_address = match var("ETH_ADDRESS") {
            Some(address) => {
                if !evm::validate_address(&address) {
                    return Err(AppError::Config(format!("ETH_ADDRESS is not a valid EVM address: {}", address)));
                }
                Some(address.to_lowercase())
            }
            None => None,
        };

        let sol_address = match var("SOL_ADDRESS") {
            Some(address) => {
                if !solana::validate_address(&address) {
                    return Err(AppError::Config(format!("SOL_ADDRESS is not a valid Solana address: {}", address)));
                }
                Some(address)
            }
            None => None,
        };

        if eth_address.is_none() && sol_address.is_none() {
            return Err(AppError::Config("Set at least one of ETH_ADDRESS or SOL_ADDRESS".to_string()));
        }

        let etherscan_api_key = var("ETHERSCAN_API_KEY");
        if eth_address.is_some() && etherscan_api_key.is_none() {
            return Err(AppError::Config("ETHERSCAN_API_KEY is required when ETH_ADDRESS is set".to_string()));
        }

        let coingecko_api_key = var("COINGECKO_API_KEY").ok_or_else(||
            AppError::Config("COINGECKO_API_KEY is required".to_string())
        )?;

        let tier = match var("COINGECKO_API_TIER").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("demo") => CoinGeckoTier::Demo,
            Some("pro") => CoinGeckoTier::Pro,
            Some(other) => {
                return Err(AppError::Config(format!("COINGECKO_API_TIER must be 'demo' or 'pro', got '{}'", other)));
            }
        };

        let price = PriceConfig {
            api_url: var("COINGECKO_API_URL").unwrap_or_else(|| tier.default_api_url().to_string()),
            api_key: coingecko_api_key,
            tier,
            fiat_currency: var("FIAT_CURRENCY").unwrap_or_else(|| "usd".to_string()).to_lowercase(),
            batch_size: parse_var(&var, "COINGECKO_BATCH_SIZE")?.unwrap_or(50).max(1),
        };

        let selected = match var("CHAINS") {
            Some(list) => Self::parse_chain_list("CHAINS", &list)?,
            None => Self::default_chains(eth_address.is_some(), sol_address.is_some()),
        };
        let best_effort = match var("BEST_EFFORT_CHAINS") {
            Some(list) => Self::parse_chain_list("BEST_EFFORT_CHAINS", &list)?,
            None => Vec::new(),
        };
        if let Some(stray) = best_effort.iter().find(|c| !selected.contains(*c)) {
            return Err(
                AppError::Config(format!("BEST_EFFORT_CHAINS names {} but it is not among the selected chains", stray))
            );
        }

        let shared_explorer_url = var("EXPLORER_API_URL").unwrap_or_else(||
            DEFAULT_EXPLORER_API_URL.to_string()
        );

        // Build chain configs from the selected chains
        let mut chain_configs = HashMap::new();

        for chain in selected {
            let prefix = chain.as_str().to_uppercase();
            let interval_key = format!("{}_MIN_INTERVAL_MS", prefix);
            let interval_ms = parse_var(&var, &interval_key)?.unwrap_or(
                chain.default_min_interval_ms()
            );
            let criticality = if best_effort.contains(&chain) {
                Criticality::BestEffort
            } else {
                Criticality::Required
            };

            let config = match chain.family() {
                ChainFamily::Evm => {
                    let address = eth_address
                        .clone()
                        .ok_or_else(||
                            AppError::Config(format!("Chain {} selected but ETH_ADDRESS is not set", chain))
                        )?;
                    ChainConfig {
                        chain,
                        address,
                        api_url: var(&format!("{}_EXPLORER_API_URL", prefix)).unwrap_or_else(||
                            shared_explorer_url.clone()
                        ),
                        api_key: etherscan_api_key.clone(),
                        chain_id: chain.chain_id(),
                        min_request_interval: Duration::from_millis(interval_ms),
                        criticality,
                    }
                }
                ChainFamily::Solana => {
                    let address = sol_address
                        .clone()
                        .ok_or_else(||
                            AppError::Config(format!("Chain {} selected but SOL_ADDRESS is not set", chain))
                        )?;
                    ChainConfig {
                        chain,
                        address,
                        api_url: var("SOLANA_RPC_URL").unwrap_or_else(||
                            DEFAULT_SOLANA_RPC_URL.to_string()
                        ),
                        api_key: None,
                        chain_id: None,
                        min_request_interval: Duration::from_millis(interval_ms),
                        criticality,
                    }
                }
            };
            chain_configs.insert(chain, config);
        }

        if chain_configs.is_empty() {
            return Err(AppError::Config("No chains configured. Check CHAINS.".to_string()));
        }

        let retry = RetryPolicy {
            max_attempts: parse_var(&var, "MAX_RETRIES")?.unwrap_or(4).max(1),
            base_delay: Duration::from_millis(parse_var(&var, "RETRY_BASE_DELAY_MS")?.unwrap_or(1000)),
            max_delay: Duration::from_secs(30),
        };

        let include_native_transfers = match var("INCLUDE_NATIVE_TRANSFERS") {
            Some(v) => parse_bool("INCLUDE_NATIVE_TRANSFERS", &v)?,
            None => true,
        };

        let min_report_value = match var("MIN_REPORT_VALUE") {
            Some(v) =>
                Some(
                    BigDecimal::from_str(&v).map_err(|_|
                        AppError::Config(format!("MIN_REPORT_VALUE must be a decimal number, got '{}'", v))
                    )?
                ),
            None => None,
        };

        Ok(Config {
            eth_address,
            sol_address,
            chain_configs,
            price,
            http_timeout: Duration::from_secs(parse_var(&var, "HTTP_TIMEOUT_SECS")?.unwrap_or(20)),
            retry,
            include_native_transfers,
            solana_signature_limit: parse_var(&var, "SOLANA_SIGNATURE_LIMIT")?,
            output_dir: PathBuf::from(var("OUTPUT_DIR").unwrap_or_else(|| ".".to_string())),
            min_report_value,
        })
    }

    fn default_chains(has_eth: bool, has_sol: bool) -> Vec<Chain> {
        let mut chains = Vec::new();
        if has_eth {
            chains.extend_from_slice(Chain::all_evm());
        }
        if has_sol {
            chains.push(Chain::Solana);
        }
        chains
    }

    fn parse_chain_list(key: &str, list: &str) -> Result<Vec<Chain>> {
        let mut chains = Vec::new();
        for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let chain = item
                .parse::<Chain>()
                .map_err(|e| AppError::Config(format!("{}: {}", key, e)))?;
            if !chains.contains(&chain) {
                chains.push(chain);
            }
        }
        Ok(chains)
    }

    /// Configured chains in a stable order.
    pub fn configured_chains(&self) -> Vec<Chain> {
        let mut chains: Vec<Chain> = self.chain_configs.keys().copied().collect();
        chains.sort();
        chains
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>> where T: FromStr, F: Fn(&str) -> Option<String> {
    match var(key) {
        Some(raw) =>
            raw
                .parse::<T>()
                .map(Some)
                .map_err(|_| AppError::Config(format!("{} has an invalid value: '{}'", key, raw))),
        None => Ok(None),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::Config(format!("{} must be true or false, got '{}'", key, raw))),
    }
}
