pub mod balance_service;
pub mod ledger_service;
pub mod normalizer;
pub mod price_service;

pub use balance_service::{ aggregate, apply_prices, Aggregation };
pub use ledger_service::{ ChainTarget, LedgerRun, LedgerService, SkippedChain };
pub use normalizer::TransactionNormalizer;
pub use price_service::{ CoinGeckoSource, PriceCache, PriceResolver, PriceSource };
