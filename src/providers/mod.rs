pub mod chain_adapter;

pub use chain_adapter::{ ChainAdapter, EvmTransfer, RawTransfer, SolanaTransfer };
