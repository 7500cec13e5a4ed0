mod adapter;
mod address;
pub mod parser;
pub mod tokens;

pub use adapter::SolanaAdapter;
pub use address::validate_address;
