mod adapter;
mod address;
pub mod tokens;

pub use adapter::EvmAdapter;
pub use address::{ same_address, validate_address };
