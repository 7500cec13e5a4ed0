pub mod config;
pub mod enums;
pub mod error;
pub mod models;
pub mod providers;
pub mod chains;
pub mod rpc;
pub mod services;
pub mod report;

pub use config::Config;
pub use enums::{ Chain, Criticality, Direction };
pub use error::{ AppError, Result };
pub use models::{ TokenBalance, TokenKey, TransferRecord };
