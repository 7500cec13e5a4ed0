use thiserror::Error;

use crate::enums::Chain;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")] Config(String),

    #[error("Failed to fetch {chain} transfers: {cause}")] ChainFetch {
        chain: Chain,
        cause: String,
    },

    #[error("Rate limited: {0}")] RateLimited(String),

    #[error("Request timed out: {0}")] Timeout(String),

    #[error("Upstream returned status {status}: {body}")] Upstream {
        status: u16,
        body: String,
    },

    #[error("Malformed payload: {0}")] MalformedPayload(String),

    #[error("Invalid input: {0}")] InvalidInput(String),

    #[error("Transport error: {0}")] Transport(String),

    #[error("Report error: {0}")] Report(#[from] csv::Error),

    #[error("IO error: {0}")] Io(#[from] std::io::Error),
}

impl AppError {
    /// Whether a retry with backoff can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::RateLimited(_) | AppError::Timeout(_) | AppError::Transport(_) => true,
            AppError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Fold any error raised while fetching a chain into a `ChainFetch` error.
    pub fn into_chain_fetch(self, chain: Chain) -> AppError {
        match self {
            AppError::ChainFetch { .. } => self,
            other => AppError::ChainFetch { chain, cause: other.to_string() },
        }
    }

    /// Classify a reqwest failure.
    pub fn from_reqwest(context: &str, err: reqwest::Error) -> AppError {
        if err.is_timeout() {
            AppError::Timeout(format!("{}: {}", context, err))
        } else if err.is_decode() {
            AppError::MalformedPayload(format!("{}: {}", context, err))
        } else {
            AppError::Transport(format!("{}: {}", context, err))
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
