mod registry;
mod retry;
mod throttle;

pub use registry::AdapterRegistry;
pub use retry::RetryPolicy;
pub use throttle::Throttle;

use std::time::Duration;

use crate::error::{ AppError, Result };

/// Shared HTTP client; every request made through it is bounded by `timeout`.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client
        ::builder()
        .timeout(timeout)
        .user_agent(concat!("tax-ledger/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Turn a non-success HTTP status into the matching error.
pub fn status_error(status: reqwest::StatusCode, body: String) -> AppError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        AppError::RateLimited(format!("HTTP 429: {}", truncate(&body, 200)))
    } else {
        AppError::Upstream {
            status: status.as_u16(),
            body: truncate(&body, 200),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
