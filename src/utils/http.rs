use anyhow::{anyhow, Context, Result};
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

pub fn create_client(user_agent: &str) -> Result<Client> {
    let client = ClientBuilder::new()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(25))
        .pool_max_idle_per_host(2)
        .build()?;

    Ok(client)
}

/// How many times a GET is attempted and how long to back off between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait before the second attempt. Doubles for each one after that.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Image hosts either answer quickly or not at all; a lookup should not stall on them.
    pub const IMAGE: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(250),
    };

    pub const PAGE: RetryPolicy = RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_secs(1),
    };

    /// Backoff after `failures` failed attempts.
    pub fn delay_after(&self, failures: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(failures.saturating_sub(1)))
    }
}

/// Statuses worth asking again for. Other client errors will not change on retry.
fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

pub async fn fetch_with_retry(client: &Client, url: &str, policy: RetryPolicy) -> Result<Response> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;
    let mut last_error = None;

    while attempts < max_attempts {
        attempts += 1;
        match client.get(url).send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                if !is_retryable(status) {
                    return Err(anyhow!("HTTP error: {}", status))
                        .with_context(|| format!("Failed to fetch {}", url));
                }
                warn!("HTTP error {}: {}", status, url);
                last_error = Some(anyhow!("HTTP error: {}", status));
            }
            Err(e) => {
                debug!("Request failed for {}: {}", url, e);
                last_error = Some(e.into());
            }
        }

        if attempts < max_attempts {
            let delay = policy.delay_after(attempts);
            warn!("Retrying in {:?}... (attempt {}/{})", delay, attempts + 1, max_attempts);
            sleep(delay).await;
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow!("Max retries exceeded")))
        .with_context(|| format!("Failed to fetch {} after {} attempts", url, attempts))
}
