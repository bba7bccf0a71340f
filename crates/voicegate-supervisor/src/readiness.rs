//! HTTP readiness checks for freshly launched units.

use crate::unit::ReadyCheck;
use std::time::Duration;

/// Delay between attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on a single request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Polls `check.url` until it answers 2xx or `check.timeout` elapses.
///
/// # Errors
///
/// Returns a description of the last failure if the unit never became ready.
pub async fn wait_until_ready(check: &ReadyCheck) -> Result<(), String> {
    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| format!("failed to build readiness client: {e}"))?;

    let poll = async {
        loop {
            match client.get(&check.url).send().await {
                Ok(response) if response.status().is_success() => return,
                Ok(response) => {
                    tracing::debug!(url = %check.url, status = %response.status(), "unit not ready yet");
                }
                Err(e) => {
                    tracing::debug!(url = %check.url, error = %e, "unit not reachable yet");
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    };

    tokio::time::timeout(check.timeout, poll).await.map_err(|_| {
        format!(
            "{} did not answer within {} seconds",
            check.url,
            check.timeout.as_secs_f32()
        )
    })
}
