//! HTTP retry for geodata requests.
//!
//! Every provider request goes through [`send_json`], which retries
//! transient failures (connect errors, timeouts, HTTP 429 and 5xx) with
//! exponential backoff and fails fast on other 4xx responses.

use std::time::Duration;

use crate::GeodataError;

/// Retry attempts after the first request. Backoff is 1s, 2s, 4s, 8s.
const MAX_RETRIES: u32 = 4;

/// Maximum response body length quoted in a parse-failure log line.
const BODY_PREVIEW_LEN: usize = 300;

/// Backoff before retry `attempt` (1-based).
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << (attempt - 1).min(6))
}

/// Returns `true` for statuses that are worth retrying.
#[must_use]
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns `true` if the transport error is likely transient.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

/// Sends the request built by `build_request` and parses the body as
/// JSON, retrying transient failures.
///
/// The closure is called once per attempt because a
/// [`reqwest::RequestBuilder`] is consumed by `send()`.
///
/// # Errors
///
/// * [`GeodataError::Http`] if the transport fails after all retries
/// * [`GeodataError::Status`] for non-retryable statuses, or retryable
///   ones that persist after all retries
/// * [`GeodataError::Json`] if the body is not valid JSON
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(build_request: F) -> Result<serde_json::Value, GeodataError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    let response = loop {
        if attempt > 0 {
            let delay = backoff(attempt);
            log::warn!("  retry {attempt}/{MAX_RETRIES} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) if is_transient(&e) && attempt < MAX_RETRIES => {
                log::warn!("  transient error: {e}");
            }
            Err(e) => return Err(GeodataError::Http(e)),
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    break response;
                }
                if is_retryable_status(status) && attempt < MAX_RETRIES {
                    log::warn!("  HTTP {status} from {}", response.url());
                } else {
                    return Err(GeodataError::Status {
                        status: status.as_u16(),
                        url: response.url().to_string(),
                    });
                }
            }
        }
        attempt += 1;
    };

    let url = response.url().to_string();
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| {
        let preview: String = text.chars().take(BODY_PREVIEW_LEN).collect();
        log::error!(
            "JSON parse failed.\n  \
             url: {url}\n  \
             received: {} bytes\n  \
             parse error: {e}\n  \
             body preview: {preview}",
            text.len(),
        );
        GeodataError::Json(e)
    })
}
