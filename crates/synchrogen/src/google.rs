//! Shared HTTP plumbing for the Google APIs.
//!
//! Centralizes client construction and status classification so the Drive,
//! Sheets and token modules only build requests and map responses.

use std::time::Duration;

use crate::error::SinkError;

/// User agent sent on every outbound call.
const USER_AGENT: &str = concat!("synchrogen/", env!("CARGO_PKG_VERSION"));

/// Error reasons Google uses for quota and rate-limit refusals.
const QUOTA_REASONS: &[&str] = &[
    "quotaExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "storageQuotaExceeded",
    "RESOURCE_EXHAUSTED",
];

/// Build an HTTP client with the per-call timeout applied.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

/// Check an API response, turning non-success statuses into [`SinkError`]s.
///
/// - **401** → [`SinkError::Auth`]
/// - **429**, or **403** with a quota reason → [`SinkError::Quota`]
/// - other **403** → [`SinkError::Auth`] (the account lacks access)
/// - anything else unsuccessful → [`SinkError::Api`]
pub async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, SinkError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(classify(status.as_u16(), message))
}

fn classify(status: u16, message: String) -> SinkError {
    match status {
        401 => SinkError::Auth(message),
        429 => SinkError::Quota { status, message },
        403 if is_quota_reason(&message) => SinkError::Quota { status, message },
        403 => SinkError::Auth(message),
        _ => SinkError::Api { status, message },
    }
}

fn is_quota_reason(body: &str) -> bool {
    QUOTA_REASONS.iter().any(|reason| body.contains(reason))
}

/// A local stand-in for Google endpoints, served by warp on an ephemeral port.
#[cfg(test)]
pub(crate) mod fake {
    use warp::Filter;

    /// Serve `routes` on `127.0.0.1:<ephemeral>` and return its base URL.
    pub(crate) fn serve<F>(routes: F) -> String
    where
        F: Filter<Error = warp::Rejection> + Clone + Send + Sync + 'static,
        F::Extract: warp::Reply,
    {
        let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        format!("http://{addr}")
    }
}
