//! HTTP access to the gateway with bounded retries.

use std::{
    future::{self, Future},
    time::Duration,
};

use reqwest::{header::RETRY_AFTER, Method, Response, StatusCode};

use crate::{Error, RequestFailure, Result};

/// Upper bound for a single backoff sleep.
const BACKOFF_MAX: Duration = Duration::from_secs(120);

/// When and how often an idempotent request is repeated.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Statuses worth another attempt. Everything else non-2xx is final.
    pub retry_statuses: Vec<StatusCode>,
    /// Sleep before retry `n` (1-based) is `backoff_factor * 2^(n-1)`.
    pub backoff_factor: Duration,
    /// Wait for a numeric `Retry-After` on 429 and 503 instead of the
    /// backoff, still capped at [`BACKOFF_MAX`].
    pub respect_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_statuses: vec![
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::BAD_GATEWAY,
                StatusCode::SERVICE_UNAVAILABLE,
                StatusCode::GATEWAY_TIMEOUT,
            ],
            backoff_factor: Duration::from_secs(1),
            respect_retry_after: true,
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts, whatever the server asks for.
    pub fn immediate() -> Self {
        Self {
            backoff_factor: Duration::ZERO,
            respect_retry_after: false,
            ..Self::default()
        }
    }

    fn is_retryable(&self, status: StatusCode) -> bool {
        self.retry_statuses.contains(&status)
    }

    fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        self.backoff_factor
            .checked_mul(1 << exp)
            .map_or(BACKOFF_MAX, |d| d.min(BACKOFF_MAX))
    }

    /// Sleep before retry `retry` after an attempt answered with `status`
    /// (`None` for transport failures) and the given `Retry-After`.
    fn delay(&self, retry: u32, status: Option<StatusCode>, retry_after: Option<Duration>) -> Duration {
        let honors_retry_after = self.respect_retry_after
            && matches!(
                status,
                Some(StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE)
            );
        match retry_after {
            Some(after) if honors_retry_after => after.min(BACKOFF_MAX),
            _ => self.backoff(retry),
        }
    }
}

/// GET/DELETE client for one gateway. Cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl GatewayClient {
    /// `timeout` bounds every attempt, body included, not the request as a
    /// whole.
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Client)?;
        Ok(Self {
            http,
            timeout,
            retry,
        })
    }

    /// Returns the body of a successful `GET url`.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        self.send(Method::GET, url, Response::text)
            .await
            .map_err(|source| Error::Fetch {
                url: url.to_owned(),
                source,
            })
    }

    pub async fn delete(&self, url: &str) -> Result<()> {
        self.send(Method::DELETE, url, |_| future::ready(Ok(())))
            .await
            .map_err(|source| Error::Delete {
                url: url.to_owned(),
                source,
            })
    }

    /// Runs attempts until one gets a 2xx response and `read` consumes it.
    /// Reading the body is part of the attempt, so a body that stalls past
    /// the timeout is retried like any other timeout.
    async fn send<T, F, Fut>(&self, method: Method, url: &str, mut read: F) -> Result<T, RequestFailure>
    where
        F: FnMut(Response) -> Fut,
        Fut: Future<Output = reqwest::Result<T>>,
    {
        let mut retries = 0;
        loop {
            let outcome = self
                .http
                .request(method.clone(), url)
                .timeout(self.timeout)
                .send()
                .await;
            let (failure, status, retry_after) = match outcome {
                Ok(response) if response.status().is_success() => match read(response).await {
                    Ok(body) => return Ok(body),
                    Err(e) if is_transient(&e) || e.is_body() => (RequestFailure::Transport(e), None, None),
                    Err(e) => return Err(RequestFailure::Transport(e)),
                },
                Ok(response) if self.retry.is_retryable(response.status()) => {
                    let status = response.status();
                    (RequestFailure::Status(status), Some(status), retry_after(&response))
                }
                Ok(response) => return Err(RequestFailure::Status(response.status())),
                Err(e) if is_transient(&e) => (RequestFailure::Transport(e), None, None),
                Err(e) => return Err(RequestFailure::Transport(e)),
            };
            if retries >= self.retry.max_retries {
                return Err(failure);
            }
            retries += 1;

            let delay = self.retry.delay(retries, status, retry_after);
            tracing::debug!(%method, url, retries, ?delay, error = %failure, "retrying request");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Failures that happen before a response arrives: refused or reset
/// connections and timeouts.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout() || e.is_request()
}

/// Delay-seconds form of `Retry-After`; HTTP dates fall back to backoff.
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_secs)
}
