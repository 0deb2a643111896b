//! The request pipeline: a typed API client composing retry, rate
//! limiting, and credentials over an injectable transport.
//!
//! Every call runs the full sequence for each retry attempt: acquire a
//! rate-limit slot, obtain a valid token inside the slot, issue the
//! transport call under a per-call deadline, classify the outcome. A 401
//! invalidates the credential state so the next attempt refreshes.
//!
//! # Examples
//!
//! ```no_run
//! use syncline_client::{ApiClient, RequestOptions};
//! use syncline_core::transport::BoxTransport;
//! use syncline_core::SyncError;
//! # use syncline_ratelimit::RateLimiter;
//! # use syncline_credential::CredentialManager;
//!
//! # async fn example(
//! #     transport: BoxTransport,
//! #     limiter: RateLimiter,
//! #     credentials: CredentialManager,
//! # ) -> Result<(), SyncError> {
//! let client = ApiClient::builder()
//!     .transport(transport)
//!     .rate_limiter(limiter)
//!     .credentials(credentials)
//!     .base_url("https://api.example.com")
//!     .build()?;
//!
//! let page: serde_json::Value = client
//!     .get("/api/records?page=1&per_page=100", RequestOptions::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod classify;

use classify::classify_response;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use syncline_core::transport::{
    classify_transport_error, BoxTransport, Method, TransportRequest, TransportResponse,
};
use syncline_core::SyncError;
use syncline_credential::CredentialManager;
use syncline_ratelimit::RateLimiter;
use syncline_retry::RetryPolicy;
use tower::ServiceExt;

/// Default per-call transport deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(5000);

/// Per-call knobs for the typed client surface.
#[derive(Clone, Default)]
pub struct RequestOptions {
    timeout: Option<Duration>,
    priority: i32,
    context: Option<String>,
    retry_counter: Option<Arc<AtomicUsize>>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the client's default per-call deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Rate-limiter priority; higher resumes first. Defaults to 0.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Caller context for retry logs (defaults to `METHOD path`).
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Counts every scheduled retry into `counter`; used by the
    /// orchestrator for per-record retry accounting.
    pub fn count_retries_into(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.retry_counter = Some(counter);
        self
    }
}

/// Typed HTTP surface over the composed pipeline.
///
/// Cheap to clone; clones share the limiter, credentials, and transport.
#[derive(Clone)]
pub struct ApiClient {
    transport: BoxTransport,
    limiter: RateLimiter,
    credentials: CredentialManager,
    retry: RetryPolicy,
    base_url: String,
    default_timeout: Duration,
}

impl ApiClient {
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    /// The rate limiter this client admits calls through.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The credential manager this client authenticates with.
    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, SyncError> {
        self.request(Method::Get, path, None, options).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<T, SyncError> {
        self.request(Method::Post, path, body, options).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<T, SyncError> {
        self.request(Method::Put, path, body, options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, SyncError> {
        self.request(Method::Delete, path, None, options).await
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> Result<T, SyncError> {
        let url = format!("{}{}", self.base_url, path);
        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let context = options
            .context
            .unwrap_or_else(|| format!("{} {}", method.as_str(), path));
        let counter = options.retry_counter;
        let priority = options.priority;

        let response = self
            .retry
            .run_observed(
                &context,
                |_, _| {
                    if let Some(counter) = &counter {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                },
                || self.attempt(method, &url, body.as_ref(), timeout, priority),
            )
            .await?;

        response.json()
    }

    /// One pipeline attempt: slot, token, deadline-raced transport call,
    /// classification.
    async fn attempt(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        timeout: Duration,
        priority: i32,
    ) -> Result<TransportResponse, SyncError> {
        self.limiter
            .execute(
                || async {
                    let token = self.credentials.obtain().await?;

                    let mut request = TransportRequest::new(method, url)
                        .with_header("Authorization", token.authorization_value())
                        .with_header("Content-Type", "application/json");
                    if let Some(body) = body {
                        request = request.with_body(body.to_string());
                    }

                    let transport = self.transport.clone();
                    let response =
                        match tokio::time::timeout(timeout, transport.oneshot(request)).await {
                            Ok(Ok(response)) => response,
                            Ok(Err(err)) => return Err(classify_transport_error(err)),
                            Err(_elapsed) => {
                                return Err(SyncError::Timeout {
                                    elapsed_ms: timeout.as_millis() as u64,
                                })
                            }
                        };

                    match classify_response(response) {
                        Ok(response) => Ok(response),
                        Err(err) => {
                            // Drop the rejected token so the next attempt
                            // refreshes instead of replaying it.
                            if matches!(err, SyncError::CredentialExpired) {
                                self.credentials.invalidate();
                            }
                            Err(err)
                        }
                    }
                },
                priority,
            )
            .await
    }
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    transport: Option<BoxTransport>,
    limiter: Option<RateLimiter>,
    credentials: Option<CredentialManager>,
    retry: Option<RetryPolicy>,
    base_url: Option<String>,
    default_timeout: Duration,
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClientBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            limiter: None,
            credentials: None,
            retry: None,
            base_url: None,
            default_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn transport(mut self, transport: BoxTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn credentials(mut self, credentials: CredentialManager) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Overrides the default retry policy (5 attempts, 1s base, 16s cap,
    /// 250ms jitter).
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Overrides the 5000 ms default per-call deadline.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ApiClient, SyncError> {
        let missing = |name: &str| SyncError::ConfigurationInvalid {
            message: format!("api client requires {name}"),
        };
        Ok(ApiClient {
            transport: self.transport.ok_or_else(|| missing("a transport"))?,
            limiter: self.limiter.ok_or_else(|| missing("a rate limiter"))?,
            credentials: self.credentials.ok_or_else(|| missing("a credential manager"))?,
            retry: self
                .retry
                .unwrap_or_else(|| RetryPolicy::builder().name("api").build()),
            base_url: self
                .base_url
                .ok_or_else(|| missing("a base URL"))?
                .trim_end_matches('/')
                .to_string(),
            default_timeout: self.default_timeout,
        })
    }
}
