//! Bearer-token lifecycle for the sync worker.
//!
//! Produces a currently-valid token on demand, renews it inside the 300 s
//! refresh buffer, and guarantees at most one in-flight refresh against the
//! authentication endpoint regardless of caller count: the first caller to
//! notice a stale token leads the refresh, everyone else awaits the same
//! result.
//!
//! # Examples
//!
//! ```no_run
//! use syncline_credential::{CredentialConfig, CredentialManager};
//! use syncline_core::transport::BoxTransport;
//! use syncline_core::SyncError;
//!
//! # async fn example(transport: BoxTransport) -> Result<(), SyncError> {
//! let config = CredentialConfig::builder()
//!     .base_url("https://api.example.com")
//!     .email("worker@example.com")
//!     .password("hunter2")
//!     .build()?;
//! let credentials = CredentialManager::new(config, transport);
//!
//! let token = credentials.obtain().await?;
//! let header = token.authorization_value();
//! # Ok(())
//! # }
//! ```

mod config;
mod token;

pub use config::{CredentialConfig, CredentialConfigBuilder};
pub use token::{Token, DEFAULT_REFRESH_BUFFER};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use syncline_core::transport::{
    classify_transport_error, error_body_excerpt, BoxTransport, Method, TransportRequest,
};
use syncline_core::SyncError;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tower::ServiceExt;

const ERROR_EXCERPT_LEN: usize = 200;

/// Wire shape of the login response.
#[derive(serde::Deserialize)]
struct LoginResponse {
    access_token: String,
    token_type: String,
    expires_in: u64,
}

/// Exclusively-owned credential state. At most one refresh is live; its
/// broadcast sender is the coalescing point for every concurrent caller.
struct CredentialState {
    current: Option<Token>,
    in_flight: Option<broadcast::Sender<Result<Token, SyncError>>>,
}

enum RefreshRole {
    Leader(broadcast::Sender<Result<Token, SyncError>>),
    Joiner(broadcast::Receiver<Result<Token, SyncError>>),
}

struct Inner {
    state: Mutex<CredentialState>,
    config: CredentialConfig,
    transport: BoxTransport,
}

/// Owns the current token and the single-flight refresh protocol.
///
/// Cheap to clone; clones share the same credential state.
#[derive(Clone)]
pub struct CredentialManager {
    inner: Arc<Inner>,
}

impl CredentialManager {
    pub fn new(config: CredentialConfig, transport: BoxTransport) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CredentialState {
                    current: None,
                    in_flight: None,
                }),
                config,
                transport,
            }),
        }
    }

    /// Returns the current token when it is valid and outside the refresh
    /// buffer; otherwise triggers (or joins) a refresh.
    ///
    /// A failed refresh never invalidates a still-usable token: when one is
    /// held, it is served and the failure only logged.
    pub async fn obtain(&self) -> Result<Token, SyncError> {
        let role = {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(token) = &state.current {
                if !token.needs_refresh(Instant::now(), self.inner.config.refresh_buffer) {
                    return Ok(token.clone());
                }
            }
            Self::begin_or_join(&mut state)
        };

        match self.settle(role).await {
            Ok(token) => Ok(token),
            Err(err) => {
                let usable = {
                    let state = self.inner.state.lock().unwrap();
                    state
                        .current
                        .clone()
                        .filter(|token| !token.is_expired(Instant::now()))
                };
                match usable {
                    Some(token) => {
                        tracing::warn!(
                            error = %err,
                            "token refresh failed, serving the still-valid token"
                        );
                        Ok(token)
                    }
                    None => Err(err),
                }
            }
        }
    }

    /// Forces a refresh, coalescing with any in-flight one. Unlike
    /// [`obtain`](Self::obtain), a failure always surfaces.
    pub async fn refresh(&self) -> Result<Token, SyncError> {
        let role = {
            let mut state = self.inner.state.lock().unwrap();
            Self::begin_or_join(&mut state)
        };
        self.settle(role).await
    }

    /// Discards the current token; the next `obtain` acquires fresh.
    pub fn invalidate(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if state.current.take().is_some() {
            tracing::debug!("access token invalidated");
        }
    }

    /// The instant the current token expires, when one is held.
    pub fn expiry_instant(&self) -> Option<Instant> {
        let state = self.inner.state.lock().unwrap();
        state.current.as_ref().map(Token::expires_at)
    }

    /// Remaining lifetime of the current token, when one is held.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expiry_instant()
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Atomically either becomes the refresh leader or subscribes to the
    /// in-flight one. Must be called with the state lock held.
    fn begin_or_join(state: &mut CredentialState) -> RefreshRole {
        match &state.in_flight {
            Some(tx) => RefreshRole::Joiner(tx.subscribe()),
            None => {
                let (tx, _rx) = broadcast::channel(1);
                state.in_flight = Some(tx.clone());
                RefreshRole::Leader(tx)
            }
        }
    }

    async fn settle(&self, role: RefreshRole) -> Result<Token, SyncError> {
        match role {
            RefreshRole::Leader(tx) => {
                let result = self
                    .inner
                    .config
                    .retry
                    .run("credential acquisition", || self.request_token())
                    .await;

                {
                    let mut state = self.inner.state.lock().unwrap();
                    state.in_flight = None;
                    if let Ok(token) = &result {
                        state.current = Some(token.clone());
                    }
                }

                match &result {
                    Ok(token) => tracing::debug!(
                        expires_in_secs =
                            token.expires_at().saturating_duration_since(Instant::now()).as_secs(),
                        "access token refreshed"
                    ),
                    Err(err) => {
                        tracing::warn!(error = %err, kind = err.kind(), "token refresh failed")
                    }
                }

                let _ = tx.send(result.clone());
                result
            }
            RefreshRole::Joiner(mut rx) => match rx.recv().await {
                Ok(result) => result,
                Err(_) => Err(SyncError::network("credential refresh abandoned by leader")),
            },
        }
    }

    /// One authentication attempt: `POST <base>/auth/login` with Basic
    /// credentials and an empty JSON body. `issued_at` is stamped the
    /// moment the response arrives.
    async fn request_token(&self) -> Result<Token, SyncError> {
        let basic = BASE64.encode(format!(
            "{}:{}",
            self.inner.config.email, self.inner.config.password
        ));
        let request = TransportRequest::new(
            Method::Post,
            format!("{}/auth/login", self.inner.config.base_url),
        )
        .with_header("Authorization", format!("Basic {basic}"))
        .with_header("Content-Type", "application/json")
        .with_body("{}");

        let response = self
            .inner
            .transport
            .clone()
            .oneshot(request)
            .await
            .map_err(classify_transport_error)?;
        let received_at = Instant::now();

        if !response.ok() {
            return Err(match response.status {
                // A 401 here is a stale/rejected token exchange, not a bad
                // credential; it stays retryable. Other 4xx are definitive
                // rejections.
                401 => SyncError::CredentialExpired,
                500..=599 => SyncError::ServiceUnavailable {
                    retry_after_seconds: None,
                },
                status => SyncError::AuthenticationFailed {
                    message: format!(
                        "status {status}: {}",
                        error_body_excerpt(&response, ERROR_EXCERPT_LEN)
                    ),
                },
            });
        }

        let body: LoginResponse = response.json()?;
        Ok(Token::new(
            body.access_token,
            body.token_type,
            Duration::from_secs(body.expires_in),
            received_at,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use syncline_core::transport::{BoxError, TransportResponse};
    use tower::util::BoxCloneSyncService;

    fn mock_transport<F, Fut>(f: F) -> BoxTransport
    where
        F: FnMut(TransportRequest) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<TransportResponse, BoxError>> + Send + 'static,
    {
        BoxCloneSyncService::new(tower::service_fn(f))
    }

    fn login_ok(access_token: &str, expires_in: u64) -> TransportResponse {
        TransportResponse::new(200).with_body(
            serde_json::json!({
                "access_token": access_token,
                "token_type": "Bearer",
                "expires_in": expires_in,
            })
            .to_string(),
        )
    }

    fn manager(transport: BoxTransport) -> CredentialManager {
        let config = CredentialConfig::builder()
            .base_url("https://api.example.com")
            .email("worker@example.com")
            .password("hunter2")
            .build()
            .unwrap();
        CredentialManager::new(config, transport)
    }

    #[tokio::test]
    async fn obtain_sends_basic_credentials_with_empty_json_body() {
        let transport = mock_transport(|request: TransportRequest| async move {
            assert_eq!(request.url, "https://api.example.com/auth/login");
            assert_eq!(request.method, Method::Post);
            // base64("worker@example.com:hunter2")
            assert_eq!(
                request.header("authorization"),
                Some("Basic d29ya2VyQGV4YW1wbGUuY29tOmh1bnRlcjI=")
            );
            assert_eq!(request.header("content-type"), Some("application/json"));
            assert_eq!(request.body.as_deref(), Some("{}"));
            Ok(login_ok("tok-1", 3600))
        });

        let token = manager(transport).obtain().await.unwrap();
        assert_eq!(token.access_token(), "tok-1");
        assert_eq!(token.token_type(), "Bearer");
    }

    #[tokio::test]
    async fn valid_token_is_reused_without_a_second_login() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let transport = mock_transport(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(login_ok("tok-1", 3600))
            }
        });

        let credentials = manager(transport);
        let first = credentials.obtain().await.unwrap();
        let second = credentials.obtain().await.unwrap();
        assert_eq!(first.access_token(), second.access_token());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn token_entering_the_buffer_is_refreshed() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let transport = mock_transport(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Ok(login_ok(&format!("tok-{n}"), 400))
            }
        });

        let credentials = manager(transport);
        let first = credentials.obtain().await.unwrap();
        assert_eq!(first.access_token(), "tok-0");

        // 400s lifetime with a 300s buffer: stale after 100s.
        tokio::time::advance(Duration::from_secs(150)).await;
        let second = credentials.obtain().await.unwrap();
        assert_eq!(second.access_token(), "tok-1");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refreshes_share_one_flight() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let transport = mock_transport(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(login_ok(&format!("tok-{n}"), 3600))
            }
        });

        let credentials = manager(transport);
        let mut handles = Vec::new();
        for _ in 0..5 {
            let credentials = credentials.clone();
            handles.push(tokio::spawn(async move { credentials.refresh().await }));
            tokio::task::yield_now().await;
        }

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(hits.load(Ordering::SeqCst), 1, "endpoint hit exactly once");
        assert!(tokens.iter().all(|t| t.access_token() == "tok-0"));
    }

    #[tokio::test]
    async fn credential_rejection_is_not_retried() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let transport = mock_transport(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(TransportResponse::new(403)
                    .with_body(r#"{"error":{"code":"forbidden","message":"bad credentials"}}"#))
            }
        });

        let err = manager(transport).obtain().await.unwrap_err();
        assert!(matches!(err, SyncError::AuthenticationFailed { .. }));
        assert!(err.to_string().contains("bad credentials"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_login_is_retried_as_a_rejected_token() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let transport = mock_transport(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Ok(TransportResponse::new(401))
                } else {
                    Ok(login_ok("tok-after-401", 3600))
                }
            }
        });

        let token = manager(transport).obtain().await.unwrap();
        assert_eq!(token.access_token(), "tok-after-401");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_unauthorized_login_exhausts_the_tightened_policy() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let transport = mock_transport(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(TransportResponse::new(401))
            }
        });

        let err = manager(transport).obtain().await.unwrap_err();
        match err {
            SyncError::MaxRetriesExceeded { attempts, cause } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*cause, SyncError::CredentialExpired));
            }
            other => panic!("expected MaxRetriesExceeded, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn network_failures_are_retried_by_the_tightened_policy() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let transport = mock_transport(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(BoxError::from("error sending request: connection refused"))
                } else {
                    Ok(login_ok("tok-after-retry", 3600))
                }
            }
        });

        let token = manager(transport).obtain().await.unwrap();
        assert_eq!(token.access_token(), "tok-after-retry");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_acquisition() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let transport = mock_transport(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Ok(login_ok(&format!("tok-{n}"), 3600))
            }
        });

        let credentials = manager(transport);
        let first = credentials.obtain().await.unwrap();
        credentials.invalidate();
        let second = credentials.obtain().await.unwrap();
        assert_ne!(first.access_token(), second.access_token());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_serves_the_still_valid_token() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let transport = mock_transport(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Ok(login_ok("tok-original", 400))
                } else {
                    Ok(TransportResponse::new(503))
                }
            }
        });

        let credentials = manager(transport);
        let first = credentials.obtain().await.unwrap();
        assert_eq!(first.access_token(), "tok-original");

        // Inside the buffer, but the endpoint now only serves 503s.
        tokio::time::advance(Duration::from_secs(150)).await;
        let degraded = credentials.obtain().await.unwrap();
        assert_eq!(degraded.access_token(), "tok-original");

        // An explicit refresh surfaces the failure instead.
        let err = credentials.refresh().await.unwrap_err();
        assert!(matches!(err, SyncError::MaxRetriesExceeded { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_accessors_reflect_the_held_token() {
        let transport = mock_transport(|_| async { Ok(login_ok("tok-1", 3600)) });
        let credentials = manager(transport);

        assert!(credentials.expiry_instant().is_none());
        assert!(credentials.time_until_expiry().is_none());

        credentials.obtain().await.unwrap();
        let remaining = credentials.time_until_expiry().unwrap();
        assert!(remaining <= Duration::from_secs(3600));
        assert!(remaining > Duration::from_secs(3590));

        tokio::time::advance(Duration::from_secs(600)).await;
        let remaining = credentials.time_until_expiry().unwrap();
        assert!(remaining <= Duration::from_secs(3000));
    }
}
