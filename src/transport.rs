//! reqwest-backed implementation of the transport contract.

use futures::future::BoxFuture;
use std::task::{Context, Poll};
use syncline_core::transport::{
    BoxError, BoxTransport, Method, TransportRequest, TransportResponse,
};
use syncline_core::SyncError;
use tower::util::BoxCloneSyncService;
use tower::Service;

/// Production transport. Per-call deadlines are enforced upstream by the
/// request pipeline, so the underlying client carries none of its own.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| SyncError::Transport {
                message: format!("failed to build http client: {err}"),
            })?;
        Ok(Self { client })
    }

    /// Boxes this transport into the shared [`BoxTransport`] handle.
    pub fn boxed(self) -> BoxTransport {
        BoxCloneSyncService::new(self)
    }
}

impl Service<TransportRequest> for HttpTransport {
    type Response = TransportResponse;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<TransportResponse, BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: TransportRequest) -> Self::Future {
        let client = self.client.clone();

        Box::pin(async move {
            let method = match request.method {
                Method::Get => reqwest::Method::GET,
                Method::Post => reqwest::Method::POST,
                Method::Put => reqwest::Method::PUT,
                Method::Delete => reqwest::Method::DELETE,
            };

            let mut builder = client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(|err| BoxError::from(err))?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response.text().await.map_err(BoxError::from)?;

            Ok(TransportResponse {
                status,
                headers,
                body,
            })
        })
    }
}
