//! Network port used by the fetcher, and its reqwest-backed adapter.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::instrument;
use weatherwatch_core::{NetworkError, ReqwestErrorExt};

/// A single JSON GET against the upstream service.
///
/// Implementations report non-2xx responses and timeouts as `NetworkError`;
/// the fetcher decides what to retry.
pub trait Network: Send + Sync + 'static {
    fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, NetworkError>> + Send;
}

/// `Network` over HTTP
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new() -> Result<Self, NetworkError> {
        let client = Client::builder()
            .user_agent(concat!("weatherwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        Ok(Self { client })
    }
}

impl Network for HttpNetwork {
    #[instrument(skip(self, params), level = "debug")]
    async fn get(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Result<Value, NetworkError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .timeout(timeout)
            .send()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NetworkError::ServerError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(ReqwestErrorExt::into_network_error)?;

        serde_json::from_slice(&body).map_err(|e| NetworkError::InvalidResponse(e.to_string()))
    }
}
