//! reqwest-backed transport

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    collaborators::Transport,
    config::HttpConfig,
    error::{HttpError, Result, TransportError, TransportErrorKind},
    request::PendingRequest,
    response::ResponseRecord,
};

/// Per-request option overriding the client timeout, in milliseconds
pub const TIMEOUT_OPTION: &str = "timeout_ms";

/// Production transport over a pooled reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a new transport with configuration
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .redirect(if config.max_redirects > 0 {
                reqwest::redirect::Policy::limited(config.max_redirects)
            } else {
                reqwest::redirect::Policy::none()
            });

        // Configure proxy if provided
        if let Some(proxy_url) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| HttpError::InvalidProxy(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        // Configure connection pooling
        if config.pool_enabled {
            builder = builder.pool_idle_timeout(config.pool_idle_timeout);
        } else {
            builder = builder.pool_max_idle_per_host(0);
        }

        let inner = builder
            .build()
            .map_err(|e| HttpError::BuildError(e.to_string()))?;

        Ok(Self { inner })
    }

    /// Create transport with default configuration
    pub fn with_defaults() -> Result<Self> {
        Self::new(&HttpConfig::default())
    }

    /// Wrap an already configured reqwest client
    ///
    /// `HttpConfig` settings are not applied; the client is used as given.
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    async fn dispatch(
        &self,
        request: &PendingRequest,
    ) -> std::result::Result<ResponseRecord, TransportError> {
        let url = request
            .url()
            .map_err(|e| TransportError::new(TransportErrorKind::Request, e.to_string()))?;

        let mut builder = self
            .inner
            .request(request.method().clone(), url)
            .version(request.version())
            .headers(request.headers().clone());

        if let Some(body) = request.body() {
            builder = builder.body(body.bytes.clone());
        }
        if let Some(timeout_ms) = request.options().get(TIMEOUT_OPTION).and_then(|v| v.as_u64()) {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let version = response.version();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(ResponseRecord::new(status, headers, body).with_version(version))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &PendingRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<ResponseRecord, TransportError> {
        debug!(method = %request.method(), target = %request.target(), "HTTP dispatch");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::new(
                TransportErrorKind::Other,
                "dispatch cancelled",
            )),
            result = self.dispatch(request) => result,
        }
    }
}
