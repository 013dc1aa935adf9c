//! Capabilities the pipeline is built from
//!
//! The host application supplies these; the pipeline only sequences them.
//! Each call receives the cancellation token so long-running work can stop
//! early.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{BoxError, TransportError},
    request::PendingRequest,
    response::ResponseRecord,
};

/// Sends a request and returns the response
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &PendingRequest,
        cancel: &CancellationToken,
    ) -> Result<ResponseRecord, TransportError>;
}

/// Provides the base address relative targets are resolved against
#[async_trait]
pub trait BaseAddressResolver: Send + Sync {
    async fn resolve(&self, cancel: &CancellationToken) -> Result<Url, BoxError>;
}

/// Attaches credentials to a request; runs on every attempt
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn apply(
        &self,
        request: &mut PendingRequest,
        cancel: &CancellationToken,
    ) -> Result<(), BoxError>;
}

/// Records a finished exchange; failures are reported but never fatal
#[async_trait]
pub trait ExchangeLogger: Send + Sync {
    async fn write(
        &self,
        response: Option<&ResponseRecord>,
        elapsed: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), BoxError>;
}

/// Fixed base address
#[derive(Debug, Clone)]
pub struct StaticBaseAddress(Url);

impl StaticBaseAddress {
    pub fn new(url: Url) -> Self {
        Self(url)
    }

    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Url::parse(url).map(Self)
    }
}

#[async_trait]
impl BaseAddressResolver for StaticBaseAddress {
    async fn resolve(&self, _cancel: &CancellationToken) -> Result<Url, BoxError> {
        Ok(self.0.clone())
    }
}

/// Resolves through `inner` once and reuses the answer
///
/// Failed lookups are not cached; the next call tries again.
pub struct CachedBaseAddress<R> {
    inner: R,
    cached: OnceCell<Url>,
}

impl<R: BaseAddressResolver> CachedBaseAddress<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cached: OnceCell::new(),
        }
    }

    pub fn cached(&self) -> Option<&Url> {
        self.cached.get()
    }
}

#[async_trait]
impl<R: BaseAddressResolver> BaseAddressResolver for CachedBaseAddress<R> {
    async fn resolve(&self, cancel: &CancellationToken) -> Result<Url, BoxError> {
        let url = self
            .cached
            .get_or_try_init(|| async {
                debug!("Resolving base address");
                self.inner.resolve(cancel).await
            })
            .await?;
        Ok(url.clone())
    }
}

/// Leaves the request untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthorization;

#[async_trait]
impl Authorizer for NoAuthorization {
    async fn apply(
        &self,
        _request: &mut PendingRequest,
        _cancel: &CancellationToken,
    ) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Sets `Authorization: Bearer <token>`
#[derive(Clone)]
pub struct BearerAuthorizer {
    token: String,
}

impl BearerAuthorizer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for BearerAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuthorizer")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl Authorizer for BearerAuthorizer {
    async fn apply(
        &self,
        request: &mut PendingRequest,
        _cancel: &CancellationToken,
    ) -> Result<(), BoxError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.token))?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// Emits one `tracing` event per exchange
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingExchangeLogger;

#[async_trait]
impl ExchangeLogger for TracingExchangeLogger {
    async fn write(
        &self,
        response: Option<&ResponseRecord>,
        elapsed: Duration,
        _cancel: &CancellationToken,
    ) -> Result<(), BoxError> {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match response {
            Some(response) => {
                let request = response.request();
                let url = request
                    .and_then(|r| r.url().ok())
                    .map(|url| url.to_string())
                    .unwrap_or_else(|| "-".to_string());
                info!(
                    status = response.status(),
                    method = request.map(|r| r.method().as_str()).unwrap_or("-"),
                    url = %url,
                    elapsed_ms,
                    "HTTP exchange completed"
                );
            }
            None => warn!(elapsed_ms, "HTTP exchange produced no response"),
        }
        Ok(())
    }
}

/// Discards every exchange
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExchangeLogger;

#[async_trait]
impl ExchangeLogger for NoopExchangeLogger {
    async fn write(
        &self,
        _response: Option<&ResponseRecord>,
        _elapsed: Duration,
        _cancel: &CancellationToken,
    ) -> Result<(), BoxError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    struct FlakyResolver {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BaseAddressResolver for FlakyResolver {
        async fn resolve(&self, _cancel: &CancellationToken) -> Result<Url, BoxError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                return Err("registry unavailable".into());
            }
            Ok(Url::parse("https://svc.internal/")?)
        }
    }

    #[tokio::test]
    async fn test_static_base_address() {
        let resolver = StaticBaseAddress::parse("https://api.example.com/").unwrap();
        let url = resolver.resolve(&CancellationToken::new()).await.unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/");
    }

    #[tokio::test]
    async fn test_cached_base_address_retries_failure_then_caches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = CachedBaseAddress::new(FlakyResolver {
            calls: Arc::clone(&calls),
        });
        let cancel = CancellationToken::new();

        assert!(resolver.resolve(&cancel).await.is_err());
        assert!(resolver.cached().is_none());

        let first = resolver.resolve(&cancel).await.unwrap();
        let second = resolver.resolve(&cancel).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bearer_authorizer_sets_sensitive_header() {
        let mut request = PendingRequest::get("/me");
        BearerAuthorizer::new("s3cret")
            .apply(&mut request, &CancellationToken::new())
            .await
            .unwrap();
        let value = &request.headers()[AUTHORIZATION];
        assert_eq!(value, "Bearer s3cret");
        assert!(value.is_sensitive());
    }

    #[test]
    fn test_bearer_debug_redacts_token() {
        let debug = format!("{:?}", BearerAuthorizer::new("s3cret"));
        assert!(!debug.contains("s3cret"));
    }

    #[tokio::test]
    async fn test_tracing_logger_accepts_oversized_elapsed() {
        let response = ResponseRecord::new(200, reqwest::header::HeaderMap::new(), "")
            .with_request(Arc::new(PendingRequest::get("https://api.example.com/slow")));
        assert!(TracingExchangeLogger
            .write(Some(&response), Duration::MAX, &CancellationToken::new())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_tracing_logger_tolerates_missing_response() {
        let logger = TracingExchangeLogger;
        let cancel = CancellationToken::new();
        assert!(logger
            .write(None, Duration::from_millis(12), &cancel)
            .await
            .is_ok());
    }
}
