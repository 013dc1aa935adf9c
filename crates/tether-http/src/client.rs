//! Fluent client over the request pipeline
//!
//! Builder methods fill the client's [`ClientConfig`]; the `send*` methods
//! hand it to the [`Pipeline`], which applies and then clears it. Handlers
//! registered here live on the pipeline and persist across calls.

use std::{future::Future, marker::PhantomData, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use reqwest::{
    header::{HeaderName, HeaderValue, ACCEPT},
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    config::HttpConfig,
    error::{BoxError, HttpError, Result},
    handler::{ExceptionContext, Handler},
    naming::NamingStrategy,
    pipeline::{Exchange, Pipeline},
    request::{PendingRequest, RequestBody},
    response::ResponseRecord,
    snapshot::{ClientConfig, ClientOptions},
    transport::{ReqwestTransport, TIMEOUT_OPTION},
};

const JSON_CONTENT_TYPE: &str = "application/json";

/// HTTP client with a fluent, per-call builder
#[derive(Debug)]
pub struct HttpClient {
    pipeline: Pipeline,
    config: ClientConfig,
}

impl HttpClient {
    /// Wrap `pipeline`; naming and enforce-success defaults come from `config`
    pub fn new(pipeline: Pipeline, config: &HttpConfig) -> Self {
        Self {
            pipeline,
            config: ClientConfig::with_defaults(config.client_options()),
        }
    }

    /// Client over a [`ReqwestTransport`] built from `config`
    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(config)?;
        let pipeline = Pipeline::builder(transport).config(config).build();
        Ok(Self::new(pipeline, config))
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// Pending builder state for the next call
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // Builder surface

    /// Replace the request path
    pub fn url(&mut self, path: impl Into<String>) -> &mut Self {
        self.config.set_path(path);
        self
    }

    /// Append a path segment
    pub fn append_url(&mut self, segment: impl AsRef<str>) -> &mut Self {
        self.config.append_path(segment.as_ref());
        self
    }

    /// Add a query parameter, replacing any earlier value for `key`
    pub fn query(&mut self, key: impl Into<String>, value: impl ToString) -> Result<&mut Self> {
        let key = key.into();
        let value = value.to_string();
        if value.is_empty() {
            return Err(HttpError::InvalidQueryParameter(format!(
                "empty value for '{key}'"
            )));
        }
        self.config.query_mut().replace(key, Some(value))?;
        Ok(self)
    }

    pub fn has_query(&self, key: &str) -> bool {
        self.config.query().contains_key(key)
    }

    pub fn clear_query(&mut self) -> &mut Self {
        self.config.query_mut().clear();
        self
    }

    /// Queue a one-shot request mutation for the next call
    pub fn configure_request<F>(&mut self, mutate: F) -> &mut Self
    where
        F: FnOnce(&mut PendingRequest) + Send + 'static,
    {
        self.config.push_request_mutator(Box::new(mutate));
        self
    }

    /// Queue a one-shot options mutation for the next call
    pub fn configure_client<F>(&mut self, mutate: F) -> &mut Self
    where
        F: FnOnce(&mut ClientOptions) + Send + 'static,
    {
        self.config.push_client_mutator(Box::new(mutate));
        self
    }

    pub fn get(&mut self) -> &mut Self {
        self.method(Method::GET)
    }

    pub fn delete(&mut self) -> &mut Self {
        self.method(Method::DELETE)
    }

    /// POST `body` serialized with the current naming strategy
    pub fn post<T: Serialize + ?Sized>(&mut self, body: &T) -> Result<&mut Self> {
        self.with_json_body(Method::POST, body)
    }

    pub fn put<T: Serialize + ?Sized>(&mut self, body: &T) -> Result<&mut Self> {
        self.with_json_body(Method::PUT, body)
    }

    pub fn patch<T: Serialize + ?Sized>(&mut self, body: &T) -> Result<&mut Self> {
        self.with_json_body(Method::PATCH, body)
    }

    fn method(&mut self, method: Method) -> &mut Self {
        self.configure_request(move |request| request.set_method(method))
    }

    fn with_json_body<T: Serialize + ?Sized>(
        &mut self,
        method: Method,
        body: &T,
    ) -> Result<&mut Self> {
        let bytes = self.config.options().naming_strategy.serialize(body)?;
        let body = RequestBody::new(bytes, JSON_CONTENT_TYPE);
        Ok(self.configure_request(move |request| {
            request.set_method(method);
            request.set_body(body);
        }))
    }

    /// Set the `Accept` header
    pub fn accept(&mut self, media_type: &str) -> Result<&mut Self> {
        let value = HeaderValue::from_str(media_type)
            .map_err(|e| HttpError::InvalidHeader(format!("accept: {e}")))?;
        Ok(self.configure_request(move |request| {
            request.headers_mut().insert(ACCEPT, value);
        }))
    }

    pub fn accept_json(&mut self) -> &mut Self {
        let value = HeaderValue::from_static(JSON_CONTENT_TYPE);
        self.configure_request(move |request| {
            request.headers_mut().insert(ACCEPT, value);
        })
    }

    /// Append a header; name and value are validated now
    pub fn header(&mut self, name: &str, value: &str) -> Result<&mut Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::InvalidHeader(format!("{name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HttpError::InvalidHeader(format!("{name}: {e}")))?;
        Ok(self.configure_request(move |request| {
            request.headers_mut().append(name, value);
        }))
    }

    /// Override the transport timeout for the next call
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.configure_request(move |request| {
            request.set_option(TIMEOUT_OPTION, serde_json::Value::from(millis));
        })
    }

    pub fn camel_case(&mut self) -> &mut Self {
        self.naming(NamingStrategy::Camel)
    }

    pub fn snake_case(&mut self) -> &mut Self {
        self.naming(NamingStrategy::Snake)
    }

    pub fn naming(&mut self, strategy: NamingStrategy) -> &mut Self {
        self.config.options_mut().naming_strategy = strategy;
        self
    }

    /// Fail the next call unless its final status is 2xx
    pub fn ensure_success(&mut self) -> &mut Self {
        let options = self.config.options_mut();
        options.enforce_success = true;
        options.on_success_violation = None;
        self
    }

    /// Like [`ensure_success`](Self::ensure_success), but `callback` decides:
    /// `Ok` swallows the violation, `Err` becomes the fault's source
    pub fn ensure_success_with<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&ResponseRecord) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    {
        let options = self.config.options_mut();
        options.enforce_success = true;
        options.on_success_violation = Some(Arc::new(callback));
        self
    }

    /// Drop all pending builder state
    pub fn clear(&mut self) -> &mut Self {
        self.config.clear();
        self
    }

    // Handlers

    /// Run `handler` for every response
    pub fn on_any_response<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Arc<ResponseRecord>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.pipeline.on_response(handler);
        self
    }

    /// Run `handler` only for responses with exactly `status`
    pub fn on_status<F, Fut>(&mut self, status: u16, handler: F) -> &mut Self
    where
        F: Fn(Arc<ResponseRecord>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.pipeline.on_response(OnStatus { status, handler });
        self
    }

    pub fn on_bad_request<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Arc<ResponseRecord>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.on_status(400, handler)
    }

    pub fn on_unauthorized<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Arc<ResponseRecord>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.on_status(401, handler)
    }

    pub fn on_forbidden<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Arc<ResponseRecord>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.on_status(403, handler)
    }

    pub fn on_not_found<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Arc<ResponseRecord>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.on_status(404, handler)
    }

    pub fn on_too_many_requests<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Arc<ResponseRecord>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.on_status(429, handler)
    }

    /// Run `handler` on 400 responses with the body decoded as `E`
    ///
    /// The body is decoded with the naming strategy active at registration. A
    /// body that does not decode faults the handler.
    pub fn on_bad_request_json<E, F, Fut>(&mut self, handler: F) -> &mut Self
    where
        E: DeserializeOwned + Send + 'static,
        F: Fn(E, Arc<ResponseRecord>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        let naming = self.config.options().naming_strategy;
        self.pipeline.on_response(OnJsonStatus {
            status: 400,
            naming,
            handler,
            payload: PhantomData,
        });
        self
    }

    /// Observe transport faults; the fault still reaches the caller
    pub fn on_exception<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(ExceptionContext, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.pipeline.on_exception(handler);
        self
    }

    /// Remove every status and exception handler
    pub fn clear_handlers(&mut self) -> &mut Self {
        self.pipeline.status_handlers_mut().clear();
        self.pipeline.exception_handlers_mut().clear();
        self
    }

    // Sends

    /// Run the pending call and return the full exchange
    pub async fn send(&mut self, cancel: &CancellationToken) -> Result<Exchange> {
        let request = PendingRequest::get(self.config.path());
        self.pipeline.execute(request, &mut self.config, cancel).await
    }

    /// Run the pending call and stream the response body
    pub async fn send_for_stream(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<BoxStream<'static, std::io::Result<Bytes>>> {
        let exchange = self.send(cancel).await?;
        let body = exchange.response.body().clone();
        let chunk = (!body.is_empty()).then_some(Ok(body));
        Ok(stream::iter(chunk).boxed())
    }

    /// Run the pending call and return the body as text; `None` when empty
    pub async fn send_for_string(&mut self, cancel: &CancellationToken) -> Result<Option<String>> {
        let exchange = self.send(cancel).await?;
        if exchange.response.body().is_empty() {
            return Ok(None);
        }
        Ok(Some(exchange.response.text()))
    }

    /// Run the pending call and decode the body as `T`
    ///
    /// An empty body yields `None`. A body that does not decode yields `None`
    /// unless enforce-success was active, in which case the fault propagates.
    pub async fn send_for_value<T: DeserializeOwned>(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<T>> {
        let exchange = self.send(cancel).await?;
        let body = exchange.response.body();
        if body.is_empty() {
            return Ok(None);
        }
        match exchange.naming_strategy.deserialize(body) {
            Ok(value) => Ok(Some(value)),
            Err(error) if exchange.enforce_success => Err(error),
            Err(error) => {
                warn!(
                    status = exchange.response.status(),
                    error = %error,
                    "Discarding response body that failed to deserialize"
                );
                Ok(None)
            }
        }
    }
}

/// Status handler filtered to one raw status code
struct OnStatus<F> {
    status: u16,
    handler: F,
}

#[async_trait]
impl<F, Fut> Handler<Arc<ResponseRecord>> for OnStatus<F>
where
    F: Fn(Arc<ResponseRecord>, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
{
    async fn call(
        &self,
        response: Arc<ResponseRecord>,
        cancel: CancellationToken,
    ) -> std::result::Result<(), BoxError> {
        if response.status() != self.status {
            return Ok(());
        }
        (self.handler)(response, cancel).await
    }
}

/// Status handler that decodes the body before calling through
struct OnJsonStatus<E, F> {
    status: u16,
    naming: NamingStrategy,
    handler: F,
    payload: PhantomData<fn() -> E>,
}

#[async_trait]
impl<E, F, Fut> Handler<Arc<ResponseRecord>> for OnJsonStatus<E, F>
where
    E: DeserializeOwned + Send + 'static,
    F: Fn(E, Arc<ResponseRecord>, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
{
    async fn call(
        &self,
        response: Arc<ResponseRecord>,
        cancel: CancellationToken,
    ) -> std::result::Result<(), BoxError> {
        if response.status() != self.status {
            return Ok(());
        }
        let payload: E = self.naming.deserialize(response.body())?;
        debug!(status = self.status, "Decoded error payload for handler");
        (self.handler)(payload, response, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use reqwest::header::{HeaderMap, CONTENT_TYPE};
    use serde::Deserialize;

    use super::*;
    use crate::{collaborators::Transport, error::TransportError};

    #[derive(Default)]
    struct Recording {
        reply: Mutex<Option<(u16, &'static str)>>,
        seen: Mutex<Vec<PendingRequest>>,
    }

    #[async_trait]
    impl Transport for Arc<Recording> {
        async fn send(
            &self,
            request: &PendingRequest,
            _cancel: &CancellationToken,
        ) -> std::result::Result<ResponseRecord, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            let reply = *self.reply.lock().unwrap();
            let (status, body) = reply.unwrap_or((200, ""));
            Ok(ResponseRecord::new(status, HeaderMap::new(), body))
        }
    }

    fn client(status: u16, body: &'static str) -> (HttpClient, Arc<Recording>) {
        let transport = Arc::new(Recording::default());
        *transport.reply.lock().unwrap() = Some((status, body));
        let pipeline = Pipeline::builder(Arc::clone(&transport)).build();
        (HttpClient::new(pipeline, &HttpConfig::default()), transport)
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Account {
        user_id: u32,
        display_name: String,
    }

    #[tokio::test]
    async fn test_post_serializes_with_camel_case() {
        let (mut client, transport) = client(201, "");
        client
            .url("https://api.test/accounts")
            .post(&Account {
                user_id: 7,
                display_name: "Ada".into(),
            })
            .unwrap();
        client.send(&CancellationToken::new()).await.unwrap();

        let seen = transport.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.headers()[CONTENT_TYPE], JSON_CONTENT_TYPE);
        let body: serde_json::Value =
            serde_json::from_slice(&request.body().unwrap().bytes).unwrap();
        assert_eq!(body, serde_json::json!({"userId": 7, "displayName": "Ada"}));
    }

    #[tokio::test]
    async fn test_send_for_value_decodes_snake_case() {
        let (mut client, _) = client(200, r#"{"user_id": 3, "display_name": "Lin"}"#);
        client.url("https://api.test/me").snake_case();
        let account: Option<Account> = client
            .send_for_value(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            account,
            Some(Account {
                user_id: 3,
                display_name: "Lin".into()
            })
        );
    }

    #[tokio::test]
    async fn test_send_for_value_swallows_bad_body_without_enforcement() {
        let (mut client, _) = client(200, "<html>");
        client.url("https://api.test/me");
        let value: Option<Account> = client
            .send_for_value(&CancellationToken::new())
            .await
            .unwrap();
        assert!(value.is_none());

        client.url("https://api.test/me").ensure_success();
        let error = client
            .send_for_value::<Account>(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(error, HttpError::Deserialization(_)));
    }

    #[tokio::test]
    async fn test_send_for_string_empty_body_is_none() {
        let (mut client, _) = client(204, "");
        client.url("https://api.test/ping");
        assert_eq!(client.send_for_string(&CancellationToken::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_send_for_stream_yields_body() {
        let (mut client, _) = client(200, "chunk");
        client.url("https://api.test/blob");
        let chunks: Vec<_> = client
            .send_for_stream(&CancellationToken::new())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap(), &Bytes::from_static(b"chunk"));
    }

    #[tokio::test]
    async fn test_on_status_filters_by_code() {
        let (mut client, _) = client(404, "");
        let not_found = Arc::new(AtomicUsize::new(0));
        let forbidden = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&not_found);
        client.on_not_found(move |_, _| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        });
        let counter = Arc::clone(&forbidden);
        client.on_forbidden(move |_, _| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        });

        client.url("https://api.test/missing");
        client.send(&CancellationToken::new()).await.unwrap();
        assert_eq!(not_found.load(Ordering::SeqCst), 1);
        assert_eq!(forbidden.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_on_bad_request_json_decodes_payload() {
        #[derive(Deserialize)]
        struct Problem {
            error_code: String,
        }

        let (mut client, _) = client(400, r#"{"errorCode": "E42"}"#);
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        client.on_bad_request_json(move |problem: Problem, _, _| {
            let sink = Arc::clone(&sink);
            async move {
                *sink.lock().unwrap() = Some(problem.error_code);
                Ok::<(), BoxError>(())
            }
        });

        client.url("https://api.test/orders");
        client.send(&CancellationToken::new()).await.unwrap();
        assert_eq!(seen.lock().unwrap().as_deref(), Some("E42"));
    }

    #[tokio::test]
    async fn test_builder_state_cleared_after_send() {
        let (mut client, transport) = client(200, "");
        client
            .url("https://api.test/items")
            .query("page", 2)
            .unwrap()
            .header("x-trace", "abc")
            .unwrap()
            .accept_json()
            .timeout(Duration::from_millis(1500));
        assert!(client.has_query("page"));

        client.send(&CancellationToken::new()).await.unwrap();
        assert!(client.config().is_empty());
        assert!(!client.has_query("page"));

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].target(), "https://api.test/items?page=2");
        assert_eq!(seen[0].headers()["x-trace"], "abc");
        assert_eq!(seen[0].headers()[ACCEPT], JSON_CONTENT_TYPE);
        assert_eq!(seen[0].options()[TIMEOUT_OPTION], serde_json::json!(1500));
    }

    #[tokio::test]
    async fn test_oversized_timeout_saturates() {
        let (mut client, transport) = client(200, "");
        client.url("https://api.test/export").timeout(Duration::MAX);
        client.send(&CancellationToken::new()).await.unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].options()[TIMEOUT_OPTION], serde_json::json!(u64::MAX));
    }

    #[test]
    fn test_query_rejects_empty_value_and_replaces_existing() {
        let (mut client, _) = client(200, "");
        assert!(matches!(
            client.query("q", ""),
            Err(HttpError::InvalidQueryParameter(_))
        ));
        client.query("q", "a").unwrap();
        client.query("q", "b").unwrap();
        assert_eq!(client.config().query().get("q"), Some("b"));
    }

    #[test]
    fn test_invalid_header_rejected_eagerly() {
        let (mut client, _) = client(200, "");
        assert!(matches!(
            client.header("bad header", "x"),
            Err(HttpError::InvalidHeader(_))
        ));
        assert_eq!(client.config().pending_mutators(), 0);
    }

    #[test]
    fn test_clear_handlers() {
        let (mut client, _) = client(200, "");
        client.on_any_response(|_, _| async { Ok::<(), BoxError>(()) });
        client.on_exception(|_, _| async { Ok::<(), BoxError>(()) });
        client.clear_handlers();
        assert!(client.pipeline().status_handlers().is_empty());
        assert!(client.pipeline().exception_handlers().is_empty());
    }
}
