//! Configurable outbound HTTP request pipeline
//!
//! Wraps request construction, dispatch, response inspection and retry into
//! one send path, with pluggable hooks for authorization, base-address
//! resolution, exchange logging and response handling.
//!
//! ## Features
//!
//! - **Ordered handler chains**: status and exception callbacks run strictly in registration order
//! - **Bounded retry**: opt-in retry policy with a per-call budget and optional backoff
//! - **Per-call builder state**: query, path and mutators applied once, cleared after every call
//! - **Pluggable collaborators**: transport, authorizer, base address and logger are traits
//! - **Naming strategies**: camelCase / snake_case JSON payload keys
//! - **Cancellation**: every suspension point honours a `CancellationToken`
//!
//! ## Example
//!
//! ```no_run
//! use tether_http::{HttpClient, HttpConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> tether_http::Result<()> {
//! let mut client = HttpClient::from_config(&HttpConfig::default())?;
//! let _body = client
//!     .url("https://api.example.com/items")
//!     .query("page", 2)?
//!     .accept_json()
//!     .send_for_string(&CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod handler;
pub mod naming;
pub mod pipeline;
pub mod query;
pub mod request;
pub mod response;
pub mod retry;
pub mod snapshot;
pub mod transport;

pub use client::HttpClient;
pub use collaborators::{
    Authorizer, BaseAddressResolver, BearerAuthorizer, CachedBaseAddress, ExchangeLogger,
    NoAuthorization, NoopExchangeLogger, StaticBaseAddress, TracingExchangeLogger, Transport,
};
pub use config::HttpConfig;
pub use error::{BoxError, HttpError, Result, TransportError, TransportErrorKind};
pub use handler::{
    ChainKind, ChainOutcome, ExceptionContext, ExceptionHandlerChain, Handler, HandlerChain,
    StatusHandlerChain,
};
pub use naming::NamingStrategy;
pub use pipeline::{Exchange, Pipeline, PipelineBuilder};
pub use query::QueryParameters;
pub use request::{PendingRequest, RequestBody};
pub use response::ResponseRecord;
pub use retry::{NeverRetry, RetryConfig, RetryOnStatus, RetryPolicy, RetryState};
pub use snapshot::{ClientConfig, ClientOptions};
pub use transport::ReqwestTransport;

/// Re-export commonly used types
pub use reqwest::{header, Method, StatusCode};
