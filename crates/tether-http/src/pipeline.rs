//! Request execution pipeline
//!
//! [`Pipeline::execute`] drives one logical call:
//!
//! 1. apply the config snapshot (first attempt only)
//! 2. resolve the base address
//! 3. authorize (every attempt)
//! 4. dispatch through the transport; on a fault run the exception chain and
//!    propagate the fault
//! 5. hand the exchange to the logger
//! 6. run the status chain
//! 7. resend a clone while the retry policy asks for it and budget remains
//! 8. enforce success on the final response, clear the snapshot, return
//!
//! Retries are a loop over an owned request, so the call stack stays flat no
//! matter how many attempts are made.

use std::{
    fmt,
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    collaborators::{
        Authorizer, BaseAddressResolver, ExchangeLogger, NoAuthorization, TracingExchangeLogger,
        Transport,
    },
    config::HttpConfig,
    error::{HttpError, Result},
    handler::{
        ChainKind, ChainOutcome, ExceptionContext, ExceptionHandlerChain, Handler,
        StatusHandlerChain,
    },
    naming::NamingStrategy,
    request::PendingRequest,
    response::ResponseRecord,
    retry::{NeverRetry, RetryConfig, RetryPolicy, RetryState},
    snapshot::ClientConfig,
};

/// Terminal outcome of a logical call
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Final response
    pub response: Arc<ResponseRecord>,
    /// Naming strategy in effect when the call ended
    pub naming_strategy: NamingStrategy,
    /// Whether enforce-success was active
    pub enforce_success: bool,
    /// Resends performed
    pub retries: u32,
}

/// Orchestrates dispatch, handlers, and retries around a [`Transport`]
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    resolver: Option<Arc<dyn BaseAddressResolver>>,
    authorizer: Arc<dyn Authorizer>,
    logger: Arc<dyn ExchangeLogger>,
    retry_policy: Arc<dyn RetryPolicy>,
    retry: RetryConfig,
    status_handlers: StatusHandlerChain,
    exception_handlers: ExceptionHandlerChain,
}

impl Pipeline {
    pub fn builder<T>(transport: T) -> PipelineBuilder
    where
        T: Transport + 'static,
    {
        PipelineBuilder::new(Arc::new(transport))
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn status_handlers(&self) -> &StatusHandlerChain {
        &self.status_handlers
    }

    pub fn status_handlers_mut(&mut self) -> &mut StatusHandlerChain {
        &mut self.status_handlers
    }

    pub fn exception_handlers(&self) -> &ExceptionHandlerChain {
        &self.exception_handlers
    }

    pub fn exception_handlers_mut(&mut self) -> &mut ExceptionHandlerChain {
        &mut self.exception_handlers
    }

    /// Register a handler run for every response
    pub fn on_response<H>(&mut self, handler: H) -> &mut Self
    where
        H: Handler<Arc<ResponseRecord>> + 'static,
    {
        self.status_handlers.register(handler);
        self
    }

    /// Register a handler run when dispatch fails
    pub fn on_exception<H>(&mut self, handler: H) -> &mut Self
    where
        H: Handler<ExceptionContext> + 'static,
    {
        self.exception_handlers.register(handler);
        self
    }

    /// Run one logical call to its terminal outcome
    ///
    /// `config` is applied on the first attempt and cleared before returning,
    /// whether the call succeeded or faulted.
    pub async fn execute(
        &self,
        request: PendingRequest,
        config: &mut ClientConfig,
        cancel: &CancellationToken,
    ) -> Result<Exchange> {
        let mut state = RetryState::new(self.retry.budget);
        let outcome = self.drive(request, config, &mut state, cancel).await;
        config.clear();
        state.finish();
        if let Err(error) = &outcome {
            debug!(error = %error, retries = state.attempts(), "Pipeline call failed");
        }
        outcome
    }

    async fn drive(
        &self,
        request: PendingRequest,
        config: &mut ClientConfig,
        state: &mut RetryState,
        cancel: &CancellationToken,
    ) -> Result<Exchange> {
        let mut pending = request;

        loop {
            // Path and query already materialized into the clone on retries
            if !state.in_progress() {
                config.apply_to(&mut pending);
            }

            if let Some(resolver) = &self.resolver {
                let base = cancellable(cancel, resolver.resolve(cancel))
                    .await?
                    .map_err(HttpError::BaseAddress)?;
                pending.set_base_address(base);
            }

            cancellable(cancel, self.authorizer.apply(&mut pending, cancel))
                .await?
                .map_err(HttpError::Authorization)?;

            let sent = Arc::new(pending);
            debug!(
                method = %sent.method(),
                target = %sent.target(),
                attempt = state.attempts() + 1,
                "Dispatching request"
            );

            let started = Instant::now();
            let dispatched = cancellable(cancel, self.transport.send(&sent, cancel)).await?;
            let elapsed = started.elapsed();

            let response = match dispatched {
                Ok(response) => Arc::new(response.with_request(Arc::clone(&sent))),
                Err(fault) => {
                    let fault = Arc::new(fault);
                    warn!(
                        target = %sent.target(),
                        kind = %fault.kind(),
                        error = %fault,
                        "Request dispatch failed"
                    );
                    let context = ExceptionContext {
                        response: None,
                        fault: Arc::clone(&fault),
                    };
                    if self.exception_handlers.run(context, cancel).await? == ChainOutcome::Empty {
                        debug!("No exception handlers registered");
                    }
                    self.write_log(None, elapsed, cancel).await?;
                    return Err(HttpError::Transport(fault));
                }
            };

            self.write_log(Some(&response), elapsed, cancel).await?;

            if response.is_success() {
                trace!(status = response.status(), target = %sent.target(), "Request succeeded");
            } else {
                warn!(
                    status = response.status(),
                    target = %sent.target(),
                    body = %response.text(),
                    "Response status does not indicate success"
                );
            }

            self.status_handlers
                .run(Arc::clone(&response), cancel)
                .await?;

            if self.retry_policy.should_retry(&response) {
                if cancel.is_cancelled() {
                    return Err(HttpError::Cancelled);
                }
                if state.try_consume() {
                    info!(
                        target = %sent.target(),
                        previous_status = response.status(),
                        remaining = state.remaining(),
                        "Retrying request"
                    );
                    let delay = self.retry.calculate_delay(state.attempts() - 1);
                    if !delay.is_zero() {
                        cancellable(cancel, tokio::time::sleep(delay)).await?;
                    }
                    pending = sent.clone_for_retry();
                    continue;
                }
                info!(
                    status = response.status(),
                    retries = state.attempts(),
                    "Retry budget exhausted, returning last response"
                );
            }

            let options = config.options();
            if options.enforce_success && !response.is_success() {
                let source = match &options.on_success_violation {
                    Some(callback) => match callback(response.as_ref()) {
                        Ok(()) => {
                            debug!(status = response.status(), "Success violation suppressed");
                            None
                        }
                        Err(error) => Some(Some(error)),
                    },
                    None => Some(None),
                };
                if let Some(source) = source {
                    return Err(HttpError::StatusEnforcement {
                        status: response.status(),
                        response,
                        source,
                    });
                }
            }

            return Ok(Exchange {
                response,
                naming_strategy: options.naming_strategy,
                enforce_success: options.enforce_success,
                retries: state.attempts(),
            });
        }
    }

    async fn write_log(
        &self,
        response: Option<&ResponseRecord>,
        elapsed: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let written = cancellable(cancel, self.logger.write(response, elapsed, cancel)).await?;
        if let Err(error) = written {
            warn!(error = %error, "Exchange logger failed");
        }
        Ok(())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("retry", &self.retry)
            .field("has_resolver", &self.resolver.is_some())
            .field("status_handlers", &self.status_handlers)
            .field("exception_handlers", &self.exception_handlers)
            .finish()
    }
}

/// Await `future` unless `cancel` fires first
async fn cancellable<F: Future>(cancel: &CancellationToken, future: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(HttpError::Cancelled),
        output = future => Ok(output),
    }
}

/// Assembles a [`Pipeline`] from its collaborators
pub struct PipelineBuilder {
    transport: Arc<dyn Transport>,
    resolver: Option<Arc<dyn BaseAddressResolver>>,
    authorizer: Arc<dyn Authorizer>,
    logger: Arc<dyn ExchangeLogger>,
    retry_policy: Arc<dyn RetryPolicy>,
    retry: RetryConfig,
}

impl PipelineBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            resolver: None,
            authorizer: Arc::new(NoAuthorization),
            logger: Arc::new(TracingExchangeLogger),
            retry_policy: Arc::new(NeverRetry),
            retry: RetryConfig::default(),
        }
    }

    pub fn base_address<R>(mut self, resolver: R) -> Self
    where
        R: BaseAddressResolver + 'static,
    {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn authorizer<A>(mut self, authorizer: A) -> Self
    where
        A: Authorizer + 'static,
    {
        self.authorizer = Arc::new(authorizer);
        self
    }

    pub fn logger<L>(mut self, logger: L) -> Self
    where
        L: ExchangeLogger + 'static,
    {
        self.logger = Arc::new(logger);
        self
    }

    pub fn retry_policy<P>(mut self, policy: P) -> Self
    where
        P: RetryPolicy + 'static,
    {
        self.retry_policy = Arc::new(policy);
        self
    }

    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Take retry settings from `config`
    pub fn config(self, config: &HttpConfig) -> Self {
        self.retry_config(config.retry())
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            transport: self.transport,
            resolver: self.resolver,
            authorizer: self.authorizer,
            logger: self.logger,
            retry_policy: self.retry_policy,
            retry: self.retry,
            status_handlers: StatusHandlerChain::new(ChainKind::Status),
            exception_handlers: ExceptionHandlerChain::new(ChainKind::Exception),
        }
    }
}
