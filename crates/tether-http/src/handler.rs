//! Ordered handler chains
//!
//! A chain is an append-only list of asynchronous callbacks. Invocation runs
//! them strictly one after another in registration order; the first fault
//! stops the pass and surfaces as [`HttpError::Handler`]. Cancellation is
//! checked before each handler starts and while it runs.
//!
//! Two chains are used by the pipeline:
//!
//! - the status chain receives every response, including each retry attempt
//! - the exception chain receives transport faults
//!
//! They are independent: running one never touches the other.

use std::{fmt, future::Future, sync::Arc};

use async_trait::async_trait;
use futures::{
    stream::{self, BoxStream},
    StreamExt,
};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{
    error::{BoxError, HttpError, Result, TransportError},
    response::ResponseRecord,
};

/// Which chain a handler belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainKind {
    Status,
    Exception,
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKind::Status => f.write_str("status"),
            ChainKind::Exception => f.write_str("exception"),
        }
    }
}

/// Result of running a whole chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Nothing was registered
    Empty,
    /// Every handler ran; holds how many
    Completed(usize),
}

/// Context handed to exception handlers
#[derive(Debug, Clone)]
pub struct ExceptionContext {
    /// Best available response; absent when dispatch produced none
    pub response: Option<Arc<ResponseRecord>>,
    pub fault: Arc<TransportError>,
}

/// An asynchronous callback registered in a [`HandlerChain`]
///
/// Closures of the shape `Fn(C, CancellationToken) -> impl Future<Output =
/// Result<(), BoxError>>` implement this automatically.
#[async_trait]
pub trait Handler<C>: Send + Sync {
    async fn call(
        &self,
        context: C,
        cancel: CancellationToken,
    ) -> std::result::Result<(), BoxError>;
}

#[async_trait]
impl<C, F, Fut> Handler<C> for F
where
    C: Send + 'static,
    F: Fn(C, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
{
    async fn call(
        &self,
        context: C,
        cancel: CancellationToken,
    ) -> std::result::Result<(), BoxError> {
        (self)(context, cancel).await
    }
}

/// Ordered, append-only list of handlers
pub struct HandlerChain<C> {
    kind: ChainKind,
    handlers: Vec<Arc<dyn Handler<C>>>,
}

/// Chain run for every received response
pub type StatusHandlerChain = HandlerChain<Arc<ResponseRecord>>;

/// Chain run when dispatch fails
pub type ExceptionHandlerChain = HandlerChain<ExceptionContext>;

impl<C> HandlerChain<C>
where
    C: Clone + Send + Sync + 'static,
{
    pub fn new(kind: ChainKind) -> Self {
        Self {
            kind,
            handlers: Vec::new(),
        }
    }

    pub fn kind(&self) -> ChainKind {
        self.kind
    }

    /// Append a handler; it runs after every handler registered before it
    pub fn register<H>(&mut self, handler: H) -> &mut Self
    where
        H: Handler<C> + 'static,
    {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Append an already shared handler
    pub fn register_shared(&mut self, handler: Arc<dyn Handler<C>>) -> &mut Self {
        self.handlers.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// Lazily invoke every handler in order
    ///
    /// Each item is the awaited result of one handler, yielding the handler's
    /// index on success. Nothing runs until the stream is polled. After the
    /// first error the stream ends.
    pub fn invoke_all<'a>(
        &'a self,
        context: C,
        cancel: &'a CancellationToken,
    ) -> BoxStream<'a, Result<usize>> {
        let kind = self.kind;
        stream::unfold(Some(0usize), move |state| {
            let context = context.clone();
            async move {
                let index = state?;
                let handler = self.handlers.get(index)?;

                if cancel.is_cancelled() {
                    return Some((Err(HttpError::Cancelled), None));
                }

                trace!(chain = %kind, index, "Executing handler");
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(HttpError::Cancelled),
                    result = handler.call(context, cancel.clone()) => {
                        result.map_err(|source| HttpError::Handler { chain: kind, index, source })
                    }
                };
                trace!(chain = %kind, index, ok = outcome.is_ok(), "Executed handler");

                match outcome {
                    Ok(()) => Some((Ok(index), Some(index + 1))),
                    Err(error) => Some((Err(error), None)),
                }
            }
        })
        .boxed()
    }

    /// Run the whole chain to completion
    pub async fn run(&self, context: C, cancel: &CancellationToken) -> Result<ChainOutcome> {
        if self.handlers.is_empty() {
            return Ok(ChainOutcome::Empty);
        }

        let mut invocations = self.invoke_all(context, cancel);
        let mut completed = 0;
        while let Some(result) = invocations.next().await {
            result?;
            completed += 1;
        }
        Ok(ChainOutcome::Completed(completed))
    }
}

impl<C> fmt::Debug for HandlerChain<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("kind", &self.kind)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
