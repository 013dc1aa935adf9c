//! Per-call configuration snapshot
//!
//! The builder surface fills a [`ClientConfig`] before a send. The pipeline
//! applies it to the request at the start of the first attempt and clears it
//! once the call reaches a terminal outcome, so the next call starts cold.

use std::{fmt, sync::Arc};

use tracing::trace;

use crate::{
    error::BoxError, naming::NamingStrategy, query::QueryParameters, request::PendingRequest,
    response::ResponseRecord,
};

/// One-shot mutation of the pending request
pub type RequestMutator = Box<dyn FnOnce(&mut PendingRequest) + Send>;

/// One-shot mutation of the client options
pub type ClientMutator = Box<dyn FnOnce(&mut ClientOptions) + Send>;

/// Called when enforce-success trips; returning `Ok` swallows the violation
pub type SuccessViolationCallback =
    Arc<dyn Fn(&ResponseRecord) -> std::result::Result<(), BoxError> + Send + Sync>;

/// Settings that client mutators may change
#[derive(Clone, Default)]
pub struct ClientOptions {
    pub naming_strategy: NamingStrategy,
    pub enforce_success: bool,
    pub on_success_violation: Option<SuccessViolationCallback>,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("naming_strategy", &self.naming_strategy)
            .field("enforce_success", &self.enforce_success)
            .field(
                "on_success_violation",
                &self.on_success_violation.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

/// Mutable builder state for one logical call
#[derive(Default)]
pub struct ClientConfig {
    defaults: ClientOptions,
    options: ClientOptions,
    request_mutators: Vec<RequestMutator>,
    client_mutators: Vec<ClientMutator>,
    query: QueryParameters,
    path: String,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config whose options reset to `defaults` on every clear
    pub fn with_defaults(defaults: ClientOptions) -> Self {
        Self {
            options: defaults.clone(),
            defaults,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut ClientOptions {
        &mut self.options
    }

    pub fn query(&self) -> &QueryParameters {
        &self.query
    }

    pub fn query_mut(&mut self) -> &mut QueryParameters {
        &mut self.query
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Append a segment, inserting `/` when the current path lacks one
    pub fn append_path(&mut self, segment: &str) {
        if !self.path.is_empty() && !self.path.ends_with('/') && !segment.starts_with('/') {
            self.path.push('/');
        }
        self.path.push_str(segment);
    }

    pub fn push_request_mutator(&mut self, mutator: RequestMutator) {
        self.request_mutators.push(mutator);
    }

    pub fn push_client_mutator(&mut self, mutator: ClientMutator) {
        self.client_mutators.push(mutator);
    }

    pub fn pending_mutators(&self) -> usize {
        self.request_mutators.len() + self.client_mutators.len()
    }

    /// Nothing pending: no mutators, no query parameters, empty path
    pub fn is_empty(&self) -> bool {
        self.pending_mutators() == 0 && self.query.is_empty() && self.path.is_empty()
    }

    /// Apply pending state to `request`
    ///
    /// Client mutators run first, then request mutators, then the query
    /// parameters are flattened onto the request target. Mutators are consumed.
    pub fn apply_to(&mut self, request: &mut PendingRequest) {
        let client_mutators = std::mem::take(&mut self.client_mutators);
        let request_mutators = std::mem::take(&mut self.request_mutators);
        trace!(
            client_mutators = client_mutators.len(),
            request_mutators = request_mutators.len(),
            query_parameters = self.query.len(),
            "Applying client config"
        );

        for mutate in client_mutators {
            mutate(&mut self.options);
        }
        for mutate in request_mutators {
            mutate(request);
        }
        if !self.query.is_empty() {
            let target = self.query.apply_to(request.target());
            request.set_target(target);
        }
    }

    /// Reset all builder state to the client's defaults
    pub fn clear(&mut self) {
        self.request_mutators.clear();
        self.client_mutators.clear();
        self.query.clear();
        self.path.clear();
        self.options = self.defaults.clone();
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("options", &self.options)
            .field("request_mutators", &self.request_mutators.len())
            .field("client_mutators", &self.client_mutators.len())
            .field("query", &self.query)
            .field("path", &self.path)
            .finish()
    }
}
