//! Unsent request representation

use std::collections::BTreeMap;

use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Method, Version,
};
use tracing::trace;
use url::Url;

use crate::error::{HttpError, Result};

/// Request body together with its media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBody {
    pub bytes: Bytes,
    pub content_type: String,
}

impl RequestBody {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }
}

/// A request that has not been dispatched yet
///
/// The target may be relative, in which case it is resolved against the base
/// address set by the pipeline before dispatch.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    method: Method,
    target: String,
    version: Version,
    headers: HeaderMap,
    body: Option<RequestBody>,
    options: BTreeMap<String, serde_json::Value>,
    base_address: Option<Url>,
}

impl PendingRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: None,
            options: BTreeMap::new(),
            base_address: None,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn set_target(&mut self, target: impl Into<String>) {
        self.target = target.into();
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Append a header, validating name and value
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::InvalidHeader(format!("{name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| HttpError::InvalidHeader(format!("{name}: {e}")))?;
        self.headers.append(name, value);
        Ok(())
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    /// Set the body and the matching `Content-Type` header
    pub fn set_body(&mut self, body: RequestBody) {
        if let Ok(value) = HeaderValue::from_str(&body.content_type) {
            self.headers.insert(CONTENT_TYPE, value);
        }
        self.body = Some(body);
    }

    /// Transport-specific per-request options
    pub fn options(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.options
    }

    pub fn set_option(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.options.insert(key.into(), value);
    }

    pub fn base_address(&self) -> Option<&Url> {
        self.base_address.as_ref()
    }

    pub fn set_base_address(&mut self, base: Url) {
        self.base_address = Some(base);
    }

    /// Absolute URL for dispatch
    ///
    /// An absolute target wins over the base address.
    pub fn url(&self) -> Result<Url> {
        if let Ok(url) = Url::parse(&self.target) {
            return Ok(url);
        }
        let base = self.base_address.as_ref().ok_or_else(|| {
            HttpError::InvalidUrl(format!(
                "relative target '{}' without a base address",
                self.target
            ))
        })?;
        base.join(&self.target)
            .map_err(|e| HttpError::InvalidUrl(format!("{}: {e}", self.target)))
    }

    /// Copy of an already dispatched request, ready to be sent again
    ///
    /// Method, target, body, protocol version, headers and options are copied
    /// verbatim. The copy shares no mutable state with the original.
    pub fn clone_for_retry(&self) -> Self {
        trace!(method = %self.method, target = %self.target, "Cloning request for retry");
        self.clone()
    }
}
