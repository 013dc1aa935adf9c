//! Received response representation

use std::sync::Arc;

use bytes::Bytes;
use reqwest::{header::HeaderMap, StatusCode, Version};

use crate::request::PendingRequest;

/// A response received from the transport
///
/// The status is kept as the raw integer so non-standard codes survive
/// untouched. The body is fully buffered, which lets handlers and the caller
/// each read it.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    status: u16,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    request: Option<Arc<PendingRequest>>,
}

impl ResponseRecord {
    pub fn new(status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            version: Version::HTTP_11,
            headers,
            body: body.into(),
            request: None,
        }
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Attach the request this response answers
    pub fn with_request(mut self, request: Arc<PendingRequest>) -> Self {
        self.request = Some(request);
        self
    }

    /// Raw numeric status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Status as a typed code, if it is in the valid 100..=999 range
    pub fn status_code(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status).ok()
    }

    /// Canonical reason phrase for well-known codes
    pub fn reason(&self) -> Option<&'static str> {
        self.status_code().and_then(|s| s.canonical_reason())
    }

    /// Inclusive 200..=299 check
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Originating request
    pub fn request(&self) -> Option<&Arc<PendingRequest>> {
        self.request.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range_is_inclusive() {
        for status in [200, 204, 299] {
            assert!(ResponseRecord::new(status, HeaderMap::new(), Bytes::new()).is_success());
        }
        for status in [199, 300, 404, 503] {
            assert!(!ResponseRecord::new(status, HeaderMap::new(), Bytes::new()).is_success());
        }
    }

    #[test]
    fn test_custom_status_kept_raw() {
        let response = ResponseRecord::new(599, HeaderMap::new(), Bytes::new());
        assert_eq!(response.status(), 599);
        assert_eq!(response.reason(), None);

        let response = ResponseRecord::new(1200, HeaderMap::new(), Bytes::new());
        assert_eq!(response.status(), 1200);
        assert!(response.status_code().is_none());
    }

    #[test]
    fn test_text_and_request_link() {
        let request = Arc::new(PendingRequest::get("/hello"));
        let response = ResponseRecord::new(200, HeaderMap::new(), "hi there")
            .with_request(Arc::clone(&request));
        assert_eq!(response.text(), "hi there");
        assert_eq!(response.request().map(|r| r.target()), Some("/hello"));
        assert_eq!(response.reason(), Some("OK"));
    }
}
