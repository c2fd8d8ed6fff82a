//! The outgoing request as seen by request injectors.

use std::collections::HashMap;

use base64::Engine;
use bytes::Bytes;
use url::Url;

use crate::{Body, Method, Request};

/// Request under construction, before method and URL are resolved.
///
/// The agent applies the body and header options to it, then hands it to
/// the request injector, which can sign it, add query parameters or
/// replace anything already set.
///
/// # Example
///
/// ```
/// use errand::{PendingRequest, RequestOption};
///
/// let sign = RequestOption::injector(|request: &mut PendingRequest| {
///     request
///         .bearer_auth("token")
///         .query_param("api", "mtop.common.getTimestamp");
///     Ok(())
/// });
/// # let _ = sign;
/// ```
#[derive(Debug, Clone, Default)]
pub struct PendingRequest {
    headers: HashMap<String, String>,
    query: Vec<(String, String)>,
    body: Option<Body>,
}

impl PendingRequest {
    /// Extra headers set so far.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Mutable access to headers.
    #[must_use]
    pub fn headers_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.headers
    }

    /// Single header value, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Set a header, replacing any value under the same name in any case.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        self.headers.retain(|key, _| !key.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
        self
    }

    /// Query pairs appended to the resolved URL.
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Append a query parameter.
    pub fn query_param(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Current payload.
    #[must_use]
    pub const fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Replace the payload.
    pub fn set_body(&mut self, body: impl Into<Body>) -> &mut Self {
        self.body = Some(body.into());
        self
    }

    /// Set `Authorization: Bearer <token>`.
    pub fn bearer_auth(&mut self, token: impl AsRef<str>) -> &mut Self {
        self.set_header("Authorization", format!("Bearer {}", token.as_ref()))
    }

    /// Set `Authorization: Basic <base64(username:password)>`.
    pub fn basic_auth(&mut self, username: impl AsRef<str>, password: impl AsRef<str>) -> &mut Self {
        let credentials = format!("{}:{}", username.as_ref(), password.as_ref());
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        self.set_header("Authorization", format!("Basic {encoded}"))
    }

    /// Freeze into a sendable request.
    ///
    /// The body's content type is used when no `Content-Type` header is set.
    pub(crate) fn into_request(self, method: Method, url: Url) -> Request<Bytes> {
        let content_type = match (&self.body, self.header("content-type")) {
            (Some(body), None) => Some(body.content_type()),
            _ => None,
        };

        let mut builder = Request::builder(method, url)
            .query_pairs(self.query)
            .headers(self.headers);
        if let Some(content_type) = content_type {
            builder = builder.header("Content-Type", content_type.as_str());
        }
        if let Some(body) = self.body {
            builder = builder.body(body.into_bytes());
        }
        builder.build()
    }
}
