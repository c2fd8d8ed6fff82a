//! Per-call options.
//!
//! Every [`Agent::request`](crate::Agent::request) takes a list of
//! [`RequestOption`]s. They are folded in order into one private record;
//! when two options target the same field the last one wins. Injectors
//! and filters are replaced, never chained.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::{Body, PendingRequest, Response, Result};

/// Late mutation of the outgoing request, run just before send.
pub type Injector = Arc<dyn Fn(&mut PendingRequest) -> Result<()> + Send + Sync>;

/// Extraction of the bytes to bind from an accepted response.
pub type ResponseFilter = Arc<dyn Fn(&Response<Bytes>) -> Result<Bytes> + Send + Sync>;

/// One unit of per-call configuration.
///
/// # Example
///
/// ```
/// use errand::{Error, RequestOption};
///
/// let options = [
///     RequestOption::body(serde_json::json!({"param": "OK"})),
///     RequestOption::headers([("X-Trace", "1")]),
///     RequestOption::response_filter(|response| {
///         let envelope: serde_json::Value = response.json()?;
///         envelope
///             .get("data")
///             .map(|data| data.to_string().into())
///             .ok_or_else(|| Error::filter("missing data"))
///     }),
/// ];
/// # let _ = options;
/// ```
#[derive(Clone)]
pub enum RequestOption {
    /// Replace the outgoing payload.
    Body(Body),
    /// Replace the whole extra-header map.
    Headers(HashMap<String, String>),
    /// Replace the request injector.
    Injector(Injector),
    /// Replace the response filter.
    Filter(ResponseFilter),
}

impl RequestOption {
    /// Set the outgoing payload.
    pub fn body(body: impl Into<Body>) -> Self {
        Self::Body(body.into())
    }

    /// Set the extra headers, replacing any earlier header option.
    pub fn headers<K, V>(headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Headers(
            headers
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }

    /// Set the request injector.
    ///
    /// It runs after body and headers are applied; an error aborts the
    /// call before anything is sent.
    pub fn injector<F>(injector: F) -> Self
    where
        F: Fn(&mut PendingRequest) -> Result<()> + Send + Sync + 'static,
    {
        Self::Injector(Arc::new(injector))
    }

    /// Alias of [`RequestOption::injector`]; sets the same field.
    pub fn after_request<F>(injector: F) -> Self
    where
        F: Fn(&mut PendingRequest) -> Result<()> + Send + Sync + 'static,
    {
        Self::injector(injector)
    }

    /// Set the response filter, replacing "take the body verbatim".
    pub fn response_filter<F>(filter: F) -> Self
    where
        F: Fn(&Response<Bytes>) -> Result<Bytes> + Send + Sync + 'static,
    {
        Self::Filter(Arc::new(filter))
    }
}

impl fmt::Debug for RequestOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Body(body) => f.debug_tuple("Body").field(body).finish(),
            Self::Headers(headers) => f.debug_tuple("Headers").field(headers).finish(),
            Self::Injector(_) => f.write_str("Injector(..)"),
            Self::Filter(_) => f.write_str("Filter(..)"),
        }
    }
}

/// Folded options of one call.
#[derive(Default)]
pub(crate) struct Options {
    pub(crate) body: Option<Body>,
    pub(crate) headers: Option<HashMap<String, String>>,
    pub(crate) injector: Option<Injector>,
    pub(crate) filter: Option<ResponseFilter>,
}

impl Options {
    pub(crate) fn fold(options: impl IntoIterator<Item = RequestOption>) -> Self {
        options.into_iter().fold(Self::default(), Self::apply)
    }

    fn apply(mut self, option: RequestOption) -> Self {
        match option {
            RequestOption::Body(body) => self.body = Some(body),
            RequestOption::Headers(headers) => self.headers = Some(headers),
            RequestOption::Injector(injector) => self.injector = Some(injector),
            RequestOption::Filter(filter) => self.filter = Some(filter),
        }
        self
    }

    /// Apply body and headers, then the injector.
    pub(crate) fn prepare(&self, pending: &mut PendingRequest) -> Result<()> {
        if let Some(body) = &self.body {
            pending.set_body(body.clone());
        }
        if let Some(headers) = &self.headers {
            for (name, value) in headers {
                pending.set_header(name.as_str(), value.as_str());
            }
        }
        match &self.injector {
            Some(inject) => inject(pending),
            None => Ok(()),
        }
    }

    pub(crate) fn extract(&self, response: &Response<Bytes>) -> Result<Bytes> {
        match &self.filter {
            Some(filter) => filter(response),
            None => Ok(response.body().clone()),
        }
    }
}
