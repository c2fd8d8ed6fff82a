//! Error types for errand.
//!
//! A call fails at exactly one stage. The variants group by stage:
//!
//! - before send: [`Error::Injection`], [`Error::InvalidRequest`], serialization errors
//! - transport: [`Error::Connection`], [`Error::Tls`], [`Error::Timeout`], [`Error::Canceled`]
//! - acceptance: [`Error::Http`] (default policy), [`Error::Rejected`] (custom policies)
//! - filtering: [`Error::Filter`]
//! - binding: [`Error::JsonDeserialization`]

use derive_more::{Display, Error, From};

/// Main error type for errand operations.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// Response refused by the default acceptance policy (non-2xx status).
    #[display("request error: {status} {message}")]
    #[from(skip)]
    Http {
        /// HTTP status code.
        status: u16,
        /// Reason phrase of the status.
        message: String,
        /// Response body, if available.
        #[error(not(source))]
        body: Option<bytes::Bytes>,
    },

    /// Response refused by a custom acceptance policy.
    #[display("response rejected: {_0}")]
    #[from(skip)]
    Rejected(#[error(not(source))] String),

    /// The request injector refused to prepare the request.
    #[display("request injection failed: {_0}")]
    #[from(skip)]
    Injection(#[error(not(source))] String),

    /// The response filter could not extract a payload.
    #[display("response filter failed: {_0}")]
    #[from(skip)]
    Filter(#[error(not(source))] String),

    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// Request timeout, either from the client or from the call deadline.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// The call was canceled through its context.
    #[display("request canceled")]
    #[from(skip)]
    Canceled,

    /// Invalid request configuration.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    #[from]
    JsonSerialization(serde_json::Error),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "user.address.city").
        path: String,
        /// Error message.
        message: String,
    },

    /// Form or query string serialization error.
    #[display("form serialization error: {_0}")]
    #[from]
    FormSerialization(serde_html_form::ser::Error),

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an HTTP error from status code and reason phrase.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: None,
        }
    }

    /// Create an HTTP error with body.
    #[must_use]
    pub fn http_with_body(status: u16, message: impl Into<String>, body: bytes::Bytes) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: Some(body),
        }
    }

    /// Create a rejection error for custom acceptance policies.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Create an injection error.
    #[must_use]
    pub fn injection(message: impl Into<String>) -> Self {
        Self::Injection(message.into())
    }

    /// Create a response filter error.
    #[must_use]
    pub fn filter(message: impl Into<String>) -> Self {
        Self::Filter(message.into())
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if the call was canceled.
    #[must_use]
    pub const fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` if the error happened after a response was received
    /// but before binding (acceptance or filtering).
    #[must_use]
    pub const fn is_response_error(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::Rejected(_) | Self::Filter(_))
    }

    /// Returns the HTTP status code if this is an HTTP error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// Returns `true` if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| (500..600).contains(&s))
    }

    /// Returns the response body if this is an HTTP error with a body.
    #[must_use]
    pub fn body(&self) -> Option<&bytes::Bytes> {
        match self {
            Self::Http { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Try to decode the body of a refused response as JSON.
    ///
    /// Returns `None` if there is no body or this is not an HTTP error.
    ///
    /// # Example
    ///
    /// ```ignore
    /// #[derive(Debug, Deserialize)]
    /// struct ApiError {
    ///     code: String,
    /// }
    ///
    /// if let Some(Ok(api_error)) = err.decode_body::<ApiError>() {
    ///     println!("API error: {}", api_error.code);
    /// }
    /// ```
    pub fn decode_body<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T>> {
        self.body().map(|body| crate::from_json(body))
    }
}
