//! The transport seam.
//!
//! The agent never talks to the network itself; it hands fully resolved
//! requests to an [`HttpClient`]. Implement it to plug in another transport
//! or a test double.

use std::future::Future;

use bytes::Bytes;

use crate::{Request, Response, Result};

/// Core HTTP client trait.
///
/// Implementations are shared between agents and concurrent calls, hence
/// the `Send + Sync` bound.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
///
/// use bytes::Bytes;
/// use errand_core::{HttpClient, Request, Response, Result};
///
/// struct Canned;
///
/// impl HttpClient for Canned {
///     async fn execute(&self, _request: Request<Bytes>) -> Result<Response<Bytes>> {
///         Ok(Response::new(200, HashMap::new(), Bytes::from_static(b"{}")))
///     }
/// }
/// ```
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request and return the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails for any reason:
    /// - Network errors
    /// - TLS errors
    /// - Timeouts
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send;
}
