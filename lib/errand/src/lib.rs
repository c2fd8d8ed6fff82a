//! Request agent for JSON HTTP APIs.
//!
//! An [`Agent`] pairs a shared [`HttpClient`] with a base URL. Each call
//! takes a [`Context`], a method, a path and a list of [`RequestOption`]s,
//! and returns a [`Binder`] holding either the extracted payload or the
//! first error of the call.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use errand::prelude::*;
//!
//! #[derive(Debug, Deserialize)]
//! struct Timestamp {
//!     t: String,
//! }
//!
//! # async fn run() -> errand::Result<()> {
//! let agent = Agent::parse(
//!     Arc::new(HyperClient::new()),
//!     "https://api.m.taobao.com/rest/api3.do",
//! )?;
//!
//! let timestamp: Timestamp = agent
//!     .debug()
//!     .request(
//!         &Context::background(),
//!         Method::GET,
//!         "?api=mtop.common.getTimestamp",
//!         [RequestOption::response_filter(|response| {
//!             let envelope: serde_json::Value = response.json()?;
//!             envelope
//!                 .get("data")
//!                 .map(|data| data.to_string().into())
//!                 .ok_or_else(|| Error::filter("missing data"))
//!         })],
//!     )
//!     .await
//!     .bind()?;
//! println!("server time: {}", timestamp.t);
//! # Ok(())
//! # }
//! ```

mod agent;
mod binder;
mod client;
mod config;
mod connector;
mod context;
mod options;
mod pending;
pub mod prelude;
mod trace;

pub use agent::{Accepter, Agent, default_accepter};
pub use binder::Binder;
pub use client::{BoxedService, HyperClient, HyperClientBuilder, ServiceFuture};
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_USER_AGENT};
pub use context::{CancelHandle, Context};
pub use options::{Injector, RequestOption, ResponseFilter};
pub use pending::PendingRequest;
pub use trace::{NoopSink, TraceSink, TracingSink};

// Re-export tower for transport layers
pub use tower;

// Re-export core types
pub use errand_core::{
    Body, ContentType, Error, HttpClient, Method, Request, RequestBuilder, Response, Result,
    from_json, to_form, to_json, to_query_string,
};

// Re-export http types for status codes and headers
pub use errand_core::{StatusCode, header};

pub use url;
