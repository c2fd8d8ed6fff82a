//! Core types and traits for the errand HTTP agent.
//!
//! This crate provides the transport-neutral building blocks:
//! - [`Request`] and [`RequestBuilder`] - HTTP request types
//! - [`Response`] - HTTP response type
//! - [`Body`] and [`ContentType`] - outgoing payloads
//! - [`Error`] and [`Result`] - Error handling
//! - [`HttpClient`] - the trait a transport implements
//! - [`Method`], [`StatusCode`], [`header`] - re-exported from the `http` crate

mod body;
mod client;
mod error;
pub mod prelude;
mod request;
mod response;

pub use body::{Body, ContentType, from_json, to_form, to_json, to_query_string};
pub use client::HttpClient;
pub use error::{Error, Result};
pub use request::{Request, RequestBuilder};
pub use response::Response;

// Re-export http crate types for methods, status codes and headers
pub use http::{Method, StatusCode, header};
