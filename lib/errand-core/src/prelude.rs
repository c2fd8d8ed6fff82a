//! Prelude module for convenient imports.
//!
//! ```ignore
//! use errand_core::prelude::*;
//! ```

pub use crate::{
    Body, ContentType, Error, HttpClient, Method, Request, RequestBuilder, Response, Result,
    from_json, to_form, to_json,
};
