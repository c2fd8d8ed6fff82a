//! Prelude module for convenient imports.
//!
//! ```ignore
//! use errand::prelude::*;
//! ```

pub use crate::{
    Agent, Binder, Body, CancelHandle, Context, Error, HttpClient, HyperClient, Method,
    PendingRequest, RequestOption, Response, Result, StatusCode, TraceSink,
};
pub use serde::{Deserialize, Serialize};
