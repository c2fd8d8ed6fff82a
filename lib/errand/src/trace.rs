//! Debug traces of agent calls.
//!
//! A debug agent renders one message before the send and one after the
//! call completes, and hands each to its [`TraceSink`].

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use bytes::Bytes;
use percent_encoding::percent_decode_str;

use crate::{Error, Request, Response};

const INDENT: &str = "|---";

/// Destination of debug traces.
///
/// Called from concurrent calls; each message is complete on its own.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use errand::TraceSink;
///
/// let lines = Arc::new(Mutex::new(Vec::<String>::new()));
/// let captured = Arc::clone(&lines);
/// let sink = move |message: &str| {
///     captured.lock().expect("lock").push(message.to_string());
/// };
///
/// sink.trace("[REQUEST] GET http://localhost/");
/// assert_eq!(lines.lock().expect("lock").len(), 1);
/// ```
pub trait TraceSink: Send + Sync {
    /// Record one trace message.
    fn trace(&self, message: &str);
}

/// Emits traces as `tracing` debug events under the `errand::agent` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn trace(&self, message: &str) {
        tracing::debug!(target: "errand::agent", "{message}");
    }
}

/// Discards every trace.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {
    fn trace(&self, _message: &str) {}
}

impl<F> TraceSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn trace(&self, message: &str) {
        self(message);
    }
}

/// Render the trace of a request about to be sent.
pub(crate) fn render_request(request: &Request<Bytes>) -> String {
    let mut out = format!(
        "[REQUEST] {} {}",
        request.method(),
        decoded_url(request)
    );

    if !request.headers().is_empty() {
        let sorted: BTreeMap<&str, &str> = request
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();
        let headers = serde_json::to_string(&sorted).unwrap_or_default();
        let _ = write!(out, "\n{INDENT}header: {headers}");
    }
    if let Some(body) = request.body() {
        let _ = write!(out, "\n{INDENT}body: {}", String::from_utf8_lossy(body));
    }
    out
}

/// Render the trace of a completed call.
///
/// `response` is absent when the transport failed; `error` is the first
/// failure of the call, if any.
pub(crate) fn render_response(
    request: &Request<Bytes>,
    elapsed: Duration,
    response: Option<&Response<Bytes>>,
    error: Option<&Error>,
) -> String {
    let mut out = format!(
        "[RESPONSE][{elapsed:?}] {} {}",
        request.method(),
        decoded_url(request)
    );

    if let Some(response) = response {
        let _ = write!(out, "\n{INDENT}status: {}", response.status_text());
        let _ = write!(
            out,
            "\n{INDENT}content size: {}",
            human_bytes(response.size())
        );
        if response.size() > 0 {
            let _ = write!(out, "\n{INDENT}data: {}", response.text_lossy());
        }
    }
    if let Some(error) = error {
        let _ = write!(out, "\n{INDENT}error: {error}");
    }
    out
}

fn decoded_url(request: &Request<Bytes>) -> String {
    percent_decode_str(request.url().as_str())
        .decode_utf8_lossy()
        .into_owned()
}

/// Size in SI units: `5 B`, `512 B`, `1.2 kB`, `83 MB`.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn human_bytes(size: usize) -> String {
    const UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];

    if size < 10 {
        return format!("{size} B");
    }

    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    let rounded = (value * 10.0 + 0.5).floor() / 10.0;
    let unit = UNITS.get(unit).copied().unwrap_or("EB");

    if rounded < 10.0 {
        format!("{rounded:.1} {unit}")
    } else {
        format!("{rounded:.0} {unit}")
    }
}
