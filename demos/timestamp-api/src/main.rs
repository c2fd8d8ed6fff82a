//! Timestamp API Example
//!
//! Demonstrates an errand agent wrapping an envelope-style JSON API: a
//! custom acceptance policy checks the envelope, a response filter keeps
//! only its `data` field, and debug traces go through `tracing`.

// Example-specific lint allowances
#![allow(missing_docs)]
#![allow(clippy::print_stdout)]

use std::sync::Arc;
use std::time::Duration;

use errand::prelude::*;
use errand::default_accepter;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Data Types
// ============================================================================

/// Envelope wrapping every answer of the API.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    ret: Vec<String>,
    data: Option<serde_json::Value>,
}

/// Server time payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerTime {
    /// Milliseconds since the epoch, as text.
    pub t: String,
}

// ============================================================================
// Agent wrapper
// ============================================================================

/// Refuse non-2xx statuses and envelopes whose first `ret` is not a success.
fn accept_envelope(response: &Response) -> Result<()> {
    default_accepter(response)?;

    let envelope: Envelope = response.json()?;
    match envelope.ret.first() {
        Some(ret) if ret.starts_with("SUCCESS") => Ok(()),
        Some(ret) => Err(Error::rejected(ret.clone())),
        None => Err(Error::rejected("empty ret")),
    }
}

fn envelope_data() -> RequestOption {
    RequestOption::response_filter(|response| {
        let envelope: Envelope = response.json()?;
        envelope
            .data
            .map(|data| data.to_string().into())
            .ok_or_else(|| Error::filter("envelope without data"))
    })
}

/// Client of the mtop gateway.
#[derive(Debug, Clone)]
pub struct TimestampApi {
    agent: Agent<HyperClient>,
}

impl TimestampApi {
    /// Create a client for the gateway at `host`.
    pub fn new(host: &str) -> Result<Self> {
        let client = HyperClient::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("errand-timestamp-example/0.1.0")
            .build();
        let agent = Agent::parse(Arc::new(client), host)?.with_accepter(accept_envelope);
        Ok(Self { agent })
    }

    /// Same client with debug traces on.
    #[must_use]
    pub fn debug(&self) -> Self {
        Self {
            agent: self.agent.debug(),
        }
    }

    /// Ask the server for its current time.
    pub async fn server_time(&self, ctx: &Context) -> Result<ServerTime> {
        self.agent
            .request(
                ctx,
                Method::POST,
                "/rest/api3.do?api=mtop.common.getTimestamp",
                [
                    RequestOption::body(serde_json::json!({"param": "OK"})),
                    RequestOption::headers([("Accept", "application/json")]),
                    envelope_data(),
                ],
            )
            .await
            .bind()
    }
}

// ============================================================================
// Main: Demonstrate usage
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("errand=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let api = TimestampApi::new("http://api.m.taobao.com/")?.debug();
    let ctx = Context::background().with_timeout(Duration::from_secs(15));

    let time = api.server_time(&ctx).await?;
    println!("server time: {}", time.t);

    Ok(())
}

// ============================================================================
// Tests using wiremock
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_json, method, path, query_param},
    };

    async fn mount(mock_server: &MockServer, status: u16, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/rest/api3.do"))
            .and(query_param("api", "mtop.common.getTimestamp"))
            .and(body_json(serde_json::json!({"param": "OK"})))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(mock_server)
            .await;
    }

    #[tokio::test]
    async fn test_server_time() {
        let mock_server = MockServer::start().await;
        mount(
            &mock_server,
            200,
            serde_json::json!({
                "api": "mtop.common.getTimestamp",
                "ret": ["SUCCESS::call succeeded"],
                "data": {"t": "1700000000000"}
            }),
        )
        .await;

        let api = TimestampApi::new(&mock_server.uri()).expect("api");
        let time = api
            .server_time(&Context::background())
            .await
            .expect("server time");

        assert_eq!(time.t, "1700000000000");
    }

    #[tokio::test]
    async fn test_failed_envelope_is_rejected() {
        let mock_server = MockServer::start().await;
        mount(
            &mock_server,
            200,
            serde_json::json!({"ret": ["FAIL_SYS_ILLEGAL_ACCESS::illegal request"]}),
        )
        .await;

        let api = TimestampApi::new(&mock_server.uri()).expect("api");
        let err = api
            .server_time(&Context::background())
            .await
            .expect_err("rejected");

        assert_eq!(
            err.to_string(),
            "response rejected: FAIL_SYS_ILLEGAL_ACCESS::illegal request"
        );
    }

    #[tokio::test]
    async fn test_http_error_keeps_default_message() {
        let mock_server = MockServer::start().await;
        mount(&mock_server, 503, serde_json::json!({})).await;

        let api = TimestampApi::new(&mock_server.uri()).expect("api");
        let err = api
            .server_time(&Context::background())
            .await
            .expect_err("refused");

        assert_eq!(err.to_string(), "request error: 503 Service Unavailable");
    }
}
