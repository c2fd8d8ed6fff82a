//! The per-destination request agent.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::Instrument;
use url::Url;

use crate::{
    Binder, Context, Error, HttpClient, Method, PendingRequest, RequestOption, Response, Result,
    options::Options,
    trace::{self, TraceSink, TracingSink},
};

/// Acceptance policy deciding whether a response counts as a success.
pub type Accepter = Arc<dyn Fn(&Response<Bytes>) -> Result<()> + Send + Sync>;

/// Accept 2xx responses; refuse anything else with [`Error::Http`].
///
/// # Errors
///
/// `request error: <status> <reason>` carrying the response body.
pub fn default_accepter(response: &Response<Bytes>) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    Err(Error::http_with_body(
        response.status(),
        response.reason().unwrap_or_default(),
        response.body().clone(),
    ))
}

/// Runs requests against one base destination through a shared client.
///
/// Each call goes through the same steps, the first failure ending it:
/// options are applied to a pending request, the injector runs, the URL is
/// resolved against the base, the request is sent under its [`Context`],
/// the response is accepted then filtered, and the outcome lands in a
/// [`Binder`].
///
/// Agents are cheap to clone and never change once configured; the
/// `with_*` methods and [`Agent::debug`] return new agents.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use errand::{Agent, Context, HyperClient, Method, RequestOption};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Item {
///     id: u64,
/// }
///
/// # async fn run() -> errand::Result<()> {
/// let agent = Agent::parse(Arc::new(HyperClient::new()), "https://api.example.com/")?;
///
/// let item: Item = agent
///     .request(
///         &Context::background(),
///         Method::POST,
///         "/v1/items",
///         [RequestOption::body(serde_json::json!({"name": "tom"}))],
///     )
///     .await
///     .bind()?;
/// # let _ = item.id;
/// # Ok(())
/// # }
/// ```
pub struct Agent<C> {
    client: Arc<C>,
    host: Url,
    debug: bool,
    accepter: Option<Accepter>,
    trace: Arc<dyn TraceSink>,
}

impl<C> Clone for Agent<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            host: self.host.clone(),
            debug: self.debug,
            accepter: self.accepter.clone(),
            trace: Arc::clone(&self.trace),
        }
    }
}

impl<C> fmt::Debug for Agent<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("host", &self.host.as_str())
            .field("debug", &self.debug)
            .field("custom_accepter", &self.accepter.is_some())
            .finish_non_exhaustive()
    }
}

impl<C> Agent<C> {
    /// Create an agent for `host`.
    #[must_use]
    pub fn new(client: Arc<C>, host: Url) -> Self {
        Self {
            client,
            host,
            debug: false,
            accepter: None,
            trace: Arc::new(TracingSink),
        }
    }

    /// Create an agent for a host given as text.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidUrl`] if `host` is not an absolute URL.
    pub fn parse(client: Arc<C>, host: &str) -> Result<Self> {
        let host = Url::parse(host).map_err(Error::InvalidUrl)?;
        Ok(Self::new(client, host))
    }

    /// Replace the acceptance policy for every call of the returned agent.
    ///
    /// The policy alone decides: a 500 it accepts goes on to the filter.
    #[must_use]
    pub fn with_accepter<F>(mut self, accepter: F) -> Self
    where
        F: Fn(&Response<Bytes>) -> Result<()> + Send + Sync + 'static,
    {
        self.accepter = Some(Arc::new(accepter));
        self
    }

    /// Send debug traces to `sink` instead of `tracing`.
    #[must_use]
    pub fn with_trace_sink(mut self, sink: impl TraceSink + 'static) -> Self {
        self.trace = Arc::new(sink);
        self
    }

    /// A new agent with debug traces on, sharing client and host.
    ///
    /// The acceptance policy and trace sink are kept; `self` is unchanged.
    #[must_use]
    pub fn debug(&self) -> Self {
        Self {
            debug: true,
            ..self.clone()
        }
    }

    /// Base destination.
    #[must_use]
    pub const fn host(&self) -> &Url {
        &self.host
    }

    /// Whether debug traces are on.
    #[must_use]
    pub const fn is_debug(&self) -> bool {
        self.debug
    }

    /// The shared client.
    #[must_use]
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Resolve `path` against the base destination.
    ///
    /// Exactly one `/` separates base and path, empty segments collapse,
    /// `.` and `..` are resolved and a trailing `/` is kept. A `?query`
    /// suffix becomes the URL query, after any query of the base.
    ///
    /// ```
    /// # use std::sync::Arc;
    /// # use errand::{Agent, HyperClient};
    /// let agent = Agent::parse(Arc::new(HyperClient::new()), "http://api.example.com/")?;
    /// let url = agent.url("/v1/items")?;
    /// assert_eq!(url.as_str(), "http://api.example.com/v1/items");
    /// # Ok::<(), errand::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRequest`] if the base cannot carry a path.
    pub fn url(&self, path: &str) -> Result<Url> {
        if self.host.cannot_be_a_base() {
            return Err(Error::invalid_request(format!(
                "cannot join a path onto {}",
                self.host
            )));
        }

        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };

        let mut joined = String::from(self.host.path().trim_end_matches('/'));
        for segment in path.split('/').filter(|segment| !segment.is_empty()) {
            joined.push('/');
            joined.push_str(segment);
        }
        if joined.is_empty() || (path.ends_with('/') && !joined.ends_with('/')) {
            joined.push('/');
        }

        let mut url = self.host.clone();
        url.set_path(&joined);
        if let Some(query) = query.filter(|query| !query.is_empty()) {
            let merged = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
                _ => query.to_string(),
            };
            url.set_query(Some(&merged));
        }
        Ok(url)
    }
}

impl<C: HttpClient> Agent<C> {
    /// Run one call and package its outcome.
    ///
    /// Options are applied in order, the last one winning for each field.
    /// Failures never panic nor return early: they are stored in the
    /// [`Binder`].
    pub async fn request(
        &self,
        ctx: &Context,
        method: Method,
        path: &str,
        options: impl IntoIterator<Item = RequestOption>,
    ) -> Binder {
        let options = Options::fold(options);
        let span = tracing::debug_span!("agent_request", %method, path);

        async {
            let started = Instant::now();
            let outcome = self.call(ctx, method, path, &options).await;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            match &outcome {
                Ok(data) => tracing::debug!(elapsed_ms, size = data.len(), "call completed"),
                Err(err) => tracing::debug!(error = %err, elapsed_ms, "call failed"),
            }
            Binder::from(outcome)
        }
        .instrument(span)
        .await
    }

    async fn call(
        &self,
        ctx: &Context,
        method: Method,
        path: &str,
        options: &Options,
    ) -> Result<Bytes> {
        let mut pending = PendingRequest::default();
        options.prepare(&mut pending)?;

        let url = self.url(path)?;
        let request = pending.into_request(method, url);

        let traced = self.debug.then(|| request.clone());
        if let Some(request) = &traced {
            self.trace.trace(&trace::render_request(request));
        }

        let started = Instant::now();
        let sent = ctx.run(self.client.execute(request)).await;
        let elapsed = started.elapsed();

        let (response, outcome) = match sent {
            Ok(response) => {
                let outcome = self
                    .accept(&response)
                    .and_then(|()| options.extract(&response));
                (Some(response), outcome)
            }
            Err(err) => (None, Err(err)),
        };

        if let Some(request) = &traced {
            self.trace.trace(&trace::render_response(
                request,
                elapsed,
                response.as_ref(),
                outcome.as_ref().err(),
            ));
        }
        outcome
    }

    fn accept(&self, response: &Response<Bytes>) -> Result<()> {
        match &self.accepter {
            Some(accept) => accept(response),
            None => default_accepter(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;

    use super::*;
    use crate::{NoopSink, Request};

    /// Canned client recording what it is asked to send.
    struct Stub {
        status: u16,
        body: &'static str,
        refuse: bool,
        sent: AtomicUsize,
        last: Mutex<Option<Request<Bytes>>>,
    }

    impl Stub {
        fn new(status: u16, body: &'static str, refuse: bool) -> Arc<Self> {
            Arc::new(Self {
                status,
                body,
                refuse,
                sent: AtomicUsize::new(0),
                last: Mutex::new(None),
            })
        }

        fn replying(status: u16, body: &'static str) -> Arc<Self> {
            Self::new(status, body, false)
        }

        fn refusing() -> Arc<Self> {
            Self::new(0, "", true)
        }

        fn sent(&self) -> usize {
            self.sent.load(Ordering::SeqCst)
        }

        fn last(&self) -> Request<Bytes> {
            self.last.lock().expect("lock").clone().expect("a request was sent")
        }
    }

    impl HttpClient for Stub {
        async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().expect("lock") = Some(request);
            if self.refuse {
                return Err(Error::connection("connection refused"));
            }
            Ok(Response::new(
                self.status,
                HashMap::new(),
                Bytes::from_static(self.body.as_bytes()),
            ))
        }
    }

    #[derive(Debug, Deserialize)]
    struct User {
        name: String,
    }

    fn agent(client: &Arc<Stub>) -> Agent<Stub> {
        Agent::parse(Arc::clone(client), "http://api.example.com/").expect("valid host")
    }

    #[tokio::test]
    async fn successful_call_binds() {
        let client = Stub::replying(200, r#"{"name":"tom"}"#);

        let user: User = agent(&client)
            .request(&Context::background(), Method::GET, "/v1/user", [])
            .await
            .bind()
            .expect("bind");

        assert_eq!(user.name, "tom");
        assert_eq!(client.last().url().as_str(), "http://api.example.com/v1/user");
    }

    #[tokio::test]
    async fn body_and_headers_reach_the_client() {
        let client = Stub::replying(200, "{}");

        let binder = agent(&client)
            .request(
                &Context::background(),
                Method::POST,
                "items",
                [
                    RequestOption::body(serde_json::json!({"param": "OK"})),
                    RequestOption::headers([("X-Trace", "1")]),
                ],
            )
            .await;

        assert!(binder.is_ok());
        let request = client.last();
        assert_eq!(*request.method(), Method::POST);
        assert_eq!(request.header("x-trace"), Some("1"));
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(
            request.body().map(|body| body.to_vec()),
            Some(br#"{"param":"OK"}"#.to_vec())
        );
    }

    #[tokio::test]
    async fn failing_injector_sends_nothing() {
        let client = Stub::replying(200, "{}");

        let binder = agent(&client)
            .request(
                &Context::background(),
                Method::GET,
                "/",
                [RequestOption::injector(|_| Err(Error::injection("no key")))],
            )
            .await;

        assert_eq!(client.sent(), 0);
        assert!(matches!(binder.error(), Some(Error::Injection(msg)) if msg == "no key"));
    }

    #[tokio::test]
    async fn injector_sees_applied_options() {
        let client = Stub::replying(200, "{}");

        let binder = agent(&client)
            .request(
                &Context::background(),
                Method::GET,
                "/sign",
                [
                    RequestOption::headers([("X-Key", "k1")]),
                    RequestOption::injector(|request| {
                        let key = request.header("X-Key").unwrap_or_default().to_string();
                        request.bearer_auth(key).query_param("t", "42");
                        Ok(())
                    }),
                ],
            )
            .await;

        assert!(binder.is_ok());
        let request = client.last();
        assert_eq!(request.header("authorization"), Some("Bearer k1"));
        assert_eq!(request.url().query(), Some("t=42"));
    }

    #[tokio::test]
    async fn transport_error_skips_acceptance_and_filter() {
        let client = Stub::refusing();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);

        let binder = agent(&client)
            .with_accepter(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .request(
                &Context::background(),
                Method::GET,
                "/",
                [RequestOption::response_filter(|_| {
                    Err(Error::filter("must not run"))
                })],
            )
            .await;

        assert_eq!(client.sent(), 1);
        assert_eq!(accepted.load(Ordering::SeqCst), 0);
        assert!(binder.error().is_some_and(Error::is_connection));
    }

    #[tokio::test]
    async fn non_success_status_fails_with_status_text() {
        let client = Stub::replying(404, "missing");

        let binder = agent(&client)
            .request(&Context::background(), Method::GET, "/nope", [])
            .await;

        let err = binder.error().expect("refused");
        assert!(err.to_string().contains("404 Not Found"), "{err}");
        assert_eq!(err.body(), Some(&Bytes::from_static(b"missing")));
    }

    #[tokio::test]
    async fn custom_accepter_alone_decides() {
        let client = Stub::replying(500, r#"{"name":"tom"}"#);

        let user: User = agent(&client)
            .with_accepter(|_| Ok(()))
            .request(&Context::background(), Method::GET, "/", [])
            .await
            .bind()
            .expect("accepted by policy");
        assert_eq!(user.name, "tom");

        let ok = Stub::replying(200, "{}");
        let binder = agent(&ok)
            .with_accepter(|response| {
                Err(Error::rejected(format!("status {}", response.status())))
            })
            .request(&Context::background(), Method::GET, "/", [])
            .await;
        assert!(matches!(binder.error(), Some(Error::Rejected(msg)) if msg == "status 200"));
    }

    #[tokio::test]
    async fn filter_extracts_payload() {
        let client = Stub::replying(200, r#"{"code":0,"data":{"name":"tom"}}"#);

        let user: User = agent(&client)
            .request(
                &Context::background(),
                Method::GET,
                "/",
                [RequestOption::response_filter(|response| {
                    let envelope: serde_json::Value = response.json()?;
                    envelope
                        .get("data")
                        .map(|data| Bytes::from(data.to_string()))
                        .ok_or_else(|| Error::filter("missing data"))
                })],
            )
            .await
            .bind()
            .expect("bind");

        assert_eq!(user.name, "tom");
    }

    #[tokio::test]
    async fn filter_error_ends_the_call() {
        let client = Stub::replying(200, "{}");

        let binder = agent(&client)
            .request(
                &Context::background(),
                Method::GET,
                "/",
                [RequestOption::response_filter(|_| {
                    Err(Error::filter("missing data"))
                })],
            )
            .await;

        assert_eq!(
            binder.error().map(ToString::to_string).as_deref(),
            Some("response filter failed: missing data")
        );
    }

    #[tokio::test]
    async fn cancelled_context_sends_nothing() {
        let client = Stub::replying(200, "{}");
        let (ctx, handle) = Context::background().with_cancel();
        handle.cancel();

        let binder = agent(&client).request(&ctx, Method::GET, "/", []).await;

        assert_eq!(client.sent(), 0);
        assert!(binder.error().is_some_and(Error::is_canceled));
    }

    #[tokio::test]
    async fn debug_traces_request_and_response() {
        let client = Stub::replying(200, r#"{"name":"tom"}"#);
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let captured = Arc::clone(&lines);

        let base = agent(&client)
            .with_trace_sink(move |message: &str| {
                captured.lock().expect("lock").push(message.to_string());
            });
        let debug = base.debug();

        let binder = debug
            .request(&Context::background(), Method::GET, "/v1/user", [])
            .await;
        assert!(binder.is_ok());

        let lines = lines.lock().expect("lock");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[REQUEST] GET http://api.example.com/v1/user"));
        assert!(lines[1].starts_with("[RESPONSE]["));
        assert!(lines[1].contains("|---status: 200 OK"));
        assert!(lines[1].contains(r#"|---data: {"name":"tom"}"#));
    }

    #[tokio::test]
    async fn no_traces_without_debug() {
        let client = Stub::replying(200, "{}");
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        let binder = agent(&client)
            .with_trace_sink(move |_: &str| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .request(&Context::background(), Method::GET, "/", [])
            .await;

        assert!(binder.is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn debug_fork_leaves_source_untouched() {
        let client = Stub::replying(200, "{}");
        let base = agent(&client).with_accepter(|_| Ok(()));

        let debug = base.debug();

        assert!(!base.is_debug());
        assert!(debug.is_debug());
        assert_eq!(debug.host(), base.host());
        assert!(Arc::ptr_eq(debug.client(), base.client()));
        assert!(format!("{debug:?}").contains("custom_accepter: true"));
    }

    #[test]
    fn url_joining() {
        let client = Stub::replying(200, "{}");
        let root = agent(&client);
        let nested = Agent::parse(Arc::clone(&client), "http://h/api/?k=v").expect("valid host");

        let cases = [
            (&root, "/v1/items", "http://api.example.com/v1/items"),
            (&root, "v1/items", "http://api.example.com/v1/items"),
            (&root, "", "http://api.example.com/"),
            (&root, "v1//items/", "http://api.example.com/v1/items/"),
            (&root, "/a/../b", "http://api.example.com/b"),
            (&root, "/search?q=x", "http://api.example.com/search?q=x"),
            (&nested, "users", "http://h/api/users?k=v"),
            (&nested, "/users?page=2", "http://h/api/users?k=v&page=2"),
        ];

        for (agent, path, expected) in cases {
            let url = agent.url(path).expect("join");
            assert_eq!(url.as_str(), expected, "joining {path:?}");
        }
    }

    #[test]
    fn invalid_host_is_rejected() {
        let client = Stub::replying(200, "{}");
        let err = Agent::parse(client, "not a url").expect_err("invalid");
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn default_accepter_accepts_2xx_only() {
        let ok = Response::new(204, HashMap::new(), Bytes::new());
        assert!(default_accepter(&ok).is_ok());

        let refused = Response::new(503, HashMap::new(), Bytes::new());
        let err = default_accepter(&refused).expect_err("refused");
        assert_eq!(err.to_string(), "request error: 503 Service Unavailable");
        assert!(err.is_server_error());
    }

    /// Replies with the URL it was asked for.
    struct Echo;

    impl HttpClient for Echo {
        async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
            tokio::task::yield_now().await;
            let body = serde_json::json!({"url": request.url().as_str()}).to_string();
            Ok(Response::new(200, HashMap::new(), Bytes::from(body)))
        }
    }

    fn assert_send<T: Send>(_: &T) {}

    fn assert_send_sync<T: Send + Sync>(_: &T) {}

    #[test]
    fn agent_and_request_future_cross_threads() {
        let agent = Agent::parse(Arc::new(Echo), "http://api.example.com/").expect("valid host");
        let ctx = Context::background();

        let call = agent.request(
            &ctx,
            Method::POST,
            "/",
            [
                RequestOption::body("payload"),
                RequestOption::injector(|_| Ok(())),
                RequestOption::response_filter(|response| Ok(response.body().clone())),
            ],
        );

        assert_send(&call);
        assert_send_sync(&agent);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn spawned_calls_share_one_base_agent() {
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let captured = Arc::clone(&lines);
        let base = Agent::parse(Arc::new(Echo), "http://api.example.com/v1/")
            .expect("valid host")
            .with_trace_sink(move |message: &str| {
                captured.lock().expect("lock").push(message.to_string());
            });

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let agent = if i % 2 == 0 { base.debug() } else { base.clone() };
                tokio::spawn(async move {
                    let path = format!("items/{i}");
                    let binder = agent
                        .request(&Context::background(), Method::GET, &path, [])
                        .await;
                    (i, binder)
                })
            })
            .collect();

        for task in tasks {
            let (i, binder) = task.await.expect("task");
            let echo: serde_json::Value = binder.bind().expect("bind");
            assert_eq!(
                echo.get("url").and_then(serde_json::Value::as_str),
                Some(format!("http://api.example.com/v1/items/{i}").as_str())
            );
        }

        assert!(!base.is_debug());
        let lines = lines.lock().expect("lock");
        assert_eq!(lines.len(), 32);
        let requests = lines.iter().filter(|line| line.starts_with("[REQUEST] GET ")).count();
        let responses = lines.iter().filter(|line| line.starts_with("[RESPONSE][")).count();
        assert_eq!((requests, responses), (16, 16));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("lock")).into_owned()
        }
    }

    #[tokio::test]
    async fn refused_call_logs_at_debug_level() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let client = Stub::replying(404, "missing");
        let binder = agent(&client)
            .with_trace_sink(NoopSink)
            .request(&Context::background(), Method::GET, "/nope", [])
            .await;
        assert!(binder.error().is_some());

        let logs = logs.contents();
        assert!(logs.contains("call failed"), "{logs}");
        assert!(!logs.contains("WARN"), "{logs}");
    }
}
