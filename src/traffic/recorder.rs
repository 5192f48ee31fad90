//! Recording HTTP calls as paired request/response log lines.
//!
//! # Responsibilities
//! - Assign a correlation id per call
//! - Render `http-req[id]` before forwarding and `http-res[id]` after
//! - Buffer bodies only when a body formatter needs them, replaying them intact
//! - Surface transport and capture failures as `TrafficError`
//!
//! # Design Decisions
//! - The sink gate is consulted before any formatting work
//! - Formatter failures never fail the call; capture failures always do
//! - Runs on the caller's task; no background work

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Method, Request, Response};
use futures_util::future::BoxFuture;
use hyper::body::Incoming;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde_json::{Map, Value};
use thiserror::Error;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceBuilder};

use crate::config::{BodyFormat, TrafficConfig};
use crate::fault::{Fault, FaultKind, FaultRef};
use crate::observability::metrics;
use crate::traffic::correlation::{CallId, CorrelationCounter};
use crate::traffic::format::{
    render_body, render_headers, AllHeaders, AsIsFormat, BodyFormatter, HeaderFormatter,
    JsonFormat, SelectedHeaders, XmlFormat,
};
use crate::traffic::sink::{LineSink, NullSink, TracingSink};
use crate::traffic::tee::TeeBody;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Any service able to carry an HTTP call.
pub type Transport = BoxCloneSyncService<Request<Body>, Response<Body>, BoxError>;

/// A transport wrapped in a [`TrafficRecorder`].
pub type RecordedTransport = BoxCloneSyncService<Request<Body>, Response<Body>, TrafficError>;

/// Which side of the call a body belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyPart {
    Request,
    Response,
}

impl fmt::Display for BodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyPart::Request => f.write_str("request"),
            BodyPart::Response => f.write_str("response"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TrafficError {
    #[error("transport is not ready")]
    NotReady {
        #[source]
        source: BoxError,
    },

    #[error("call {call} to {target} failed")]
    Transport {
        call: CallId,
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("call {call} could not capture the {part} body")]
    Capture {
        call: CallId,
        part: BodyPart,
        #[source]
        source: BoxError,
    },
}

impl TrafficError {
    fn source_ref(&self) -> &(dyn std::error::Error + 'static) {
        match self {
            TrafficError::NotReady { source }
            | TrafficError::Transport { source, .. }
            | TrafficError::Capture { source, .. } => &**source,
        }
    }
}

impl Fault for TrafficError {
    fn kind(&self) -> FaultKind {
        FaultKind::of::<Self>()
    }

    fn cause(&self) -> Option<FaultRef<'_>> {
        Some(FaultRef::Foreign(self.source_ref()))
    }

    fn fields(&self) -> Option<Map<String, Value>> {
        let mut fields = Map::new();
        fields.insert("message".to_string(), Value::String(self.to_string()));
        match self {
            TrafficError::NotReady { .. } => {}
            TrafficError::Transport { call, target, .. } => {
                fields.insert("call".to_string(), Value::from(call.get()));
                fields.insert("target".to_string(), Value::String(target.clone()));
            }
            TrafficError::Capture { call, part, .. } => {
                fields.insert("call".to_string(), Value::from(call.get()));
                fields.insert("part".to_string(), Value::String(part.to_string()));
            }
        }
        Some(fields)
    }
}

/// One recorded call: identity plus timing.
#[derive(Debug, Clone)]
pub struct CallRecord {
    id: CallId,
    method: Method,
    target: String,
    started: Instant,
}

impl CallRecord {
    pub fn new(id: CallId, method: Method, target: impl Into<String>) -> Self {
        Self {
            id,
            method,
            target: target.into(),
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Reset the clock right before forwarding.
    pub fn start_clock(&mut self) {
        self.started = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn request_line(&self) -> String {
        format!("http-req[{}] {} {}", self.id, self.method, self.target)
    }

    pub fn response_line(&self, status: u16, elapsed: Duration) -> String {
        format!(
            "http-res[{}] {} {} status:{} time:{}",
            self.id,
            self.method,
            self.target,
            status,
            elapsed.as_millis()
        )
    }
}

/// Recording policy shared by every call through a recorder.
#[derive(Clone)]
pub struct TrafficLog {
    sink: Arc<dyn LineSink>,
    counter: CorrelationCounter,
    request_headers: Option<Arc<dyn HeaderFormatter>>,
    request_body: Option<Arc<dyn BodyFormatter>>,
    response_headers: Option<Arc<dyn HeaderFormatter>>,
    response_body: Option<Arc<dyn BodyFormatter>>,
}

impl TrafficLog {
    /// Log to `sink` with no header or body segments.
    pub fn new(sink: impl LineSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
            counter: CorrelationCounter::global(),
            request_headers: None,
            request_body: None,
            response_headers: None,
            response_body: None,
        }
    }

    pub fn disabled() -> Self {
        Self::new(NullSink)
    }

    pub fn with_counter(mut self, counter: CorrelationCounter) -> Self {
        self.counter = counter;
        self
    }

    pub fn request_headers(mut self, formatter: impl HeaderFormatter + 'static) -> Self {
        self.request_headers = Some(Arc::new(formatter));
        self
    }

    pub fn request_body(mut self, formatter: impl BodyFormatter + 'static) -> Self {
        self.request_body = Some(Arc::new(formatter));
        self
    }

    pub fn response_headers(mut self, formatter: impl HeaderFormatter + 'static) -> Self {
        self.response_headers = Some(Arc::new(formatter));
        self
    }

    pub fn response_body(mut self, formatter: impl BodyFormatter + 'static) -> Self {
        self.response_body = Some(Arc::new(formatter));
        self
    }

    pub fn from_config(config: &TrafficConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let mut log = Self::new(TracingSink::new(config.tracing_level()));

        let headers: Arc<dyn HeaderFormatter> = if config.redact_headers.is_empty() {
            Arc::new(AllHeaders)
        } else {
            Arc::new(SelectedHeaders::new().redact(config.redacted_header_names()))
        };
        if config.log_request_headers {
            log.request_headers = Some(headers.clone());
        }
        if config.log_response_headers {
            log.response_headers = Some(headers);
        }

        let body = body_formatter(config);
        if config.log_request_body {
            log.request_body = Some(body.clone());
        }
        if config.log_response_body {
            log.response_body = Some(body);
        }
        log
    }

    pub fn layer(&self) -> TrafficLogLayer {
        TrafficLogLayer { log: self.clone() }
    }

    /// Record one call. `forward` carries the request to its destination.
    pub async fn record<F, Fut, E>(
        &self,
        request: Request<Body>,
        forward: F,
    ) -> Result<Response<Body>, TrafficError>
    where
        F: FnOnce(Request<Body>) -> Fut,
        Fut: Future<Output = Result<Response<Body>, E>>,
        E: Into<BoxError>,
    {
        let mut call = CallRecord::new(
            self.counter.next_id(),
            request.method().clone(),
            request.uri().to_string(),
        );

        let request = if self.sink.enabled() {
            self.log_request(&call, request).await?
        } else {
            request
        };

        call.start_clock();
        let outcome = forward(request).await;
        let elapsed = call.elapsed();

        let response = match outcome {
            Ok(response) => response,
            Err(source) => {
                metrics::record_call(metrics::UPSTREAM, None, elapsed);
                let source: BoxError = source.into();
                tracing::debug!(call_id = call.id().get(), target = call.target(), error = %source, "Call failed");
                return Err(TrafficError::Transport {
                    call: call.id(),
                    target: call.target,
                    source,
                });
            }
        };
        metrics::record_call(metrics::UPSTREAM, Some(response.status().as_u16()), elapsed);

        if self.sink.enabled() {
            self.log_response(&call, response, elapsed).await
        } else {
            Ok(response)
        }
    }

    async fn log_request(
        &self,
        call: &CallRecord,
        request: Request<Body>,
    ) -> Result<Request<Body>, TrafficError> {
        let mut line = call.request_line();
        if let Some(formatter) = &self.request_headers {
            push_segment(&mut line, "headers", &render_headers(formatter.as_ref(), request.headers()));
        }

        let request = match &self.request_body {
            Some(formatter) => {
                let (parts, body) = request.into_parts();
                let tee = capture(call, BodyPart::Request, body).await?;
                push_segment(&mut line, "body", &render_body(formatter.as_ref(), tee.bytes()));
                Request::from_parts(parts, tee.replay())
            }
            None => request,
        };

        self.sink.emit(&line);
        Ok(request)
    }

    async fn log_response(
        &self,
        call: &CallRecord,
        response: Response<Body>,
        elapsed: Duration,
    ) -> Result<Response<Body>, TrafficError> {
        let mut line = call.response_line(response.status().as_u16(), elapsed);
        if let Some(formatter) = &self.response_headers {
            push_segment(&mut line, "headers", &render_headers(formatter.as_ref(), response.headers()));
        }

        let response = match &self.response_body {
            Some(formatter) => {
                let (parts, body) = response.into_parts();
                let tee = capture(call, BodyPart::Response, body).await?;
                push_segment(&mut line, "body", &render_body(formatter.as_ref(), tee.bytes()));
                Response::from_parts(parts, tee.replay())
            }
            None => response,
        };

        self.sink.emit(&line);
        Ok(response)
    }
}

impl fmt::Debug for TrafficLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrafficLog")
            .field("request_headers", &self.request_headers.is_some())
            .field("request_body", &self.request_body.is_some())
            .field("response_headers", &self.response_headers.is_some())
            .field("response_body", &self.response_body.is_some())
            .finish()
    }
}

fn body_formatter(config: &TrafficConfig) -> Arc<dyn BodyFormatter> {
    let cut = config.cut_string_literals;
    match config.body_format {
        BodyFormat::AsIs => {
            let format = AsIsFormat::new().cut_to(cut);
            Arc::new(if config.one_line { format.one_line() } else { format })
        }
        BodyFormat::Json => {
            let format = JsonFormat::new().cut_string_literals(cut);
            Arc::new(if config.one_line {
                format.one_line()
            } else {
                format.indent(config.indent.clone())
            })
        }
        BodyFormat::Xml => {
            let format = XmlFormat::new().cut_string_literals(cut);
            Arc::new(if config.one_line {
                format.one_line()
            } else {
                format.indent(config.indent.clone())
            })
        }
    }
}

fn push_segment(line: &mut String, name: &str, text: &str) {
    line.push(' ');
    line.push_str(name);
    line.push('[');
    line.push_str(text);
    line.push(']');
}

async fn capture(call: &CallRecord, part: BodyPart, body: Body) -> Result<TeeBody, TrafficError> {
    TeeBody::capture(body)
        .await
        .map_err(|source| TrafficError::Capture {
            call: call.id(),
            part,
            source: source.into(),
        })
}

/// Layer installing a [`TrafficRecorder`].
#[derive(Debug, Clone)]
pub struct TrafficLogLayer {
    log: TrafficLog,
}

impl<S> Layer<S> for TrafficLogLayer {
    type Service = TrafficRecorder<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TrafficRecorder {
            inner,
            log: self.log.clone(),
        }
    }
}

/// Service recording every call made through `inner`.
#[derive(Debug, Clone)]
pub struct TrafficRecorder<S> {
    inner: S,
    log: TrafficLog,
}

impl<S> TrafficRecorder<S> {
    pub fn new(inner: S, log: TrafficLog) -> Self {
        Self { inner, log }
    }
}

impl<S> Service<Request<Body>> for TrafficRecorder<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Error: Into<BoxError> + Send,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = TrafficError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(|source| TrafficError::NotReady {
                source: source.into(),
            })
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // Keep the service that was polled ready
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let log = self.log.clone();

        Box::pin(async move { log.record(request, move |request| inner.call(request)).await })
    }
}

/// Plain HTTP client transport with a per-call timeout.
pub fn http_transport(timeout: Duration) -> Transport {
    let client = Client::builder(TokioExecutor::new()).build_http::<Body>();
    let service = ServiceBuilder::new()
        .timeout(timeout)
        .map_response(|response: Response<Incoming>| response.map(Body::new))
        .service(client);
    BoxCloneSyncService::new(service)
}

/// Wrap `transport` so that every call is recorded by `log`.
pub fn recorded(log: &TrafficLog, transport: Transport) -> RecordedTransport {
    BoxCloneSyncService::new(log.layer().layer(transport))
}
