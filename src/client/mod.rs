//! REST client over any transport.
//!
//! # Responsibilities
//! - Join the client root with call paths and query pairs
//! - Apply default headers and validate response statuses
//! - Turn every failure into an `HttpCallError` that the fault engine understands
//!
//! # Design Decisions
//! - A missing transport is rejected when the client is built
//! - The transport is any tower service; wrap it in a recorder to log traffic

pub mod call;
pub mod policy;

use std::fmt;

use axum::body::Body;
use axum::http::{HeaderValue, Method, Request, Response};
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt};

use crate::config::ConfigError;
use crate::traffic::{BoxError, CorrelationCounter, Transport};

pub use call::{CallBuilder, HttpCallError};
pub use policy::{content_type_only, fixed, listed_codes, successful, HeaderStrategy, ResponseValidator};

/// Client bound to a root URL and a transport.
#[derive(Clone)]
pub struct RestClient {
    root: String,
    transport: Transport,
    headers: HeaderStrategy,
    validator: ResponseValidator,
    counter: CorrelationCounter,
}

impl RestClient {
    pub fn builder() -> RestClientBuilder {
        RestClientBuilder::default()
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn get(&self) -> CallBuilder<'_> {
        self.request(Method::GET)
    }

    pub fn post(&self) -> CallBuilder<'_> {
        self.request(Method::POST)
    }

    pub fn put(&self) -> CallBuilder<'_> {
        self.request(Method::PUT)
    }

    pub fn delete(&self) -> CallBuilder<'_> {
        self.request(Method::DELETE)
    }

    pub fn head(&self) -> CallBuilder<'_> {
        self.request(Method::HEAD)
    }

    pub fn request(&self, method: Method) -> CallBuilder<'_> {
        CallBuilder::new(self, method)
    }
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient").field("root", &self.root).finish()
    }
}

#[derive(Default)]
pub struct RestClientBuilder {
    root: Option<String>,
    transport: Option<Transport>,
    headers: Option<HeaderStrategy>,
    validator: Option<ResponseValidator>,
    counter: Option<CorrelationCounter>,
}

impl RestClientBuilder {
    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn transport<S>(mut self, transport: S) -> Self
    where
        S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + Sync + 'static,
        S::Error: Into<BoxError>,
        S::Future: Send + 'static,
    {
        let transport = transport.map_err(|e: S::Error| -> BoxError { e.into() });
        self.transport = Some(BoxCloneSyncService::new(transport));
        self
    }

    /// Default headers; JSON content type when unset.
    pub fn headers(mut self, headers: HeaderStrategy) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Status check; any 2xx when unset.
    pub fn validator(mut self, validator: ResponseValidator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_counter(mut self, counter: CorrelationCounter) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn build(self) -> Result<RestClient, ConfigError> {
        let transport = self.transport.ok_or(ConfigError::MissingTransport)?;
        Ok(RestClient {
            root: self.root.unwrap_or_default(),
            transport,
            headers: self
                .headers
                .unwrap_or_else(|| content_type_only(HeaderValue::from_static("application/json"))),
            validator: self.validator.unwrap_or_else(successful),
            counter: self.counter.unwrap_or_else(CorrelationCounter::global),
        })
    }
}
