//! A single REST call and its failure type.

use std::fmt;
use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tower::ServiceExt;
use url::Url;

use crate::client::RestClient;
use crate::fault::{Fault, FaultKind, FaultRef};
use crate::observability::metrics;
use crate::traffic::BoxError;

/// A failed call: transport error, rejected status or unreadable body.
#[derive(Debug, thiserror::Error)]
pub struct HttpCallError {
    method: Method,
    url: String,
    status: Option<StatusCode>,
    #[source]
    cause: Option<BoxError>,
}

impl HttpCallError {
    fn new(method: &Method, url: &str) -> Self {
        Self {
            method: method.clone(),
            url: url.to_string(),
            status: None,
            cause: None,
        }
    }

    fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    fn because(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Status of the response, when one was received.
    pub fn response_status(&self) -> Option<StatusCode> {
        self.status
    }
}

impl fmt::Display for HttpCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request failed - {} to {}", self.method, self.url)?;
        if let Some(status) = self.status {
            write!(f, " status: {}", status.as_u16())?;
        }
        if let Some(cause) = &self.cause {
            write!(f, " because of: {}", cause)?;
        }
        Ok(())
    }
}

impl Fault for HttpCallError {
    fn kind(&self) -> FaultKind {
        FaultKind::of::<Self>()
    }

    fn cause(&self) -> Option<FaultRef<'_>> {
        self.cause.as_deref().map(|cause| FaultRef::Foreign(cause))
    }

    fn fields(&self) -> Option<Map<String, Value>> {
        let mut fields = Map::new();
        fields.insert("message".to_string(), Value::String(self.to_string()));
        fields.insert("url".to_string(), Value::String(self.url.clone()));
        fields.insert("method".to_string(), Value::String(self.method.to_string()));
        fields.insert(
            "status".to_string(),
            self.status.map_or(Value::Null, |s| Value::from(s.as_u16())),
        );
        Some(fields)
    }
}

/// Builder for one call on a [`RestClient`].
pub struct CallBuilder<'c> {
    client: &'c RestClient,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    content: Option<Result<Value, serde_json::Error>>,
    headers: Option<HeaderMap>,
}

impl<'c> CallBuilder<'c> {
    pub(crate) fn new(client: &'c RestClient, method: Method) -> Self {
        Self {
            client,
            method,
            path: String::new(),
            query: Vec::new(),
            content: None,
            headers: None,
        }
    }

    /// Path appended to the client root.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// JSON request content.
    pub fn json<T: Serialize + ?Sized>(mut self, content: &T) -> Self {
        self.content = Some(serde_json::to_value(content));
        self
    }

    /// Headers for this call instead of the client's strategy.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Run the call and return the raw response body.
    pub async fn send(self) -> Result<Bytes, HttpCallError> {
        self.exchange().await.map(|(_, body)| body)
    }

    /// Run the call and decode the JSON response body.
    pub async fn call<T: DeserializeOwned>(self) -> Result<T, HttpCallError> {
        let method = self.method.clone();
        let (url, body) = self.exchange().await?;
        serde_json::from_slice(&body).map_err(|e| HttpCallError::new(&method, &url).because(e))
    }

    /// Run the call; returns the called URL and the accepted body.
    async fn exchange(self) -> Result<(String, Bytes), HttpCallError> {
        let client = self.client;
        let id = client.counter.next_id();
        let method = self.method;
        let url = join_url(&client.root, &self.path, &self.query)
            .map_err(|e| HttpCallError::new(&method, &format!("{}{}", client.root, self.path)).because(e))?;
        let fail = || HttpCallError::new(&method, &url);

        let content = self.content.transpose().map_err(|e| fail().because(e))?;
        let headers = match self.headers {
            Some(headers) => headers,
            None => (client.headers)(&self.path, content.as_ref()),
        };
        let body = match &content {
            Some(value) => Body::from(serde_json::to_vec(value).map_err(|e| fail().because(e))?),
            None => Body::empty(),
        };

        let mut request = Request::builder()
            .method(method.clone())
            .uri(url.as_str())
            .body(body)
            .map_err(|e| fail().because(e))?;
        request.headers_mut().extend(headers);

        tracing::debug!("req[{}] {} {}", id, method, url);
        let started = Instant::now();
        let response = match client.transport.clone().oneshot(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("res[{}] {} {} err: {}", id, method, url, e);
                metrics::record_call(metrics::CLIENT, None, started.elapsed());
                return Err(fail().because(e));
            }
        };

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| fail().status(status).because(e))?
            .to_bytes();
        let elapsed = started.elapsed();
        tracing::debug!(
            "res[{}] {} {} status: {}, time: {}",
            id,
            method,
            url,
            status.as_u16(),
            elapsed.as_millis()
        );
        metrics::record_call(metrics::CLIENT, Some(status.as_u16()), elapsed);

        if (client.validator)(status) {
            Ok((url, body))
        } else {
            Err(fail().status(status))
        }
    }
}

fn join_url(root: &str, path: &str, query: &[(String, String)]) -> Result<String, url::ParseError> {
    let joined = format!("{}{}", root, path);
    if query.is_empty() {
        return Ok(joined);
    }
    let mut url = Url::parse(&joined)?;
    url.query_pairs_mut()
        .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    Ok(url.into())
}
