//! Axum wiring for fault responses.
//!
//! Handlers return `Result<_, Failure>`. The failure rides in the response
//! extensions until `fault_middleware` turns it into a JSON fault response.

use std::fmt;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::fault::kind::Fault;
use crate::fault::response::FaultHandler;

/// A failure raised by a handler.
#[derive(Clone)]
pub struct Failure(Arc<dyn Fault>);

impl Failure {
    pub fn new(fault: impl Fault) -> Self {
        Self(Arc::new(fault))
    }

    pub fn fault(&self) -> &dyn Fault {
        self.0.as_ref()
    }
}

impl<F: Fault> From<F> for Failure {
    fn from(fault: F) -> Self {
        Self::new(fault)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Failure").field(&self.0).finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// Replace responses carrying a [`Failure`] with the handler's fault response.
pub async fn fault_middleware(
    State(handler): State<Arc<FaultHandler>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    match response.extensions_mut().remove::<Failure>() {
        Some(failure) => handler.handle(failure.fault()).into_response(),
        None => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::kind::FaultKind;
    use crate::fault::resolver::StatusResolver;
    use axum::{middleware, routing::get, Router};
    use http_body_util::BodyExt;
    use thiserror::Error;
    use tower::ServiceExt;

    #[derive(Debug, Error)]
    #[error("order {0} missing")]
    struct MissingOrder(u32);

    impl Fault for MissingOrder {
        fn kind(&self) -> FaultKind {
            FaultKind::of::<Self>().declares(StatusCode::NOT_FOUND)
        }
    }

    async fn missing() -> Result<&'static str, Failure> {
        Err(MissingOrder(7).into())
    }

    async fn fine() -> Result<&'static str, Failure> {
        Ok("fine")
    }

    fn app() -> Router {
        let handler = Arc::new(FaultHandler::new(Arc::new(StatusResolver::new())));
        Router::new()
            .route("/missing", get(missing))
            .route("/fine", get(fine))
            .layer(middleware::from_fn_with_state(handler, fault_middleware))
    }

    #[tokio::test]
    async fn test_failure_becomes_fault_response() {
        let response = app()
            .oneshot(Request::builder().uri("/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["class"], "MissingOrder");
        assert_eq!(json["message"], "order 7 missing");
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let response = app()
            .oneshot(Request::builder().uri("/fine").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"fine");
    }
}
