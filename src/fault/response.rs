//! Fault → HTTP response conversion.
//!
//! # Responsibilities
//! - Invoke the optional logging hook once with the raw failure
//! - Walk the cause chain and pick the representative node
//! - Build the JSON body: representative fields + `class` + `allMessages`
//!
//! # Design Decisions
//! - Body processing is replaceable; the default never fails
//! - Unflattenable representatives produce a body carrying only `class`

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{Map, Value};

use crate::config::FaultsConfig;
use crate::fault::chain::{FaultChainWalker, FaultInfo, FaultNode};
use crate::fault::kind::{Fault, FaultRef};
use crate::fault::resolver::{FaultError, StatusResolver};
use crate::observability::metrics;

/// Hook receiving the raw failure before resolution.
pub type FaultHook = Arc<dyn Fn(FaultRef<'_>) + Send + Sync>;

/// Replacement for the default body builder.
pub type BodyProcessor = Arc<dyn Fn(&FaultNode<'_>, &FaultInfo<'_>) -> Map<String, Value> + Send + Sync>;

/// Status and structured body produced for a failure.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultResponse {
    pub status: StatusCode,
    pub body: Map<String, Value>,
}

impl FaultResponse {
    pub fn class(&self) -> Option<&str> {
        self.body.get("class").and_then(Value::as_str)
    }
}

impl IntoResponse for FaultResponse {
    fn into_response(self) -> Response {
        metrics::record_fault(self.status.as_u16(), self.class().unwrap_or("unknown"));
        (self.status, Json(Value::Object(self.body))).into_response()
    }
}

/// Converts failures into [`FaultResponse`]s.
#[derive(Clone)]
pub struct FaultHandler {
    walker: FaultChainWalker,
    hook: Option<FaultHook>,
    processor: Option<BodyProcessor>,
}

impl FaultHandler {
    pub fn new(resolver: Arc<StatusResolver>) -> Self {
        Self::with_walker(FaultChainWalker::new(resolver))
    }

    pub fn with_walker(walker: FaultChainWalker) -> Self {
        Self {
            walker,
            hook: None,
            processor: None,
        }
    }

    /// Handler with transport defaults plus the configured statuses.
    pub fn from_config(config: &FaultsConfig) -> Result<Self, FaultError> {
        let resolver = StatusResolver::with_transport_defaults();
        for (name, code) in &config.statuses {
            resolver.register_named(name.as_str(), *code)?;
        }
        let walker = FaultChainWalker::new(Arc::new(resolver))
            .with_platform_prefixes(config.platform_prefixes.clone())
            .with_max_depth(config.max_chain_depth);

        let handler = Self::with_walker(walker);
        Ok(if config.log_faults {
            handler.hook(Self::tracing_hook())
        } else {
            handler
        })
    }

    pub fn hook(mut self, hook: FaultHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn processor(mut self, processor: BodyProcessor) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn resolver(&self) -> &Arc<StatusResolver> {
        self.walker.resolver()
    }

    /// Hook that logs the failure and its chain at `warn` level.
    pub fn tracing_hook() -> FaultHook {
        Arc::new(|fault: FaultRef<'_>| {
            tracing::warn!(
                kind = fault.kind().simple_name(),
                chain = %ChainDisplay(fault),
                "Request failed"
            );
        })
    }

    pub fn handle(&self, fault: &dyn Fault) -> FaultResponse {
        self.process(FaultRef::Fault(fault))
    }

    pub fn handle_error(&self, err: &(dyn Error + 'static)) -> FaultResponse {
        self.process(FaultRef::Foreign(err))
    }

    pub fn process(&self, root: FaultRef<'_>) -> FaultResponse {
        if let Some(hook) = &self.hook {
            hook(root);
        }

        let info = self.walker.walk(root);
        let status = info.status_or_default();
        let fallback;
        let representative = match info.representative() {
            Some(node) => node,
            None => {
                fallback = FaultNode::capture(root, 0);
                &fallback
            }
        };

        let body = match &self.processor {
            Some(processor) => processor(representative, &info),
            None => default_body(representative, &info),
        };

        tracing::debug!(
            status = status.as_u16(),
            class = representative.kind().simple_name(),
            depth = representative.depth(),
            "Fault resolved"
        );
        FaultResponse { status, body }
    }
}

impl fmt::Debug for FaultHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultHandler")
            .field("walker", &self.walker)
            .field("hook", &self.hook.is_some())
            .field("processor", &self.processor.is_some())
            .finish()
    }
}

/// Representative's fields, plus `class`, plus `allMessages` for multi-node chains.
pub fn default_body(node: &FaultNode<'_>, info: &FaultInfo<'_>) -> Map<String, Value> {
    let mut body = node.fault().fields().unwrap_or_default();
    body.insert(
        "class".to_string(),
        Value::String(node.kind().simple_name().to_string()),
    );
    if info.messages.len() > 1 {
        body.insert(
            "allMessages".to_string(),
            Value::Array(info.messages.iter().cloned().map(Value::String).collect()),
        );
    }
    body
}

/// Renders `A: msg <- B: msg <- ...` for log output.
struct ChainDisplay<'a>(FaultRef<'a>);

impl fmt::Display for ChainDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut current = Some(self.0);
        let mut depth = 0;
        while let Some(fault) = current {
            if depth > 0 {
                f.write_str(" <- ")?;
            }
            if depth >= crate::fault::chain::DEFAULT_MAX_DEPTH {
                return f.write_str("...");
            }
            write!(f, "{}: {}", fault.kind().simple_name(), fault)?;
            current = fault.next();
            depth += 1;
        }
        Ok(())
    }
}
