//! Replayable traffic recording.
//!
//! # Data Flow
//! ```text
//! request
//!     → correlation.rs (next call id)
//!     → sink.rs gate (skip all formatting when disabled)
//!     → format.rs (headers / body copy → text, failures → placeholder)
//!     → tee.rs (buffer once, replay to the real consumer)
//!     → sink.rs (emit http-req / http-res line)
//! ```
//!
//! # Design Decisions
//! - Correlation ids travel with the call (`CallRecord`, `SoapExchange`)
//! - Bodies are buffered only when a formatter asks for them
//! - Capture failures are call failures and flow into the fault engine

pub mod correlation;
pub mod format;
pub mod recorder;
pub mod sink;
pub mod soap;
pub mod tee;

pub use correlation::{CallId, CorrelationCounter};
pub use format::{
    render_body, render_headers, AllHeaders, AsIsFormat, BodyFormatter, FormatError,
    HeaderFormatter, JsonFormat, SelectedHeaders, XmlFormat,
};
pub use recorder::{
    http_transport, recorded, BodyPart, BoxError, CallRecord, RecordedTransport, TrafficError,
    TrafficLog, TrafficLogLayer, TrafficRecorder, Transport,
};
pub use sink::{CallbackSink, LineSink, MemorySink, NullSink, TracingSink, TRAFFIC_TARGET};
pub use soap::{SoapExchange, SoapExchangeLogger};
pub use tee::{SharedCopy, TeeBody, TeeWriter};
