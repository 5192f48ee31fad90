//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events, traffic lines)
//!     → metrics.rs (call counters, latency histograms, fault responses)
//!
//! Consumers:
//!     → Log output (stdout via tracing-subscriber)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Call ids are carried on every traffic line and internal event
//! - Metrics are cheap and no-ops until a recorder is installed
//! - Traffic lines use their own target so they can be filtered separately

pub mod logging;
pub mod metrics;
