//! Fault resolution and replayable traffic recording for HTTP services.

pub mod client;
pub mod config;
pub mod fault;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod traffic;

pub use client::RestClient;
pub use config::schema::ServiceConfig;
pub use fault::{Failure, Fault, FaultHandler, FaultKind, StatusResolver};
pub use http::RelayServer;
pub use lifecycle::Shutdown;
pub use traffic::{SoapExchangeLogger, TrafficLog};
