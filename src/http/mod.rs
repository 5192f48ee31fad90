//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, trace layer)
//!     → fault middleware (turns handler failures into JSON fault responses)
//!     → relay handler (map path onto the upstream base)
//!     → recorded transport (http-req / http-res lines, timeout)
//!     → upstream response streamed back to the client
//! ```

pub mod server;

pub use server::{RelayError, RelayServer, RelayState};
