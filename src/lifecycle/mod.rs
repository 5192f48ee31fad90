//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → every subscriber wakes → server stops accepting → drain → exit
//!
//! Signals (signals.rs):
//!     SIGINT (Ctrl+C) → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One broadcast channel; every long-running task subscribes
//! - A trigger with no subscribers is not an error

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_on_ctrl_c;
