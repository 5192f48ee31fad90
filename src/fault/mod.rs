//! Fault resolution subsystem.
//!
//! # Data Flow
//! ```text
//! handler returns Err(Failure)
//!     → middleware.rs (pull the failure out of the response)
//!     → response.rs (hook, then walk)
//!     → chain.rs (per node: summary, platform check, status lookup)
//!     → resolver.rs (registration → declaration → hint → parent, cached per type)
//!     → response.rs (representative fields + class + allMessages)
//!     → JSON response with the resolved status
//! ```
//!
//! # Design Decisions
//! - Failure types describe themselves through `FaultKind`; no runtime reflection
//! - The resolver cache and registrations are the only shared mutable state
//! - Every failure reaching the boundary becomes a JSON body, never a raw error

pub mod chain;
pub mod kind;
pub mod middleware;
pub mod resolver;
pub mod response;

pub use chain::{FaultChainWalker, FaultInfo, FaultNode};
pub use kind::{classify, to_fields, Fault, FaultKind, FaultRef, FaultType, HasStatusHint};
pub use middleware::{fault_middleware, Failure};
pub use resolver::{FaultError, StatusResolver};
pub use response::{default_body, BodyProcessor, FaultHandler, FaultHook, FaultResponse};
