//! Log sinks for rendered traffic lines.
//!
//! A sink is two collaborators in one: the gate (`enabled`) consulted before
//! any formatting work, and the consumer (`emit`) of a fully rendered line.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::Level;

/// Target used for traffic lines.
pub const TRAFFIC_TARGET: &str = "faultline::traffic";

pub trait LineSink: Send + Sync {
    /// Cheap check run before rendering a line.
    fn enabled(&self) -> bool;

    fn emit(&self, line: &str);
}

/// Emits lines as `tracing` events at a fixed level.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    level: Level,
}

impl TracingSink {
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl LineSink for TracingSink {
    fn enabled(&self) -> bool {
        if self.level == Level::ERROR {
            tracing::enabled!(target: TRAFFIC_TARGET, Level::ERROR)
        } else if self.level == Level::WARN {
            tracing::enabled!(target: TRAFFIC_TARGET, Level::WARN)
        } else if self.level == Level::INFO {
            tracing::enabled!(target: TRAFFIC_TARGET, Level::INFO)
        } else if self.level == Level::DEBUG {
            tracing::enabled!(target: TRAFFIC_TARGET, Level::DEBUG)
        } else {
            tracing::enabled!(target: TRAFFIC_TARGET, Level::TRACE)
        }
    }

    fn emit(&self, line: &str) {
        if self.level == Level::ERROR {
            tracing::error!(target: TRAFFIC_TARGET, "{}", line);
        } else if self.level == Level::WARN {
            tracing::warn!(target: TRAFFIC_TARGET, "{}", line);
        } else if self.level == Level::INFO {
            tracing::info!(target: TRAFFIC_TARGET, "{}", line);
        } else if self.level == Level::DEBUG {
            tracing::debug!(target: TRAFFIC_TARGET, "{}", line);
        } else {
            tracing::trace!(target: TRAFFIC_TARGET, "{}", line);
        }
    }
}

/// Sink that is never enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl LineSink for NullSink {
    fn enabled(&self) -> bool {
        false
    }

    fn emit(&self, _line: &str) {}
}

type EmitFn = Arc<dyn Fn(&str) + Send + Sync>;
type GateFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Sink built from a line consumer and an optional gate.
#[derive(Clone)]
pub struct CallbackSink {
    emit: EmitFn,
    gate: Option<GateFn>,
}

impl CallbackSink {
    pub fn new(emit: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            emit: Arc::new(emit),
            gate: None,
        }
    }

    pub fn gated(mut self, gate: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.gate = Some(Arc::new(gate));
        self
    }
}

impl fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSink")
            .field("gated", &self.gate.is_some())
            .finish()
    }
}

impl LineSink for CallbackSink {
    fn enabled(&self) -> bool {
        self.gate.as_ref().map_or(true, |gate| gate())
    }

    fn emit(&self, line: &str) {
        (self.emit)(line)
    }
}

/// Sink collecting lines in memory, with a switchable gate.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    disabled: AtomicBool,
    gate_checks: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.disabled.store(!enabled, Ordering::SeqCst);
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of times the gate was consulted.
    pub fn gate_checks(&self) -> usize {
        self.gate_checks.load(Ordering::SeqCst)
    }
}

impl LineSink for MemorySink {
    fn enabled(&self) -> bool {
        self.gate_checks.fetch_add(1, Ordering::SeqCst);
        !self.disabled.load(Ordering::SeqCst)
    }

    fn emit(&self, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
    }
}

impl<T: LineSink + ?Sized> LineSink for Arc<T> {
    fn enabled(&self) -> bool {
        (**self).enabled()
    }

    fn emit(&self, line: &str) {
        (**self).emit(line)
    }
}
