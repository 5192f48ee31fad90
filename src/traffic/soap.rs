//! Logging for message pipelines that call back once per phase.
//!
//! SOAP clients invoke interceptors separately for the outbound message and
//! for the inbound response or fault. A [`SoapExchange`] carries the id taken
//! at the outbound phase to the inbound phase, so lines pair up without any
//! per-thread state.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::traffic::correlation::{CallId, CorrelationCounter};
use crate::traffic::format::{render_body, BodyFormatter};
use crate::traffic::recorder::{BodyPart, TrafficError};
use crate::traffic::sink::LineSink;
use crate::traffic::tee::{SharedCopy, TeeBody, TeeWriter};

const NO_DATA: &str = "no data to log";

/// Context of one request/response exchange.
#[derive(Debug)]
pub struct SoapExchange {
    id: CallId,
    outbound: Option<SniffedOutbound>,
}

impl SoapExchange {
    pub fn id(&self) -> CallId {
        self.id
    }
}

#[derive(Debug, Clone)]
struct SniffedOutbound {
    copy: SharedCopy,
    emitted: Arc<AtomicBool>,
}

/// Emits `soap-out[id]` and `soap-in[id]` lines.
#[derive(Clone)]
pub struct SoapExchangeLogger {
    sink: Arc<dyn LineSink>,
    formatter: Option<Arc<dyn BodyFormatter>>,
    counter: CorrelationCounter,
}

impl SoapExchangeLogger {
    pub fn new(sink: impl LineSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
            formatter: None,
            counter: CorrelationCounter::global(),
        }
    }

    pub fn formatter(mut self, formatter: impl BodyFormatter + 'static) -> Self {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    pub fn with_counter(mut self, counter: CorrelationCounter) -> Self {
        self.counter = counter;
        self
    }

    /// Start an exchange. Takes the next id.
    pub fn begin(&self) -> SoapExchange {
        SoapExchange {
            id: self.counter.next_id(),
            outbound: None,
        }
    }

    /// Log an outbound message that is already fully available.
    pub fn log_request(&self, exchange: &mut SoapExchange, message: Option<&[u8]>) {
        if let Some(sniffed) = &exchange.outbound {
            sniffed.emitted.store(true, Ordering::SeqCst);
        }
        self.emit("soap-out", exchange.id, message);
    }

    pub fn log_response(&self, exchange: &mut SoapExchange, message: Option<&[u8]>) {
        self.flush_outbound(exchange);
        self.emit("soap-in", exchange.id, message);
    }

    pub fn log_fault(&self, exchange: &mut SoapExchange, message: Option<&[u8]>) {
        self.flush_outbound(exchange);
        self.emit("soap-in", exchange.id, message);
    }

    /// Observe outbound bytes as they are written.
    ///
    /// The `soap-out` line is emitted once: when the writer shuts down, or
    /// when the inbound phase starts, whichever comes first.
    pub fn sniff_outbound<W>(&self, exchange: &mut SoapExchange, writer: W) -> TeeWriter<W>
    where
        W: AsyncWrite + Unpin,
    {
        let sniffed = SniffedOutbound {
            copy: SharedCopy::default(),
            emitted: Arc::new(AtomicBool::new(false)),
        };
        exchange.outbound = Some(sniffed.clone());

        let logger = self.clone();
        let id = exchange.id;
        TeeWriter::with_copy(writer, sniffed.copy.clone())
            .on_close(move || logger.emit_sniffed(id, &sniffed))
    }

    /// Drain the inbound message, log it, and return it for replay.
    pub async fn replay_inbound<R>(
        &self,
        exchange: &mut SoapExchange,
        reader: R,
    ) -> Result<TeeBody, TrafficError>
    where
        R: AsyncRead + Unpin,
    {
        let tee = TeeBody::read_from(reader)
            .await
            .map_err(|source| TrafficError::Capture {
                call: exchange.id,
                part: BodyPart::Response,
                source: source.into(),
            })?;
        self.log_response(exchange, Some(tee.bytes()));
        Ok(tee)
    }

    fn flush_outbound(&self, exchange: &mut SoapExchange) {
        if let Some(sniffed) = exchange.outbound.take() {
            self.emit_sniffed(exchange.id, &sniffed);
        }
    }

    fn emit_sniffed(&self, id: CallId, sniffed: &SniffedOutbound) {
        if sniffed.emitted.swap(true, Ordering::SeqCst) {
            return;
        }
        let copy = sniffed.copy.lock().unwrap_or_else(PoisonError::into_inner).clone();
        self.emit("soap-out", id, Some(&copy));
    }

    fn emit(&self, direction: &str, id: CallId, message: Option<&[u8]>) {
        if !self.sink.enabled() {
            return;
        }
        let text = match message {
            Some(bytes) => match &self.formatter {
                Some(formatter) => render_body(formatter.as_ref(), bytes),
                None => String::from_utf8_lossy(bytes).into_owned(),
            },
            None => NO_DATA.to_string(),
        };
        self.sink.emit(&format!("{}[{}]: {}", direction, id, text));
    }
}

impl fmt::Debug for SoapExchangeLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoapExchangeLogger")
            .field("formatter", &self.formatter.is_some())
            .finish()
    }
}
