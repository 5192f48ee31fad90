//! Replay-safe byte streams.
//!
//! `TeeBody` buffers a stream once and hands out independent readers over the
//! buffer. `TeeWriter` forks bytes into a copy as they are written.

use std::fmt;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{ready, Context, Poll};

use axum::body::{Body, HttpBody};
use bytes::{buf::Reader, Buf, Bytes};
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// A fully captured byte stream that can be read any number of times.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeeBody {
    bytes: Bytes,
}

impl TeeBody {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Drain an HTTP body into memory.
    pub async fn capture<B>(body: B) -> Result<Self, B::Error>
    where
        B: HttpBody<Data = Bytes>,
    {
        let collected = body.collect().await?;
        Ok(Self::new(collected.to_bytes()))
    }

    /// Drain an async reader into memory.
    pub async fn read_from<R>(mut reader: R) -> io::Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(Self::new(buf))
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// A fresh HTTP body over the captured bytes.
    pub fn replay(&self) -> Body {
        Body::from(self.bytes.clone())
    }

    /// A blocking reader positioned at the start.
    pub fn reader(&self) -> Reader<Bytes> {
        self.bytes.clone().reader()
    }

    /// An async reader positioned at the start.
    pub fn cursor(&self) -> Cursor<Bytes> {
        Cursor::new(self.bytes.clone())
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

/// Bytes copied out of a [`TeeWriter`].
pub type SharedCopy = Arc<Mutex<Vec<u8>>>;

type CloseFn = Box<dyn FnOnce() + Send>;

/// Writer that forwards every write and keeps a copy of the accepted bytes.
pub struct TeeWriter<W> {
    inner: W,
    copy: SharedCopy,
    on_close: Option<CloseFn>,
}

impl<W> TeeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_copy(inner, SharedCopy::default())
    }

    /// Fork into an existing copy buffer.
    pub fn with_copy(inner: W, copy: SharedCopy) -> Self {
        Self {
            inner,
            copy,
            on_close: None,
        }
    }

    /// Run `f` once after the inner writer shut down successfully.
    pub fn on_close(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    pub fn copy(&self) -> &SharedCopy {
        &self.copy
    }

    /// Bytes written so far.
    pub fn captured(&self) -> Bytes {
        Bytes::copy_from_slice(&self.copy.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W> fmt::Debug for TeeWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeeWriter")
            .field("captured", &self.copy.lock().map(|c| c.len()).unwrap_or(0))
            .field("closed", &self.on_close.is_none())
            .finish()
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for TeeWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let written = ready!(Pin::new(&mut this.inner).poll_write(cx, buf))?;
        this.copy
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(&buf[..written]);
        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(Pin::new(&mut this.inner).poll_shutdown(cx))?;
        if let Some(on_close) = this.on_close.take() {
            on_close();
        }
        Poll::Ready(Ok(()))
    }
}
