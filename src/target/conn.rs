//! Accepted connections that can be cut off once the grace period is over
//!
//! axum runs every connection in its own task and hands out no handle to
//! them. Each accepted stream therefore carries the abort signal and fails
//! all further I/O after it fires, which makes hyper drop the connection.

use crate::server::ShutdownSignal;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};

/// TCP listener whose streams stop working when `abort` fires
pub struct AbortableListener {
    inner: TcpListener,
    abort: ShutdownSignal,
}

impl AbortableListener {
    pub fn new(inner: TcpListener, abort: ShutdownSignal) -> Self {
        Self { inner, abort }
    }
}

impl axum::serve::Listener for AbortableListener {
    type Io = AbortableStream;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        let (stream, addr) = axum::serve::Listener::accept(&mut self.inner).await;
        let stream = AbortableStream {
            inner: stream,
            abort: self.abort.clone(),
        };
        (stream, addr)
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

/// One accepted connection
pub struct AbortableStream {
    inner: TcpStream,
    abort: ShutdownSignal,
}

impl AbortableStream {
    fn aborted(&self) -> Option<io::Error> {
        self.abort.is_shutdown().then(|| {
            io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "connection closed after the grace period",
            )
        })
    }
}

impl AsyncRead for AbortableStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(e) = this.aborted() {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for AbortableStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if let Some(e) = this.aborted() {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(e) = this.aborted() {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
