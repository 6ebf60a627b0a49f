//! Body types shared by the forwarder, the transport and the response streamer

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http_body_util::combinators::BoxBody;
use hyper::body::{Body, Frame};
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body of a request sent upstream
pub type OutboundBody = BoxBody<Bytes, BoxError>;

/// Body of a response received from upstream, consumed once
pub type UpstreamBody = BoxBody<Bytes, BoxError>;

/// Body of every response handed back to the client
pub type ProxyBody = BoxBody<Bytes, io::Error>;

/// Bytes buffered by a [`ChannelSink`] before a frame is emitted
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

const CHANNEL_CAPACITY: usize = 4;

/// Destination of a response body on the client side
#[async_trait]
pub trait BodySink: Send {
    /// Write a chunk of body bytes
    async fn write(&mut self, chunk: Bytes) -> io::Result<()>;

    /// Push buffered bytes to the client now
    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Whether `flush` does anything for this sink
    fn supports_flush(&self) -> bool {
        false
    }

    /// Finish the body, flushing whatever is left
    async fn close(&mut self) -> io::Result<()> {
        self.flush().await
    }
}

/// Buffered sink feeding a [`ChannelBody`]
///
/// Small writes accumulate until the buffer fills or `flush` is called.
pub struct ChannelSink {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buf: BytesMut,
    buffer_size: usize,
}

impl ChannelSink {
    /// Create a sink and the client body it feeds
    pub fn new() -> (Self, ChannelBody) {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a sink emitting a frame every `buffer_size` bytes at most
    pub fn with_buffer_size(buffer_size: usize) -> (Self, ChannelBody) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let sink = Self {
            tx,
            buf: BytesMut::with_capacity(buffer_size),
            buffer_size,
        };
        (sink, ChannelBody { rx })
    }

    /// Bytes written but not yet handed to the client body
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    async fn send(&mut self, chunk: Bytes) -> io::Result<()> {
        self.tx.send(Ok(chunk)).await.map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "client connection closed")
        })
    }
}

#[async_trait]
impl BodySink for ChannelSink {
    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        // Large chunks skip the buffer when nothing is pending ahead of them
        if self.buf.is_empty() && chunk.len() >= self.buffer_size {
            return self.send(chunk).await;
        }

        self.buf.extend_from_slice(&chunk);
        if self.buf.len() >= self.buffer_size {
            let data = self.buf.split().freeze();
            self.send(data).await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let data = self.buf.split().freeze();
        self.send(data).await
    }

    fn supports_flush(&self) -> bool {
        true
    }
}

/// Client response body fed by a [`ChannelSink`]
///
/// Ends when the sink is dropped.
pub struct ChannelBody {
    rx: mpsc::Receiver<io::Result<Bytes>>,
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.rx
            .poll_recv(cx)
            .map(|chunk| chunk.map(|result| result.map(Frame::data)))
    }
}
