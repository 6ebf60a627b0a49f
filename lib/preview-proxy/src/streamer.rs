//! Relays an upstream response body to the client

use crate::body::{BodySink, BoxError};
use crate::latency::LatencyBoundedWriter;
use http_body_util::BodyExt;
use hyper::body::{Body, Bytes};
use std::io;
use std::time::Duration;
use tracing::{debug, warn};

/// Copies response bodies, optionally bounding flush latency
#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseStreamer {
    flush_interval: Duration,
}

impl ResponseStreamer {
    /// Create a streamer; a zero interval disables periodic flushing
    pub fn new(flush_interval: Duration) -> Self {
        Self { flush_interval }
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Copy `body` into `sink` until the body ends or an error occurs
    ///
    /// Status and headers are already committed when this runs, so a copy
    /// error is only logged. The sink is closed either way. Returns the
    /// number of bytes written to the sink.
    pub async fn stream<B, S>(&self, body: B, mut sink: S) -> u64
    where
        B: Body<Data = Bytes> + Send + Unpin,
        B::Error: Into<BoxError>,
        S: BodySink + 'static,
    {
        // Periodic flushing only pays off for sinks that can flush
        let (copied, result, mut sink) =
            if self.flush_interval.is_zero() || !sink.supports_flush() {
                let (copied, result) = copy_body(body, &mut sink).await;
                (copied, result, sink)
            } else {
                let mut writer = LatencyBoundedWriter::start(sink, self.flush_interval);
                let (copied, result) = copy_body(body, &mut writer).await;
                match writer.stop().await {
                    Ok(sink) => (copied, result, sink),
                    Err(e) => {
                        report_copy_result(&result, copied);
                        // The client body ends once the last sender is dropped
                        warn!(error = %e, "Failed to recover response sink");
                        return copied;
                    }
                }
            };

        report_copy_result(&result, copied);
        if let Err(e) = sink.close().await {
            debug!(error = %e, "Closing client response body failed");
        }
        copied
    }
}

/// Log a failed copy
fn report_copy_result(result: &io::Result<()>, copied: u64) {
    if let Err(e) = result {
        warn!(error = %e, copied, "Copying upstream response body failed");
    }
}

/// Sequentially move every data frame from `body` into `sink`
///
/// Returns the bytes written before the body ended or failed.
pub async fn copy_body<B>(mut body: B, sink: &mut dyn BodySink) -> (u64, io::Result<()>)
where
    B: Body<Data = Bytes> + Send + Unpin,
    B::Error: Into<BoxError>,
{
    let mut copied = 0u64;
    while let Some(frame) = body.frame().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => return (copied, Err(io::Error::other(e.into()))),
        };
        if let Ok(data) = frame.into_data() {
            let len = data.len() as u64;
            if let Err(e) = sink.write(data).await {
                return (copied, Err(e));
            }
            copied += len;
        }
    }
    (copied, Ok(()))
}
