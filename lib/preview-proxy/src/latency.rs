//! Writer that flushes its sink at most once per interval
//!
//! Writes and periodic flushes share one lock, so a flush never splits a
//! write and two flushes never overlap. The flush task lives exactly as long
//! as the writer: `stop` is a handshake that returns only after the task has
//! exited, and dropping the writer without stopping it aborts the task.

use crate::body::BodySink;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Runs once when the flush task exits
pub type ExitHook = Box<dyn FnOnce() + Send + 'static>;

/// Sink wrapper whose background task flushes the sink every interval
pub struct LatencyBoundedWriter<S> {
    dst: Arc<Mutex<S>>,
    stop_tx: Option<oneshot::Sender<()>>,
    flush_task: Option<JoinHandle<()>>,
}

impl<S: BodySink + 'static> LatencyBoundedWriter<S> {
    /// Wrap `dst` and start flushing it every `latency`
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(dst: S, latency: Duration) -> Self {
        Self::start_with_exit_hook(dst, latency, None)
    }

    /// Like [`start`](Self::start), running `on_exit` once the flush task ends
    pub fn start_with_exit_hook(dst: S, latency: Duration, on_exit: Option<ExitHook>) -> Self {
        let dst = Arc::new(Mutex::new(dst));
        let (stop_tx, stop_rx) = oneshot::channel();
        let flush_task = tokio::spawn(flush_loop(dst.clone(), latency, stop_rx, on_exit));

        Self {
            dst,
            stop_tx: Some(stop_tx),
            flush_task: Some(flush_task),
        }
    }

    /// Stop the flush task and hand back the sink
    ///
    /// Waits without a timeout until the flush task has exited; no periodic
    /// flush happens after this returns.
    pub async fn stop(mut self) -> io::Result<S> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(flush_task) = self.flush_task.take() {
            if let Err(e) = flush_task.await {
                debug!(error = %e, "Flush task ended abnormally");
            }
        }

        let dst = self.dst.clone();
        drop(self);
        match Arc::try_unwrap(dst) {
            Ok(dst) => Ok(dst.into_inner()),
            Err(_) => Err(io::Error::other("flush task still holds the response sink")),
        }
    }
}

impl<S> Drop for LatencyBoundedWriter<S> {
    fn drop(&mut self) {
        if let Some(flush_task) = self.flush_task.take() {
            flush_task.abort();
        }
    }
}

#[async_trait]
impl<S: BodySink + 'static> BodySink for LatencyBoundedWriter<S> {
    async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        let mut dst = self.dst.lock().await;
        dst.write(chunk).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        let mut dst = self.dst.lock().await;
        dst.flush().await
    }

    fn supports_flush(&self) -> bool {
        true
    }
}

async fn flush_loop<S: BodySink>(
    dst: Arc<Mutex<S>>,
    latency: Duration,
    mut stop_rx: oneshot::Receiver<()>,
    on_exit: Option<ExitHook>,
) {
    let mut ticker = time::interval_at(Instant::now() + latency, latency);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                let mut dst = dst.lock().await;
                if let Err(e) = dst.flush().await {
                    trace!(error = %e, "Periodic flush failed");
                }
                // A tick that came due while a write held the lock must not
                // fire right after this flush
                ticker.reset();
            }
        }
    }

    drop(dst);
    if let Some(on_exit) = on_exit {
        on_exit();
    }
}
