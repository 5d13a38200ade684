//! Streaming output buffering
//!
//! Coalesces many small incremental model-output fragments into fewer UI
//! update calls. A batch flushes immediately when it reaches the size
//! threshold. Below it, a flush timer armed by the first fragment of a batch
//! handles lone fragments, and an idle timer re-armed by every fragment
//! handles stream pauses; whichever fires first wins, and both timers are
//! cancelled on the next append or on any flush.

use crate::config::StreamConfig;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Consumer callback receiving coalesced output
pub type FlushSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Counters reported by `finalize` for observability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub chunks_appended: usize,
    pub flushes: usize,
    pub chars_delivered: usize,
}

struct Inner {
    buffer: String,
    stats: StreamStats,
    flushing: bool,
    finalized: bool,
    flush_timer: Option<JoinHandle<()>>,
    idle_timer: Option<JoinHandle<()>>,
}

impl Inner {
    fn cancel_timers(&mut self) {
        if let Some(t) = self.flush_timer.take() {
            t.abort();
        }
        if let Some(t) = self.idle_timer.take() {
            t.abort();
        }
    }
}

/// Clonable handle to one request's output buffer
#[derive(Clone)]
pub struct StreamBuffer {
    inner: Arc<Mutex<Inner>>,
    sink: FlushSink,
    config: StreamConfig,
}

impl StreamBuffer {
    pub fn new(config: StreamConfig, sink: FlushSink) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                buffer: String::new(),
                stats: StreamStats::default(),
                flushing: false,
                finalized: false,
                flush_timer: None,
                idle_timer: None,
            })),
            sink,
            config,
        }
    }

    /// Append one incremental fragment. Flushes synchronously when the
    /// buffered size reaches the threshold.
    pub fn append(&self, text: &str) {
        let over_threshold = {
            let mut inner = self.inner.lock().unwrap();
            if inner.finalized {
                debug!("append after finalize ignored");
                return;
            }
            let batch_start = inner.buffer.is_empty();
            inner.buffer.push_str(text);
            inner.stats.chunks_appended += 1;

            if inner.buffer.chars().count() >= self.config.flush_threshold_chars {
                true
            } else {
                inner.cancel_timers();
                if batch_start {
                    inner.flush_timer = Some(self.spawn_timer(self.config.flush_interval_ms));
                }
                inner.idle_timer = Some(self.spawn_timer(self.config.idle_flush_ms));
                false
            }
        };
        if over_threshold {
            self.flush();
        }
    }

    fn spawn_timer(&self, delay_ms: u64) -> JoinHandle<()> {
        let buf = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            buf.flush();
        })
    }

    /// Deliver everything buffered to the sink. A flush already in progress
    /// makes nested calls a no-op, so the sink is never invoked twice
    /// concurrently for the same buffer.
    pub fn flush(&self) {
        let text = {
            let mut inner = self.inner.lock().unwrap();
            if inner.flushing {
                return;
            }
            inner.cancel_timers();
            if inner.buffer.is_empty() {
                return;
            }
            inner.flushing = true;
            inner.stats.flushes += 1;
            inner.stats.chars_delivered += inner.buffer.chars().count();
            std::mem::take(&mut inner.buffer)
        };

        (self.sink)(&text);

        let mut inner = self.inner.lock().unwrap();
        inner.flushing = false;
    }

    /// One last flush plus the batch counters. Further appends are ignored.
    pub fn finalize(&self) -> StreamStats {
        self.flush();
        let mut inner = self.inner.lock().unwrap();
        inner.finalized = true;
        inner.cancel_timers();
        debug!(
            chunks = inner.stats.chunks_appended,
            flushes = inner.stats.flushes,
            "stream buffer finalized"
        );
        inner.stats
    }
}
