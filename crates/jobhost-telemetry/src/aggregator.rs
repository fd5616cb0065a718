//! Batched event aggregation.
//!
//! [`BatchAggregator`] buffers items from any number of producers and hands
//! them to a [`BatchSink`] in batches. A batch is cut when either
//!
//! - the buffer reaches `max_batch_size` (the producer that filled it cuts it), or
//! - the flush timer fires,
//!
//! whichever comes first. [`shutdown`](BatchAggregator::shutdown) performs one
//! final flush and waits until every batch has been written.
//!
//! ## Architecture
//!
//! ```text
//! producers ──enqueue──▶ Mutex<buffer> ──detach──▶ mpsc ──▶ writer task ──▶ sink
//!                             ▲
//!                 timer task ─┘ (every flush_interval)
//! ```
//!
//! The buffer lock is held only to push an item or to swap the buffer out and
//! queue it for the writer. Producers never wait on the sink.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{AggregatorResult, SinkResult};

// =============================================================================
// Sinks
// =============================================================================

/// Receives flushed batches.
#[async_trait]
pub trait BatchSink<T>: Send + Sync + 'static {
    /// Writes one batch. Errors are logged by the aggregator and the batch is
    /// dropped.
    async fn write(&self, batch: Vec<T>) -> SinkResult<()>;
}

/// Receives batched text.
#[async_trait]
pub trait TextSink: Send + Sync + 'static {
    /// Writes one block of text.
    async fn write(&self, text: String) -> SinkResult<()>;
}

/// Adapts a [`TextSink`] into a [`BatchSink<String>`].
///
/// A batch becomes one block: a leading newline, then each line terminated
/// by `\n`.
pub struct TextBatchSink<S> {
    inner: S,
}

impl<S: TextSink> TextBatchSink<S> {
    /// Wraps a text sink.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

/// Joins lines into the block written by [`TextBatchSink`].
pub fn format_text_batch(lines: &[String]) -> String {
    let len = 1 + lines.iter().map(|l| l.len() + 1).sum::<usize>();
    let mut text = String::with_capacity(len);
    text.push('\n');
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    text
}

#[async_trait]
impl<S: TextSink> BatchSink<String> for TextBatchSink<S> {
    async fn write(&self, batch: Vec<String>) -> SinkResult<()> {
        self.inner.write(format_text_batch(&batch)).await
    }
}

// =============================================================================
// Options
// =============================================================================

/// Aggregator tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorOptions {
    /// Buffer size that triggers an immediate flush. At least 1.
    pub max_batch_size: usize,
    /// Period of the flush timer.
    pub flush_interval: Duration,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            flush_interval: Duration::from_secs(30),
        }
    }
}

impl AggregatorOptions {
    /// Sets the size threshold.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size.max(1);
        self
    }

    /// Sets the timer period.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }
}

// =============================================================================
// Shared state
// =============================================================================

struct Buffer<T> {
    items: Vec<T>,
    /// `None` once shut down.
    sender: Option<mpsc::UnboundedSender<Vec<T>>>,
}

impl<T> Buffer<T> {
    /// Swaps the buffer out and queues it for the writer.
    ///
    /// Called with the lock held, so batches reach the writer in detach order.
    fn detach(&mut self) -> usize {
        if self.items.is_empty() {
            return 0;
        }
        let batch = std::mem::take(&mut self.items);
        let count = batch.len();
        if let Some(sender) = &self.sender {
            // The writer only goes away after `sender` is cleared.
            let _ = sender.send(batch);
        }
        count
    }
}

struct Shared<T> {
    buffer: Mutex<Buffer<T>>,
    max_batch_size: usize,
}

impl<T> Shared<T> {
    fn flush(&self) -> usize {
        self.buffer.lock().detach()
    }
}

type ShutdownHook = Box<dyn FnOnce() + Send>;

// =============================================================================
// BatchAggregator
// =============================================================================

/// Concurrent producers, single writer, size- and time-triggered flushes.
pub struct BatchAggregator<T> {
    shared: Arc<Shared<T>>,
    timer_token: CancellationToken,
    tasks: Mutex<Option<(JoinHandle<()>, JoinHandle<()>)>>,
    hooks: Mutex<Vec<ShutdownHook>>,
    shut_down: AtomicBool,
    options: AggregatorOptions,
}

impl<T: Send + 'static> BatchAggregator<T> {
    /// Starts an aggregator writing to `sink`.
    ///
    /// Spawns the timer and writer tasks, so it must be called within a
    /// Tokio runtime.
    pub fn new<S>(options: AggregatorOptions, sink: S) -> Self
    where
        S: BatchSink<T>,
    {
        let options = options.with_batch_size(options.max_batch_size);
        let (sender, receiver) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            buffer: Mutex::new(Buffer {
                items: Vec::new(),
                sender: Some(sender),
            }),
            max_batch_size: options.max_batch_size,
        });

        let timer_token = CancellationToken::new();
        let timer = tokio::spawn(run_timer(
            shared.clone(),
            options.flush_interval,
            timer_token.clone(),
        ));
        let writer = tokio::spawn(run_writer(receiver, sink));

        debug!(
            batch_size = options.max_batch_size,
            flush_interval_ms = duration_millis(options.flush_interval),
            "Batch aggregator started"
        );

        Self {
            shared,
            timer_token,
            tasks: Mutex::new(Some((timer, writer))),
            hooks: Mutex::new(Vec::new()),
            shut_down: AtomicBool::new(false),
            options,
        }
    }

    /// Adds an item. Never waits.
    ///
    /// If this fills the buffer, the batch is cut immediately. Items added
    /// after shutdown are dropped.
    pub fn enqueue(&self, item: T) {
        let mut buffer = self.shared.buffer.lock();
        if buffer.sender.is_none() {
            return;
        }
        buffer.items.push(item);
        if buffer.items.len() >= self.shared.max_batch_size {
            buffer.detach();
        }
    }

    /// Cuts the current buffer as a batch. Returns the number of items
    /// handed to the writer; an empty buffer is a no-op.
    pub fn flush(&self) -> usize {
        self.shared.flush()
    }

    /// Number of buffered items not yet cut into a batch.
    pub fn pending(&self) -> usize {
        self.shared.buffer.lock().items.len()
    }

    /// The options this aggregator runs with.
    pub fn options(&self) -> &AggregatorOptions {
        &self.options
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Registers a callback run at the end of shutdown.
    ///
    /// Used to release whatever feeds the aggregator (subscriptions, layers).
    pub fn on_shutdown(&self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.lock().push(Box::new(hook));
    }

    /// Stops the timer, flushes what is left and waits for the writer.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) -> AggregatorResult<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.timer_token.cancel();
        let Some((timer, writer)) = self.tasks.lock().take() else {
            return Ok(());
        };
        let timer_result = timer.await;

        let flushed = {
            let mut buffer = self.shared.buffer.lock();
            let flushed = buffer.detach();
            buffer.sender = None;
            flushed
        };

        let writer_result = writer.await;

        let hooks = std::mem::take(&mut *self.hooks.lock());
        for hook in hooks {
            hook();
        }

        debug!(final_batch = flushed, "Batch aggregator shut down");
        timer_result?;
        writer_result?;
        Ok(())
    }
}

impl<T> Drop for BatchAggregator<T> {
    fn drop(&mut self) {
        self.timer_token.cancel();
    }
}

impl<T> fmt::Debug for BatchAggregator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchAggregator")
            .field("options", &self.options)
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Whole milliseconds of `duration` for log fields, saturating at `u64::MAX`.
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// Background tasks
// =============================================================================

async fn run_timer<T>(shared: Arc<Shared<T>>, period: Duration, token: CancellationToken) {
    let period = period.max(Duration::from_millis(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            _ = ticker.tick() => {
                let count = shared.flush();
                if count > 0 {
                    trace!(batch_size = count, "Timer flush");
                }
            }
        }
    }
}

async fn run_writer<T, S: BatchSink<T>>(mut receiver: mpsc::UnboundedReceiver<Vec<T>>, sink: S) {
    while let Some(batch) = receiver.recv().await {
        let count = batch.len();
        if let Err(e) = sink.write(batch).await {
            warn!(error = %e, batch_size = count, "Dropping batch after sink failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use tokio_test::assert_ok;

    use super::*;
    use crate::error::SinkError;

    struct ChannelSink<T> {
        sender: mpsc::UnboundedSender<Vec<T>>,
    }

    #[async_trait]
    impl<T: Send + 'static> BatchSink<T> for ChannelSink<T> {
        async fn write(&self, batch: Vec<T>) -> SinkResult<()> {
            let _ = self.sender.send(batch);
            Ok(())
        }
    }

    fn channel_sink<T>() -> (ChannelSink<T>, mpsc::UnboundedReceiver<Vec<T>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (ChannelSink { sender }, receiver)
    }

    fn options(size: usize, secs: u64) -> AggregatorOptions {
        AggregatorOptions::default()
            .with_batch_size(size)
            .with_flush_interval(Duration::from_secs(secs))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flushes_partial_batch() {
        let (sink, mut batches) = channel_sink();
        let aggregator = BatchAggregator::new(options(10, 1), sink);

        let start = Instant::now();
        for i in 0..9 {
            aggregator.enqueue(i);
        }
        assert_eq!(aggregator.pending(), 9);

        let batch = batches.recv().await.unwrap();
        assert_eq!(batch, (0..9).collect::<Vec<_>>());
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert_eq!(aggregator.pending(), 0);

        assert_ok!(aggregator.shutdown().await);
        assert!(batches.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_threshold_flushes_before_timer() {
        let (sink, mut batches) = channel_sink();
        let aggregator = BatchAggregator::new(options(10, 1), sink);

        let start = Instant::now();
        for i in 0..10 {
            aggregator.enqueue(i);
        }

        let batch = batches.recv().await.unwrap();
        assert_eq!(batch.len(), 10);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(aggregator.pending(), 0);
    }

    #[tokio::test]
    async fn test_flush_empty_is_noop() {
        let (sink, mut batches) = channel_sink::<u32>();
        let aggregator = BatchAggregator::new(options(10, 60), sink);

        assert_eq!(aggregator.flush(), 0);
        assert_ok!(aggregator.shutdown().await);
        assert!(batches.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_double_shutdown_flushes_once() {
        let (sink, mut batches) = channel_sink();
        let aggregator = BatchAggregator::new(options(10, 60), sink);

        let released = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = released.clone();
        aggregator.on_shutdown(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        aggregator.enqueue("a");
        aggregator.enqueue("b");
        aggregator.enqueue("c");

        assert_ok!(aggregator.shutdown().await);
        assert_ok!(aggregator.shutdown().await);
        assert!(aggregator.is_shut_down());

        assert_eq!(batches.recv().await.unwrap(), vec!["a", "b", "c"]);
        assert!(batches.recv().await.is_none());
        assert_eq!(released.load(Ordering::SeqCst), 1);

        aggregator.enqueue("late");
        assert_eq!(aggregator.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_lose_nothing() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 2_000;

        let (sink, mut batches) = channel_sink();
        let aggregator = Arc::new(BatchAggregator::new(
            AggregatorOptions::default()
                .with_batch_size(37)
                .with_flush_interval(Duration::from_millis(1)),
            sink,
        ));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let aggregator = aggregator.clone();
                std::thread::spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        aggregator.enqueue((p, seq));
                        if seq % 101 == 0 {
                            aggregator.flush();
                        }
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        assert_ok!(aggregator.shutdown().await);

        let mut seen = HashSet::new();
        let mut last = vec![None; PRODUCERS];
        while let Some(batch) = batches.recv().await {
            assert!(batch.len() <= 37);
            for (p, seq) in batch {
                assert!(seen.insert((p, seq)), "duplicate item ({p}, {seq})");
                if let Some(prev) = last[p] {
                    assert!(seq > prev, "producer {p} out of order");
                }
                last[p] = Some(seq);
            }
        }
        assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
    }

    struct FailingSink {
        fail_first: AtomicBool,
        sender: mpsc::UnboundedSender<Vec<u32>>,
    }

    #[async_trait]
    impl BatchSink<u32> for FailingSink {
        async fn write(&self, batch: Vec<u32>) -> SinkResult<()> {
            if self.fail_first.swap(false, Ordering::SeqCst) {
                return Err(SinkError::rejected("full"));
            }
            let _ = self.sender.send(batch);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sink_failure_drops_batch() {
        let (sender, mut batches) = mpsc::unbounded_channel();
        let sink = FailingSink {
            fail_first: AtomicBool::new(true),
            sender,
        };
        let aggregator = BatchAggregator::new(options(2, 60), sink);

        aggregator.enqueue(1);
        aggregator.enqueue(2);
        aggregator.enqueue(3);
        assert_ok!(aggregator.shutdown().await);

        assert_eq!(batches.recv().await.unwrap(), vec![3]);
        assert!(batches.recv().await.is_none());
    }

    struct CollectText {
        sender: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl TextSink for CollectText {
        async fn write(&self, text: String) -> SinkResult<()> {
            let _ = self.sender.send(text);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_text_batch_sink_format() {
        let (sender, mut texts) = mpsc::unbounded_channel();
        let aggregator =
            BatchAggregator::new(options(30, 60), TextBatchSink::new(CollectText { sender }));

        aggregator.enqueue("first line".to_string());
        aggregator.enqueue("second line".to_string());
        assert_ok!(aggregator.shutdown().await);

        assert_eq!(texts.recv().await.unwrap(), "\nfirst line\nsecond line\n");
    }

    #[test]
    fn test_format_text_batch() {
        assert_eq!(format_text_batch(&[]), "\n");
        assert_eq!(format_text_batch(&["x".into()]), "\nx\n");
    }

    #[test]
    fn test_duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_millis(Duration::MAX), u64::MAX);
    }
}
