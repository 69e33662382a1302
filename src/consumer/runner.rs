//! The consumer loop
//!
//! Every consumer kind runs the same loop; only the [`LoopProfile`] and the
//! sink differ:
//!
//! ```text
//!   ┌─► cancelled? ──yes──► exit
//!   │      │ no
//!   │   pull (retry with backoff) ──exhausted──► exit (failure)
//!   │      │
//!   │   encode for kind (blocking pool)
//!   │      │
//!   │   push to sink ──error──► exit (failure)
//!   │      │
//!   └── pace (sleep or wait for sink), racing cancellation
//! ```
//!
//! A push is raced against cancellation only when the sink says dropping
//! it midway is safe; a display blit always completes, so `stop()` joining
//! the task also waits for the panel write.
//!
//! Failures end this loop only. The exit is always reported back to the
//! coordinator, including when the task panics or is aborted.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::codec::{self, CodecParams, Encoded};
use crate::error::{CodecError, PullError, SinkError};
use crate::frame::{Frame, FrameSource, SourceHandle};

use super::handle::{ConsumerHandle, ConsumerKind};
use super::profile::{LoopProfile, Pacing};
use super::sink::FrameSink;

/// Why a loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Cancelled by `stop()` or `detach_consumer()`
    Cancelled,
    /// Pull retries exhausted
    PullFailed(PullError),
    /// Sink rejected a frame
    SinkFailed(SinkError),
    /// Frames kept failing to encode
    CodecFailed(CodecError),
    /// Task panicked or was aborted
    Aborted,
}

impl ExitReason {
    /// Whether the loop ended on its own because of an error
    pub fn is_failure(&self) -> bool {
        !matches!(self, ExitReason::Cancelled)
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Cancelled => write!(f, "cancelled"),
            ExitReason::PullFailed(e) => write!(f, "pull failed: {}", e),
            ExitReason::SinkFailed(e) => write!(f, "sink failed: {}", e),
            ExitReason::CodecFailed(e) => write!(f, "encode failed: {}", e),
            ExitReason::Aborted => write!(f, "aborted"),
        }
    }
}

/// Exit notification sent to the coordinator
#[derive(Debug, Clone)]
pub struct LoopExit {
    pub consumer_id: u64,
    pub reason: ExitReason,
}

/// Everything a loop needs besides its sink
pub(crate) struct LoopContext {
    pub handle: ConsumerHandle,
    pub source: Arc<dyn FrameSource>,
    pub source_handle: SourceHandle,
    pub codec: CodecParams,
    pub profile: LoopProfile,
    pub exit_tx: mpsc::UnboundedSender<LoopExit>,
}

/// Marks the handle exited and notifies the coordinator on drop, so a
/// panicking or aborted loop is still accounted for.
struct ExitGuard {
    handle: ConsumerHandle,
    exit_tx: mpsc::UnboundedSender<LoopExit>,
    reason: ExitReason,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.handle.mark_exited();
        let _ = self.exit_tx.send(LoopExit {
            consumer_id: self.handle.id(),
            reason: self.reason.clone(),
        });
    }
}

/// Run one consumer loop to completion
pub(crate) async fn run_consumer_loop(ctx: LoopContext, mut sink: Box<dyn FrameSink>) -> ExitReason {
    let mut guard = ExitGuard {
        handle: ctx.handle.clone(),
        exit_tx: ctx.exit_tx.clone(),
        reason: ExitReason::Aborted,
    };

    tracing::debug!(
        consumer = ctx.handle.id(),
        kind = %ctx.handle.kind(),
        "Consumer loop started"
    );

    let reason = drive(&ctx, sink.as_mut()).await;

    if reason.is_failure() {
        tracing::warn!(
            consumer = ctx.handle.id(),
            kind = %ctx.handle.kind(),
            failures = ctx.handle.consecutive_failures(),
            delivered = ctx.handle.frames_delivered(),
            reason = %reason,
            "Consumer loop terminated"
        );
    } else {
        tracing::debug!(
            consumer = ctx.handle.id(),
            kind = %ctx.handle.kind(),
            delivered = ctx.handle.frames_delivered(),
            "Consumer loop cancelled"
        );
    }

    guard.reason = reason.clone();
    reason
}

async fn drive(ctx: &LoopContext, sink: &mut dyn FrameSink) -> ExitReason {
    let cancel = ctx.handle.cancellation();
    let kind = ctx.handle.kind();
    let mut last_sequence: Option<u64> = None;

    loop {
        if cancel.is_cancelled() {
            return ExitReason::Cancelled;
        }

        let frame = match pull_with_retry(ctx, cancel).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return ExitReason::Cancelled,
            Err(e) => return ExitReason::PullFailed(e),
        };

        // Stopped while the pull was in flight: drop the frame unpushed
        if cancel.is_cancelled() {
            return ExitReason::Cancelled;
        }

        let fresh = last_sequence.map_or(true, |last| frame.sequence > last);
        if fresh {
            let sequence = frame.sequence;
            match encode_off_runtime(frame, kind, ctx.codec).await {
                Ok(encoded) => {
                    // Stopped while encoding: the frame is never pushed
                    if cancel.is_cancelled() {
                        return ExitReason::Cancelled;
                    }

                    let pushed = if sink.cancel_safe() {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return ExitReason::Cancelled,
                            result = sink.push(encoded) => result,
                        }
                    } else {
                        sink.push(encoded).await
                    };

                    if let Err(e) = pushed {
                        ctx.handle.record_failure();
                        return ExitReason::SinkFailed(e);
                    }

                    ctx.handle.record_delivery(sequence);
                    last_sequence = Some(sequence);
                }
                Err(e) => {
                    let failures = ctx.handle.record_failure();
                    tracing::debug!(
                        consumer = ctx.handle.id(),
                        sequence = sequence,
                        error = %e,
                        "Frame encode failed"
                    );
                    if failures > ctx.profile.pull_retries {
                        return ExitReason::CodecFailed(e);
                    }
                }
            }
        } else {
            tracing::trace!(
                consumer = ctx.handle.id(),
                sequence = frame.sequence,
                "Skipping stale frame"
            );
        }

        if cancel.is_cancelled() {
            return ExitReason::Cancelled;
        }

        match ctx.profile.pacing {
            Pacing::Fixed(interval) => {
                if !sleep_or_cancel(cancel, interval).await {
                    return ExitReason::Cancelled;
                }
            }
            Pacing::SinkReady { min_interval } => {
                if !sleep_or_cancel(cancel, min_interval).await {
                    return ExitReason::Cancelled;
                }
                let ready = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return ExitReason::Cancelled,
                    result = sink.ready() => result,
                };
                if let Err(e) = ready {
                    ctx.handle.record_failure();
                    return ExitReason::SinkFailed(e);
                }
            }
        }
    }
}

/// Encode on the blocking pool; resize and JPEG work never runs on a
/// runtime worker
async fn encode_off_runtime(
    frame: Frame,
    kind: ConsumerKind,
    params: CodecParams,
) -> Result<Encoded, CodecError> {
    tokio::task::spawn_blocking(move || codec::encode(&frame, kind, &params))
        .await
        .unwrap_or_else(|e| Err(CodecError::Task(e.to_string())))
}

/// Pull one frame, retrying transient errors with backoff
///
/// Returns `Ok(None)` if cancelled while backing off.
async fn pull_with_retry(
    ctx: &LoopContext,
    cancel: &CancellationToken,
) -> Result<Option<Frame>, PullError> {
    let mut attempt = 0u32;

    loop {
        match ctx.source.pull(&ctx.source_handle).await {
            Ok(frame) => return Ok(Some(frame)),
            Err(e) => {
                attempt += 1;
                ctx.handle.record_failure();

                if attempt > ctx.profile.pull_retries {
                    return Err(e);
                }

                tracing::debug!(
                    consumer = ctx.handle.id(),
                    attempt = attempt,
                    max_retries = ctx.profile.pull_retries,
                    error = %e,
                    "Frame pull failed, retrying"
                );

                if !sleep_or_cancel(cancel, ctx.profile.retry_backoff).await {
                    return Ok(None);
                }
            }
        }
    }
}

/// Sleep for `duration`; false if cancelled first
async fn sleep_or_cancel(cancel: &CancellationToken, duration: std::time::Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Instant;

    use bytes::Bytes;

    use super::*;
    use crate::consumer::ChannelSink;
    use crate::device::SyntheticSource;
    use crate::error::DeviceUnavailable;
    use crate::frame::PixelFormat;

    async fn context(
        source: Arc<dyn FrameSource>,
        kind: ConsumerKind,
        profile: LoopProfile,
    ) -> (LoopContext, mpsc::UnboundedReceiver<LoopExit>) {
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let source_handle = source.acquire().await.unwrap();
        let ctx = LoopContext {
            handle: ConsumerHandle::new(1, kind),
            source,
            source_handle,
            codec: CodecParams::default(),
            profile,
            exit_tx,
        };
        (ctx, exit_rx)
    }

    /// Hands out clones of one frame with scripted sequence numbers. Once
    /// the script runs out it either keeps counting up or repeats the last
    /// number forever.
    struct ScriptedSource {
        frame: Frame,
        script: std::sync::Mutex<std::collections::VecDeque<u64>>,
        counting: bool,
        last: AtomicU64,
        pulls: AtomicU64,
    }

    impl ScriptedSource {
        fn new(frame: Frame, script: &[u64], counting: bool) -> Self {
            Self {
                frame,
                script: std::sync::Mutex::new(script.iter().copied().collect()),
                counting,
                last: AtomicU64::new(0),
                pulls: AtomicU64::new(0),
            }
        }

        fn pull_count(&self) -> u64 {
            self.pulls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn acquire(&self) -> Result<SourceHandle, DeviceUnavailable> {
            Ok(SourceHandle::new(1))
        }

        async fn pull(&self, _handle: &SourceHandle) -> Result<Frame, PullError> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            let scripted = self.script.lock().unwrap().pop_front();
            let last = self.last.load(Ordering::SeqCst);
            let sequence = match scripted {
                Some(sequence) => sequence,
                None if self.counting => last + 1,
                None => last,
            };
            self.last.store(sequence, Ordering::SeqCst);

            Ok(Frame {
                sequence,
                ..self.frame.clone()
            })
        }

        async fn release(&self, _handle: SourceHandle) {}

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn rgb_frame(width: u32, height: u32) -> Frame {
        let len = width as usize * height as usize * 3;
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        Frame::new(0, width, height, PixelFormat::Rgb8, Bytes::from(data))
    }

    struct FailingSink;

    #[async_trait]
    impl FrameSink for FailingSink {
        async fn push(&mut self, _frame: Encoded) -> Result<(), SinkError> {
            Err(SinkError::Write("broken pipe".into()))
        }
    }

    #[tokio::test]
    async fn test_delivers_increasing_sequences_until_cancelled() {
        let source = Arc::new(SyntheticSource::new(32, 24));
        let profile = LoopProfile::stream().interval(Duration::from_millis(1));
        let (ctx, mut exits) = context(source, ConsumerKind::Stream, profile).await;
        let handle = ctx.handle.clone();
        let (sink, mut rx) = ChannelSink::channel(4);

        let task = tokio::spawn(run_consumer_loop(ctx, Box::new(sink)));

        let mut last = 0;
        for _ in 0..5 {
            match rx.recv().await {
                Some(Encoded::MjpegPart(part)) => assert!(part.starts_with(b"--frame")),
                other => panic!("unexpected {:?}", other),
            }
            let seq = handle.last_sequence();
            assert!(seq >= last);
            last = seq;
        }

        handle.cancel();
        drop(rx);
        let reason = task.await.unwrap();
        assert_eq!(reason, ExitReason::Cancelled);
        assert!(!handle.is_active());

        let exit = exits.recv().await.unwrap();
        assert_eq!(exit.consumer_id, 1);
        assert_eq!(exit.reason, ExitReason::Cancelled);
    }

    #[tokio::test]
    async fn test_sink_failure_ends_loop() {
        let source = Arc::new(SyntheticSource::new(16, 16));
        let (ctx, mut exits) = context(source, ConsumerKind::Stream, LoopProfile::stream()).await;
        let handle = ctx.handle.clone();

        let reason = run_consumer_loop(ctx, Box::new(FailingSink)).await;

        assert!(matches!(reason, ExitReason::SinkFailed(SinkError::Write(_))));
        assert_eq!(handle.consecutive_failures(), 1);
        assert!(!handle.is_active());
        assert!(exits.recv().await.unwrap().reason.is_failure());
    }

    #[tokio::test]
    async fn test_transient_pull_errors_are_retried() {
        let source = Arc::new(SyntheticSource::new(16, 16));
        source.fail_next_pulls(2);
        let profile = LoopProfile::stream()
            .interval(Duration::from_millis(1))
            .retries(3, Duration::from_millis(1));
        let (ctx, _exits) = context(source.clone(), ConsumerKind::Stream, profile).await;
        let handle = ctx.handle.clone();
        let (sink, mut rx) = ChannelSink::channel(1);

        let task = tokio::spawn(run_consumer_loop(ctx, Box::new(sink)));

        assert!(rx.recv().await.is_some());
        assert_eq!(handle.frames_delivered(), 1);
        assert_eq!(handle.consecutive_failures(), 0);

        handle.cancel();
        assert_eq!(task.await.unwrap(), ExitReason::Cancelled);
    }

    #[tokio::test]
    async fn test_pull_retries_exhausted() {
        let source = Arc::new(SyntheticSource::new(16, 16));
        source.fail_next_pulls(10);
        let profile = LoopProfile::stream().retries(2, Duration::from_millis(1));
        let (ctx, _exits) = context(source.clone(), ConsumerKind::Stream, profile).await;
        let handle = ctx.handle.clone();
        let (sink, _rx) = ChannelSink::channel(1);

        let reason = run_consumer_loop(ctx, Box::new(sink)).await;

        assert!(matches!(reason, ExitReason::PullFailed(PullError::Busy)));
        assert_eq!(handle.consecutive_failures(), 3);
        assert_eq!(source.pull_count(), 3);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff_exits_promptly() {
        let source = Arc::new(SyntheticSource::new(16, 16));
        source.fail_next_pulls(100);
        let profile = LoopProfile::stream().retries(50, Duration::from_secs(60));
        let (ctx, _exits) = context(source, ConsumerKind::Stream, profile).await;
        let handle = ctx.handle.clone();
        let (sink, _rx) = ChannelSink::channel(1);

        let task = tokio::spawn(run_consumer_loop(ctx, Box::new(sink)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let reason = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("loop must observe cancellation during backoff")
            .unwrap();
        assert_eq!(reason, ExitReason::Cancelled);
    }

    #[tokio::test]
    async fn test_event_loop_waits_for_reader() {
        let source = Arc::new(SyntheticSource::new(16, 16));
        let profile = LoopProfile::event().sink_ready(Duration::from_millis(1));
        let (ctx, _exits) = context(source.clone(), ConsumerKind::Event, profile).await;
        let handle = ctx.handle.clone();
        let (sink, mut rx) = ChannelSink::channel(1);

        let task = tokio::spawn(run_consumer_loop(ctx, Box::new(sink)));

        // Nobody reads: the loop parks on readiness after the first push
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.frames_delivered(), 1);

        match rx.recv().await {
            Some(Encoded::Event(event)) => assert!(event.image.starts_with("data:image/jpeg")),
            other => panic!("unexpected {:?}", other),
        }

        handle.cancel();
        assert_eq!(task.await.unwrap(), ExitReason::Cancelled);
    }

    #[tokio::test]
    async fn test_stale_frames_are_not_pushed() {
        // 2 and 1 repeat or go backwards; after 3 the source repeats 3
        let source = Arc::new(ScriptedSource::new(rgb_frame(16, 16), &[1, 2, 2, 1, 3], false));
        let profile = LoopProfile::event().sink_ready(Duration::from_millis(1));
        let (ctx, _exits) = context(source.clone(), ConsumerKind::Event, profile).await;
        let handle = ctx.handle.clone();
        let (sink, mut rx) = ChannelSink::channel(8);

        let task = tokio::spawn(run_consumer_loop(ctx, Box::new(sink)));

        let mut delivered = Vec::new();
        let mut last_seen = 0;
        for _ in 0..3 {
            match tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap() {
                Some(Encoded::Event(event)) => delivered.push(event.sequence),
                other => panic!("unexpected {:?}", other),
            }
            let last = handle.last_sequence();
            assert!(last >= last_seen);
            last_seen = last;
        }
        assert_eq!(delivered, [1, 2, 3]);

        // Let the loop pull the repeated 3 a few more times
        tokio::time::timeout(Duration::from_secs(2), async {
            while source.pull_count() < 10 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(handle.last_sequence(), 3);
        assert_eq!(handle.frames_delivered(), 3);

        handle.cancel();
        assert_eq!(task.await.unwrap(), ExitReason::Cancelled);
    }

    #[tokio::test]
    async fn test_encoding_leaves_the_runtime_responsive() {
        // Single-threaded runtime: an encode running on it would hold up
        // the timer below for the whole resize and JPEG pass
        let source = Arc::new(ScriptedSource::new(rgb_frame(1920, 1080), &[], true));
        let profile = LoopProfile::stream().interval(Duration::from_millis(1));
        let (ctx, _exits) = context(source, ConsumerKind::Stream, profile).await;
        let handle = ctx.handle.clone();
        let (sink, _rx) = ChannelSink::channel(16);

        let task = tokio::spawn(run_consumer_loop(ctx, Box::new(sink)));

        let deadline = Instant::now() + Duration::from_secs(30);
        let mut worst = Duration::ZERO;
        while handle.frames_delivered() < 1 && Instant::now() < deadline {
            let before = Instant::now();
            tokio::time::sleep(Duration::from_millis(2)).await;
            worst = worst.max(before.elapsed());
        }

        assert!(handle.frames_delivered() >= 1);
        assert!(worst < Duration::from_millis(250), "runtime stalled for {worst:?}");

        handle.cancel();
        assert_eq!(task.await.unwrap(), ExitReason::Cancelled);
    }
}
