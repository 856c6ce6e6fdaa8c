//! Stream gate: the per-session orchestrating state machine.
//!
//! The gate decides, frame by frame, whether captured audio is buffered,
//! sent live, or dropped, based on speech activity and the remote connection
//! lifecycle. Buffered audio is replayed at its original cadence when the
//! connection opens or a speech turn ends.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::buffer::TimeOrderedBuffer;
use crate::config::GateConfig;
use crate::frame::{AudioFrame, TimestampedFrame};
use crate::hooks::{DropReason, NoopHooks, StreamHooks};
use crate::policy::TimestampPolicy;
use crate::sender::PacedSender;
use crate::sink::AudioSink;
use crate::timestamp::EpochNanos;

/// How long `close` waits for an in-flight replay task.
const CLOSE_REPLAY_TIMEOUT: Duration = Duration::from_secs(5);

/// Event kinds routed through the gate, one handler each.
#[derive(Debug)]
pub enum GateEvent {
    /// A raw audio chunk from the capture pipeline.
    Audio(AudioFrame),
    /// The user started speaking. Emulated markers are synthetic and ignored.
    SpeechStart { emulated: bool },
    /// The user stopped speaking. Emulated markers are synthetic and ignored.
    SpeechStop { emulated: bool },
    /// The remote recognition connection opened.
    ConnectionOpen,
    /// The remote recognition connection closed.
    ConnectionClose,
    /// The remote connection reported an error.
    ConnectionError(String),
}

struct GateState {
    connected: bool,
    user_speaking: bool,
    stopping: bool,
    connection_established_at: Option<EpochNanos>,
    last_pts: Option<EpochNanos>,
    buffer: TimeOrderedBuffer,
}

/// Per-session orchestrator between the capture pipeline and an
/// [`AudioSink`].
///
/// One gate and one sink handle exist per session, constructed explicitly.
/// All event handlers serialize on an internal lock, so connection callbacks
/// arriving from other execution contexts may call them directly. Replay
/// tasks run in the background, one at a time, and are cancelled on
/// `reset`/`close`.
pub struct StreamGate {
    sink: Arc<dyn AudioSink>,
    sender: Arc<PacedSender>,
    hooks: Arc<dyn StreamHooks>,
    policy: TimestampPolicy,
    config: GateConfig,
    state: Mutex<GateState>,
    /// Single-flight replay: a later replay waits for the earlier one.
    replay_lock: Arc<Mutex<()>>,
    /// Most recent replay task, retained for supervision.
    replay_task: Mutex<Option<JoinHandle<()>>>,
    /// Cancels in-flight replays; re-armed on reset.
    cancel: std::sync::Mutex<CancellationToken>,
}

impl StreamGate {
    /// Creates a gate over the given sink with no-op hooks.
    pub fn new(sink: Arc<dyn AudioSink>, config: GateConfig) -> Self {
        Self::with_hooks(sink, config, Arc::new(NoopHooks))
    }

    /// Creates a gate with observability hooks.
    pub fn with_hooks(
        sink: Arc<dyn AudioSink>,
        config: GateConfig,
        hooks: Arc<dyn StreamHooks>,
    ) -> Self {
        let policy = TimestampPolicy::new(config.future_tolerance, config.stale_tolerance);
        let sender = Arc::new(PacedSender::new(
            sink.clone(),
            hooks.clone(),
            config.realtime_send_max_retries,
            config.ordered_send_max_retries,
        ));
        let buffer = TimeOrderedBuffer::new(
            config.max_buffer_window,
            config.max_frame_duration,
            policy,
            hooks.clone(),
        );
        Self {
            sink,
            sender,
            hooks,
            policy,
            config,
            state: Mutex::new(GateState {
                connected: false,
                user_speaking: false,
                stopping: false,
                connection_established_at: None,
                last_pts: None,
                buffer,
            }),
            replay_lock: Arc::new(Mutex::new(())),
            replay_task: Mutex::new(None),
            cancel: std::sync::Mutex::new(CancellationToken::new()),
        }
    }

    fn fresh_buffer(&self) -> TimeOrderedBuffer {
        TimeOrderedBuffer::new(
            self.config.max_buffer_window,
            self.config.max_frame_duration,
            self.policy,
            self.hooks.clone(),
        )
    }

    fn cancel_token(&self) -> CancellationToken {
        self.cancel.lock().unwrap().clone()
    }

    /// Routes one event to its handler.
    pub async fn process_event(&self, event: GateEvent) {
        match event {
            GateEvent::Audio(frame) => self.on_frame(frame).await,
            GateEvent::SpeechStart { emulated } => self.on_speech_start(emulated).await,
            GateEvent::SpeechStop { emulated } => self.on_speech_stop(emulated).await,
            GateEvent::ConnectionOpen => self.on_connection_open().await,
            GateEvent::ConnectionClose => self.on_connection_close().await,
            GateEvent::ConnectionError(info) => self.on_connection_error(&info),
        }
    }

    /// Handles one captured audio frame.
    ///
    /// Dropped while the session is stopping, buffered while the user is not
    /// speaking (pre-roll) or the connection is not yet open, sent live
    /// otherwise.
    pub async fn on_frame(&self, frame: AudioFrame) {
        let mut state = self.state.lock().await;

        if state.stopping {
            self.hooks.on_frame_dropped(DropReason::Stopping);
            return;
        }

        let ts_frame = match TimestampedFrame::from_raw(
            frame,
            state.last_pts,
            &self.policy,
            self.hooks.as_ref(),
        ) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "dropping invalid audio frame");
                self.hooks.on_frame_dropped(DropReason::Invalid);
                return;
            }
        };
        state.last_pts = Some(ts_frame.pts());

        if !state.user_speaking {
            state.buffer.add(ts_frame);
            return;
        }

        if !state.connected {
            debug!(
                bytes = ts_frame.audio().len(),
                pts = ts_frame.pts().as_nanos(),
                "connection pending, buffering frame"
            );
            state.buffer.add(ts_frame);
        } else {
            debug!(
                bytes = ts_frame.audio().len(),
                pts = ts_frame.pts().as_nanos(),
                "sending live frame"
            );
            self.sender.send_realtime(ts_frame).await;
        }
    }

    /// Marks the user as speaking and starts the sink transport if it is not
    /// already running.
    pub async fn on_speech_start(&self, emulated: bool) {
        if emulated {
            return;
        }
        let mut state = self.state.lock().await;
        state.user_speaking = true;
        if !self.sink.is_running() {
            if let Err(e) = self.sink.start().await {
                error!(error = %e, "failed to start recognition transport");
            }
        }
    }

    /// Marks the end of a speech turn.
    ///
    /// Gates out further frames, drains the buffer through the paced sender
    /// in the background, and stops the transport once the drain completes.
    pub async fn on_speech_stop(&self, emulated: bool) {
        if emulated {
            return;
        }

        let frames = {
            let mut state = self.state.lock().await;
            state.user_speaking = false;
            state.stopping = true;
            state.buffer.drain_all()
        };

        let sender = self.sender.clone();
        let sink = self.sink.clone();
        let replay_lock = self.replay_lock.clone();
        let cancel = self.cancel_token();
        let total = frames.len();

        self.spawn_replay(async move {
            let _flight = replay_lock.lock().await;
            if total > 0 {
                info!(frames = total, "draining buffer before stopping");
                sender.send_ordered(frames, &cancel).await;
            }
            if cancel.is_cancelled() {
                return;
            }
            if sink.is_running() {
                if let Err(e) = sink.stop().await {
                    error!(error = %e, "failed to stop recognition transport");
                }
            }
        })
        .await;
    }

    /// Handles the connection-open callback: marks the session connected and
    /// replays any buffered audio without blocking the ingest path.
    pub async fn on_connection_open(&self) {
        let frames = {
            let mut state = self.state.lock().await;
            state.connected = true;
            state.connection_established_at = Some(EpochNanos::now());
            state.buffer.drain_all()
        };
        info!("recognition connected");

        if frames.is_empty() {
            return;
        }

        let sender = self.sender.clone();
        let replay_lock = self.replay_lock.clone();
        let cancel = self.cancel_token();
        let total = frames.len();

        self.spawn_replay(async move {
            let _flight = replay_lock.lock().await;
            info!(frames = total, "replaying buffered audio");
            sender.send_ordered(frames, &cancel).await;
        })
        .await;
    }

    /// Handles the connection-close callback with a full reset. This is the
    /// only path that clears the timestamp watermarks, so no ordering
    /// ambiguity carries across reconnects.
    pub async fn on_connection_close(&self) {
        info!("recognition connection closed");
        self.reset().await;
    }

    /// Reports a connection error. Non-fatal: the transport layer is expected
    /// to follow up with a close, which performs the reset.
    pub fn on_connection_error(&self, info: &str) {
        error!(info, "recognition connection error");
    }

    /// Resets the gate to its initial state: cancels any in-flight replay,
    /// clears the watermarks and flags, and replaces the buffer. The gate is
    /// reusable across speech turns after a reset.
    pub async fn reset(&self) {
        {
            let mut cancel = self.cancel.lock().unwrap();
            cancel.cancel();
            *cancel = CancellationToken::new();
        }

        let mut state = self.state.lock().await;
        state.connected = false;
        state.user_speaking = false;
        state.stopping = false;
        state.connection_established_at = None;
        state.last_pts = None;
        state.buffer = self.fresh_buffer();
    }

    /// Tears the session down: cancels any in-flight replay and waits for it
    /// with a bounded timeout so shutdown never hangs. Partially sent replays
    /// are discarded, not errored.
    pub async fn close(&self) {
        self.cancel.lock().unwrap().cancel();

        let handle = self.replay_task.lock().await.take();
        if let Some(handle) = handle {
            match tokio::time::timeout(CLOSE_REPLAY_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "replay task failed"),
                Err(_) => warn!("timed out waiting for replay task"),
            }
        }
    }

    /// Spawns a supervised replay task, reaping the previous one.
    async fn spawn_replay<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        let mut slot = self.replay_task.lock().await;
        if let Some(prev) = slot.replace(handle) {
            if prev.is_finished() {
                if let Err(e) = prev.await {
                    error!(error = %e, "replay task failed");
                }
            }
            // A still-running task queues the new one behind it on the
            // replay lock; it keeps running detached.
        }
    }

    /// Returns true if the remote connection is open.
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.connected
    }

    /// Returns true if the user is currently speaking.
    pub async fn is_user_speaking(&self) -> bool {
        self.state.lock().await.user_speaking
    }

    /// Returns true if the session is winding down after a speech stop.
    pub async fn is_stopping(&self) -> bool {
        self.state.lock().await.stopping
    }

    /// Returns when the connection was established, if it is open.
    pub async fn connection_established_at(&self) -> Option<EpochNanos> {
        self.state.lock().await.connection_established_at
    }

    /// Returns the number of buffered frames.
    pub async fn buffered_len(&self) -> usize {
        self.state.lock().await.buffer.len()
    }

    /// Returns the buffered audio span.
    pub async fn buffered_span(&self) -> Duration {
        self.state.lock().await.buffer.span()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct MockSink {
        running: AtomicBool,
        fail_next: AtomicU32,
        sent: std::sync::Mutex<Vec<Vec<u8>>>,
    }

    impl MockSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                running: AtomicBool::new(false),
                fail_next: AtomicU32::new(0),
                sent: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AudioSink for MockSink {
        async fn send_audio_frame(&self, audio: &[u8]) -> Result<()> {
            if self.fail_next.load(Ordering::SeqCst) > 0 {
                self.fail_next.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::sink_send("injected failure"));
            }
            self.sent.lock().unwrap().push(audio.to_vec());
            Ok(())
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }

        async fn start(&self) -> Result<()> {
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingHooks {
        repaired: AtomicU32,
        dropped: AtomicU32,
        send_failed: AtomicU32,
    }

    impl StreamHooks for CountingHooks {
        fn on_timestamp_repaired(
            &self,
            _reason: crate::hooks::RepairReason,
            _old: Option<EpochNanos>,
            _new: EpochNanos,
        ) {
            self.repaired.fetch_add(1, Ordering::SeqCst);
        }

        fn on_frame_dropped(&self, _reason: DropReason) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }

        fn on_send_failed(&self, _attempt: u32, _error: &Error) {
            self.send_failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn raw_frame(tag: u8) -> AudioFrame {
        AudioFrame::new(vec![tag; 640], Some(EpochNanos::now()), 16_000, 1, 320)
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met in time");
    }

    #[tokio::test]
    async fn test_emulated_markers_ignored() {
        let sink = MockSink::new();
        let gate = StreamGate::new(sink.clone(), GateConfig::default());

        gate.on_speech_start(true).await;
        assert!(!gate.is_user_speaking().await);
        assert!(!sink.is_running());

        gate.on_speech_stop(true).await;
        assert!(!gate.is_stopping().await);
    }

    #[tokio::test]
    async fn test_speech_start_starts_transport() {
        let sink = MockSink::new();
        let gate = StreamGate::new(sink.clone(), GateConfig::default());

        gate.on_speech_start(false).await;
        assert!(gate.is_user_speaking().await);
        assert!(sink.is_running());
    }

    #[tokio::test]
    async fn test_preroll_frames_are_buffered() {
        let sink = MockSink::new();
        let gate = StreamGate::new(sink.clone(), GateConfig::default());

        // Not speaking yet: audio accumulates for pre-roll.
        gate.on_frame(raw_frame(1)).await;
        gate.on_frame(raw_frame(2)).await;

        assert_eq!(gate.buffered_len().await, 2);
        assert_eq!(sink.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_buffered_then_replayed_on_open() {
        let sink = MockSink::new();
        let gate = StreamGate::new(sink.clone(), GateConfig::default());

        gate.on_speech_start(false).await;
        for i in 0..3 {
            gate.on_frame(raw_frame(i)).await;
        }
        assert_eq!(gate.buffered_len().await, 3);
        assert_eq!(sink.sent_count(), 0);

        gate.on_connection_open().await;
        assert!(gate.is_connected().await);
        assert!(gate.connection_established_at().await.is_some());
        assert_eq!(gate.buffered_len().await, 0);

        wait_until(|| sink.sent_count() == 3).await;
        gate.close().await;
    }

    #[tokio::test]
    async fn test_live_path_sends_immediately() {
        let sink = MockSink::new();
        let gate = StreamGate::new(sink.clone(), GateConfig::default());

        gate.on_speech_start(false).await;
        gate.on_connection_open().await;
        gate.on_frame(raw_frame(7)).await;

        assert_eq!(sink.sent_count(), 1);
        assert_eq!(gate.buffered_len().await, 0);
    }

    #[tokio::test]
    async fn test_speech_stop_drains_then_stops_transport() {
        let sink = MockSink::new();
        let gate = StreamGate::new(sink.clone(), GateConfig::default());

        gate.on_speech_start(false).await;
        for i in 0..3 {
            gate.on_frame(raw_frame(i)).await;
        }

        gate.on_speech_stop(false).await;
        assert!(gate.is_stopping().await);
        assert!(!gate.is_user_speaking().await);

        wait_until(|| sink.sent_count() == 3 && !sink.is_running()).await;
        gate.close().await;
    }

    #[tokio::test]
    async fn test_frames_dropped_while_stopping() {
        let sink = MockSink::new();
        let hooks = Arc::new(CountingHooks::default());
        let gate = StreamGate::with_hooks(sink.clone(), GateConfig::default(), hooks.clone());

        gate.on_speech_start(false).await;
        gate.on_speech_stop(false).await;
        wait_until(|| !sink.is_running()).await;

        gate.on_frame(raw_frame(1)).await;
        gate.on_frame(raw_frame(2)).await;

        assert_eq!(gate.buffered_len().await, 0);
        assert_eq!(hooks.dropped.load(Ordering::SeqCst), 2);
        gate.close().await;
    }

    #[tokio::test]
    async fn test_connection_close_resets_state() {
        let sink = MockSink::new();
        let gate = StreamGate::new(sink.clone(), GateConfig::default());

        gate.on_speech_start(false).await;
        gate.on_frame(raw_frame(1)).await;
        gate.on_connection_open().await;
        wait_until(|| sink.sent_count() == 1).await;

        gate.on_connection_close().await;
        assert!(!gate.is_connected().await);
        assert!(!gate.is_stopping().await);
        assert!(gate.connection_established_at().await.is_none());
        assert_eq!(gate.buffered_len().await, 0);

        // Reusable after the reset: a new turn buffers again.
        gate.on_frame(raw_frame(2)).await;
        assert_eq!(gate.buffered_len().await, 1);
        gate.close().await;
    }

    #[tokio::test]
    async fn test_invalid_frame_dropped() {
        let sink = MockSink::new();
        let hooks = Arc::new(CountingHooks::default());
        let gate = StreamGate::with_hooks(sink.clone(), GateConfig::default(), hooks.clone());

        gate.on_frame(AudioFrame::new(vec![0u8; 640], None, 0, 1, 320)).await;

        assert_eq!(gate.buffered_len().await, 0);
        assert_eq!(hooks.dropped.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_timestamp_repaired() {
        let sink = MockSink::new();
        let hooks = Arc::new(CountingHooks::default());
        let gate = StreamGate::with_hooks(sink.clone(), GateConfig::default(), hooks.clone());

        gate.on_frame(AudioFrame::new(vec![0u8; 640], None, 16_000, 1, 320)).await;

        assert_eq!(gate.buffered_len().await, 1);
        assert_eq!(hooks.repaired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_event_dispatch() {
        let sink = MockSink::new();
        let gate = StreamGate::new(sink.clone(), GateConfig::default());

        gate.process_event(GateEvent::SpeechStart { emulated: false }).await;
        gate.process_event(GateEvent::Audio(raw_frame(1))).await;
        gate.process_event(GateEvent::ConnectionOpen).await;
        wait_until(|| sink.sent_count() == 1).await;

        gate.process_event(GateEvent::ConnectionError("boom".into())).await;
        assert!(gate.is_connected().await);

        gate.process_event(GateEvent::ConnectionClose).await;
        assert!(!gate.is_connected().await);
        gate.close().await;
    }

    #[tokio::test]
    async fn test_live_send_failure_reported_not_fatal() {
        let sink = MockSink::new();
        let hooks = Arc::new(CountingHooks::default());
        let gate = StreamGate::with_hooks(sink.clone(), GateConfig::default(), hooks.clone());

        gate.on_speech_start(false).await;
        gate.on_connection_open().await;

        sink.fail_next.store(2, Ordering::SeqCst);
        gate.on_frame(raw_frame(1)).await;

        assert_eq!(sink.sent_count(), 0);
        assert_eq!(hooks.send_failed.load(Ordering::SeqCst), 2);

        // The next frame goes through; the session survived.
        gate.on_frame(raw_frame(2)).await;
        assert_eq!(sink.sent_count(), 1);
    }
}
