//! Recording session state machine
//!
//! Governs one capture cycle: `Idle -> Active -> {Completed, Rejected}`,
//! with `Stopping` as the transitional state while the sink is flushed.
//! Every trigger that can end a session (operator stop, standard timer,
//! safety ceiling, capture failure, interrupt) funnels into the same
//! guarded transition, so a second trigger is always a no-op.
//!
//! Timers carry the generation token of the session that armed them and
//! check it before acting; a stale timer can never stop a session it
//! did not belong to.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::audio::wav::{self, WavSink};
use crate::audio::{rms_level, CaptureEvent};
use crate::config::{AudioConfig, RecordingConfig};
use crate::error::{Result, SessionError, ValidationError};

/// Lifecycle state of the current (or last) capture cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Stopping,
    Completed,
    Rejected,
}

/// What ended a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Manual,
    StandardTimer,
    SafetyCeiling,
    CaptureError,
    Interrupt,
}

/// Handle to a finished, validated capture artifact
///
/// Returned directly from the capture step to the delivery step; there
/// is no filesystem search for "the newest recording".
#[derive(Debug)]
pub struct CompletedCapture {
    pub session_id: Uuid,
    pub artifact: PathBuf,
    pub duration: Duration,
    pub size_bytes: u64,
}

/// Terminal result of one capture cycle, emitted on the session channel
#[derive(Debug)]
pub enum SessionEvent {
    Completed(CompletedCapture),
    Rejected { session_id: Uuid, duration: Duration },
}

/// Callback that halts the chunk producer when the session stops
pub type StopCapture = Box<dyn Fn() + Send + Sync>;

struct ActiveCapture {
    sink: WavSink,
    started_at: Instant,
    bytes: u64,
    chunks: u64,
    stop_capture: Option<StopCapture>,
}

struct Inner {
    state: SessionState,
    generation: u64,
    level: f32,
    session_id: Uuid,
    active: Option<ActiveCapture>,
}

/// Recording session context
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct RecordingSession {
    inner: Arc<Mutex<Inner>>,
    recording: RecordingConfig,
    audio: AudioConfig,
    temp_dir: PathBuf,
    events: mpsc::Sender<SessionEvent>,
}

impl RecordingSession {
    pub fn new(
        recording: RecordingConfig,
        audio: AudioConfig,
        temp_dir: PathBuf,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Idle,
                generation: 0,
                level: 0.0,
                session_id: Uuid::nil(),
                active: None,
            })),
            recording,
            audio,
            temp_dir,
            events,
        }
    }

    /// Begin a capture cycle
    ///
    /// Fails with [`SessionError::AlreadyActive`] (no side effects) if a
    /// cycle is already running. Otherwise opens the WAV sink, arms the
    /// standard stop timer and the safety-ceiling timer, and starts
    /// pumping `chunks` into the sink and the level meter.
    pub fn start(&self, chunks: mpsc::Receiver<CaptureEvent>, stop_capture: StopCapture) -> Result<Uuid> {
        let generation;
        let session_id = Uuid::new_v4();
        {
            let mut inner = self.inner.lock();
            if matches!(inner.state, SessionState::Active | SessionState::Stopping) {
                return Err(SessionError::AlreadyActive.into());
            }

            let path = wav::artifact_path(&self.temp_dir, Utc::now());
            let sink = WavSink::create(&path, &self.audio)?;

            // Bumping the generation invalidates every timer armed by a
            // previous session.
            inner.generation += 1;
            generation = inner.generation;
            inner.state = SessionState::Active;
            inner.level = 0.0;
            inner.session_id = session_id;
            inner.active = Some(ActiveCapture {
                sink,
                started_at: Instant::now(),
                bytes: 0,
                chunks: 0,
                stop_capture: Some(stop_capture),
            });
        }

        tracing::info!(%session_id, "Recording session started");

        let this = self.clone();
        tokio::spawn(async move { this.pump(chunks, generation).await });

        let this = self.clone();
        let standard = self.recording.standard_duration();
        tokio::spawn(async move {
            tokio::time::sleep(standard).await;
            this.stop_guarded(StopReason::StandardTimer, Some(generation)).await;
        });

        // Backstop in case the standard stop never lands
        let this = self.clone();
        let ceiling = self.recording.max_duration();
        tokio::spawn(async move {
            tokio::time::sleep(ceiling).await;
            this.stop_guarded(StopReason::SafetyCeiling, Some(generation)).await;
        });

        Ok(session_id)
    }

    /// Stop the current cycle; idempotent no-op unless Active
    pub async fn stop(&self, reason: StopReason) -> SessionState {
        self.stop_guarded(reason, None).await
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Last metered level in `[0, 1]`; never blocks on the producer
    pub fn level(&self) -> f32 {
        self.inner.lock().level
    }

    /// Id of the current or most recent session
    pub fn session_id(&self) -> Uuid {
        self.inner.lock().session_id
    }

    async fn pump(&self, mut chunks: mpsc::Receiver<CaptureEvent>, generation: u64) {
        while let Some(event) = chunks.recv().await {
            let failure = match event {
                CaptureEvent::Chunk(pcm) => self.accept_chunk(&pcm, generation),
                CaptureEvent::Error(e) => {
                    tracing::warn!("Capture source failed: {}", e);
                    Some(StopReason::CaptureError)
                }
            };

            if let Some(reason) = failure {
                self.stop_guarded(reason, Some(generation)).await;
            }
        }
    }

    /// Append one chunk; returns a stop reason if the sink failed
    fn accept_chunk(&self, pcm: &[u8], generation: u64) -> Option<StopReason> {
        let level = rms_level(pcm);
        let mut inner = self.inner.lock();

        // Chunks delivered after Stopping begins (or for a previous
        // generation) are discarded.
        if inner.generation != generation || inner.state != SessionState::Active {
            return None;
        }

        let active = inner.active.as_mut()?;
        if let Err(e) = active.sink.write_chunk(pcm) {
            tracing::warn!("Sink write failed: {}", e);
            return Some(StopReason::CaptureError);
        }
        active.bytes += pcm.len() as u64;
        active.chunks += 1;
        inner.level = level;
        None
    }

    async fn stop_guarded(&self, reason: StopReason, expected_generation: Option<u64>) -> SessionState {
        let (generation, mut active, session_id) = {
            let mut inner = self.inner.lock();
            if let Some(expected) = expected_generation {
                if inner.generation != expected {
                    return inner.state;
                }
            }
            if inner.state != SessionState::Active {
                return inner.state;
            }
            inner.state = SessionState::Stopping;
            match inner.active.take() {
                Some(active) => (inner.generation, active, inner.session_id),
                None => {
                    inner.state = SessionState::Idle;
                    return SessionState::Idle;
                }
            }
        };

        tracing::info!(%session_id, ?reason, "Stopping recording session");

        if let Some(stop) = active.stop_capture.take() {
            stop();
        }

        let elapsed = active.started_at.elapsed();
        let chunk_count = active.chunks;
        let finalized = active.sink.finalize();

        if elapsed < self.recording.min_duration() {
            let rejection = ValidationError::TooShort {
                actual_ms: elapsed.as_millis() as u64,
                min_ms: self.recording.min_duration_ms,
            };
            tracing::warn!(%session_id, "{}", rejection);
            if let Ok(path) = &finalized {
                if let Err(e) = std::fs::remove_file(path) {
                    tracing::debug!("Could not remove rejected artifact: {}", e);
                }
            }
            self.enter_terminal(generation, SessionState::Rejected);
            let _ = self
                .events
                .send(SessionEvent::Rejected {
                    session_id,
                    duration: elapsed,
                })
                .await;
            return SessionState::Rejected;
        }

        match finalized {
            Ok(artifact) => {
                // Settle delay: let the sink's bytes reach disk before
                // the delivery step reads the artifact back.
                tokio::time::sleep(self.recording.settle_delay()).await;

                let size_bytes = std::fs::metadata(&artifact).map(|m| m.len()).unwrap_or(0);
                tracing::info!(
                    %session_id,
                    duration_ms = elapsed.as_millis() as u64,
                    size_bytes,
                    chunk_count,
                    "Recording completed"
                );
                self.enter_terminal(generation, SessionState::Completed);
                let _ = self
                    .events
                    .send(SessionEvent::Completed(CompletedCapture {
                        session_id,
                        artifact,
                        duration: elapsed,
                        size_bytes,
                    }))
                    .await;
                SessionState::Completed
            }
            Err(e) => {
                tracing::error!(%session_id, "Failed to finalize artifact: {}", e);
                self.enter_terminal(generation, SessionState::Rejected);
                let _ = self
                    .events
                    .send(SessionEvent::Rejected {
                        session_id,
                        duration: elapsed,
                    })
                    .await;
                SessionState::Rejected
            }
        }
    }

    fn enter_terminal(&self, generation: u64, state: SessionState) {
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            inner.state = state;
            inner.level = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn noop_stop() -> StopCapture {
        Box::new(|| {})
    }

    /// Chunk of `samples` constant-amplitude samples, `amplitude` in [0,1]
    fn chunk(amplitude: f32, samples: usize) -> CaptureEvent {
        let value = (amplitude * 32_767.0) as i16;
        let pcm: Vec<u8> = std::iter::repeat(value)
            .take(samples)
            .flat_map(|s| s.to_le_bytes())
            .collect();
        CaptureEvent::Chunk(pcm)
    }

    struct Fixture {
        session: RecordingSession,
        events: mpsc::Receiver<SessionEvent>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingConfig::default())
    }

    fn fixture_with(recording: RecordingConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel(16);
        let session = RecordingSession::new(
            recording,
            AudioConfig::default(),
            dir.path().to_path_buf(),
            tx,
        );
        Fixture {
            session,
            events: rx,
            _dir: dir,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_rejected_without_side_effects() {
        let f = fixture();
        let (_tx, rx) = mpsc::channel(8);
        let first = f.session.start(rx, noop_stop()).unwrap();

        let (_tx2, rx2) = mpsc::channel(8);
        let err = f.session.start(rx2, noop_stop()).unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::AlreadyActive)));

        // The original session is untouched
        assert_eq!(f.session.state(), SessionState::Active);
        assert_eq!(f.session.session_id(), first);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_when_idle_is_a_noop() {
        let f = fixture();
        assert_eq!(f.session.stop(StopReason::Manual).await, SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn short_recording_is_rejected_and_artifact_removed() {
        let mut f = fixture();
        let (tx, rx) = mpsc::channel(8);
        f.session.start(rx, noop_stop()).unwrap();

        tx.send(chunk(0.3, 1600)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let state = f.session.stop(StopReason::Manual).await;
        assert_eq!(state, SessionState::Rejected);

        match f.events.recv().await.unwrap() {
            SessionEvent::Rejected { duration, .. } => {
                assert_eq!(duration.as_millis(), 300);
            }
            other => panic!("expected Rejected, got {:?}", other),
        }

        // No leftover artifact in the temp dir
        let leftovers: Vec<_> = std::fs::read_dir(f._dir.path()).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn standard_timer_completes_session_at_exactly_the_window() {
        let mut f = fixture();
        let (tx, rx) = mpsc::channel(8);
        f.session.start(rx, noop_stop()).unwrap();

        for amplitude in [0.1, 0.4, 0.2] {
            tx.send(chunk(amplitude, 1600)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
            assert!((f.session.level() - amplitude).abs() < 0.01);
        }

        // Standard timer fires at 5000ms, then the settle delay runs
        let event = f.events.recv().await.unwrap();
        match event {
            SessionEvent::Completed(capture) => {
                assert_eq!(capture.duration.as_millis(), 5_000);
                assert!(capture.artifact.exists());
                assert!(capture.size_bytes > 44);
            }
            other => panic!("expected Completed, got {:?}", other),
        }
        assert_eq!(f.session.state(), SessionState::Completed);
        assert_eq!(f.session.level(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_stop_at_minimum_duration_completes() {
        let mut f = fixture();
        let (tx, rx) = mpsc::channel(8);
        f.session.start(rx, noop_stop()).unwrap();

        tx.send(chunk(0.5, 1600)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        // Exactly the minimum is not "too short"
        let state = f.session.stop(StopReason::Manual).await;
        assert_eq!(state, SessionState::Completed);
        assert!(matches!(
            f.events.recv().await.unwrap(),
            SessionEvent::Completed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_never_stops_a_newer_session() {
        let mut f = fixture();

        // Session A, stopped manually well before its timers fire
        let (_tx_a, rx_a) = mpsc::channel(8);
        f.session.start(rx_a, noop_stop()).unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(
            f.session.stop(StopReason::Manual).await,
            SessionState::Completed
        );
        let _ = f.events.recv().await.unwrap();

        // Session B starts; A's standard timer (t=5000) is now stale
        let (_tx_b, rx_b) = mpsc::channel(8);
        let b_id = f.session.start(rx_b, noop_stop()).unwrap();

        // Move past A's original standard-timer deadline
        tokio::time::sleep(Duration::from_millis(4_000)).await;
        assert_eq!(f.session.state(), SessionState::Active);
        assert_eq!(f.session.session_id(), b_id);

        // B's own timer completes it at its full window
        match f.events.recv().await.unwrap() {
            SessionEvent::Completed(capture) => {
                assert_eq!(capture.session_id, b_id);
                assert_eq!(capture.duration.as_millis(), 5_000);
            }
            other => panic!("expected Completed for B, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_after_stop_are_discarded() {
        let mut f = fixture();
        let (tx, rx) = mpsc::channel(8);
        f.session.start(rx, noop_stop()).unwrap();

        tx.send(chunk(0.5, 1600)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        f.session.stop(StopReason::Manual).await;

        let size_at_stop = match f.events.recv().await.unwrap() {
            SessionEvent::Completed(capture) => {
                let size = capture.size_bytes;
                // Trailing chunk arrives after the Stopping transition
                tx.send(chunk(0.9, 1600)).await.unwrap();
                tokio::time::sleep(Duration::from_millis(1)).await;
                assert_eq!(std::fs::metadata(&capture.artifact).unwrap().len(), size);
                size
            }
            other => panic!("expected Completed, got {:?}", other),
        };
        assert!(size_at_stop > 0);
        assert_eq!(f.session.level(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn capture_error_routes_through_normal_stop_path() {
        let mut f = fixture();
        let (tx, rx) = mpsc::channel(8);
        f.session.start(rx, noop_stop()).unwrap();

        tx.send(chunk(0.5, 1600)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(700)).await;

        // Device failure: partial audio already captured still gets
        // evaluated for delivery
        tx.send(CaptureEvent::Error(crate::error::AudioError::StreamError(
            "stream died".into(),
        )))
        .await
        .unwrap();

        match f.events.recv().await.unwrap() {
            SessionEvent::Completed(capture) => {
                assert_eq!(capture.duration.as_millis(), 700);
            }
            other => panic!("expected Completed, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn safety_ceiling_stops_a_runaway_session() {
        // Standard timer armed past the ceiling models it failing to land
        let mut f = fixture_with(RecordingConfig {
            standard_duration_ms: 20_000,
            ..RecordingConfig::default()
        });
        let (_tx, rx) = mpsc::channel(8);
        f.session.start(rx, noop_stop()).unwrap();

        match f.events.recv().await.unwrap() {
            SessionEvent::Completed(capture) => {
                assert_eq!(capture.duration.as_millis(), 10_000);
            }
            other => panic!("expected Completed, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_capture_callback_runs_once_on_stop() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let f = fixture();
        let calls = Arc::new(AtomicU32::new(0));
        let calls_in_cb = calls.clone();
        let (_tx, rx) = mpsc::channel(8);
        f.session
            .start(
                rx,
                Box::new(move || {
                    calls_in_cb.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(600)).await;
        f.session.stop(StopReason::Manual).await;
        // Second stop is idempotent
        f.session.stop(StopReason::Manual).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
