//! Microphone capture
//!
//! Runs a cpal input stream on a dedicated thread and pushes PCM chunks
//! into a channel consumed by the recording session. The producer never
//! blocks: if the session falls behind, chunks are dropped and counted.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

use crate::config::AudioConfig;
use crate::error::AudioError;

/// Event pushed from the capture thread to the recording session
#[derive(Debug)]
pub enum CaptureEvent {
    /// Interleaved little-endian i16 PCM bytes
    Chunk(Vec<u8>),
    /// Terminal stream failure; the session runs its normal stop path
    Error(AudioError),
}

/// Capture instance for the default input device
pub struct AudioCapture {
    audio: AudioConfig,
    running: Arc<AtomicBool>,
    dropped_chunks: Arc<AtomicU64>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl AudioCapture {
    pub fn new(audio: &AudioConfig) -> Self {
        Self {
            audio: audio.clone(),
            running: Arc::new(AtomicBool::new(false)),
            dropped_chunks: Arc::new(AtomicU64::new(0)),
            thread_handle: Mutex::new(None),
        }
    }

    /// Start capturing, pushing events into `events`
    ///
    /// No-op if already running.
    pub fn start(&self, events: mpsc::Sender<CaptureEvent>) -> Result<(), AudioError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AudioError::DeviceNotFound("no default input device".into()))?;

        let config = StreamConfig {
            channels: self.audio.channels,
            sample_rate: cpal::SampleRate(self.audio.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let running = self.running.clone();
        let running_for_loop = self.running.clone();
        let dropped = self.dropped_chunks.clone();
        let error_events = events.clone();

        let handle = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let stream = device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        if !running.load(Ordering::Relaxed) {
                            return;
                        }

                        let mut pcm = Vec::with_capacity(data.len() * 2);
                        for &sample in data {
                            let s = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                            pcm.extend_from_slice(&s.to_le_bytes());
                        }

                        if events.try_send(CaptureEvent::Chunk(pcm)).is_err() {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    move |err| {
                        let _ = error_events
                            .try_send(CaptureEvent::Error(AudioError::StreamError(err.to_string())));
                    },
                    None,
                );

                match stream {
                    Ok(stream) => {
                        if let Err(e) = stream.play() {
                            tracing::error!("Failed to start input stream: {}", e);
                            return;
                        }

                        // Keep thread alive while running; dropping the
                        // stream at the end stops capture
                        while running_for_loop.load(Ordering::Relaxed) {
                            thread::sleep(std::time::Duration::from_millis(10));
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to build input stream: {}", e);
                    }
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        *self.thread_handle.lock() = Some(handle);
        Ok(())
    }

    /// Stop capturing and join the stream thread
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Chunks dropped because the session channel was full
    pub fn dropped_chunks(&self) -> u64 {
        self.dropped_chunks.load(Ordering::Relaxed)
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_without_start_is_a_noop() {
        let capture = AudioCapture::new(&AudioConfig::default());
        assert!(!capture.is_running());
        capture.stop();
        assert_eq!(capture.dropped_chunks(), 0);
    }

    #[test]
    fn start_on_missing_device_reports_audio_error() {
        // Only meaningful on machines without an input device (CI);
        // with a real microphone present, start must succeed.
        let capture = AudioCapture::new(&AudioConfig::default());
        let (tx, _rx) = mpsc::channel(4);
        match capture.start(tx) {
            Ok(()) => {
                assert!(capture.is_running());
                capture.stop();
            }
            Err(AudioError::DeviceNotFound(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}
