//! # ESP Audio Uplink
//!
//! Host-side controller that records short microphone clips and ships them
//! to an ESP32-class voice device over HTTP.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            HOST PC                               │
//! │  ┌────────────┐   chunks   ┌───────────────────┐                 │
//! │  │ Microphone │──────────▶│ Recording Session  │──┐              │
//! │  │  (cpal)    │           │  (state machine)   │  │ WAV artifact │
//! │  └────────────┘           └───────────────────┘  ▼              │
//! │        ▲  live level            ▲           ┌──────────────┐     │
//! │        └── audio::level ────────┘           │  Delivery    │     │
//! │                                             │  Pipeline    │     │
//! │  ┌──────────────────┐   endpoint            └──────┬───────┘     │
//! │  │ Discovery Scanner│──────────────────────────────┤             │
//! │  │  (/24 fan-out)   │                              │             │
//! │  └──────────────────┘                              │             │
//! └────────────────────────────────────────────────────┼─────────────┘
//!                                                      │ HTTP POST
//!                                                      ▼ multipart
//!                                          ┌────────────────────────┐
//!                                          │   ESP32 voice device   │
//!                                          │ /status  /upload-audio │
//!                                          └────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod delivery;
pub mod error;
pub mod net;
pub mod session;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Sample rate expected by the device (Hz)
    pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

    /// Channel count (mono)
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Bits per sample (signed 16-bit PCM)
    pub const BITS_PER_SAMPLE: u16 = 16;

    /// HTTP port the device listens on
    pub const DEVICE_PORT: u16 = 80;

    /// Fixed recording window in milliseconds
    pub const STANDARD_DURATION_MS: u64 = 5_000;

    /// Safety ceiling on recording length in milliseconds
    pub const MAX_DURATION_MS: u64 = 10_000;

    /// Recordings shorter than this are rejected
    pub const MIN_DURATION_MS: u64 = 500;

    /// Pause between stopping capture and reading the artifact back
    pub const SETTLE_DELAY_MS: u64 = 500;

    /// Artifacts smaller than this are not uploaded
    pub const MIN_UPLOAD_BYTES: u64 = 1_000;

    /// Per-host probe timeout during subnet discovery
    pub const PROBE_TIMEOUT_MS: u64 = 2_000;

    /// Timeout for explicit health checks and uploads
    pub const REQUEST_TIMEOUT_MS: u64 = 30_000;

    /// Maximum in-flight discovery probes
    pub const PROBE_CONCURRENCY: usize = 32;

    /// Capacity of the capture chunk channel
    pub const CHUNK_CHANNEL_CAPACITY: usize = 256;
}
