//! Audio subsystem module

pub mod capture;
pub mod level;
pub mod wav;

pub use capture::{AudioCapture, CaptureEvent};
pub use level::rms_level;
pub use wav::WavSink;
