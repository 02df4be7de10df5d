//! WAV artifact sink
//!
//! Thin wrapper around `hound`; the rest of the crate treats WAV framing
//! as opaque and only streams raw LE i16 bytes through.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::AudioConfig;
use crate::error::AudioError;

/// Streaming WAV writer for one capture artifact
pub struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: PathBuf,
}

impl WavSink {
    /// Create a sink at `path` with the configured PCM format
    pub fn create(path: &Path, audio: &AudioConfig) -> Result<Self, AudioError> {
        let spec = hound::WavSpec {
            channels: audio.channels,
            sample_rate: audio.sample_rate,
            bits_per_sample: audio.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(path, spec)
            .map_err(|e| AudioError::SinkError(e.to_string()))?;

        Ok(Self {
            writer: Some(writer),
            path: path.to_path_buf(),
        })
    }

    /// Append a chunk of interleaved little-endian i16 samples
    pub fn write_chunk(&mut self, pcm: &[u8]) -> Result<(), AudioError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| AudioError::SinkError("sink already finalized".into()))?;

        for pair in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            writer
                .write_sample(sample)
                .map_err(|e| AudioError::SinkError(e.to_string()))?;
        }
        Ok(())
    }

    /// Flush the header and close the file, returning the artifact path
    pub fn finalize(mut self) -> Result<PathBuf, AudioError> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| AudioError::SinkError(e.to_string()))?;
        }
        Ok(self.path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// File name for a capture started at `stamp`, e.g.
/// `recording_2026-08-29T10-30-00-000Z.wav`
pub fn artifact_name(stamp: DateTime<Utc>) -> String {
    let iso = stamp.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
    format!("recording_{}.wav", iso.replace([':', '.'], "-"))
}

/// Full transient artifact path under the temp directory
pub fn artifact_path(temp_dir: &Path, stamp: DateTime<Utc>) -> PathBuf {
    temp_dir.join(artifact_name(stamp))
}
