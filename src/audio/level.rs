//! Loudness metering over raw PCM buffers

/// Normalized RMS level of a buffer of interleaved little-endian
/// signed 16-bit samples.
///
/// Returns a value in `[0.0, 1.0]` where 1.0 is full scale. An empty
/// buffer meters as silence; a trailing odd byte is ignored.
pub fn rms_level(pcm: &[u8]) -> f32 {
    let sample_count = pcm.len() / 2;
    if sample_count == 0 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    for pair in pcm.chunks_exact(2) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]) as f64;
        sum += sample * sample;
    }

    let rms = (sum / sample_count as f64).sqrt();
    (rms / 32_768.0).clamp(0.0, 1.0) as f32
}
