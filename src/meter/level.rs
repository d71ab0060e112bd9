//! Loudness reduction for raw S16_LE chunks.

/// Root-mean-square amplitude of little-endian 16-bit samples.
/// A trailing odd byte is ignored.
pub fn rms_s16le(chunk: &[u8]) -> f64 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for pair in chunk.chunks_exact(2) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]) as f64;
        sum += sample * sample;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    (sum / count as f64).sqrt()
}

/// Maps an RMS amplitude onto 0..=100, saturating at `full_scale`.
pub fn level_from_rms(rms: f64, full_scale: f64) -> u8 {
    if full_scale <= 0.0 || !rms.is_finite() || rms <= 0.0 {
        return 0;
    }
    (rms / full_scale * 100.0).min(100.0) as u8
}

/// Fast attack, slow release: the reading jumps up immediately but falls by
/// at most 20% per chunk.
pub fn smooth(previous: u8, instant: u8) -> u8 {
    let decayed = (previous as u32 * 4 / 5) as u8;
    instant.max(decayed).min(100)
}
