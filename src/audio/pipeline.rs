//! PCM buffer transforms: resampling, channel mixing, and the byte-buffer framing
//! used at every boundary this crate touches (transport, providers, RPC `voice.speak`).
//!
//! Grounded in this codebase's own `TtsResult::to_pcm_bytes`/`to_base64` conversions:
//! audio moves as little-endian `i16` byte buffers at every wire boundary, so the
//! same pair of helpers is reused everywhere rather than re-deriving the framing
//! per caller.
//!
//! Opus encode/decode is out of scope (§1): the transport boundary is assumed to
//! already hand this module decoded PCM in, and to accept PCM out.

use crate::types::PcmFrame;

/// Resample `samples` (mono) from `from` Hz to `to` Hz by linear interpolation.
/// Identity when `from == to`. Output length follows `round(inLen * to / from)`;
/// taps beyond the last valid sample repeat it.
pub fn resample(samples: &[i16], from: u32, to: u32) -> Vec<i16> {
    if from == to || samples.is_empty() {
        return samples.to_vec();
    }
    let out_len = ((samples.len() as f64) * (to as f64) / (from as f64)).round() as usize;
    let mut out = Vec::with_capacity(out_len);
    let ratio = from as f64 / to as f64;
    let last = samples.len() - 1;
    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos.floor() as usize;
        if idx >= last {
            out.push(samples[last]);
            continue;
        }
        let frac = src_pos - idx as f64;
        let a = samples[idx] as f64;
        let b = samples[idx + 1] as f64;
        out.push((a + (b - a) * frac).round() as i16);
    }
    out
}

/// Average interleaved stereo samples down to mono.
pub fn stereo_to_mono(samples: &[i16]) -> Vec<i16> {
    samples
        .chunks_exact(2)
        .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
        .collect()
}

/// Duplicate mono samples into interleaved stereo.
pub fn mono_to_stereo(samples: &[i16]) -> Vec<i16> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        out.push(s);
        out.push(s);
    }
    out
}

/// Transport frame (48 kHz, 1 or 2 channel) -> processing frame (16 kHz mono).
pub fn decode_for_processing(frame: &PcmFrame) -> PcmFrame {
    let mono = match frame.channels {
        2 => stereo_to_mono(&frame.samples),
        _ => frame.samples.clone(),
    };
    let resampled = resample(&mono, frame.sample_rate, 16_000);
    PcmFrame::processing(resampled)
}

/// Processing/engine-rate frame -> 48 kHz stereo transport frame.
pub fn to_transport_format(frame: &PcmFrame) -> PcmFrame {
    let resampled = resample(&frame.samples, frame.sample_rate, 48_000);
    let stereo = mono_to_stereo(&resampled);
    PcmFrame::transport(stereo)
}

/// Little-endian i16 -> bytes.
pub fn pcm_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Little-endian bytes -> i16. Trailing odd byte, if any, is dropped.
pub fn bytes_to_pcm(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// RMS energy of a frame in int16 units.
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_identity() {
        let x: Vec<i16> = vec![1, 2, 3, 4, 5, -1, -2, 999];
        assert_eq!(resample(&x, 16_000, 16_000), x);
    }

    #[test]
    fn resample_length_law() {
        let x: Vec<i16> = (0..480i16).collect();
        let out = resample(&x, 48_000, 16_000);
        let expected = ((x.len() as f64) * 16_000.0 / 48_000.0).round() as usize;
        assert_eq!(out.len(), expected);
    }

    #[test]
    fn stereo_mono_roundtrip_length() {
        let stereo: Vec<i16> = vec![10, 20, 30, 40];
        let mono = stereo_to_mono(&stereo);
        assert_eq!(mono, vec![15, 35]);
        let back = mono_to_stereo(&mono);
        assert_eq!(back.len(), stereo.len());
    }

    #[test]
    fn pcm_bytes_roundtrip() {
        let samples: Vec<i16> = vec![0, 1, -1, i16::MAX, i16::MIN, 42];
        let bytes = pcm_to_bytes(&samples);
        assert_eq!(bytes.len(), samples.len() * 2);
        assert_eq!(bytes_to_pcm(&bytes), samples);
    }

    #[test]
    fn decode_for_processing_converts_rate_and_channels() {
        let frame = PcmFrame::transport(vec![100, 200, 100, 200]); // 48kHz stereo
        let out = decode_for_processing(&frame);
        assert_eq!(out.sample_rate, 16_000);
        assert_eq!(out.channels, 1);
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(rms(&[0, 0, 0]), 0.0);
    }
}
