//! RMS-based VAD fallback (§4.2).
//!
//! Threshold is scaled from the configured 0.0–1.0 value into the int16 energy
//! range using a fixed factor of 1600 (empirically enough headroom to separate
//! room noise from speech without per-deployment tuning).

use crate::audio::pipeline::rms;
use crate::config::VadConfig;
use crate::types::PcmFrame;

use super::{Vad, VadEvent};

const THRESHOLD_SCALE: f64 = 1600.0;

pub struct RmsVad {
    threshold: f64,
    silence_duration_ms: u64,
    speaking: bool,
    silence_accum_ms: f64,
}

impl RmsVad {
    pub fn new(config: &VadConfig) -> Self {
        Self {
            threshold: config.threshold as f64 * THRESHOLD_SCALE,
            silence_duration_ms: config.silence_duration_ms,
            speaking: false,
            silence_accum_ms: 0.0,
        }
    }
}

impl Vad for RmsVad {
    fn process(&mut self, frame: &PcmFrame) -> VadEvent {
        let energy = rms(&frame.samples);
        let above = energy >= self.threshold;

        if !self.speaking {
            if above {
                self.speaking = true;
                self.silence_accum_ms = 0.0;
                return VadEvent::SpeechStart;
            }
            return VadEvent::None;
        }

        if above {
            self.silence_accum_ms = 0.0;
            return VadEvent::None;
        }

        self.silence_accum_ms += frame.duration_ms();
        if self.silence_accum_ms >= self.silence_duration_ms as f64 {
            self.speaking = false;
            self.silence_accum_ms = 0.0;
            return VadEvent::SpeechEnd;
        }
        VadEvent::None
    }

    fn dispose(&mut self) {
        self.speaking = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(threshold: f32, silence_ms: u64) -> VadConfig {
        VadConfig {
            engine: crate::config::VadEngineKind::Rms,
            threshold,
            silence_duration_ms: silence_ms,
            min_speech_duration_ms: 0,
        }
    }

    fn loud_frame() -> PcmFrame {
        PcmFrame::processing(vec![20_000i16; 320])
    }

    fn quiet_frame() -> PcmFrame {
        PcmFrame::processing(vec![0i16; 320])
    }

    #[test]
    fn emits_start_then_end_after_silence() {
        let mut vad = RmsVad::new(&cfg(0.5, 40));
        assert_eq!(vad.process(&loud_frame()), VadEvent::SpeechStart);
        assert_eq!(vad.process(&loud_frame()), VadEvent::None);
        // each quiet frame is 20ms; two get us to 40ms accumulated silence.
        assert_eq!(vad.process(&quiet_frame()), VadEvent::None);
        assert_eq!(vad.process(&quiet_frame()), VadEvent::SpeechEnd);
    }

    #[test]
    fn quiet_frames_never_start() {
        let mut vad = RmsVad::new(&cfg(0.5, 700));
        assert_eq!(vad.process(&quiet_frame()), VadEvent::None);
        assert_eq!(vad.process(&quiet_frame()), VadEvent::None);
    }
}
