//! Echo suppressor (§4.3): heuristic two-stage gate, not a full AEC (§1 Non-goals).

use crate::audio::pipeline::rms;
use crate::types::PcmFrame;

/// Cooldown window after the bot stops speaking during which low-energy frames
/// are still gated, to absorb tail echo.
pub const ECHO_COOLDOWN_MS: u64 = 300;

/// During cooldown, frames quieter than this (int16 RMS units, below conversational
/// speech) are suppressed outright, independent of the outbound ring mean.
const COOLDOWN_FIXED_THRESHOLD: f64 = 600.0;

/// Inbound energy must exceed this multiple of the outbound ring mean to be
/// treated as genuine barge-in rather than leakage.
const CORRELATION_FACTOR: f64 = 1.4;

const RING_CAPACITY: usize = 50;

/// Fixed-capacity circular buffer of recent outbound RMS samples; constant-time
/// push and mean (§9 "Echo RMS ring").
struct RmsRing {
    buf: Vec<f64>,
    next: usize,
    filled: bool,
}

impl RmsRing {
    fn new() -> Self {
        Self { buf: Vec::with_capacity(RING_CAPACITY), next: 0, filled: false }
    }

    fn push(&mut self, value: f64) {
        if self.buf.len() < RING_CAPACITY {
            self.buf.push(value);
        } else {
            self.buf[self.next] = value;
            self.filled = true;
        }
        self.next = (self.next + 1) % RING_CAPACITY;
    }

    fn mean(&self) -> f64 {
        if self.buf.is_empty() {
            return 0.0;
        }
        self.buf.iter().sum::<f64>() / self.buf.len() as f64
    }
}

pub struct EchoSuppressor {
    outbound_ring: RmsRing,
    speaking: bool,
    /// Milliseconds-since-epoch-ish monotonic clock the caller supplies; avoids a
    /// hidden `Instant::now()` dependency so suppression logic stays testable.
    stopped_at_ms: Option<u64>,
}

impl EchoSuppressor {
    pub fn new() -> Self {
        Self { outbound_ring: RmsRing::new(), speaking: false, stopped_at_ms: None }
    }

    /// Records one outbound (bot TTS) chunk's energy.
    pub fn register_outbound(&mut self, chunk: &PcmFrame) {
        self.outbound_ring.push(rms(&chunk.samples));
    }

    /// Updates the bot-speaking flag; `now_ms` is recorded as the stop time when
    /// transitioning to not-speaking, to drive the cooldown window.
    pub fn set_speaking(&mut self, speaking: bool, now_ms: u64) {
        if self.speaking && !speaking {
            self.stopped_at_ms = Some(now_ms);
        }
        self.speaking = speaking;
    }

    fn in_cooldown(&self, now_ms: u64) -> bool {
        match self.stopped_at_ms {
            Some(stopped) => now_ms.saturating_sub(stopped) < ECHO_COOLDOWN_MS,
            None => false,
        }
    }

    /// True if `frame` should be dropped before reaching the VAD/engine.
    pub fn should_suppress(&self, frame: &PcmFrame, now_ms: u64) -> bool {
        let energy = rms(&frame.samples);

        if self.speaking {
            let mean = self.outbound_ring.mean();
            return energy < CORRELATION_FACTOR * mean;
        }

        if self.in_cooldown(now_ms) {
            return energy < COOLDOWN_FIXED_THRESHOLD;
        }

        false
    }
}

impl Default for EchoSuppressor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_rms(value: i16) -> PcmFrame {
        PcmFrame::processing(vec![value; 320])
    }

    #[test]
    fn suppresses_below_correlation_threshold_while_speaking() {
        let mut echo = EchoSuppressor::new();
        for _ in 0..10 {
            echo.register_outbound(&frame_with_rms(1000));
        }
        echo.set_speaking(true, 0);

        assert!(echo.should_suppress(&frame_with_rms(1000), 10)); // < 1.4x mean
        assert!(!echo.should_suppress(&frame_with_rms(1500), 10)); // >= 1.4x mean
    }

    #[test]
    fn cooldown_uses_fixed_threshold() {
        let mut echo = EchoSuppressor::new();
        echo.set_speaking(true, 0);
        echo.set_speaking(false, 100);

        assert!(echo.should_suppress(&frame_with_rms(500), 150));
        assert!(!echo.should_suppress(&frame_with_rms(700), 150));
    }

    #[test]
    fn no_suppression_once_cooldown_elapses() {
        let mut echo = EchoSuppressor::new();
        echo.set_speaking(true, 0);
        echo.set_speaking(false, 100);

        assert!(!echo.should_suppress(&frame_with_rms(500), 100 + ECHO_COOLDOWN_MS + 1));
    }
}
