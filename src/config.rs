//! Configuration management
//!
//! Mirrors this codebase's `Config` pattern: a `serde`-deserializable tree loaded
//! from TOML, every section carrying `#[serde(default)]` and a `Default` impl, with
//! secrets resolved from named environment variables when absent from the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::EngineMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: EngineModeConfig,
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub tts: TtsConfig,
    #[serde(default)]
    pub s2s: S2sConfig,
    #[serde(default)]
    pub vad: VadConfig,
    #[serde(default)]
    pub behavior: BehaviorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: EngineModeConfig::default(),
            stt: SttConfig::default(),
            tts: TtsConfig::default(),
            s2s: S2sConfig::default(),
            vad: VadConfig::default(),
            behavior: BehaviorConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngineModeConfig(pub EngineMode);

impl Default for EngineModeConfig {
    fn default() -> Self {
        Self(EngineMode::Auto)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    #[serde(default = "default_stt_provider")]
    pub provider: String,
    #[serde(default)]
    pub fallback: Option<String>,
}

fn default_stt_provider() -> String {
    "deepgram".to_string()
}

impl Default for SttConfig {
    fn default() -> Self {
        Self { provider: default_stt_provider(), fallback: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_provider")]
    pub provider: String,
    #[serde(default)]
    pub fallback: Option<String>,
    /// §4.5: sentences are truncated to this many characters before synthesis.
    #[serde(default = "default_tts_max_chars")]
    pub max_chars: usize,
}

fn default_tts_provider() -> String {
    "elevenlabs".to_string()
}

fn default_tts_max_chars() -> usize {
    4000
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: default_tts_provider(),
            fallback: None,
            max_chars: default_tts_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S2sConfig {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub openai_realtime: OpenAiRealtimeConfig,
    #[serde(default)]
    pub gemini_live: GeminiLiveConfig,
}

impl Default for S2sConfig {
    fn default() -> Self {
        Self {
            provider: None,
            openai_realtime: OpenAiRealtimeConfig::default(),
            gemini_live: GeminiLiveConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiRealtimeConfig {
    #[serde(default = "default_openai_realtime_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_openai_realtime_model() -> String {
    "gpt-4o-realtime-preview".to_string()
}

impl Default for OpenAiRealtimeConfig {
    fn default() -> Self {
        Self { model: default_openai_realtime_model(), api_key: None }
    }
}

impl OpenAiRealtimeConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiLiveConfig {
    #[serde(default = "default_gemini_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Hard server-imposed session limit; rotation fires before this elapses (§4.6.1).
    #[serde(default = "default_session_duration_ms")]
    pub session_duration_ms: u64,
    #[serde(default = "default_rotation_buffer_ms")]
    pub rotation_buffer_ms: u64,
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash-live".to_string()
}

fn default_session_duration_ms() -> u64 {
    10 * 60 * 1000
}

fn default_rotation_buffer_ms() -> u64 {
    60 * 1000
}

impl Default for GeminiLiveConfig {
    fn default() -> Self {
        Self {
            model: default_gemini_model(),
            api_key: None,
            session_duration_ms: default_session_duration_ms(),
            rotation_buffer_ms: default_rotation_buffer_ms(),
        }
    }
}

impl GeminiLiveConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| std::env::var("GEMINI_API_KEY").ok())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum VadEngineKind {
    Neural,
    Rms,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    #[serde(default = "default_vad_engine")]
    pub engine: VadEngineKind,
    /// 0.0–1.0 speech probability / normalized-energy threshold.
    #[serde(default = "default_vad_threshold")]
    pub threshold: f32,
    #[serde(default = "default_silence_duration_ms")]
    pub silence_duration_ms: u64,
    #[serde(default = "default_min_speech_duration_ms")]
    pub min_speech_duration_ms: u64,
}

fn default_vad_engine() -> VadEngineKind {
    VadEngineKind::Neural
}
fn default_vad_threshold() -> f32 {
    0.5
}
fn default_silence_duration_ms() -> u64 {
    700
}
fn default_min_speech_duration_ms() -> u64 {
    100
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            engine: default_vad_engine(),
            threshold: default_vad_threshold(),
            silence_duration_ms: default_silence_duration_ms(),
            min_speech_duration_ms: default_min_speech_duration_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    #[serde(default = "default_true")]
    pub barge_in: bool,
    #[serde(default = "default_true")]
    pub echo_suppression: bool,
    #[serde(default = "default_max_recording_ms")]
    pub max_recording_ms: u64,
    #[serde(default = "default_max_turns")]
    pub max_conversation_turns: usize,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub allowed_users: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_max_recording_ms() -> u64 {
    60_000
}
fn default_max_turns() -> usize {
    50
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            barge_in: default_true(),
            echo_suppression: default_true(),
            max_recording_ms: default_max_recording_ms(),
            max_conversation_turns: default_max_turns(),
            system_prompt: None,
            allowed_users: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.behavior.max_conversation_turns, 50);
        assert!(cfg.behavior.barge_in);
        assert_eq!(cfg.tts.max_chars, 4000);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let toml_str = r#"
            [behavior]
            max_conversation_turns = 10
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.behavior.max_conversation_turns, 10);
        assert_eq!(cfg.vad.threshold, 0.5);
    }

    #[test]
    fn env_fallback_for_api_key() {
        std::env::set_var("GUILDVOICE_TEST_OPENAI_KEY_PROBE", "1");
        let cfg = OpenAiRealtimeConfig::default();
        assert!(cfg.resolved_api_key().is_none() || std::env::var("OPENAI_API_KEY").is_ok());
        std::env::remove_var("GUILDVOICE_TEST_OPENAI_KEY_PROBE");
    }
}
