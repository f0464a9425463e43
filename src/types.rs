//! Shared data types used across modules.
//!
//! Kept free of module-specific logic to avoid circular dependencies, mirroring
//! this codebase's convention of a flat `types` module for cross-cutting structs.

use serde::{Deserialize, Serialize};

/// 16-bit little-endian PCM samples plus the format they were captured/produced at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmFrame {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl PcmFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16) -> Self {
        Self { samples, sample_rate, channels }
    }

    /// Processing format used throughout VAD/STT: 16 kHz mono.
    pub fn processing(samples: Vec<i16>) -> Self {
        Self::new(samples, 16_000, 1)
    }

    /// Discord transport format: 48 kHz stereo.
    pub fn transport(samples: Vec<i16>) -> Self {
        Self::new(samples, 48_000, 2)
    }

    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        let frames = self.samples.len() as f64 / self.channels as f64;
        frames * 1000.0 / self.sample_rate as f64
    }
}

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// A single entry in the bounded conversation window (§3 Conversation turn).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub content: String,
    /// Monotonic timestamp in milliseconds.
    pub timestamp_ms: u64,
}

impl ConversationTurn {
    pub fn user(user_id: impl Into<String>, display_name: impl Into<String>, content: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            role: TurnRole::User,
            user_id: Some(user_id.into()),
            display_name: Some(display_name.into()),
            content: content.into(),
            timestamp_ms,
        }
    }

    pub fn assistant(content: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            role: TurnRole::Assistant,
            user_id: None,
            display_name: None,
            content: content.into(),
            timestamp_ms,
        }
    }
}

/// A tool exposed to the conversational engines (§3 Tool definition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool-call request from a provider (id is provider-generated).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// The result of executing a tool: always `Ok`-shaped at this layer — execution
/// failures are folded into `{error: string}` per §4.9 and §7, never propagated as
/// a hard error, so a single caller dispatch site works uniformly for success and
/// failure tool outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub payload: serde_json::Value,
}

impl ToolResult {
    pub fn ok(call_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self { call_id: call_id.into(), payload }
    }

    pub fn error(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            payload: serde_json::json!({ "error": message.into() }),
        }
    }
}

/// Resolved conversational engine mode, see §6 configuration / §8 property 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineMode {
    Auto,
    Pipeline,
    SpeechToSpeech,
}

/// The session state machine (§3, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Listening,
    Processing,
    Speaking,
}
