//! Gemini Live provider (§4.6 "Gemini Live specifics", §4.6.1 session rotation).
//!
//! Input PCM 16 kHz, output PCM 24 kHz; tools are declared once at setup (a
//! mid-session tool update is ignored by the provider, so none is attempted).
//! Sessions face a hard ~10 minute server limit; this engine rotates to a new
//! socket before that limit using make-before-break so no audio is lost.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::agent_bridge::AgentBridge;
use crate::audio::pipeline::{bytes_to_pcm, pcm_to_bytes};
use crate::config::GeminiLiveConfig;
use crate::conversation::ConversationContext;
use crate::error::{Result, VoiceError};
use crate::types::{PcmFrame, ToolCall};

use crate::engine::{Engine, EngineEvent};

const INPUT_SAMPLE_RATE: u32 = 16_000;
const OUTPUT_SAMPLE_RATE: u32 = 24_000;
const ROTATION_HISTORY_TURNS: usize = 10;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct GeminiLiveEngine {
    config: GeminiLiveConfig,
    agent: Arc<AgentBridge>,
    conversation: Arc<tokio::sync::Mutex<ConversationContext>>,
    system_prompt: String,
    ws: Option<WsStream>,
    rotation_deadline: Option<Instant>,
    is_rotating: bool,
    interrupted: bool,
}

impl GeminiLiveEngine {
    pub fn new(
        config: GeminiLiveConfig,
        agent: Arc<AgentBridge>,
        conversation: Arc<tokio::sync::Mutex<ConversationContext>>,
        system_prompt: String,
    ) -> Self {
        Self {
            config,
            agent,
            conversation,
            system_prompt,
            ws: None,
            rotation_deadline: None,
            is_rotating: false,
            interrupted: false,
        }
    }

    fn rotation_buffer(&self) -> Duration {
        Duration::from_millis(self.config.rotation_buffer_ms)
    }

    async fn build_setup_frame(&self) -> Result<serde_json::Value> {
        let tools = self.agent.tool_definitions().await;
        let tools_json: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();

        let history = {
            let conv = self.conversation.lock().await;
            conv.last_n(ROTATION_HISTORY_TURNS)
                .iter()
                .map(|turn| format!("{:?}: {}", turn.role, turn.content))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let system_instruction = if history.is_empty() {
            self.system_prompt.clone()
        } else {
            format!("{}\n\nRecent conversation:\n{}", self.system_prompt, history)
        };

        Ok(serde_json::json!({
            "setup": {
                "model": self.config.model,
                "generationConfig": { "responseModalities": ["AUDIO"] },
                "systemInstruction": { "parts": [{ "text": system_instruction }] },
                "tools": [{ "functionDeclarations": tools_json }],
            }
        }))
    }

    async fn connect_socket(&self) -> Result<WsStream> {
        let api_key = self
            .config
            .resolved_api_key()
            .ok_or_else(|| VoiceError::Config("missing Gemini API key".into()))?;
        let url = format!(
            "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent?key={api_key}"
        );
        let (ws, _response) = connect_async(url).await.map_err(|e| VoiceError::Transport(e.to_string()))?;
        Ok(ws)
    }

    async fn send_json(ws: &mut WsStream, value: serde_json::Value) -> Result<()> {
        ws.send(Message::Text(value.to_string().into()))
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))
    }

    /// Make-before-break rotation (§4.6.1): opens and sets up a new socket,
    /// closes the old only once the new one is confirmed open.
    async fn rotate(&mut self) -> Result<()> {
        self.is_rotating = true;
        let mut new_ws = self.connect_socket().await?;
        let setup = self.build_setup_frame().await?;
        Self::send_json(&mut new_ws, setup).await?;

        if let Some(mut old_ws) = self.ws.take() {
            let _ = old_ws.close(None).await;
        }
        self.ws = Some(new_ws);
        self.rotation_deadline = Some(Instant::now() + Duration::from_millis(self.config.session_duration_ms) - self.rotation_buffer());
        self.is_rotating = false;
        Ok(())
    }

    fn rotation_due(&self) -> bool {
        matches!(self.rotation_deadline, Some(deadline) if Instant::now() >= deadline)
    }

    async fn handle_tool_call(&mut self, name: String, args: serde_json::Value) -> Result<()> {
        let result = self
            .agent
            .execute_tool(ToolCall { call_id: format!("gemini-{name}"), name: name.clone(), arguments: args })
            .await;
        let Some(ws) = self.ws.as_mut() else {
            return Ok(());
        };
        Self::send_json(
            ws,
            serde_json::json!({
                "toolResponse": {
                    "functionResponses": [{ "name": name, "response": result.payload }]
                }
            }),
        )
        .await
    }
}

#[async_trait]
impl Engine for GeminiLiveEngine {
    async fn start(&mut self) -> Result<()> {
        let mut ws = self.connect_socket().await?;
        let setup = self.build_setup_frame().await?;
        Self::send_json(&mut ws, setup).await?;
        self.ws = Some(ws);
        self.rotation_deadline = Some(
            Instant::now() + Duration::from_millis(self.config.session_duration_ms) - self.rotation_buffer(),
        );
        Ok(())
    }

    async fn feed_audio(&mut self, _user_id: &str, frame: PcmFrame) -> Result<()> {
        if self.rotation_due() && !self.is_rotating {
            self.rotate().await?;
        }
        let resampled = crate::audio::pipeline::resample(&frame.samples, frame.sample_rate, INPUT_SAMPLE_RATE);
        let b64 = base64::engine::general_purpose::STANDARD.encode(pcm_to_bytes(&resampled));
        let Some(ws) = self.ws.as_mut() else {
            return Err(VoiceError::Session("gemini live socket not connected".into()));
        };
        Self::send_json(
            ws,
            serde_json::json!({
                "realtimeInput": {
                    "mediaChunks": [{ "mimeType": "audio/pcm;rate=16000", "data": b64 }]
                }
            }),
        )
        .await
    }

    async fn end_of_speech(&mut self, _user_id: &str) -> Result<()> {
        Ok(())
    }

    async fn inject_text(&mut self, text: &str) -> Result<()> {
        let Some(ws) = self.ws.as_mut() else {
            return Err(VoiceError::Session("gemini live socket not connected".into()));
        };
        Self::send_json(
            ws,
            serde_json::json!({ "clientContent": { "turns": [{ "role": "user", "parts": [{ "text": text }] }], "turnComplete": true } }),
        )
        .await
    }

    async fn interrupt(&mut self) {
        self.interrupted = true;
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(mut ws) = self.ws.take() {
            let _ = ws.close(None).await;
        }
        Ok(())
    }

    async fn conversation_history(&self) -> Vec<crate::types::ConversationTurn> {
        self.conversation.lock().await.turns().cloned().collect()
    }

    async fn next_event(&mut self) -> Option<EngineEvent> {
        loop {
            if self.rotation_due() && !self.is_rotating {
                if self.rotate().await.is_err() {
                    return Some(EngineEvent::Error { message: "gemini live rotation failed".into() });
                }
            }
            let ws = self.ws.as_mut()?;
            let message = match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    if self.is_rotating {
                        continue;
                    }
                    return Some(EngineEvent::Error { message: e.to_string() });
                }
                None => {
                    if self.is_rotating {
                        continue;
                    }
                    return None;
                }
            };
            let value: serde_json::Value = match serde_json::from_str(&message) {
                Ok(v) => v,
                Err(_) => continue,
            };

            if let Some(calls) = value["toolCall"]["functionCalls"].as_array() {
                for call in calls {
                    let name = call["name"].as_str().unwrap_or_default().to_string();
                    let args = call["args"].clone();
                    let _ = self.handle_tool_call(name, args).await;
                }
                continue;
            }

            if let Some(text) = value["inputTranscription"]["text"].as_str() {
                return Some(EngineEvent::TranscriptIn {
                    user_id: "unknown".to_string(),
                    text: text.to_string(),
                    is_final: true,
                });
            }

            if let Some(parts) = value["serverContent"]["modelTurn"]["parts"].as_array() {
                for part in parts {
                    if let Some(inline) = part.get("inlineData").and_then(|d| d["data"].as_str()) {
                        if self.interrupted {
                            continue;
                        }
                        if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(inline) {
                            let samples = bytes_to_pcm(&bytes);
                            return Some(EngineEvent::AudioOut {
                                pcm: PcmFrame::new(samples, OUTPUT_SAMPLE_RATE, 1),
                            });
                        }
                    }
                    if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                        if !self.interrupted {
                            return Some(EngineEvent::AssistantText { text: text.to_string() });
                        }
                    }
                }
            }

            if value["serverContent"]["interrupted"].as_bool().unwrap_or(false) {
                self.interrupted = true;
                return Some(EngineEvent::Error { message: "interrupted by provider".into() });
            }

            if value["serverContent"]["turnComplete"].as_bool().unwrap_or(false) {
                self.interrupted = false;
                return Some(EngineEvent::TurnEnd);
            }
        }
    }
}
