//! OpenAI Realtime provider (§4.6 "OpenAI Realtime specifics", §6 wire protocol).
//!
//! PCM16 both directions at 24 kHz; server-side VAD (silence 800ms); Whisper
//! input transcription; `endOfSpeech` issues `input_audio_buffer.commit` then
//! `response.create`; `interrupt` issues `response.cancel` only when a response
//! id is currently tracked.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::client::IntoClientRequest,
    tungstenite::Message,
    MaybeTlsStream, WebSocketStream,
};

use crate::agent_bridge::AgentBridge;
use crate::audio::pipeline::{bytes_to_pcm, pcm_to_bytes};
use crate::config::OpenAiRealtimeConfig;
use crate::error::{Result, VoiceError};
use crate::types::{ConversationTurn, PcmFrame, ToolCall};

use crate::engine::{Engine, EngineEvent};

const SAMPLE_RATE: u32 = 24_000;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct OpenAiRealtimeEngine {
    config: OpenAiRealtimeConfig,
    agent: Arc<AgentBridge>,
    ws: Option<WsStream>,
    response_id: Option<String>,
    interrupted: bool,
    history: Vec<ConversationTurn>,
    pending_assistant_text: String,
    now_ms: u64,
}

impl OpenAiRealtimeEngine {
    pub fn new(config: OpenAiRealtimeConfig, agent: Arc<AgentBridge>) -> Self {
        Self {
            config,
            agent,
            ws: None,
            response_id: None,
            interrupted: false,
            history: Vec::new(),
            pending_assistant_text: String::new(),
            now_ms: 0,
        }
    }

    async fn send_json(&mut self, value: serde_json::Value) -> Result<()> {
        let ws = self
            .ws
            .as_mut()
            .ok_or_else(|| VoiceError::Session("openai realtime socket not connected".into()))?;
        ws.send(Message::Text(value.to_string().into()))
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))
    }

    async fn send_session_update(&mut self) -> Result<()> {
        let tools = self.agent.tool_definitions().await;
        let tools_json: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                })
            })
            .collect();

        self.send_json(serde_json::json!({
            "type": "session.update",
            "session": {
                "turn_detection": { "type": "server_vad", "silence_duration_ms": 800 },
                "input_audio_format": "pcm16",
                "output_audio_format": "pcm16",
                "tools": tools_json,
            }
        }))
        .await
    }

    async fn handle_tool_call(&mut self, call_id: String, name: String, arguments_json: String) -> Result<()> {
        let arguments: serde_json::Value =
            serde_json::from_str(&arguments_json).unwrap_or(serde_json::Value::Null);
        let result = self
            .agent
            .execute_tool(ToolCall { call_id: call_id.clone(), name, arguments })
            .await;
        self.send_json(serde_json::json!({
            "type": "conversation.item.create",
            "item": {
                "type": "function_call_output",
                "call_id": call_id,
                "output": result.payload.to_string(),
            }
        }))
        .await?;
        self.send_json(serde_json::json!({ "type": "response.create" })).await
    }
}

#[async_trait]
impl Engine for OpenAiRealtimeEngine {
    async fn start(&mut self) -> Result<()> {
        let api_key = self
            .config
            .resolved_api_key()
            .ok_or_else(|| VoiceError::Config("missing OpenAI API key".into()))?;
        let url = format!(
            "wss://api.openai.com/v1/realtime?model={}",
            self.config.model
        );
        let mut request = url
            .into_client_request()
            .map_err(|e| VoiceError::Transport(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            format!("Bearer {api_key}").parse().map_err(|_| VoiceError::Config("invalid api key".into()))?,
        );
        headers.insert(
            "OpenAI-Beta",
            tokio_tungstenite::tungstenite::http::HeaderValue::from_static("realtime=v1"),
        );

        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| VoiceError::Transport(e.to_string()))?;
        self.ws = Some(ws);
        self.send_session_update().await
    }

    async fn feed_audio(&mut self, _user_id: &str, frame: PcmFrame) -> Result<()> {
        let resampled = crate::audio::pipeline::resample(&frame.samples, frame.sample_rate, SAMPLE_RATE);
        let b64 = base64::engine::general_purpose::STANDARD.encode(pcm_to_bytes(&resampled));
        self.send_json(serde_json::json!({
            "type": "input_audio_buffer.append",
            "audio": b64,
        }))
        .await
    }

    async fn end_of_speech(&mut self, _user_id: &str) -> Result<()> {
        self.send_json(serde_json::json!({ "type": "input_audio_buffer.commit" })).await?;
        self.send_json(serde_json::json!({ "type": "response.create" })).await
    }

    async fn inject_text(&mut self, text: &str) -> Result<()> {
        self.send_json(serde_json::json!({
            "type": "conversation.item.create",
            "item": {
                "type": "message",
                "role": "user",
                "content": [{ "type": "input_text", "text": text }],
            }
        }))
        .await?;
        self.send_json(serde_json::json!({ "type": "response.create" })).await
    }

    async fn interrupt(&mut self) {
        self.interrupted = true;
        if self.response_id.is_some() {
            let _ = self.send_json(serde_json::json!({ "type": "response.cancel" })).await;
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(mut ws) = self.ws.take() {
            let _ = ws.close(None).await;
        }
        Ok(())
    }

    async fn conversation_history(&self) -> Vec<ConversationTurn> {
        self.history.clone()
    }

    async fn next_event(&mut self) -> Option<EngineEvent> {
        loop {
            let ws = self.ws.as_mut()?;
            let message = match ws.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Some(EngineEvent::Error { message: e.to_string() }),
                None => return None,
            };
            let value: serde_json::Value = match serde_json::from_str(&message) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let event_type = value.get("type").and_then(|t| t.as_str()).unwrap_or("");

            match event_type {
                "response.created" => {
                    self.response_id = value["response"]["id"].as_str().map(str::to_string);
                    self.interrupted = false;
                }
                "response.audio.delta" => {
                    if self.interrupted {
                        continue;
                    }
                    let Some(b64) = value.get("delta").and_then(|d| d.as_str()) else { continue };
                    let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(b64) else { continue };
                    let samples = bytes_to_pcm(&bytes);
                    return Some(EngineEvent::AudioOut { pcm: PcmFrame::new(samples, SAMPLE_RATE, 1) });
                }
                "response.audio_transcript.delta" => {
                    if self.interrupted {
                        continue;
                    }
                    if let Some(text) = value.get("delta").and_then(|d| d.as_str()) {
                        self.pending_assistant_text.push_str(text);
                        return Some(EngineEvent::AssistantText { text: text.to_string() });
                    }
                }
                "conversation.item.input_audio_transcription.completed" => {
                    if let Some(text) = value.get("transcript").and_then(|t| t.as_str()) {
                        self.history.push(ConversationTurn::user("unknown", "unknown", text, self.now_ms));
                        return Some(EngineEvent::TranscriptIn {
                            user_id: "unknown".to_string(),
                            text: text.to_string(),
                            is_final: true,
                        });
                    }
                }
                "response.function_call_arguments.done" => {
                    let call_id = value["call_id"].as_str().unwrap_or_default().to_string();
                    let name = value["name"].as_str().unwrap_or_default().to_string();
                    let arguments = value["arguments"].as_str().unwrap_or("{}").to_string();
                    if self.handle_tool_call(call_id, name, arguments).await.is_err() {
                        return Some(EngineEvent::Error { message: "tool dispatch failed".into() });
                    }
                }
                "response.done" => {
                    self.response_id = None;
                    if !self.pending_assistant_text.is_empty() {
                        let text = std::mem::take(&mut self.pending_assistant_text);
                        self.history.push(ConversationTurn::assistant(text, self.now_ms));
                    }
                    return Some(EngineEvent::TurnEnd);
                }
                "error" => {
                    let message = value["error"]["message"].as_str().unwrap_or("unknown error").to_string();
                    return Some(EngineEvent::Error { message });
                }
                _ => continue,
            }
        }
    }
}
