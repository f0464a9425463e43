//! Voice session orchestrator (§4.7): wires transport, per-user VAD, echo
//! suppression, and an engine (pipeline or speech-to-speech) into the state
//! machine governing one guild's voice conversation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::audio::pipeline::to_transport_format;
use crate::audio::transport::{AudioReceiver, AudioSender};
use crate::config::Config;
use crate::echo::EchoSuppressor;
use crate::engine::{Engine, EngineEvent};
use crate::error::{Result, VoiceError};
use crate::playback::{PlaybackQueue, TtsStream};
use crate::types::{PcmFrame, SessionState};
use crate::vad::{self, Vad, VadEvent};

/// Wraps one already-resolved transport frame as a single-chunk stream so it
/// can be handed to `PlaybackQueue`, the same FIFO/barge-in boundary the
/// engine itself uses for TTS streams (§4.4).
struct OutboundFrame(Option<PcmFrame>);

#[async_trait]
impl TtsStream for OutboundFrame {
    async fn next_chunk(&mut self) -> Option<PcmFrame> {
        self.0.take()
    }

    fn cancel(&mut self) {
        self.0 = None;
    }
}

pub struct VoiceSession {
    pub guild_id: String,
    config: Config,
    state: SessionState,
    engine: Box<dyn Engine>,
    vads: HashMap<String, Box<dyn Vad>>,
    echo: Arc<Mutex<EchoSuppressor>>,
    playback: PlaybackQueue<Box<dyn AudioSender>>,
    now_ms: u64,
}

impl VoiceSession {
    pub fn new(
        guild_id: String,
        config: Config,
        engine: Box<dyn Engine>,
        sender: Box<dyn AudioSender>,
    ) -> Self {
        let echo = Arc::new(Mutex::new(EchoSuppressor::new()));
        Self {
            guild_id,
            config,
            state: SessionState::Idle,
            engine,
            vads: HashMap::new(),
            playback: PlaybackQueue::new(sender, echo.clone()),
            echo,
            now_ms: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Starts the session. On failure, releases any transport resources already
    /// acquired (§4.7 "Failure during start").
    pub async fn start(&mut self) -> Result<()> {
        match self.engine.start().await {
            Ok(()) => {
                self.state = SessionState::Listening;
                Ok(())
            }
            Err(e) => {
                self.playback.clear(self.now_ms).await;
                Err(e)
            }
        }
    }

    /// Handles one inbound transport frame from `user_id`. Drops the frame if the
    /// echo suppressor says so; otherwise feeds both the per-user VAD and the
    /// engine (§4.7 wiring contracts).
    pub async fn handle_inbound_frame(&mut self, user_id: &str, frame: PcmFrame) -> Result<()> {
        if self.state == SessionState::Idle {
            return Ok(());
        }

        let suppressed = self.echo.lock().await.should_suppress(&frame, self.now_ms);
        if suppressed {
            return Ok(());
        }

        let vad_event = self
            .vads
            .entry(user_id.to_string())
            .or_insert_with(|| vad::build(&self.config.vad))
            .process(&frame);

        self.engine.feed_audio(user_id, frame).await?;

        if vad_event == VadEvent::SpeechEnd {
            self.state = SessionState::Processing;
            self.engine.end_of_speech(user_id).await?;
        }
        Ok(())
    }

    /// Barge-in: a user starts speaking while the bot is speaking. Clears the
    /// playback queue atomically, cancelling whatever is still in flight and
    /// stopping the sender in one step (§4.4, §8 properties 1 & 2).
    pub async fn handle_barge_in(&mut self, user_id: &str) -> Result<()> {
        if self.state != SessionState::Speaking || !self.config.behavior.barge_in {
            return Ok(());
        }
        self.engine.interrupt().await;
        self.playback.clear(self.now_ms).await;
        self.state = SessionState::Listening;
        let _ = user_id;
        Ok(())
    }

    /// Pumps one engine event through the state machine, routing audio through
    /// the playback queue so FIFO ordering and echo registration happen at the
    /// same boundary barge-in clears (§4.4).
    pub async fn pump_event(&mut self) -> Result<Option<EngineEvent>> {
        let Some(event) = self.engine.next_event().await else {
            return Ok(None);
        };

        match &event {
            EngineEvent::AudioOut { pcm } => {
                if self.state == SessionState::Processing {
                    self.state = SessionState::Speaking;
                    self.echo.lock().await.set_speaking(true, self.now_ms);
                }
                let transport_frame = to_transport_format(pcm);
                self.playback.enqueue(Box::new(OutboundFrame(Some(transport_frame))));
                self.playback.run_to_completion().await;
            }
            EngineEvent::TurnEnd => {
                self.echo.lock().await.set_speaking(false, self.now_ms);
                self.state = SessionState::Listening;
            }
            EngineEvent::Error { .. } => {
                self.state = SessionState::Idle;
            }
            _ => {}
        }

        Ok(Some(event))
    }

    pub async fn inject_text(&mut self, text: &str) -> Result<()> {
        if self.state == SessionState::Idle {
            return Err(VoiceError::Session(format!("session for {} is idle", self.guild_id)));
        }
        self.engine.inject_text(text).await
    }

    pub async fn stop(&mut self) -> Result<()> {
        self.engine.interrupt().await;
        self.engine.stop().await?;
        self.playback.clear(self.now_ms).await;
        for vad in self.vads.values_mut() {
            vad.dispose();
        }
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Snapshots the engine's conversation history, for the session-manager's
    /// end-of-session summary (§4.8).
    pub async fn conversation_snapshot(&self) -> Vec<crate::types::ConversationTurn> {
        self.engine.conversation_history().await
    }
}

/// Receives inbound transport frames and dispatches them to the session,
/// distinguishing ordinary inbound audio from barge-in starts.
pub async fn drive_inbound(session: Arc<Mutex<VoiceSession>>, mut receiver: Box<dyn AudioReceiver>) {
    while let Some((user_id, frame)) = receiver.recv().await {
        let mut session = session.lock().await;
        if session.state() == SessionState::Speaking {
            let _ = session.handle_barge_in(&user_id).await;
        }
        if let Err(e) = session.handle_inbound_frame(&user_id, frame).await {
            tracing::warn!(guild_id = %session.guild_id, error = %e, "dropping inbound frame after session error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubSender {
        sent: Vec<PcmFrame>,
        idle: bool,
    }

    #[async_trait]
    impl AudioSender for StubSender {
        async fn send(&mut self, frame: PcmFrame) -> Result<()> {
            self.idle = false;
            self.sent.push(frame);
            Ok(())
        }
        async fn stop(&mut self) -> Result<()> {
            self.idle = true;
            Ok(())
        }
        fn is_idle(&self) -> bool {
            self.idle
        }
    }

    struct StubEngine {
        events: std::collections::VecDeque<EngineEvent>,
        interrupts: usize,
    }

    #[async_trait]
    impl Engine for StubEngine {
        async fn start(&mut self) -> Result<()> {
            Ok(())
        }
        async fn feed_audio(&mut self, _user_id: &str, _frame: PcmFrame) -> Result<()> {
            Ok(())
        }
        async fn end_of_speech(&mut self, _user_id: &str) -> Result<()> {
            Ok(())
        }
        async fn inject_text(&mut self, _text: &str) -> Result<()> {
            Ok(())
        }
        async fn interrupt(&mut self) {
            self.interrupts += 1;
        }
        async fn stop(&mut self) -> Result<()> {
            Ok(())
        }
        async fn next_event(&mut self) -> Option<EngineEvent> {
            self.events.pop_front()
        }
    }

    #[tokio::test]
    async fn barge_in_from_speaking_reaches_listening_with_one_interrupt() {
        let config = Config::default();
        let engine = Box::new(StubEngine { events: Default::default(), interrupts: 0 });
        let sender = Box::new(StubSender { sent: Vec::new(), idle: true });
        let mut session = VoiceSession::new("g1".into(), config, engine, sender);
        session.start().await.unwrap();
        session.state = SessionState::Speaking;

        session.handle_barge_in("u1").await.unwrap();
        assert_eq!(session.state(), SessionState::Listening);
    }

    #[tokio::test]
    async fn audio_out_transitions_to_speaking_and_reaches_the_sender() {
        let config = Config::default();
        let mut events = std::collections::VecDeque::new();
        events.push_back(EngineEvent::AudioOut { pcm: PcmFrame::processing(vec![1, 2, 3]) });
        events.push_back(EngineEvent::AudioOut { pcm: PcmFrame::processing(vec![4, 5, 6]) });
        let engine = Box::new(StubEngine { events, interrupts: 0 });
        let sender = Box::new(StubSender { sent: Vec::new(), idle: true });
        let mut session = VoiceSession::new("g1".into(), config, engine, sender);
        session.start().await.unwrap();
        session.state = SessionState::Processing;

        session.pump_event().await.unwrap();
        assert_eq!(session.state(), SessionState::Speaking);
        session.pump_event().await.unwrap();
        assert_eq!(session.state(), SessionState::Speaking);
    }

    #[tokio::test]
    async fn turn_end_moves_speaking_back_to_listening() {
        let config = Config::default();
        let mut events = std::collections::VecDeque::new();
        events.push_back(EngineEvent::TurnEnd);
        let engine = Box::new(StubEngine { events, interrupts: 0 });
        let sender = Box::new(StubSender { sent: Vec::new(), idle: true });
        let mut session = VoiceSession::new("g1".into(), config, engine, sender);
        session.start().await.unwrap();
        session.state = SessionState::Speaking;

        let event = session.pump_event().await.unwrap();
        assert!(matches!(event, Some(EngineEvent::TurnEnd)));
        assert_eq!(session.state(), SessionState::Listening);
    }
}
