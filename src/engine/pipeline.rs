//! Pipeline engine (§4.5): STT (with fallback) -> agent bridge -> sentence
//! splitter -> TTS -> playback queue. Single-speaker assumption: a processing
//! lock discards end-of-speech events arriving while already processing.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;

use crate::agent_bridge::AgentBridge;
use crate::audio::transport::AudioSender;
use crate::config::Config;
use crate::conversation::ConversationContext;
use crate::echo::EchoSuppressor;
use crate::error::{Result, VoiceError};
use crate::playback::PlaybackQueue;
use crate::providers::stt::SttProvider;
use crate::providers::tts::TtsProvider;
use crate::types::{ConversationTurn, PcmFrame};

use super::sentence_splitter::SentenceSplitter;
use super::{Engine, EngineEvent};

/// Forwards playback-queue chunks into the engine's event channel instead of a
/// real transport; the engine has no sender of its own, only a FIFO boundary
/// (§4.4) between per-sentence TTS streams.
struct ChannelAudioSender {
    tx: mpsc::UnboundedSender<PlaybackSignal>,
}

#[async_trait]
impl AudioSender for ChannelAudioSender {
    async fn send(&mut self, frame: PcmFrame) -> Result<()> {
        self.tx
            .send(PlaybackSignal::Chunk(frame))
            .map_err(|_| VoiceError::Transport("pipeline playback channel closed".into()))
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_idle(&self) -> bool {
        true
    }
}

enum PlaybackSignal {
    Chunk(PcmFrame),
    /// The queue has drained everything enqueued so far.
    Drained,
}

pub struct PipelineEngine {
    stt: Arc<dyn SttProvider>,
    stt_fallback: Option<Arc<dyn SttProvider>>,
    tts: Arc<dyn TtsProvider>,
    agent: Arc<AgentBridge>,
    conversation: Arc<Mutex<ConversationContext>>,
    tts_max_chars: usize,

    pending_utterance: std::collections::HashMap<String, Vec<i16>>,
    events: VecDeque<EngineEvent>,
    is_processing: bool,
    interrupted: bool,
    now_ms: u64,
    pending_turn_end: bool,

    /// Per-sentence TTS streams are enqueued here rather than drained inline,
    /// so sentence N+1's synthesis overlaps sentence N's playback (§4.5 item 4).
    playback: Arc<Mutex<PlaybackQueue<ChannelAudioSender>>>,
    playback_notify: Arc<Notify>,
    playback_tx: mpsc::UnboundedSender<PlaybackSignal>,
    playback_rx: mpsc::UnboundedReceiver<PlaybackSignal>,
    pump_task: Option<JoinHandle<()>>,
}

impl PipelineEngine {
    pub fn new(
        config: &Config,
        stt: Arc<dyn SttProvider>,
        stt_fallback: Option<Arc<dyn SttProvider>>,
        tts: Arc<dyn TtsProvider>,
        agent: Arc<AgentBridge>,
        conversation: Arc<Mutex<ConversationContext>>,
    ) -> Self {
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        let echo = Arc::new(Mutex::new(EchoSuppressor::new()));
        let sender = ChannelAudioSender { tx: playback_tx.clone() };
        let playback = Arc::new(Mutex::new(PlaybackQueue::new(sender, echo)));

        Self {
            stt,
            stt_fallback,
            tts,
            agent,
            conversation,
            tts_max_chars: config.tts.max_chars,
            pending_utterance: std::collections::HashMap::new(),
            events: VecDeque::new(),
            is_processing: false,
            interrupted: false,
            now_ms: 0,
            pending_turn_end: false,
            playback,
            playback_notify: Arc::new(Notify::new()),
            playback_tx,
            playback_rx,
            pump_task: None,
        }
    }

    async fn transcribe(&self, pcm: &PcmFrame) -> Result<String> {
        match self.stt.transcribe_batch(pcm).await {
            Ok(text) => Ok(text),
            Err(primary_err) => match &self.stt_fallback {
                Some(fallback) => fallback.transcribe_batch(pcm).await.map_err(|_| primary_err),
                None => Err(primary_err),
            },
        }
    }

    async fn process_utterance(&mut self, user_id: &str, samples: Vec<i16>) -> Result<()> {
        let pcm = PcmFrame::processing(samples);
        let transcript = self.transcribe(&pcm).await?;

        {
            let mut conv = self.conversation.lock().await;
            conv.push(ConversationTurn::user(user_id, user_id, &transcript, self.now_ms));
        }
        self.events.push_back(EngineEvent::TranscriptIn {
            user_id: user_id.to_string(),
            text: transcript.clone(),
            is_final: true,
        });

        let mut splitter = SentenceSplitter::new();
        let mut full_reply = String::new();
        let history: Vec<ConversationTurn> = {
            let conv = self.conversation.lock().await;
            conv.turns().cloned().collect()
        };

        let chunks = self.agent.stream_reply(user_id, &transcript, &history).await?;
        for chunk in chunks {
            if self.interrupted {
                break;
            }
            full_reply.push_str(&chunk);
            self.events.push_back(EngineEvent::AssistantText { text: chunk.clone() });
            for sentence in splitter.push(&chunk) {
                self.enqueue_sentence(&sentence).await?;
            }
        }
        if !self.interrupted {
            if let Some(residual) = splitter.flush() {
                self.enqueue_sentence(&residual).await?;
            }
        }

        if !full_reply.is_empty() {
            let mut conv = self.conversation.lock().await;
            conv.push(ConversationTurn::assistant(full_reply, self.now_ms));
        }
        self.events.push_back(EngineEvent::TurnEnd);
        Ok(())
    }

    /// Starts synthesizing `sentence` and hands the resulting stream straight
    /// to the playback queue without draining it: the caller (the per-sentence
    /// loop in `process_utterance`) moves on to the next sentence immediately,
    /// while the background pump task drains this one onto `playback_rx` (§4.5
    /// item 4 — the key latency win over end-of-turn synthesis).
    async fn enqueue_sentence(&mut self, sentence: &str) -> Result<()> {
        if self.interrupted || sentence.is_empty() {
            return Ok(());
        }
        let truncated = if sentence.len() > self.tts_max_chars {
            &sentence[..self.tts_max_chars]
        } else {
            sentence
        };
        let stream = self.tts.synthesize(truncated).await?;
        self.playback.lock().await.enqueue(stream);
        self.playback_notify.notify_one();
        Ok(())
    }
}

#[async_trait]
impl Engine for PipelineEngine {
    async fn start(&mut self) -> Result<()> {
        self.interrupted = false;
        if self.pump_task.is_none() {
            let queue = self.playback.clone();
            let notify = self.playback_notify.clone();
            let tx = self.playback_tx.clone();
            self.pump_task = Some(tokio::spawn(async move {
                loop {
                    notify.notified().await;
                    let (_order, events) = queue.lock().await.run_to_completion().await;
                    for event in events {
                        if let crate::playback::PlaybackEvent::StreamError { message, .. } = event {
                            tracing::warn!(%message, "tts stream error during playback");
                        }
                    }
                    if tx.send(PlaybackSignal::Drained).is_err() {
                        break;
                    }
                }
            }));
        }
        Ok(())
    }

    async fn feed_audio(&mut self, user_id: &str, frame: PcmFrame) -> Result<()> {
        self.pending_utterance
            .entry(user_id.to_string())
            .or_default()
            .extend(frame.samples);
        Ok(())
    }

    async fn end_of_speech(&mut self, user_id: &str) -> Result<()> {
        if self.is_processing {
            // natural-conversation single-speaker assumption (§4.5)
            return Ok(());
        }
        let Some(samples) = self.pending_utterance.remove(user_id) else {
            return Ok(());
        };
        self.is_processing = true;
        let result = self.process_utterance(user_id, samples).await;
        self.is_processing = false;
        result
    }

    async fn inject_text(&mut self, text: &str) -> Result<()> {
        self.enqueue_sentence(text).await?;
        self.events.push_back(EngineEvent::TurnEnd);
        Ok(())
    }

    async fn interrupt(&mut self) {
        self.interrupted = true;
        self.playback.lock().await.clear(self.now_ms).await;
    }

    async fn stop(&mut self) -> Result<()> {
        self.interrupted = true;
        self.pending_utterance.clear();
        self.events.clear();
        self.pending_turn_end = false;
        self.playback.lock().await.clear(self.now_ms).await;
        if let Some(handle) = self.pump_task.take() {
            handle.abort();
        }
        Ok(())
    }

    async fn conversation_history(&self) -> Vec<ConversationTurn> {
        self.conversation.lock().await.turns().cloned().collect()
    }

    /// Drains queued business events first (transcript, assistant text); once
    /// `TurnEnd` is reached, audio chunks from the playback queue are surfaced
    /// as they arrive and `TurnEnd` itself is held back until the queue
    /// signals it has fully drained, so playback genuinely finishes before the
    /// turn is reported done.
    async fn next_event(&mut self) -> Option<EngineEvent> {
        loop {
            if let Some(event) = self.events.pop_front() {
                match event {
                    EngineEvent::TurnEnd => {
                        self.pending_turn_end = true;
                        continue;
                    }
                    other => return Some(other),
                }
            }

            // A turn end is queued behind the sentences already handed to the
            // pump task: block until they actually finish draining, so audio
            // out always precedes the turn-end it belongs to.
            if self.pending_turn_end {
                match self.playback_rx.recv().await {
                    Some(PlaybackSignal::Chunk(pcm)) => return Some(EngineEvent::AudioOut { pcm }),
                    Some(PlaybackSignal::Drained) => {
                        self.pending_turn_end = false;
                        return Some(EngineEvent::TurnEnd);
                    }
                    None => return None,
                }
            }

            match self.playback_rx.try_recv() {
                Ok(PlaybackSignal::Chunk(pcm)) => return Some(EngineEvent::AudioOut { pcm }),
                Ok(PlaybackSignal::Drained) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_bridge::AgentBridge;
    use crate::providers::tts::BufferedTtsStream;
    use std::sync::Arc;

    struct StubStt {
        reply: String,
    }

    #[async_trait]
    impl SttProvider for StubStt {
        fn name(&self) -> &str {
            "stub-stt"
        }
        async fn transcribe_batch(&self, _pcm: &PcmFrame) -> Result<String> {
            Ok(self.reply.clone())
        }
    }

    struct StubTts;

    #[async_trait]
    impl TtsProvider for StubTts {
        fn name(&self) -> &str {
            "stub-tts"
        }
        async fn synthesize(&self, text: &str) -> Result<Box<dyn crate::playback::TtsStream>> {
            Ok(Box::new(BufferedTtsStream::new(vec![PcmFrame::processing(vec![
                text.len() as i16
            ])])))
        }
    }

    #[tokio::test]
    async fn single_utterance_produces_transcript_turn_end_and_audio() {
        let config = Config::default();
        let stt: Arc<dyn SttProvider> = Arc::new(StubStt { reply: "hello there.".into() });
        let tts: Arc<dyn TtsProvider> = Arc::new(StubTts);
        let agent = Arc::new(AgentBridge::new_stub_for_tests(vec!["Hi! ".into(), "How can I help?".into()]));
        let conversation = Arc::new(Mutex::new(ConversationContext::new(50)));

        let mut engine = PipelineEngine::new(&config, stt, None, tts, agent, conversation.clone());
        engine.start().await.unwrap();
        engine.feed_audio("u1", PcmFrame::processing(vec![0; 10])).await.unwrap();
        engine.end_of_speech("u1").await.unwrap();

        let mut saw_transcript = false;
        let mut saw_turn_end = false;
        let mut saw_audio = false;
        while let Some(event) = engine.next_event().await {
            match event {
                EngineEvent::TranscriptIn { text, .. } => {
                    assert_eq!(text, "hello there.");
                    saw_transcript = true;
                }
                EngineEvent::TurnEnd => saw_turn_end = true,
                EngineEvent::AudioOut { .. } => saw_audio = true,
                _ => {}
            }
        }
        assert!(saw_transcript && saw_turn_end && saw_audio);
        assert_eq!(conversation.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_end_of_speech_is_discarded_while_processing() {
        let config = Config::default();
        let stt: Arc<dyn SttProvider> = Arc::new(StubStt { reply: "hi.".into() });
        let tts: Arc<dyn TtsProvider> = Arc::new(StubTts);
        let agent = Arc::new(AgentBridge::new_stub_for_tests(vec!["ok.".into()]));
        let conversation = Arc::new(Mutex::new(ConversationContext::new(50)));
        let mut engine = PipelineEngine::new(&config, stt, None, tts, agent, conversation);

        engine.is_processing = true;
        engine.feed_audio("u1", PcmFrame::processing(vec![0; 10])).await.unwrap();
        engine.end_of_speech("u1").await.unwrap();
        assert!(engine.events.is_empty());
    }
}
