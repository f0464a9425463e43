//! Playback queue (§4.4): strict FIFO ordering across overlapping TTS streams,
//! with atomic barge-in via `clear()`.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::audio::transport::AudioSender;
use crate::echo::EchoSuppressor;
use crate::types::PcmFrame;

/// One TTS provider's output stream, as consumed by the playback queue.
#[async_trait]
pub trait TtsStream: Send {
    /// `None` signals the stream is exhausted.
    async fn next_chunk(&mut self) -> Option<PcmFrame>;
    fn cancel(&mut self);
}

struct Entry {
    id: Uuid,
    stream: Box<dyn TtsStream>,
}

#[derive(Debug, Clone)]
pub enum PlaybackEvent {
    Cleared,
    StreamError { id: Uuid, message: String },
}

pub struct PlaybackQueue<S: AudioSender> {
    pending: VecDeque<Entry>,
    current: Option<Entry>,
    /// Prevents the idle-sender callback from promoting a new entry mid-`clear()`.
    draining: bool,
    sender: S,
    echo: Arc<Mutex<EchoSuppressor>>,
}

impl<S: AudioSender> PlaybackQueue<S> {
    pub fn new(sender: S, echo: Arc<Mutex<EchoSuppressor>>) -> Self {
        Self { pending: VecDeque::new(), current: None, draining: false, sender, echo }
    }

    pub fn enqueue(&mut self, stream: Box<dyn TtsStream>) -> Uuid {
        let id = Uuid::new_v4();
        self.pending.push_back(Entry { id, stream });
        id
    }

    fn promote_if_idle(&mut self) {
        if self.draining || self.current.is_some() {
            return;
        }
        if self.sender.is_idle() {
            self.current = self.pending.pop_front();
        }
    }

    /// Drives playback until every currently-enqueued stream has finished.
    /// Returns completion order, which always equals enqueue order (§8 property 1):
    /// the current entry is drained to exhaustion before the next is promoted.
    pub async fn run_to_completion(&mut self) -> (Vec<Uuid>, Vec<PlaybackEvent>) {
        let mut finished = Vec::new();
        let mut events = Vec::new();
        loop {
            self.promote_if_idle();
            let Some(entry) = self.current.as_mut() else {
                break;
            };
            match entry.stream.next_chunk().await {
                Some(frame) => {
                    self.echo.lock().await.register_outbound(&frame);
                    if let Err(e) = self.sender.send(frame).await {
                        events.push(PlaybackEvent::StreamError {
                            id: entry.id,
                            message: e.to_string(),
                        });
                        finished.push(entry.id);
                        self.current = None;
                    }
                }
                None => {
                    finished.push(entry.id);
                    self.current = None;
                }
            }
        }
        (finished, events)
    }

    /// Barge-in: cancel every stream (current and pending), stop the sender,
    /// clear the bot-speaking flag, emit `Cleared`.
    pub async fn clear(&mut self, now_ms: u64) -> PlaybackEvent {
        self.draining = true;
        if let Some(mut entry) = self.current.take() {
            entry.stream.cancel();
        }
        while let Some(mut entry) = self.pending.pop_front() {
            entry.stream.cancel();
        }
        let _ = self.sender.stop().await;
        self.echo.lock().await.set_speaking(false, now_ms);
        self.draining = false;
        PlaybackEvent::Cleared
    }

    pub fn is_playing(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, VoiceError};

    struct StubStream {
        chunks: VecDeque<PcmFrame>,
        cancelled: bool,
    }

    impl StubStream {
        fn with_chunks(n: usize) -> Self {
            Self {
                chunks: (0..n).map(|i| PcmFrame::processing(vec![i as i16; 4])).collect(),
                cancelled: false,
            }
        }
    }

    #[async_trait]
    impl TtsStream for StubStream {
        async fn next_chunk(&mut self) -> Option<PcmFrame> {
            if self.cancelled {
                return None;
            }
            self.chunks.pop_front()
        }

        fn cancel(&mut self) {
            self.cancelled = true;
            self.chunks.clear();
        }
    }

    struct StubSender {
        sent: Vec<PcmFrame>,
        idle: bool,
    }

    impl StubSender {
        fn new() -> Self {
            Self { sent: Vec::new(), idle: true }
        }
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

    #[tokio::test]
    async fn completion_order_matches_enqueue_order() {
        let echo = Arc::new(Mutex::new(EchoSuppressor::new()));
        let mut queue = PlaybackQueue::new(StubSender::new(), echo);

        let id1 = queue.enqueue(Box::new(StubStream::with_chunks(3)));
        let id2 = queue.enqueue(Box::new(StubStream::with_chunks(1)));

        let (order, events) = queue.run_to_completion().await;
        assert!(events.is_empty());
        assert_eq!(order, vec![id1, id2]);
    }

    #[tokio::test]
    async fn clear_is_atomic_barge_in() {
        let echo = Arc::new(Mutex::new(EchoSuppressor::new()));
        let mut queue = PlaybackQueue::new(StubSender::new(), echo);
        queue.enqueue(Box::new(StubStream::with_chunks(5)));
        queue.enqueue(Box::new(StubStream::with_chunks(5)));

        queue.promote_if_idle();
        assert!(queue.is_playing());
        // consume one chunk from the current stream before interrupting.
        let _ = queue.current.as_mut().unwrap().stream.next_chunk().await;

        let event = queue.clear(0).await;
        assert!(matches!(event, PlaybackEvent::Cleared));
        assert!(!queue.is_playing());
        assert!(queue.pending.is_empty());

        // no further chunks reach the sender after clear.
        let (order, _) = queue.run_to_completion().await;
        assert!(order.is_empty());
    }

    #[test]
    fn voice_error_stringifies_for_stream_error_event() {
        let err = VoiceError::Transport("closed".into());
        assert!(err.to_string().contains("closed"));
    }
}
