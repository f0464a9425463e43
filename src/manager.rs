//! Session manager (§4.8): a guild id -> session map with join/leave/stopAll
//! semantics, including S2S-only session-end summary dispatch.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::agent_bridge::{AgentBridge, DispatchContext};
use crate::error::{Result, VoiceError};
use crate::session::VoiceSession;
use crate::types::EngineMode;

pub struct SessionManager {
    sessions: Mutex<HashMap<String, (Arc<Mutex<VoiceSession>>, EngineMode)>>,
    agent: Arc<AgentBridge>,
}

impl SessionManager {
    pub fn new(agent: Arc<AgentBridge>) -> Self {
        Self { sessions: Mutex::new(HashMap::new()), agent }
    }

    /// If a session already exists for `guild_id`, stops it first. Stores the
    /// new session before calling `start()` so concurrent joins for the same
    /// guild collide deterministically on the map insert, not on a later race
    /// inside `start()` (§4.8). If `start()` fails, the just-inserted entry is
    /// removed so a failed join never leaves a dead session reachable by guild id.
    pub async fn join(
        &self,
        guild_id: &str,
        mode: EngineMode,
        session: VoiceSession,
    ) -> Result<Arc<Mutex<VoiceSession>>> {
        self.leave_internal(guild_id).await.ok();

        let handle = Arc::new(Mutex::new(session));
        {
            let mut sessions = self.sessions.lock().await;
            sessions.insert(guild_id.to_string(), (handle.clone(), mode));
        }

        if let Err(e) = handle.lock().await.start().await {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(guild_id);
            return Err(e);
        }
        Ok(handle)
    }

    async fn leave_internal(&self, guild_id: &str) -> Result<()> {
        let entry = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(guild_id)
        };
        let Some((session, mode)) = entry else {
            return Err(VoiceError::NoSession(guild_id.to_string()));
        };

        let mut guard = session.lock().await;

        // Pipeline mode streams every turn to the agent during the session and
        // needs no summary; only S2S mode's history would otherwise be lost.
        if mode == EngineMode::SpeechToSpeech {
            let history = guard.conversation_snapshot().await;
            guard.stop().await?;
            let ctx = session_end_dispatch_context(guild_id, history);
            let _ = self.agent.dispatch(ctx).await;
        } else {
            guard.stop().await?;
        }
        Ok(())
    }

    pub async fn leave(&self, guild_id: &str) -> Result<()> {
        self.leave_internal(guild_id).await
    }

    pub async fn get(&self, guild_id: &str) -> Option<Arc<Mutex<VoiceSession>>> {
        self.sessions.lock().await.get(guild_id).map(|(s, _)| s.clone())
    }

    /// The engine mode a guild's active session was started with, for status
    /// reporting (§6 `engineMode`).
    pub async fn mode_for(&self, guild_id: &str) -> Option<EngineMode> {
        self.sessions.lock().await.get(guild_id).map(|(_, mode)| *mode)
    }

    pub async fn active_guilds(&self) -> Vec<String> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    pub async fn stop_all(&self) {
        let guild_ids: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        for guild_id in guild_ids {
            let _ = self.leave_internal(&guild_id).await;
        }
    }
}

/// Constructs the dispatch context used for the S2S end-of-session summary so
/// it can be unit-tested independent of a live agent runtime. `history` is the
/// engine's real conversation snapshot, taken before `stop()` tears it down.
pub fn session_end_dispatch_context(
    guild_id: &str,
    history: Vec<crate::types::ConversationTurn>,
) -> DispatchContext {
    DispatchContext {
        user_id: "system".to_string(),
        display_name: "system".to_string(),
        session_key: format!("voice:{guild_id}"),
        surface: "voice".to_string(),
        text: "[voice session ended]".to_string(),
        history,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::transport::AudioSender;
    use crate::config::Config;
    use crate::engine::{Engine, EngineEvent};
    use crate::error::Result as VResult;
    use crate::types::PcmFrame;
    use async_trait::async_trait;

    struct NoopEngine;
    #[async_trait]
    impl Engine for NoopEngine {
        async fn start(&mut self) -> VResult<()> {
            Ok(())
        }
        async fn feed_audio(&mut self, _user_id: &str, _frame: PcmFrame) -> VResult<()> {
            Ok(())
        }
        async fn end_of_speech(&mut self, _user_id: &str) -> VResult<()> {
            Ok(())
        }
        async fn inject_text(&mut self, _text: &str) -> VResult<()> {
            Ok(())
        }
        async fn interrupt(&mut self) {}
        async fn stop(&mut self) -> VResult<()> {
            Ok(())
        }
        async fn next_event(&mut self) -> Option<EngineEvent> {
            None
        }
    }

    struct FailingEngine;
    #[async_trait]
    impl Engine for FailingEngine {
        async fn start(&mut self) -> VResult<()> {
            Err(crate::error::VoiceError::Session("boom".into()))
        }
        async fn feed_audio(&mut self, _user_id: &str, _frame: PcmFrame) -> VResult<()> {
            Ok(())
        }
        async fn end_of_speech(&mut self, _user_id: &str) -> VResult<()> {
            Ok(())
        }
        async fn inject_text(&mut self, _text: &str) -> VResult<()> {
            Ok(())
        }
        async fn interrupt(&mut self) {}
        async fn stop(&mut self) -> VResult<()> {
            Ok(())
        }
        async fn next_event(&mut self) -> Option<EngineEvent> {
            None
        }
    }

    struct NoopSender;
    #[async_trait]
    impl AudioSender for NoopSender {
        async fn send(&mut self, _frame: PcmFrame) -> VResult<()> {
            Ok(())
        }
        async fn stop(&mut self) -> VResult<()> {
            Ok(())
        }
        fn is_idle(&self) -> bool {
            true
        }
    }

    fn stub_session(guild_id: &str) -> VoiceSession {
        VoiceSession::new(guild_id.to_string(), Config::default(), Box::new(NoopEngine), Box::new(NoopSender))
    }

    #[tokio::test]
    async fn join_replaces_existing_session_for_guild() {
        let agent = Arc::new(AgentBridge::new_stub_for_tests(vec![]));
        let manager = SessionManager::new(agent);

        manager.join("g1", EngineMode::Pipeline, stub_session("g1")).await.unwrap();
        assert_eq!(manager.active_guilds().await, vec!["g1".to_string()]);

        manager.join("g1", EngineMode::Pipeline, stub_session("g1")).await.unwrap();
        assert_eq!(manager.active_guilds().await.len(), 1);
    }

    #[tokio::test]
    async fn leave_without_session_is_an_error() {
        let agent = Arc::new(AgentBridge::new_stub_for_tests(vec![]));
        let manager = SessionManager::new(agent);
        assert!(manager.leave("missing").await.is_err());
    }

    #[tokio::test]
    async fn join_removes_entry_when_start_fails() {
        let agent = Arc::new(AgentBridge::new_stub_for_tests(vec![]));
        let manager = SessionManager::new(agent);

        let failing = VoiceSession::new(
            "g1".to_string(),
            Config::default(),
            Box::new(FailingEngine),
            Box::new(NoopSender),
        );
        assert!(manager.join("g1", EngineMode::Pipeline, failing).await.is_err());
        assert!(manager.active_guilds().await.is_empty());
    }

    #[tokio::test]
    async fn leave_dispatches_real_history_for_speech_to_speech() {
        use crate::agent_bridge::AgentRuntime;
        use std::sync::Mutex as StdMutex;

        struct CapturingRuntime(Arc<StdMutex<Vec<DispatchContext>>>);
        #[async_trait]
        impl AgentRuntime for CapturingRuntime {
            async fn dispatch(&self, ctx: DispatchContext) -> VResult<Vec<String>> {
                self.0.lock().unwrap().push(ctx);
                Ok(vec![])
            }
        }

        struct HistoryEngine;
        #[async_trait]
        impl Engine for HistoryEngine {
            async fn start(&mut self) -> VResult<()> {
                Ok(())
            }
            async fn feed_audio(&mut self, _user_id: &str, _frame: PcmFrame) -> VResult<()> {
                Ok(())
            }
            async fn end_of_speech(&mut self, _user_id: &str) -> VResult<()> {
                Ok(())
            }
            async fn inject_text(&mut self, _text: &str) -> VResult<()> {
                Ok(())
            }
            async fn interrupt(&mut self) {}
            async fn stop(&mut self) -> VResult<()> {
                Ok(())
            }
            async fn next_event(&mut self) -> Option<EngineEvent> {
                None
            }
            async fn conversation_history(&self) -> Vec<crate::types::ConversationTurn> {
                vec![crate::types::ConversationTurn::assistant("hi there", 0)]
            }
        }

        let captured = Arc::new(StdMutex::new(Vec::new()));
        let agent = Arc::new(AgentBridge::new(Arc::new(CapturingRuntime(captured.clone()))));
        let manager = SessionManager::new(agent);

        let session = VoiceSession::new(
            "g1".to_string(),
            Config::default(),
            Box::new(HistoryEngine),
            Box::new(NoopSender),
        );
        manager.join("g1", EngineMode::SpeechToSpeech, session).await.unwrap();
        manager.leave("g1").await.unwrap();

        let calls = captured.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].history.len(), 1);
        assert_eq!(calls[0].history[0].content, "hi there");
    }

    #[tokio::test]
    async fn stop_all_clears_every_guild() {
        let agent = Arc::new(AgentBridge::new_stub_for_tests(vec![]));
        let manager = SessionManager::new(agent);
        manager.join("g1", EngineMode::Pipeline, stub_session("g1")).await.unwrap();
        manager.join("g2", EngineMode::Pipeline, stub_session("g2")).await.unwrap();

        manager.stop_all().await;
        assert!(manager.active_guilds().await.is_empty());
    }
}
