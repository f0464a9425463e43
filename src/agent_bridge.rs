//! Agent bridge (§4.9): connects voice sessions to the host agent runtime.
//!
//! Grounded in this codebase's `agent/tool_loop.rs` buffered dispatch and
//! `agent/tools.rs` name-keyed tool registry — the same registry/dispatch shape,
//! generalized so handler panics and unknown tool names both fold into an
//! `{error: string}` result instead of propagating (§4.9, §7).

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::types::{ConversationTurn, ToolCall, ToolDefinition, ToolResult};

/// A registered tool: its definition (for S2S setup / LLM function declarations)
/// plus its handler.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: serde_json::Value) -> serde_json::Value;
}

/// The host runtime's streaming dispatcher: given a dispatch context, streams
/// back text blocks. Implemented by whatever agent runtime this crate is wired
/// into; a test stub is provided below for engine unit tests.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn dispatch(&self, ctx: DispatchContext) -> Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub user_id: String,
    pub display_name: String,
    /// `voice:<userId>` per §4.9.
    pub session_key: String,
    pub surface: String,
    pub text: String,
    pub history: Vec<ConversationTurn>,
}

pub struct AgentBridge {
    runtime: Arc<dyn AgentRuntime>,
    tools: Mutex<HashMap<String, (ToolDefinition, Arc<dyn ToolHandler>)>>,
}

impl AgentBridge {
    pub fn new(runtime: Arc<dyn AgentRuntime>) -> Self {
        Self { runtime, tools: Mutex::new(HashMap::new()) }
    }

    pub async fn register_tool(
        &self,
        definition: ToolDefinition,
        handler: Arc<dyn ToolHandler>,
    ) {
        self.tools.lock().await.insert(definition.name.clone(), (definition, handler));
    }

    /// Definitions for every registered tool, e.g. for S2S setup frames (§4.6).
    pub async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.lock().await.values().map(|(def, _)| def.clone()).collect()
    }

    /// Executes a tool call. Unknown tools and handler panics both resolve to an
    /// `{error: string}` payload; this function itself never returns an `Err`
    /// nor panics, so a single call site works uniformly (§4.9, §7).
    pub async fn execute_tool(&self, call: ToolCall) -> ToolResult {
        let handler = {
            let tools = self.tools.lock().await;
            tools.get(&call.name).map(|(_, handler)| handler.clone())
        };

        let Some(handler) = handler else {
            return ToolResult::error(call.call_id, format!("unknown tool: {}", call.name));
        };

        let call_id = call.call_id.clone();
        let outcome = AssertUnwindSafe(handler.call(call.arguments)).catch_unwind().await;
        match outcome {
            Ok(payload) => ToolResult::ok(call_id, payload),
            Err(_) => ToolResult::error(call_id, format!("tool '{}' panicked", call.name)),
        }
    }

    /// Dispatches an already-built context directly, for callers that need
    /// more control over its shape than `stream_reply` provides (e.g. the
    /// session manager's S2S end-of-session summary, §4.8).
    pub async fn dispatch(&self, ctx: DispatchContext) -> Result<Vec<String>> {
        self.runtime.dispatch(ctx).await
    }

    /// Streams the agent's reply for one user turn, building the dispatch
    /// context the way this codebase's tool loop builds it (§4.9 item 1).
    pub async fn stream_reply(
        &self,
        user_id: &str,
        text: &str,
        history: &[ConversationTurn],
    ) -> Result<Vec<String>> {
        let ctx = DispatchContext {
            user_id: user_id.to_string(),
            display_name: user_id.to_string(),
            session_key: format!("voice:{user_id}"),
            surface: "voice".to_string(),
            text: text.to_string(),
            history: history.to_vec(),
        };
        self.runtime.dispatch(ctx).await
    }

    #[cfg(test)]
    pub fn new_stub_for_tests(chunks: Vec<String>) -> Self {
        struct StubRuntime(Vec<String>);
        #[async_trait]
        impl AgentRuntime for StubRuntime {
            async fn dispatch(&self, _ctx: DispatchContext) -> Result<Vec<String>> {
                Ok(self.0.clone())
            }
        }
        Self::new(Arc::new(StubRuntime(chunks)))
    }
}
