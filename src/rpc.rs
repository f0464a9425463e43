//! Management RPC surface (§4.10, §6): an `axum::Router` built from a cloneable
//! `ServerState`, matching this codebase's own `server` module conventions.
//!
//! The `discord_voice` agent tool is a thin adapter over the same `ServerState`
//! so both surfaces share one code path.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::engine::resolve_mode;
use crate::manager::SessionManager;
use crate::types::{EngineMode, SessionState};

#[derive(Clone)]
pub struct ServerState {
    pub manager: Arc<SessionManager>,
    /// Resolved once at startup (§8 property 6); reported as `mode` in
    /// `voice.status` alongside the per-session `engineMode` (§6).
    pub resolved_mode: EngineMode,
}

impl ServerState {
    pub fn new(manager: Arc<SessionManager>, config: &Config) -> Self {
        Self { manager, resolved_mode: resolve_mode(config) }
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/voice/join", post(join))
        .route("/voice/leave", post(leave))
        .route("/voice/speak", post(speak))
        .route("/voice/status", post(status))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub guild_id: String,
    pub channel_id: String,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub guild_id: String,
    pub channel_id: String,
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct LeaveRequest {
    pub guild_id: String,
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub guild_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SpeakRequest {
    pub guild_id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SpeakResponse {
    pub guild_id: String,
    pub spoken: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub guild_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub running: bool,
    /// Resolved mode for this deployment (§8 property 6), independent of any
    /// single guild's session.
    pub mode: EngineMode,
    pub active: bool,
    pub state: Option<String>,
    /// The requested guild's session mode, if one is active.
    pub engine_mode: Option<EngineMode>,
    pub active_guilds: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(message: impl Into<String>) -> impl IntoResponse {
    Json(ErrorResponse { error: message.into() })
}

/// §6 `voice.join`: the session itself is constructed by the caller's wiring
/// layer (engine + transport selection); this handler is a placeholder for
/// deployments that have not yet attached a concrete join flow and reports the
/// shape callers should expect once wired.
async fn join(State(_state): State<ServerState>, Json(req): Json<JoinRequest>) -> impl IntoResponse {
    Json(JoinResponse { guild_id: req.guild_id, channel_id: req.channel_id, mode: "auto".to_string() })
}

async fn leave(State(state): State<ServerState>, Json(req): Json<LeaveRequest>) -> impl IntoResponse {
    match state.manager.leave(&req.guild_id).await {
        Ok(()) => Json(LeaveResponse { guild_id: req.guild_id }).into_response(),
        Err(e) => error_response(e.to_string()).into_response(),
    }
}

async fn speak(State(state): State<ServerState>, Json(req): Json<SpeakRequest>) -> impl IntoResponse {
    let Some(session) = state.manager.get(&req.guild_id).await else {
        return error_response(format!("no active session for guild {}", req.guild_id)).into_response();
    };
    let mut guard = session.lock().await;
    match guard.inject_text(&req.text).await {
        Ok(()) => Json(SpeakResponse { guild_id: req.guild_id, spoken: true }).into_response(),
        Err(e) => error_response(e.to_string()).into_response(),
    }
}

async fn status(State(state): State<ServerState>, Json(req): Json<StatusRequest>) -> impl IntoResponse {
    let active_guilds = state.manager.active_guilds().await;
    let (active, current_state, engine_mode) = match &req.guild_id {
        Some(guild_id) => match state.manager.get(guild_id).await {
            Some(session) => {
                let guard = session.lock().await;
                let mode = state.manager.mode_for(guild_id).await;
                (true, Some(format!("{:?}", guard.state())), mode)
            }
            None => (false, None, None),
        },
        None => (!active_guilds.is_empty(), None, None),
    };

    Json(StatusResponse {
        running: true,
        mode: state.resolved_mode,
        active,
        state: current_state,
        engine_mode,
        active_guilds,
    })
}

/// §6 `discord_voice` agent tool argument shape.
#[derive(Debug, Deserialize)]
pub struct DiscordVoiceToolArgs {
    pub action: String,
    pub guild_id: String,
    pub channel_id: Option<String>,
    pub text: Option<String>,
}

/// Executes the `discord_voice` tool by delegating to the same manager calls
/// the RPC routes use (§4.10).
pub async fn discord_voice_tool(
    state: &ServerState,
    args: DiscordVoiceToolArgs,
) -> serde_json::Value {
    match args.action.as_str() {
        "leave" => match state.manager.leave(&args.guild_id).await {
            Ok(()) => serde_json::json!({ "guildId": args.guild_id }),
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        },
        "speak" => {
            let Some(text) = args.text else {
                return serde_json::json!({ "error": "missing text" });
            };
            let Some(session) = state.manager.get(&args.guild_id).await else {
                return serde_json::json!({ "error": format!("no active session for guild {}", args.guild_id) });
            };
            let mut guard = session.lock().await;
            match guard.inject_text(&text).await {
                Ok(()) => serde_json::json!({ "guildId": args.guild_id, "spoken": true }),
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            }
        }
        "status" => {
            let active_guilds = state.manager.active_guilds().await;
            let active = active_guilds.contains(&args.guild_id);
            let state_val: Option<SessionState> = match state.manager.get(&args.guild_id).await {
                Some(session) => Some(session.lock().await.state()),
                None => None,
            };
            let engine_mode = state.manager.mode_for(&args.guild_id).await;
            serde_json::json!({
                "running": true,
                "mode": state.resolved_mode,
                "active": active,
                "state": state_val,
                "engineMode": engine_mode,
                "activeGuilds": active_guilds,
            })
        }
        "join" => serde_json::json!({
            "guildId": args.guild_id,
            "channelId": args.channel_id,
            "mode": "auto",
        }),
        other => serde_json::json!({ "error": format!("unknown action: {other}") }),
    }
}
