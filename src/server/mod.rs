//! Unix socket JSON-RPC server — the chat frontend's local API.
//!
//! Listens on ~/.companiond/companiond.sock for line-delimited JSON-RPC
//! 2.0 requests. All communication is local-only, no TCP exposure. One
//! task per connection; all state mutation goes through the shared
//! `AppState` mutex, held only across synchronous sections.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::Turn;
use crate::offline::RuleEngine;
use crate::prompt;
use crate::relay::Relay;
use crate::router::{self, Provider};
use crate::state::{AppState, BotProfile, Bucket, ChatMessage, Persona, Sender};
use crate::store::Store;

/// Bound on a single request line. An oversized line gets a parse-error
/// response; it does not end the connection.
const MAX_REQUEST_BYTES: u64 = 1_048_576;

// ── JSON-RPC Types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    method: String,
    params: Option<serde_json::Value>,
    id: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }
    fn error(id: Option<serde_json::Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(JsonRpcError { code, message }),
            id,
        }
    }
    fn invalid_params(id: Option<serde_json::Value>, detail: impl std::fmt::Display) -> Self {
        Self::error(id, -32602, format!("Invalid params: {detail}"))
    }
    fn not_found(id: Option<serde_json::Value>, what: &str) -> Self {
        Self::error(id, -32004, format!("{what} not found"))
    }
}

// ── Server ──────────────────────────────────────────────────────────

pub struct ServerCtx {
    pub state: Arc<Mutex<AppState>>,
    pub store: Arc<Store>,
    pub relay: Arc<Relay>,
    pub engine: Mutex<RuleEngine>,
}

pub struct Server {
    socket_path: PathBuf,
    ctx: Arc<ServerCtx>,
}

impl Server {
    pub fn new(
        socket_path: PathBuf,
        state: Arc<Mutex<AppState>>,
        store: Arc<Store>,
        relay: Arc<Relay>,
    ) -> Self {
        Self {
            socket_path,
            ctx: Arc::new(ServerCtx {
                state,
                store,
                relay,
                engine: Mutex::new(RuleEngine::new()),
            }),
        }
    }

    pub async fn run(&self) -> Result<()> {
        // Remove stale socket file
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Owner-only socket permissions
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        info!(socket = %self.socket_path.display(), "companiond listening");

        loop {
            let (stream, _) = listener.accept().await?;
            let ctx = Arc::clone(&self.ctx);

            tokio::spawn(async move {
                let (reader, mut writer) = stream.into_split();
                let bounded = reader.take(MAX_REQUEST_BYTES);
                let mut reader = BufReader::new(bounded);
                let mut line = String::new();

                loop {
                    line.clear();
                    // Re-arm the read bound: the limit is per request
                    // line, not per connection.
                    reader.get_mut().set_limit(MAX_REQUEST_BYTES);
                    match reader.read_line(&mut line).await {
                        Ok(0) => break, // EOF
                        Ok(_) => {
                            let response =
                                if reader.get_mut().limit() == 0 && !line.ends_with('\n') {
                                    // The line hit the bound mid-way;
                                    // drop the rest before continuing.
                                    if !discard_rest_of_line(&mut reader).await {
                                        break;
                                    }
                                    JsonRpcResponse::error(
                                        None,
                                        -32700,
                                        "Parse error: request exceeds 1 MB".into(),
                                    )
                                } else {
                                    handle_request(&line, &ctx).await
                                };
                            let resp_json = serde_json::to_string(&response).unwrap_or_default();
                            if writer.write_all(resp_json.as_bytes()).await.is_err() {
                                break;
                            }
                            if writer.write_all(b"\n").await.is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    }
                }
            });
        }
    }
}

/// Consume the remainder of an over-long line so the connection can keep
/// serving requests. Returns false when the stream ends first.
async fn discard_rest_of_line<R>(reader: &mut BufReader<tokio::io::Take<R>>) -> bool
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut scratch = String::new();
    loop {
        scratch.clear();
        reader.get_mut().set_limit(MAX_REQUEST_BYTES);
        match reader.read_line(&mut scratch).await {
            Ok(0) => return false,
            Ok(_) if scratch.ends_with('\n') => return true,
            Ok(_) => continue,
            Err(_) => return false,
        }
    }
}

// ── Request Handling ────────────────────────────────────────────────

async fn handle_request(raw: &str, ctx: &ServerCtx) -> JsonRpcResponse {
    let req: JsonRpcRequest = match serde_json::from_str(raw) {
        Ok(r) => r,
        Err(e) => return JsonRpcResponse::error(None, -32700, format!("Parse error: {}", e)),
    };

    let params = req.params.unwrap_or(serde_json::Value::Null);

    match req.method.as_str() {
        "chat.send" => handle_chat_send(req.id, params, ctx).await,
        "chat.regenerate" => handle_chat_regenerate(req.id, params, ctx).await,
        "chat.history" => handle_chat_history(req.id, params, ctx),
        "chat.deleteMessage" => handle_chat_delete_message(req.id, params, ctx),
        "chat.clear" => handle_chat_clear(req.id, params, ctx),
        "session.start" => handle_session_start(req.id, params, ctx),
        "session.end" => handle_session_end(req.id, params, ctx),
        "bots.add" => handle_bots_add(req.id, params, ctx),
        "bots.update" => handle_bots_update(req.id, params, ctx),
        "bots.remove" => handle_bots_remove(req.id, params, ctx),
        "bots.list" => handle_bots_list(req.id, ctx),
        "bots.setPersona" => handle_bots_set_persona(req.id, params, ctx),
        "personas.add" => handle_personas_add(req.id, params, ctx),
        "personas.remove" => handle_personas_remove(req.id, params, ctx),
        "personas.list" => handle_personas_list(req.id, ctx),
        "keys.save" => handle_keys_save(req.id, params, ctx),
        "keys.list" => handle_keys_list(req.id, ctx),
        "keys.remove" => handle_keys_remove(req.id, params, ctx),
        "keys.activate" => handle_keys_activate(req.id, params, ctx),
        "usage.stats" => handle_usage_stats(req.id, params, ctx),
        "models.list" => handle_models_list(req.id),
        _ => JsonRpcResponse::error(req.id, -32601, format!("Unknown method: {}", req.method)),
    }
}

fn param_uuid(params: &serde_json::Value, field: &str) -> Option<Uuid> {
    params
        .get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn message_json(msg: &ChatMessage) -> serde_json::Value {
    serde_json::to_value(msg).unwrap_or(serde_json::Value::Null)
}

// ── Chat ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatSendParams {
    bot_id: Uuid,
    text: String,
    model: String,
}

async fn handle_chat_send(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let send: ChatSendParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => return JsonRpcResponse::invalid_params(id, e),
    };
    if send.text.trim().is_empty() {
        return JsonRpcResponse::invalid_params(id, "empty message text");
    }

    // The user's message lands in the transcript before generation, so
    // it survives even if the reply fails.
    {
        let mut state = ctx.state.lock().unwrap();
        if state.bot(&send.bot_id).is_none() {
            return JsonRpcResponse::not_found(id, "bot");
        }
        state.push_message(send.bot_id, ChatMessage::new(Sender::User, send.text.clone()));
    }

    let reply = generate_reply(ctx, &send.bot_id, &send.model).await;
    complete_turn(id, ctx, &send.bot_id, reply)
}

#[derive(Debug, Deserialize)]
struct RegenerateParams {
    bot_id: Uuid,
    model: String,
}

async fn handle_chat_regenerate(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let regen: RegenerateParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => return JsonRpcResponse::invalid_params(id, e),
    };

    // Drop the reply being replaced; the transcript must end on the
    // user's message before we generate again.
    {
        let mut state = ctx.state.lock().unwrap();
        if state.bot(&regen.bot_id).is_none() {
            return JsonRpcResponse::not_found(id, "bot");
        }
        state.pop_last_bot_message(&regen.bot_id);
        match state.history(&regen.bot_id).last() {
            Some(m) if m.sender == Sender::User => {}
            _ => {
                return JsonRpcResponse::error(
                    id,
                    -32005,
                    "nothing to regenerate: transcript does not end with a user message".into(),
                )
            }
        }
    }

    let reply = generate_reply(ctx, &regen.bot_id, &regen.model).await;
    complete_turn(id, ctx, &regen.bot_id, reply)
}

/// Produce the bot's reply text for the transcript as it stands now.
/// `Provider::Local` goes to the rule engine; everything else goes
/// through the relay.
async fn generate_reply(ctx: &ServerCtx, bot_id: &Uuid, model: &str) -> String {
    // Snapshot everything under the lock, release it before any await.
    let (bot, system_instruction, history, last_user_text) = {
        let state = ctx.state.lock().unwrap();
        let Some(bot) = state.bot(bot_id).cloned() else {
            return crate::relay::render_failure(&crate::error::ChatError::UnsupportedModel {
                model: model.to_string(),
            });
        };
        let personality = state.effective_personality(&bot);
        let system = prompt::compose(&personality, bot.mode, bot.gender);
        let history: Vec<Turn> = state.history(bot_id).iter().map(Turn::from).collect();
        let last_user = state
            .history(bot_id)
            .iter()
            .rev()
            .find(|m| m.sender == Sender::User)
            .map(|m| m.text.clone())
            .unwrap_or_default();
        (bot, system, history, last_user)
    };

    if matches!(router::route(model), Ok(Provider::Local)) {
        let mut engine = ctx.engine.lock().unwrap();
        return engine.reply(&last_user_text, &bot);
    }

    let delivery = ctx.relay.deliver(model, &history, &system_instruction).await;

    // Feed provider outcomes into the usage ledger and the stored-key
    // exhausted flags.
    if !delivery.usage_events.is_empty() {
        let mut state = ctx.state.lock().unwrap();
        for (event_model, quota_exceeded) in &delivery.usage_events {
            state.usage.update(event_model, *quota_exceeded);
            if *quota_exceeded {
                if let Ok(provider) = router::route(event_model) {
                    if let Err(err) = ctx.store.mark_key_exhausted(provider.as_str()) {
                        warn!(error = %err, "failed to flag stored key as exhausted");
                    }
                }
            }
        }
        state.mark_dirty(Bucket::Usage);
    }

    delivery.text
}

/// Append the reply and answer the RPC. A bot deleted while the reply
/// was in flight means the reply is discarded.
fn complete_turn(
    id: Option<serde_json::Value>,
    ctx: &ServerCtx,
    bot_id: &Uuid,
    reply: String,
) -> JsonRpcResponse {
    let mut state = ctx.state.lock().unwrap();
    if state.bot(bot_id).is_none() {
        return JsonRpcResponse::not_found(id, "bot");
    }
    let msg = ChatMessage::new(Sender::Bot, reply);
    let json = message_json(&msg);
    state.push_message(*bot_id, msg);
    JsonRpcResponse::success(id, serde_json::json!({ "message": json }))
}

fn handle_chat_history(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let Some(bot_id) = param_uuid(&params, "bot_id") else {
        return JsonRpcResponse::invalid_params(id, "missing bot_id");
    };
    let state = ctx.state.lock().unwrap();
    let messages: Vec<_> = state.history(&bot_id).iter().map(message_json).collect();
    JsonRpcResponse::success(id, serde_json::json!({ "messages": messages }))
}

fn handle_chat_delete_message(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let (Some(bot_id), Some(message_id)) = (
        param_uuid(&params, "bot_id"),
        param_uuid(&params, "message_id"),
    ) else {
        return JsonRpcResponse::invalid_params(id, "missing bot_id or message_id");
    };
    let mut state = ctx.state.lock().unwrap();
    if state.delete_message(&bot_id, &message_id) {
        JsonRpcResponse::success(id, serde_json::json!({ "ok": true }))
    } else {
        JsonRpcResponse::not_found(id, "message")
    }
}

fn handle_chat_clear(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let Some(bot_id) = param_uuid(&params, "bot_id") else {
        return JsonRpcResponse::invalid_params(id, "missing bot_id");
    };
    let mut state = ctx.state.lock().unwrap();
    state.clear_history(&bot_id);
    JsonRpcResponse::success(id, serde_json::json!({ "ok": true }))
}

// ── Sessions ────────────────────────────────────────────────────────

fn handle_session_start(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let Some(bot_id) = param_uuid(&params, "bot_id") else {
        return JsonRpcResponse::invalid_params(id, "missing bot_id");
    };
    let mut state = ctx.state.lock().unwrap();
    let Some(bot) = state.bot(&bot_id).cloned() else {
        return JsonRpcResponse::not_found(id, "bot");
    };

    // A fresh transcript opens with the bot's scenario line.
    if state.history(&bot_id).is_empty() && !bot.scenario.trim().is_empty() {
        state.push_message(bot_id, ChatMessage::new(Sender::Bot, bot.scenario.clone()));
    }

    let session_id = state.start_session(bot_id);
    JsonRpcResponse::success(id, serde_json::json!({ "session_id": session_id }))
}

fn handle_session_end(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let Some(session_id) = param_uuid(&params, "session_id") else {
        return JsonRpcResponse::invalid_params(id, "missing session_id");
    };
    let mut state = ctx.state.lock().unwrap();
    if state.end_session(&session_id) {
        JsonRpcResponse::success(id, serde_json::json!({ "ok": true }))
    } else {
        JsonRpcResponse::not_found(id, "open session")
    }
}

// ── Bots ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct NewBotParams {
    name: String,
    personality: String,
    #[serde(default)]
    scenario: String,
    #[serde(default)]
    avatar_ref: Option<String>,
    #[serde(default)]
    mode: crate::state::ConversationMode,
    #[serde(default)]
    gender: crate::state::Gender,
}

fn handle_bots_add(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let new: NewBotParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => return JsonRpcResponse::invalid_params(id, e),
    };
    if new.name.trim().is_empty() {
        return JsonRpcResponse::invalid_params(id, "bot name must not be empty");
    }
    let bot = BotProfile {
        id: Uuid::new_v4(),
        name: new.name,
        personality: new.personality,
        scenario: new.scenario,
        avatar_ref: new.avatar_ref,
        mode: new.mode,
        gender: new.gender,
        persona_id: None,
    };
    let json = serde_json::to_value(&bot).unwrap_or(serde_json::Value::Null);
    ctx.state.lock().unwrap().add_bot(bot);
    JsonRpcResponse::success(id, serde_json::json!({ "bot": json }))
}

fn handle_bots_update(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let bot: BotProfile = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => return JsonRpcResponse::invalid_params(id, e),
    };
    if ctx.state.lock().unwrap().update_bot(bot) {
        JsonRpcResponse::success(id, serde_json::json!({ "ok": true }))
    } else {
        JsonRpcResponse::not_found(id, "bot")
    }
}

fn handle_bots_remove(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let Some(bot_id) = param_uuid(&params, "bot_id") else {
        return JsonRpcResponse::invalid_params(id, "missing bot_id");
    };
    if ctx.state.lock().unwrap().remove_bot(&bot_id) {
        JsonRpcResponse::success(id, serde_json::json!({ "ok": true }))
    } else {
        JsonRpcResponse::not_found(id, "bot")
    }
}

fn handle_bots_list(id: Option<serde_json::Value>, ctx: &ServerCtx) -> JsonRpcResponse {
    let bots = ctx.state.lock().unwrap().bots();
    JsonRpcResponse::success(id, serde_json::json!({ "bots": bots }))
}

fn handle_bots_set_persona(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let Some(bot_id) = param_uuid(&params, "bot_id") else {
        return JsonRpcResponse::invalid_params(id, "missing bot_id");
    };
    // persona_id may be null to clear the overlay
    let persona_id = param_uuid(&params, "persona_id");
    if ctx.state.lock().unwrap().set_persona(&bot_id, persona_id) {
        JsonRpcResponse::success(id, serde_json::json!({ "ok": true }))
    } else {
        JsonRpcResponse::not_found(id, "bot")
    }
}

// ── Personas ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct NewPersonaParams {
    name: String,
    description: String,
}

fn handle_personas_add(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let new: NewPersonaParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => return JsonRpcResponse::invalid_params(id, e),
    };
    let persona = Persona {
        id: Uuid::new_v4(),
        name: new.name,
        description: new.description,
    };
    let json = serde_json::to_value(&persona).unwrap_or(serde_json::Value::Null);
    ctx.state.lock().unwrap().add_persona(persona);
    JsonRpcResponse::success(id, serde_json::json!({ "persona": json }))
}

fn handle_personas_remove(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let Some(persona_id) = param_uuid(&params, "persona_id") else {
        return JsonRpcResponse::invalid_params(id, "missing persona_id");
    };
    if ctx.state.lock().unwrap().remove_persona(&persona_id) {
        JsonRpcResponse::success(id, serde_json::json!({ "ok": true }))
    } else {
        JsonRpcResponse::not_found(id, "persona")
    }
}

fn handle_personas_list(id: Option<serde_json::Value>, ctx: &ServerCtx) -> JsonRpcResponse {
    let personas = ctx.state.lock().unwrap().personas();
    JsonRpcResponse::success(id, serde_json::json!({ "personas": personas }))
}

// ── Keys ────────────────────────────────────────────────────────────

fn handle_keys_save(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let provider = params.get("provider").and_then(|v| v.as_str());
    let value = params.get("value").and_then(|v| v.as_str());
    let label = params.get("label").and_then(|v| v.as_str()).unwrap_or("default");

    let (Some(provider), Some(value)) = (provider, value) else {
        return JsonRpcResponse::invalid_params(id, "missing provider or value");
    };

    match ctx.store.save_api_key(provider, label, value) {
        Ok(key_id) => {
            // A fresh credential clears today's exhausted flags so the
            // router stops treating models as out of quota.
            let mut state = ctx.state.lock().unwrap();
            state.usage.clear_today_limits();
            state.mark_dirty(Bucket::Usage);
            JsonRpcResponse::success(id, serde_json::json!({ "id": key_id }))
        }
        Err(e) => JsonRpcResponse::error(id, -32000, e.to_string()),
    }
}

fn handle_keys_list(id: Option<serde_json::Value>, ctx: &ServerCtx) -> JsonRpcResponse {
    match ctx.store.list_api_keys() {
        Ok(keys) => JsonRpcResponse::success(id, serde_json::json!({ "keys": keys })),
        Err(e) => JsonRpcResponse::error(id, -32000, e.to_string()),
    }
}

fn handle_keys_remove(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let Some(key_id) = param_uuid(&params, "id") else {
        return JsonRpcResponse::invalid_params(id, "missing id");
    };
    match ctx.store.remove_api_key(&key_id) {
        Ok(true) => JsonRpcResponse::success(id, serde_json::json!({ "ok": true })),
        Ok(false) => JsonRpcResponse::not_found(id, "key"),
        Err(e) => JsonRpcResponse::error(id, -32000, e.to_string()),
    }
}

fn handle_keys_activate(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let Some(key_id) = param_uuid(&params, "id") else {
        return JsonRpcResponse::invalid_params(id, "missing id");
    };
    match ctx.store.activate_api_key(&key_id) {
        Ok(true) => JsonRpcResponse::success(id, serde_json::json!({ "ok": true })),
        Ok(false) => JsonRpcResponse::not_found(id, "key"),
        Err(e) => JsonRpcResponse::error(id, -32000, e.to_string()),
    }
}

// ── Usage / Models ──────────────────────────────────────────────────

fn handle_usage_stats(
    id: Option<serde_json::Value>,
    params: serde_json::Value,
    ctx: &ServerCtx,
) -> JsonRpcResponse {
    let date = params
        .get("date")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<chrono::NaiveDate>().ok());
    let rows = ctx.state.lock().unwrap().usage.snapshot(date);
    JsonRpcResponse::success(id, serde_json::json!({ "usage": rows }))
}

fn handle_models_list(id: Option<serde_json::Value>) -> JsonRpcResponse {
    let models: Vec<serde_json::Value> = router::MODELS
        .iter()
        .map(|m| {
            serde_json::json!({
                "id": m.id,
                "provider": m.provider.as_str(),
                "display_name": m.display_name,
                "context_window": m.context_window,
            })
        })
        .collect();
    JsonRpcResponse::success(id, serde_json::json!({ "models": models }))
}
